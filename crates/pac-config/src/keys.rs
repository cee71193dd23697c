//! Label and annotation keys shared by everything that reads or writes a
//! PipelineRun.

pub const GROUP_NAME: &str = "pipelinesascode.tekton.dev";

pub const STATE: &str = "pipelinesascode.tekton.dev/state";
pub const REPOSITORY: &str = "pipelinesascode.tekton.dev/repository";
pub const EXECUTION_ORDER: &str = "pipelinesascode.tekton.dev/execution-order";
pub const MAX_KEEP_RUNS: &str = "pipelinesascode.tekton.dev/max-keep-runs";
pub const GIT_AUTH_SECRET: &str = "pipelinesascode.tekton.dev/git-auth-secret";
pub const ORIGINAL_PR_NAME: &str = "pipelinesascode.tekton.dev/original-prname";
pub const GIT_PROVIDER: &str = "pipelinesascode.tekton.dev/git-provider";
pub const EVENT_TYPE: &str = "pipelinesascode.tekton.dev/event-type";
pub const URL_ORG: &str = "pipelinesascode.tekton.dev/url-org";
pub const URL_REPOSITORY: &str = "pipelinesascode.tekton.dev/url-repository";
pub const SHA: &str = "pipelinesascode.tekton.dev/sha";
pub const SENDER: &str = "pipelinesascode.tekton.dev/sender";
pub const BRANCH: &str = "pipelinesascode.tekton.dev/branch";
pub const PULL_REQUEST: &str = "pipelinesascode.tekton.dev/pull-request";
pub const SHA_TITLE: &str = "pipelinesascode.tekton.dev/sha-title";
pub const SHA_URL: &str = "pipelinesascode.tekton.dev/sha-url";
pub const REPO_URL: &str = "pipelinesascode.tekton.dev/repo-url";
pub const INSTALLATION_ID: &str = "pipelinesascode.tekton.dev/installation-id";
pub const GHE_URL: &str = "pipelinesascode.tekton.dev/ghe-url";
pub const SOURCE_PROJECT_ID: &str = "pipelinesascode.tekton.dev/source-project-id";
pub const TARGET_PROJECT_ID: &str = "pipelinesascode.tekton.dev/target-project-id";
pub const CHECK_RUN_ID: &str = "pipelinesascode.tekton.dev/check-run-id";
pub const CONTROLLER_INFO: &str = "pipelinesascode.tekton.dev/controller-info";
pub const LOG_URL: &str = "pipelinesascode.tekton.dev/log-url";
pub const STARTED_AT: &str = "pipelinesascode.tekton.dev/started-at";

pub const MANAGED_BY: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY_VALUE: &str = "pipelinesascode.tekton.dev";

pub const STATE_STARTED: &str = "started";
pub const STATE_QUEUED: &str = "queued";
pub const STATE_COMPLETED: &str = "completed";
pub const STATE_FAILED: &str = "failed";
