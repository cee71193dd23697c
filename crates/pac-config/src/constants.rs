use std::time::Duration;

pub const DEFAULT_API_HOST: &str = "0.0.0.0";
pub const DEFAULT_API_PORT: &str = "8080";
pub const DEFAULT_CONFIG_PATH: &str = "/etc/pipelines-as-code/config.toml";
pub const DEFAULT_NAMESPACE: &str = "pipelines-as-code";
pub const LOGS_DIR: &str = "/var/lib/pipelines-as-code/logs";

pub const DEFAULT_CONTROLLER_LABEL: &str = "default";
pub const DEFAULT_CONTROLLER_SECRET: &str = "pipelines-as-code-secret";
pub const DEFAULT_CONTROLLER_CONFIGMAP: &str = "pipelines-as-code";
pub const DEFAULT_GLOBAL_REPOSITORY: &str = "pipelines-as-code";
pub const DEFAULT_APPLICATION_NAME: &str = "Pipelines as Code CI";

/// Key looked up in a git provider secret when the repository does not name one.
pub const DEFAULT_PROVIDER_TOKEN_KEY: &str = "provider.token";

pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_MAX_CONCURRENT_RECONCILES: usize = 4;
pub const RECONCILE_TIMEOUT: Duration = Duration::from_secs(120);
pub const RECONCILE_CHANNEL_CAPACITY: usize = 1000;
pub const RECONCILE_BASE_BACKOFF: Duration = Duration::from_millis(500);
pub const RECONCILE_MAX_BACKOFF: Duration = Duration::from_secs(60);
/// Delay before retrying a key that is already being reconciled.
pub const IN_FLIGHT_REQUEUE_DELAY: Duration = Duration::from_millis(100);

pub const DEFAULT_INFORMER_INTERVAL: Duration = Duration::from_secs(5);
pub const QUEUE_AUDIT_INTERVAL: Duration = Duration::from_secs(300);

pub const MAX_QUEUE_ITERATIONS: usize = 5;
pub const STATUS_BACKOFF_SCHEDULE: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(3),
    Duration::from_secs(5),
];
pub const MAX_REPOSITORY_STATUS_ENTRIES: usize = 5;
pub const MAX_REPOSITORY_STATUS_RETRIES: usize = 10;
pub const ERROR_LOG_SNIPPET_LINES: usize = 3;

pub const PROVIDER_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const GITHUB_API_URL: &str = "https://api.github.com";
pub const BITBUCKET_CLOUD_API_URL: &str = "https://api.bitbucket.org/2.0";
