//! Fixtures shared by the reconciler tests.

use crate::{Reconciler, ReconcilerConfig, Request, WorkQueue};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use pac_cluster::{
    Condition, ConditionStatus, GitProvider, MemoryCluster, PipelineRun, Repository, SecretRef,
    SpecStatus,
};
use pac_config::{ControllerInfo, Settings, keys};
use pac_provider::{
    Credentials, Event, Provider, ProviderError, ProviderFactory, ProviderKind, StatusOpts,
};
use pac_sync::QueueManager;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct RecordedStatus {
    pub kind: ProviderKind,
    pub token: String,
    pub event: Event,
    pub opts: StatusOpts,
}

#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<RecordedStatus>>,
    attempts: AtomicUsize,
    fail: AtomicBool,
}

/// Provider factory whose providers record statuses instead of calling a forge.
#[derive(Default)]
pub struct RecordingFactory {
    recorder: Arc<Recorder>,
}

impl RecordingFactory {
    /// Successfully posted statuses, in order.
    pub fn calls(&self) -> Vec<RecordedStatus> {
        self.recorder.calls.lock().clone()
    }

    pub fn attempts(&self) -> usize {
        self.recorder.attempts.load(Ordering::SeqCst)
    }

    pub fn fail_all(&self, fail: bool) {
        self.recorder.fail.store(fail, Ordering::SeqCst);
    }
}

struct RecordingProvider {
    kind: ProviderKind,
    token: String,
    recorder: Arc<Recorder>,
}

#[async_trait]
impl Provider for RecordingProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn create_status(&self, event: &Event, opts: &StatusOpts) -> pac_provider::Result<()> {
        self.recorder.attempts.fetch_add(1, Ordering::SeqCst);
        if self.recorder.fail.load(Ordering::SeqCst) {
            return Err(ProviderError::Api {
                provider: "recording",
                status: 502,
                body: "bad gateway".to_string(),
            });
        }
        self.recorder.calls.lock().push(RecordedStatus {
            kind: self.kind,
            token: self.token.clone(),
            event: event.clone(),
            opts: opts.clone(),
        });
        Ok(())
    }
}

impl ProviderFactory for RecordingFactory {
    fn build(
        &self,
        kind: ProviderKind,
        credentials: Credentials,
        _application_name: &str,
    ) -> pac_provider::Result<Arc<dyn Provider>> {
        if credentials.token.is_empty() {
            return Err(ProviderError::MissingCredentials(kind.to_string()));
        }
        Ok(Arc::new(RecordingProvider {
            kind,
            token: credentials.token,
            recorder: self.recorder.clone(),
        }))
    }
}

/// Repository `ns/repo` on GitHub with its token in secret `ns/repo-token`.
pub fn repository(limit: Option<i32>) -> Repository {
    let mut repo = Repository::new("ns", "repo");
    repo.spec.url = "https://github.com/owner/repo".to_string();
    repo.spec.concurrency_limit = limit;
    repo.spec.git_provider = Some(GitProvider {
        type_: "github".to_string(),
        secret: Some(SecretRef {
            name: "repo-token".to_string(),
            key: String::new(),
        }),
        ..Default::default()
    });
    repo
}

/// A queued, pending run of `ns/repo` whose batch is `order` (names in `ns`).
pub fn queued_run(name: &str, order: &[&str]) -> PipelineRun {
    let mut run = PipelineRun::new("ns", name);
    let order = order
        .iter()
        .map(|n| format!("ns/{}", n))
        .collect::<Vec<_>>()
        .join(",");

    for (key, value) in [
        (keys::MANAGED_BY, keys::MANAGED_BY_VALUE),
        (keys::REPOSITORY, "repo"),
        (keys::STATE, keys::STATE_QUEUED),
        (keys::GIT_PROVIDER, "github"),
        (keys::ORIGINAL_PR_NAME, "pr"),
        (keys::EVENT_TYPE, "pull_request"),
        (keys::SHA, "abc123"),
    ] {
        run.labels.insert(key.to_string(), value.to_string());
    }
    for (key, value) in [
        (keys::REPOSITORY, "repo"),
        (keys::STATE, keys::STATE_QUEUED),
        (keys::EXECUTION_ORDER, order.as_str()),
        (keys::REPO_URL, "https://github.com/owner/repo"),
        (keys::BRANCH, "refs/heads/main"),
        (keys::PULL_REQUEST, "7"),
    ] {
        run.annotations.insert(key.to_string(), value.to_string());
    }
    run.spec_status = Some(SpecStatus::Pending);
    run
}

pub struct Harness {
    pub cluster: Arc<MemoryCluster>,
    pub queues: Arc<QueueManager>,
    pub factory: Arc<RecordingFactory>,
    pub reconciler: Reconciler,
    pub rx: mpsc::Receiver<Request>,
}

impl Harness {
    pub fn new(limit: Option<i32>) -> Self {
        let cluster = Arc::new(MemoryCluster::new());
        cluster.insert_repository(repository(limit));
        cluster.insert_secret(
            "ns",
            "repo-token",
            [("provider.token".to_string(), "t0ken".to_string())].into(),
        );

        let queues = Arc::new(QueueManager::new());
        let factory = Arc::new(RecordingFactory::default());
        let (work, rx) = WorkQueue::new(64);

        let mut config = ReconcilerConfig::new(
            Settings::default(),
            ControllerInfo::default(),
            "pac-system",
        );
        config.logs_dir = PathBuf::from("/nonexistent");
        config.status_backoff = vec![Duration::from_millis(1); 3];

        let reconciler = Reconciler::new(
            cluster.clone(),
            queues.clone(),
            factory.clone(),
            work,
            config,
        );
        Self {
            cluster,
            queues,
            factory,
            reconciler,
            rx,
        }
    }

    pub fn run(&self, name: &str) -> PipelineRun {
        self.cluster
            .pipeline_run("ns", name)
            .unwrap_or_else(|| panic!("PipelineRun ns/{} missing", name))
    }

    /// Marks the run finished the way the workload runtime would.
    pub fn finish(&self, name: &str, status: ConditionStatus, reason: &str) -> PipelineRun {
        let mut run = self.run(name);
        run.status.conditions = vec![Condition::succeeded(status, reason)];
        run.status.start_time = Some(Utc::now() - ChronoDuration::minutes(1));
        run.status.completion_time = Some(Utc::now());
        self.cluster.insert_pipeline_run(run)
    }
}
