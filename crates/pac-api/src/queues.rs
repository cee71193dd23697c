use crate::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use pac_sync::{QueueSnapshot, QueueValidationResult};
use serde::Serialize;
use tracing::info;
use utoipa::ToSchema;

type ApiError = (StatusCode, Json<serde_json::Value>);

fn internal_error(e: impl std::fmt::Display) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": e.to_string() })),
    )
}

#[derive(Debug, Serialize, ToSchema)]
pub struct QueueResponse {
    /// `<namespace>/<name>` of the repository.
    pub repository: String,
    pub limit: usize,
    /// Running PipelineRun keys in admission order.
    pub running: Vec<String>,
    /// Pending PipelineRun keys in the order they will start.
    pub pending: Vec<String>,
}

impl From<QueueSnapshot> for QueueResponse {
    fn from(snapshot: QueueSnapshot) -> Self {
        Self {
            repository: snapshot.repository,
            limit: snapshot.limit,
            running: snapshot.running,
            pending: snapshot.pending,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ValidationResponse {
    pub repository_key: String,
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub running_count: usize,
    pub pending_count: usize,
    pub expected_count: usize,
}

impl From<QueueValidationResult> for ValidationResponse {
    fn from(result: QueueValidationResult) -> Self {
        Self {
            repository_key: result.repository_key,
            is_valid: result.is_valid,
            errors: result.errors,
            warnings: result.warnings,
            running_count: result.running_count,
            pending_count: result.pending_count,
            expected_count: result.expected_count,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PromotedRun {
    pub repository: String,
    pub pipeline_run: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RepairResponse {
    pub repaired: usize,
    pub promoted: Vec<PromotedRun>,
}

#[utoipa::path(
    get,
    path = "/queues",
    responses((status = OK, body = Vec<QueueResponse>))
)]
pub async fn list_queues(State(state): State<AppState>) -> Json<Vec<QueueResponse>> {
    Json(
        state
            .queues
            .snapshot()
            .into_iter()
            .map(QueueResponse::from)
            .collect(),
    )
}

#[utoipa::path(
    get,
    path = "/queues/{namespace}/{name}",
    params(("namespace" = String, Path,), ("name" = String, Path,)),
    responses(
        (status = OK, body = QueueResponse),
        (status = NOT_FOUND, description = "No queue for this repository"),
    )
)]
pub async fn get_queue(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Json<QueueResponse>, ApiError> {
    state
        .queues
        .snapshot_for(&format!("{}/{}", namespace, name))
        .map(|snapshot| Json(snapshot.into()))
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({ "error": "Queue not found" })),
            )
        })
}

#[utoipa::path(
    get,
    path = "/queues/validate",
    responses(
        (status = OK, body = Vec<ValidationResponse>),
        (status = INTERNAL_SERVER_ERROR, description = "Cluster unavailable"),
    )
)]
pub async fn validate_queues(
    State(state): State<AppState>,
) -> Result<Json<Vec<ValidationResponse>>, ApiError> {
    let results = state
        .queues
        .validate_queue_consistency(state.cluster.as_ref())
        .await
        .map_err(internal_error)?;
    Ok(Json(results.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    post,
    path = "/queues/repair",
    responses(
        (status = OK, body = RepairResponse),
        (status = INTERNAL_SERVER_ERROR, description = "Cluster unavailable"),
    )
)]
pub async fn repair_queues(State(state): State<AppState>) -> Result<Json<RepairResponse>, ApiError> {
    let summary = state
        .queues
        .repair_queue(state.cluster.as_ref())
        .await
        .map_err(internal_error)?;

    let mut promoted = Vec::new();
    for (repository, pipeline_run) in summary.promoted {
        info!("Starting {} admitted by repair of {}", pipeline_run, repository);
        state.work.add(pipeline_run.clone()).await;
        promoted.push(PromotedRun {
            repository,
            pipeline_run,
        });
    }

    Ok(Json(RepairResponse {
        repaired: summary.repaired,
        promoted,
    }))
}

#[cfg(test)]
mod tests {
    use crate::{AppState, router};
    use pac_cluster::{MemoryCluster, PipelineRun, Repository, SpecStatus};
    use pac_config::keys;
    use pac_reconciler::{Request, WorkQueue};
    use pac_sync::QueueManager;
    use serde_json::Value;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn managed(name: &str, state: &str) -> PipelineRun {
        let mut run = PipelineRun::new("ns", name);
        run.labels
            .insert(keys::MANAGED_BY.to_string(), keys::MANAGED_BY_VALUE.to_string());
        for map in [&mut run.labels, &mut run.annotations] {
            map.insert(keys::STATE.to_string(), state.to_string());
            map.insert(keys::REPOSITORY.to_string(), "repo".to_string());
        }
        run
    }

    async fn serve() -> (String, Arc<MemoryCluster>, Arc<QueueManager>, mpsc::Receiver<Request>) {
        let cluster = Arc::new(MemoryCluster::new());
        let mut repo = Repository::new("ns", "repo");
        repo.spec.concurrency_limit = Some(1);
        let repo = cluster.insert_repository(repo);

        cluster.insert_pipeline_run(managed("pr1", keys::STATE_STARTED));
        let mut pr2 = managed("pr2", keys::STATE_QUEUED);
        pr2.spec_status = Some(SpecStatus::Pending);
        cluster.insert_pipeline_run(pr2);

        let queues = Arc::new(QueueManager::new());
        queues
            .add_list_to_running_queue(&repo, &["ns/pr1".to_string(), "ns/pr2".to_string()])
            .unwrap();

        let (work, rx) = WorkQueue::new(8);
        let app = router(AppState {
            cluster: cluster.clone(),
            queues: queues.clone(),
            work,
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), cluster, queues, rx)
    }

    #[tokio::test]
    async fn test_queue_listing_and_lookup() {
        let (base, _cluster, _queues, _rx) = serve().await;
        let client = reqwest::Client::new();

        let health = client.get(format!("{}/health", base)).send().await.unwrap();
        assert_eq!(health.text().await.unwrap(), "ok");

        let queues: Value = client
            .get(format!("{}/queues", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(queues[0]["repository"], "ns/repo");
        assert_eq!(queues[0]["running"][0], "ns/pr1");
        assert_eq!(queues[0]["pending"][0], "ns/pr2");

        let queue = client
            .get(format!("{}/queues/ns/repo", base))
            .send()
            .await
            .unwrap();
        assert_eq!(queue.status(), reqwest::StatusCode::OK);

        let missing = client
            .get(format!("{}/queues/ns/other", base))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);

        let spec = client
            .get(format!("{}/openapi.json", base))
            .send()
            .await
            .unwrap();
        assert_eq!(spec.status(), reqwest::StatusCode::OK);
    }

    #[tokio::test]
    async fn test_validate_and_repair() {
        let (base, cluster, queues, mut rx) = serve().await;
        let client = reqwest::Client::new();
        cluster.remove_pipeline_run("ns", "pr1");

        let results: Value = client
            .get(format!("{}/queues/validate", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(results[0]["is_valid"], false);

        let repair: Value = client
            .post(format!("{}/queues/repair", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(repair["repaired"], 1);
        assert_eq!(repair["promoted"][0]["pipeline_run"], "ns/pr2");
        assert_eq!(queues.running_pipeline_runs("ns/repo"), vec!["ns/pr2"]);
        assert_eq!(
            rx.recv().await.unwrap(),
            Request::Reconcile("ns/pr2".to_string())
        );
    }
}
