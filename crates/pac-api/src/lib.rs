mod queues;

use axum::Router;
use pac_cluster::Cluster;
use pac_reconciler::WorkQueue;
use pac_sync::QueueManager;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;
use utoipa_swagger_ui::SwaggerUi;

pub use queues::{PromotedRun, QueueResponse, RepairResponse, ValidationResponse};

#[derive(OpenApi)]
#[openapi(info(
    title = "Pipelines as Code Queue API",
    description = "Inspection of per-repository concurrency queues",
    license(name = "AGPL-3.0-or-later"),
))]
struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub cluster: Arc<dyn Cluster>,
    pub queues: Arc<QueueManager>,
    pub work: WorkQueue,
}

#[utoipa::path(get, path = "/health", responses((status = OK, body = str)))]
async fn health() -> &'static str {
    "ok"
}

pub fn router(state: AppState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .routes(utoipa_axum::routes!(health))
        .routes(utoipa_axum::routes!(queues::list_queues))
        .routes(utoipa_axum::routes!(queues::get_queue))
        .routes(utoipa_axum::routes!(queues::validate_queues))
        .routes(utoipa_axum::routes!(queues::repair_queues))
        .split_for_parts();

    router
        .with_state(state)
        .merge(SwaggerUi::new("/swagger-ui").url("/openapi.json", api))
        .layer(TraceLayer::new_for_http())
}
