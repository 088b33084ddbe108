//! HTTP surface: job submission, job lookup and the per-job progress stream.

pub mod error;
pub mod events;
pub mod jobs;
pub mod status;

use std::{sync::Arc, time::Duration};

use axum::{
    http::Method,
    routing::{get, post},
    Router,
};
use job_datastore::DataStore;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{processor::Pipeline, registry::JobRegistry};

pub use status::BackendStatus;

pub struct AppState<P, D> {
    pub registry: Arc<JobRegistry>,
    pub pipeline: Arc<P>,
    pub store: Arc<D>,
    pub backend_status: Arc<BackendStatus>,
    /// Upper bound on how long a single event stream stays open
    pub sse_max_lifetime: Duration,
    pub shutdown: CancellationToken,
}

impl<P, D> Clone for AppState<P, D> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            pipeline: Arc::clone(&self.pipeline),
            store: Arc::clone(&self.store),
            backend_status: Arc::clone(&self.backend_status),
            sse_max_lifetime: self.sse_max_lifetime,
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<P, D> AppState<P, D> {
    pub const DEFAULT_SSE_MAX_LIFETIME: Duration = Duration::from_secs(2 * 60 * 60);
}

pub fn create_router<P, D>(state: AppState<P, D>) -> Router
where
    P: Pipeline,
    D: DataStore + Send + Sync + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST]);

    let api_routes: Router<AppState<P, D>> = Router::new()
        .route("/jobs", post(jobs::create_job::<P, D>).get(jobs::list_jobs::<P, D>))
        .route("/jobs/{job_id}", get(jobs::get_job::<P, D>))
        .route("/jobs/{job_id}/events", get(events::job_events::<P, D>))
        .route("/metadata", post(jobs::preview_metadata::<P, D>))
        .route("/status", get(jobs::backend_status::<P, D>));

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serves `router` until `shutdown` is cancelled.
pub async fn serve(
    listener: tokio::net::TcpListener,
    router: Router,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "Server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}
