pub mod action;
pub mod client;
pub mod error;
pub mod routes;
pub mod state;
pub mod telemetry;

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::any;
use axum::Router;
use keeper_core::config::HttpConfig;
use keeper_core::store::BoxStore;
use keeper_core::Queue;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub use client::{ClientError, QueueClient, QueueHandle};
pub use telemetry::{build_telemetry_router, HealthChecks};

/// Router of the queue service. Used by `serve()` and by integration tests.
pub fn build_queue_router(queue: Queue, http: &HttpConfig) -> Router {
    let app_state = state::QueueAppState::new(queue, http);
    with_layers(
        Router::new()
            .route("/", any(routes::queue::dispatch))
            .with_state(app_state),
        http,
    )
}

/// Router of the box service.
pub fn build_box_router(store: Arc<dyn BoxStore>, queue: QueueHandle, http: &HttpConfig) -> Router {
    let app_state = state::BoxAppState::new(store, queue, http);
    with_layers(
        Router::new()
            .route("/", any(routes::boxes::dispatch))
            .with_state(app_state),
        http,
    )
}

fn with_layers(router: Router, http: &HttpConfig) -> Router {
    router
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            http.request_timeout(),
        ))
        .layer(TraceLayer::new_for_http())
}

/// Serve `app` on a pre-bound listener until `cancel` fires.
///
/// In-flight requests get `grace` to finish once shutdown starts.
pub async fn serve(
    name: &str,
    listener: TcpListener,
    app: Router,
    cancel: CancellationToken,
    grace: Duration,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!("{name} listening on http://{addr}");

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(cancel.clone().cancelled_owned())
        .into_future();
    let deadline = async {
        cancel.cancelled().await;
        tokio::time::sleep(grace).await;
    };

    tokio::select! {
        res = server => res?,
        _ = deadline => tracing::warn!("{name} did not drain within {grace:?}, closing"),
    }
    tracing::info!("{name} stopped");
    Ok(())
}
