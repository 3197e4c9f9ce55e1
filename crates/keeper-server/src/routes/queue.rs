use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use keeper_core::models::{DequeueResponse, SyncRequest, SyncResponse, API_VERSION};

use crate::action::{json_body, respond, to_value, ActionQuery};
use crate::error::AppError;
use crate::state::QueueAppState;

/// `/` on the queue service: `Sync` and `Dequeue`.
pub async fn dispatch(
    State(app): State<QueueAppState>,
    query: Result<Query<ActionQuery>, QueryRejection>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Ok(Query(query)) = query else {
        return respond::<()>(&ActionQuery::default(), Err(AppError::malformed("Query")));
    };
    let outcome = match (query.action(), query.version()) {
        ("Sync", API_VERSION) => json_body(&headers, &body)
            .and_then(|item| sync(&app, item))
            .and_then(to_value),
        ("Dequeue", API_VERSION) => dequeue(&app).await.and_then(to_value),
        _ => Err(query.unsupported()),
    };
    respond(&query, outcome)
}

/// POST /?Action=Sync: hand a score update to the queue.
///
/// Succeeds for any item with an id; the queue may still drop it.
fn sync(app: &QueueAppState, item: SyncRequest) -> Result<SyncResponse, AppError> {
    if item.id.is_empty() {
        return Err(AppError::malformed("Id"));
    }
    let id = item.id.clone();
    if !app.queue.submit(item) {
        tracing::debug!(id = %id, "sync item not buffered");
    }
    Ok(SyncResponse {})
}

/// POST /?Action=Dequeue: the next box to serve.
async fn dequeue(app: &QueueAppState) -> Result<DequeueResponse, AppError> {
    let id = app.queue.retrieve_next_within(app.dequeue_timeout).await?;
    tracing::debug!(id = %id, "dequeued");
    Ok(DequeueResponse { id })
}
