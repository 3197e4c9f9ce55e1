use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use chrono::Utc;
use keeper_core::models::{
    score_of, AddBoxEmoji, CreateBoxRequest, QueueItem, SecretBox, API_VERSION,
};
use uuid::Uuid;

use crate::action::{json_body, respond, to_value, ActionQuery};
use crate::error::AppError;
use crate::state::BoxAppState;

/// `/` on the box service: `CreateBox`, `AddBoxEmoji` and `ViewBox`.
pub async fn dispatch(
    State(app): State<BoxAppState>,
    query: Result<Query<ActionQuery>, QueryRejection>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Ok(Query(query)) = query else {
        return respond::<()>(&ActionQuery::default(), Err(AppError::malformed("Query")));
    };
    let outcome = match (query.action(), query.version()) {
        ("CreateBox", API_VERSION) => match json_body(&headers, &body) {
            Ok(req) => create_box(&app, req).await.and_then(to_value),
            Err(e) => Err(e),
        },
        ("AddBoxEmoji", API_VERSION) => match json_body(&headers, &body) {
            Ok(req) => add_box_emoji(&app, req).await.and_then(to_value),
            Err(e) => Err(e),
        },
        ("ViewBox", API_VERSION) => view_box(&app).await.and_then(to_value),
        _ => Err(query.unsupported()),
    };
    respond(&query, outcome)
}

/// POST /?Action=CreateBox: store a new box and tell the queue about it.
///
/// The queue update runs in the background and its failure is only logged;
/// the next queue rebuild picks the box up regardless.
async fn create_box(app: &BoxAppState, req: CreateBoxRequest) -> Result<SecretBox, AppError> {
    let now = Utc::now();
    let secret_box = SecretBox::new(Uuid::new_v4().to_string(), req.body, now);
    app.store.insert_box(&secret_box).await?;
    tracing::info!(id = %secret_box.id, "box created");

    let queue = app.queue.clone();
    let item = QueueItem::new(secret_box.id.clone(), score_of(now));
    tokio::spawn(async move {
        let id = item.id.clone();
        if let Err(e) = queue.sync(item).await {
            tracing::error!(id = %id, error = %e, "failed to sync created box");
        }
    });

    Ok(secret_box)
}

/// POST /?Action=AddBoxEmoji: add reaction tallies and return the totals.
async fn add_box_emoji(app: &BoxAppState, req: AddBoxEmoji) -> Result<AddBoxEmoji, AppError> {
    if req.id.is_empty() {
        return Err(AppError::malformed("Id"));
    }
    if !req.emoji_feedbacks.is_empty() {
        app.store.add_emoji(&req.id, &req.emoji_feedbacks).await?;
    }
    let secret_box = app.store.get_box(&req.id).await?;
    Ok(AddBoxEmoji {
        id: req.id,
        emoji_feedbacks: secret_box.emoji_feedbacks,
    })
}

/// POST /?Action=ViewBox: serve the box the queue picks.
async fn view_box(app: &BoxAppState) -> Result<SecretBox, AppError> {
    let id = app.queue.dequeue(app.dequeue_timeout).await?;
    Ok(app.store.get_box(&id).await?)
}
