use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Version string every action of the HTTP API is registered under.
pub const API_VERSION: &str = "2021-12-23";

/// Emoji reaction name → tally.
pub type EmojiFeedbacks = BTreeMap<String, u64>;

// ---------------------------------------------------------------------------
// SecretBox
// ---------------------------------------------------------------------------

/// An anonymous message box as returned over the API.
///
/// The store additionally keeps the append-only log of view timestamps; that
/// log never leaves the store.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SecretBox {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub body: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub emoji_feedbacks: EmojiFeedbacks,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_viewed: Option<DateTime<Utc>>,
}

impl SecretBox {
    /// A freshly created box. Creation counts as the first view so the box
    /// enters the retrieval pool immediately.
    pub fn new(id: impl Into<String>, body: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            created_at: Some(now),
            body: body.into(),
            emoji_feedbacks: EmojiFeedbacks::new(),
            last_viewed: Some(now),
        }
    }
}

// ---------------------------------------------------------------------------
// Queue items
// ---------------------------------------------------------------------------

/// An `(id, score)` pair tracked by the retrieval queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueueItem {
    pub id: String,
    pub score: i64,
}

impl QueueItem {
    pub fn new(id: impl Into<String>, score: i64) -> Self {
        Self {
            id: id.into(),
            score,
        }
    }
}

impl PartialEq for QueueItem {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for QueueItem {}

/// A box the store knows has been viewed at least once.
#[derive(Debug, Clone, PartialEq)]
pub struct ServedItem {
    pub id: String,
    pub last_viewed_at: DateTime<Utc>,
}

impl From<ServedItem> for QueueItem {
    fn from(item: ServedItem) -> Self {
        QueueItem::new(item.id, score_of(item.last_viewed_at))
    }
}

/// Queue score for a view timestamp: Unix nanoseconds, saturating outside
/// the representable range.
pub fn score_of(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_nanos_opt().unwrap_or_else(|| {
        if ts.timestamp() < 0 {
            i64::MIN
        } else {
            i64::MAX
        }
    })
}

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateBoxRequest {
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AddBoxEmoji {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub emoji_feedbacks: EmojiFeedbacks,
}

pub type SyncRequest = QueueItem;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncResponse {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DequeueResponse {
    pub id: String,
}
