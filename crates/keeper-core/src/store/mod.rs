//! Backing store boundary.
//!
//! The queue only needs [`BoxStore::list_served_items`] and
//! [`BoxStore::record_view`]; the box service uses the rest. Implementations
//! must be safe to share between concurrent callers.

pub mod memory;
pub mod postgres;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;

use crate::error::Result;
use crate::models::{EmojiFeedbacks, SecretBox, ServedItem};

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub trait BoxStore: Send + Sync {
    /// Every box with at least one recorded view. Boxes never viewed are
    /// omitted.
    fn list_served_items(&self) -> BoxFuture<'_, Result<Vec<ServedItem>>>;

    /// Append `viewed_at` to the view log of `id` and make it the box's
    /// last-viewed time. Fails with `BoxNotFound` when `id` does not exist.
    fn record_view<'a>(&'a self, id: &'a str, viewed_at: DateTime<Utc>)
        -> BoxFuture<'a, Result<()>>;

    /// Persist a new box. Its `last_viewed`, when set, is also recorded as
    /// the first entry of the view log.
    fn insert_box<'a>(&'a self, secret_box: &'a SecretBox) -> BoxFuture<'a, Result<()>>;

    /// Add `increments` to the box's emoji tallies.
    fn add_emoji<'a>(
        &'a self,
        id: &'a str,
        increments: &'a EmojiFeedbacks,
    ) -> BoxFuture<'a, Result<()>>;

    fn get_box<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<SecretBox>>;
}
