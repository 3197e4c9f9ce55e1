use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use futures::future::{self, BoxFuture, FutureExt};

use super::BoxStore;
use crate::error::{KeeperError, Result};
use crate::models::{EmojiFeedbacks, SecretBox, ServedItem};

#[derive(Debug, Clone)]
struct StoredBox {
    secret_box: SecretBox,
    viewed: Vec<DateTime<Utc>>,
}

/// In-process store backed by a mutex-guarded map.
///
/// Used when no database is configured and throughout the test suites.
/// [`MemoryStore::set_offline`] makes every call fail with
/// `StoreUnavailable`, which stands in for a database outage.
#[derive(Debug, Default)]
pub struct MemoryStore {
    boxes: Mutex<HashMap<String, StoredBox>>,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// The full view log of `id`, oldest first.
    pub fn views(&self, id: &str) -> Option<Vec<DateTime<Utc>>> {
        self.lock().ok()?.get(id).map(|b| b.viewed.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().map(|boxes| boxes.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove `id` as if another writer deleted it.
    pub fn delete(&self, id: &str) -> bool {
        self.lock()
            .map(|mut boxes| boxes.remove(id).is_some())
            .unwrap_or(false)
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, StoredBox>>> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(KeeperError::StoreUnavailable("memory store is offline".into()));
        }
        self.boxes
            .lock()
            .map_err(|_| KeeperError::Store("memory store lock poisoned".into()))
    }

    fn list_sync(&self) -> Result<Vec<ServedItem>> {
        let boxes = self.lock()?;
        Ok(boxes
            .values()
            .filter_map(|b| {
                b.secret_box.last_viewed.map(|last_viewed_at| ServedItem {
                    id: b.secret_box.id.clone(),
                    last_viewed_at,
                })
            })
            .collect())
    }

    fn record_view_sync(&self, id: &str, viewed_at: DateTime<Utc>) -> Result<()> {
        let mut boxes = self.lock()?;
        let stored = boxes
            .get_mut(id)
            .ok_or_else(|| KeeperError::BoxNotFound(id.to_string()))?;
        stored.viewed.push(viewed_at);
        stored.secret_box.last_viewed = Some(viewed_at);
        Ok(())
    }

    fn insert_sync(&self, secret_box: &SecretBox) -> Result<()> {
        let mut boxes = self.lock()?;
        if boxes.contains_key(&secret_box.id) {
            return Err(KeeperError::Store(format!(
                "duplicate box id: {}",
                secret_box.id
            )));
        }
        boxes.insert(
            secret_box.id.clone(),
            StoredBox {
                secret_box: secret_box.clone(),
                viewed: secret_box.last_viewed.into_iter().collect(),
            },
        );
        Ok(())
    }

    fn add_emoji_sync(&self, id: &str, increments: &EmojiFeedbacks) -> Result<()> {
        let mut boxes = self.lock()?;
        let stored = boxes
            .get_mut(id)
            .ok_or_else(|| KeeperError::BoxNotFound(id.to_string()))?;
        for (emoji, by) in increments {
            let tally = stored
                .secret_box
                .emoji_feedbacks
                .entry(emoji.clone())
                .or_insert(0);
            *tally = tally.saturating_add(*by);
        }
        Ok(())
    }

    fn get_sync(&self, id: &str) -> Result<SecretBox> {
        self.lock()?
            .get(id)
            .map(|b| b.secret_box.clone())
            .ok_or_else(|| KeeperError::BoxNotFound(id.to_string()))
    }
}

impl BoxStore for MemoryStore {
    fn list_served_items(&self) -> BoxFuture<'_, Result<Vec<ServedItem>>> {
        future::ready(self.list_sync()).boxed()
    }

    fn record_view<'a>(
        &'a self,
        id: &'a str,
        viewed_at: DateTime<Utc>,
    ) -> BoxFuture<'a, Result<()>> {
        future::ready(self.record_view_sync(id, viewed_at)).boxed()
    }

    fn insert_box<'a>(&'a self, secret_box: &'a SecretBox) -> BoxFuture<'a, Result<()>> {
        future::ready(self.insert_sync(secret_box)).boxed()
    }

    fn add_emoji<'a>(
        &'a self,
        id: &'a str,
        increments: &'a EmojiFeedbacks,
    ) -> BoxFuture<'a, Result<()>> {
        future::ready(self.add_emoji_sync(id, increments)).boxed()
    }

    fn get_box<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<SecretBox>> {
        future::ready(self.get_sync(id)).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn list_omits_boxes_without_views() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.insert_box(&SecretBox::new("seen", "a", now)).await.unwrap();
        let unseen = SecretBox {
            id: "unseen".into(),
            body: "b".into(),
            created_at: Some(now),
            ..Default::default()
        };
        store.insert_box(&unseen).await.unwrap();

        let served = store.list_served_items().await.unwrap();
        assert_eq!(served.len(), 1);
        assert_eq!(served[0].id, "seen");
        assert_eq!(served[0].last_viewed_at, now);
    }

    #[tokio::test]
    async fn record_view_appends_and_updates_last_viewed() {
        let store = MemoryStore::new();
        let created = Utc::now();
        store.insert_box(&SecretBox::new("b", "x", created)).await.unwrap();

        let later = created + Duration::seconds(5);
        store.record_view("b", later).await.unwrap();

        assert_eq!(store.views("b").unwrap(), vec![created, later]);
        let b = store.get_box("b").await.unwrap();
        assert_eq!(b.last_viewed, Some(later));
    }

    #[tokio::test]
    async fn record_view_on_missing_box_is_not_found() {
        let store = MemoryStore::new();
        let err = store.record_view("ghost", Utc::now()).await.unwrap_err();
        assert!(matches!(err, KeeperError::BoxNotFound(id) if id == "ghost"));
    }

    #[tokio::test]
    async fn add_emoji_accumulates() {
        let store = MemoryStore::new();
        store
            .insert_box(&SecretBox::new("b", "x", Utc::now()))
            .await
            .unwrap();
        let inc = EmojiFeedbacks::from([("heart".to_string(), 2), ("fire".to_string(), 1)]);
        store.add_emoji("b", &inc).await.unwrap();
        store.add_emoji("b", &inc).await.unwrap();

        let b = store.get_box("b").await.unwrap();
        assert_eq!(b.emoji_feedbacks.get("heart"), Some(&4));
        assert_eq!(b.emoji_feedbacks.get("fire"), Some(&2));
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected() {
        let store = MemoryStore::new();
        let b = SecretBox::new("b", "x", Utc::now());
        store.insert_box(&b).await.unwrap();
        assert!(matches!(
            store.insert_box(&b).await.unwrap_err(),
            KeeperError::Store(_)
        ));
    }

    #[tokio::test]
    async fn offline_store_is_unavailable() {
        let store = MemoryStore::new();
        store.set_offline(true);
        assert!(matches!(
            store.list_served_items().await.unwrap_err(),
            KeeperError::StoreUnavailable(_)
        ));
        store.set_offline(false);
        assert!(store.list_served_items().await.unwrap().is_empty());
    }
}
