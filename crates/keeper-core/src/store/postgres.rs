//! PostgreSQL-backed box store.
//!
//! # Table design
//!
//! One `boxes` row per box. Emoji tallies live in a JSONB object so a new
//! emoji needs no schema change, and the view history is an append-only
//! `TIMESTAMPTZ[]` next to the `last_viewed` scalar the queue scores on.

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::Row;

use super::BoxStore;
use crate::config::StoreConfig;
use crate::error::{KeeperError, Result};
use crate::models::{EmojiFeedbacks, SecretBox, ServedItem};

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

const LIST_SERVED: &str = "SELECT id, last_viewed FROM boxes WHERE last_viewed IS NOT NULL";

const RECORD_VIEW: &str =
    "UPDATE boxes SET viewed = array_append(viewed, $2), last_viewed = $2 WHERE id = $1";

const INSERT_BOX: &str = "INSERT INTO boxes (id, created_at, body, emoji_feedbacks, last_viewed, viewed) \
     VALUES ($1, $2, $3, $4, $5, $6)";

const INCREMENT_EMOJI: &str = "UPDATE boxes SET emoji_feedbacks = jsonb_set(\
         emoji_feedbacks, ARRAY[$2::text], \
         to_jsonb(COALESCE((emoji_feedbacks ->> $2::text)::bigint, 0) + $3)) \
     WHERE id = $1";

const GET_BOX: &str =
    "SELECT id, created_at, body, emoji_feedbacks, last_viewed FROM boxes WHERE id = $1";

/// Connection errors mean the database could not be reached; everything
/// else is a query failure.
fn map_sqlx(err: sqlx::Error) -> KeeperError {
    match &err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => KeeperError::StoreUnavailable(err.to_string()),
        _ => KeeperError::Store(err.to_string()),
    }
}

// ---------------------------------------------------------------------------
// PgStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect a pool to `url` using the limits from `config`.
    pub async fn connect(url: &str, config: &StoreConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout())
            .connect(url)
            .await
            .map_err(map_sqlx)?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the embedded migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| KeeperError::Store(format!("migration failed: {e}")))
    }

    async fn list_served(&self) -> Result<Vec<ServedItem>> {
        let rows = sqlx::query(LIST_SERVED)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;
        rows.iter()
            .map(|row| {
                Ok(ServedItem {
                    id: row.try_get("id")?,
                    last_viewed_at: row.try_get("last_viewed")?,
                })
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()
            .map_err(map_sqlx)
    }

    async fn view(&self, id: &str, viewed_at: DateTime<Utc>) -> Result<()> {
        let done = sqlx::query(RECORD_VIEW)
            .bind(id)
            .bind(viewed_at)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        if done.rows_affected() == 0 {
            return Err(KeeperError::BoxNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn insert(&self, secret_box: &SecretBox) -> Result<()> {
        let viewed: Vec<DateTime<Utc>> = secret_box.last_viewed.into_iter().collect();
        sqlx::query(INSERT_BOX)
            .bind(&secret_box.id)
            .bind(secret_box.created_at.unwrap_or_else(Utc::now))
            .bind(&secret_box.body)
            .bind(Json(&secret_box.emoji_feedbacks))
            .bind(secret_box.last_viewed)
            .bind(viewed)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    async fn increment(&self, id: &str, increments: &EmojiFeedbacks) -> Result<()> {
        if increments.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;
        for (emoji, by) in increments {
            let by = i64::try_from(*by).unwrap_or(i64::MAX);
            let done = sqlx::query(INCREMENT_EMOJI)
                .bind(id)
                .bind(emoji)
                .bind(by)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx)?;
            if done.rows_affected() == 0 {
                return Err(KeeperError::BoxNotFound(id.to_string()));
            }
        }
        tx.commit().await.map_err(map_sqlx)
    }

    async fn fetch(&self, id: &str) -> Result<SecretBox> {
        let row = sqlx::query(GET_BOX)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?
            .ok_or_else(|| KeeperError::BoxNotFound(id.to_string()))?;
        let decode = || -> std::result::Result<SecretBox, sqlx::Error> {
            let Json(emoji_feedbacks): Json<EmojiFeedbacks> = row.try_get("emoji_feedbacks")?;
            Ok(SecretBox {
                id: row.try_get("id")?,
                created_at: row.try_get("created_at")?,
                body: row.try_get("body")?,
                emoji_feedbacks,
                last_viewed: row.try_get("last_viewed")?,
            })
        };
        decode().map_err(map_sqlx)
    }
}

impl BoxStore for PgStore {
    fn list_served_items(&self) -> BoxFuture<'_, Result<Vec<ServedItem>>> {
        self.list_served().boxed()
    }

    fn record_view<'a>(
        &'a self,
        id: &'a str,
        viewed_at: DateTime<Utc>,
    ) -> BoxFuture<'a, Result<()>> {
        self.view(id, viewed_at).boxed()
    }

    fn insert_box<'a>(&'a self, secret_box: &'a SecretBox) -> BoxFuture<'a, Result<()>> {
        self.insert(secret_box).boxed()
    }

    fn add_emoji<'a>(
        &'a self,
        id: &'a str,
        increments: &'a EmojiFeedbacks,
    ) -> BoxFuture<'a, Result<()>> {
        self.increment(id, increments).boxed()
    }

    fn get_box<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<SecretBox>> {
        self.fetch(id).boxed()
    }
}
