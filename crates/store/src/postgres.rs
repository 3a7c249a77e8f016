//! PostgreSQL-backed record store.
//!
//! [`PgStore`] wraps a `PgPool`; the `news_items` table is created by the
//! migrations in `migrations/`. Inserts use `ON CONFLICT (url) DO NOTHING` so a
//! duplicate natural key is reported as [`StoreError::Conflict`] without
//! aborting the surrounding transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{PgExecutor, Postgres, Transaction};
use tracing::info;

use newswire_core::{NewRecord, Record, RecordId, RecordPatch};

use crate::error::StoreError;
use crate::traits::{RecordStore, RecordTx};

const COLUMNS: &str = "id, url, title, country, published_text, comments, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct RecordRow {
    id: i64,
    url: String,
    title: String,
    country: Option<String>,
    published_text: Option<String>,
    comments: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RecordRow> for Record {
    fn from(row: RecordRow) -> Self {
        Self {
            id: row.id,
            url: row.url,
            title: row.title,
            country: row.country,
            published_text: row.published_text,
            comments: row.comments.and_then(|c| u32::try_from(c).ok()),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

// ── Shared queries (pool or transaction) ─────────────────────────────

async fn find_by_url<'e, E: PgExecutor<'e>>(
    exec: E,
    url: &str,
) -> Result<Option<Record>, StoreError> {
    let row = sqlx::query_as::<_, RecordRow>(&format!(
        "SELECT {COLUMNS} FROM news_items WHERE url = $1"
    ))
    .bind(url)
    .fetch_optional(exec)
    .await?;
    Ok(row.map(Record::from))
}

async fn insert<'e, E: PgExecutor<'e>>(exec: E, new: NewRecord) -> Result<Record, StoreError> {
    let new = new.normalized()?;
    let row = sqlx::query_as::<_, RecordRow>(&format!(
        "INSERT INTO news_items (url, title, country, published_text, comments)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (url) DO NOTHING
         RETURNING {COLUMNS}"
    ))
    .bind(&new.url)
    .bind(&new.title)
    .bind(&new.country)
    .bind(&new.published_text)
    .bind(new.comments.map(i64::from))
    .fetch_optional(exec)
    .await?;

    row.map(Record::from).ok_or(StoreError::Conflict(new.url))
}

async fn update_fields<'e, E: PgExecutor<'e>>(
    exec: E,
    id: RecordId,
    patch: RecordPatch,
) -> Result<Record, StoreError> {
    let patch = patch.normalized()?;
    let result = sqlx::query_as::<_, RecordRow>(&format!(
        "UPDATE news_items SET
             url = COALESCE($2, url),
             title = COALESCE($3, title),
             country = COALESCE($4, country),
             published_text = COALESCE($5, published_text),
             comments = COALESCE($6, comments),
             updated_at = GREATEST(now(), updated_at)
         WHERE id = $1
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(&patch.url)
    .bind(&patch.title)
    .bind(&patch.country)
    .bind(&patch.published_text)
    .bind(patch.comments.map(i64::from))
    .fetch_optional(exec)
    .await;

    match result {
        Ok(Some(row)) => Ok(row.into()),
        Ok(None) => Err(StoreError::NotFound(id)),
        Err(e) => Err(map_unique_violation(e, patch.url.as_deref())),
    }
}

/// Translate a unique-constraint failure on `url` into a conflict.
fn map_unique_violation(e: sqlx::Error, url: Option<&str>) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.is_unique_violation() {
            return StoreError::Conflict(url.unwrap_or_default().to_string());
        }
    }
    StoreError::Database(e)
}

// ── Store ────────────────────────────────────────────────────────────

/// [`RecordStore`] over a PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect, then apply pending migrations.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        sqlx::migrate!("../../migrations").run(&pool).await?;
        info!("PostgreSQL connected, migrations applied");
        Ok(Self { pool })
    }

}

#[async_trait]
impl RecordStore for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<Record>, StoreError> {
        find_by_url(&self.pool, url).await
    }

    async fn find_by_id(&self, id: RecordId) -> Result<Option<Record>, StoreError> {
        let row = sqlx::query_as::<_, RecordRow>(&format!(
            "SELECT {COLUMNS} FROM news_items WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Record::from))
    }

    async fn insert(&self, new: NewRecord) -> Result<Record, StoreError> {
        insert(&self.pool, new).await
    }

    async fn update_fields(&self, id: RecordId, patch: RecordPatch) -> Result<Record, StoreError> {
        update_fields(&self.pool, id, patch).await
    }

    async fn delete(&self, id: RecordId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM news_items WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Record>, StoreError> {
        let rows = sqlx::query_as::<_, RecordRow>(&format!(
            "SELECT {COLUMNS} FROM news_items ORDER BY id DESC LIMIT $1 OFFSET $2"
        ))
        .bind(limit.max(0))
        .bind(offset.max(0))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Record::from).collect())
    }

    async fn count(&self) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM news_items")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("PostgreSQL pool closed");
    }

    async fn begin(&self) -> Result<Box<dyn RecordTx>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }
}

struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl RecordTx for PgTx {
    async fn find_by_url(&mut self, url: &str) -> Result<Option<Record>, StoreError> {
        find_by_url(&mut *self.tx, url).await
    }

    async fn insert(&mut self, new: NewRecord) -> Result<Record, StoreError> {
        insert(&mut *self.tx, new).await
    }

    async fn update_fields(
        &mut self,
        id: RecordId,
        patch: RecordPatch,
    ) -> Result<Record, StoreError> {
        update_fields(&mut *self.tx, id, patch).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}
