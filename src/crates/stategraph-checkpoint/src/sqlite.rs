//! SQLite checkpoint storage
//!
//! [`SqliteCheckpointSaver`] persists checkpoints in an append-only table whose
//! primary key is `(thread_id, step)`. An insert only succeeds when no row of the
//! same thread has a step greater than or equal to the new one, so a stale or
//! duplicate writer can never reorder or overwrite a thread's history.
//!
//! ```text
//! checkpoints
//! ┌───────────┬──────┬───────────────┬────────────┬───────────┬──────────┬────────────┐
//! │ thread_id │ step │ checkpoint_id │ values     │ next_node │ metadata │ created_at │
//! ├───────────┼──────┼───────────────┼────────────┼───────────┼──────────┼────────────┤
//! │ t1        │ 1    │ 9b2c…         │ {"messa…"} │ evaluator │ {…}      │ 2026-…     │
//! │ t1        │ 2    │ 41fe…         │ {"messa…"} │ NULL      │ {…}      │ 2026-…     │
//! └───────────┴──────┴───────────────┴────────────┴───────────┴──────────┴────────────┘
//! ```

use crate::{
    checkpoint::{ChannelValues, Checkpoint, CheckpointMetadata, ThreadId},
    error::{CheckpointError, Result},
    traits::CheckpointSaver,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::collections::BTreeSet;
use std::str::FromStr;

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS checkpoints (
    thread_id TEXT NOT NULL,
    step INTEGER NOT NULL,
    checkpoint_id TEXT NOT NULL,
    version INTEGER NOT NULL,
    channel_values TEXT NOT NULL,
    next_node TEXT,
    metadata TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (thread_id, step)
)
"#;

const SELECT_COLUMNS: &str =
    "SELECT thread_id, step, checkpoint_id, version, channel_values, next_node, metadata, created_at FROM checkpoints";

/// Durable checkpoint saver backed by SQLite
#[derive(Debug, Clone)]
pub struct SqliteCheckpointSaver {
    pool: SqlitePool,
}

impl SqliteCheckpointSaver {
    /// Connect to a database and create the checkpoint table if needed
    ///
    /// # Arguments
    /// * `database_url` - SQLite connection string (e.g. "sqlite:memory.db" or "sqlite::memory:")
    pub async fn connect(database_url: &str) -> Result<Self> {
        let in_memory = database_url.contains(":memory:");
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        // An in-memory database lives and dies with its connection
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options.connect_with(options).await?;
        Self::from_pool(pool).await
    }

    /// Wrap an existing pool and create the checkpoint table if needed
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::query(CREATE_TABLE).execute(&pool).await?;
        tracing::debug!("Checkpoint table ready");
        Ok(Self { pool })
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn row_to_checkpoint(row: &SqliteRow) -> Result<Checkpoint> {
        let step: i64 = row.try_get("step")?;
        let values: String = row.try_get("channel_values")?;
        let metadata: String = row.try_get("metadata")?;
        let created_at: String = row.try_get("created_at")?;

        let values: ChannelValues = serde_json::from_str(&values)?;
        let metadata: CheckpointMetadata = serde_json::from_str(&metadata)?;
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| CheckpointError::Invalid(format!("bad created_at: {}", e)))?
            .with_timezone(&Utc);

        Ok(Checkpoint {
            v: row.try_get("version")?,
            id: row.try_get("checkpoint_id")?,
            thread_id: row.try_get("thread_id")?,
            step: step_from_db(step)?,
            values,
            next_node: row.try_get("next_node")?,
            metadata,
            created_at,
        })
    }

    async fn latest_step(&self, thread_id: &str) -> Result<u64> {
        let (max,): (Option<i64>,) =
            sqlx::query_as("SELECT MAX(step) FROM checkpoints WHERE thread_id = ?")
                .bind(thread_id)
                .fetch_one(&self.pool)
                .await?;
        max.map(step_from_db).transpose().map(|s| s.unwrap_or(0))
    }
}

fn step_to_db(step: u64) -> Result<i64> {
    i64::try_from(step).map_err(|_| CheckpointError::Invalid(format!("step {} out of range", step)))
}

fn step_from_db(step: i64) -> Result<u64> {
    u64::try_from(step).map_err(|_| CheckpointError::Invalid(format!("negative step {}", step)))
}

#[async_trait]
impl CheckpointSaver for SqliteCheckpointSaver {
    async fn put(&self, checkpoint: Checkpoint) -> Result<()> {
        if checkpoint.thread_id.is_empty() {
            return Err(CheckpointError::Invalid("thread_id is required".to_string()));
        }

        let step = step_to_db(checkpoint.step)?;
        let values = serde_json::to_string(&checkpoint.values)?;
        let metadata = serde_json::to_string(&checkpoint.metadata)?;

        // Insert only if it extends the thread's history
        let result = sqlx::query(
            "INSERT INTO checkpoints (thread_id, step, checkpoint_id, version, channel_values, next_node, metadata, created_at)
             SELECT ?, ?, ?, ?, ?, ?, ?, ?
             WHERE NOT EXISTS (SELECT 1 FROM checkpoints WHERE thread_id = ? AND step >= ?)",
        )
        .bind(&checkpoint.thread_id)
        .bind(step)
        .bind(&checkpoint.id)
        .bind(checkpoint.v)
        .bind(&values)
        .bind(&checkpoint.next_node)
        .bind(&metadata)
        .bind(checkpoint.created_at.to_rfc3339())
        .bind(&checkpoint.thread_id)
        .bind(step)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let latest = self.latest_step(&checkpoint.thread_id).await?;
            return Err(CheckpointError::step_conflict(
                checkpoint.thread_id,
                checkpoint.step,
                latest,
            ));
        }

        tracing::trace!(thread_id = %checkpoint.thread_id, step = checkpoint.step, "Stored checkpoint");
        Ok(())
    }

    async fn get_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        let row = sqlx::query(&format!(
            "{} WHERE thread_id = ? ORDER BY step DESC LIMIT 1",
            SELECT_COLUMNS
        ))
        .bind(thread_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_checkpoint).transpose()
    }

    async fn get(&self, thread_id: &str, step: u64) -> Result<Option<Checkpoint>> {
        let row = sqlx::query(&format!("{} WHERE thread_id = ? AND step = ?", SELECT_COLUMNS))
            .bind(thread_id)
            .bind(step_to_db(step)?)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_checkpoint).transpose()
    }

    async fn list_threads(&self) -> Result<BTreeSet<ThreadId>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT DISTINCT thread_id FROM checkpoints")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(thread_id,)| thread_id).collect())
    }

    async fn get_history(&self, thread_id: &str) -> Result<Vec<Checkpoint>> {
        let rows = sqlx::query(&format!(
            "{} WHERE thread_id = ? ORDER BY step ASC",
            SELECT_COLUMNS
        ))
        .bind(thread_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_checkpoint).collect()
    }}
