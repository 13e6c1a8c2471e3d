//! Run/checkpoint persistence (§4.10, §6 schema). One row per completed or
//! partial run; TTL cleanup and an optional count-cap LRU eviction keep the
//! table bounded.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;
use sqlx::FromRow;

use crate::domain::{Checkpoint, Frame};
use crate::error::Result;

#[derive(Debug, FromRow)]
struct CheckpointRow {
    checkpoint_id: String,
    query: String,
    frame_json: Option<String>,
    final_state_summary: String,
    created_at: String,
    completed_at: Option<String>,
    error_count: i64,
    partial: bool,
}

impl CheckpointRow {
    fn into_checkpoint(self) -> Result<Checkpoint> {
        let frame: Option<Frame> = match self.frame_json {
            Some(json) => Some(serde_json::from_str(&json)?),
            None => None,
        };
        Ok(Checkpoint {
            checkpoint_id: self.checkpoint_id,
            query: self.query,
            frame,
            final_state_summary: serde_json::from_str(&self.final_state_summary)?,
            created_at: DateTime::parse_from_rfc3339(&self.created_at)
                .unwrap_or_default()
                .with_timezone(&Utc),
            completed_at: self
                .completed_at
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|d| d.with_timezone(&Utc)),
            error_count: self.error_count as usize,
            partial: self.partial,
        })
    }
}

/// One row of `run_metrics` (§6): the aggregate stats for a completed run,
/// keyed back to its checkpoint. Written once, on completion, alongside the
/// checkpoint itself.
#[derive(Debug, Clone)]
pub struct RunMetrics {
    pub checkpoint_id: String,
    pub intent: Option<String>,
    pub total_latency_ms: u64,
    pub node_latencies: serde_json::Value,
    pub cache_hit_rate: f64,
    pub item_count: usize,
    pub success: bool,
    pub created_at: DateTime<Utc>,
}

pub struct CheckpointStore {
    pool: SqlitePool,
}

impl CheckpointStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS runs (
                checkpoint_id TEXT PRIMARY KEY,
                query TEXT NOT NULL,
                frame_json TEXT,
                final_state_summary TEXT NOT NULL,
                created_at TEXT NOT NULL,
                completed_at TEXT,
                error_count INTEGER NOT NULL DEFAULT 0,
                partial BOOLEAN NOT NULL DEFAULT 0
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS run_metrics (
                checkpoint_id TEXT NOT NULL REFERENCES runs(checkpoint_id),
                intent TEXT,
                total_latency_ms INTEGER NOT NULL,
                node_latencies_json TEXT NOT NULL,
                cache_hit_rate REAL NOT NULL,
                item_count INTEGER NOT NULL,
                success BOOLEAN NOT NULL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Persist one `run_metrics` row. Called once per run, alongside
    /// [`CheckpointStore::save`].
    pub async fn save_metrics(&self, metrics: &RunMetrics) -> Result<()> {
        let node_latencies_json = serde_json::to_string(&metrics.node_latencies)?;
        sqlx::query(
            "INSERT INTO run_metrics
                (checkpoint_id, intent, total_latency_ms, node_latencies_json, cache_hit_rate, item_count, success, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&metrics.checkpoint_id)
        .bind(&metrics.intent)
        .bind(metrics.total_latency_ms as i64)
        .bind(node_latencies_json)
        .bind(metrics.cache_hit_rate)
        .bind(metrics.item_count as i64)
        .bind(metrics.success)
        .bind(metrics.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let frame_json = checkpoint
            .frame
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let summary_json = serde_json::to_string(&checkpoint.final_state_summary)?;

        sqlx::query(
            "INSERT OR REPLACE INTO runs
                (checkpoint_id, query, frame_json, final_state_summary, created_at, completed_at, error_count, partial)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&checkpoint.checkpoint_id)
        .bind(&checkpoint.query)
        .bind(&frame_json)
        .bind(&summary_json)
        .bind(checkpoint.created_at.to_rfc3339())
        .bind(checkpoint.completed_at.map(|d| d.to_rfc3339()))
        .bind(checkpoint.error_count as i64)
        .bind(checkpoint.partial)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, checkpoint_id: &str) -> Result<Option<Checkpoint>> {
        let row = sqlx::query_as::<_, CheckpointRow>("SELECT * FROM runs WHERE checkpoint_id = ?")
            .bind(checkpoint_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(CheckpointRow::into_checkpoint).transpose()
    }

    /// Delete every row older than `max_age`, measured from `now`. Returns
    /// the number of rows removed.
    pub async fn cleanup_older_than(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> Result<u64> {
        let cutoff = (now - max_age).to_rfc3339();
        let result = sqlx::query("DELETE FROM runs WHERE created_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// If more than `max_rows` checkpoints exist, evict the oldest (by
    /// `created_at`) until the table is back within the cap.
    pub async fn enforce_count_cap(&self, max_rows: i64) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM runs WHERE checkpoint_id IN (
                SELECT checkpoint_id FROM runs ORDER BY created_at ASC
                LIMIT MAX(0, (SELECT COUNT(*) FROM runs) - ?)
            )",
        )
        .bind(max_rows)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Frame;
    use serde_json::json;

    async fn store() -> CheckpointStore {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let store = CheckpointStore::new(pool);
        store.migrate().await.unwrap();
        store
    }

    fn checkpoint(id: &str, created_at: DateTime<Utc>) -> Checkpoint {
        Checkpoint {
            checkpoint_id: id.to_string(),
            query: "glp-1 agonists".into(),
            frame: Some(Frame::fallback("glp-1 agonists")),
            final_state_summary: json!({"items": 3}),
            created_at,
            completed_at: Some(created_at),
            error_count: 0,
            partial: false,
        }
    }

    #[tokio::test]
    async fn save_then_get_round_trips() {
        let store = store().await;
        let cp = checkpoint("20260101_000000_abcdef123456", Utc::now());
        store.save(&cp).await.unwrap();
        let fetched = store.get(&cp.checkpoint_id).await.unwrap().unwrap();
        assert_eq!(fetched.checkpoint_id, cp.checkpoint_id);
        assert_eq!(fetched.query, cp.query);
    }

    #[tokio::test]
    async fn get_missing_checkpoint_returns_none() {
        let store = store().await;
        assert!(store.get("does-not-exist").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cleanup_removes_rows_older_than_max_age() {
        let store = store().await;
        let old = checkpoint("old_000000_abcdef123456", Utc::now() - chrono::Duration::days(10));
        let recent = checkpoint("new_000000_abcdef123456", Utc::now());
        store.save(&old).await.unwrap();
        store.save(&recent).await.unwrap();

        let removed = store
            .cleanup_older_than(Utc::now(), chrono::Duration::days(7))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.get(&old.checkpoint_id).await.unwrap().is_none());
        assert!(store.get(&recent.checkpoint_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn count_cap_evicts_the_oldest_first() {
        let store = store().await;
        for i in 0..5 {
            let cp = checkpoint(
                &format!("cp{i}_000000_abcdef123456"),
                Utc::now() - chrono::Duration::seconds(5 - i),
            );
            store.save(&cp).await.unwrap();
        }
        let removed = store.enforce_count_cap(3).await.unwrap();
        assert_eq!(removed, 2);
        assert!(store.get("cp0_000000_abcdef123456").await.unwrap().is_none());
        assert!(store.get("cp4_000000_abcdef123456").await.unwrap().is_some());
    }
}
