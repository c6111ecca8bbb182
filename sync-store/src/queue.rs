//! The durable sync queue.
//!
//! An ordered log of pending outbound mutations, surviving process
//! restarts. The invariant: at most one *live* item per task id. A later
//! mutation supersedes a still-pending earlier one, absorbing its id into
//! `consolidated_from` and carrying the net-effect operation - queue
//! growth is bounded to one entry per dirty task regardless of edit
//! frequency.
//!
//! Queue operations are purely local; they can fail only on storage I/O,
//! never on network state.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;
use tracing::{debug, info};

use sync_core::consolidated_kind;
use sync_types::{OpKind, QueueItemId, TaskId, TaskRecord, VectorClock};

use crate::error::{StoreError, StoreResult};

/// One pending outbound mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueItem {
    /// Unique queue-item identifier.
    pub id: QueueItemId,
    /// Net-effect operation kind.
    pub op: OpKind,
    /// Target task.
    pub task_id: TaskId,
    /// Plaintext task snapshot at enqueue time; None for deletes.
    pub snapshot: Option<TaskRecord>,
    /// The task's vector clock at enqueue time.
    pub clock: VectorClock,
    /// When the (oldest superseded) mutation entered the queue.
    pub enqueued_at: DateTime<Utc>,
    /// Failed push attempts in the current streak.
    pub retry_count: u32,
    /// Ids of earlier items this one superseded, oldest first.
    pub consolidated_from: Vec<QueueItemId>,
}

/// Durable, ordered log of pending mutations.
#[derive(Clone)]
pub struct SyncQueue {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct QueueRow {
    item_id: String,
    task_id: String,
    op: String,
    snapshot: Option<String>,
    clock: String,
    enqueued_at: String,
    retry_count: i64,
    consolidated_from: String,
}

impl QueueRow {
    fn decode(self) -> StoreResult<QueueItem> {
        let corrupt = |reason: String| StoreError::Corrupt {
            id: self.item_id.clone(),
            reason,
        };

        let id = QueueItemId::parse(&self.item_id)
            .ok_or_else(|| corrupt("invalid item id".into()))?;
        let op = match self.op.as_str() {
            "create" => OpKind::Create,
            "update" => OpKind::Update,
            "delete" => OpKind::Delete,
            other => return Err(corrupt(format!("unknown op kind: {other}"))),
        };
        let snapshot = self
            .snapshot
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| corrupt(e.to_string()))?;
        let clock = serde_json::from_str(&self.clock).map_err(|e| corrupt(e.to_string()))?;
        let enqueued_at = DateTime::parse_from_rfc3339(&self.enqueued_at)
            .map_err(|e| corrupt(e.to_string()))?
            .with_timezone(&Utc);
        let consolidated_from: Vec<String> =
            serde_json::from_str(&self.consolidated_from).map_err(|e| corrupt(e.to_string()))?;
        let consolidated_from = consolidated_from
            .iter()
            .map(|s| QueueItemId::parse(s).ok_or_else(|| corrupt("invalid consolidated id".into())))
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(QueueItem {
            id,
            op,
            task_id: TaskId::from(self.task_id),
            snapshot,
            clock,
            enqueued_at,
            retry_count: self.retry_count.max(0) as u32,
            consolidated_from,
        })
    }
}

impl SyncQueue {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Enqueue a mutation for eventual propagation.
    ///
    /// If a live item for the task already exists it is superseded: the new
    /// item absorbs its id (and its chain), carries the consolidated
    /// net-effect operation, keeps its queue position, and inherits its
    /// retry count so a failure streak's counter never decreases.
    pub async fn enqueue(
        &self,
        op: OpKind,
        task_id: &TaskId,
        snapshot: Option<&TaskRecord>,
        clock: &VectorClock,
    ) -> StoreResult<QueueItem> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query_as::<_, QueueRow>(
            r#"
            SELECT item_id, task_id, op, snapshot, clock, enqueued_at,
                   retry_count, consolidated_from
            FROM queue WHERE task_id = ?1
            "#,
        )
        .bind(task_id.as_str())
        .fetch_optional(&mut *tx)
        .await?
        .map(QueueRow::decode)
        .transpose()?;

        let item = match existing {
            Some(old) => {
                sqlx::query("DELETE FROM queue WHERE item_id = ?1")
                    .bind(old.id.to_string())
                    .execute(&mut *tx)
                    .await?;

                let mut chain = old.consolidated_from;
                chain.push(old.id);
                debug!(task = %task_id, superseded = %chain.len(), "consolidated queue item");

                QueueItem {
                    id: QueueItemId::new(),
                    op: consolidated_kind(old.op, op),
                    task_id: task_id.clone(),
                    snapshot: snapshot.cloned(),
                    clock: clock.clone(),
                    enqueued_at: old.enqueued_at,
                    retry_count: old.retry_count,
                    consolidated_from: chain,
                }
            }
            None => QueueItem {
                id: QueueItemId::new(),
                op,
                task_id: task_id.clone(),
                snapshot: snapshot.cloned(),
                clock: clock.clone(),
                enqueued_at: Utc::now(),
                retry_count: 0,
                consolidated_from: Vec::new(),
            },
        };

        let snapshot_json = item
            .snapshot
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StoreError::Corrupt {
                id: item.id.to_string(),
                reason: e.to_string(),
            })?;
        let clock_json = serde_json::to_string(&item.clock).map_err(|e| StoreError::Corrupt {
            id: item.id.to_string(),
            reason: e.to_string(),
        })?;
        let chain_json = serde_json::to_string(
            &item
                .consolidated_from
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>(),
        )
        .map_err(|e| StoreError::Corrupt {
            id: item.id.to_string(),
            reason: e.to_string(),
        })?;

        sqlx::query(
            r#"
            INSERT INTO queue (item_id, task_id, op, snapshot, clock,
                               enqueued_at, retry_count, consolidated_from)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(item.id.to_string())
        .bind(item.task_id.as_str())
        .bind(item.op.to_string())
        .bind(snapshot_json)
        .bind(clock_json)
        .bind(item.enqueued_at.to_rfc3339())
        .bind(item.retry_count as i64)
        .bind(chain_json)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(item)
    }

    /// All live items, oldest enqueue time first.
    pub async fn pending(&self) -> StoreResult<Vec<QueueItem>> {
        let rows = sqlx::query_as::<_, QueueRow>(
            r#"
            SELECT item_id, task_id, op, snapshot, clock, enqueued_at,
                   retry_count, consolidated_from
            FROM queue ORDER BY enqueued_at ASC, rowid ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(QueueRow::decode).collect()
    }

    /// Number of live items; polled by the UI for badge display.
    pub async fn pending_count(&self) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queue")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    /// The live item for a task, if any.
    pub async fn for_task(&self, task_id: &TaskId) -> StoreResult<Option<QueueItem>> {
        let row = sqlx::query_as::<_, QueueRow>(
            r#"
            SELECT item_id, task_id, op, snapshot, clock, enqueued_at,
                   retry_count, consolidated_from
            FROM queue WHERE task_id = ?1
            "#,
        )
        .bind(task_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(QueueRow::decode).transpose()
    }

    /// Fetch a single live item (mostly for tests and diagnostics).
    pub async fn get(&self, id: QueueItemId) -> StoreResult<Option<QueueItem>> {
        let row = sqlx::query_as::<_, QueueRow>(
            r#"
            SELECT item_id, task_id, op, snapshot, clock, enqueued_at,
                   retry_count, consolidated_from
            FROM queue WHERE item_id = ?1
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(QueueRow::decode).transpose()
    }

    /// Remove an item after the relay durably applied it.
    ///
    /// Idempotent: removing an absent id is a no-op, not an error.
    pub async fn dequeue(&self, id: QueueItemId) -> StoreResult<()> {
        sqlx::query("DELETE FROM queue WHERE item_id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Bump an item's retry counter; returns the new count.
    pub async fn record_retry(&self, id: QueueItemId) -> StoreResult<u32> {
        let count: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE queue SET retry_count = retry_count + 1
            WHERE item_id = ?1
            RETURNING retry_count
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(count.unwrap_or(0).max(0) as u32)
    }

    /// Reset an item's retry counter after a successful push.
    pub async fn reset_retries(&self, id: QueueItemId) -> StoreResult<()> {
        sqlx::query("UPDATE queue SET retry_count = 0 WHERE item_id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Drop all items.
    ///
    /// Destructive recovery path (e.g. re-authentication reset); callers
    /// must have confirmed with the user. Never invoked automatically.
    pub async fn clear(&self) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM queue").execute(&self.pool).await?;
        info!(dropped = result.rows_affected(), "cleared sync queue");
        Ok(result.rows_affected())
    }
}
