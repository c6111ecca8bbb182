//! Task record storage.
//!
//! Every public mutation is a single local transaction: validate, bump the
//! device's vector-clock entry, write, and return the resulting record to
//! the caller synchronously. Network availability never enters the picture;
//! handing the result to the sync queue is the engine's follow-up, and a
//! failed hand-off never unwinds the local write.

use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use sqlx::Sqlite;
use tracing::debug;

use sync_types::{DeviceId, TaskDraft, TaskId, TaskPatch, TaskRecord, VectorClock};

use crate::error::{StoreError, StoreResult};

/// Durable, transactional storage for task records.
#[derive(Clone)]
pub struct TaskStore {
    pool: SqlitePool,
    device: DeviceId,
}

/// Internal row type: projected columns exist for queries, the canonical
/// form is the JSON `record` column.
#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    record: String,
}

impl TaskRow {
    fn decode(self) -> StoreResult<TaskRecord> {
        serde_json::from_str(&self.record).map_err(|e| StoreError::Corrupt {
            id: self.id,
            reason: e.to_string(),
        })
    }
}

impl TaskStore {
    pub(crate) fn new(pool: SqlitePool, device: DeviceId) -> Self {
        Self { pool, device }
    }

    /// The device identity this store writes clocks as.
    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    // -------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------

    /// Fetch a task by id.
    pub async fn get(&self, id: &TaskId) -> StoreResult<Option<TaskRecord>> {
        let row = sqlx::query_as::<_, TaskRow>("SELECT id, record FROM tasks WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(TaskRow::decode).transpose()
    }

    /// All tasks, most recently updated first.
    pub async fn all(&self) -> StoreResult<Vec<TaskRecord>> {
        let rows = sqlx::query_as::<_, TaskRow>(
            "SELECT id, record FROM tasks ORDER BY updated_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TaskRow::decode).collect()
    }

    /// Tasks in the given classification bucket.
    pub async fn by_list(&self, list: &str) -> StoreResult<Vec<TaskRecord>> {
        let rows = sqlx::query_as::<_, TaskRow>(
            "SELECT id, record FROM tasks WHERE list = ?1 ORDER BY updated_at DESC",
        )
        .bind(list)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TaskRow::decode).collect()
    }

    /// Tasks filtered by completion state.
    pub async fn by_completion(&self, completed: bool) -> StoreResult<Vec<TaskRecord>> {
        let rows = sqlx::query_as::<_, TaskRow>(
            "SELECT id, record FROM tasks WHERE completed = ?1 ORDER BY updated_at DESC",
        )
        .bind(completed)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TaskRow::decode).collect()
    }

    /// Free-text search over title and notes.
    pub async fn search(&self, text: &str) -> StoreResult<Vec<TaskRecord>> {
        let pattern = format!("%{text}%");
        let rows = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT id, record FROM tasks
            WHERE title LIKE ?1 OR notes LIKE ?1
            ORDER BY updated_at DESC
            "#,
        )
        .bind(&pattern)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TaskRow::decode).collect()
    }

    /// The merge of every stored task's clock: the device's known causal
    /// frontier, rebuilt from the store (it is never persisted separately).
    pub async fn clock_frontier(&self) -> StoreResult<VectorClock> {
        let rows = sqlx::query_as::<_, TaskRow>("SELECT id, record FROM tasks")
            .fetch_all(&self.pool)
            .await?;

        let mut frontier = VectorClock::new();
        for row in rows {
            frontier = frontier.merge(&row.decode()?.clock);
        }
        Ok(frontier)
    }

    // -------------------------------------------------------------------
    // Mutations (local-first; each bumps this device's clock entry)
    // -------------------------------------------------------------------

    /// Create a task from a draft.
    pub async fn create(&self, draft: TaskDraft) -> StoreResult<TaskRecord> {
        draft.validate()?;

        let now = Utc::now();
        let record = TaskRecord {
            id: TaskId::new(),
            title: draft.title,
            notes: draft.notes,
            list: if draft.list.trim().is_empty() {
                "inbox".to_string()
            } else {
                draft.list
            },
            completed: false,
            priority: draft.priority,
            tags: draft.tags,
            subtasks: draft.subtasks,
            dependencies: draft.dependencies,
            due_at: draft.due_at,
            created_at: now,
            updated_at: now,
            clock: VectorClock::new().increment(&self.device),
        };

        Self::write(&self.pool, &record).await?;
        debug!(task = %record.id, "created task");
        Ok(record)
    }

    /// Apply a validated patch to a task.
    pub async fn update(&self, id: &TaskId, patch: TaskPatch) -> StoreResult<TaskRecord> {
        patch.validate(id)?;

        let mut tx = self.pool.begin().await?;
        let mut record = Self::fetch_in(&mut tx, id).await?;

        record.apply_patch(patch);
        record.updated_at = Utc::now();
        record.clock = record.clock.increment(&self.device);

        Self::write(&mut *tx, &record).await?;
        tx.commit().await?;

        debug!(task = %id, "updated task");
        Ok(record)
    }

    /// Set or clear a task's completion flag.
    pub async fn complete(&self, id: &TaskId, done: bool) -> StoreResult<TaskRecord> {
        self.update(
            id,
            TaskPatch {
                completed: Some(done),
                ..TaskPatch::default()
            },
        )
        .await
    }

    /// Move a task to another classification bucket.
    pub async fn move_to_list(&self, id: &TaskId, list: &str) -> StoreResult<TaskRecord> {
        self.update(
            id,
            TaskPatch {
                list: Some(list.to_string()),
                ..TaskPatch::default()
            },
        )
        .await
    }

    /// Delete a task.
    ///
    /// Returns the record as it stood at deletion, with the clock already
    /// bumped - the tombstone the sync queue will carry.
    pub async fn delete(&self, id: &TaskId) -> StoreResult<TaskRecord> {
        let mut tx = self.pool.begin().await?;
        let mut record = Self::fetch_in(&mut tx, id).await?;

        record.updated_at = Utc::now();
        record.clock = record.clock.increment(&self.device);

        sqlx::query("DELETE FROM tasks WHERE id = ?1")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        debug!(task = %id, "deleted task");
        Ok(record)
    }

    // -------------------------------------------------------------------
    // Remote application (no clock bump; the clock travels with the record)
    // -------------------------------------------------------------------

    /// Write a remote or resolver-merged version as-is.
    pub async fn apply_remote(&self, record: &TaskRecord) -> StoreResult<()> {
        Self::write(&self.pool, record).await?;
        debug!(task = %record.id, "applied remote version");
        Ok(())
    }

    /// Remove a task without touching its clock (remote delete).
    pub async fn remove(&self, id: &TaskId) -> StoreResult<()> {
        sqlx::query("DELETE FROM tasks WHERE id = ?1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // -------------------------------------------------------------------

    async fn fetch_in(
        tx: &mut sqlx::Transaction<'_, Sqlite>,
        id: &TaskId,
    ) -> StoreResult<TaskRecord> {
        let row = sqlx::query_as::<_, TaskRow>("SELECT id, record FROM tasks WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&mut **tx)
            .await?;

        match row {
            Some(row) => row.decode(),
            None => Err(StoreError::TaskNotFound {
                id: id.to_string(),
            }),
        }
    }

    async fn write<'e, E>(executor: E, record: &TaskRecord) -> StoreResult<()>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        let json = serde_json::to_string(record).map_err(|e| StoreError::Corrupt {
            id: record.id.to_string(),
            reason: e.to_string(),
        })?;

        sqlx::query(
            r#"
            INSERT INTO tasks (id, title, notes, list, completed, updated_at, record)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                notes = excluded.notes,
                list = excluded.list,
                completed = excluded.completed,
                updated_at = excluded.updated_at,
                record = excluded.record
            "#,
        )
        .bind(record.id.as_str())
        .bind(&record.title)
        .bind(&record.notes)
        .bind(&record.list)
        .bind(record.completed)
        .bind(record.updated_at.to_rfc3339())
        .bind(json)
        .execute(executor)
        .await?;

        Ok(())
    }
}
