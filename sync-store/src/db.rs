//! Database handle and migrations.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use sync_types::DeviceId;

use crate::error::{StoreError, StoreResult};
use crate::{SyncQueue, TaskStore};

/// Handle to the engine's local SQLite database.
///
/// Uses WAL mode for concurrent reads/writes. Hands out the [`TaskStore`]
/// and [`SyncQueue`] components, which share the connection pool.
#[derive(Clone)]
pub struct LocalDb {
    pool: SqlitePool,
}

impl LocalDb {
    /// Open (or create) the database at the given path.
    pub async fn open(path: &Path) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(path.to_str().unwrap_or("tasksync.db"))
            .map_err(StoreError::Database)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(StoreError::Database)?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Create an in-memory database (for testing).
    pub async fn in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(":memory:")
            .map_err(StoreError::Database)?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(StoreError::Database)?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// The task record component, writing clocks as the given device.
    pub fn task_store(&self, device: DeviceId) -> TaskStore {
        TaskStore::new(self.pool.clone(), device)
    }

    /// The sync queue component.
    pub fn sync_queue(&self) -> SyncQueue {
        SyncQueue::new(self.pool.clone())
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> StoreResult<()> {
        // Task records: canonical JSON plus projected columns for queries.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                notes TEXT NOT NULL DEFAULT '',
                list TEXT NOT NULL,
                completed INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL,
                record TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS queue (
                item_id TEXT PRIMARY KEY,
                task_id TEXT NOT NULL UNIQUE,
                op TEXT NOT NULL,
                snapshot TEXT,
                clock TEXT NOT NULL,
                enqueued_at TEXT NOT NULL,
                retry_count INTEGER NOT NULL DEFAULT 0,
                consolidated_from TEXT NOT NULL DEFAULT '[]'
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tasks_list ON tasks(list)")
            .execute(&self.pool)
            .await
            .map_err(StoreError::Database)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tasks_completed ON tasks(completed)")
            .execute(&self.pool)
            .await
            .map_err(StoreError::Database)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_queue_enqueued ON queue(enqueued_at)")
            .execute(&self.pool)
            .await
            .map_err(StoreError::Database)?;

        Ok(())
    }
}
