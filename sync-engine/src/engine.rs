//! The sync engine facade and background orchestrator.
//!
//! [`SyncEngine`] is the explicitly constructed context the application
//! passes around - there is no process-global instance. It owns the local
//! store, the durable queue, the encryption key, and the relay transport,
//! and exposes the surface the UI collaborator consumes: local-first task
//! mutations, pending-count and status queries, `force_sync_now`, and the
//! destructive `clear_queue`.
//!
//! The orchestrator is a single background task per engine. No two cycles
//! run concurrently: a cycle fully settles before the next starts, whether
//! triggered by the timer or a manual refresh. An `auth` failure
//! short-circuits and latches; no further cycles run until the credential
//! is replaced.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use sync_core::{CycleEvent, ErrorCategory, RetryPolicy, StatusError, SyncStatus};
use sync_store::{LocalDb, StoreError, SyncQueue, TaskStore};
use sync_types::{DeviceId, OpKind, RelayStatus, TaskDraft, TaskId, TaskPatch, TaskRecord};

use crate::config::{ConfigError, EngineConfig};
use crate::credential::{Credential, CredentialError};
use crate::crypto::PayloadKey;
use crate::transport::{HttpRelay, NetworkError, RelayApi};

/// Errors surfaced by the engine's public surface.
///
/// Background sync failures never appear here - they surface only through
/// [`SyncStatus`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// Local storage failed; the attempted operation did not happen.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The credential could not be parsed.
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// A direct relay call (e.g. `remote_status`) failed.
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// Configuration loading failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The relay rejected the credential; re-authenticate first.
    #[error("re-authentication required before syncing")]
    AuthRequired,

    /// A replacement credential names a different device.
    #[error("credential is for device {actual}, engine is bound to {expected}")]
    DeviceMismatch {
        /// Device the engine was constructed for.
        expected: DeviceId,
        /// Device named by the new credential.
        actual: DeviceId,
    },
}

/// The offline-first sync engine.
///
/// Generic over the relay transport so tests run against
/// [`MockRelay`](crate::MockRelay).
pub struct SyncEngine<R: RelayApi> {
    pub(crate) config: EngineConfig,
    pub(crate) device: DeviceId,
    pub(crate) store: TaskStore,
    pub(crate) queue: SyncQueue,
    pub(crate) relay: R,
    pub(crate) key: Option<PayloadKey>,
    pub(crate) policy: RetryPolicy,
    pub(crate) status_tx: watch::Sender<SyncStatus>,
    /// Serializes sync cycles; held for a cycle's full duration.
    cycle: Mutex<()>,
    auth_required: AtomicBool,
    /// High-water mark of remote `updated_at` seen this process lifetime.
    /// In-memory only: the first cycle after start pulls from scratch.
    pub(crate) last_pull_at: Mutex<Option<DateTime<Utc>>>,
}

impl SyncEngine<HttpRelay> {
    /// Open the local database and connect to the relay named in `config`.
    pub async fn connect(
        config: EngineConfig,
        credential: Credential,
    ) -> Result<Arc<Self>, EngineError> {
        let db = LocalDb::open(&config.database).await?;
        let relay = HttpRelay::new(&config.relay_url, credential.clone())?;
        Self::new(config, credential, db, relay).await
    }
}

impl<R: RelayApi> SyncEngine<R> {
    /// Construct an engine, deriving the payload key from the configured
    /// passphrase (device-adaptive Argon2id; takes a moment by design).
    pub async fn new(
        config: EngineConfig,
        credential: Credential,
        db: LocalDb,
        relay: R,
    ) -> Result<Arc<Self>, EngineError> {
        let key = config.passphrase.as_deref().map(PayloadKey::from_passphrase);
        Self::new_with_key(config, credential, db, relay, key).await
    }

    /// Construct an engine with a pre-derived payload key (or none).
    pub async fn new_with_key(
        config: EngineConfig,
        credential: Credential,
        db: LocalDb,
        relay: R,
        key: Option<PayloadKey>,
    ) -> Result<Arc<Self>, EngineError> {
        let device = credential.device_id()?;
        relay.set_credential(credential);

        let store = db.task_store(device.clone());
        let queue = db.sync_queue();

        // Status is never persisted: rebuild it from the queue on start.
        let pending = queue.pending_count().await?;
        let (status_tx, _) = watch::channel(SyncStatus::idle(pending));

        let policy = config.retry.to_policy();
        info!(device = %device, pending, "sync engine ready");

        Ok(Arc::new(Self {
            config,
            device,
            store,
            queue,
            relay,
            key,
            policy,
            status_tx,
            cycle: Mutex::new(()),
            auth_required: AtomicBool::new(false),
            last_pull_at: Mutex::new(None),
        }))
    }

    /// The device identity this engine writes and syncs as.
    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    /// Read access to the task store for the UI's live queries.
    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    // -------------------------------------------------------------------
    // Task mutations: local-first write, then hand off to the queue.
    // -------------------------------------------------------------------

    /// Create a task.
    pub async fn create_task(&self, draft: TaskDraft) -> Result<TaskRecord, EngineError> {
        let record = self.store.create(draft).await?;
        self.hand_to_queue(OpKind::Create, &record, Some(&record))
            .await;
        Ok(record)
    }

    /// Apply a patch to a task.
    pub async fn update_task(
        &self,
        id: &TaskId,
        patch: TaskPatch,
    ) -> Result<TaskRecord, EngineError> {
        let record = self.store.update(id, patch).await?;
        self.hand_to_queue(OpKind::Update, &record, Some(&record))
            .await;
        Ok(record)
    }

    /// Set or clear a task's completion flag.
    pub async fn complete_task(&self, id: &TaskId, done: bool) -> Result<TaskRecord, EngineError> {
        let record = self.store.complete(id, done).await?;
        self.hand_to_queue(OpKind::Update, &record, Some(&record))
            .await;
        Ok(record)
    }

    /// Move a task to another classification bucket.
    pub async fn move_to_list(&self, id: &TaskId, list: &str) -> Result<TaskRecord, EngineError> {
        let record = self.store.move_to_list(id, list).await?;
        self.hand_to_queue(OpKind::Update, &record, Some(&record))
            .await;
        Ok(record)
    }

    /// Delete a task.
    pub async fn delete_task(&self, id: &TaskId) -> Result<TaskRecord, EngineError> {
        let record = self.store.delete(id).await?;
        self.hand_to_queue(OpKind::Delete, &record, None).await;
        Ok(record)
    }

    /// Hand a completed local write to the sync queue.
    ///
    /// The local write already succeeded and is never unwound: a queue
    /// failure is reported through status, not to the mutation caller.
    async fn hand_to_queue(&self, op: OpKind, record: &TaskRecord, snapshot: Option<&TaskRecord>) {
        if !self.config.sync_enabled {
            return;
        }
        match self
            .queue
            .enqueue(op, &record.id, snapshot, &record.clock)
            .await
        {
            Ok(_) => self.refresh_pending().await,
            Err(err) => {
                error!(task = %record.id, error = %err, "failed to queue mutation for sync");
                self.status_tx.send_modify(|status| {
                    status.last_error = Some(StatusError {
                        category: ErrorCategory::Storage,
                        message: err.to_string(),
                    });
                });
            }
        }
    }

    // -------------------------------------------------------------------
    // Status surface
    // -------------------------------------------------------------------

    /// Snapshot of the engine's health.
    pub fn status(&self) -> SyncStatus {
        self.status_tx.borrow().clone()
    }

    /// Subscribe to status changes (explicit observer interface; no global
    /// event bus).
    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status_tx.subscribe()
    }

    /// Number of live queue items awaiting push.
    pub async fn pending_count(&self) -> Result<u64, EngineError> {
        Ok(self.queue.pending_count().await?)
    }

    /// Whether the engine is waiting for a replacement credential.
    pub fn auth_required(&self) -> bool {
        self.auth_required.load(Ordering::SeqCst)
    }

    /// Aggregate counts from the relay (`GET /sync/status`).
    pub async fn remote_status(&self) -> Result<RelayStatus, EngineError> {
        Ok(self.relay.status().await?)
    }

    /// Drop every queued mutation.
    ///
    /// Destructive: local writes stay, but they will never reach the
    /// relay. Confirmation is the caller's responsibility; the engine
    /// never invokes this itself.
    pub async fn clear_queue(&self) -> Result<u64, EngineError> {
        let dropped = self.queue.clear().await?;
        self.refresh_pending().await;
        Ok(dropped)
    }

    /// Install a replacement credential after re-authentication.
    ///
    /// The new credential must name the same device: device identity is
    /// the vector-clock key, so it cannot change under a live store.
    pub fn set_credential(&self, credential: Credential) -> Result<(), EngineError> {
        let actual = credential.device_id()?;
        if actual != self.device {
            return Err(EngineError::DeviceMismatch {
                expected: self.device.clone(),
                actual,
            });
        }
        self.relay.set_credential(credential);
        self.auth_required.store(false, Ordering::SeqCst);
        self.status_tx.send_modify(|status| {
            if matches!(
                status.last_error,
                Some(StatusError {
                    category: ErrorCategory::Auth,
                    ..
                })
            ) {
                status.last_error = None;
            }
        });
        info!(device = %self.device, "credential replaced");
        Ok(())
    }

    // -------------------------------------------------------------------
    // Cycle driving
    // -------------------------------------------------------------------

    /// Run a sync cycle immediately.
    ///
    /// Serialized against the background orchestrator; returns the status
    /// the cycle settled into.
    pub async fn force_sync_now(&self) -> Result<SyncStatus, EngineError> {
        if self.auth_required() {
            return Err(EngineError::AuthRequired);
        }
        Ok(self.run_cycle().await)
    }

    pub(crate) async fn run_cycle(&self) -> SyncStatus {
        let _guard = self.cycle.lock().await;
        if self.auth_required() {
            return self.status();
        }

        self.publish_event(CycleEvent::CycleStarted);
        debug!(device = %self.device, "sync cycle started");

        match self.execute_cycle().await {
            Ok(()) => {
                self.refresh_pending().await;
                self.status_tx.send_modify(|status| {
                    status.phase = status.phase.on_event(CycleEvent::CycleSucceeded);
                    status.last_error = None;
                    status.next_retry_at = None;
                });
                debug!("sync cycle completed");
            }
            Err(err) => {
                let category = err.category();
                if category == ErrorCategory::Auth {
                    self.auth_required.store(true, Ordering::SeqCst);
                }
                let next_retry_at = category.is_retryable().then(|| {
                    Utc::now()
                        + chrono::Duration::from_std(self.policy.exhausted_delay())
                            .unwrap_or_else(|_| chrono::Duration::seconds(60))
                });

                error!(error = %err, ?category, "sync cycle failed");
                self.refresh_pending().await;
                self.status_tx.send_modify(|status| {
                    status.phase = status.phase.on_event(CycleEvent::CycleFailed);
                    status.last_error = Some(StatusError {
                        category,
                        message: err.to_string(),
                    });
                    status.next_retry_at = next_retry_at;
                });
            }
        }

        self.status()
    }

    pub(crate) fn publish_event(&self, event: CycleEvent) {
        self.status_tx
            .send_modify(|status| status.phase = status.phase.on_event(event));
    }

    pub(crate) async fn refresh_pending(&self) {
        if let Ok(pending) = self.queue.pending_count().await {
            self.status_tx
                .send_modify(|status| status.pending = pending);
        }
    }

    // -------------------------------------------------------------------
    // Background orchestrator
    // -------------------------------------------------------------------

    /// Spawn the background orchestrator: one task owning every timer, so
    /// teardown cancels them as a unit.
    pub fn start(engine: Arc<Self>) -> SyncHandle {
        let shutdown = Arc::new(Notify::new());
        let signal = shutdown.clone();

        let join = tokio::spawn(async move {
            let period = Duration::from_secs(engine.config.sync_interval_secs.max(1));
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = signal.notified() => {
                        debug!("sync orchestrator stopping");
                        break;
                    }
                    _ = interval.tick() => {
                        if engine.auth_required() {
                            debug!("skipping cycle: re-authentication required");
                            continue;
                        }
                        if let Some(at) = engine.status().next_retry_at {
                            if at > Utc::now() {
                                debug!(next_retry_at = %at, "skipping cycle: backing off");
                                continue;
                            }
                        }
                        let _ = engine.run_cycle().await;
                    }
                }
            }
        });

        SyncHandle { shutdown, join }
    }
}

/// Handle to the background orchestrator task.
pub struct SyncHandle {
    shutdown: Arc<Notify>,
    join: JoinHandle<()>,
}

impl SyncHandle {
    /// Stop the orchestrator, waiting for an in-flight cycle to settle.
    pub async fn stop(self) {
        self.shutdown.notify_one();
        let _ = self.join.await;
    }
}
