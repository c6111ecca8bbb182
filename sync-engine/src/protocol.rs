//! The push/pull protocol handler.
//!
//! Translates sync queue items and local store state into relay API calls
//! and interprets the results. Both directions - push acknowledgement
//! conflicts and pull comparisons - run through one
//! decrypt/compare/merge pipeline ([`SyncEngine::apply_remote`]), so there
//! is a single code path deciding what a remote version means locally.
//!
//! Pull-time comparison is the authoritative conflict-detection path; a
//! conflict marker in a push response is an optimization the relay may or
//! may not provide.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use sync_core::{resolve, CycleEvent, ErrorCategory};
use sync_store::StoreError;
use sync_types::{
    ClockOrdering, OpKind, PullRequest, PushOperation, PushOutcome, PushRequest, RemoteTask,
    TaskRecord,
};

use crate::crypto::CryptoError;
use crate::engine::SyncEngine;
use crate::transport::{with_retry, NetworkError, RelayApi};

/// A failure that ends a sync cycle.
#[derive(Debug, Error)]
pub(crate) enum CycleError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("encryption error: {0}")]
    Crypto(#[from] CryptoError),
}

impl CycleError {
    pub(crate) fn category(&self) -> ErrorCategory {
        match self {
            Self::Network(err) => err.category(),
            Self::Store(_) => ErrorCategory::Storage,
            Self::Crypto(_) => ErrorCategory::Generic,
        }
    }
}

/// What applying one remote version did locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RemoteOutcome {
    /// Remote dominated; local copy overwritten (or inserted).
    Applied,
    /// Local copy already current; nothing to do.
    Ignored,
    /// Causally concurrent; resolver merged and re-queued.
    Resolved,
    /// Unreadable (no passphrase, bad key, or corrupt payload); skipped.
    Skipped,
}

impl<R: RelayApi> SyncEngine<R> {
    /// One push-then-pull cycle.
    ///
    /// If the pull (or a push conflict marker) invoked the resolver, the
    /// merged records were re-queued - push once more so a clean cycle
    /// ends with an empty queue.
    pub(crate) async fn execute_cycle(&self) -> Result<(), CycleError> {
        let mut conflicts = self.push_phase().await?;
        conflicts += self.pull_phase().await?;
        if conflicts > 0 {
            self.push_phase().await?;
        }
        Ok(())
    }

    /// Drain the queue to the relay.
    ///
    /// Returns how many conflicts the resolver handled from push
    /// acknowledgement markers.
    async fn push_phase(&self) -> Result<u32, CycleError> {
        let pending = self.queue.pending().await?;
        if pending.is_empty() {
            return Ok(0);
        }

        let key = self.key.as_ref().ok_or_else(|| {
            CycleError::Network(NetworkError::Generic(
                "encryption passphrase not configured; cannot push task content".into(),
            ))
        })?;

        let mut operations = Vec::with_capacity(pending.len());
        for item in &pending {
            let (encrypted_blob, nonce) = match &item.snapshot {
                Some(snapshot) => {
                    let plaintext = snapshot
                        .to_bytes()
                        .map_err(|e| CycleError::Store(StoreError::Invalid(e)))?;
                    let (ciphertext, nonce) = key.encrypt(&plaintext)?;
                    (ciphertext, nonce.to_vec())
                }
                // Deletes carry no content.
                None => (Vec::new(), Vec::new()),
            };

            operations.push(PushOperation {
                task_id: item.task_id.clone(),
                operation: item.op,
                vector_clock: item.clock.clone(),
                encrypted_blob,
                nonce,
            });
        }

        let request = PushRequest {
            device_id: self.device.clone(),
            operations,
        };

        let response = match with_retry(&self.policy, "push", || self.relay.push(request.clone()))
            .await
        {
            Ok(response) => response,
            Err(err) => {
                // One failure streak tick per live item in the batch.
                for item in &pending {
                    let _ = self.queue.record_retry(item.id).await;
                }
                return Err(err.into());
            }
        };

        let by_task: HashMap<_, _> = pending.iter().map(|i| (i.task_id.clone(), i)).collect();
        let mut conflicts = 0;

        for result in response.results {
            let Some(item) = by_task.get(&result.task_id) else {
                warn!(task = %result.task_id, "relay answered for a task we did not push");
                continue;
            };

            match result.outcome {
                PushOutcome::Ack => {
                    self.queue.dequeue(item.id).await?;
                    if let Some(server_clock) = result.server_clock {
                        if let Some(mut local) = self.store.get(&result.task_id).await? {
                            local.clock = local.clock.merge(&server_clock);
                            self.store.apply_remote(&local).await?;
                        }
                    }
                }
                PushOutcome::Conflict => match result.remote {
                    Some(remote) => match self.apply_remote(&remote).await? {
                        RemoteOutcome::Applied => {
                            // Remote dominated our queued change; pushing the
                            // stale snapshot would resurrect it remotely.
                            self.queue.dequeue(item.id).await?;
                        }
                        RemoteOutcome::Resolved => conflicts += 1,
                        RemoteOutcome::Ignored | RemoteOutcome::Skipped => {}
                    },
                    // No remote attached: the pull phase is the
                    // authoritative detection path; leave the item queued.
                    None => {
                        warn!(task = %result.task_id, "push conflict without remote version; deferring to pull");
                    }
                },
            }
        }

        self.refresh_pending().await;
        Ok(conflicts)
    }

    /// Pull remote changes since the device's last known causal point,
    /// paging until the relay reports no further results.
    async fn pull_phase(&self) -> Result<u32, CycleError> {
        let frontier = self.store.clock_frontier().await?;
        let mut since: Option<DateTime<Utc>> = *self.last_pull_at.lock().await;
        let mut conflicts = 0;

        loop {
            let request = PullRequest {
                device_id: self.device.clone(),
                last_vector_clock: frontier.clone(),
                since_timestamp: since,
                limit: self.config.pull_page_size,
            };

            let response =
                with_retry(&self.policy, "pull", || self.relay.pull(request.clone())).await?;

            for remote in &response.tasks {
                if self.apply_remote(remote).await? == RemoteOutcome::Resolved {
                    conflicts += 1;
                }
                since = Some(since.map_or(remote.updated_at, |s| s.max(remote.updated_at)));
            }

            if !response.has_more {
                break;
            }
            if response.tasks.is_empty() {
                warn!("relay reported more pages but returned an empty one; stopping pull");
                break;
            }
        }

        *self.last_pull_at.lock().await = since;
        self.refresh_pending().await;
        Ok(conflicts)
    }

    /// The shared fetch/decrypt/merge pipeline.
    ///
    /// Decrypt failures are per-item: skip and log, never abort the batch.
    pub(crate) async fn apply_remote(
        &self,
        remote: &RemoteTask,
    ) -> Result<RemoteOutcome, CycleError> {
        let Some(key) = self.key.as_ref() else {
            warn!(task = %remote.id, "no passphrase configured; task is present but unreadable");
            return Ok(RemoteOutcome::Skipped);
        };

        let plaintext = match key.decrypt(&remote.encrypted_blob, &remote.nonce) {
            Ok(plaintext) => plaintext,
            Err(err) => {
                warn!(task = %remote.id, error = %err, "skipping undecryptable task");
                return Ok(RemoteOutcome::Skipped);
            }
        };

        let mut record = match TaskRecord::from_bytes(&plaintext) {
            Ok(record) => record,
            Err(err) => {
                warn!(task = %remote.id, error = %err, "skipping malformed task payload");
                return Ok(RemoteOutcome::Skipped);
            }
        };

        // The envelope clock is what the relay acknowledged; trust it over
        // whatever the payload froze at encryption time.
        record.id = remote.id.clone();
        record.clock = remote.vector_clock.clone();

        let Some(local) = self.store.get(&remote.id).await? else {
            return self.apply_to_absent(record).await;
        };

        match record.clock.compare(&local.clock) {
            ClockOrdering::After => {
                self.store.apply_remote(&record).await?;
                Ok(RemoteOutcome::Applied)
            }
            ClockOrdering::Before | ClockOrdering::Equal => Ok(RemoteOutcome::Ignored),
            ClockOrdering::Concurrent => {
                self.publish_event(CycleEvent::ConflictDetected);
                let merged = resolve(&local, &record);

                self.store.apply_remote(&merged).await?;
                let requeued = self
                    .queue
                    .enqueue(OpKind::Update, &merged.id, Some(&merged), &merged.clock)
                    .await?;
                // The merged record is a fresh mutation on a new causal
                // basis; it does not continue the old item's failure streak.
                if requeued.retry_count > 0 {
                    self.queue.reset_retries(requeued.id).await?;
                }

                self.publish_event(CycleEvent::ResolutionApplied);
                info!(task = %merged.id, "merged causally concurrent versions");
                Ok(RemoteOutcome::Resolved)
            }
        }
    }

    /// A remote version for a task we don't hold locally.
    ///
    /// Usually a plain insert; the subtle case is a pending local delete,
    /// where a concurrent remote edit wins over the deletion - silently
    /// losing an edit is worse than resurrecting a task.
    async fn apply_to_absent(&self, record: TaskRecord) -> Result<RemoteOutcome, CycleError> {
        let Some(item) = self.queue.for_task(&record.id).await? else {
            self.store.apply_remote(&record).await?;
            return Ok(RemoteOutcome::Applied);
        };

        if item.op != OpKind::Delete {
            self.store.apply_remote(&record).await?;
            return Ok(RemoteOutcome::Applied);
        }

        match record.clock.compare(&item.clock) {
            ClockOrdering::After => {
                // Remote has seen our tombstone's history and moved on.
                self.queue.dequeue(item.id).await?;
                self.store.apply_remote(&record).await?;
                Ok(RemoteOutcome::Applied)
            }
            ClockOrdering::Concurrent => {
                self.publish_event(CycleEvent::ConflictDetected);
                warn!(task = %record.id, "concurrent edit wins over pending deletion");
                self.queue.dequeue(item.id).await?;
                self.store.apply_remote(&record).await?;
                self.publish_event(CycleEvent::ResolutionApplied);
                Ok(RemoteOutcome::Resolved)
            }
            ClockOrdering::Before | ClockOrdering::Equal => Ok(RemoteOutcome::Ignored),
        }
    }
}
