//! # tasksync-engine
//!
//! The offline-first synchronization engine for tasksync.
//!
//! This is the crate the application links against. It wires the local
//! store and durable queue (`tasksync-store`) and the pure sync logic
//! (`tasksync-core`) to the outside world:
//!
//! - **Encryption boundary**: task payloads are encrypted client-side
//!   (XChaCha20-Poly1305, Argon2id passphrase derivation); the relay only
//!   ever stores opaque blobs.
//! - **Network client**: authenticated HTTP calls with categorized errors
//!   and exponential-backoff retry.
//! - **Push/pull protocol handler**: drains the queue to the relay and
//!   applies remote changes through one decrypt/compare/merge pipeline.
//! - **Sync orchestrator**: a single background task running
//!   push-then-pull cycles, publishing [`SyncStatus`] to the UI.
//!
//! ## Example
//!
//! ```ignore
//! use tasksync_engine::{Credential, EngineConfig, SyncEngine};
//!
//! let config = EngineConfig::default().with_relay_url("https://relay.example");
//! let engine = SyncEngine::connect(config, Credential::new(token)).await?;
//!
//! // Local-first write; queued for the next sync cycle.
//! let task = engine.create_task(TaskDraft::new("Buy milk")).await?;
//!
//! let handle = SyncEngine::start(engine.clone());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod credential;
pub mod crypto;
pub mod engine;
mod protocol;
#[cfg(test)]
pub(crate) mod testutil;
pub mod transport;

pub use config::{ConfigError, EngineConfig, RetrySettings};
pub use credential::{Credential, CredentialError};
pub use crypto::{CryptoError, PayloadKey, VaultSecret, KEY_SIZE, NONCE_SIZE};
pub use engine::{EngineError, SyncEngine, SyncHandle};
pub use transport::{HttpRelay, MockRelay, NetworkError, RelayApi};

pub use sync_core::{ErrorCategory, StatusError, SyncPhase, SyncStatus};
pub use sync_store::LocalDb;
pub use sync_types::{TaskDraft, TaskId, TaskPatch, TaskRecord};
