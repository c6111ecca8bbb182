//! # tasksync-store
//!
//! The embedded, persistent, single-device database of tasks and queued
//! operations. All mutations are applied here first: a local write succeeds
//! or fails independent of network availability, and propagation to the
//! relay is the sync queue's problem.
//!
//! Two components share one SQLite database (WAL mode):
//! - [`TaskStore`] - task records, queryable by id, list, completion, and
//!   free text; every mutation increments the device's vector-clock entry.
//! - [`SyncQueue`] - the durable, ordered log of pending mutations, with
//!   supersede-on-enqueue consolidation and retry-count tracking.
//!
//! UI code never writes either table directly; both are mutated only
//! through the operations here.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod db;
mod error;
mod queue;
mod store;

pub use db::LocalDb;
pub use error::StoreError;
pub use queue::{QueueItem, SyncQueue};
pub use store::TaskStore;
