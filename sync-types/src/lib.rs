//! # tasksync-types
//!
//! Data model and wire format types for the tasksync offline-first
//! synchronization engine.
//!
//! This crate provides the foundational types used across all tasksync crates:
//! - [`TaskId`], [`DeviceId`], [`QueueItemId`] - Identity types
//! - [`VectorClock`], [`ClockOrdering`] - Causality tracking
//! - [`TaskRecord`], [`TaskDraft`], [`TaskPatch`] - The unit of synchronization
//! - [`PushRequest`], [`PullResponse`], ... - Relay API messages
//! - [`SyncError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod clock;
mod error;
mod ids;
mod messages;
mod task;

pub use clock::{ClockOrdering, VectorClock};
pub use error::SyncError;
pub use ids::{DeviceId, QueueItemId, TaskId};
pub use messages::{
    OpKind, PullRequest, PullResponse, PushOperation, PushOutcome, PushRequest, PushResponse,
    PushResult, RelayStatus, RemoteTask,
};
pub use task::{Subtask, TaskDraft, TaskPatch, TaskRecord};
