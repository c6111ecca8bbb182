//! The task record - tasksync's unit of synchronization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::{SyncError, TaskId, VectorClock};

/// A single entry in a task's ordered subtask list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subtask {
    /// Stable identifier within the parent task.
    pub id: String,
    /// Subtask text.
    pub title: String,
    /// Completion flag.
    pub done: bool,
}

/// The unit of synchronization.
///
/// Every mutation increments the mutating device's own entry in `clock`
/// before the record is persisted or queued - the store enforces this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    /// Stable identifier.
    pub id: TaskId,
    /// Title line.
    pub title: String,
    /// Free-form description.
    #[serde(default)]
    pub notes: String,
    /// Classification bucket ("inbox", "today", a project name, ...).
    pub list: String,
    /// Completion flag.
    #[serde(default)]
    pub completed: bool,
    /// Priority flag.
    #[serde(default)]
    pub priority: bool,
    /// Free-form tag set.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Ordered subtask list.
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
    /// Ids of tasks this one depends on.
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    /// Optional due date.
    #[serde(default)]
    pub due_at: Option<DateTime<Utc>>,
    /// Creation timestamp (ISO-8601 on the wire).
    pub created_at: DateTime<Utc>,
    /// Last-mutation timestamp (ISO-8601 on the wire).
    pub updated_at: DateTime<Utc>,
    /// Vector clock establishing this version's causal position.
    pub clock: VectorClock,
}

impl TaskRecord {
    /// Serialize to MessagePack bytes.
    ///
    /// This is the plaintext form that crosses the encryption boundary;
    /// the relay only ever sees the ciphertext.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SyncError> {
        rmp_serde::to_vec_named(self).map_err(SyncError::Serialization)
    }

    /// Deserialize from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SyncError> {
        rmp_serde::from_slice(bytes).map_err(SyncError::Deserialization)
    }

    /// Apply a validated patch, overwriting only the fields it carries.
    ///
    /// Timestamps and the vector clock are the store's responsibility and
    /// are not touched here.
    pub fn apply_patch(&mut self, patch: TaskPatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(notes) = patch.notes {
            self.notes = notes;
        }
        if let Some(list) = patch.list {
            self.list = list;
        }
        if let Some(completed) = patch.completed {
            self.completed = completed;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(tags) = patch.tags {
            self.tags = tags;
        }
        if let Some(subtasks) = patch.subtasks {
            self.subtasks = subtasks;
        }
        if let Some(dependencies) = patch.dependencies {
            self.dependencies = dependencies;
        }
        if let Some(due_at) = patch.due_at {
            self.due_at = due_at;
        }
    }
}

/// Input for creating a new task.
///
/// No id, timestamps, or clock - the store assigns those.
#[derive(Debug, Clone, Default)]
pub struct TaskDraft {
    /// Title line (required, non-empty).
    pub title: String,
    /// Free-form description.
    pub notes: String,
    /// Classification bucket; empty means the store's default list.
    pub list: String,
    /// Priority flag.
    pub priority: bool,
    /// Free-form tag set.
    pub tags: BTreeSet<String>,
    /// Ordered subtask list.
    pub subtasks: Vec<Subtask>,
    /// Ids of tasks this one depends on.
    pub dependencies: Vec<TaskId>,
    /// Optional due date.
    pub due_at: Option<DateTime<Utc>>,
}

impl TaskDraft {
    /// Create a draft with the given title and defaults everywhere else.
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            ..Self::default()
        }
    }

    /// Validate the draft against the record schema.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.title.trim().is_empty() {
            return Err(SyncError::InvalidData("task title must not be empty".into()));
        }
        Ok(())
    }
}

/// A tagged update command: an explicit field list where only present
/// fields are applied.
///
/// Replaces loose partial-record merging; every patch is validated against
/// the record schema before it touches the store.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    /// New title.
    pub title: Option<String>,
    /// New notes body.
    pub notes: Option<String>,
    /// New classification bucket.
    pub list: Option<String>,
    /// New completion flag.
    pub completed: Option<bool>,
    /// New priority flag.
    pub priority: Option<bool>,
    /// Replacement tag set.
    pub tags: Option<BTreeSet<String>>,
    /// Replacement subtask list.
    pub subtasks: Option<Vec<Subtask>>,
    /// Replacement dependency list.
    pub dependencies: Option<Vec<TaskId>>,
    /// New due date; `Some(None)` clears it.
    pub due_at: Option<Option<DateTime<Utc>>>,
}

impl TaskPatch {
    /// Check whether the patch carries no fields at all.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.notes.is_none()
            && self.list.is_none()
            && self.completed.is_none()
            && self.priority.is_none()
            && self.tags.is_none()
            && self.subtasks.is_none()
            && self.dependencies.is_none()
            && self.due_at.is_none()
    }

    /// Validate the patch against the record schema for the given task.
    pub fn validate(&self, target: &TaskId) -> Result<(), SyncError> {
        if self.is_empty() {
            return Err(SyncError::InvalidData("patch carries no fields".into()));
        }
        if let Some(title) = &self.title {
            if title.trim().is_empty() {
                return Err(SyncError::InvalidData("task title must not be empty".into()));
            }
        }
        if let Some(list) = &self.list {
            if list.trim().is_empty() {
                return Err(SyncError::InvalidData("list name must not be empty".into()));
            }
        }
        if let Some(dependencies) = &self.dependencies {
            if dependencies.contains(target) {
                return Err(SyncError::InvalidData(format!(
                    "task {target} cannot depend on itself"
                )));
            }
        }
        Ok(())
    }
}
