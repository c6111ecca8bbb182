//! Sync status model and cycle state machine.
//!
//! The orchestrator's lifecycle is `Idle → Syncing → {Success, Error,
//! Conflict} → Idle`. Transitions are validated by a pure state machine so
//! illegal jumps (e.g. straight from `Idle` to `Success`) cannot happen,
//! no matter how the orchestrator's async code interleaves.
//!
//! [`SyncStatus`] is the snapshot published to the UI collaborator. It is
//! never persisted: on process start it is rebuilt from the queue and the
//! outcome of the next exchange.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Phase of the sync engine's cycle state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    /// No cycle running, nothing noteworthy to report.
    Idle,
    /// A push-then-pull cycle is in flight.
    Syncing,
    /// The last cycle completed cleanly with an empty queue.
    Success,
    /// The last cycle failed; `SyncStatus` carries the categorized error.
    Error,
    /// The resolver ran during the current cycle; transient.
    Conflict,
}

/// Events driving the cycle state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleEvent {
    /// A timer, manual refresh, or connectivity trigger started a cycle.
    CycleStarted,
    /// Push or pull surfaced a causally-concurrent remote version.
    ConflictDetected,
    /// The resolver merged and re-queued; the cycle continues.
    ResolutionApplied,
    /// Push and pull both finished cleanly.
    CycleSucceeded,
    /// Retries were exhausted or a terminal error occurred.
    CycleFailed,
    /// Terminal phase acknowledged; return to idle.
    Settled,
}

impl SyncPhase {
    /// Process an event and return the next phase.
    ///
    /// Pure function; invalid transitions keep the current phase.
    pub fn on_event(self, event: CycleEvent) -> Self {
        match (self, event) {
            (Self::Idle, CycleEvent::CycleStarted) => Self::Syncing,
            // A new trigger from a terminal phase skips the idle hop.
            (Self::Success | Self::Error | Self::Conflict, CycleEvent::CycleStarted) => {
                Self::Syncing
            }
            (Self::Syncing, CycleEvent::ConflictDetected) => Self::Conflict,
            (Self::Conflict, CycleEvent::ResolutionApplied) => Self::Syncing,
            (Self::Syncing | Self::Conflict, CycleEvent::CycleSucceeded) => Self::Success,
            (Self::Syncing | Self::Conflict, CycleEvent::CycleFailed) => Self::Error,
            (Self::Success | Self::Error | Self::Conflict, CycleEvent::Settled) => Self::Idle,
            (phase, _) => phase,
        }
    }

    /// Whether a cycle is currently in flight.
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Syncing | Self::Conflict)
    }
}

impl Default for SyncPhase {
    fn default() -> Self {
        Self::Idle
    }
}

/// Categorization of a failed exchange, mapped from the network layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    /// 401/403 - credential rejected; re-authentication required.
    Auth,
    /// 404 - endpoint or resource missing; configuration problem.
    NotFound,
    /// 5xx - relay-side failure.
    Server,
    /// Connection, DNS, or timeout failure before an HTTP status.
    Transport,
    /// Any other 4xx.
    Generic,
    /// Local database I/O failure.
    Storage,
}

impl ErrorCategory {
    /// Whether failures of this category may be retried automatically.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Server | Self::Transport)
    }
}

/// A categorized, human-actionable error carried by [`SyncStatus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusError {
    /// What went wrong, programmatically.
    pub category: ErrorCategory,
    /// What to tell the user.
    pub message: String,
}

/// Process-wide engine health, re-derived continuously; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    /// Current cycle phase.
    pub phase: SyncPhase,
    /// Live queue items awaiting push.
    pub pending: u64,
    /// Error from the last failed exchange, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<StatusError>,
    /// When the engine will try again, while backing off.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_retry_at: Option<DateTime<Utc>>,
}

impl SyncStatus {
    /// Fresh idle status, as rebuilt on process start.
    pub fn idle(pending: u64) -> Self {
        Self {
            phase: SyncPhase::Idle,
            pending,
            last_error: None,
            next_retry_at: None,
        }
    }
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self::idle(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle() {
        assert_eq!(SyncPhase::default(), SyncPhase::Idle);
        assert_eq!(SyncStatus::default().phase, SyncPhase::Idle);
    }

    #[test]
    fn cycle_start_enters_syncing() {
        assert_eq!(
            SyncPhase::Idle.on_event(CycleEvent::CycleStarted),
            SyncPhase::Syncing
        );
    }

    #[test]
    fn clean_cycle_reaches_success_then_idle() {
        let phase = SyncPhase::Idle
            .on_event(CycleEvent::CycleStarted)
            .on_event(CycleEvent::CycleSucceeded);
        assert_eq!(phase, SyncPhase::Success);
        assert_eq!(phase.on_event(CycleEvent::Settled), SyncPhase::Idle);
    }

    #[test]
    fn conflict_is_transient() {
        let phase = SyncPhase::Syncing.on_event(CycleEvent::ConflictDetected);
        assert_eq!(phase, SyncPhase::Conflict);

        // Resolution returns to syncing, and the cycle can still succeed.
        let phase = phase
            .on_event(CycleEvent::ResolutionApplied)
            .on_event(CycleEvent::CycleSucceeded);
        assert_eq!(phase, SyncPhase::Success);
    }

    #[test]
    fn failure_from_syncing_enters_error() {
        assert_eq!(
            SyncPhase::Syncing.on_event(CycleEvent::CycleFailed),
            SyncPhase::Error
        );
    }

    #[test]
    fn new_trigger_restarts_from_terminal_phases() {
        for phase in [SyncPhase::Success, SyncPhase::Error, SyncPhase::Conflict] {
            assert_eq!(phase.on_event(CycleEvent::CycleStarted), SyncPhase::Syncing);
        }
    }

    #[test]
    fn invalid_transitions_keep_phase() {
        assert_eq!(
            SyncPhase::Idle.on_event(CycleEvent::CycleSucceeded),
            SyncPhase::Idle
        );
        assert_eq!(
            SyncPhase::Idle.on_event(CycleEvent::ConflictDetected),
            SyncPhase::Idle
        );
    }

    #[test]
    fn busy_phases() {
        assert!(SyncPhase::Syncing.is_busy());
        assert!(SyncPhase::Conflict.is_busy());
        assert!(!SyncPhase::Idle.is_busy());
        assert!(!SyncPhase::Error.is_busy());
    }

    #[test]
    fn only_server_and_transport_are_retryable() {
        assert!(ErrorCategory::Server.is_retryable());
        assert!(ErrorCategory::Transport.is_retryable());
        assert!(!ErrorCategory::Auth.is_retryable());
        assert!(!ErrorCategory::NotFound.is_retryable());
        assert!(!ErrorCategory::Generic.is_retryable());
        assert!(!ErrorCategory::Storage.is_retryable());
    }

    #[test]
    fn status_serializes_for_the_ui() {
        let status = SyncStatus {
            phase: SyncPhase::Error,
            pending: 2,
            last_error: Some(StatusError {
                category: ErrorCategory::Server,
                message: "relay unavailable".into(),
            }),
            next_retry_at: None,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["phase"], "error");
        assert_eq!(json["lastError"]["category"], "server");
    }
}
