//! Relay transport for tasksync.
//!
//! The engine talks to the relay through the [`RelayApi`] trait so the
//! protocol handler and orchestrator can be tested against [`MockRelay`]
//! without a network. [`HttpRelay`] is the production implementation.
//!
//! Every non-2xx response is classified into a [`NetworkError`] category;
//! only `Server` and `Transport` failures are retryable. The retry loop
//! lives here too, driven by the pure [`RetryPolicy`](sync_core::RetryPolicy)
//! from tasksync-core.

mod http;
mod mock;

pub use http::HttpRelay;
pub use mock::MockRelay;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use sync_core::{ErrorCategory, RetryPolicy};
use sync_types::{PullRequest, PullResponse, PushRequest, PushResponse, RelayStatus};

use crate::credential::Credential;

/// Network and relay errors, categorized for retry decisions and for
/// human-actionable status messages.
#[derive(Debug, Clone, Error)]
pub enum NetworkError {
    /// 401/403 - the credential was rejected; terminal until re-auth.
    #[error("relay rejected the credential: {0}")]
    Auth(String),

    /// 404 - endpoint or resource missing; a configuration problem.
    #[error("relay endpoint not found: {0}")]
    NotFound(String),

    /// 5xx - relay-side failure; retryable with backoff.
    #[error("relay server error: {0}")]
    Server(String),

    /// Any other 4xx.
    #[error("relay request failed: {0}")]
    Generic(String),

    /// Connection, DNS, or timeout failure before any HTTP status.
    #[error("network transport error: {0}")]
    Transport(String),
}

impl NetworkError {
    /// The status category this error maps to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Auth(_) => ErrorCategory::Auth,
            Self::NotFound(_) => ErrorCategory::NotFound,
            Self::Server(_) => ErrorCategory::Server,
            Self::Generic(_) => ErrorCategory::Generic,
            Self::Transport(_) => ErrorCategory::Transport,
        }
    }

    /// Whether the call may be retried automatically.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }
}

/// The contract the sync engine requires from the relay.
#[async_trait]
pub trait RelayApi: Send + Sync + 'static {
    /// `POST /sync/push` - submit pending operations.
    async fn push(&self, request: PushRequest) -> Result<PushResponse, NetworkError>;

    /// `POST /sync/pull` - fetch remote changes since a causal point.
    async fn pull(&self, request: PullRequest) -> Result<PullResponse, NetworkError>;

    /// `GET /sync/status` - aggregate pending counts.
    async fn status(&self) -> Result<RelayStatus, NetworkError>;

    /// Replace the bearer credential after re-authentication.
    fn set_credential(&self, credential: Credential);
}

/// Run a relay call, retrying retryable failures with exponential backoff.
///
/// The configured maximum is exhausted before the error is reported to the
/// caller: with `max_retries = 3` the operation runs up to four times with
/// three strictly increasing (jittered) sleeps between them.
pub(crate) async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut op: F,
) -> Result<T, NetworkError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, NetworkError>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() => {
                attempt += 1;
                if policy.is_exhausted(attempt) {
                    warn!(call = what, attempts = attempt, error = %err, "retries exhausted");
                    return Err(err);
                }
                let delay = policy.jittered_delay(attempt);
                warn!(call = what, attempt, delay_ms = delay.as_millis() as u64, error = %err,
                      "retrying after backoff");
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy() -> RetryPolicy {
        RetryPolicy::default() // max_retries = 3
    }

    #[tokio::test(start_paused = true)]
    async fn retryable_errors_are_retried_until_exhaustion() {
        let calls = AtomicU32::new(0);

        let result: Result<(), NetworkError> = with_retry(&policy(), "push", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(NetworkError::Server("boom".into())) }
        })
        .await;

        assert!(matches!(result, Err(NetworkError::Server(_))));
        // Initial attempt plus three retries.
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_errors_are_not_retried() {
        let calls = AtomicU32::new(0);

        let result: Result<(), NetworkError> = with_retry(&policy(), "push", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(NetworkError::Auth("rejected".into())) }
        })
        .await;

        assert!(matches!(result, Err(NetworkError::Auth(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_eventually_succeeds() {
        let calls = AtomicU32::new(0);

        let result = with_retry(&policy(), "pull", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(NetworkError::Transport("connection reset".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn categories_map_one_to_one() {
        assert_eq!(
            NetworkError::Auth("x".into()).category(),
            ErrorCategory::Auth
        );
        assert_eq!(
            NetworkError::NotFound("x".into()).category(),
            ErrorCategory::NotFound
        );
        assert_eq!(
            NetworkError::Server("x".into()).category(),
            ErrorCategory::Server
        );
        assert_eq!(
            NetworkError::Generic("x".into()).category(),
            ErrorCategory::Generic
        );
        assert_eq!(
            NetworkError::Transport("x".into()).category(),
            ErrorCategory::Transport
        );
    }

    #[test]
    fn only_server_and_transport_are_retryable() {
        assert!(NetworkError::Server("x".into()).is_retryable());
        assert!(NetworkError::Transport("x".into()).is_retryable());
        assert!(!NetworkError::Auth("x".into()).is_retryable());
        assert!(!NetworkError::NotFound("x".into()).is_retryable());
        assert!(!NetworkError::Generic("x".into()).is_retryable());
    }
}
