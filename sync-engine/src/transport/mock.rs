//! Mock relay for testing.
//!
//! Records every request and replays scripted responses. With nothing
//! scripted it behaves like a healthy, empty relay: pushes are acked with
//! the submitted clock, pulls return an empty page.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use sync_types::{
    PullRequest, PullResponse, PushOutcome, PushRequest, PushResponse, PushResult, RelayStatus,
};

use super::{NetworkError, RelayApi};
use crate::credential::Credential;

#[derive(Default)]
struct Inner {
    push_requests: Vec<PushRequest>,
    pull_requests: Vec<PullRequest>,
    push_script: VecDeque<Result<PushResponse, NetworkError>>,
    pull_script: VecDeque<Result<PullResponse, NetworkError>>,
    status_response: Option<RelayStatus>,
    credential: Option<Credential>,
}

/// In-memory [`RelayApi`] implementation for tests.
#[derive(Clone, Default)]
pub struct MockRelay {
    inner: Arc<Mutex<Inner>>,
}

impl MockRelay {
    /// Create a healthy, empty mock relay.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the response for the next push call.
    pub fn queue_push_response(&self, response: PushResponse) {
        self.lock().push_script.push_back(Ok(response));
    }

    /// Script a failure for the next push call.
    pub fn queue_push_failure(&self, error: NetworkError) {
        self.lock().push_script.push_back(Err(error));
    }

    /// Script the response for the next pull call.
    pub fn queue_pull_response(&self, response: PullResponse) {
        self.lock().pull_script.push_back(Ok(response));
    }

    /// Script a failure for the next pull call.
    pub fn queue_pull_failure(&self, error: NetworkError) {
        self.lock().pull_script.push_back(Err(error));
    }

    /// Script the `GET /sync/status` response.
    pub fn set_status_response(&self, status: RelayStatus) {
        self.lock().status_response = Some(status);
    }

    /// Every push request received so far.
    pub fn push_requests(&self) -> Vec<PushRequest> {
        self.lock().push_requests.clone()
    }

    /// Every pull request received so far.
    pub fn pull_requests(&self) -> Vec<PullRequest> {
        self.lock().pull_requests.clone()
    }

    /// The credential most recently installed via `set_credential`.
    pub fn credential(&self) -> Option<Credential> {
        self.lock().credential.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("mock relay lock poisoned")
    }

    /// Default push behavior: ack everything with the submitted clock.
    fn ack_all(request: &PushRequest) -> PushResponse {
        PushResponse {
            results: request
                .operations
                .iter()
                .map(|op| PushResult {
                    task_id: op.task_id.clone(),
                    outcome: PushOutcome::Ack,
                    server_clock: Some(op.vector_clock.clone()),
                    remote: None,
                })
                .collect(),
        }
    }
}

#[async_trait]
impl RelayApi for MockRelay {
    async fn push(&self, request: PushRequest) -> Result<PushResponse, NetworkError> {
        let mut inner = self.lock();
        inner.push_requests.push(request.clone());
        match inner.push_script.pop_front() {
            Some(scripted) => scripted,
            None => Ok(Self::ack_all(&request)),
        }
    }

    async fn pull(&self, request: PullRequest) -> Result<PullResponse, NetworkError> {
        let mut inner = self.lock();
        inner.pull_requests.push(request.clone());
        match inner.pull_script.pop_front() {
            Some(scripted) => scripted,
            None => Ok(PullResponse {
                tasks: Vec::new(),
                has_more: false,
            }),
        }
    }

    async fn status(&self) -> Result<RelayStatus, NetworkError> {
        Ok(self.lock().status_response.clone().unwrap_or(RelayStatus {
            pending_push: 0,
            pending_pull: 0,
            last_sync_at: None,
        }))
    }

    fn set_credential(&self, credential: Credential) {
        self.lock().credential = Some(credential);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_types::{DeviceId, OpKind, PushOperation, TaskId, VectorClock};

    fn push_request() -> PushRequest {
        PushRequest {
            device_id: DeviceId::from("dev-1"),
            operations: vec![PushOperation {
                task_id: TaskId::from("t1"),
                operation: OpKind::Create,
                vector_clock: VectorClock::new().increment(&DeviceId::from("dev-1")),
                encrypted_blob: vec![1, 2, 3],
                nonce: vec![0; 24],
            }],
        }
    }

    #[tokio::test]
    async fn default_push_acks_with_submitted_clock() {
        let relay = MockRelay::new();
        let request = push_request();

        let response = relay.push(request.clone()).await.unwrap();

        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].outcome, PushOutcome::Ack);
        assert_eq!(
            response.results[0].server_clock.as_ref().unwrap(),
            &request.operations[0].vector_clock
        );
    }

    #[tokio::test]
    async fn scripted_responses_replay_in_order() {
        let relay = MockRelay::new();
        relay.queue_push_failure(NetworkError::Server("down".into()));
        relay.queue_push_response(PushResponse { results: vec![] });

        assert!(relay.push(push_request()).await.is_err());
        assert!(relay.push(push_request()).await.is_ok());
        // Script exhausted: back to default behavior.
        assert!(relay.push(push_request()).await.is_ok());
    }

    #[tokio::test]
    async fn requests_are_recorded() {
        let relay = MockRelay::new();
        relay.push(push_request()).await.unwrap();

        let recorded = relay.push_requests();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].device_id, DeviceId::from("dev-1"));
    }

    #[tokio::test]
    async fn default_pull_is_an_empty_final_page() {
        let relay = MockRelay::new();
        let response = relay
            .pull(PullRequest {
                device_id: DeviceId::from("dev-1"),
                last_vector_clock: VectorClock::new(),
                since_timestamp: None,
                limit: 10,
            })
            .await
            .unwrap();

        assert!(response.tasks.is_empty());
        assert!(!response.has_more);
    }
}
