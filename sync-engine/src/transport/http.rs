//! HTTP implementation of the relay transport.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::RwLock;
use std::time::Duration;

use sync_types::{PullRequest, PullResponse, PushRequest, PushResponse, RelayStatus};

use super::{NetworkError, RelayApi};
use crate::credential::Credential;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Authenticated HTTP client for the relay API.
pub struct HttpRelay {
    client: reqwest::Client,
    base_url: String,
    credential: RwLock<Credential>,
}

impl HttpRelay {
    /// Create a relay client for the given base URL.
    pub fn new(base_url: &str, credential: Credential) -> Result<Self, NetworkError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| NetworkError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credential: RwLock::new(credential),
        })
    }

    fn bearer(&self) -> String {
        self.credential
            .read()
            .expect("credential lock poisoned")
            .token()
            .to_string()
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, NetworkError> {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(self.bearer())
            .json(body)
            .send()
            .await
            .map_err(map_transport)?;

        decode_response(response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, NetworkError> {
        let response = self
            .client
            .get(format!("{}{path}", self.base_url))
            .bearer_auth(self.bearer())
            .send()
            .await
            .map_err(map_transport)?;

        decode_response(response).await
    }
}

#[async_trait]
impl RelayApi for HttpRelay {
    async fn push(&self, request: PushRequest) -> Result<PushResponse, NetworkError> {
        self.post_json("/sync/push", &request).await
    }

    async fn pull(&self, request: PullRequest) -> Result<PullResponse, NetworkError> {
        self.post_json("/sync/pull", &request).await
    }

    async fn status(&self) -> Result<RelayStatus, NetworkError> {
        self.get_json("/sync/status").await
    }

    fn set_credential(&self, credential: Credential) {
        *self.credential.write().expect("credential lock poisoned") = credential;
    }
}

/// Map transport-level failures (no HTTP status available).
fn map_transport(err: reqwest::Error) -> NetworkError {
    NetworkError::Transport(err.to_string())
}

/// Classify a non-2xx status into an error category with a
/// human-actionable message.
fn classify(status: StatusCode, body: &str) -> NetworkError {
    let detail = if body.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("HTTP {}: {}", status.as_u16(), body)
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => NetworkError::Auth(format!(
            "{detail}; sign in again to resume sync"
        )),
        StatusCode::NOT_FOUND => NetworkError::NotFound(format!(
            "{detail}; check the configured relay URL"
        )),
        s if s.is_server_error() => NetworkError::Server(detail),
        _ => NetworkError::Generic(detail),
    }
}

async fn decode_response<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, NetworkError> {
    let status = response.status();
    if status.is_success() {
        response
            .json()
            .await
            .map_err(|e| NetworkError::Generic(format!("malformed relay response: {e}")))
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(classify(status, body.trim()))
    }
}
