//! Relay API messages for tasksync.
//!
//! These are the JSON bodies exchanged with the relay over HTTP. Task
//! content only ever appears here as ciphertext (`encrypted_blob` plus a
//! per-message `nonce`); the relay stores and routes opaque blobs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{DeviceId, TaskId, VectorClock};

/// Base64 (URL-safe, unpadded) encoding for binary fields in JSON bodies.
mod base64_bytes {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        URL_SAFE_NO_PAD.decode(s).map_err(serde::de::Error::custom)
    }
}

/// The kind of a queued mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    /// The task has never been pushed to the relay.
    Create,
    /// The task exists remotely and is being changed.
    Update,
    /// The task is being removed.
    Delete,
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// One pending mutation inside a push request.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushOperation {
    /// Target task.
    pub task_id: TaskId,
    /// Mutation kind.
    pub operation: OpKind,
    /// The task's clock at enqueue time.
    pub vector_clock: VectorClock,
    /// Encrypted task payload; empty for deletes.
    #[serde(with = "base64_bytes")]
    pub encrypted_blob: Vec<u8>,
    /// Per-message encryption nonce; empty for deletes.
    #[serde(with = "base64_bytes")]
    pub nonce: Vec<u8>,
}

impl std::fmt::Debug for PushOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushOperation")
            .field("task_id", &self.task_id)
            .field("operation", &self.operation)
            .field("vector_clock", &self.vector_clock)
            .field(
                "encrypted_blob",
                &format!("[{} bytes]", self.encrypted_blob.len()),
            )
            .field("nonce", &format!("[{} bytes]", self.nonce.len()))
            .finish()
    }
}

/// Body of `POST /sync/push`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    /// The pushing device (must match the credential's claim).
    pub device_id: DeviceId,
    /// Live queue items, oldest first.
    pub operations: Vec<PushOperation>,
}

/// Relay verdict for one pushed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushOutcome {
    /// Durably applied; the item may be dequeued.
    Ack,
    /// The relay's stored clock is concurrent with the submitted one.
    Conflict,
}

/// Per-operation result inside a push response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResult {
    /// The task the result refers to.
    pub task_id: TaskId,
    /// Ack or conflict.
    pub outcome: PushOutcome,
    /// Relay-side clock after applying the operation (acks only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_clock: Option<VectorClock>,
    /// The relay's current version, attached to conflict markers so the
    /// client can resolve without an extra pull.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteTask>,
}

/// Body of the `POST /sync/push` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResponse {
    /// One result per submitted operation, same order.
    pub results: Vec<PushResult>,
}

/// Body of `POST /sync/pull`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    /// The pulling device.
    pub device_id: DeviceId,
    /// The device's last known causal point.
    pub last_vector_clock: VectorClock,
    /// Only changes at or after this instant; None on first sync.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since_timestamp: Option<DateTime<Utc>>,
    /// Page size limit; the engine pages until `has_more` is false.
    pub limit: u32,
}

/// One remote task version in a pull response or conflict marker.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteTask {
    /// Task identifier.
    pub id: TaskId,
    /// Encrypted task payload.
    #[serde(with = "base64_bytes")]
    pub encrypted_blob: Vec<u8>,
    /// Per-message encryption nonce.
    #[serde(with = "base64_bytes")]
    pub nonce: Vec<u8>,
    /// The remote version's clock.
    pub vector_clock: VectorClock,
    /// When the relay last stored this task.
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Debug for RemoteTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteTask")
            .field("id", &self.id)
            .field(
                "encrypted_blob",
                &format!("[{} bytes]", self.encrypted_blob.len()),
            )
            .field("vector_clock", &self.vector_clock)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Body of the `POST /sync/pull` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    /// Remote changes since the requested causal point.
    pub tasks: Vec<RemoteTask>,
    /// Whether another page is available.
    pub has_more: bool,
}

/// Body of the `GET /sync/status` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayStatus {
    /// Operations the relay has accepted but not yet fanned out.
    pub pending_push: u64,
    /// Changes waiting for this device to pull.
    pub pending_pull: u64,
    /// Last completed exchange with this device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn clock_a2b1() -> VectorClock {
        VectorClock::from([(DeviceId::from("A"), 2), (DeviceId::from("B"), 1)])
    }

    #[test]
    fn push_request_uses_camel_case_fields() {
        let req = PushRequest {
            device_id: DeviceId::from("dev-1"),
            operations: vec![PushOperation {
                task_id: TaskId::from("t1"),
                operation: OpKind::Update,
                vector_clock: clock_a2b1(),
                encrypted_blob: vec![1, 2, 3],
                nonce: vec![9; 24],
            }],
        };

        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("deviceId").is_some());
        let op = &json["operations"][0];
        assert!(op.get("taskId").is_some());
        assert!(op.get("vectorClock").is_some());
        assert!(op.get("encryptedBlob").is_some());
        assert_eq!(op["operation"], "update");
    }

    #[test]
    fn blob_fields_are_base64_strings() {
        let op = PushOperation {
            task_id: TaskId::from("t1"),
            operation: OpKind::Create,
            vector_clock: VectorClock::new(),
            encrypted_blob: vec![0xDE, 0xAD, 0xBE, 0xEF],
            nonce: vec![0; 24],
        };

        let json = serde_json::to_value(&op).unwrap();
        assert!(json["encryptedBlob"].is_string());

        let restored: PushOperation = serde_json::from_value(json).unwrap();
        assert_eq!(restored.encrypted_blob, vec![0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn push_response_roundtrip() {
        let resp = PushResponse {
            results: vec![
                PushResult {
                    task_id: TaskId::from("t1"),
                    outcome: PushOutcome::Ack,
                    server_clock: Some(clock_a2b1()),
                    remote: None,
                },
                PushResult {
                    task_id: TaskId::from("t2"),
                    outcome: PushOutcome::Conflict,
                    server_clock: None,
                    remote: Some(RemoteTask {
                        id: TaskId::from("t2"),
                        encrypted_blob: vec![7; 40],
                        nonce: vec![1; 24],
                        vector_clock: clock_a2b1(),
                        updated_at: Utc.with_ymd_and_hms(2024, 1, 10, 9, 0, 0).unwrap(),
                    }),
                },
            ],
        };

        let json = serde_json::to_string(&resp).unwrap();
        let restored: PushResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(resp, restored);
    }

    #[test]
    fn pull_request_omits_absent_since_timestamp() {
        let req = PullRequest {
            device_id: DeviceId::from("dev-1"),
            last_vector_clock: VectorClock::new(),
            since_timestamp: None,
            limit: 50,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("sinceTimestamp").is_none());
    }

    #[test]
    fn pull_response_roundtrip() {
        let resp = PullResponse {
            tasks: vec![RemoteTask {
                id: TaskId::from("t1"),
                encrypted_blob: vec![5; 16],
                nonce: vec![2; 24],
                vector_clock: clock_a2b1(),
                updated_at: Utc.with_ymd_and_hms(2024, 1, 10, 9, 0, 0).unwrap(),
            }],
            has_more: true,
        };

        let json = serde_json::to_string(&resp).unwrap();
        let restored: PullResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(resp, restored);
        assert!(restored.has_more);
    }

    #[test]
    fn op_kind_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&OpKind::Delete).unwrap(), "\"delete\"");
        assert_eq!(OpKind::Create.to_string(), "create");
    }

    #[test]
    fn push_operation_debug_hides_blob_bytes() {
        let op = PushOperation {
            task_id: TaskId::from("t1"),
            operation: OpKind::Create,
            vector_clock: VectorClock::new(),
            encrypted_blob: vec![0xAB; 8],
            nonce: vec![0xCD; 24],
        };
        let debug = format!("{op:?}");
        assert!(debug.contains("[8 bytes]"));
        assert!(!debug.contains("171")); // 0xAB
    }

    #[test]
    fn relay_status_roundtrip() {
        let status = RelayStatus {
            pending_push: 3,
            pending_pull: 1,
            last_sync_at: None,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["pendingPush"], 3);
        assert!(json.get("lastSyncAt").is_none());
    }
}
