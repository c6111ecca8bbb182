//! Shared helpers for engine tests.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use std::sync::Arc;

use sync_store::LocalDb;
use sync_types::{RemoteTask, TaskRecord};

use crate::config::EngineConfig;
use crate::credential::Credential;
use crate::crypto::{Argon2Params, PayloadKey, VaultSecret};
use crate::engine::SyncEngine;
use crate::transport::MockRelay;

/// A JWT-shaped credential whose payload names the given device.
pub(crate) fn credential_for(device: &str) -> Credential {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"EdDSA","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"deviceId":"{device}"}}"#).as_bytes());
    Credential::new(&format!("{header}.{payload}.fakesig"))
}

/// Payload key with the cheap Argon2 tier, so tests stay fast.
pub(crate) fn cheap_key(passphrase: &str) -> PayloadKey {
    PayloadKey::derive(&VaultSecret::from_passphrase_with_params(
        passphrase,
        Argon2Params::for_ram_mb(1500),
    ))
}

/// Engine bound to device `dev-a`, an in-memory database, and the given
/// mock relay. The background interval is set far out so only explicit
/// cycles run.
pub(crate) async fn engine_with_key(
    relay: MockRelay,
    key: Option<PayloadKey>,
) -> Arc<SyncEngine<MockRelay>> {
    let db = LocalDb::in_memory().await.unwrap();
    engine_on_db(db, relay, key).await
}

/// Same as [`engine_with_key`] but on an existing database handle.
pub(crate) async fn engine_on_db(
    db: LocalDb,
    relay: MockRelay,
    key: Option<PayloadKey>,
) -> Arc<SyncEngine<MockRelay>> {
    let config = EngineConfig::default().with_sync_interval_secs(3600);
    SyncEngine::new_with_key(config, credential_for("dev-a"), db, relay, key)
        .await
        .unwrap()
}

/// Wrap a task record the way the relay would serve it: encrypted blob,
/// fresh nonce, envelope clock and timestamp from the record.
pub(crate) fn remote_task(key: &PayloadKey, record: &TaskRecord) -> RemoteTask {
    let plaintext = record.to_bytes().unwrap();
    let (encrypted_blob, nonce) = key.encrypt(&plaintext).unwrap();
    RemoteTask {
        id: record.id.clone(),
        encrypted_blob,
        nonce: nonce.to_vec(),
        vector_clock: record.clock.clone(),
        updated_at: record.updated_at,
    }
}
