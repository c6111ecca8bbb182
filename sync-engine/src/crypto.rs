//! The encryption boundary.
//!
//! Task payloads are serialized and encrypted before they leave the
//! protocol handler; the relay stores and returns only an opaque blob plus
//! a per-message nonce. This module provides:
//! - Device-adaptive Argon2id derivation of the vault secret from the
//!   user-held passphrase (never transmitted)
//! - An HKDF-SHA256 payload subkey
//! - XChaCha20-Poly1305 encryption with 192-bit nonces
//!
//! # Security Notes
//!
//! - XChaCha20 uses 192-bit nonces (24 bytes), safe for random generation
//! - Argon2id parameters scale with available RAM for mobile/desktop parity
//! - The passphrase salt is a fixed domain-separation constant so every
//!   device of the same user derives the same vault secret
//! - Key material is zeroized on drop and redacted in Debug output

use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use hkdf::Hkdf;
use sha2::Sha256;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Nonce size for XChaCha20-Poly1305 (192 bits = 24 bytes).
pub const NONCE_SIZE: usize = 24;

/// Key size for XChaCha20-Poly1305 (256 bits = 32 bytes).
pub const KEY_SIZE: usize = 32;

/// Crypto errors.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Encryption failed.
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption failed (authentication error or wrong passphrase).
    #[error("decryption failed: authentication error")]
    DecryptionFailed,

    /// The nonce that arrived with a blob has the wrong length.
    #[error("invalid nonce length: expected {expected}, got {actual}")]
    InvalidNonceLength {
        /// Expected length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },

    /// Key derivation failed.
    #[error("key derivation failed: {0}")]
    KeyDerivationFailed(String),
}

/// Argon2id parameters for device-adaptive key derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Argon2Params {
    memory_mib: u32,
    iterations: u32,
    parallelism: u32,
}

impl Argon2Params {
    /// Create parameters based on available RAM in MB.
    ///
    /// Scaling:
    /// - < 2000 MB: 12 MiB, 3 iterations (low-end mobile)
    /// - < 4000 MB: 19 MiB, 2 iterations (mid-range mobile)
    /// - < 8000 MB: 46 MiB, 1 iteration (high-end mobile)
    /// - >= 8000 MB: 64 MiB, 3 iterations (desktop)
    pub fn for_ram_mb(ram_mb: u64) -> Self {
        if ram_mb < 2000 {
            Self {
                memory_mib: 12,
                iterations: 3,
                parallelism: 1,
            }
        } else if ram_mb < 4000 {
            Self {
                memory_mib: 19,
                iterations: 2,
                parallelism: 1,
            }
        } else if ram_mb < 8000 {
            Self {
                memory_mib: 46,
                iterations: 1,
                parallelism: 1,
            }
        } else {
            Self {
                memory_mib: 64,
                iterations: 3,
                parallelism: 4,
            }
        }
    }

    /// Get memory in MiB.
    pub fn memory_mib(&self) -> u32 {
        self.memory_mib
    }

    /// Get iteration count.
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    fn to_argon2_params(self) -> Result<Params, CryptoError> {
        Params::new(
            self.memory_mib * 1024, // MiB to KiB
            self.iterations,
            self.parallelism,
            Some(KEY_SIZE),
        )
        .map_err(|e| CryptoError::KeyDerivationFailed(e.to_string()))
    }
}

impl Default for Argon2Params {
    fn default() -> Self {
        Self::for_ram_mb(detect_available_ram_mb())
    }
}

/// Detect available RAM in megabytes.
pub fn detect_available_ram_mb() -> u64 {
    use sysinfo::System;
    let sys = System::new_all();
    sys.total_memory() / (1024 * 1024)
}

/// The root secret derived from the user's passphrase.
///
/// Every device of the same user derives the same secret; the passphrase
/// itself never leaves the device.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct VaultSecret([u8; KEY_SIZE]);

impl VaultSecret {
    /// Derive the vault secret from a passphrase using Argon2id.
    pub fn from_passphrase(passphrase: &str) -> Self {
        Self::from_passphrase_with_params(passphrase, Argon2Params::default())
    }

    /// Derive with explicit Argon2 parameters (tests use the cheap tier).
    pub fn from_passphrase_with_params(passphrase: &str, params: Argon2Params) -> Self {
        // Fixed domain-separation salt: derivation must agree across devices.
        let salt = b"tasksync-vault-secret-v1";

        let argon2_params = params.to_argon2_params().expect("invalid argon2 parameters");
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

        let mut output = [0u8; KEY_SIZE];
        argon2
            .hash_password_into(passphrase.as_bytes(), salt, &mut output)
            .expect("argon2 hash failed");

        Self(output)
    }

    /// Create a random secret (for testing).
    pub fn random() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        getrandom::getrandom(&mut bytes).expect("getrandom failed");
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

// Don't leak the secret in debug output
impl std::fmt::Debug for VaultSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VaultSecret([REDACTED])")
    }
}

/// The payload encryption key.
///
/// Derived from the vault secret via HKDF-SHA256 so future subkeys (e.g.
/// attachment keys) stay cryptographically separated.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PayloadKey([u8; KEY_SIZE]);

impl PayloadKey {
    /// Derive the payload key from a vault secret.
    pub fn derive(secret: &VaultSecret) -> Self {
        let hkdf = Hkdf::<Sha256>::new(Some(b"tasksync-payload-key-v1"), secret.as_bytes());

        let mut key = [0u8; KEY_SIZE];
        hkdf.expand(b"task-payload", &mut key)
            .expect("hkdf expand failed");

        Self(key)
    }

    /// Convenience: passphrase straight to payload key.
    pub fn from_passphrase(passphrase: &str) -> Self {
        Self::derive(&VaultSecret::from_passphrase(passphrase))
    }

    /// Encrypt a serialized task payload.
    ///
    /// Returns (ciphertext, nonce). The nonce is 192 bits (24 bytes),
    /// safe for random generation without cross-device coordination.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<(Vec<u8>, [u8; NONCE_SIZE]), CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        getrandom::getrandom(&mut nonce_bytes).expect("getrandom failed");
        let nonce = XNonce::from_slice(&nonce_bytes);

        let cipher = XChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| CryptoError::EncryptionFailed("aead encrypt failed".into()))?;

        Ok((ciphertext, nonce_bytes))
    }

    /// Decrypt a blob pulled from the relay.
    ///
    /// The nonce arrives as an untrusted wire field, so its length is
    /// validated here rather than assumed.
    pub fn decrypt(&self, ciphertext: &[u8], nonce: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if nonce.len() != NONCE_SIZE {
            return Err(CryptoError::InvalidNonceLength {
                expected: NONCE_SIZE,
                actual: nonce.len(),
            });
        }
        let nonce = XNonce::from_slice(nonce);

        let cipher = XChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)
    }
}

// Don't leak the key in debug output
impl std::fmt::Debug for PayloadKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PayloadKey([REDACTED])")
    }
}
