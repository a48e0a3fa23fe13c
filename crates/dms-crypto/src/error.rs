//! # Cryptographic Error Types
//!
//! Structured errors for field-level encryption. Uses `thiserror` for
//! ergonomic error definitions with diagnostic context.

use thiserror::Error;

/// Errors from [`Cipher`](crate::Cipher) operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CipherError {
    /// The configured secret could not be turned into a key.
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// The AEAD refused to encrypt. Surfaced so plaintext is never persisted
    /// in place of ciphertext.
    #[error("encryption failed: {0}")]
    EncryptionFailure(String),

    /// A field flagged for encryption holds a value that is not a string.
    #[error("cannot encrypt a {kind} value; only strings and null are supported")]
    UnsupportedValue {
        /// JSON type name of the rejected value.
        kind: &'static str,
    },

    /// The input has the `iv:cipher` shape but could not be decrypted:
    /// corrupted ciphertext, truncated tag, or a different key.
    #[error("decryption failed: {0}")]
    DecryptionFailure(String),

    /// The input does not have the `iv:cipher` shape. Typically a legacy
    /// plaintext value written before the field was flagged.
    #[error("value is not in iv:cipher form")]
    NotEncrypted,
}
