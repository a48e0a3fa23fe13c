//! # Field Cipher
//!
//! Symmetric encryption of opaque string values stored inside document
//! payloads.
//!
//! ## Wire Format
//!
//! `<nonceHex>:<cipherHex>`: a 96-bit random nonce and the AES-256-GCM
//! ciphertext with its 128-bit tag appended, both lowercase hex. A fresh
//! nonce is drawn on every call, so encrypting the same plaintext twice
//! yields two different strings. Never compare ciphertexts for equality.
//!
//! ## Key Derivation
//!
//! The key is derived once at construction with scrypt (N = 2^14, r = 8,
//! p = 1) over the configured secret and a fixed salt. There is no key
//! versioning: changing the secret makes previously written values
//! undecryptable.
//!
//! ## Fail-Open Decryption
//!
//! [`Cipher::decrypt`] never errors. Values that are not in wire format or
//! that fail authentication are returned unchanged and logged, so a read of
//! a legacy or corrupted value degrades instead of failing. Callers that
//! must tell the two cases apart use [`Cipher::try_decrypt`].

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use serde_json::Value;
use zeroize::Zeroizing;

use crate::error::CipherError;

/// Derived key length in bytes (AES-256).
pub const KEY_LEN: usize = 32;

/// AES-GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// AES-GCM authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Fixed scrypt salt. Changing it is equivalent to rotating the secret.
const KDF_SALT: &[u8] = b"dms-field-cipher/v1";

/// scrypt cost parameter as log2(N).
const KDF_LOG_N: u8 = 14;
const KDF_R: u32 = 8;
const KDF_P: u32 = 1;

/// Encrypts and decrypts individual field values.
///
/// Immutable after construction; `Send + Sync` and cheap to clone.
#[derive(Clone)]
pub struct Cipher {
    aead: Aes256Gcm,
}

impl Cipher {
    /// Derive the field key from a configured secret.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::KeyDerivation`] if the secret is empty or the
    /// KDF rejects its parameters.
    pub fn from_secret(secret: &str) -> Result<Self, CipherError> {
        if secret.is_empty() {
            return Err(CipherError::KeyDerivation("secret must not be empty".into()));
        }
        let params = scrypt::Params::new(KDF_LOG_N, KDF_R, KDF_P, KEY_LEN)
            .map_err(|e| CipherError::KeyDerivation(e.to_string()))?;
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        scrypt::scrypt(secret.as_bytes(), KDF_SALT, &params, &mut key[..])
            .map_err(|e| CipherError::KeyDerivation(e.to_string()))?;
        Self::from_key(&key)
    }

    /// Build a cipher from raw key bytes (injected key material, tests).
    pub fn from_key(key: &[u8; KEY_LEN]) -> Result<Self, CipherError> {
        let aead = Aes256Gcm::new_from_slice(key)
            .map_err(|e| CipherError::KeyDerivation(e.to_string()))?;
        Ok(Self { aead })
    }

    /// Encrypt a plaintext string into `nonceHex:cipherHex`.
    ///
    /// The empty string has nothing to protect and is returned unchanged.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .aead
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| CipherError::EncryptionFailure(e.to_string()))?;
        Ok(format!("{}:{}", to_hex(&nonce), to_hex(&ciphertext)))
    }

    /// Encrypt a JSON field value.
    ///
    /// `null` passes through; strings are encrypted; any other type is
    /// rejected rather than stored in the clear.
    pub fn encrypt_value(&self, value: &Value) -> Result<Value, CipherError> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::String(s) => self.encrypt(s).map(Value::String),
            other => Err(CipherError::UnsupportedValue {
                kind: json_kind(other),
            }),
        }
    }

    /// Decrypt, returning the input unchanged on any failure.
    pub fn decrypt(&self, text: &str) -> String {
        match self.try_decrypt(text) {
            Ok(plaintext) => plaintext,
            Err(CipherError::NotEncrypted) => {
                tracing::debug!("value is not in iv:cipher form, returning as-is");
                text.to_string()
            }
            Err(e) => {
                tracing::warn!(error = %e, "fail-open decryption, returning stored value");
                text.to_string()
            }
        }
    }

    /// Decrypt a JSON field value. Non-string values are returned unchanged.
    pub fn decrypt_value(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.decrypt(s)),
            other => other.clone(),
        }
    }

    /// Decrypt, distinguishing legacy plaintext from corrupted ciphertext.
    ///
    /// # Errors
    ///
    /// - [`CipherError::NotEncrypted`] if the input is not in wire format.
    /// - [`CipherError::DecryptionFailure`] if the input is in wire format, but the tag does
    ///   not verify or the plaintext is not UTF-8.
    pub fn try_decrypt(&self, text: &str) -> Result<String, CipherError> {
        let (nonce_hex, cipher_hex) = split_wire(text).ok_or(CipherError::NotEncrypted)?;
        let nonce = from_hex(nonce_hex).ok_or(CipherError::NotEncrypted)?;
        let ciphertext = from_hex(cipher_hex).ok_or(CipherError::NotEncrypted)?;
        let plaintext = self
            .aead
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
            .map_err(|_| CipherError::DecryptionFailure("authentication tag mismatch".into()))?;
        String::from_utf8(plaintext)
            .map_err(|e| CipherError::DecryptionFailure(format!("plaintext is not UTF-8: {e}")))
    }
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Cipher(AES-256-GCM, key redacted)")
    }
}

/// Whether `text` has the `nonceHex:cipherHex` shape produced by
/// [`Cipher::encrypt`]. Shape only; says nothing about the key.
pub fn looks_encrypted(text: &str) -> bool {
    split_wire(text).is_some()
}

/// Split a wire-format value into its hex halves, checking lengths.
fn split_wire(text: &str) -> Option<(&str, &str)> {
    let (nonce_hex, cipher_hex) = text.split_once(':')?;
    let is_hex = |s: &str| s.bytes().all(|b| b.is_ascii_hexdigit());
    if nonce_hex.len() != NONCE_LEN * 2 || !is_hex(nonce_hex) {
        return None;
    }
    if cipher_hex.len() < (TAG_LEN + 1) * 2 || cipher_hex.len() % 2 != 0 || !is_hex(cipher_hex) {
        return None;
    }
    Some((nonce_hex, cipher_hex))
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn from_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 || !hex.is_ascii() {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
