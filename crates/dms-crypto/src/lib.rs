//! # dms-crypto: Field-Level Encryption
//!
//! Provides the [`Cipher`] used by the field security layer to encrypt
//! values flagged `x-encrypt: true` in a schema before they are persisted,
//! and to decrypt them on read.
//!
//! - **AES-256-GCM** authenticated encryption with a fresh random nonce per
//!   value.
//! - **scrypt** key derivation from a configured secret, once per process.
//! - **Fail-open decryption** for reads of legacy or corrupted values, with
//!   [`Cipher::try_decrypt`] for callers that need to know which it was.
//!
//! Key material is zeroized after the AEAD is keyed and never appears in
//! `Debug` output.

pub mod cipher;
pub mod error;

pub use cipher::{looks_encrypted, Cipher, KEY_LEN};
pub use error::CipherError;
