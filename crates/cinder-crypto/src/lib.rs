//! cinder-crypto: client-side encryption for Cinder
//!
//! The server only ever sees ciphertext and public parameters. Everything in
//! this crate runs on the sender's or recipient's machine.
//!
//! Pipeline: plaintext → AES-256-GCM encrypt (whole or per-chunk with
//! positional AAD) → base64url → upload
//!
//! Key material:
//! ```text
//! Link-with-key mode:  random 256-bit key, carried in the URL fragment
//! Passphrase mode:     PBKDF2-HMAC-SHA-256(passphrase, encryption_salt) → AES key
//!                      PBKDF2-HMAC-SHA-256(passphrase, validation_salt) → server-side hash
//!                      (two independent 16-byte salts, same iteration count)
//! ```

pub mod chunked;
pub mod cipher;
pub mod codec;
pub mod kdf;

pub use chunked::{decrypt_chunk, decrypt_file_chunked, encrypt_chunk, encrypt_file_chunked};
pub use cipher::{decrypt_bytes, encrypt_bytes, SecretKey};
pub use kdf::{derive_key, PassphraseMaterial};

use thiserror::Error;

/// Size of an AES-256 key in bytes
pub const KEY_SIZE: usize = 32;

/// Size of a GCM nonce (96-bit)
pub const IV_SIZE: usize = 12;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;

/// Size of a PBKDF2 salt
pub const SALT_SIZE: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// GCM tag mismatch: wrong key, corrupted data, or mismatched IV/AAD.
    /// Propagated unchanged to the caller; never folded into other classes.
    #[error("authentication failure")]
    AuthFailure,

    #[error("invalid {what} length: {got} bytes (expected {expected})")]
    InvalidLength {
        what: &'static str,
        got: usize,
        expected: usize,
    },

    #[error("invalid base64url input")]
    Codec,
}

pub type CryptoResult<T> = Result<T, CryptoError>;
