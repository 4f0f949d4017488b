//! cinder-client: the trusted half of the burn protocol.
//!
//! Everything secret happens here: key generation, passphrase derivation,
//! encryption and decryption. The server behind [`SecretTransport`] only
//! ever receives ciphertext and public parameters.
//!
//! Create path: generate key material → encrypt → post ciphertext.
//! Reveal path: fetch metadata → validate passphrase (if any) → obtain a
//! download token → fetch ciphertext → decrypt locally.

pub mod file;
pub mod note;
pub mod transport;

mod retry;

pub use file::{download_file, upload_file, FileOptions, RevealedFile, UploadConfig};
pub use note::{create_note, reveal_note, Access, CreatedSecret, NoteOptions, Protection};
pub use transport::SecretTransport;

use cinder_core::CinderError;
use cinder_crypto::CryptoError;

/// Crypto failures keep their identity; anything else about the inputs is a
/// validation problem.
pub(crate) fn map_crypto(e: CryptoError) -> CinderError {
    match e {
        CryptoError::AuthFailure => CinderError::AuthFailure,
        other => CinderError::Validation(other.to_string()),
    }
}
