//! AES-256-GCM encryption of byte buffers.
//!
//! Output format: the 16-byte tag is appended to the ciphertext; the 12-byte
//! IV travels separately. No additional data is bound for plain buffers —
//! positional AAD is a chunked-mode concern (see [`crate::chunked`]).

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use zeroize::Zeroize;

use crate::codec::{random_iv, random_key_bytes};
use crate::{CryptoError, CryptoResult, IV_SIZE, KEY_SIZE, TAG_SIZE};

/// A 256-bit AES key. Zeroized on drop so key material does not linger
/// in freed memory.
#[derive(Clone)]
pub struct SecretKey {
    bytes: [u8; KEY_SIZE],
}

impl SecretKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// Generate a fresh random key (link-with-key mode).
    pub fn generate() -> Self {
        Self {
            bytes: random_key_bytes(),
        }
    }
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Encrypt a buffer under a fresh random IV.
///
/// Returns `(iv, ciphertext‖tag)`.
pub fn encrypt_bytes(key: &SecretKey, plaintext: &[u8]) -> CryptoResult<([u8; IV_SIZE], Vec<u8>)> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let iv = random_iv();

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|_| CryptoError::AuthFailure)?;

    Ok((iv, ciphertext))
}

/// Decrypt `ciphertext‖tag`. Fails with [`CryptoError::AuthFailure`] on any
/// tag mismatch.
pub fn decrypt_bytes(key: &SecretKey, iv: &[u8; IV_SIZE], ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
    if ciphertext.len() < TAG_SIZE {
        return Err(CryptoError::InvalidLength {
            what: "ciphertext",
            got: ciphertext.len(),
            expected: TAG_SIZE,
        });
    }

    let cipher = Aes256Gcm::new(key.as_bytes().into());
    cipher
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|_| CryptoError::AuthFailure)
}

/// Encrypt a whole file in one shot. Identical contract to [`encrypt_bytes`];
/// the returned IV doubles as the record's `iv_base`.
pub fn encrypt_file_whole(key: &SecretKey, bytes: &[u8]) -> CryptoResult<([u8; IV_SIZE], Vec<u8>)> {
    encrypt_bytes(key, bytes)
}

pub fn decrypt_file_whole(
    key: &SecretKey,
    iv_base: &[u8; IV_SIZE],
    ciphertext: &[u8],
) -> CryptoResult<Vec<u8>> {
    decrypt_bytes(key, iv_base, ciphertext)
}

/// Encrypt the original filename under the content key with its own IV.
/// Stored server-side so a recipient can opt in to seeing the real name.
pub fn encrypt_filename(key: &SecretKey, name: &str) -> CryptoResult<([u8; IV_SIZE], Vec<u8>)> {
    encrypt_bytes(key, name.as_bytes())
}

pub fn decrypt_filename(
    key: &SecretKey,
    iv: &[u8; IV_SIZE],
    ciphertext: &[u8],
) -> CryptoResult<String> {
    let bytes = decrypt_bytes(key, iv, ciphertext)?;
    String::from_utf8(bytes).map_err(|_| CryptoError::AuthFailure)
}
