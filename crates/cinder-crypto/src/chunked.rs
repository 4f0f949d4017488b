//! Chunked AES-256-GCM with position-binding AAD.
//!
//! Encrypted chunk format:
//! ```text
//! ciphertext[N] ‖ tag[16]          IV is derived, not stored
//! IV  = iv_base[0..8] ‖ chunk_index as u32 big-endian
//! AAD = ASCII "chunk:<index>/<total>"
//! ```
//!
//! GCM alone authenticates a chunk's bytes but not its position. The AAD
//! binds each chunk to its index within a specific total, so reordering,
//! duplicating, dropping or splicing chunks from a file of a different
//! length fails authentication instead of silently corrupting plaintext.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};

use crate::cipher::SecretKey;
use crate::codec::random_iv;
use crate::{CryptoError, CryptoResult, IV_SIZE, TAG_SIZE};

/// Derive the IV for chunk `index`: copy `iv_base` and overwrite its trailing
/// 32 bits with the index, big-endian.
pub fn chunk_iv(iv_base: &[u8; IV_SIZE], index: u32) -> [u8; IV_SIZE] {
    let mut iv = *iv_base;
    iv[8..12].copy_from_slice(&index.to_be_bytes());
    iv
}

/// AAD for chunk `index` of `total`: the ASCII string `chunk:<index>/<total>`.
pub fn chunk_aad(index: u32, total: u32) -> Vec<u8> {
    format!("chunk:{index}/{total}").into_bytes()
}

/// Encrypt one chunk. Returns `ciphertext‖tag`.
pub fn encrypt_chunk(
    key: &SecretKey,
    iv_base: &[u8; IV_SIZE],
    index: u32,
    total: u32,
    plaintext: &[u8],
) -> CryptoResult<Vec<u8>> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let iv = chunk_iv(iv_base, index);
    let aad = chunk_aad(index, total);

    cipher
        .encrypt(
            Nonce::from_slice(&iv),
            Payload {
                msg: plaintext,
                aad: &aad,
            },
        )
        .map_err(|_| CryptoError::AuthFailure)
}

/// Decrypt one chunk, re-deriving IV and AAD from `(iv_base, index, total)`.
pub fn decrypt_chunk(
    key: &SecretKey,
    iv_base: &[u8; IV_SIZE],
    index: u32,
    total: u32,
    encrypted: &[u8],
) -> CryptoResult<Vec<u8>> {
    if encrypted.len() < TAG_SIZE {
        return Err(CryptoError::InvalidLength {
            what: "chunk",
            got: encrypted.len(),
            expected: TAG_SIZE,
        });
    }

    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let iv = chunk_iv(iv_base, index);
    let aad = chunk_aad(index, total);

    cipher
        .decrypt(
            Nonce::from_slice(&iv),
            Payload {
                msg: encrypted,
                aad: &aad,
            },
        )
        .map_err(|_| CryptoError::AuthFailure)
}

/// Split `plaintext` into consecutive `chunk_size` pieces (the final one may
/// be shorter), encrypt each, and emit `(index, ciphertext‖tag)` through
/// `on_chunk`. Returns the freshly drawn `iv_base`.
///
/// Empty input produces a single empty chunk so `total_chunks >= 1` holds.
pub fn encrypt_file_chunked(
    key: &SecretKey,
    plaintext: &[u8],
    chunk_size: usize,
    mut on_chunk: impl FnMut(u32, Vec<u8>),
) -> CryptoResult<[u8; IV_SIZE]> {
    if chunk_size == 0 {
        return Err(CryptoError::InvalidLength {
            what: "chunk_size",
            got: 0,
            expected: 1,
        });
    }

    let iv_base = random_iv();
    let total = total_chunks(plaintext.len() as u64, chunk_size as u64);

    if plaintext.is_empty() {
        on_chunk(0, encrypt_chunk(key, &iv_base, 0, 1, b"")?);
        return Ok(iv_base);
    }

    for (index, piece) in plaintext.chunks(chunk_size).enumerate() {
        let index = index as u32;
        on_chunk(index, encrypt_chunk(key, &iv_base, index, total, piece)?);
    }

    Ok(iv_base)
}

/// Reassemble and decrypt chunks produced by [`encrypt_file_chunked`].
/// `chunks[i]` must be the ciphertext of chunk `i`; any authentication
/// failure fails the whole decryption.
pub fn decrypt_file_chunked<C: AsRef<[u8]>>(
    key: &SecretKey,
    iv_base: &[u8; IV_SIZE],
    chunks: &[C],
) -> CryptoResult<Vec<u8>> {
    let total = chunks.len() as u32;
    let mut plaintext = Vec::new();

    for (index, chunk) in chunks.iter().enumerate() {
        let piece = decrypt_chunk(key, iv_base, index as u32, total, chunk.as_ref())?;
        plaintext.extend_from_slice(&piece);
    }

    Ok(plaintext)
}

/// ceil(size / chunk_size), with a floor of 1 chunk.
pub fn total_chunks(size_bytes: u64, chunk_bytes: u64) -> u32 {
    (size_bytes.div_ceil(chunk_bytes).max(1)) as u32
}
