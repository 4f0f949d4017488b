//! File pipeline: whole-file and chunked upload/download with bounded
//! worker pools.
//!
//! Chunk 0 is uploaded first, serialized, because its request carries the
//! `iv_base` that must land in the metadata row before any recipient reads
//! meta; the remaining chunks fan out in parallel. Failed transfers retry
//! with exponential backoff; a chunked upload that exhausts its retries is
//! abandoned and the half-written file becomes sweeper fodder.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use cinder_core::types::{ChunkDownloadParams, ChunkUploadParams, InitChunkedRequest, WholeFileParams};
use cinder_core::{CinderError, CinderResult};
use cinder_crypto::chunked::{decrypt_chunk, encrypt_chunk, total_chunks};
use cinder_crypto::{cipher, codec, SecretKey};

use crate::note::{create_key_material, fragment_key, Access, CreatedSecret, Protection};
use crate::retry::with_backoff;
use crate::transport::SecretTransport;
use crate::map_crypto;

/// Concurrent chunk uploads. Matches browser per-origin connection budgets
/// and keeps individual request bodies ≤ 4 MiB each.
pub const UPLOAD_WORKERS: usize = 6;

/// Concurrent chunk downloads.
pub const DOWNLOAD_WORKERS: usize = 8;

/// Display name stored when the sender hides the original filename.
pub const HIDDEN_NAME_PLACEHOLDER: &str = "encrypted-file";

#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Chunk plaintext size for chunked mode, 1..=4 MiB
    pub chunk_bytes: u64,
    /// Files above this plaintext size upload chunked
    pub chunked_threshold_bytes: u64,
    pub retry_attempts: u32,
    pub retry_base: Duration,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_bytes: 4 * 1024 * 1024,
            chunked_threshold_bytes: 100 * 1024 * 1024,
            retry_attempts: 3,
            retry_base: Duration::from_secs(1),
        }
    }
}

pub struct FileOptions {
    pub expires_at: i64,
    pub protection: Protection,
    /// Store a placeholder display name and the real name encrypted
    pub hide_name: bool,
}

pub struct RevealedFile {
    /// Display name as the sender chose it (placeholder if hidden)
    pub file_name: String,
    /// The original name, only if the caller asked for it and the sender
    /// stored it encrypted
    pub real_name: Option<String>,
    pub data: Vec<u8>,
}

/// Encrypt and upload a file, choosing whole or chunked mode by size.
pub async fn upload_file(
    transport: Arc<dyn SecretTransport>,
    file_name: &str,
    data: &[u8],
    opts: FileOptions,
    config: &UploadConfig,
) -> CinderResult<CreatedSecret> {
    if data.is_empty() {
        return Err(CinderError::Validation("refusing to share an empty file".into()));
    }

    let (key, fragment, passphrase) = create_key_material(&opts.protection);

    let (display_name, hidden) = if opts.hide_name {
        let (iv, ciphertext) = cipher::encrypt_filename(&key, file_name).map_err(map_crypto)?;
        (
            HIDDEN_NAME_PLACEHOLDER.to_string(),
            Some((codec::encode(&ciphertext), codec::encode(&iv))),
        )
    } else {
        (file_name.to_string(), None)
    };
    let (encrypted_filename, filename_iv) = match hidden {
        Some((ct, iv)) => (Some(ct), Some(iv)),
        None => (None, None),
    };

    if data.len() as u64 <= config.chunked_threshold_bytes {
        let (iv, ciphertext) = cipher::encrypt_file_whole(&key, data).map_err(map_crypto)?;
        let created = transport
            .upload_whole_file(
                WholeFileParams {
                    file_name: display_name,
                    size_bytes: data.len() as u64,
                    iv: codec::encode(&iv),
                    expires_at: opts.expires_at,
                    encryption_salt: passphrase.as_ref().map(|p| p.encryption_salt.clone()),
                    validation_salt: passphrase.as_ref().map(|p| p.validation_salt.clone()),
                    kdf_iterations: passphrase.as_ref().map(|p| p.kdf_iterations),
                    passphrase_hash: passphrase.as_ref().map(|p| p.passphrase_hash.clone()),
                    encrypted_filename,
                    filename_iv,
                },
                ciphertext,
            )
            .await?;

        return Ok(CreatedSecret {
            id: created.id,
            fragment,
        });
    }

    // Chunked mode
    let total = total_chunks(data.len() as u64, config.chunk_bytes);
    let init = transport
        .init_chunked(InitChunkedRequest {
            file_name: display_name,
            size_bytes: data.len() as u64,
            chunk_bytes: config.chunk_bytes,
            total_chunks: total,
            expires_at: opts.expires_at,
            passphrase,
            encrypted_filename,
            filename_iv,
        })
        .await?;
    let file_id = init.id;

    let iv_base = codec::random_iv();
    let chunks: Vec<Vec<u8>> = data
        .chunks(config.chunk_bytes as usize)
        .map(<[u8]>::to_vec)
        .collect();

    // Chunk 0 goes first and alone: its request carries the iv_base
    upload_one_chunk(
        &*transport,
        &key,
        &iv_base,
        &file_id,
        0,
        total,
        Some(codec::encode(&iv_base)),
        &chunks[0],
        config,
    )
    .await?;

    let semaphore = Arc::new(Semaphore::new(UPLOAD_WORKERS));
    let mut tasks = JoinSet::new();

    for (index, chunk) in chunks.into_iter().enumerate().skip(1) {
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore closed");
        let transport = transport.clone();
        let key = key.clone();
        let file_id = file_id.clone();
        let config = config.clone();

        tasks.spawn(async move {
            let _permit = permit;
            upload_one_chunk(
                &*transport,
                &key,
                &iv_base,
                &file_id,
                index as u32,
                total,
                None,
                &chunk,
                &config,
            )
            .await
        });
    }

    while let Some(joined) = tasks.join_next().await {
        let result = joined.map_err(|e| CinderError::Other(e.into()))?;
        if let Err(e) = result {
            tasks.abort_all();
            tracing::warn!(file_id, error = %e, "chunked upload aborted; orphan left for sweeper");
            return Err(e);
        }
    }

    Ok(CreatedSecret {
        id: file_id,
        fragment,
    })
}

#[allow(clippy::too_many_arguments)]
async fn upload_one_chunk(
    transport: &dyn SecretTransport,
    key: &SecretKey,
    iv_base: &[u8; 12],
    file_id: &str,
    index: u32,
    total: u32,
    iv_base_param: Option<String>,
    plaintext: &[u8],
    config: &UploadConfig,
) -> CinderResult<()> {
    let ciphertext = encrypt_chunk(key, iv_base, index, total, plaintext).map_err(map_crypto)?;

    with_backoff(config.retry_attempts, config.retry_base, || {
        transport.upload_chunk(
            ChunkUploadParams {
                file_id: file_id.to_string(),
                index,
                total,
                iv_base: iv_base_param.clone(),
            },
            ciphertext.clone(),
        )
    })
    .await
}

/// Fetch metadata, resolve the key, download and decrypt.
///
/// With `reveal_real_name` the stored encrypted filename (if any) is
/// decrypted; by default the sender-chosen display name is all the caller
/// sees, so a hidden name cannot leak through a download prompt.
pub async fn download_file(
    transport: Arc<dyn SecretTransport>,
    id: &str,
    access: Access,
    reveal_real_name: bool,
) -> CinderResult<RevealedFile> {
    let meta = transport.file_meta(id).await?;

    let key = match access {
        Access::Fragment(fragment) => fragment_key(&fragment)?,
        Access::Passphrase(passphrase) => {
            let (validation_salt, encryption_salt, iterations) = match (
                &meta.validation_salt,
                &meta.encryption_salt,
                meta.kdf_iterations,
            ) {
                (Some(v), Some(e), Some(i)) => (v, e, i),
                _ => {
                    return Err(CinderError::Validation(
                        "file is not passphrase-protected".into(),
                    ))
                }
            };

            let salt =
                codec::decode_array(validation_salt, "validation_salt").map_err(map_crypto)?;
            let hash =
                cinder_crypto::kdf::derive_validation_hash(&passphrase, &salt, iterations);
            if !transport
                .validate_file_passphrase(id, &codec::encode(&hash))
                .await?
            {
                return Err(CinderError::Unauthorized);
            }

            let salt =
                codec::decode_array(encryption_salt, "encryption_salt").map_err(map_crypto)?;
            cinder_crypto::kdf::derive_key(&passphrase, &salt, iterations)
        }
    };

    let iv_base = codec::decode_array(&meta.iv_base, "iv_base").map_err(map_crypto)?;

    let data = if meta.total_chunks == 1 {
        let ciphertext = transport.download_whole(id, &meta.download_token).await?;
        cipher::decrypt_file_whole(&key, &iv_base, &ciphertext).map_err(map_crypto)?
    } else {
        let total = meta.total_chunks;
        let semaphore = Arc::new(Semaphore::new(DOWNLOAD_WORKERS));
        let mut tasks = JoinSet::new();

        for index in 0..total {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .expect("semaphore closed");
            let transport = transport.clone();
            let key = key.clone();
            let token = meta.download_token.clone();
            let id = id.to_string();

            tasks.spawn(async move {
                let _permit = permit;
                let encrypted = transport
                    .download_chunk(ChunkDownloadParams {
                        file_id: id,
                        index,
                        download_token: token,
                    })
                    .await?;
                let piece =
                    decrypt_chunk(&key, &iv_base, index, total, &encrypted).map_err(map_crypto)?;
                Ok::<_, CinderError>((index, piece))
            });
        }

        let mut pieces: Vec<Option<Vec<u8>>> = vec![None; total as usize];
        while let Some(joined) = tasks.join_next().await {
            match joined.map_err(|e| CinderError::Other(e.into()))? {
                Ok((index, piece)) => pieces[index as usize] = Some(piece),
                Err(e) => {
                    tasks.abort_all();
                    return Err(e);
                }
            }
        }

        // Tell the server the download is complete so it can burn the record
        if let Err(e) = transport.finalize(id, &meta.download_token).await {
            tracing::warn!(id, error = %e, "finalize failed; expiry will reclaim the file");
        }

        let mut data = Vec::new();
        for piece in pieces {
            data.extend_from_slice(&piece.expect("every index joined"));
        }
        data
    };

    let real_name = if reveal_real_name {
        match (&meta.encrypted_filename, &meta.filename_iv) {
            (Some(ciphertext), Some(iv)) => {
                let iv = codec::decode_array(iv, "filename_iv").map_err(map_crypto)?;
                let ciphertext = codec::decode(ciphertext).map_err(map_crypto)?;
                Some(cipher::decrypt_filename(&key, &iv, &ciphertext).map_err(map_crypto)?)
            }
            _ => None,
        }
    } else {
        None
    };

    Ok(RevealedFile {
        file_name: meta.file_name,
        real_name,
        data,
    })
}
