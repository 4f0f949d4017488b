//! Wire types for the Cinder HTTP API.
//!
//! All binary values travel as URL-safe unpadded base64 strings; timestamps
//! are Unix seconds. The same structs are used by the daemon handlers and by
//! the client pipeline, so the two sides cannot drift apart.

use serde::{Deserialize, Serialize};

/// The four passphrase-mode fields. Either all present or all absent;
/// the store rejects anything in between.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PassphraseFields {
    /// 16-byte PBKDF2 salt for the encryption key (base64url)
    pub encryption_salt: String,
    /// Independent 16-byte salt for the server-side validation hash (base64url)
    pub validation_salt: String,
    /// PBKDF2 iteration count used for both derivations
    pub kdf_iterations: u32,
    /// 32-byte PBKDF2 output over passphrase + validation_salt (base64url)
    pub passphrase_hash: String,
}

// ── Notes ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNoteRequest {
    /// AES-GCM output, ciphertext‖tag (base64url)
    pub ciphertext: String,
    /// 96-bit nonce (base64url)
    pub iv: String,
    /// Absolute expiry, Unix seconds
    pub expires_at: i64,
    /// Allowed reveals, 1..=100
    pub views: u32,
    #[serde(flatten)]
    pub passphrase: Option<PassphraseFields>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNoteResponse {
    pub id: String,
}

/// Passphrase parameters for a note; only served for passphrase-mode records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteMetaResponse {
    pub validation_salt: String,
    pub encryption_salt: String,
    pub iterations: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatePassphraseRequest {
    /// Candidate validation hash (base64url)
    pub hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatePassphraseResponse {
    pub valid: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchNoteResponse {
    pub ciphertext: String,
    pub iv: String,
}

// ── Files ────────────────────────────────────────────────────────────────────

/// Metadata accompanying a whole-file upload. The encrypted body travels as
/// the raw request payload; everything else rides in the query string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WholeFileParams {
    /// Display name chosen by the sender (real name or placeholder)
    pub file_name: String,
    /// Total plaintext length in bytes
    pub size_bytes: u64,
    /// GCM IV for the single blob (base64url)
    pub iv: String,
    pub expires_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_salt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_salt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kdf_iterations: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passphrase_hash: Option<String>,
    /// Original filename encrypted under the content key (base64url)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename_iv: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateFileResponse {
    pub id: String,
    pub storage_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitChunkedRequest {
    pub file_name: String,
    pub size_bytes: u64,
    /// Declared chunk size, 1..=4 MiB
    pub chunk_bytes: u64,
    /// ceil(size_bytes / chunk_bytes), at least 2 for chunked mode
    pub total_chunks: u32,
    pub expires_at: i64,
    #[serde(flatten)]
    pub passphrase: Option<PassphraseFields>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename_iv: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitChunkedResponse {
    pub id: String,
}

/// Query parameters for one chunk upload; the encrypted chunk is the body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkUploadParams {
    #[serde(rename = "fileId")]
    pub file_id: String,
    pub index: u32,
    pub total: u32,
    /// 96-bit base nonce, required on the first chunk (index 0)
    #[serde(rename = "ivBase", default, skip_serializing_if = "Option::is_none")]
    pub iv_base: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkUploadResponse {
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMetaResponse {
    pub file_name: String,
    /// Base nonce; per-chunk IVs are derived from it for chunked files
    pub iv_base: String,
    pub total_chunks: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_salt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_salt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kdf_iterations: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename_iv: Option<String>,
    #[serde(rename = "downloadToken")]
    pub download_token: String,
    /// Unix seconds
    #[serde(rename = "tokenExpiresAt")]
    pub token_expires_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadRequest {
    #[serde(rename = "downloadToken")]
    pub download_token: String,
}

/// Query parameters for one chunk download.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkDownloadParams {
    #[serde(rename = "fileId")]
    pub file_id: String,
    pub index: u32,
    #[serde(rename = "downloadToken")]
    pub download_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizeResponse {
    pub success: bool,
    #[serde(rename = "chunksDeleted")]
    pub chunks_deleted: u32,
}
