//! Server seam: every HTTP operation the pipeline needs, as a trait.
//!
//! The pipeline does not care how requests reach the server — a browser
//! fetch shim, an HTTP client, or an in-process store in tests all satisfy
//! the same contract.

use async_trait::async_trait;

use cinder_core::types::{
    ChunkDownloadParams, ChunkUploadParams, CreateFileResponse, CreateNoteRequest,
    CreateNoteResponse, FetchNoteResponse, FileMetaResponse, FinalizeResponse,
    InitChunkedRequest, InitChunkedResponse, NoteMetaResponse, WholeFileParams,
};
use cinder_core::CinderResult;

#[async_trait]
pub trait SecretTransport: Send + Sync {
    // Notes
    async fn create_note(&self, req: CreateNoteRequest) -> CinderResult<CreateNoteResponse>;
    async fn note_meta(&self, id: &str) -> CinderResult<NoteMetaResponse>;
    async fn validate_note_passphrase(&self, id: &str, hash: &str) -> CinderResult<bool>;
    async fn fetch_note(&self, id: &str) -> CinderResult<FetchNoteResponse>;

    // Files
    async fn upload_whole_file(
        &self,
        params: WholeFileParams,
        ciphertext: Vec<u8>,
    ) -> CinderResult<CreateFileResponse>;
    async fn init_chunked(&self, req: InitChunkedRequest) -> CinderResult<InitChunkedResponse>;
    async fn upload_chunk(&self, params: ChunkUploadParams, bytes: Vec<u8>) -> CinderResult<()>;
    async fn file_meta(&self, id: &str) -> CinderResult<FileMetaResponse>;
    async fn validate_file_passphrase(&self, id: &str, hash: &str) -> CinderResult<bool>;
    async fn download_whole(&self, id: &str, token: &str) -> CinderResult<Vec<u8>>;
    async fn download_chunk(&self, params: ChunkDownloadParams) -> CinderResult<Vec<u8>>;
    async fn finalize(&self, id: &str, token: &str) -> CinderResult<FinalizeResponse>;
}
