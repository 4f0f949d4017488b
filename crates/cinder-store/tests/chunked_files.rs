//! Integration tests for file records: whole-file burn, chunked upload
//! bookkeeping, token lifecycle, finalization and sweep.

use opendal::Operator;
use tempfile::TempDir;

use cinder_core::config::{KdfConfig, LimitsConfig};
use cinder_core::types::{InitChunkedRequest, WholeFileParams};
use cinder_core::CinderError;
use cinder_crypto::codec;
use cinder_store::files::chunk_object_path;
use cinder_store::BurnStore;

fn memory_operator() -> Operator {
    Operator::new(opendal::services::Memory::default())
        .expect("memory operator")
        .finish()
}

/// Tiny chunk bounds so tests do not shuffle megabytes around.
fn test_limits() -> LimitsConfig {
    LimitsConfig {
        chunk_min_bytes: 16,
        chunk_max_bytes: 1024,
        ..Default::default()
    }
}

async fn test_store(tmp: &TempDir) -> BurnStore {
    BurnStore::open(
        tmp.path().join("meta.db"),
        memory_operator(),
        test_limits(),
        KdfConfig {
            min_iterations: 1_000,
        },
    )
    .await
    .expect("open store")
}

fn in_one_hour() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp() + 3600
}

fn whole_params(size: u64) -> WholeFileParams {
    WholeFileParams {
        file_name: "secret-file".into(),
        size_bytes: size,
        iv: codec::encode(&[9u8; 12]),
        expires_at: in_one_hour(),
        encryption_salt: None,
        validation_salt: None,
        kdf_iterations: None,
        passphrase_hash: None,
        encrypted_filename: None,
        filename_iv: None,
    }
}

/// Ciphertext stand-in: size + 16-byte tag.
fn fake_ciphertext(size: u64) -> Vec<u8> {
    vec![0xCD; size as usize + 16]
}

fn chunked_request(size: u64, chunk: u64) -> InitChunkedRequest {
    InitChunkedRequest {
        file_name: "chunked-file".into(),
        size_bytes: size,
        chunk_bytes: chunk,
        total_chunks: size.div_ceil(chunk).max(1) as u32,
        expires_at: in_one_hour(),
        passphrase: None,
        encrypted_filename: None,
        filename_iv: None,
    }
}

/// Upload `total` chunks of `chunk` plaintext bytes each (`size` total),
/// chunk 0 first so the iv_base lands.
async fn upload_all(store: &BurnStore, id: &str, size: u64, chunk: u64) {
    let total = size.div_ceil(chunk).max(1) as u32;
    for index in 0..total {
        let plain = if u64::from(index + 1) * chunk <= size {
            chunk
        } else {
            size - u64::from(index) * chunk
        };
        let iv_base = (index == 0).then(|| codec::encode(&[5u8; 12]));
        store
            .upload_chunk(
                id,
                index,
                total,
                iv_base.as_deref(),
                vec![index as u8; plain as usize + 16],
            )
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn whole_file_download_burns_everything() {
    let tmp = TempDir::new().unwrap();
    let store = test_store(&tmp).await;

    let created = store
        .create_file_whole(&whole_params(100), fake_ciphertext(100))
        .await
        .unwrap();

    let meta = store.get_file_meta(&created.id).await.unwrap();
    assert_eq!(meta.total_chunks, 1);
    assert_eq!(meta.file_name, "secret-file");

    let (name, bytes) = store
        .download_whole(&created.id, &meta.download_token)
        .await
        .unwrap();
    assert_eq!(name, "secret-file");
    assert_eq!(bytes, fake_ciphertext(100));

    // Record, blob and any other tokens are gone
    assert!(matches!(
        store.get_file_meta(&created.id).await,
        Err(CinderError::Gone)
    ));
    assert!(!store.blobs().exists(&created.storage_path).await.unwrap());
}

#[tokio::test]
async fn single_use_token_cannot_be_replayed() {
    let tmp = TempDir::new().unwrap();
    let store = test_store(&tmp).await;

    let created = store
        .create_file_whole(&whole_params(50), fake_ciphertext(50))
        .await
        .unwrap();

    // Two meta calls mint two distinct tokens
    let meta_a = store.get_file_meta(&created.id).await.unwrap();
    let meta_b = store.get_file_meta(&created.id).await.unwrap();
    assert_ne!(meta_a.download_token, meta_b.download_token);

    store
        .download_whole(&created.id, &meta_a.download_token)
        .await
        .unwrap();

    // Token A is spent, token B died with the record
    for token in [&meta_a.download_token, &meta_b.download_token] {
        assert!(matches!(
            store.download_whole(&created.id, token).await,
            Err(CinderError::Unauthorized)
        ));
    }
}

#[tokio::test]
async fn chunked_upload_download_finalize_lifecycle() {
    let tmp = TempDir::new().unwrap();
    let store = test_store(&tmp).await;

    let (size, chunk) = (100u64, 32u64);
    let id = store
        .init_chunked_upload(&chunked_request(size, chunk))
        .await
        .unwrap();

    upload_all(&store, &id, size, chunk).await;

    let meta = store.get_file_meta(&id).await.unwrap();
    assert_eq!(meta.total_chunks, 4);
    assert_eq!(meta.iv_base, codec::encode(&[5u8; 12]));

    // Multi-use token serves every chunk without being consumed
    for index in 0..meta.total_chunks {
        let bytes = store
            .download_chunk(&id, index, &meta.download_token)
            .await
            .unwrap();
        assert_eq!(bytes[0], index as u8);
    }

    let done = store
        .finalize_chunked(&id, &meta.download_token)
        .await
        .unwrap();
    assert!(done.success);
    assert_eq!(done.chunks_deleted, 4);

    // Idempotent: repeating after deletion is success, not an error
    let again = store
        .finalize_chunked(&id, &meta.download_token)
        .await
        .unwrap();
    assert!(again.success);
    assert_eq!(again.chunks_deleted, 0);

    assert!(!store
        .blobs()
        .exists(&chunk_object_path(&id, 0))
        .await
        .unwrap());
}

#[tokio::test]
async fn chunk_upload_is_idempotent_and_bounds_checked() {
    let tmp = TempDir::new().unwrap();
    let store = test_store(&tmp).await;

    let id = store
        .init_chunked_upload(&chunked_request(64, 32))
        .await
        .unwrap();

    let iv = codec::encode(&[5u8; 12]);
    store
        .upload_chunk(&id, 0, 2, Some(&iv), vec![1u8; 48])
        .await
        .unwrap();

    // Retry of the same chunk: success, no overwrite
    store
        .upload_chunk(&id, 0, 2, Some(&iv), vec![9u8; 48])
        .await
        .unwrap();
    let stored = store
        .blobs()
        .read(&chunk_object_path(&id, 0))
        .await
        .unwrap()
        .to_vec();
    assert_eq!(stored, vec![1u8; 48], "existing part must not be overwritten");

    // Out-of-bounds index and mismatched total are rejected
    assert!(matches!(
        store.upload_chunk(&id, 2, 2, None, vec![1u8; 48]).await,
        Err(CinderError::Validation(_))
    ));
    assert!(matches!(
        store.upload_chunk(&id, 1, 3, None, vec![1u8; 48]).await,
        Err(CinderError::Validation(_))
    ));

    // Unknown file is Gone
    assert!(matches!(
        store
            .upload_chunk("00000000-0000-4000-8000-000000000000", 0, 2, None, vec![1u8; 48])
            .await,
        Err(CinderError::Gone)
    ));
}

#[tokio::test]
async fn meta_unavailable_until_iv_base_lands() {
    let tmp = TempDir::new().unwrap();
    let store = test_store(&tmp).await;

    let id = store
        .init_chunked_upload(&chunked_request(64, 32))
        .await
        .unwrap();

    // Chunk 1 uploaded first, no iv_base yet
    store
        .upload_chunk(&id, 1, 2, None, vec![2u8; 48])
        .await
        .unwrap();
    assert!(matches!(
        store.get_file_meta(&id).await,
        Err(CinderError::Gone)
    ));

    store
        .upload_chunk(&id, 0, 2, Some(&codec::encode(&[5u8; 12])), vec![1u8; 48])
        .await
        .unwrap();
    store.get_file_meta(&id).await.unwrap();
}

#[tokio::test]
async fn iv_base_is_set_once() {
    let tmp = TempDir::new().unwrap();
    let store = test_store(&tmp).await;

    let id = store
        .init_chunked_upload(&chunked_request(64, 32))
        .await
        .unwrap();

    let first = codec::encode(&[5u8; 12]);
    store
        .upload_chunk(&id, 0, 2, Some(&first), vec![1u8; 48])
        .await
        .unwrap();

    // A retried chunk 0 carrying a different iv_base cannot swap it
    let second = codec::encode(&[6u8; 12]);
    store
        .upload_chunk(&id, 0, 2, Some(&second), vec![1u8; 48])
        .await
        .unwrap();

    let meta = store.get_file_meta(&id).await.unwrap();
    assert_eq!(meta.iv_base, first);
}

#[tokio::test]
async fn wrong_token_kind_is_unauthorized() {
    let tmp = TempDir::new().unwrap();
    let store = test_store(&tmp).await;

    // Chunked file, multi-use token: must not unlock download_whole
    let id = store
        .init_chunked_upload(&chunked_request(64, 32))
        .await
        .unwrap();
    upload_all(&store, &id, 64, 32).await;
    let meta = store.get_file_meta(&id).await.unwrap();

    assert!(matches!(
        store.download_whole(&id, &meta.download_token).await,
        Err(CinderError::Unauthorized)
    ));

    // Whole file, single-use token: must not unlock chunk downloads
    let created = store
        .create_file_whole(&whole_params(50), fake_ciphertext(50))
        .await
        .unwrap();
    let meta = store.get_file_meta(&created.id).await.unwrap();
    assert!(matches!(
        store.download_chunk(&created.id, 0, &meta.download_token).await,
        Err(CinderError::Unauthorized)
    ));
}

#[tokio::test]
async fn expired_token_is_unauthorized() {
    let tmp = TempDir::new().unwrap();
    let store = test_store(&tmp).await;

    let created = store
        .create_file_whole(&whole_params(50), fake_ciphertext(50))
        .await
        .unwrap();
    let meta = store.get_file_meta(&created.id).await.unwrap();

    sqlx::query("UPDATE download_tokens SET expires_at = 1 WHERE token = ?")
        .bind(&meta.download_token)
        .execute(store.pool())
        .await
        .unwrap();

    assert!(matches!(
        store.download_whole(&created.id, &meta.download_token).await,
        Err(CinderError::Unauthorized)
    ));
}

#[tokio::test]
async fn init_chunked_validates_geometry() {
    let tmp = TempDir::new().unwrap();
    let store = test_store(&tmp).await;

    // total_chunks not matching ceil(size / chunk)
    let mut req = chunked_request(100, 32);
    req.total_chunks = 3;
    assert!(matches!(
        store.init_chunked_upload(&req).await,
        Err(CinderError::Validation(_))
    ));

    // chunk size outside the configured bounds
    let mut req = chunked_request(100, 8);
    req.total_chunks = 13;
    assert!(matches!(
        store.init_chunked_upload(&req).await,
        Err(CinderError::Validation(_))
    ));
}

#[tokio::test]
async fn sweep_reclaims_expired_files_and_blobs() {
    let tmp = TempDir::new().unwrap();
    let store = test_store(&tmp).await;

    let whole = store
        .create_file_whole(&whole_params(50), fake_ciphertext(50))
        .await
        .unwrap();
    let chunked = store
        .init_chunked_upload(&chunked_request(64, 32))
        .await
        .unwrap();
    upload_all(&store, &chunked, 64, 32).await;
    let meta = store.get_file_meta(&chunked).await.unwrap();

    // A live file whose token has aged out: the token row is swept on its own
    let survivor = store
        .create_file_whole(&whole_params(20), fake_ciphertext(20))
        .await
        .unwrap();
    let stale = store.get_file_meta(&survivor.id).await.unwrap();
    sqlx::query("UPDATE download_tokens SET expires_at = 1 WHERE token = ?")
        .bind(&stale.download_token)
        .execute(store.pool())
        .await
        .unwrap();

    sqlx::query("UPDATE files SET expires_at = 1 WHERE id IN (?, ?)")
        .bind(&whole.id)
        .bind(&chunked)
        .execute(store.pool())
        .await
        .unwrap();

    let report = store.sweep_expired().await.unwrap();
    assert_eq!(report.files, 2);
    assert_eq!(report.tokens, 1, "the aged-out token row is reclaimed too");

    assert!(!store.blobs().exists(&whole.storage_path).await.unwrap());
    assert!(!store
        .blobs()
        .exists(&chunk_object_path(&chunked, 0))
        .await
        .unwrap());

    // Finalize after the sweep: idempotent success
    let done = store
        .finalize_chunked(&chunked, &meta.download_token)
        .await
        .unwrap();
    assert!(done.success);
    assert_eq!(done.chunks_deleted, 0);
}
