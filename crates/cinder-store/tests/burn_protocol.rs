//! Integration tests for the note burn protocol: atomic decrement-or-fetch,
//! passphrase validation without view consumption, creation validation.

use opendal::Operator;
use tempfile::TempDir;

use cinder_core::config::{KdfConfig, LimitsConfig};
use cinder_core::types::{CreateNoteRequest, PassphraseFields};
use cinder_core::CinderError;
use cinder_crypto::codec;
use cinder_store::BurnStore;

fn memory_operator() -> Operator {
    Operator::new(opendal::services::Memory::default())
        .expect("memory operator")
        .finish()
}

fn test_kdf() -> KdfConfig {
    // Low floor so tests don't grind through 210k PBKDF2 rounds
    KdfConfig {
        min_iterations: 1_000,
    }
}

async fn test_store(tmp: &TempDir) -> BurnStore {
    BurnStore::open(
        tmp.path().join("meta.db"),
        memory_operator(),
        LimitsConfig::default(),
        test_kdf(),
    )
    .await
    .expect("open store")
}

fn in_one_hour() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp() + 3600
}

fn link_note(views: u32) -> CreateNoteRequest {
    CreateNoteRequest {
        ciphertext: codec::encode(b"opaque ciphertext plus tag"),
        iv: codec::encode(&[7u8; 12]),
        expires_at: in_one_hour(),
        views,
        passphrase: None,
    }
}

fn passphrase_fields() -> PassphraseFields {
    PassphraseFields {
        encryption_salt: codec::encode(&[1u8; 16]),
        validation_salt: codec::encode(&[2u8; 16]),
        kdf_iterations: 1_000,
        passphrase_hash: codec::encode(&[3u8; 32]),
    }
}

#[tokio::test]
async fn burn_returns_ciphertext_then_gone() {
    let tmp = TempDir::new().unwrap();
    let store = test_store(&tmp).await;

    let req = link_note(1);
    let id = store.create_note(&req).await.unwrap();

    let fetched = store.burn_and_fetch_note(&id).await.unwrap();
    assert_eq!(fetched.ciphertext, req.ciphertext);
    assert_eq!(fetched.iv, req.iv);

    assert!(matches!(
        store.burn_and_fetch_note(&id).await,
        Err(CinderError::Gone)
    ));
}

#[tokio::test]
async fn views_decrement_one_per_fetch() {
    let tmp = TempDir::new().unwrap();
    let store = test_store(&tmp).await;

    let id = store.create_note(&link_note(3)).await.unwrap();

    for _ in 0..3 {
        store.burn_and_fetch_note(&id).await.unwrap();
    }
    assert!(matches!(
        store.burn_and_fetch_note(&id).await,
        Err(CinderError::Gone)
    ));
}

#[tokio::test]
async fn parallel_burn_of_one_view_note_yields_exactly_one_success() {
    let tmp = TempDir::new().unwrap();
    let store = test_store(&tmp).await;

    let id = store.create_note(&link_note(1)).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        let id = id.clone();
        handles.push(tokio::spawn(
            async move { store.burn_and_fetch_note(&id).await },
        ));
    }

    let mut successes = 0;
    let mut gone = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(CinderError::Gone) => gone += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(successes, 1, "exactly one caller may see the ciphertext");
    assert_eq!(gone, 7);
}

#[tokio::test]
async fn meta_and_validation_never_consume_views() {
    let tmp = TempDir::new().unwrap();
    let store = test_store(&tmp).await;

    let fields = passphrase_fields();
    let mut req = link_note(1);
    req.passphrase = Some(fields.clone());
    let id = store.create_note(&req).await.unwrap();

    let meta = store.get_note_meta(&id).await.unwrap();
    assert_eq!(meta.validation_salt, fields.validation_salt);
    assert_eq!(meta.encryption_salt, fields.encryption_salt);
    assert_eq!(meta.iterations, fields.kdf_iterations);

    // Wrong guesses, right guess, more meta fetches: none of it burns
    assert!(!store
        .validate_note_passphrase(&id, "bm90LXRoZS1oYXNo")
        .await
        .unwrap());
    assert!(store
        .validate_note_passphrase(&id, &fields.passphrase_hash)
        .await
        .unwrap());
    store.get_note_meta(&id).await.unwrap();

    // The single view is still there
    store.burn_and_fetch_note(&id).await.unwrap();
}

#[tokio::test]
async fn meta_hidden_for_link_mode_and_unknown_notes() {
    let tmp = TempDir::new().unwrap();
    let store = test_store(&tmp).await;

    let id = store.create_note(&link_note(1)).await.unwrap();
    assert!(matches!(
        store.get_note_meta(&id).await,
        Err(CinderError::Gone)
    ));

    // Unknown id is indistinguishable from a consumed one
    assert!(matches!(
        store
            .get_note_meta("00000000-0000-4000-8000-000000000000")
            .await,
        Err(CinderError::Gone)
    ));
    assert!(!store
        .validate_note_passphrase("00000000-0000-4000-8000-000000000000", "eA")
        .await
        .unwrap());
}

#[tokio::test]
async fn create_rejects_bad_views_and_expiry() {
    let tmp = TempDir::new().unwrap();
    let store = test_store(&tmp).await;

    let mut req = link_note(0);
    assert!(matches!(
        store.create_note(&req).await,
        Err(CinderError::Validation(_))
    ));

    req.views = 101;
    assert!(matches!(
        store.create_note(&req).await,
        Err(CinderError::Validation(_))
    ));

    req.views = 1;
    req.expires_at = time::OffsetDateTime::now_utc().unix_timestamp() - 10;
    assert!(matches!(
        store.create_note(&req).await,
        Err(CinderError::Validation(_))
    ));

    req.expires_at = time::OffsetDateTime::now_utc().unix_timestamp() + 61 * 24 * 3600;
    assert!(matches!(
        store.create_note(&req).await,
        Err(CinderError::Validation(_))
    ));
}

#[tokio::test]
async fn create_rejects_degenerate_passphrase_fields() {
    let tmp = TempDir::new().unwrap();
    let store = test_store(&tmp).await;

    // Identical salts defeat the two-derivation split
    let mut fields = passphrase_fields();
    fields.validation_salt = fields.encryption_salt.clone();
    let mut req = link_note(1);
    req.passphrase = Some(fields);
    assert!(matches!(
        store.create_note(&req).await,
        Err(CinderError::Validation(_))
    ));

    // Iteration count below the floor
    let mut fields = passphrase_fields();
    fields.kdf_iterations = 999;
    req = link_note(1);
    req.passphrase = Some(fields);
    assert!(matches!(
        store.create_note(&req).await,
        Err(CinderError::Validation(_))
    ));

    // Salt of the wrong length
    let mut fields = passphrase_fields();
    fields.encryption_salt = codec::encode(&[1u8; 8]);
    req = link_note(1);
    req.passphrase = Some(fields);
    assert!(matches!(
        store.create_note(&req).await,
        Err(CinderError::Validation(_))
    ));
}

#[tokio::test]
async fn sweep_reclaims_expired_and_spent_notes() {
    let tmp = TempDir::new().unwrap();
    let store = test_store(&tmp).await;

    let expired = store.create_note(&link_note(5)).await.unwrap();
    let live = store.create_note(&link_note(5)).await.unwrap();

    // Force the first note past its expiry
    sqlx::query("UPDATE notes SET expires_at = 1 WHERE id = ?")
        .bind(&expired)
        .execute(store.pool())
        .await
        .unwrap();

    let report = store.sweep_expired().await.unwrap();
    assert_eq!(report.notes, 1);

    assert!(matches!(
        store.burn_and_fetch_note(&expired).await,
        Err(CinderError::Gone)
    ));
    store.burn_and_fetch_note(&live).await.unwrap();
}
