//! Passphrase derivation: PBKDF2-HMAC-SHA-256 with a two-salt split.
//!
//! One passphrase yields two independent 32-byte outputs:
//!
//! - the **encryption key**, derived under `encryption_salt`, used as the AES
//!   key and never sent anywhere;
//! - the **validation hash**, derived under `validation_salt`, stored
//!   server-side and compared in constant time on reveal.
//!
//! The salts are drawn independently, so the server-visible pair
//! (validation_salt, passphrase_hash) shares no input space with the
//! encryption key. Reusing one salt with a domain separator would weaken that
//! argument; two salts keep it trivial.

use pbkdf2::pbkdf2_hmac;
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::cipher::SecretKey;
use crate::codec::random_salt;
use crate::{KEY_SIZE, SALT_SIZE};

/// Default and floor iteration count. Values below this are rejected at the
/// store boundary.
pub const MIN_ITERATIONS: u32 = 210_000;

/// Derive a 256-bit key from a passphrase, salt and iteration count.
/// Deterministic: fixed inputs give bit-identical output across runs.
pub fn derive_key(passphrase: &SecretString, salt: &[u8; SALT_SIZE], iterations: u32) -> SecretKey {
    let mut out = [0u8; KEY_SIZE];
    pbkdf2_hmac::<Sha256>(
        passphrase.expose_secret().as_bytes(),
        salt,
        iterations,
        &mut out,
    );
    SecretKey::from_bytes(out)
}

/// Derive the server-side validation hash for a passphrase under
/// `validation_salt`. Same primitive as [`derive_key`], different salt.
pub fn derive_validation_hash(
    passphrase: &SecretString,
    validation_salt: &[u8; SALT_SIZE],
    iterations: u32,
) -> [u8; KEY_SIZE] {
    let mut out = [0u8; KEY_SIZE];
    pbkdf2_hmac::<Sha256>(
        passphrase.expose_secret().as_bytes(),
        validation_salt,
        iterations,
        &mut out,
    );
    out
}

/// Everything the sender needs for passphrase mode, generated in one step.
pub struct PassphraseMaterial {
    pub encryption_key: SecretKey,
    pub encryption_salt: [u8; SALT_SIZE],
    pub validation_salt: [u8; SALT_SIZE],
    pub validation_hash: [u8; KEY_SIZE],
    pub iterations: u32,
}

impl PassphraseMaterial {
    /// Draw two independent salts and run both derivations.
    pub fn generate(passphrase: &SecretString, iterations: u32) -> Self {
        let encryption_salt = random_salt();
        let mut validation_salt = random_salt();
        // A 16-byte collision from a CSPRNG will not happen; the loop keeps
        // the encryption_salt != validation_salt invariant unconditional.
        while validation_salt == encryption_salt {
            validation_salt = random_salt();
        }

        Self {
            encryption_key: derive_key(passphrase, &encryption_salt, iterations),
            validation_hash: derive_validation_hash(passphrase, &validation_salt, iterations),
            encryption_salt,
            validation_salt,
            iterations,
        }
    }
}

/// Constant-time equality for validation hashes (or their encoded forms).
/// Length mismatch is an immediate false; equal-length inputs compare in
/// constant time.
pub fn hashes_match(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Low iteration counts keep the test suite fast; production values are
    // enforced at the store boundary, not here.
    const TEST_ITERATIONS: u32 = 1_000;

    #[test]
    fn test_derivation_deterministic() {
        let passphrase = SecretString::from("correct horse battery staple");
        let salt = [7u8; SALT_SIZE];

        let k1 = derive_key(&passphrase, &salt, TEST_ITERATIONS);
        let k2 = derive_key(&passphrase, &salt, TEST_ITERATIONS);

        assert_eq!(k1.as_bytes(), k2.as_bytes(), "KDF must be deterministic");
    }

    #[test]
    fn test_iteration_count_changes_output() {
        let passphrase = SecretString::from("password");
        let salt = *b"saltsaltsaltsalt";
        let k1 = derive_key(&passphrase, &salt, 1_000);
        let k2 = derive_key(&passphrase, &salt, 1_001);
        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn test_different_passphrases_differ() {
        let salt = [7u8; SALT_SIZE];
        let k1 = derive_key(&SecretString::from("alpha"), &salt, TEST_ITERATIONS);
        let k2 = derive_key(&SecretString::from("beta"), &salt, TEST_ITERATIONS);
        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn test_different_salts_differ() {
        let passphrase = SecretString::from("same passphrase");
        let k1 = derive_key(&passphrase, &[1u8; SALT_SIZE], TEST_ITERATIONS);
        let k2 = derive_key(&passphrase, &[2u8; SALT_SIZE], TEST_ITERATIONS);
        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn test_generated_material_salts_independent() {
        let material =
            PassphraseMaterial::generate(&SecretString::from("hunter2"), TEST_ITERATIONS);

        assert_ne!(material.encryption_salt, material.validation_salt);
        assert_ne!(
            material.encryption_key.as_bytes().as_slice(),
            material.validation_hash.as_slice(),
            "validation hash must not equal the encryption key"
        );
    }

    #[test]
    fn test_validation_path_matches_generation() {
        let passphrase = SecretString::from("open sesame");
        let material = PassphraseMaterial::generate(&passphrase, TEST_ITERATIONS);

        // The recipient re-derives from the server-returned salt + iterations
        let rederived =
            derive_validation_hash(&passphrase, &material.validation_salt, material.iterations);
        assert!(hashes_match(&material.validation_hash, &rederived));

        let wrong = derive_validation_hash(
            &SecretString::from("open says me"),
            &material.validation_salt,
            material.iterations,
        );
        assert!(!hashes_match(&material.validation_hash, &wrong));
    }

    #[test]
    fn test_hashes_match_length_mismatch() {
        assert!(!hashes_match(b"short", b"longer input"));
        assert!(hashes_match(b"equal", b"equal"));
    }
}
