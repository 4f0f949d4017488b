//! Note pipeline: encrypt locally, post ciphertext; fetch ciphertext,
//! decrypt locally.

use secrecy::SecretString;

use cinder_core::types::{CreateNoteRequest, PassphraseFields};
use cinder_core::{CinderError, CinderResult};
use cinder_crypto::kdf::{self, derive_validation_hash, PassphraseMaterial, MIN_ITERATIONS};
use cinder_crypto::{cipher, codec, SecretKey};

use crate::map_crypto;
use crate::transport::SecretTransport;

/// How a secret is locked.
pub enum Protection {
    /// Random key carried in the URL fragment; the server never sees it.
    LinkKey,
    /// Key derived from a passphrase the recipient types.
    Passphrase {
        passphrase: SecretString,
        iterations: u32,
    },
}

impl Protection {
    pub fn passphrase(passphrase: SecretString) -> Self {
        Protection::Passphrase {
            passphrase,
            iterations: MIN_ITERATIONS,
        }
    }
}

/// How a recipient unlocks a secret.
pub enum Access {
    /// The base64url key from the URL fragment.
    Fragment(String),
    Passphrase(SecretString),
}

pub struct NoteOptions {
    pub views: u32,
    pub expires_at: i64,
    pub protection: Protection,
}

/// A created secret: the URL handle, plus the fragment for link-key mode.
pub struct CreatedSecret {
    pub id: String,
    /// base64url encryption key; goes after `#` in the share URL.
    /// None in passphrase mode — there is nothing to put in the URL.
    pub fragment: Option<String>,
}

impl CreatedSecret {
    /// `<origin>/n/<id>#<key>` (or no fragment in passphrase mode).
    pub fn note_url(&self, origin: &str) -> String {
        match &self.fragment {
            Some(fragment) => format!("{origin}/n/{}#{fragment}", self.id),
            None => format!("{origin}/n/{}", self.id),
        }
    }

    /// `<origin>/f/<id>#<key>` (or no fragment in passphrase mode).
    pub fn file_url(&self, origin: &str) -> String {
        match &self.fragment {
            Some(fragment) => format!("{origin}/f/{}#{fragment}", self.id),
            None => format!("{origin}/f/{}", self.id),
        }
    }
}

/// Key material resolved on the create path: the content key, plus the
/// passphrase fields to store when in passphrase mode.
pub(crate) fn create_key_material(
    protection: &Protection,
) -> (SecretKey, Option<String>, Option<PassphraseFields>) {
    match protection {
        Protection::LinkKey => {
            let key = SecretKey::generate();
            let fragment = codec::encode(key.as_bytes());
            (key, Some(fragment), None)
        }
        Protection::Passphrase {
            passphrase,
            iterations,
        } => {
            let material = PassphraseMaterial::generate(passphrase, *iterations);
            let fields = PassphraseFields {
                encryption_salt: codec::encode(&material.encryption_salt),
                validation_salt: codec::encode(&material.validation_salt),
                kdf_iterations: material.iterations,
                passphrase_hash: codec::encode(&material.validation_hash),
            };
            (material.encryption_key, None, Some(fields))
        }
    }
}

/// Encrypt `plaintext` and create a note on the server.
pub async fn create_note(
    transport: &dyn SecretTransport,
    plaintext: &[u8],
    opts: NoteOptions,
) -> CinderResult<CreatedSecret> {
    let (key, fragment, passphrase) = create_key_material(&opts.protection);

    let (iv, ciphertext) = cipher::encrypt_bytes(&key, plaintext).map_err(map_crypto)?;

    let response = transport
        .create_note(CreateNoteRequest {
            ciphertext: codec::encode(&ciphertext),
            iv: codec::encode(&iv),
            expires_at: opts.expires_at,
            views: opts.views,
            passphrase,
        })
        .await?;

    Ok(CreatedSecret {
        id: response.id,
        fragment,
    })
}

/// Reveal a note: validate the passphrase first if there is one (wrong
/// guesses never burn a view), then burn-and-fetch and decrypt.
pub async fn reveal_note(
    transport: &dyn SecretTransport,
    id: &str,
    access: Access,
) -> CinderResult<Vec<u8>> {
    let key = match access {
        Access::Fragment(fragment) => fragment_key(&fragment)?,
        Access::Passphrase(passphrase) => {
            let meta = transport.note_meta(id).await?;
            let salt = codec::decode_array(&meta.validation_salt, "validation_salt")
                .map_err(map_crypto)?;
            let hash = derive_validation_hash(&passphrase, &salt, meta.iterations);

            if !transport
                .validate_note_passphrase(id, &codec::encode(&hash))
                .await?
            {
                return Err(CinderError::Unauthorized);
            }

            let salt = codec::decode_array(&meta.encryption_salt, "encryption_salt")
                .map_err(map_crypto)?;
            kdf::derive_key(&passphrase, &salt, meta.iterations)
        }
    };

    let note = transport.fetch_note(id).await?;
    let iv = codec::decode_array(&note.iv, "iv").map_err(map_crypto)?;
    let ciphertext = codec::decode(&note.ciphertext).map_err(map_crypto)?;

    cipher::decrypt_bytes(&key, &iv, &ciphertext).map_err(map_crypto)
}

pub(crate) fn fragment_key(fragment: &str) -> CinderResult<SecretKey> {
    let bytes = codec::decode_array(fragment, "key").map_err(map_crypto)?;
    Ok(SecretKey::from_bytes(bytes))
}
