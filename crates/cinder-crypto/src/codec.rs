//! URL-safe unpadded base64 and cryptographic randomness.
//!
//! Every binary value that crosses the wire (keys in URL fragments, salts,
//! IVs, ciphertext) uses this alphabet. Decoding rejects padded input and any
//! character outside the URL-safe alphabet.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;

use crate::{CryptoError, CryptoResult, IV_SIZE, KEY_SIZE, SALT_SIZE};

pub fn encode(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn decode(s: &str) -> CryptoResult<Vec<u8>> {
    URL_SAFE_NO_PAD.decode(s).map_err(|_| CryptoError::Codec)
}

/// Decode into a fixed-size array, rejecting any other length.
pub fn decode_array<const N: usize>(s: &str, what: &'static str) -> CryptoResult<[u8; N]> {
    let bytes = decode(s)?;
    let got = bytes.len();
    bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidLength {
            what,
            got,
            expected: N,
        })
}

/// `n` bytes from the platform CSPRNG. No weaker fallback exists: `thread_rng`
/// is seeded from the OS entropy source and panics if that is unavailable.
pub fn random_bytes(n: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; n];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

pub fn random_key_bytes() -> [u8; KEY_SIZE] {
    let mut bytes = [0u8; KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

pub fn random_salt() -> [u8; SALT_SIZE] {
    let mut bytes = [0u8; SALT_SIZE];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

pub fn random_iv() -> [u8; IV_SIZE] {
    let mut bytes = [0u8; IV_SIZE];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_roundtrip() {
        let data = b"arbitrary \x00\xff bytes";
        let encoded = encode(data);
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_encode_is_urlsafe_unpadded() {
        // 0xfb 0xff encodes to characters that differ between the standard
        // and URL-safe alphabets
        let encoded = encode(&[0xfb, 0xff, 0xfe]);
        assert!(!encoded.contains('+'));
        assert!(!encoded.contains('/'));
        assert!(!encoded.contains('='));
    }

    #[test]
    fn test_decode_rejects_padding() {
        assert_eq!(decode("aGk="), Err(CryptoError::Codec));
    }

    #[test]
    fn test_decode_rejects_standard_alphabet() {
        // '+' and '/' are not in the URL-safe alphabet
        assert_eq!(decode("a+b/"), Err(CryptoError::Codec));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert_eq!(decode("not base64!"), Err(CryptoError::Codec));
    }

    #[test]
    fn test_decode_array_wrong_length() {
        let encoded = encode(&[0u8; 10]);
        let result = decode_array::<12>(&encoded, "iv");
        assert_eq!(
            result,
            Err(CryptoError::InvalidLength {
                what: "iv",
                got: 10,
                expected: 12
            })
        );
    }

    #[test]
    fn test_random_bytes_distinct() {
        let a = random_bytes(32);
        let b = random_bytes(32);
        assert_eq!(a.len(), 32);
        assert_ne!(a, b, "two CSPRNG draws must differ");
    }

    #[test]
    fn test_random_sizes() {
        assert_eq!(random_key_bytes().len(), KEY_SIZE);
        assert_eq!(random_salt().len(), SALT_SIZE);
        assert_eq!(random_iv().len(), IV_SIZE);
    }
}
