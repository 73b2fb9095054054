//! AES-256-GCM encryption for secret material stored at rest.
//!
//! The encryption key is a 32-byte key provided as a hex-encoded string (64 characters).
//! Each value gets a fresh random nonce, prepended to the ciphertext and base64-encoded.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::Rng;

use crate::error::{CredentialErrorKind, Error, ErrorKind};

/// 12-byte nonce size for AES-GCM
const NONCE_SIZE: usize = 12;

fn encryption_err() -> Error {
    Error {
        source: None,
        error_kind: ErrorKind::Credential(CredentialErrorKind::EncryptionFailed),
    }
}

fn decryption_err() -> Error {
    Error {
        source: None,
        error_kind: ErrorKind::Credential(CredentialErrorKind::DecryptionFailed),
    }
}

/// Encrypts plaintext using AES-256-GCM with a random nonce.
///
/// # Returns
/// Base64-encoded string containing nonce + ciphertext
pub fn encrypt(plaintext: &str, key_hex: &str) -> Result<String, Error> {
    let key = parse_key(key_hex)?;
    let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| encryption_err())?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|_| encryption_err())?;

    let mut combined = nonce_bytes.to_vec();
    combined.extend(ciphertext);

    Ok(BASE64.encode(combined))
}

/// Decrypts a base64-encoded ciphertext that was encrypted with `encrypt()`.
pub fn decrypt(ciphertext_b64: &str, key_hex: &str) -> Result<String, Error> {
    let key = parse_key(key_hex)?;
    let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| decryption_err())?;

    let combined = BASE64.decode(ciphertext_b64).map_err(|e| Error {
        source: Some(Box::new(e)),
        error_kind: ErrorKind::Credential(CredentialErrorKind::DecryptionFailed),
    })?;

    if combined.len() < NONCE_SIZE {
        return Err(decryption_err());
    }

    let (nonce_bytes, ciphertext) = combined.split_at(NONCE_SIZE);
    let nonce = Nonce::from_slice(nonce_bytes);

    let plaintext_bytes = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| decryption_err())?;

    String::from_utf8(plaintext_bytes).map_err(|e| Error {
        source: Some(Box::new(e)),
        error_kind: ErrorKind::Credential(CredentialErrorKind::DecryptionFailed),
    })
}

/// Check that a hex key is usable before any record is written with it.
pub fn validate_key(key_hex: &str) -> Result<(), Error> {
    parse_key(key_hex).map(|_| ())
}

/// A fresh random 32-byte key, hex encoded.
pub fn generate_key() -> String {
    let key: [u8; 32] = rand::thread_rng().gen();
    hex::encode(key)
}

fn parse_key(key_hex: &str) -> Result<[u8; 32], Error> {
    let bytes = hex::decode(key_hex.trim()).map_err(|e| Error {
        source: Some(Box::new(e)),
        error_kind: ErrorKind::Credential(CredentialErrorKind::EncryptionFailed),
    })?;
    if bytes.len() != 32 {
        return Err(encryption_err());
    }
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let plaintext = "my-secret-api-key-12345";
        let encrypted = encrypt(plaintext, TEST_KEY).expect("encryption should succeed");
        assert_ne!(encrypted, plaintext);
        let decrypted = decrypt(&encrypted, TEST_KEY).expect("decryption should succeed");
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_encrypt_produces_different_outputs() {
        let encrypted1 = encrypt("test-api-key", TEST_KEY).unwrap();
        let encrypted2 = encrypt("test-api-key", TEST_KEY).unwrap();
        assert_ne!(encrypted1, encrypted2);
    }

    #[test]
    fn test_invalid_key_returns_encryption_failed() {
        let result = encrypt("test", "not-valid-hex!");
        assert!(matches!(
            result,
            Err(Error {
                error_kind: ErrorKind::Credential(CredentialErrorKind::EncryptionFailed),
                ..
            })
        ));
    }

    #[test]
    fn test_short_key_is_invalid() {
        assert!(validate_key("abcd").is_err());
        assert!(validate_key(TEST_KEY).is_ok());
    }

    #[test]
    fn test_wrong_key_returns_decryption_failed() {
        let encrypted = encrypt("secret", TEST_KEY).unwrap();
        let wrong_key = "ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff";
        let result = decrypt(&encrypted, wrong_key);
        assert!(matches!(
            result,
            Err(Error {
                error_kind: ErrorKind::Credential(CredentialErrorKind::DecryptionFailed),
                ..
            })
        ));
    }

    #[test]
    fn test_ciphertext_too_short_returns_decryption_failed() {
        let result = decrypt("YWJj", TEST_KEY); // "abc" in base64
        assert!(matches!(
            result,
            Err(Error {
                error_kind: ErrorKind::Credential(CredentialErrorKind::DecryptionFailed),
                ..
            })
        ));
    }

    #[test]
    fn test_generated_key_is_valid() {
        let key = generate_key();
        assert_eq!(key.len(), 64);
        assert!(validate_key(&key).is_ok());
        assert_ne!(key, generate_key());
    }
}
