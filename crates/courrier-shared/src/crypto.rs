//! At-rest encryption for message content.
//!
//! Pure transforms over a 256-bit XChaCha20-Poly1305 key: no storage access,
//! no global state.  Every encryption draws a fresh random 24-byte nonce;
//! ciphertext and nonce are returned separately because the store keeps the
//! nonce as its own column on the message row.

use base64::Engine;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::constants::{KEY_BLOB_VERSION, KEY_CHECK_VALUE, NONCE_SIZE, SYMMETRIC_KEY_SIZE};
use crate::error::CryptoError;

pub type SymmetricKey = [u8; SYMMETRIC_KEY_SIZE];
pub type Nonce = [u8; NONCE_SIZE];

pub fn generate_symmetric_key() -> SymmetricKey {
    let mut key = [0u8; SYMMETRIC_KEY_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut key);
    key
}

fn generate_nonce() -> Nonce {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Encrypt `plaintext`, returning `(ciphertext, nonce)`.
///
/// The nonce is freshly random per call and must be stored alongside the
/// ciphertext; reusing one under the same key breaks the AEAD guarantees.
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Result<(Vec<u8>, Nonce), CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.into());
    let nonce_bytes = generate_nonce();
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    Ok((ciphertext, nonce_bytes))
}

/// Decrypt `ciphertext` under `key` and `nonce`.
///
/// Fails with [`CryptoError::DecryptionFailed`] when authentication fails
/// (tampered data or wrong key).  Callers must treat that as "message
/// unreadable", never as empty plaintext.
pub fn decrypt(
    key: &SymmetricKey,
    ciphertext: &[u8],
    nonce: &Nonce,
) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.into());
    let nonce = XNonce::from_slice(nonce);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}

/// Serialized key backup blob.  Opaque to callers; the embedded check value
/// lets import verify the key before accepting it.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct KeyBlob {
    version: u8,
    key: String,
    check_nonce: String,
    check: String,
}

/// Export `key` as an opaque blob suitable for backup.
pub fn export_key(key: &SymmetricKey) -> Result<String, CryptoError> {
    let b64 = base64::engine::general_purpose::STANDARD;
    let (check, check_nonce) = encrypt(key, KEY_CHECK_VALUE)?;

    let blob = KeyBlob {
        version: KEY_BLOB_VERSION,
        key: b64.encode(key),
        check_nonce: b64.encode(check_nonce),
        check: b64.encode(check),
    };

    serde_json::to_string(&blob).map_err(|_| CryptoError::EncryptionFailed)
}

/// Import a key from a backup blob produced by [`export_key`].
///
/// The blob is rejected with [`CryptoError::InvalidKeyFormat`] unless its
/// check value decrypts to the known plaintext under the embedded key, so a
/// corrupted or foreign blob never replaces the active key.
pub fn import_key(blob: &str) -> Result<SymmetricKey, CryptoError> {
    let b64 = base64::engine::general_purpose::STANDARD;

    let parsed: KeyBlob =
        serde_json::from_str(blob).map_err(|_| CryptoError::InvalidKeyFormat)?;
    if parsed.version != KEY_BLOB_VERSION {
        return Err(CryptoError::InvalidKeyFormat);
    }

    let key_bytes = b64
        .decode(&parsed.key)
        .map_err(|_| CryptoError::InvalidKeyFormat)?;
    if key_bytes.len() != SYMMETRIC_KEY_SIZE {
        return Err(CryptoError::InvalidKeyFormat);
    }
    let mut key = [0u8; SYMMETRIC_KEY_SIZE];
    key.copy_from_slice(&key_bytes);

    let nonce_bytes = b64
        .decode(&parsed.check_nonce)
        .map_err(|_| CryptoError::InvalidKeyFormat)?;
    if nonce_bytes.len() != NONCE_SIZE {
        return Err(CryptoError::InvalidKeyFormat);
    }
    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(&nonce_bytes);

    let check = b64
        .decode(&parsed.check)
        .map_err(|_| CryptoError::InvalidKeyFormat)?;

    match decrypt(&key, &check, &nonce) {
        Ok(plain) if plain == KEY_CHECK_VALUE => Ok(key),
        _ => Err(CryptoError::InvalidKeyFormat),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = generate_symmetric_key();
        let plaintext = "Le courrier est arrivé !".as_bytes();

        let (ciphertext, nonce) = encrypt(&key, plaintext).unwrap();
        let decrypted = decrypt(&key, &ciphertext, &nonce).unwrap();

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_wrong_key_fails() {
        let key1 = generate_symmetric_key();
        let key2 = generate_symmetric_key();

        let (ciphertext, nonce) = encrypt(&key1, b"Secret message").unwrap();
        assert!(matches!(
            decrypt(&key2, &ciphertext, &nonce),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = generate_symmetric_key();

        let (mut ciphertext, nonce) = encrypt(&key, b"Important data").unwrap();
        let len = ciphertext.len();
        ciphertext[len - 1] ^= 0xFF;

        assert!(decrypt(&key, &ciphertext, &nonce).is_err());
    }

    #[test]
    fn test_fresh_nonce_per_call() {
        let key = generate_symmetric_key();

        let (c1, n1) = encrypt(&key, b"same plaintext").unwrap();
        let (c2, n2) = encrypt(&key, b"same plaintext").unwrap();

        // Nonce reuse under one key would be a fatal defect.
        assert_ne!(n1, n2);
        assert_ne!(c1, c2);
    }

    #[test]
    fn test_key_blob_roundtrip() {
        let key = generate_symmetric_key();
        let blob = export_key(&key).unwrap();
        let imported = import_key(&blob).unwrap();
        assert_eq!(imported, key);
    }

    #[test]
    fn test_corrupted_blob_rejected() {
        let key = generate_symmetric_key();
        let blob = export_key(&key).unwrap();

        // Flip a character inside the encoded key field.
        let corrupted = blob.replacen("\"key\":\"", "\"key\":\"AAAA", 1);
        assert!(matches!(
            import_key(&corrupted),
            Err(CryptoError::InvalidKeyFormat)
        ));
    }

    #[test]
    fn test_garbage_blob_rejected() {
        assert!(matches!(
            import_key("not a key blob"),
            Err(CryptoError::InvalidKeyFormat)
        ));
        assert!(matches!(
            import_key("{\"version\":9}"),
            Err(CryptoError::InvalidKeyFormat)
        ));
    }
}
