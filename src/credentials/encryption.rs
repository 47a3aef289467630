//! AES-256-GCM sealing of stored endpoint lists.
//!
//! A sealed value is `base64(nonce || ciphertext)`, so one database column
//! holds everything needed to open it again with the master key.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

/// Size of the master key in bytes (256 bits)
const KEY_SIZE: usize = 32;

/// Size of the GCM nonce in bytes (96 bits)
const NONCE_SIZE: usize = 12;

/// Decodes a base64 master key and checks it is exactly 32 bytes.
pub fn validate_key(key_base64: &str) -> Result<Vec<u8>> {
    let key_bytes = BASE64
        .decode(key_base64)
        .context("Failed to decode base64 encryption key")?;

    if key_bytes.len() != KEY_SIZE {
        return Err(anyhow!(
            "Encryption key must be {} bytes (256 bits), got {} bytes",
            KEY_SIZE,
            key_bytes.len()
        ));
    }

    Ok(key_bytes)
}

fn cipher(key: &[u8]) -> Result<Aes256Gcm> {
    if key.len() != KEY_SIZE {
        return Err(anyhow!("Encryption key must be {} bytes", KEY_SIZE));
    }
    Aes256Gcm::new_from_slice(key).map_err(|e| anyhow!("Failed to create cipher: {}", e))
}

/// Encrypts `plaintext` under a fresh random nonce.
pub fn seal(plaintext: &str, key: &[u8]) -> Result<String> {
    let cipher = cipher(key)?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext.as_bytes())
        .map_err(|e| anyhow!("Encryption failed: {}", e))?;

    let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(BASE64.encode(sealed))
}

/// Opens a value produced by [`seal`]. Fails on a wrong key or any tampering.
pub fn open(sealed: &str, key: &[u8]) -> Result<String> {
    let cipher = cipher(key)?;
    let bytes = BASE64
        .decode(sealed)
        .context("Failed to decode sealed value")?;

    if bytes.len() <= NONCE_SIZE {
        return Err(anyhow!("Sealed value too short ({} bytes)", bytes.len()));
    }
    let (nonce, ciphertext) = bytes.split_at(NONCE_SIZE);

    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|e| anyhow!("Decryption failed (wrong key or corrupted data): {}", e))?;

    String::from_utf8(plaintext).context("Decrypted data is not valid UTF-8")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_validation() {
        assert!(validate_key(&BASE64.encode([7u8; 32])).is_ok());
        assert!(validate_key(&BASE64.encode([0u8; 16])).is_err());
        assert!(validate_key(&BASE64.encode([0u8; 64])).is_err());
        assert!(validate_key("not-valid-base64!@#$").is_err());
    }

    #[test]
    fn test_seal_open() {
        let key = [0u8; 32];
        let endpoints = "https://tok1@alice.pryv.me/,https://tok2@bob.pryv.me/";

        let sealed = seal(endpoints, &key).unwrap();
        assert!(!sealed.contains("tok1"));
        assert_eq!(open(&sealed, &key).unwrap(), endpoints);
    }

    #[test]
    fn test_each_seal_uses_new_nonce() {
        let key = [0u8; 32];
        let first = seal("same", &key).unwrap();
        let second = seal("same", &key).unwrap();
        assert_ne!(first, second);
        assert_eq!(open(&second, &key).unwrap(), "same");
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = seal("secret", &[0u8; 32]).unwrap();
        assert!(open(&sealed, &[1u8; 32]).is_err());
    }

    #[test]
    fn test_tampered_or_truncated_fails() {
        let key = [0u8; 32];
        let sealed = seal("secret", &key).unwrap();

        let mut bytes = BASE64.decode(&sealed).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        assert!(open(&BASE64.encode(&bytes), &key).is_err());

        assert!(open(&BASE64.encode([0u8; 12]), &key).is_err());
    }
}
