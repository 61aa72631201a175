//! AES-256-GCM sealing for OAuth tokens.
//!
//! Sealed form is `nonce:ciphertext`, both base64. A fresh random nonce
//! per seal means the same token never seals to the same string twice.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::Rng;

use crate::error::{PublishError, PublishResult};

const NONCE_SIZE: usize = 12;
const KEY_SIZE: usize = 32;

/// Seals and unseals token strings with a single symmetric key.
#[derive(Clone)]
pub struct TokenSealer {
    key: [u8; KEY_SIZE],
}

impl TokenSealer {
    /// Create a sealer from raw key bytes.
    pub fn new(key: [u8; KEY_SIZE]) -> Self {
        Self { key }
    }

    /// Load the key from `SOCIAL_TOKEN_KEY` (base64, 32 bytes decoded).
    pub fn from_env() -> PublishResult<Self> {
        let encoded = std::env::var("SOCIAL_TOKEN_KEY")
            .map_err(|_| PublishError::Sealing("SOCIAL_TOKEN_KEY not set".to_string()))?;

        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|e| PublishError::Sealing(format!("Invalid key encoding: {}", e)))?;

        let key: [u8; KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| PublishError::Sealing("Key must decode to 32 bytes".to_string()))?;

        Ok(Self::new(key))
    }

    /// Seal a plaintext token.
    pub fn seal(&self, plaintext: &str) -> PublishResult<String> {
        let key = Key::<Aes256Gcm>::from_slice(&self.key);
        let cipher = Aes256Gcm::new(key);

        let mut rng = rand::rng();
        let nonce_bytes: [u8; NONCE_SIZE] = std::array::from_fn(|_| rng.random());
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| PublishError::Sealing(format!("Encryption failed: {}", e)))?;

        Ok(format!(
            "{}:{}",
            BASE64.encode(nonce_bytes),
            BASE64.encode(ciphertext)
        ))
    }

    /// Unseal a sealed token back to plaintext.
    pub fn unseal(&self, sealed: &str) -> PublishResult<String> {
        let (nonce_b64, ciphertext_b64) = sealed
            .split_once(':')
            .ok_or_else(|| PublishError::Sealing("Invalid sealed token format".to_string()))?;

        let nonce_bytes = BASE64
            .decode(nonce_b64)
            .map_err(|e| PublishError::Sealing(format!("Invalid nonce encoding: {}", e)))?;
        if nonce_bytes.len() != NONCE_SIZE {
            return Err(PublishError::Sealing("Invalid nonce size".to_string()));
        }

        let ciphertext = BASE64
            .decode(ciphertext_b64)
            .map_err(|e| PublishError::Sealing(format!("Invalid ciphertext encoding: {}", e)))?;

        let key = Key::<Aes256Gcm>::from_slice(&self.key);
        let cipher = Aes256Gcm::new(key);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let plaintext = cipher
            .decrypt(nonce, ciphertext.as_ref())
            .map_err(|e| PublishError::Sealing(format!("Decryption failed: {}", e)))?;

        String::from_utf8(plaintext)
            .map_err(|e| PublishError::Sealing(format!("Invalid UTF-8: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sealer() -> TokenSealer {
        TokenSealer::new([7u8; KEY_SIZE])
    }

    #[test]
    fn seal_unseal_round_trip() {
        let s = sealer();
        let sealed = s.seal("IGQVJ-access-token").unwrap();
        assert!(sealed.contains(':'));
        assert_eq!(s.unseal(&sealed).unwrap(), "IGQVJ-access-token");
    }

    #[test]
    fn sealing_is_nondeterministic() {
        let s = sealer();
        let a = s.seal("token").unwrap();
        let b = s.seal("token").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn unseal_rejects_wrong_key() {
        let sealed = sealer().seal("token").unwrap();
        let other = TokenSealer::new([9u8; KEY_SIZE]);
        assert!(other.unseal(&sealed).is_err());
    }

    #[test]
    fn unseal_rejects_garbage() {
        let s = sealer();
        assert!(s.unseal("no-separator").is_err());
        assert!(s.unseal("bad!base64:also!bad").is_err());
    }
}
