// ABOUTME: At-rest encryption for tool credential material
// ABOUTME: AES-256-GCM cipher behind a pluggable trait; absent cipher means identity

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key must be hex-encoded 32 bytes")]
    InvalidKey,
    #[error("ciphertext is not valid base64")]
    InvalidBase64,
    #[error("ciphertext too short")]
    CiphertextTooShort,
    #[error("cryptographic operation failed")]
    Operation,
}

impl From<ring::error::Unspecified> for CryptoError {
    fn from(_: ring::error::Unspecified) -> Self {
        CryptoError::Operation
    }
}

/// Reversible transformation applied to credential material before it is
/// written to the database. Implementations must be deterministic-free
/// (fresh nonce per call) but round-trip exactly.
pub trait Cipher: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError>;
    fn decrypt(&self, ciphertext: &str) -> Result<String, CryptoError>;
}

/// AES-256-GCM cipher. Output is base64(nonce || ciphertext || tag).
pub struct AesGcmCipher {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl AesGcmCipher {
    /// Build a cipher from a hex-encoded 32-byte key. Returns `None` when
    /// the key is empty, which disables encryption entirely.
    pub fn from_hex_key(hex_key: &str) -> Result<Option<Self>, CryptoError> {
        if hex_key.is_empty() {
            return Ok(None);
        }
        let key_bytes = hex::decode(hex_key).map_err(|_| CryptoError::InvalidKey)?;
        if key_bytes.len() != 32 {
            return Err(CryptoError::InvalidKey);
        }
        let unbound = UnboundKey::new(&AES_256_GCM, &key_bytes).map_err(|_| CryptoError::InvalidKey)?;
        Ok(Some(Self {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
        }))
    }
}

impl Cipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng.fill(&mut nonce_bytes)?;
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let mut in_out = plaintext.as_bytes().to_vec();
        self.key
            .seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)?;

        let mut out = Vec::with_capacity(NONCE_LEN + in_out.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&in_out);
        Ok(BASE64.encode(out))
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String, CryptoError> {
        let data = BASE64
            .decode(ciphertext)
            .map_err(|_| CryptoError::InvalidBase64)?;
        if data.len() < NONCE_LEN {
            return Err(CryptoError::CiphertextTooShort);
        }
        let (nonce_bytes, sealed) = data.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)?;

        let mut in_out = sealed.to_vec();
        let plaintext = self.key.open_in_place(nonce, Aad::empty(), &mut in_out)?;
        String::from_utf8(plaintext.to_vec()).map_err(|_| CryptoError::Operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    #[test]
    fn round_trip() {
        let cipher = AesGcmCipher::from_hex_key(TEST_KEY).unwrap().unwrap();
        let plaintext = r#"{"key":"secret-123"}"#;
        let sealed = cipher.encrypt(plaintext).unwrap();
        assert_ne!(sealed, plaintext);
        assert_eq!(cipher.decrypt(&sealed).unwrap(), plaintext);
    }

    #[test]
    fn fresh_nonce_per_encryption() {
        let cipher = AesGcmCipher::from_hex_key(TEST_KEY).unwrap().unwrap();
        let a = cipher.encrypt("same input").unwrap();
        let b = cipher.encrypt("same input").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn empty_key_disables_encryption() {
        assert!(AesGcmCipher::from_hex_key("").unwrap().is_none());
    }

    #[test]
    fn rejects_bad_keys() {
        assert!(AesGcmCipher::from_hex_key("not-hex").is_err());
        assert!(AesGcmCipher::from_hex_key("abcd").is_err());
    }

    #[test]
    fn decrypt_rejects_garbage() {
        let cipher = AesGcmCipher::from_hex_key(TEST_KEY).unwrap().unwrap();
        assert!(cipher.decrypt("!!not-base64!!").is_err());
        assert!(cipher.decrypt("c2hvcnQ").is_err()); // shorter than a nonce
    }
}
