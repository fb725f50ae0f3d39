// ABOUTME: API key generation and hashing
// ABOUTME: octroi_-prefixed keys, stored as hex SHA-256 with a display prefix

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Prefix carried by every plaintext API key.
pub const KEY_PREFIX: &str = "octroi_";

/// Length of the stored display prefix (enough to include the `octroi_`
/// marker plus the start of the random part).
const DISPLAY_PREFIX_LEN: usize = 14;

/// The server-side representation of an API key: its hash and a short
/// prefix for identification. The plaintext is never stored.
#[derive(Debug, Clone)]
pub struct ApiKey {
    pub hash: String,
    pub prefix: String,
}

/// Generate a new API key. Returns the stored form and the plaintext,
/// which is shown to the caller exactly once. The plaintext is the
/// `octroi_` prefix followed by 32 URL-safe base64 characters (24 random
/// bytes), 39 characters in total.
pub fn generate_api_key() -> (ApiKey, String) {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    let plaintext = format!("{KEY_PREFIX}{}", URL_SAFE_NO_PAD.encode(bytes));

    let key = ApiKey {
        hash: hash_key(&plaintext),
        prefix: plaintext[..DISPLAY_PREFIX_LEN].to_string(),
    };
    (key, plaintext)
}

/// Hex-encoded SHA-256 hash of a plaintext key.
pub fn hash_key(plaintext: &str) -> String {
    hex::encode(Sha256::digest(plaintext.as_bytes()))
}

/// Constant-time comparison of a plaintext key against a stored hash.
pub fn verify_key_hash(plaintext: &str, stored_hash: &str) -> bool {
    hash_key(plaintext)
        .as_bytes()
        .ct_eq(stored_hash.as_bytes())
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_have_expected_shape() {
        let (key, plaintext) = generate_api_key();
        assert_eq!(plaintext.len(), 39);
        assert!(plaintext.starts_with(KEY_PREFIX));
        assert_eq!(key.prefix, &plaintext[..14]);
        assert_eq!(key.hash.len(), 64);
        assert_eq!(key.hash, hash_key(&plaintext));
    }

    #[test]
    fn generated_keys_are_unique() {
        let (_, a) = generate_api_key();
        let (_, b) = generate_api_key();
        assert_ne!(a, b);
    }

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(hash_key("octroi_abc"), hash_key("octroi_abc"));
        assert_ne!(hash_key("octroi_abc"), hash_key("octroi_abd"));
    }

    #[test]
    fn verify_matches_only_the_right_key() {
        let (key, plaintext) = generate_api_key();
        assert!(verify_key_hash(&plaintext, &key.hash));
        assert!(!verify_key_hash("octroi_other", &key.hash));
    }
}
