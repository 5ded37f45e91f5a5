//! CSRF nonces for the `state` parameter
//!
//! Each authorization attempt gets a fresh nonce drawn from the thread-local
//! CSPRNG. The server echoes it back in the callback's `state` parameter and
//! the web flow compares the two before exchanging the code.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;

/// Random bytes per nonce.
pub const NONCE_BYTES: usize = 32;

/// Generate a nonce: 32 random bytes as URL-safe base64 without padding.
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; NONCE_BYTES];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn nonce_is_url_safe_base64() {
        let nonce = generate_nonce();
        // 32 bytes -> 43 base64url chars without padding
        assert_eq!(nonce.len(), 43);
        assert!(
            nonce
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
            "nonce must be URL-safe base64 (no padding): {nonce}"
        );
    }

    #[test]
    fn nonce_decodes_to_full_entropy() {
        let decoded = URL_SAFE_NO_PAD.decode(generate_nonce()).unwrap();
        assert_eq!(decoded.len(), NONCE_BYTES);
    }

    #[test]
    fn rapid_nonces_do_not_collide() {
        let nonces: HashSet<String> = (0..1000).map(|_| generate_nonce()).collect();
        assert_eq!(nonces.len(), 1000);
    }
}
