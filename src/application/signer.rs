//! Signer (component I): webhook secret generation and HMAC-SHA256 signing,
//! directly adapting `application/services/auth_service.rs`'s
//! `HmacSha256`/`hex` idiom.

use chrono::Utc;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

const SKEW_TOLERANCE_SECS: i64 = 5 * 60;

/// Generates a new 32-byte webhook secret, hex-encoded (64 chars). Returned
/// to the caller exactly once; only [`hash_for_storage`]'s output is kept.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// `sha256(secret)`, hex-encoded. This is what gets stored, and it doubles
/// as the signing key: only someone holding the plaintext secret can
/// rederive it to sign/verify.
pub fn hash_for_storage(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// `HMAC_SHA256(key=stored_hash_bytes, msg="{ts}.{payload}")`, hex-encoded.
pub fn sign(stored_hash_hex: &str, timestamp: i64, payload: &[u8]) -> String {
    let key_bytes = hex::decode(stored_hash_hex).unwrap_or_default();
    let mut mac =
        HmacSha256::new_from_slice(&key_bytes).expect("HMAC accepts any key length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a signature in constant time and enforces the ±5 minute skew
/// tolerance against `now`.
pub fn verify(stored_hash_hex: &str, timestamp: i64, payload: &[u8], signature: &str, now: i64) -> bool {
    if (now - timestamp).abs() > SKEW_TOLERANCE_SECS {
        return false;
    }
    let expected = sign(stored_hash_hex, timestamp, payload);
    let expected_bytes = expected.as_bytes();
    let given_bytes = signature.as_bytes();
    if expected_bytes.len() != given_bytes.len() {
        return false;
    }
    expected_bytes.ct_eq(given_bytes).into()
}

/// Convenience wrapper for callers that want "now" baked in.
pub fn verify_now(stored_hash_hex: &str, timestamp: i64, payload: &[u8], signature: &str) -> bool {
    verify(stored_hash_hex, timestamp, payload, signature, Utc::now().timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_secret_is_64_hex_chars() {
        let s = generate_secret();
        assert_eq!(s.len(), 64);
        assert!(s.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(hash_for_storage("abc"), hash_for_storage("abc"));
        assert_ne!(hash_for_storage("abc"), hash_for_storage("abd"));
    }

    #[test]
    fn valid_signature_verifies() {
        let secret = generate_secret();
        let hash = hash_for_storage(&secret);
        let payload = br#"{"event_type":"click"}"#;
        let ts = 1_700_000_000;
        let sig = sign(&hash, ts, payload);
        assert!(verify(&hash, ts, payload, &sig, ts));
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let secret = generate_secret();
        let hash = hash_for_storage(&secret);
        let ts = 1_700_000_000;
        let sig = sign(&hash, ts, b"original");
        assert!(!verify(&hash, ts, b"tampered!", &sig, ts));
    }

    #[test]
    fn tampered_timestamp_fails_verification() {
        let secret = generate_secret();
        let hash = hash_for_storage(&secret);
        let payload = b"payload";
        let sig = sign(&hash, 1000, payload);
        assert!(!verify(&hash, 1001, payload, &sig, 1001));
    }

    #[test]
    fn tampered_signature_fails_verification() {
        let secret = generate_secret();
        let hash = hash_for_storage(&secret);
        let payload = b"payload";
        let ts = 1000;
        let mut sig = sign(&hash, ts, payload);
        sig.replace_range(0..1, if sig.starts_with('a') { "b" } else { "a" });
        assert!(!verify(&hash, ts, payload, &sig, ts));
    }

    #[test]
    fn skew_beyond_tolerance_fails_verification() {
        let secret = generate_secret();
        let hash = hash_for_storage(&secret);
        let payload = b"payload";
        let ts = 1_700_000_000;
        let sig = sign(&hash, ts, payload);
        assert!(!verify(&hash, ts, payload, &sig, ts + SKEW_TOLERANCE_SECS + 1));
        assert!(verify(&hash, ts, payload, &sig, ts + SKEW_TOLERANCE_SECS - 1));
    }
}
