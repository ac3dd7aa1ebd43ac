//! Short code generation and validation utilities.
//!
//! Provides cryptographically secure random code generation and validation
//! for custom user-provided codes (3-32 chars, `[A-Za-z0-9_-]`, case-sensitive).

use crate::error::AppError;
use base64::Engine as _;

/// Length of random bytes before base64 encoding; 9 bytes base64url-encodes
/// to 12 characters, comfortably inside the 3-32 char bound.
const CODE_LENGTH_BYTES: usize = 9;

const MIN_LEN: usize = 3;
const MAX_LEN: usize = 32;

/// Reserved so a custom short code can never shadow the public router's own
/// paths (`/healthz`, `/readyz`, `/metrics`).
const RESERVED_CODES: &[&str] = &["healthz", "readyz", "metrics"];

/// Generates a cryptographically secure random short code: 12 URL-safe
/// base64 characters, no padding.
pub fn generate_code() -> String {
    let mut buffer = [0u8; CODE_LENGTH_BYTES];
    getrandom::fill(&mut buffer).expect("failed to generate random bytes");
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buffer)
}

/// Validates a user-provided custom short code against the `short_code`
/// invariant: 3-32 characters, `[A-Za-z0-9_-]`, case-sensitive, and not one
/// of the reserved router paths.
pub fn validate_custom_code(code: &str) -> Result<(), AppError> {
    if code.len() < MIN_LEN || code.len() > MAX_LEN {
        return Err(AppError::invalid_alias(format!(
            "short_code must be {MIN_LEN}-{MAX_LEN} characters, got {}",
            code.len()
        )));
    }

    if !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(AppError::invalid_alias(
            "short_code may only contain letters, digits, '_', and '-'",
        ));
    }

    if RESERVED_CODES.contains(&code) {
        return Err(AppError::invalid_alias("this short_code is reserved"));
    }

    Ok(())
}
