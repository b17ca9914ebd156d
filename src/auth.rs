//! API-key check for the HTTP service.
//!
//! When `[server].api_keys` is non-empty every request except `GET /health`
//! must carry one of the configured keys in the `X-API-Key` header.

use thiserror::Error;

pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("API key is required. Please provide X-API-Key header.")]
    MissingKey,
    #[error("Invalid API key. Please check your API key.")]
    InvalidKey,
}

/// Accept `provided` if auth is disabled or it matches one of `valid_keys`.
pub fn verify_api_key(provided: Option<&str>, valid_keys: &[String]) -> Result<(), AuthError> {
    if valid_keys.is_empty() {
        return Ok(());
    }
    let provided = match provided.map(str::trim) {
        Some(key) if !key.is_empty() => key,
        _ => return Err(AuthError::MissingKey),
    };
    if valid_keys
        .iter()
        .any(|k| constant_time_eq(k.as_bytes(), provided.as_bytes()))
    {
        Ok(())
    } else {
        Err(AuthError::InvalidKey)
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
