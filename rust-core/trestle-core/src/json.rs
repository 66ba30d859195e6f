//! # JSON Helpers
//!
//! Request bodies are parsed with simd-json; when simd-json rejects the
//! input the bytes are handed to serde_json so the caller gets a
//! serde_json error with line and column information.

use crate::error::Result;
use serde::de::DeserializeOwned;

/// Parse JSON bytes into a typed value
///
/// simd-json parses in place and may leave `bytes` modified on failure,
/// so the fallback works on a copy taken beforehand.
///
/// # Errors
///
/// Returns `Error::Json` if the input is not valid JSON for `T`.
pub fn parse_json_bytes<T: DeserializeOwned>(bytes: &mut [u8]) -> Result<T> {
    let original = bytes.to_vec();
    match simd_json::from_slice(bytes) {
        Ok(value) => Ok(value),
        Err(_) => Ok(serde_json::from_slice(&original)?),
    }
}
