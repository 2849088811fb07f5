//! Response DTOs for the API client
//!
//! Defines the payload returned to callers and stored in the cache.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Successful result of `ApiClient::request`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    /// Parsed body (JSON, a string for non-JSON bodies, null when empty)
    pub data: Value,
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: BTreeMap<String, String>,
    /// Served from the cache without a network call
    #[serde(skip)]
    pub from_cache: bool,
}

impl ApiResponse {
    pub fn new(data: Value, status: u16, headers: BTreeMap<String, String>) -> Self {
        Self {
            data,
            status,
            headers,
            from_cache: false,
        }
    }

    /// Decodes `data` into a typed value.
    ///
    /// A shape mismatch is a decoding problem on the caller's side, not a
    /// request failure, so the serde error is returned as is.
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        T::deserialize(&self.data)
    }

    /// Parses a raw response body: JSON when possible, otherwise text.
    pub fn parse_body(bytes: &[u8]) -> Value {
        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Value::Null;
        }
        serde_json::from_slice(bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
    }
}
