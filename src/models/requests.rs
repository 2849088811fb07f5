//! Request descriptor for the API client
//!
//! Defines the per-call options accepted by `ApiClient::request`.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::Method;
use serde_json::Value;

/// Options for a single API call.
///
/// # Fields
/// - `method`: HTTP method (default GET)
/// - `body`: Optional JSON body
/// - `headers`: Extra headers; override the defaults case-insensitively
/// - `use_cache`: Consult and populate the cache for GET requests (default true)
/// - `cache_ttl`: TTL override for the cached response
/// - `persist_cache`: Also write the cached response to the durable tier
/// - `retry_on_error`: Retry failures with exponential backoff (default true)
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub body: Option<Value>,
    pub headers: BTreeMap<String, String>,
    pub use_cache: bool,
    pub cache_ttl: Option<Duration>,
    pub persist_cache: bool,
    pub retry_on_error: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            body: None,
            headers: BTreeMap::new(),
            use_cache: true,
            cache_ttl: None,
            persist_cache: false,
            retry_on_error: true,
        }
    }
}

impl RequestOptions {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }

    pub fn persistent(mut self) -> Self {
        self.persist_cache = true;
        self
    }

    pub fn without_retry(mut self) -> Self {
        self.retry_on_error = false;
        self
    }

    /// True when this request reads through the cache.
    pub fn is_cacheable(&self) -> bool {
        self.method == Method::GET && self.use_cache
    }

    /// Returns true if the caller set `name` (case-insensitive).
    pub fn has_header(&self, name: &str) -> bool {
        self.headers.keys().any(|k| k.eq_ignore_ascii_case(name))
    }
}
