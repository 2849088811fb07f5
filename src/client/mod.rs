//! Resilient request client
//!
//! `ApiClient` sits between callers and the network: cacheable reads go
//! through the `CacheManager`, failures are retried with exponential backoff
//! and every terminal outcome is reported to `Monitoring`.

mod api;
mod cache_key;
pub mod retry;
mod transport;

pub use api::{ApiClient, StaticToken, TokenProvider};
pub use cache_key::cache_key;
pub use retry::{retry_with_backoff, RetryOutcome, RetryPolicy};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, Transport};
