//! API Client
//!
//! Wraps a `Transport` with read-through caching for GET requests, retry with
//! exponential backoff, and request metrics and error reports.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::time::Instant;

use super::cache_key::cache_key;
use super::retry::{retry_with_backoff, RetryOutcome, RetryPolicy};
use super::transport::{HttpRequest, Transport};
use crate::cache::{CacheManager, Persistence};
use crate::config::Config;
use crate::error::{describe_error, RequestError, Result};
use crate::logger::Logger;
use crate::models::{ApiResponse, ErrorReport, PerformanceMetric, RequestOptions};
use crate::monitoring::Monitoring;

/// Supplies the bearer token for outgoing requests.
pub trait TokenProvider: Send + Sync {
    fn token(&self) -> Option<String>;
}

/// Fixed token, mostly useful in tests and scripts.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

impl TokenProvider for StaticToken {
    fn token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

// == Api Client ==
pub struct ApiClient {
    base_url: String,
    retry: RetryPolicy,
    default_cache_ttl: Duration,
    transport: Arc<dyn Transport>,
    cache: Arc<CacheManager>,
    monitoring: Arc<Monitoring>,
    logger: Arc<Logger>,
    token_provider: Option<Arc<dyn TokenProvider>>,
}

impl ApiClient {
    pub fn new(
        config: &Config,
        transport: Arc<dyn Transport>,
        cache: Arc<CacheManager>,
        monitoring: Arc<Monitoring>,
    ) -> Self {
        let logger = Arc::clone(monitoring.logger());
        Self {
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy::new(config.max_retries, config.retry_base_delay),
            default_cache_ttl: config.default_cache_ttl,
            transport,
            cache,
            monitoring,
            logger,
            token_provider: None,
        }
    }

    pub fn with_token_provider(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.token_provider = Some(provider);
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    /// Resolves `endpoint` against the base URL. Absolute URLs pass through.
    pub fn url_for(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return endpoint.to_string();
        }
        if endpoint.starts_with('/') {
            format!("{}{}", self.base_url, endpoint)
        } else {
            format!("{}/{}", self.base_url, endpoint)
        }
    }

    // == Request ==
    /// Performs a request described by `options`.
    ///
    /// Cacheable GETs are answered from the cache when possible. Failures
    /// are retried per the retry policy, reported once to monitoring, then
    /// returned.
    pub async fn request(&self, endpoint: &str, options: RequestOptions) -> Result<ApiResponse> {
        let started = Instant::now();
        let url = self.url_for(endpoint);
        let key = options
            .is_cacheable()
            .then(|| cache_key(&options.method, &url, options.body.as_ref()));

        if let Some(key) = &key {
            if let Some(response) = self.cached_response(key).await {
                self.monitoring
                    .record_metric(PerformanceMetric::new("cache_hit", 1.0).with_tag("endpoint", endpoint));
                return Ok(response);
            }
        }

        let request = self.build_request(url, &options);
        let outcome = if options.retry_on_error {
            self.dispatch_with_retry(&request).await
        } else {
            RetryOutcome {
                result: self.dispatch(&request).await,
                attempts: 1,
            }
        };
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        let attempts = outcome.attempts;
        let result = match outcome.result {
            Err(err) if options.retry_on_error && err.is_retryable() => {
                Err(RequestError::RetryExhausted {
                    attempts,
                    source: Box::new(err),
                })
            }
            other => other,
        };

        self.monitoring.record_metric(
            PerformanceMetric::new("api_request_duration", elapsed_ms)
                .with_tag("endpoint", endpoint)
                .with_tag("method", request.method.as_str())
                .with_tag("outcome", if result.is_ok() { "success" } else { "error" }),
        );

        match result {
            Ok(response) => {
                if let Some(key) = &key {
                    let ttl = options.cache_ttl.unwrap_or(self.default_cache_ttl);
                    let persistence = if options.persist_cache {
                        Persistence::Durable
                    } else {
                        Persistence::MemoryOnly
                    };
                    self.cache.set_as(key, &response, Some(ttl), persistence).await;
                }
                Ok(response)
            }
            Err(err) => {
                let mut report = ErrorReport::new(err.kind(), describe_error(&err))
                    .with_context("url", request.url.as_str())
                    .with_context("method", request.method.as_str())
                    .with_context("retry_count", attempts.saturating_sub(1));
                if let Some(status) = err.status() {
                    report = report.with_context("status", status);
                }
                self.monitoring.report_error(report);
                Err(err)
            }
        }
    }

    pub async fn get(&self, endpoint: &str, options: RequestOptions) -> Result<ApiResponse> {
        self.request(endpoint, RequestOptions { method: Method::GET, ..options })
            .await
    }

    pub async fn post<B>(&self, endpoint: &str, body: &B, options: RequestOptions) -> Result<ApiResponse>
    where
        B: Serialize + ?Sized,
    {
        self.send_with_body(Method::POST, endpoint, body, options).await
    }

    pub async fn put<B>(&self, endpoint: &str, body: &B, options: RequestOptions) -> Result<ApiResponse>
    where
        B: Serialize + ?Sized,
    {
        self.send_with_body(Method::PUT, endpoint, body, options).await
    }

    pub async fn patch<B>(&self, endpoint: &str, body: &B, options: RequestOptions) -> Result<ApiResponse>
    where
        B: Serialize + ?Sized,
    {
        self.send_with_body(Method::PATCH, endpoint, body, options).await
    }

    pub async fn delete(&self, endpoint: &str, options: RequestOptions) -> Result<ApiResponse> {
        self.request(endpoint, RequestOptions { method: Method::DELETE, ..options })
            .await
    }

    /// Drops the cached response for a request, if any.
    pub async fn invalidate(&self, method: &Method, endpoint: &str, body: Option<&Value>) {
        let key = cache_key(method, &self.url_for(endpoint), body);
        self.cache.delete(&key).await;
    }

    // == Internals ==
    async fn send_with_body<B>(
        &self,
        method: Method,
        endpoint: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<ApiResponse>
    where
        B: Serialize + ?Sized,
    {
        let body = serde_json::to_value(body)
            .map_err(|e| RequestError::InvalidRequest(format!("Unserializable body: {}", e)))?;
        self.request(
            endpoint,
            RequestOptions {
                method,
                body: Some(body),
                ..options
            },
        )
        .await
    }

    async fn cached_response(&self, key: &str) -> Option<ApiResponse> {
        let cached = self.cache.get(key).await?;
        match serde_json::from_value::<ApiResponse>(cached) {
            Ok(mut response) => {
                response.from_cache = true;
                Some(response)
            }
            Err(e) => {
                self.logger.warn(
                    "Discarding unreadable cached response",
                    Some(json!({ "key": key, "reason": e.to_string() })),
                );
                self.cache.delete(key).await;
                None
            }
        }
    }

    fn build_request(&self, url: String, options: &RequestOptions) -> HttpRequest {
        let mut headers = BTreeMap::new();
        if !options.has_header("content-type") {
            headers.insert("Content-Type".to_string(), "application/json".to_string());
        }
        if !options.has_header("accept") {
            headers.insert("Accept".to_string(), "application/json".to_string());
        }
        if !options.has_header("authorization") {
            if let Some(token) = self.token_provider.as_ref().and_then(|p| p.token()) {
                headers.insert("Authorization".to_string(), format!("Bearer {}", token));
            }
        }
        headers.extend(options.headers.clone());

        HttpRequest {
            method: options.method.clone(),
            url,
            headers,
            body: options.body.clone(),
        }
    }

    async fn dispatch_with_retry(&self, request: &HttpRequest) -> RetryOutcome<ApiResponse> {
        let this = self;
        let max_attempts = self.retry.max_attempts();
        retry_with_backoff(
            &self.retry,
            move |_| this.dispatch(request),
            |attempts, err, delay| {
                self.logger.warn(
                    format!("Request attempt {}/{} failed, retrying", attempts, max_attempts),
                    Some(json!({
                        "url": request.url,
                        "method": request.method.as_str(),
                        "error": err.to_string(),
                        "delay_ms": delay.as_millis() as u64,
                    })),
                );
            },
        )
        .await
    }

    /// One network attempt. Non-2xx responses become `HttpStatus` errors.
    async fn dispatch(&self, request: &HttpRequest) -> Result<ApiResponse> {
        let response = self.transport.send(request).await?;
        if response.is_success() {
            return Ok(ApiResponse::new(response.body, response.status, response.headers));
        }

        let message = reqwest::StatusCode::from_u16(response.status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("Request failed")
            .to_string();
        Err(RequestError::HttpStatus {
            status: response.status,
            message,
            body: response.body,
        })
    }
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("retry", &self.retry)
            .field("default_cache_ttl", &self.default_cache_ttl)
            .field("token_provider", &self.token_provider.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{DurableStore, MemoryStore};
    use crate::error::CacheResult;
    use crate::client::transport::HttpResponse;
    use crate::collector::MemoryCollector;
    use crate::config::Environment;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays scripted responses and records every call.
    struct ScriptedTransport {
        script: Mutex<VecDeque<Result<HttpResponse>>>,
        fallback: HttpResponse,
        calls: Mutex<Vec<(HttpRequest, Instant)>>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Result<HttpResponse>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                fallback: ok(json!({ "fallback": true })),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        fn requests(&self) -> Vec<HttpRequest> {
            self.calls.lock().unwrap().iter().map(|(r, _)| r.clone()).collect()
        }

        fn gaps(&self) -> Vec<Duration> {
            let calls = self.calls.lock().unwrap();
            calls.windows(2).map(|w| w[1].1 - w[0].1).collect()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
            self.calls.lock().unwrap().push((request.clone(), Instant::now()));
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(self.fallback.clone()))
        }
    }

    /// Durable store with a fixed read latency.
    #[derive(Default)]
    struct SlowStore {
        inner: MemoryStore,
    }

    #[async_trait]
    impl DurableStore for SlowStore {
        async fn read(&self, key: &str) -> CacheResult<Option<String>> {
            tokio::time::sleep(Duration::from_millis(500)).await;
            self.inner.read(key).await
        }

        async fn write(&self, key: &str, value: String) -> CacheResult<()> {
            self.inner.write(key, value).await
        }

        async fn remove(&self, key: &str) -> CacheResult<()> {
            self.inner.remove(key).await
        }

        async fn keys(&self) -> CacheResult<Vec<String>> {
            self.inner.keys().await
        }
    }

    fn ok(body: Value) -> HttpResponse {
        HttpResponse {
            status: 200,
            headers: BTreeMap::new(),
            body,
        }
    }

    fn status(code: u16) -> Result<HttpResponse> {
        Ok(HttpResponse {
            status: code,
            headers: BTreeMap::new(),
            body: json!({ "error": "nope" }),
        })
    }

    fn refused() -> Result<HttpResponse> {
        Err(RequestError::Transport("connection refused".into()))
    }

    fn config(max_retries: u32) -> Config {
        Config {
            api_base_url: "https://api.test/".to_string(),
            max_retries,
            retry_base_delay: Duration::from_millis(1000),
            environment: Environment::Production,
            ..Config::default()
        }
    }

    fn client(max_retries: u32, transport: Arc<ScriptedTransport>) -> (ApiClient, Arc<Monitoring>) {
        client_with_store(max_retries, transport, Arc::new(MemoryStore::new()))
    }

    fn client_with_store(
        max_retries: u32,
        transport: Arc<ScriptedTransport>,
        store: Arc<dyn DurableStore>,
    ) -> (ApiClient, Arc<Monitoring>) {
        let collector = Arc::new(MemoryCollector::new());
        let logger = Arc::new(Logger::new(Environment::Production, 100, collector.clone()));
        let monitoring = Arc::new(Monitoring::new(100, 100, collector, logger.clone()));
        let cache = Arc::new(CacheManager::new(store, "cache_", logger));
        let client = ApiClient::new(&config(max_retries), transport, cache, monitoring.clone());
        (client, monitoring)
    }

    fn metrics_named(monitoring: &Monitoring, name: &str) -> Vec<PerformanceMetric> {
        monitoring
            .metrics()
            .into_iter()
            .filter(|m| m.name == name)
            .collect()
    }

    #[test]
    fn test_url_for() {
        let (client, _) = client(0, ScriptedTransport::new(vec![]));
        assert_eq!(client.url_for("/clients"), "https://api.test/clients");
        assert_eq!(client.url_for("clients/7"), "https://api.test/clients/7");
        assert_eq!(client.url_for("http://other.test/x"), "http://other.test/x");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_until_success_with_backoff() {
        let transport = ScriptedTransport::new(vec![
            refused(),
            status(503),
            refused(),
            Ok(ok(json!({ "id": 1 }))),
        ]);
        let (client, monitoring) = client(3, transport.clone());

        let response = client
            .get("/clients", RequestOptions::default().without_cache())
            .await
            .unwrap();

        assert_eq!(response.data, json!({ "id": 1 }));
        assert!(!response.from_cache);
        assert_eq!(transport.call_count(), 4);
        let gaps = transport.gaps();
        assert_eq!(gaps.len(), 3);
        for (gap, expected) in gaps.iter().zip([1u64, 2, 4]) {
            let expected = Duration::from_secs(expected);
            assert!(
                *gap >= expected && *gap < expected + Duration::from_millis(50),
                "gap {:?} should be about {:?}",
                gap,
                expected
            );
        }
        assert!(monitoring.errors().is_empty());

        let durations = metrics_named(&monitoring, "api_request_duration");
        assert_eq!(durations.len(), 1);
        assert_eq!(durations[0].tags["outcome"], "success");
        assert!(durations[0].value >= 7000.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion_reports_once() {
        let transport = ScriptedTransport::new(vec![refused(), refused(), refused(), refused()]);
        let (client, monitoring) = client(2, transport.clone());

        let err = client
            .get("/clients", RequestOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, RequestError::RetryExhausted { attempts: 3, .. }));
        assert_eq!(transport.call_count(), 3);

        let errors = monitoring.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, "retry_exhausted");
        assert_eq!(errors[0].context["url"], "https://api.test/clients");
        assert_eq!(errors[0].context["method"], "GET");
        assert_eq!(errors[0].context["retry_count"], 2);

        let durations = metrics_named(&monitoring, "api_request_duration");
        assert_eq!(durations.len(), 1);
        assert_eq!(durations[0].tags["outcome"], "error");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_warnings_are_logged() {
        let transport = ScriptedTransport::new(vec![refused(), Ok(ok(json!(null)))]);
        let (client, monitoring) = client(3, transport);

        client.get("/ping", RequestOptions::default()).await.unwrap();

        let warnings: Vec<_> = monitoring
            .logger()
            .entries()
            .into_iter()
            .filter(|e| e.message.contains("retrying"))
            .collect();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].context.as_ref().unwrap()["delay_ms"], 1000);
    }

    #[tokio::test]
    async fn test_without_retry_returns_raw_error() {
        let transport = ScriptedTransport::new(vec![status(404)]);
        let (client, monitoring) = client(3, transport.clone());

        let err = client
            .get("/missing", RequestOptions::default().without_retry())
            .await
            .unwrap_err();

        assert_eq!(transport.call_count(), 1);
        match err {
            RequestError::HttpStatus { status, message, body } => {
                assert_eq!(status, 404);
                assert_eq!(message, "Not Found");
                assert_eq!(body, json!({ "error": "nope" }));
            }
            other => panic!("unexpected error {:?}", other),
        }
        let errors = monitoring.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, "http_status_error");
        assert_eq!(errors[0].context["status"], 404);
        assert_eq!(errors[0].context["retry_count"], 0);
    }

    #[tokio::test]
    async fn test_cached_get_hits_network_once() {
        let transport = ScriptedTransport::new(vec![Ok(ok(json!([{ "id": 1 }])))]);
        let (client, monitoring) = client(0, transport.clone());

        let first = client.get("/clients", RequestOptions::default()).await.unwrap();
        let second = client.get("/clients", RequestOptions::default()).await.unwrap();

        assert_eq!(transport.call_count(), 1);
        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert_eq!(first.data, second.data);
        assert_eq!(second.status, 200);

        let hits = metrics_named(&monitoring, "cache_hit");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].tags["endpoint"], "/clients");
        assert_eq!(metrics_named(&monitoring, "api_request_duration").len(), 1);
    }

    #[tokio::test]
    async fn test_failed_get_is_not_cached() {
        let transport = ScriptedTransport::new(vec![status(500), Ok(ok(json!("fresh")))]);
        let (client, _) = client(0, transport.clone());

        assert!(client.get("/flaky", RequestOptions::default()).await.is_err());
        let response = client.get("/flaky", RequestOptions::default()).await.unwrap();

        assert_eq!(response.data, json!("fresh"));
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn test_writes_bypass_cache() {
        let transport = ScriptedTransport::new(vec![]);
        let (client, _) = client(0, transport.clone());

        let body = json!({ "name": "Acme" });
        client.post("/clients", &body, RequestOptions::default()).await.unwrap();
        client.post("/clients", &body, RequestOptions::default()).await.unwrap();

        assert_eq!(transport.call_count(), 2);
        assert!(client.cache().is_empty().await);
        assert_eq!(transport.requests()[0].body, Some(body));
        assert_eq!(transport.requests()[0].method, Method::POST);
    }

    #[tokio::test]
    async fn test_body_key_order_shares_cache_entry() {
        let transport = ScriptedTransport::new(vec![]);
        let (client, _) = client(0, transport.clone());

        let a: Value = serde_json::from_str(r#"{"page": 1, "filter": {"b": 2, "a": 1}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"filter": {"a": 1, "b": 2}, "page": 1}"#).unwrap();

        client
            .request("/search", RequestOptions::default().with_body(a))
            .await
            .unwrap();
        let second = client
            .request("/search", RequestOptions::default().with_body(b))
            .await
            .unwrap();

        assert!(second.from_cache);
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_cache_ttl_override_expires() {
        let transport = ScriptedTransport::new(vec![]);
        let (client, _) = client(0, transport.clone());
        let options = RequestOptions::default().with_cache_ttl(Duration::from_millis(50));

        client.get("/short", options.clone()).await.unwrap();
        client.get("/short", options.clone()).await.unwrap();
        assert_eq!(transport.call_count(), 1);

        tokio::time::sleep(Duration::from_millis(80)).await;
        client.get("/short", options).await.unwrap();
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_duration_includes_cache_lookup() {
        let transport = ScriptedTransport::new(vec![Ok(ok(json!([1, 2])))]);
        let (client, monitoring) =
            client_with_store(0, transport, Arc::new(SlowStore::default()));

        client.get("/clients", RequestOptions::default()).await.unwrap();

        let durations = metrics_named(&monitoring, "api_request_duration");
        assert_eq!(durations.len(), 1);
        assert!(durations[0].value >= 500.0);
    }

    #[tokio::test]
    async fn test_persist_cache_writes_durable_tier() {
        let store = Arc::new(MemoryStore::new());
        let (client, _) = client_with_store(0, ScriptedTransport::new(vec![]), store.clone());

        client.get("/session", RequestOptions::default()).await.unwrap();
        client
            .get("/settings", RequestOptions::default().persistent())
            .await
            .unwrap();

        let session = cache_key(&Method::GET, "https://api.test/session", None);
        let settings = cache_key(&Method::GET, "https://api.test/settings", None);
        assert!(store.read(&format!("cache_{}", session)).await.unwrap().is_none());

        let raw = store
            .read(&format!("cache_{}", settings))
            .await
            .unwrap()
            .expect("persistent response should reach the durable tier");
        assert!(raw.contains("fallback"));
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let transport = ScriptedTransport::new(vec![]);
        let (client, _) = client(0, transport.clone());

        client.get("/clients", RequestOptions::default()).await.unwrap();
        client.invalidate(&Method::GET, "/clients", None).await;
        client.get("/clients", RequestOptions::default()).await.unwrap();

        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn test_default_and_override_headers() {
        let transport = ScriptedTransport::new(vec![]);
        let (client, _) = client(0, transport.clone());
        let client = client.with_token_provider(Arc::new(StaticToken("t0k".into())));

        client.get("/a", RequestOptions::default().without_cache()).await.unwrap();
        client
            .get(
                "/b",
                RequestOptions::default()
                    .without_cache()
                    .with_header("content-type", "text/plain")
                    .with_header("Authorization", "Basic xyz"),
            )
            .await
            .unwrap();

        let requests = transport.requests();
        assert_eq!(requests[0].headers["Content-Type"], "application/json");
        assert_eq!(requests[0].headers["Accept"], "application/json");
        assert_eq!(requests[0].headers["Authorization"], "Bearer t0k");

        assert!(!requests[1].headers.contains_key("Content-Type"));
        assert_eq!(requests[1].headers["content-type"], "text/plain");
        assert_eq!(requests[1].headers["Authorization"], "Basic xyz");
    }

    #[tokio::test]
    async fn test_invalid_request_is_not_retried() {
        let transport = ScriptedTransport::new(vec![
            Err(RequestError::InvalidRequest("bad url".into())),
        ]);
        let (client, monitoring) = client(3, transport.clone());

        let err = client.get("/x", RequestOptions::default()).await.unwrap_err();

        assert!(matches!(err, RequestError::InvalidRequest(_)));
        assert_eq!(transport.call_count(), 1);
        assert_eq!(monitoring.errors()[0].kind, "invalid_request");
    }
}
