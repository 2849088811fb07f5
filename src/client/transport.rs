//! Network transport
//!
//! Sends one HTTP request and returns whatever response arrived. Only
//! transport-level failures are errors here; status codes are judged by the
//! client.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;

use crate::error::{RequestError, Result};
use crate::models::ApiResponse;

/// A fully built outbound request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
}

/// A response as received, before status evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Value,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

// == reqwest Transport ==
/// Transport backed by a pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// `timeout` bounds each individual attempt; a timed-out attempt is a
    /// transport error like any other.
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| RequestError::InvalidRequest(format!("HTTP client setup failed: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let mut builder = self.client.request(request.method.clone(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            let bytes = serde_json::to_vec(body)
                .map_err(|e| RequestError::InvalidRequest(format!("Unserializable body: {}", e)))?;
            builder = builder.body(bytes);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let bytes = response.bytes().await?;

        Ok(HttpResponse {
            status,
            headers,
            body: ApiResponse::parse_body(&bytes),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_range() {
        let mut response = HttpResponse {
            status: 200,
            headers: BTreeMap::new(),
            body: Value::Null,
        };
        assert!(response.is_success());
        response.status = 204;
        assert!(response.is_success());
        response.status = 304;
        assert!(!response.is_success());
        response.status = 503;
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let transport = HttpTransport::new(Some(Duration::from_millis(500))).unwrap();
        let request = HttpRequest {
            method: Method::GET,
            url: "http://127.0.0.1:9/unreachable".to_string(),
            headers: BTreeMap::new(),
            body: None,
        };

        let result = transport.send(&request).await;
        assert!(matches!(result, Err(RequestError::Transport(_))));
    }

    #[tokio::test]
    async fn test_malformed_url_is_invalid_request() {
        let transport = HttpTransport::new(None).unwrap();
        let request = HttpRequest {
            method: Method::GET,
            url: "not a url".to_string(),
            headers: BTreeMap::new(),
            body: None,
        };

        let result = transport.send(&request).await;
        assert!(matches!(result, Err(RequestError::InvalidRequest(_))));
    }
}
