//! HTTP transport contract and the default reqwest implementation.
//!
//! The driver issues every request through [`HttpTransport`], so tests can
//! substitute a scripted transport and the production path stays a thin
//! wrapper over a pooled [`reqwest::Client`].

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Method;

use crate::types::KvError;

/// A fully-assembled HTTP request, headers already signed where applicable.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// An HTTP response with headers lowercased for lookup.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The transport every driver request goes through.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Issue a request and collect the full response.
    ///
    /// Returns `Err` only for transport-level failures (connect, timeout,
    /// body read); HTTP error statuses come back as responses.
    async fn issue(&self, request: HttpRequest) -> Result<HttpResponse, KvError>;
}

/// Transport backed by a pooled [`reqwest::Client`].
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, KvError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| KvError::Network(format!("HTTP client init failed: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn issue(&self, request: HttpRequest) -> Result<HttpResponse, KvError> {
        let mut builder = self.client.request(request.method.clone(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| KvError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str().to_ascii_lowercase(), value.to_string());
            }
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| KvError::Network(e.to_string()))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_header_lookup_is_case_insensitive() {
        let mut request = HttpRequest::new(Method::GET, "https://example.com/");
        request
            .headers
            .push(("If-Match".to_string(), "\"abc\"".to_string()));
        assert_eq!(request.header("if-match"), Some("\"abc\""));
        assert_eq!(request.header("IF-MATCH"), Some("\"abc\""));
        assert_eq!(request.header("range"), None);
    }

    #[test]
    fn test_response_builder_and_lookup() {
        let response = HttpResponse::new(206)
            .with_header("Content-Range", "bytes 2-4/10")
            .with_body(&b"234"[..]);
        assert_eq!(response.status, 206);
        assert!(response.is_success());
        assert_eq!(response.header("content-range"), Some("bytes 2-4/10"));
        assert_eq!(response.body.as_ref(), b"234");
    }

    #[test]
    fn test_status_classification() {
        assert!(HttpResponse::new(200).is_success());
        assert!(HttpResponse::new(204).is_success());
        assert!(!HttpResponse::new(304).is_success());
        assert!(!HttpResponse::new(404).is_success());
        assert!(!HttpResponse::new(503).is_success());
    }
}
