use std::fmt;

use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};

const REDACTED_HEADERS: &[&str] = &["authorization", "x-mw-bearer"];

/// An outgoing HTTP request, detached from any particular HTTP library.
#[derive(Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// Query parameters in order. Keys may repeat (`records[]`).
    pub query: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_owned(), value.into()));
        self
    }

    pub fn bearer(self, token: &SecretString) -> Self {
        let value = format!("Bearer {}", token.expose_secret());
        self.header("Authorization", value)
    }

    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_owned(), value.into()));
        self
    }

    pub fn json_body(mut self, body: String) -> Self {
        self.body = Some(body);
        self.header("Content-Type", "application/json")
    }

    /// First header with the given name, compared case-insensitively.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values of a query parameter, in order.
    pub fn query_values(&self, key: &str) -> Vec<&str> {
        self.query
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers: Vec<(&str, &str)> = self
            .headers
            .iter()
            .map(|(k, v)| {
                let redact = REDACTED_HEADERS.iter().any(|h| k.eq_ignore_ascii_case(h));
                (k.as_str(), if redact { "[REDACTED]" } else { v.as_str() })
            })
            .collect();
        f.debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &headers)
            .field("query", &self.query)
            .field("body", &self.body)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Abstraction over the HTTP stack for testability.
///
/// Production code uses [`ReqwestTransport`], tests use mockall-generated mocks.
#[allow(async_fn_in_trait)]
pub trait HttpTransport: Send + Sync {
    /// Send a request and read the full response body.
    ///
    /// Non-2xx statuses are returned as responses, not errors.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// reqwest-backed transport sharing one connection pool.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let HttpRequest {
            method,
            url,
            headers,
            query,
            body,
        } = request;

        let mut builder = self.http.request(method, &url);
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !query.is_empty() {
            builder = builder.query(&query);
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Request {
                url: url.clone(),
                source: e,
            })?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Body { url, source: e })?;

        Ok(HttpResponse { status, body })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request to {url} failed")]
    Request { url: String, source: reqwest::Error },

    #[error("failed to read response body from {url}")]
    Body { url: String, source: reqwest::Error },
}
