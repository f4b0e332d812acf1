//! The request-keyed response store boundary.

use async_trait::async_trait;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};

use crate::error::CacheError;

/// A stable lookup key for cached responses: a URL plus an HTTP method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyedRequest {
    pub url: String,
    pub method: Method,
}

impl KeyedRequest {
    /// Create a GET-keyed request for the given URL.
    pub fn get(url: impl Into<String>) -> Self {
        KeyedRequest {
            url: url.into(),
            method: Method::GET,
        }
    }
}

/// A stored (or reconstructed) response: status, headers and a fully
/// buffered body.
#[derive(Debug, Clone)]
pub struct StoredResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl StoredResponse {
    /// Create a 200 response with the given body and no headers.
    pub fn new(body: Vec<u8>) -> Self {
        StoredResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body,
        }
    }

    /// Read a header value as a string, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Insert a header, replacing any previous value.
    pub fn insert_header(&mut self, name: HeaderName, value: &str) -> Result<(), CacheError> {
        let value = HeaderValue::from_str(value).map_err(|e| {
            CacheError::Serialization(format!("invalid header value for {}: {}", name, e))
        })?;
        self.headers.insert(name, value);
        Ok(())
    }
}

/// A minimal interface over request-keyed response storage.
///
/// Implementations are responsible for physically evicting entries once
/// they outlive the padded `Cache-Control` window written at `put` time.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// A name for tracing.
    ///
    /// # Example
    /// - "in-memory"
    /// - "platform"
    fn name(&self) -> &'static str;

    /// Return the stored response for this key, or `None` on a miss.
    async fn lookup(&self, request: &KeyedRequest) -> Result<Option<StoredResponse>, CacheError>;

    /// Store a response under this key, replacing any previous entry.
    ///
    /// Implementations must reject uncacheable responses; see
    /// [`validate_for_put`].
    async fn put(&self, request: &KeyedRequest, response: StoredResponse)
        -> Result<(), CacheError>;

    /// Remove the entry for this key. Returns whether an entry existed.
    async fn delete(&self, request: &KeyedRequest) -> Result<bool, CacheError>;
}

/// Shared `put` contract checks.
///
/// HTTP semantics define these responses as uncacheable, so they are
/// rejected before reaching any backend: non-GET request keys, 206
/// partial content, and responses varying on `*`.
pub fn validate_for_put(
    request: &KeyedRequest,
    response: &StoredResponse,
) -> Result<(), CacheError> {
    if request.method != Method::GET {
        return Err(CacheError::Uncacheable(format!(
            "cannot cache response to {} request, only GET",
            request.method
        )));
    }
    if response.status == StatusCode::PARTIAL_CONTENT {
        return Err(CacheError::Uncacheable(
            "partial content (206) responses cannot be stored".to_string(),
        ));
    }
    if let Some(vary) = response.header("vary") {
        if vary.split(',').any(|v| v.trim() == "*") {
            return Err(CacheError::Uncacheable(
                "responses with 'Vary: *' cannot be stored".to_string(),
            ));
        }
    }
    Ok(())
}
