//! Cached HTTP fetch for GraphQL sub-requests.
//!
//! This is the transport-facing specialization of the SWR engine: a
//! request goes out through a [`Transport`], the response body is
//! buffered (or, for deferred GraphQL, drained chunk by chunk and merged
//! into a single payload), and the fully-resolved result is what gets
//! cached. Partial chunks are never stored.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use http::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::entry::ActionDebugInfo;
use crate::error::{BoxError, CacheError};
use crate::key::CacheKey;
use crate::strategy::CachingStrategy;
use crate::swr::{RunOptions, SubRequestCache};

/// An outgoing HTTP request: URL plus init fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequestInit {
    pub url: String,
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequestInit {
    /// A GET request for the given URL.
    pub fn get(url: impl Into<String>) -> Self {
        HttpRequestInit {
            url: url.into(),
            method: Method::GET,
            headers: Vec::new(),
            body: None,
        }
    }

    /// A POST request with the given body.
    pub fn post(url: impl Into<String>, body: impl Into<String>) -> Self {
        HttpRequestInit {
            url: url.into(),
            method: Method::POST,
            headers: Vec::new(),
            body: Some(body.into()),
        }
    }

    /// Append a request header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Response body as produced by a transport.
pub enum TransportBody {
    /// A single fully buffered body.
    Buffered(Vec<u8>),
    /// A deferred GraphQL response delivered as incremental JSON chunks.
    Deferred(BoxStream<'static, Result<Value, CacheError>>),
}

/// An HTTP response as produced by a transport.
pub struct TransportResponse {
    pub status: StatusCode,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: TransportBody,
}

/// The outgoing-request boundary: issues HTTP requests and surfaces
/// responses either buffered or as a deferred chunk stream.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &HttpRequestInit) -> Result<TransportResponse, CacheError>;
}

/// The serializable unit cached for a fetch: the resolved body text plus
/// enough response metadata to reconstruct a response for later callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedFetchResult {
    pub body: String,
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
}

/// A fetched body: parsed JSON when the payload is JSON, raw text
/// otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchBody {
    Json(Value),
    Text(String),
}

/// Response metadata returned alongside a fetched body.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponseMeta {
    pub status: StatusCode,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
}

/// Options for a cached fetch.
pub struct FetchOptions {
    /// Caching strategy. Defaults to [`CachingStrategy::short`] for GET
    /// requests and [`CachingStrategy::no_store`] otherwise.
    pub strategy: Option<CachingStrategy>,
    /// Cache key. Defaults to the full request identity (method, URL,
    /// headers, body).
    pub cache_key: Option<CacheKey>,
    /// Predicate deciding whether a response may be cached.
    pub should_cache_response: Arc<dyn Fn(&FetchBody, &FetchResponseMeta) -> bool + Send + Sync>,
    /// Metadata carried into the cached envelope and emitted events.
    pub debug_info: Option<ActionDebugInfo>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        FetchOptions {
            strategy: None,
            cache_key: None,
            should_cache_response: Arc::new(default_should_cache_response),
            debug_info: None,
        }
    }
}

impl Clone for FetchOptions {
    fn clone(&self) -> Self {
        FetchOptions {
            strategy: self.strategy,
            cache_key: self.cache_key.clone(),
            should_cache_response: Arc::clone(&self.should_cache_response),
            debug_info: self.debug_info.clone(),
        }
    }
}

impl FetchOptions {
    /// Set the caching strategy.
    pub fn with_strategy(mut self, strategy: CachingStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Set an explicit cache key.
    pub fn with_cache_key(mut self, cache_key: impl Into<CacheKey>) -> Self {
        self.cache_key = Some(cache_key.into());
        self
    }

    /// Set the predicate deciding whether a response may be cached.
    pub fn with_should_cache_response(
        mut self,
        predicate: impl Fn(&FetchBody, &FetchResponseMeta) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.should_cache_response = Arc::new(predicate);
        self
    }

    /// Attach debug metadata.
    pub fn with_debug_info(mut self, debug_info: ActionDebugInfo) -> Self {
        self.debug_info = Some(debug_info);
        self
    }
}

/// Default cache eligibility: the HTTP status is a success and the
/// payload carries no GraphQL errors.
pub fn default_should_cache_response(body: &FetchBody, meta: &FetchResponseMeta) -> bool {
    if !meta.status.is_success() {
        return false;
    }
    match body {
        FetchBody::Json(value) => !value
            .get("errors")
            .and_then(Value::as_array)
            .is_some_and(|errors| !errors.is_empty()),
        FetchBody::Text(_) => true,
    }
}

/// Perform an HTTP fetch through the SWR cache.
///
/// Returns the parsed body and the response metadata. Cached entries
/// reconstruct both; a deferred GraphQL response is fully drained and
/// merged before it is considered for storage. Responses failing the
/// eligibility predicate (by default: any non-success status, or a
/// GraphQL error payload) are returned to the caller but never stored.
pub async fn fetch_with_server_cache(
    transport: Arc<dyn Transport>,
    request: HttpRequestInit,
    cache: &SubRequestCache,
    options: FetchOptions,
) -> Result<(FetchBody, FetchResponseMeta), CacheError> {
    let strategy = options.strategy.unwrap_or_else(|| {
        if request.method == Method::GET {
            CachingStrategy::short()
        } else {
            CachingStrategy::no_store()
        }
    });
    let cache_key = options
        .cache_key
        .unwrap_or_else(|| default_cache_key(&request));
    let debug_info = options.debug_info.unwrap_or_else(|| ActionDebugInfo {
        url: Some(request.url.clone()),
        ..Default::default()
    });

    let should_cache_response = Arc::clone(&options.should_cache_response);
    let run_options = RunOptions::default()
        .with_strategy(strategy)
        .with_should_cache_result(move |result: &CachedFetchResult| {
            let (body, meta) = decode_fetch_result(result);
            should_cache_response(&body, &meta)
        })
        .with_debug_info(debug_info);

    let result = cache
        .run_with_cache(cache_key, run_options, move || async move {
            perform_fetch(transport, request)
                .await
                .map_err(|e| Box::new(e) as BoxError)
        })
        .await?;

    Ok(decode_fetch_result(&result))
}

/// The default cache key: the full request identity.
fn default_cache_key(request: &HttpRequestInit) -> CacheKey {
    CacheKey::Parts(vec![
        json!(request.method.as_str()),
        json!(request.url),
        json!(request.headers),
        request
            .body
            .as_ref()
            .map(|body| json!(body))
            .unwrap_or(Value::Null),
    ])
}

async fn perform_fetch(
    transport: Arc<dyn Transport>,
    request: HttpRequestInit,
) -> Result<CachedFetchResult, CacheError> {
    let response = transport.send(&request).await?;
    let status = response.status.as_u16();

    let body = match response.body {
        TransportBody::Buffered(bytes) => String::from_utf8(bytes)
            .map_err(|e| CacheError::Transport(format!("response body is not valid UTF-8: {}", e)))?,
        TransportBody::Deferred(mut chunks) => {
            let mut drained = Vec::new();
            while let Some(chunk) = chunks.next().await {
                drained.push(chunk?);
            }
            merge_deferred_chunks(drained).to_string()
        }
    };

    Ok(CachedFetchResult {
        body,
        status,
        status_text: response.status_text,
        headers: response.headers,
    })
}

fn decode_fetch_result(result: &CachedFetchResult) -> (FetchBody, FetchResponseMeta) {
    let body = match serde_json::from_str::<Value>(&result.body) {
        Ok(value) => FetchBody::Json(value),
        Err(_) => FetchBody::Text(result.body.clone()),
    };
    let meta = FetchResponseMeta {
        status: StatusCode::from_u16(result.status).unwrap_or(StatusCode::OK),
        status_text: result.status_text.clone(),
        headers: result.headers.clone(),
    };
    (body, meta)
}

/// Merge a drained deferred GraphQL response into one `{data, errors}`
/// payload.
///
/// The first chunk seeds `data`; each `incremental` patch deep-merges
/// its `data` at its `path`; `errors` accumulate across all chunks. The
/// `errors` key is omitted when no chunk carried any.
fn merge_deferred_chunks(chunks: Vec<Value>) -> Value {
    let mut data = Value::Null;
    let mut errors: Vec<Value> = Vec::new();

    for chunk in chunks {
        if let Some(chunk_errors) = chunk.get("errors").and_then(Value::as_array) {
            errors.extend(chunk_errors.iter().cloned());
        }
        if let Some(chunk_data) = chunk.get("data") {
            if !chunk_data.is_null() {
                deep_merge(&mut data, chunk_data);
            }
        }
        if let Some(patches) = chunk.get("incremental").and_then(Value::as_array) {
            for patch in patches {
                if let Some(patch_errors) = patch.get("errors").and_then(Value::as_array) {
                    errors.extend(patch_errors.iter().cloned());
                }
                let path = patch
                    .get("path")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                if let Some(patch_data) = patch.get("data") {
                    if !patch_data.is_null() {
                        merge_at_path(&mut data, &path, patch_data);
                    }
                }
            }
        }
    }

    let mut merged = serde_json::Map::new();
    merged.insert("data".to_string(), data);
    if !errors.is_empty() {
        merged.insert("errors".to_string(), Value::Array(errors));
    }
    Value::Object(merged)
}

/// Merge `patch` into `target` at the position named by `path` (object
/// keys as strings, array positions as numbers). Unresolvable paths are
/// dropped rather than invented.
fn merge_at_path(target: &mut Value, path: &[Value], patch: &Value) {
    let Some((head, rest)) = path.split_first() else {
        deep_merge(target, patch);
        return;
    };

    match head {
        Value::String(key) => {
            if let Value::Object(map) = target {
                let slot = map.entry(key.clone()).or_insert(Value::Null);
                merge_at_path(slot, rest, patch);
            }
        }
        Value::Number(index) => {
            if let Value::Array(items) = target {
                if let Some(slot) = index.as_u64().and_then(|i| items.get_mut(i as usize)) {
                    merge_at_path(slot, rest, patch);
                }
            }
        }
        _ => {}
    }
}

fn deep_merge(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target_map), Value::Object(patch_map)) => {
            for (key, value) in patch_map {
                deep_merge(target_map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
        (slot, value) => *slot = value.clone(),
    }
}
