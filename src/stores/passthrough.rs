//! Passthrough to an externally supplied platform cache.
//!
//! Platform caches (a CDN edge cache, a worker runtime cache) already
//! speak the request/response vocabulary, but they do not all enforce
//! HTTP cacheability rules on write. This wrapper applies the shared
//! `put` contract before delegating, so engine-internal entries and
//! hand-rolled backends get the same checks.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::CacheError;
use crate::store::{validate_for_put, CacheStore, KeyedRequest, StoredResponse};

/// A store wrapper that validates writes before handing them to a
/// platform-provided cache.
///
/// # Example
///
/// ```ignore
/// let platform: Arc<dyn CacheStore> = host_runtime_cache();
/// let store = PlatformCache::new(platform);
/// ```
pub struct PlatformCache {
    inner: Arc<dyn CacheStore>,
}

impl PlatformCache {
    /// Wrap the given platform cache handle.
    pub fn new(inner: Arc<dyn CacheStore>) -> Self {
        PlatformCache { inner }
    }
}

#[async_trait]
impl CacheStore for PlatformCache {
    fn name(&self) -> &'static str {
        "platform"
    }

    async fn lookup(&self, request: &KeyedRequest) -> Result<Option<StoredResponse>, CacheError> {
        self.inner.lookup(request).await
    }

    async fn put(&self, request: &KeyedRequest, response: StoredResponse) -> Result<(), CacheError> {
        validate_for_put(request, &response)?;
        self.inner.put(request, response).await
    }

    async fn delete(&self, request: &KeyedRequest) -> Result<bool, CacheError> {
        self.inner.delete(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::memory::InMemoryCache;
    use http::Method;

    #[tokio::test]
    async fn test_delegates_to_inner() {
        let inner = Arc::new(InMemoryCache::new());
        let store = PlatformCache::new(inner.clone());
        let request = KeyedRequest::get("https://cache.local/?key=p1");

        let mut response = StoredResponse::new(b"payload".to_vec());
        response
            .insert_header(
                http::header::CACHE_CONTROL,
                "public, max-age=60, stale-while-revalidate=60",
            )
            .unwrap();
        store.put(&request, response).await.unwrap();

        let through_inner = inner.lookup(&request).await.unwrap();
        assert_eq!(through_inner.expect("stored").body, b"payload");

        assert!(store.delete(&request).await.unwrap());
        assert!(store.lookup(&request).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_validates_before_delegating() {
        let inner = Arc::new(InMemoryCache::new());
        let store = PlatformCache::new(inner.clone());
        let post = KeyedRequest {
            url: "https://cache.local/?key=p2".to_string(),
            method: Method::POST,
        };

        let result = store.put(&post, StoredResponse::new(Vec::new())).await;
        assert!(matches!(result, Err(CacheError::Uncacheable(_))));

        // Nothing reached the inner store.
        let get = KeyedRequest::get("https://cache.local/?key=p2");
        assert!(inner.lookup(&get).await.unwrap().is_none());
    }
}
