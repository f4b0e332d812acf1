use async_trait::async_trait;
use chrono::Utc;
use http::header::{HeaderName, DATE};
use http::HeaderMap;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::entry::REAL_CACHE_CONTROL;
use crate::error::CacheError;
use crate::store::{validate_for_put, CacheStore, KeyedRequest, StoredResponse};
use crate::strategy::{parse_max_age, parse_stale_while_revalidate};
use crate::utils::{now_ms, rand_simple};

/// Header announcing whether a returned entry was fresh or stale.
pub const CACHE_STATUS_HEADER: HeaderName = HeaderName::from_static("cache");

/// Configuration for eviction on put operations.
#[derive(Debug, Clone)]
pub struct EvictOnPutConfig {
    /// Provide a number between 0 and 1 to calculate whether eviction should run on each put.
    ///
    /// - `1.0` -> run eviction on every `put`
    /// - `0.5` -> run eviction on every 2nd `put` (on average)
    /// - `0.0` -> disable eviction
    pub frequency: f64,

    /// Remove items until the number of items in the map is lower than `max_items`.
    pub max_items: usize,
}

/// Configuration for InMemoryCache.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCacheConfig {
    /// Remove overdue entries on `put` operations.
    pub evict_on_put: Option<EvictOnPutConfig>,
}

/// Internal stored entry with its capture timestamp.
#[derive(Clone)]
struct CachedResponse {
    status: http::StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
    /// Epoch millis at `put` time.
    stored_at: i64,
    /// Epoch millis after which the entry is physically gone.
    expires: i64,
}

/// Process-local response cache keyed by request URL.
///
/// This is the fallback store for environments without a platform
/// cache. Entries live for their padded `Cache-Control` window
/// (`max-age + stale-while-revalidate`); within that window, lookups
/// report `HIT` or `STALE` through the `cache` header. There is no
/// cross-process sharing and no persistence.
///
/// Suitable for:
/// - Development and test environments
/// - Single-process deployments with moderate cache sizes
pub struct InMemoryCache {
    state: RwLock<HashMap<String, CachedResponse>>,
    evict_on_put: Option<EvictOnPutConfig>,
}

impl InMemoryCache {
    /// Create a new InMemoryCache with the default configuration.
    pub fn new() -> Self {
        Self::with_config(InMemoryCacheConfig::default())
    }

    /// Create a new InMemoryCache with the given configuration.
    pub fn with_config(config: InMemoryCacheConfig) -> Self {
        InMemoryCache {
            state: RwLock::new(HashMap::new()),
            evict_on_put: config.evict_on_put,
        }
    }

    /// Run eviction if configured and random check passes.
    async fn maybe_evict(&self) {
        let Some(ref config) = self.evict_on_put else {
            return;
        };

        if config.frequency <= 0.0 {
            return;
        }

        let should_evict = if config.frequency >= 1.0 {
            true
        } else {
            rand_simple() < config.frequency
        };

        if !should_evict {
            return;
        }

        let mut state = self.state.write().await;
        let now = now_ms();

        // First delete all overdue entries
        state.retain(|_, v| v.expires > now);

        // If still over max_items, remove oldest entries
        if state.len() > config.max_items {
            let mut entries: Vec<_> = state.iter().map(|(k, v)| (k.clone(), v.expires)).collect();
            entries.sort_by_key(|(_, expires)| *expires);

            let to_remove = state.len() - config.max_items;
            for (key, _) in entries.into_iter().take(to_remove) {
                state.remove(&key);
            }
        }
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Read the freshness windows out of a stored entry's policy headers.
///
/// Prefers `real-cache-control` (the unpadded policy); entries written
/// by another producer may only carry `cache-control`.
fn freshness_windows(headers: &HeaderMap) -> (u64, u64) {
    let policy = headers
        .get(REAL_CACHE_CONTROL.as_str())
        .or_else(|| headers.get(http::header::CACHE_CONTROL))
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    (
        parse_max_age(policy).unwrap_or(0),
        parse_stale_while_revalidate(policy).unwrap_or(0),
    )
}

fn http_date_now() -> String {
    Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

#[async_trait]
impl CacheStore for InMemoryCache {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    async fn lookup(&self, request: &KeyedRequest) -> Result<Option<StoredResponse>, CacheError> {
        let state = self.state.read().await;

        let Some(cached) = state.get(&request.url) else {
            return Ok(None);
        };

        let (max_age, stale_while_revalidate) = freshness_windows(&cached.headers);
        let age_seconds = (now_ms() - cached.stored_at) as f64 / 1000.0;

        if age_seconds > (max_age + stale_while_revalidate) as f64 {
            // Entry outlived its padded window: evict and report a miss
            drop(state);
            let mut state = self.state.write().await;
            state.remove(&request.url);
            return Ok(None);
        }

        let mut response = StoredResponse {
            status: cached.status,
            headers: cached.headers.clone(),
            body: cached.body.clone(),
        };
        let cache_status = if age_seconds > max_age as f64 {
            "STALE"
        } else {
            "HIT"
        };
        response.insert_header(CACHE_STATUS_HEADER, cache_status)?;
        response.insert_header(DATE, &http_date_now())?;

        Ok(Some(response))
    }

    async fn put(&self, request: &KeyedRequest, response: StoredResponse) -> Result<(), CacheError> {
        validate_for_put(request, &response)?;

        let now = now_ms();
        let (max_age, stale_while_revalidate) = freshness_windows(&response.headers);
        let cached = CachedResponse {
            status: response.status,
            headers: response.headers,
            body: response.body,
            stored_at: now,
            expires: now + ((max_age + stale_while_revalidate) as i64) * 1000,
        };

        {
            let mut state = self.state.write().await;
            state.insert(request.url.clone(), cached);
        }

        self.maybe_evict().await;
        Ok(())
    }

    async fn delete(&self, request: &KeyedRequest) -> Result<bool, CacheError> {
        let mut state = self.state.write().await;
        Ok(state.remove(&request.url).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::CACHE_CONTROL;

    fn response_with_policy(real: &str, padded: &str) -> StoredResponse {
        let mut response = StoredResponse::new(b"{\"value\":1}".to_vec());
        response.insert_header(CACHE_CONTROL, padded).unwrap();
        response.insert_header(REAL_CACHE_CONTROL, real).unwrap();
        response
    }

    #[tokio::test]
    async fn test_put_lookup_delete() {
        let store = InMemoryCache::new();
        let request = KeyedRequest::get("https://cache.local/?key=k1");

        let result = store.lookup(&request).await.unwrap();
        assert!(result.is_none());

        let response = response_with_policy(
            "public, max-age=60, stale-while-revalidate=300",
            "public, max-age=360, stale-while-revalidate=300",
        );
        store.put(&request, response).await.unwrap();

        let result = store.lookup(&request).await.unwrap();
        let found = result.expect("entry present");
        assert_eq!(found.body, b"{\"value\":1}");
        assert_eq!(found.header("cache"), Some("HIT"));
        assert!(found.header("date").is_some());

        assert!(store.delete(&request).await.unwrap());
        assert!(store.lookup(&request).await.unwrap().is_none());
        assert!(!store.delete(&request).await.unwrap());
    }

    #[tokio::test]
    async fn test_lookup_reports_stale_past_max_age() {
        let store = InMemoryCache::new();
        let request = KeyedRequest::get("https://cache.local/?key=k2");

        // max-age=0 makes the entry stale immediately; the stale window
        // keeps it available.
        let response = response_with_policy(
            "public, max-age=0, stale-while-revalidate=300",
            "public, max-age=300, stale-while-revalidate=300",
        );
        store.put(&request, response).await.unwrap();

        tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;

        let found = store.lookup(&request).await.unwrap().expect("still stored");
        assert_eq!(found.header("cache"), Some("STALE"));
    }

    #[tokio::test]
    async fn test_lookup_evicts_past_padded_window() {
        let store = InMemoryCache::new();
        let request = KeyedRequest::get("https://cache.local/?key=k3");

        let response = response_with_policy(
            "public, max-age=0, stale-while-revalidate=0",
            "public, max-age=0, stale-while-revalidate=0",
        );
        store.put(&request, response).await.unwrap();

        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        assert!(store.lookup(&request).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_enforces_contract() {
        let store = InMemoryCache::new();
        let post = KeyedRequest {
            url: "https://cache.local/?key=k4".to_string(),
            method: http::Method::POST,
        };
        let result = store
            .put(&post, StoredResponse::new(Vec::new()))
            .await;
        assert!(matches!(result, Err(CacheError::Uncacheable(_))));
    }

    #[tokio::test]
    async fn test_evict_on_put_bounds_entries() {
        let store = InMemoryCache::with_config(InMemoryCacheConfig {
            evict_on_put: Some(EvictOnPutConfig {
                frequency: 1.0,
                max_items: 2,
            }),
        });

        for i in 0..5 {
            let request = KeyedRequest::get(format!("https://cache.local/?key=bulk{}", i));
            let response = response_with_policy(
                "public, max-age=60, stale-while-revalidate=60",
                "public, max-age=120, stale-while-revalidate=60",
            );
            store.put(&request, response).await.unwrap();
        }

        let state = store.state.read().await;
        assert!(state.len() <= 2);
    }
}
