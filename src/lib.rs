//! subrequest-cache - a stale-while-revalidate (SWR) response cache for
//! storefront sub-requests
//!
//! This library sits between an application and a remote GraphQL API and
//! provides:
//! - Stale-while-revalidate (SWR) semantics driven by `Cache-Control`
//!   style strategies
//! - Single-flight background revalidation per cache key
//! - A minimal request-keyed store boundary with an in-memory fallback
//! - A cached fetch layer that resolves deferred GraphQL responses
//!   before storing them
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use subrequest_cache::{
//!     fetch_with_server_cache, CachingStrategy, FetchOptions, HttpRequestInit,
//!     InMemoryCache, SubRequestCache,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let cache = SubRequestCache::new(Arc::new(InMemoryCache::new()));
//!
//!     let request = HttpRequestInit::get("https://shop.example/api/2024-07/graphql.json");
//!     let options = FetchOptions::default().with_strategy(CachingStrategy::long());
//!
//!     // First call fetches from the origin; later calls inside the
//!     // freshness window are served from the cache, and stale hits
//!     // revalidate in the background.
//!     let (body, response) =
//!         fetch_with_server_cache(transport(), request, &cache, options)
//!             .await
//!             .unwrap();
//! }
//! ```

mod entry;
mod error;
mod events;
mod fetch;
mod key;
mod scheduler;
mod store;
pub mod stores;
mod strategy;
mod swr;
mod utils;

// Re-export public API
pub use entry::{ActionDebugInfo, CachedEntry};
pub use error::{BoxError, CacheError};
pub use events::{CacheStatus, EventSink, SubRequestEvent};
pub use fetch::{
    default_should_cache_response, fetch_with_server_cache, CachedFetchResult, FetchBody,
    FetchOptions, FetchResponseMeta, HttpRequestInit, Transport, TransportBody, TransportResponse,
};
pub use key::CacheKey;
pub use scheduler::{TaskScheduler, TokioScheduler};
pub use store::{validate_for_put, CacheStore, KeyedRequest, StoredResponse};
pub use stores::memory::{EvictOnPutConfig, InMemoryCache, InMemoryCacheConfig};
pub use stores::passthrough::PlatformCache;
pub use strategy::{CacheMode, CachingStrategy, StrategyOverrides};
pub use swr::{RunOptions, SubRequestCache};
