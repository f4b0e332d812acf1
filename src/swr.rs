use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::entry::{self, ActionDebugInfo};
use crate::entry::CachedEntry;
use crate::error::{BoxError, CacheError};
use crate::events::{CacheStatus, EventSink, SubRequestEvent};
use crate::key::CacheKey;
use crate::scheduler::{TaskScheduler, TokioScheduler};
use crate::store::CacheStore;
use crate::strategy::CachingStrategy;
use crate::utils::now_ms;

/// Options for a single `run_with_cache` call.
pub struct RunOptions<T> {
    /// Caching strategy. Absent, or `no_store`, bypasses the cache.
    pub strategy: Option<CachingStrategy>,
    /// Predicate deciding whether a produced result may be stored.
    pub should_cache_result: Arc<dyn Fn(&T) -> bool + Send + Sync>,
    /// Metadata about the action, carried into the cached envelope and
    /// emitted events.
    pub debug_info: Option<ActionDebugInfo>,
}

impl<T> Default for RunOptions<T> {
    fn default() -> Self {
        RunOptions {
            strategy: None,
            should_cache_result: Arc::new(|_| true),
            debug_info: None,
        }
    }
}

impl<T> Clone for RunOptions<T> {
    fn clone(&self) -> Self {
        RunOptions {
            strategy: self.strategy,
            should_cache_result: Arc::clone(&self.should_cache_result),
            debug_info: self.debug_info.clone(),
        }
    }
}

impl<T> RunOptions<T> {
    /// Set the caching strategy.
    pub fn with_strategy(mut self, strategy: CachingStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Set the predicate deciding whether a result may be stored.
    pub fn with_should_cache_result(
        mut self,
        predicate: impl Fn(&T) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.should_cache_result = Arc::new(predicate);
        self
    }

    /// Attach debug metadata about the action.
    pub fn with_debug_info(mut self, debug_info: ActionDebugInfo) -> Self {
        self.debug_info = Some(debug_info);
        self
    }
}

/// Stale-while-revalidate engine for sub-requests.
///
/// Given a cache key, an async action producing a value, and a caching
/// strategy, the engine returns a cached value immediately when one is
/// fresh, returns a stale value immediately while scheduling exactly one
/// background revalidation per key, and computes in the foreground on a
/// miss.
///
/// All mutable state (the store handle and the in-flight revalidation
/// set) is owned by the constructed instance, so tests and independent
/// request contexts can each build an isolated engine.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use subrequest_cache::{CachingStrategy, InMemoryCache, RunOptions, SubRequestCache};
///
/// let cache = SubRequestCache::new(Arc::new(InMemoryCache::new()));
/// let options = RunOptions::default().with_strategy(CachingStrategy::short());
///
/// let shop: serde_json::Value = cache
///     .run_with_cache("shop-query", options, || async {
///         Ok(fetch_shop().await?)
///     })
///     .await?;
/// ```
#[derive(Clone)]
pub struct SubRequestCache {
    store: Option<Arc<dyn CacheStore>>,
    /// Keys with a revalidation currently in flight. At most one
    /// background revalidation per key runs at a time within this
    /// instance; the check-and-insert happens under a single lock
    /// acquisition so the guarantee holds across worker threads.
    in_flight: Arc<Mutex<HashSet<String>>>,
    scheduler: Arc<dyn TaskScheduler>,
    events: Option<Arc<dyn EventSink>>,
}

impl SubRequestCache {
    /// Create an engine over the given store, scheduling background work
    /// on the tokio runtime.
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        SubRequestCache {
            store: Some(store),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            scheduler: Arc::new(TokioScheduler),
            events: None,
        }
    }

    /// Create an engine with no store: every call runs its action
    /// directly, uncached.
    pub fn without_store() -> Self {
        SubRequestCache {
            store: None,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            scheduler: Arc::new(TokioScheduler),
            events: None,
        }
    }

    /// Replace the deferred-execution hook (e.g. with a platform
    /// `waitUntil`).
    pub fn with_scheduler(mut self, scheduler: Arc<dyn TaskScheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Attach an event sink receiving every cache decision.
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    /// The underlying store, when one is configured.
    pub fn store(&self) -> Option<&Arc<dyn CacheStore>> {
        self.store.as_ref()
    }

    /// Run `action` through the cache.
    ///
    /// - With no store, no strategy, or a `no_store` strategy, the
    ///   action runs directly and nothing touches the store.
    /// - A fresh entry is returned immediately.
    /// - A stale entry is returned immediately while a single background
    ///   revalidation refreshes it for future callers.
    /// - On a miss (including an entry that fails to parse) the action
    ///   runs in the foreground; the store write is deferred so the
    ///   caller does not block on it.
    ///
    /// Action errors on the miss and bypass paths propagate to the
    /// caller. Action errors during background revalidation are logged
    /// and swallowed; the stale value was already delivered.
    pub async fn run_with_cache<T, F, Fut>(
        &self,
        cache_key: impl Into<CacheKey>,
        options: RunOptions<T>,
        action: F,
    ) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
    {
        let key = cache_key.into().hash();
        let start_ms = now_ms();

        let Some(store) = self.store.clone() else {
            return self.run_direct(start_ms, &key, options.debug_info.as_ref(), action).await;
        };
        let Some(strategy) = options.strategy else {
            return self.run_direct(start_ms, &key, options.debug_info.as_ref(), action).await;
        };
        if strategy.is_no_store() {
            return self.run_direct(start_ms, &key, options.debug_info.as_ref(), action).await;
        }

        if let Some(response) = entry::get_item(store.as_ref(), &key).await {
            match serde_json::from_slice::<CachedEntry<T>>(&response.body) {
                Ok(cached) => {
                    let status = if entry::is_stale(&response, now_ms()) {
                        CacheStatus::Stale
                    } else {
                        CacheStatus::Hit
                    };

                    if status == CacheStatus::Stale && self.begin_revalidation(&key).await {
                        self.schedule_revalidation(
                            key.clone(),
                            strategy,
                            Arc::clone(&options.should_cache_result),
                            options.debug_info.clone(),
                            store,
                            action,
                        );
                    }

                    self.emit(start_ms, status, &key, Some(&strategy), options.debug_info.as_ref());
                    return Ok(cached.value);
                }
                Err(e) => {
                    // A malformed entry is just a cache fault; recompute.
                    tracing::debug!("cached entry for key {} failed to parse: {}", key, e);
                }
            }
        }

        // Miss: produce in the foreground, store in the background.
        let value = action().await.map_err(CacheError::Action)?;

        if (options.should_cache_result)(&value) {
            match entry::encode_entry(&value, options.debug_info.as_ref()) {
                Ok(body) => {
                    self.schedule_write(key.clone(), strategy, options.debug_info.clone(), store, body);
                }
                Err(e) => {
                    tracing::warn!("failed to serialize result for key {}: {}", key, e);
                }
            }
        }

        self.emit(start_ms, CacheStatus::Miss, &key, Some(&strategy), options.debug_info.as_ref());
        Ok(value)
    }

    /// Remove the entry for a key. Returns whether one existed.
    pub async fn delete(&self, cache_key: impl Into<CacheKey>) -> bool {
        let Some(store) = &self.store else {
            return false;
        };
        entry::delete_item(store.as_ref(), &cache_key.into().hash()).await
    }

    /// Uncached passthrough: run the action and report a bypass.
    async fn run_direct<T, F, Fut>(
        &self,
        start_ms: i64,
        key: &str,
        debug_info: Option<&ActionDebugInfo>,
        action: F,
    ) -> Result<T, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, BoxError>>,
    {
        let result = action().await.map_err(CacheError::Action);
        self.emit(start_ms, CacheStatus::Bypass, key, None, debug_info);
        result
    }

    /// Mark a key as having a revalidation in flight. Returns false when
    /// one is already running.
    async fn begin_revalidation(&self, key: &str) -> bool {
        let mut in_flight = self.in_flight.lock().await;
        in_flight.insert(key.to_string())
    }

    /// Schedule a detached revalidation for a stale key.
    ///
    /// The key is removed from the in-flight set on every exit: success,
    /// predicate rejection, or failure.
    fn schedule_revalidation<T, F, Fut>(
        &self,
        key: String,
        strategy: CachingStrategy,
        should_cache_result: Arc<dyn Fn(&T) -> bool + Send + Sync>,
        debug_info: Option<ActionDebugInfo>,
        store: Arc<dyn CacheStore>,
        action: F,
    ) where
        T: Serialize + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
    {
        let in_flight = Arc::clone(&self.in_flight);
        let events = self.events.clone();

        self.scheduler.wait_until(Box::pin(async move {
            let bg_start = now_ms();

            match action().await {
                Ok(value) if should_cache_result(&value) => {
                    let stored = match entry::encode_entry(&value, debug_info.as_ref()) {
                        Ok(body) => entry::set_item(store.as_ref(), &key, body, &strategy).await,
                        Err(e) => Err(e),
                    };
                    match stored {
                        Ok(()) => {
                            tracing::debug!("revalidated cache entry for key {}", key);
                            if let Some(events) = &events {
                                events.emit(SubRequestEvent {
                                    start_ms: bg_start,
                                    end_ms: now_ms(),
                                    cache_status: CacheStatus::Put,
                                    key: key.clone(),
                                    strategy: Some(strategy.to_header()),
                                    debug_info: debug_info.clone(),
                                });
                            }
                        }
                        Err(e) => tracing::warn!("SWR in sub-request failed: {}", e),
                    }
                }
                Ok(_) => {
                    tracing::debug!("revalidated value for key {} not cached: predicate declined", key);
                }
                Err(e) => tracing::warn!("SWR in sub-request failed: {}", e),
            }

            in_flight.lock().await.remove(&key);
        }));
    }

    /// Schedule the deferred miss-path store write.
    fn schedule_write(
        &self,
        key: String,
        strategy: CachingStrategy,
        debug_info: Option<ActionDebugInfo>,
        store: Arc<dyn CacheStore>,
        body: Vec<u8>,
    ) {
        let events = self.events.clone();

        self.scheduler.wait_until(Box::pin(async move {
            let bg_start = now_ms();
            match entry::set_item(store.as_ref(), &key, body, &strategy).await {
                Ok(()) => {
                    tracing::debug!("stored cache entry for key {}", key);
                    if let Some(events) = &events {
                        events.emit(SubRequestEvent {
                            start_ms: bg_start,
                            end_ms: now_ms(),
                            cache_status: CacheStatus::Put,
                            key: key.clone(),
                            strategy: Some(strategy.to_header()),
                            debug_info: debug_info.clone(),
                        });
                    }
                }
                Err(e) => tracing::warn!("deferred cache write failed for key {}: {}", key, e),
            }
        }));
    }

    fn emit(
        &self,
        start_ms: i64,
        status: CacheStatus,
        key: &str,
        strategy: Option<&CachingStrategy>,
        debug_info: Option<&ActionDebugInfo>,
    ) {
        if let Some(events) = &self.events {
            events.emit(SubRequestEvent {
                start_ms,
                end_ms: now_ms(),
                cache_status: status,
                key: key.to_string(),
                strategy: strategy.map(|s| s.to_header()),
                debug_info: debug_info.cloned(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::memory::InMemoryCache;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn engine() -> SubRequestCache {
        SubRequestCache::new(Arc::new(InMemoryCache::new()))
    }

    fn counting_action(
        count: Arc<AtomicUsize>,
        value: &'static str,
    ) -> impl FnOnce() -> futures::future::BoxFuture<'static, Result<String, BoxError>> {
        move || {
            Box::pin(async move {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(value.to_string())
            })
        }
    }

    #[tokio::test]
    async fn test_miss_runs_action_then_hit_serves_cache() {
        let cache = engine();
        let call_count = Arc::new(AtomicUsize::new(0));

        let options = RunOptions::default().with_strategy(CachingStrategy::long());
        let result = cache
            .run_with_cache("k1", options.clone(), counting_action(call_count.clone(), "loaded"))
            .await
            .unwrap();
        assert_eq!(result, "loaded");
        assert_eq!(call_count.load(Ordering::SeqCst), 1);

        // Wait for the deferred store write
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        let result = cache
            .run_with_cache("k1", options, counting_action(call_count.clone(), "not-called"))
            .await
            .unwrap();
        assert_eq!(result, "loaded");
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_store_strategy_never_touches_store() {
        let cache = engine();
        let call_count = Arc::new(AtomicUsize::new(0));

        let options = RunOptions::default().with_strategy(CachingStrategy::no_store());
        for _ in 0..3 {
            let result = cache
                .run_with_cache("k2", options.clone(), counting_action(call_count.clone(), "direct"))
                .await
                .unwrap();
            assert_eq!(result, "direct");
        }
        assert_eq!(call_count.load(Ordering::SeqCst), 3);

        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        assert!(entry::get_item(cache.store().unwrap().as_ref(), &CacheKey::from("k2").hash())
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_absent_strategy_bypasses_cache() {
        let cache = engine();
        let call_count = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            cache
                .run_with_cache(
                    "k3",
                    RunOptions::default(),
                    counting_action(call_count.clone(), "direct"),
                )
                .await
                .unwrap();
        }
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_miss_action_error_propagates() {
        let cache = engine();
        let options: RunOptions<String> =
            RunOptions::default().with_strategy(CachingStrategy::long());

        let result = cache
            .run_with_cache("k4", options, || async {
                Err::<String, BoxError>("origin unreachable".into())
            })
            .await;

        assert!(matches!(result, Err(CacheError::Action(_))));
    }

    #[tokio::test]
    async fn test_predicate_rejection_skips_store() {
        let cache = engine();
        let call_count = Arc::new(AtomicUsize::new(0));

        let options = RunOptions::default()
            .with_strategy(CachingStrategy::long())
            .with_should_cache_result(|value: &String| value != "transient");

        cache
            .run_with_cache("k5", options.clone(), counting_action(call_count.clone(), "transient"))
            .await
            .unwrap();

        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        // Nothing was stored, so the next call recomputes.
        cache
            .run_with_cache("k5", options, counting_action(call_count.clone(), "transient"))
            .await
            .unwrap();
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_without_store_runs_direct() {
        let cache = SubRequestCache::without_store();
        let call_count = Arc::new(AtomicUsize::new(0));

        let options = RunOptions::default().with_strategy(CachingStrategy::long());
        let result = cache
            .run_with_cache("k6", options, counting_action(call_count.clone(), "direct"))
            .await
            .unwrap();
        assert_eq!(result, "direct");
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }
}
