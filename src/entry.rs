//! The cached envelope and its freshness bookkeeping.
//!
//! Every cached unit is a JSON envelope (`value` plus debug metadata)
//! stored as a response body, with three headers alongside it:
//!
//! - `cache-control` — the padded policy (`max-age` raised by
//!   `stale-while-revalidate`) so whatever honors the header keeps the
//!   row physically available through the whole stale window;
//! - `real-cache-control` — the true, unpadded policy, the sole input to
//!   staleness math;
//! - `cache-put-date` — epoch millis stamped at every write.

use http::header::{HeaderName, CACHE_CONTROL};
use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::store::{CacheStore, KeyedRequest, StoredResponse};
use crate::strategy::{parse_max_age, CachingStrategy};
use crate::utils::now_ms;

/// The true, unpadded policy the entry was stored under.
pub const REAL_CACHE_CONTROL: HeaderName = HeaderName::from_static("real-cache-control");

/// Epoch-millis timestamp of the moment the entry was stored.
pub const CACHE_PUT_DATE: HeaderName = HeaderName::from_static("cache-put-date");

/// Metadata describing the sub-request that produced a cached value,
/// carried through the cache for debugging surfaces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionDebugInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graphql: Option<String>,
}

/// The stored unit: the action result plus its debug metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedEntry<T> {
    pub value: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_info: Option<ActionDebugInfo>,
}

/// Build the synthetic GET request addressing a hashed key in a
/// request-keyed store.
pub(crate) fn keyed_request(key: &str) -> KeyedRequest {
    KeyedRequest::get(format!("https://cache.subrequest.local/?key={}", key))
}

/// Serialize an envelope body without taking ownership of the value.
pub(crate) fn encode_entry<T: Serialize>(
    value: &T,
    debug_info: Option<&ActionDebugInfo>,
) -> Result<Vec<u8>, CacheError> {
    let envelope = CachedEntry {
        value,
        debug_info: debug_info.cloned(),
    };
    serde_json::to_vec(&envelope)
        .map_err(|e| CacheError::Serialization(format!("Serialization failed: {}", e)))
}

/// Look up the stored response for a hashed key.
///
/// Returns `None` on a miss. Store failures also read as misses: a
/// broken cache must degrade to recomputation, never to an error the
/// caller sees.
pub(crate) async fn get_item(store: &dyn CacheStore, key: &str) -> Option<StoredResponse> {
    match store.lookup(&keyed_request(key)).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!("cache lookup failed for key {}: {}", key, e);
            None
        }
    }
}

/// Store an envelope body under a hashed key.
///
/// Writes the padded policy as `cache-control`, the true policy as
/// `real-cache-control`, and stamps `cache-put-date` with the current
/// time.
pub(crate) async fn set_item(
    store: &dyn CacheStore,
    key: &str,
    body: Vec<u8>,
    strategy: &CachingStrategy,
) -> Result<(), CacheError> {
    let mut response = StoredResponse::new(body);
    response.insert_header(CACHE_CONTROL, &strategy.padded().to_header())?;
    response.insert_header(REAL_CACHE_CONTROL, &strategy.to_header())?;
    response.insert_header(CACHE_PUT_DATE, &now_ms().to_string())?;
    store.put(&keyed_request(key), response).await
}

/// Remove the entry for a hashed key. Absent entries are not an error.
pub(crate) async fn delete_item(store: &dyn CacheStore, key: &str) -> bool {
    match store.delete(&keyed_request(key)).await {
        Ok(existed) => existed,
        Err(e) => {
            tracing::warn!("cache delete failed for key {}: {}", key, e);
            false
        }
    }
}

/// Whether a stored response has outlived the `max-age` of the policy it
/// was stored under.
///
/// A response without a `cache-put-date` stamp is treated as fresh: such
/// an entry cannot occur through [`set_item`], and forcing it to
/// revalidate would turn a bookkeeping fault into origin load.
pub(crate) fn is_stale(response: &StoredResponse, now_ms: i64) -> bool {
    let Some(put_date) = response
        .header(CACHE_PUT_DATE.as_str())
        .and_then(|v| v.parse::<i64>().ok())
    else {
        return false;
    };
    let max_age = response
        .header(REAL_CACHE_CONTROL.as_str())
        .and_then(parse_max_age)
        .unwrap_or(0);
    let age_seconds = (now_ms - put_date) as f64 / 1000.0;
    age_seconds > max_age as f64
}
