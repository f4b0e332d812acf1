use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use subrequest_cache::CacheKey;

/// Test data structure for benchmarks
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BenchProduct {
    pub id: u64,
    pub handle: String,
    pub title: String,
    pub price_cents: u32,
}

impl BenchProduct {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            handle: format!("product-{}", id),
            title: format!("Product {}", id),
            price_cents: (id % 10_000) as u32,
        }
    }
}

/// Simulated GraphQL origin with configurable latency
#[derive(Clone)]
pub struct FakeOrigin {
    data: Arc<HashMap<String, BenchProduct>>,
    latency_ms: u64,
    call_count: Arc<AtomicUsize>,
}

impl FakeOrigin {
    pub fn new(num_products: usize, latency_ms: u64) -> Self {
        let mut data = HashMap::new();
        for i in 0..num_products {
            let product = BenchProduct::new(i as u64);
            data.insert(format!("product-{}", i), product);
        }

        Self {
            data: Arc::new(data),
            latency_ms,
            call_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub async fn get(&self, handle: &str) -> Option<BenchProduct> {
        self.call_count.fetch_add(1, Ordering::Relaxed);

        // Simulate origin latency
        tokio::time::sleep(Duration::from_millis(self.latency_ms)).await;

        self.data.get(handle).cloned()
    }

    #[allow(dead_code)]
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }
}

/// Generate cache keys for different workload patterns
pub struct KeyGenerator {
    num_keys: usize,
}

impl KeyGenerator {
    pub fn new(num_keys: usize) -> Self {
        Self { num_keys }
    }

    /// Sequential handles: product-0, product-1, ...
    pub fn handles(&self) -> Vec<String> {
        (0..self.num_keys).map(|i| format!("product-{}", i)).collect()
    }

    /// Composite keys of the shape a storefront query would build.
    pub fn composite_keys(&self) -> Vec<CacheKey> {
        (0..self.num_keys)
            .map(|i| {
                CacheKey::from(vec![
                    json!("product"),
                    json!({"handle": format!("product-{}", i), "country": "US"}),
                ])
            })
            .collect()
    }
}
