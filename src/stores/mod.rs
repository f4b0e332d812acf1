//! Store implementations for the cache library.

pub mod memory;
pub mod passthrough;

pub use memory::{EvictOnPutConfig, InMemoryCache, InMemoryCacheConfig};
pub use passthrough::PlatformCache;
