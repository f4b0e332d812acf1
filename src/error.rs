/// Boxed error type for failures produced by a caller's action function.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error type for cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// A strategy override requested a mode that cannot be cached.
    #[error("invalid cache mode override '{mode}': must be public or private")]
    InvalidMode { mode: String },

    /// The request/response pair violates HTTP caching semantics.
    #[error("uncacheable: {0}")]
    Uncacheable(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A store backend operation failed.
    #[error("[{store}] cache error for key '{key}': {message}")]
    Operation {
        store: String,
        key: String,
        message: String,
    },

    /// The sub-request action itself failed. Only surfaced from the miss
    /// and uncached passthrough paths; background revalidation failures
    /// are logged and swallowed instead.
    #[error("sub-request action failed: {0}")]
    Action(BoxError),

    /// The underlying transport failed before a response was produced.
    #[error("transport error: {0}")]
    Transport(String),
}

impl CacheError {
    /// Create a new store operation error.
    pub fn operation(
        store: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        CacheError::Operation {
            store: store.into(),
            key: key.into(),
            message: message.into(),
        }
    }
}
