//! Caching strategies and their `Cache-Control` serialization.

use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// Cache scope determining who may cache the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheMode {
    /// No caching at all; short-circuits the engine into a passthrough.
    NoStore,
    /// Cacheable by shared caches (CDN) and browsers.
    Public,
    /// Cacheable by the browser only.
    Private,
}

impl CacheMode {
    /// Get the `Cache-Control` directive for this mode.
    pub fn directive(&self) -> &'static str {
        match self {
            Self::NoStore => "no-store",
            Self::Public => "public",
            Self::Private => "private",
        }
    }
}

/// Partial strategy used to override individual fields of a base
/// strategy. All fields are optional; absent fields keep the base value.
///
/// Overrides are an explicit typed record, so a misspelled field is a
/// compile error rather than a silently ignored key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StrategyOverrides {
    pub mode: Option<CacheMode>,
    pub max_age: Option<u32>,
    pub stale_while_revalidate: Option<u32>,
    pub s_max_age: Option<u32>,
    pub stale_if_error: Option<u32>,
}

/// A caching strategy: mode plus freshness windows, all in seconds.
///
/// Strategies are immutable once produced; every override application
/// yields a new record.
///
/// # Example
/// ```ignore
/// use subrequest_cache::CachingStrategy;
///
/// let strategy = CachingStrategy::long();
/// assert_eq!(
///     strategy.to_header(),
///     "public, max-age=3600, stale-while-revalidate=82800"
/// );
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachingStrategy {
    /// Cache scope. Absent only for fully custom strategies.
    pub mode: Option<CacheMode>,
    /// Seconds the entry is considered fresh.
    pub max_age: Option<u32>,
    /// Seconds past `max_age` during which a stale entry may still be
    /// served while a background revalidation runs.
    pub stale_while_revalidate: Option<u32>,
    /// Shared-cache (CDN) freshness override.
    pub s_max_age: Option<u32>,
    /// Seconds a stale entry may be served when the origin errors.
    pub stale_if_error: Option<u32>,
}

impl CachingStrategy {
    /// No caching: any strategy with this mode bypasses the cache
    /// entirely.
    pub fn no_store() -> Self {
        CachingStrategy {
            mode: Some(CacheMode::NoStore),
            max_age: None,
            stale_while_revalidate: None,
            s_max_age: None,
            stale_if_error: None,
        }
    }

    /// Short-lived public strategy: fresh for 1 second, stale-but-usable
    /// for another 9.
    pub fn short() -> Self {
        CachingStrategy {
            mode: Some(CacheMode::Public),
            max_age: Some(1),
            stale_while_revalidate: Some(9),
            s_max_age: None,
            stale_if_error: None,
        }
    }

    /// Long-lived public strategy: fresh for an hour, revalidating in the
    /// background for the rest of the day.
    pub fn long() -> Self {
        CachingStrategy {
            mode: Some(CacheMode::Public),
            max_age: Some(3600),
            stale_while_revalidate: Some(82800),
            s_max_age: None,
            stale_if_error: None,
        }
    }

    /// Fully custom strategy: the overrides are taken verbatim with no
    /// defaults and no validation.
    pub fn custom(overrides: StrategyOverrides) -> Self {
        CachingStrategy {
            mode: overrides.mode,
            max_age: overrides.max_age,
            stale_while_revalidate: overrides.stale_while_revalidate,
            s_max_age: overrides.s_max_age,
            stale_if_error: overrides.stale_if_error,
        }
    }

    /// [`CachingStrategy::short`] with field overrides applied.
    pub fn short_with(overrides: StrategyOverrides) -> Result<Self, CacheError> {
        Self::short().merge(overrides)
    }

    /// [`CachingStrategy::long`] with field overrides applied.
    pub fn long_with(overrides: StrategyOverrides) -> Result<Self, CacheError> {
        Self::long().merge(overrides)
    }

    /// The default strategy ([`Default`]) with field overrides applied.
    pub fn default_with(overrides: StrategyOverrides) -> Result<Self, CacheError> {
        Self::default().merge(overrides)
    }

    /// Apply overrides on top of this strategy, producing a new record.
    ///
    /// An override `mode` must be [`CacheMode::Public`] or
    /// [`CacheMode::Private`]; anything else fails with
    /// [`CacheError::InvalidMode`].
    pub fn merge(&self, overrides: StrategyOverrides) -> Result<Self, CacheError> {
        if let Some(mode) = overrides.mode {
            if !matches!(mode, CacheMode::Public | CacheMode::Private) {
                return Err(CacheError::InvalidMode {
                    mode: mode.directive().to_string(),
                });
            }
        }
        Ok(CachingStrategy {
            mode: overrides.mode.or(self.mode),
            max_age: overrides.max_age.or(self.max_age),
            stale_while_revalidate: overrides.stale_while_revalidate.or(self.stale_while_revalidate),
            s_max_age: overrides.s_max_age.or(self.s_max_age),
            stale_if_error: overrides.stale_if_error.or(self.stale_if_error),
        })
    }

    /// Whether this strategy disables caching entirely.
    pub fn is_no_store(&self) -> bool {
        self.mode == Some(CacheMode::NoStore)
    }

    /// Serialize to a `Cache-Control` header value.
    ///
    /// Fields are emitted in the order `mode, max-age,
    /// stale-while-revalidate, s-maxage, stale-if-error`, skipping absent
    /// ones, joined by `", "`.
    pub fn to_header(&self) -> String {
        let mut parts = Vec::new();
        if let Some(mode) = self.mode {
            parts.push(mode.directive().to_string());
        }
        if let Some(v) = self.max_age {
            parts.push(format!("max-age={}", v));
        }
        if let Some(v) = self.stale_while_revalidate {
            parts.push(format!("stale-while-revalidate={}", v));
        }
        if let Some(v) = self.s_max_age {
            parts.push(format!("s-maxage={}", v));
        }
        if let Some(v) = self.stale_if_error {
            parts.push(format!("stale-if-error={}", v));
        }
        parts.join(", ")
    }

    /// The padded variant of this strategy: `max_age` replaced by
    /// `max_age + stale_while_revalidate` (each defaulting to 0).
    ///
    /// The padded header is what the underlying store sees, so the row
    /// stays physically available through the whole stale window; the
    /// unpadded strategy remains the sole input to staleness math.
    pub fn padded(&self) -> Self {
        let padded_max_age =
            self.max_age.unwrap_or(0) + self.stale_while_revalidate.unwrap_or(0);
        CachingStrategy {
            max_age: Some(padded_max_age),
            ..*self
        }
    }
}

/// The default strategy: fresh for 1 second, then stale-but-usable for
/// the rest of a full day.
impl Default for CachingStrategy {
    fn default() -> Self {
        CachingStrategy {
            mode: Some(CacheMode::Public),
            max_age: Some(1),
            stale_while_revalidate: Some(86399),
            s_max_age: None,
            stale_if_error: None,
        }
    }
}

/// Parse a numeric directive (e.g. `max-age`) out of a `Cache-Control`
/// header value. Returns `None` when the directive is absent or
/// malformed.
pub(crate) fn parse_directive(header: &str, directive: &str) -> Option<u64> {
    header.split(',').find_map(|part| {
        part.trim()
            .strip_prefix(directive)?
            .strip_prefix('=')?
            .trim()
            .parse()
            .ok()
    })
}

pub(crate) fn parse_max_age(header: &str) -> Option<u64> {
    parse_directive(header, "max-age")
}

pub(crate) fn parse_stale_while_revalidate(header: &str) -> Option<u64> {
    parse_directive(header, "stale-while-revalidate")
}
