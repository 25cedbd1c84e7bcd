//! Request-scoped memoization of predicate computations

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

use crate::rules::rule::Outcome;
use crate::rules::Payload;

/// User-supplied cache key derivation
pub type CacheKeyFn = Arc<dyn Fn(&Payload) -> String + Send + Sync>;

/// In-flight or settled predicate computation shared by all awaiters
pub(crate) type PendingOutcome = Shared<BoxFuture<'static, Outcome>>;

/// Caching strategy of a leaf rule
#[derive(Clone, Default)]
pub enum CachePolicy {
    /// Invoke the predicate on every resolve
    #[default]
    NoCache,

    /// Memoize per rule and per hash of parent and arguments
    Strict,

    /// Memoize per rule, once per request
    Contextual,

    /// Memoize per rule and per user-derived key
    Custom(CacheKeyFn),
}

impl CachePolicy {
    /// Memoize on a key derived from the full payload
    pub fn custom<F>(key_fn: F) -> Self
    where
        F: Fn(&Payload) -> String + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(key_fn))
    }
}

impl From<bool> for CachePolicy {
    fn from(enabled: bool) -> Self {
        if enabled {
            Self::Strict
        } else {
            Self::NoCache
        }
    }
}

impl fmt::Debug for CachePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCache => f.write_str("NoCache"),
            Self::Strict => f.write_str("Strict"),
            Self::Contextual => f.write_str("Contextual"),
            Self::Custom(_) => f.write_str("Custom(<fn>)"),
        }
    }
}

/// Policy-specific part of a cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyScope {
    /// One entry per request
    Contextual,

    /// Hash of parent and arguments
    Strict(String),

    /// User-derived key
    Custom(String),
}

/// Cache key: rule name plus policy-specific sub-key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Name of the rule owning the entry
    pub rule: String,

    /// Policy-specific sub-key
    pub scope: KeyScope,
}

impl CacheKey {
    /// Key for a contextual rule
    pub fn contextual(rule: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            scope: KeyScope::Contextual,
        }
    }

    /// Key for a strict rule
    pub fn strict(rule: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            scope: KeyScope::Strict(hash.into()),
        }
    }

    /// Key for a rule with a custom key function
    pub fn custom(rule: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            scope: KeyScope::Custom(key.into()),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            KeyScope::Contextual => write!(f, "{}", self.rule),
            KeyScope::Strict(sub) | KeyScope::Custom(sub) => write!(f, "{}-{}", self.rule, sub),
        }
    }
}

/// Per-request cache of predicate computations
///
/// Created empty once per decision request and dropped with it. At most one
/// predicate invocation happens per key: the first evaluator registers the
/// not-yet-settled computation and every later evaluator awaits that same
/// computation. Registration goes through `DashMap::entry`, so the
/// check-and-register step is atomic even on a multi-threaded runtime.
#[derive(Default)]
pub struct RequestCache {
    /// Registered computations
    entries: DashMap<CacheKey, PendingOutcome>,

    /// Lookups that found a registered computation
    hits: AtomicU64,

    /// Lookups that registered a new computation
    misses: AtomicU64,
}

impl RequestCache {
    /// Create an empty request cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the computation registered under `key`, registering the one
    /// produced by `start` if there is none yet
    pub(crate) fn get_or_register<F>(&self, key: CacheKey, start: F) -> PendingOutcome
    where
        F: FnOnce() -> BoxFuture<'static, Outcome>,
    {
        match self.entries.entry(key) {
            Entry::Occupied(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!("Cache hit for {}", entry.key());
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                trace!("Registering computation for {}", entry.key());
                let pending = start().shared();
                entry.insert(pending.clone());
                pending
            }
        }
    }

    /// Whether a computation is registered under `key`
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of registered computations
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been registered yet
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every registered computation and reset statistics
    pub fn clear(&self) {
        self.entries.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }
}

impl fmt::Debug for RequestCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestCache")
            .field("stats", &self.stats())
            .finish()
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

impl CacheStats {
    /// Calculate cache hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
