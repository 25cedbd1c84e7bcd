//! Leaf rule wrapping a user predicate

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{Fragment, Payload, RuleId, ShieldRule};
use crate::cache::{CacheKey, CachePolicy, RequestCache};
use crate::error::{Result, ShieldError};
use crate::options::ShieldOptions;
use crate::verdict::{Reason, RuleResult, Verdict};

/// Boxed predicate
pub(crate) type Predicate =
    Arc<dyn Fn(Arc<Payload>) -> BoxFuture<'static, anyhow::Result<RuleResult>> + Send + Sync>;

/// Failure raised while running a predicate
#[derive(Debug, Clone)]
pub(crate) enum Raised {
    /// Predicate returned `Err`
    Error(Reason),

    /// Predicate panicked
    Panic(String),
}

/// Raw settlement of a predicate, before normalization
pub(crate) type Outcome = std::result::Result<RuleResult, Raised>;

/// Leaf rule construction options
#[derive(Debug, Clone, Default)]
pub struct RuleOptions {
    /// Caching strategy
    pub cache: CachePolicy,

    /// Fragment attached to the rule
    pub fragment: Option<Fragment>,
}

impl RuleOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the caching strategy (`true`/`false` map to strict/no caching)
    pub fn with_cache(mut self, cache: impl Into<CachePolicy>) -> Self {
        self.cache = cache.into();
        self
    }

    pub fn with_fragment(mut self, fragment: impl Into<Fragment>) -> Self {
        self.fragment = Some(fragment.into());
        self
    }
}

/// Leaf rule
///
/// Owns its caching policy and turns whatever the predicate settles with
/// into a [`Verdict`]:
///
/// - `Ok(RuleResult::Bool(true))` authorizes
/// - `Ok(RuleResult::Bool(false))` denies
/// - `Ok(RuleResult::Message(m))` denies with a reason built from `m`
/// - `Ok(RuleResult::Error(e))` denies with `e`
///
/// A predicate that returns `Err(e)` denies with `e`, and one that panics
/// denies without a reason. With `debug` enabled both are propagated as
/// [`ShieldError`] instead.
pub struct Rule {
    id: RuleId,
    name: String,
    func: Predicate,
    cache: CachePolicy,
    fragment: Option<Fragment>,
}

impl Rule {
    /// Create a named rule
    pub fn new<F, Fut>(name: impl Into<String>, options: RuleOptions, func: F) -> Self
    where
        F: Fn(Arc<Payload>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<RuleResult>> + Send + 'static,
    {
        let func: Predicate = Arc::new(move |payload: Arc<Payload>| func(payload).boxed());
        Self::with_identity(RuleId::generate(), Some(name.into()), options, func)
    }

    /// Create a rule named after its generated identity
    pub fn anonymous<F, Fut>(options: RuleOptions, func: F) -> Self
    where
        F: Fn(Arc<Payload>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<RuleResult>> + Send + 'static,
    {
        let func: Predicate = Arc::new(move |payload: Arc<Payload>| func(payload).boxed());
        Self::with_identity(RuleId::generate(), None, options, func)
    }

    fn with_identity(
        id: RuleId,
        name: Option<String>,
        options: RuleOptions,
        func: Predicate,
    ) -> Self {
        Self {
            id,
            name: name.unwrap_or_else(|| id.to_string()),
            func,
            cache: options.cache,
            fragment: options.fragment,
        }
    }

    pub fn id(&self) -> RuleId {
        self.id
    }

    /// Name used to namespace cache keys
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cache_policy(&self) -> &CachePolicy {
        &self.cache
    }

    pub fn fragment(&self) -> Option<&Fragment> {
        self.fragment.as_ref()
    }

    /// Start the predicate, catching `Err` returns and panics
    fn invoke(&self, payload: Arc<Payload>) -> BoxFuture<'static, Outcome> {
        let func = Arc::clone(&self.func);

        async move {
            let future = match panic::catch_unwind(AssertUnwindSafe(|| func(payload))) {
                Ok(future) => future,
                Err(panic) => return Err(Raised::Panic(panic_message(panic.as_ref()))),
            };

            match AssertUnwindSafe(future).catch_unwind().await {
                Ok(Ok(result)) => Ok(result),
                Ok(Err(error)) => Err(Raised::Error(Reason::from(error))),
                Err(panic) => Err(Raised::Panic(panic_message(panic.as_ref()))),
            }
        }
        .boxed()
    }

    /// Run the predicate according to the cache policy
    async fn execute(
        &self,
        payload: &Arc<Payload>,
        cache: &RequestCache,
        options: &ShieldOptions,
    ) -> Outcome {
        let key = match &self.cache {
            CachePolicy::NoCache => return self.invoke(Arc::clone(payload)).await,
            CachePolicy::Strict => CacheKey::strict(
                self.name.as_str(),
                (options.hash_function)(&payload.parent, &payload.args),
            ),
            CachePolicy::Contextual => CacheKey::contextual(self.name.as_str()),
            CachePolicy::Custom(key_fn) => {
                CacheKey::custom(self.name.as_str(), key_fn(payload.as_ref()))
            }
        };

        cache
            .get_or_register(key, || self.invoke(Arc::clone(payload)))
            .await
    }

    /// Turn a raised failure into a verdict, or propagate it in debug mode
    fn recover(&self, raised: Raised, debug_mode: bool) -> Result<Verdict> {
        match raised {
            Raised::Error(source) if debug_mode => Err(ShieldError::Predicate {
                rule: self.name.clone(),
                source,
            }),
            Raised::Panic(message) if debug_mode => Err(ShieldError::Panicked {
                rule: self.name.clone(),
                message,
            }),
            Raised::Error(reason) => {
                warn!("Rule '{}' raised: {}", self.name, reason);
                Ok(Verdict::DeniedWithReason(reason))
            }
            Raised::Panic(message) => {
                warn!("Rule '{}' panicked: {}", self.name, message);
                Ok(Verdict::Denied)
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-error value raised".to_string()
    }
}

#[async_trait]
impl ShieldRule for Rule {
    async fn resolve(
        &self,
        payload: &Arc<Payload>,
        cache: &RequestCache,
        options: &ShieldOptions,
    ) -> Result<Verdict> {
        match self.execute(payload, cache, options).await {
            Ok(result) => {
                let verdict = Verdict::from(result);
                debug!(rule = %self.name, authorized = verdict.is_authorized(), "Rule resolved");
                Ok(verdict)
            }
            Err(raised) => self.recover(raised, options.debug),
        }
    }

    fn extract_fragments(&self) -> Vec<Fragment> {
        self.fragment
            .iter()
            .filter(|fragment| !fragment.is_empty())
            .cloned()
            .collect()
    }

    fn rule_id(&self) -> Option<RuleId> {
        Some(self.id)
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("cache", &self.cache)
            .field("fragment", &self.fragment)
            .finish_non_exhaustive()
    }
}
