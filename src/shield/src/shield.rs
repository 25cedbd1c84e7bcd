//! Decision entry point
//!
//! A [`Shield`] owns the [`ShieldOptions`] and is what an external
//! dispatcher calls for every protected operation. It resolves a rule tree
//! against the request, turns the final [`Verdict`] into an outward
//! `Ok`/`Err`, and optionally runs the protected operation itself.
//!
//! # Request flow
//!
//! ```text
//! Payload → rule.resolve(cache) → Verdict → Ok(()) / Err(Denied(reason))
//!                                              ↓
//!                                         operation → Ok(T) / Err(fallback error)
//! ```

use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::RequestCache;
use crate::error::{Result, ShieldError};
use crate::options::ShieldOptions;
use crate::rules::{Payload, RuleRef};
use crate::verdict::{Reason, Verdict};

/// Authorization gate around protected operations
#[derive(Debug, Clone, Default)]
pub struct Shield {
    options: ShieldOptions,
}

impl Shield {
    /// Create a shield with the given options
    pub fn new(options: ShieldOptions) -> Self {
        info!(
            "Shield initialized with debug={}, allow_external_errors={}",
            options.debug, options.allow_external_errors
        );

        Self { options }
    }

    pub fn options(&self) -> &ShieldOptions {
        &self.options
    }

    /// Resolve `rule` once against `payload`, in a fresh request cache
    pub async fn resolve(&self, rule: &RuleRef, payload: Payload) -> Result<Verdict> {
        let cache = RequestCache::new();
        self.resolve_with(rule, &Arc::new(payload), &cache).await
    }

    /// Resolve `rule` within an existing request cache
    ///
    /// Use one cache for every protected operation of the same decision
    /// request, so that cached rules run at most once per request.
    pub async fn resolve_with(
        &self,
        rule: &RuleRef,
        payload: &Arc<Payload>,
        cache: &RequestCache,
    ) -> Result<Verdict> {
        rule.resolve(payload, cache, &self.options).await
    }

    /// Resolve `rule` and map the verdict onto an outward outcome
    ///
    /// # Returns
    ///
    /// * `Ok(())` when authorized
    /// * `Err(ShieldError::Denied(reason))` with the rule's reason, or the
    ///   fallback error for a plain denial
    /// * any failure propagated in debug mode, unchanged
    pub async fn authorize(
        &self,
        rule: &RuleRef,
        payload: &Arc<Payload>,
        cache: &RequestCache,
    ) -> Result<()> {
        match self.resolve_with(rule, payload, cache).await? {
            Verdict::Authorized => Ok(()),
            Verdict::DeniedWithReason(reason) => {
                debug!("Access denied: {}", reason);
                Err(ShieldError::Denied(reason))
            }
            Verdict::Denied => {
                debug!("Access denied without reason, using fallback error");
                Err(ShieldError::Denied(self.fallback_error(None, payload)))
            }
        }
    }

    /// Like [`Shield::authorize`], applying the fallback rule when the
    /// operation has no rule of its own
    pub async fn authorize_or_fallback(
        &self,
        rule: Option<&RuleRef>,
        payload: &Arc<Payload>,
        cache: &RequestCache,
    ) -> Result<()> {
        let rule = rule.unwrap_or(&self.options.fallback_rule);
        self.authorize(rule, payload, cache).await
    }

    /// Authorize, then run the protected `operation`
    ///
    /// Errors raised by the operation are passed through when
    /// `allow_external_errors` or `debug` is set; otherwise they are masked
    /// by the fallback error.
    pub async fn guard<T, F, Fut>(
        &self,
        rule: &RuleRef,
        payload: &Arc<Payload>,
        cache: &RequestCache,
        operation: F,
    ) -> Result<T>
    where
        F: FnOnce(Arc<Payload>) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        self.authorize(rule, payload, cache).await?;

        operation(Arc::clone(payload))
            .await
            .map_err(|err| self.recover(ShieldError::External(Reason::from(err)), payload))
    }

    fn recover(&self, err: ShieldError, payload: &Payload) -> ShieldError {
        if self.options.debug || self.options.allow_external_errors {
            return err;
        }

        warn!("Masking operation error: {}", err);
        ShieldError::Denied(self.fallback_error(Some(&err), payload))
    }

    fn fallback_error(&self, failure: Option<&ShieldError>, payload: &Payload) -> Reason {
        self.options.fallback_error.resolve(failure, payload)
    }
}
