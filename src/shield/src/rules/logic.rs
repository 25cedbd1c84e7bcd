//! Logic rules: combinators and constants
//!
//! `RuleAnd` and `RuleOr` resolve every child concurrently and join the
//! results, so all children always run. `RuleChain` and `RuleRace` resolve
//! children one at a time and stop as soon as the outcome is decided, so
//! trailing predicates are never invoked.

use async_trait::async_trait;
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::trace;

use super::{Fragment, Payload, RuleRef, ShieldRule};
use crate::cache::RequestCache;
use crate::error::Result;
use crate::options::ShieldOptions;
use crate::verdict::{Reason, Verdict};

/// Resolve every rule concurrently, keeping verdicts in rule order
///
/// All resolutions are started before any is awaited. A propagated failure
/// (debug mode) aborts the join.
pub async fn evaluate_all(
    rules: &[RuleRef],
    payload: &Arc<Payload>,
    cache: &RequestCache,
    options: &ShieldOptions,
) -> Result<Vec<Verdict>> {
    try_join_all(rules.iter().map(|rule| rule.resolve(payload, cache, options))).await
}

/// Rule combining an ordered list of child rules
#[async_trait]
pub trait LogicRule: ShieldRule {
    /// Child rules in declaration order
    fn rules(&self) -> &[RuleRef];

    /// Resolve the children; by default all of them, concurrently
    async fn evaluate(
        &self,
        payload: &Arc<Payload>,
        cache: &RequestCache,
        options: &ShieldOptions,
    ) -> Result<Vec<Verdict>> {
        evaluate_all(self.rules(), payload, cache, options).await
    }
}

/// Ordered, immutable group of child rules
///
/// Base of every logic rule. Resolving a bare group always denies.
#[derive(Debug, Clone, Default)]
pub struct RuleGroup {
    rules: Vec<RuleRef>,
}

impl RuleGroup {
    pub fn new(rules: Vec<RuleRef>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[RuleRef] {
        &self.rules
    }

    /// Fragments of every descendant leaf, in child order, duplicates kept
    pub fn extract_fragments(&self) -> Vec<Fragment> {
        self.rules
            .iter()
            .flat_map(|rule| rule.extract_fragments())
            .collect()
    }
}

#[async_trait]
impl ShieldRule for RuleGroup {
    async fn resolve(
        &self,
        _payload: &Arc<Payload>,
        _cache: &RequestCache,
        _options: &ShieldOptions,
    ) -> Result<Verdict> {
        Ok(Verdict::Denied)
    }

    fn extract_fragments(&self) -> Vec<Fragment> {
        RuleGroup::extract_fragments(self)
    }

    fn is_logic(&self) -> bool {
        true
    }
}

impl LogicRule for RuleGroup {
    fn rules(&self) -> &[RuleRef] {
        &self.rules
    }
}

/// Authorizes when every child authorizes
#[derive(Debug, Clone)]
pub struct RuleAnd {
    group: RuleGroup,
}

impl RuleAnd {
    pub fn new(rules: Vec<RuleRef>) -> Self {
        Self {
            group: RuleGroup::new(rules),
        }
    }
}

#[async_trait]
impl ShieldRule for RuleAnd {
    async fn resolve(
        &self,
        payload: &Arc<Payload>,
        cache: &RequestCache,
        options: &ShieldOptions,
    ) -> Result<Verdict> {
        let verdicts = self.evaluate(payload, cache, options).await?;

        if verdicts.iter().all(Verdict::is_authorized) {
            Ok(Verdict::Authorized)
        } else {
            Ok(Verdict::first_denial(&verdicts))
        }
    }

    fn extract_fragments(&self) -> Vec<Fragment> {
        self.group.extract_fragments()
    }

    fn is_logic(&self) -> bool {
        true
    }
}

impl LogicRule for RuleAnd {
    fn rules(&self) -> &[RuleRef] {
        self.group.rules()
    }
}

/// Authorizes when at least one child authorizes
#[derive(Debug, Clone)]
pub struct RuleOr {
    group: RuleGroup,
}

impl RuleOr {
    pub fn new(rules: Vec<RuleRef>) -> Self {
        Self {
            group: RuleGroup::new(rules),
        }
    }
}

#[async_trait]
impl ShieldRule for RuleOr {
    async fn resolve(
        &self,
        payload: &Arc<Payload>,
        cache: &RequestCache,
        options: &ShieldOptions,
    ) -> Result<Verdict> {
        let verdicts = self.evaluate(payload, cache, options).await?;

        if verdicts.iter().any(Verdict::is_authorized) {
            Ok(Verdict::Authorized)
        } else {
            Ok(Verdict::first_denial(&verdicts))
        }
    }

    fn extract_fragments(&self) -> Vec<Fragment> {
        self.group.extract_fragments()
    }

    fn is_logic(&self) -> bool {
        true
    }
}

impl LogicRule for RuleOr {
    fn rules(&self) -> &[RuleRef] {
        self.group.rules()
    }
}

/// Sequential AND: stops at the first child that does not authorize
#[derive(Debug, Clone)]
pub struct RuleChain {
    group: RuleGroup,
}

impl RuleChain {
    pub fn new(rules: Vec<RuleRef>) -> Self {
        Self {
            group: RuleGroup::new(rules),
        }
    }
}

#[async_trait]
impl ShieldRule for RuleChain {
    async fn resolve(
        &self,
        payload: &Arc<Payload>,
        cache: &RequestCache,
        options: &ShieldOptions,
    ) -> Result<Verdict> {
        let verdicts = self.evaluate(payload, cache, options).await?;

        if verdicts.iter().all(Verdict::is_authorized) {
            Ok(Verdict::Authorized)
        } else {
            Ok(Verdict::first_denial(&verdicts))
        }
    }

    fn extract_fragments(&self) -> Vec<Fragment> {
        self.group.extract_fragments()
    }

    fn is_logic(&self) -> bool {
        true
    }
}

#[async_trait]
impl LogicRule for RuleChain {
    fn rules(&self) -> &[RuleRef] {
        self.group.rules()
    }

    /// Returns either every verdict (all authorized) or just the first
    /// non-authorizing one
    async fn evaluate(
        &self,
        payload: &Arc<Payload>,
        cache: &RequestCache,
        options: &ShieldOptions,
    ) -> Result<Vec<Verdict>> {
        let mut verdicts = Vec::with_capacity(self.rules().len());

        for (index, rule) in self.rules().iter().enumerate() {
            let verdict = rule.resolve(payload, cache, options).await?;
            if !verdict.is_authorized() {
                trace!(index, "Chain stopped at first denial");
                return Ok(vec![verdict]);
            }
            verdicts.push(verdict);
        }

        Ok(verdicts)
    }
}

/// Sequential OR: stops at the first child that authorizes
#[derive(Debug, Clone)]
pub struct RuleRace {
    group: RuleGroup,
}

impl RuleRace {
    pub fn new(rules: Vec<RuleRef>) -> Self {
        Self {
            group: RuleGroup::new(rules),
        }
    }
}

#[async_trait]
impl ShieldRule for RuleRace {
    async fn resolve(
        &self,
        payload: &Arc<Payload>,
        cache: &RequestCache,
        options: &ShieldOptions,
    ) -> Result<Verdict> {
        let verdicts = self.evaluate(payload, cache, options).await?;

        if verdicts.iter().any(Verdict::is_authorized) {
            Ok(Verdict::Authorized)
        } else {
            Ok(Verdict::first_denial(&verdicts))
        }
    }

    fn extract_fragments(&self) -> Vec<Fragment> {
        self.group.extract_fragments()
    }

    fn is_logic(&self) -> bool {
        true
    }
}

#[async_trait]
impl LogicRule for RuleRace {
    fn rules(&self) -> &[RuleRef] {
        self.group.rules()
    }

    /// Returns either the first authorizing verdict alone or every
    /// verdict collected, latest child first
    async fn evaluate(
        &self,
        payload: &Arc<Payload>,
        cache: &RequestCache,
        options: &ShieldOptions,
    ) -> Result<Vec<Verdict>> {
        let mut verdicts = Vec::with_capacity(self.rules().len());

        for (index, rule) in self.rules().iter().enumerate() {
            let verdict = rule.resolve(payload, cache, options).await?;
            if verdict.is_authorized() {
                trace!(index, "Race stopped at first authorization");
                return Ok(vec![verdict]);
            }
            verdicts.push(verdict);
        }

        verdicts.reverse();
        Ok(verdicts)
    }
}

/// Negation of a single child
///
/// Any denial of the child, reasoned or not, authorizes. An authorizing
/// child denies, with the custom error when one was given.
#[derive(Debug, Clone)]
pub struct RuleNot {
    group: RuleGroup,
    error: Option<Reason>,
}

impl RuleNot {
    pub fn new(rule: RuleRef, error: Option<Reason>) -> Self {
        Self {
            group: RuleGroup::new(vec![rule]),
            error,
        }
    }

    /// Custom error reported when the child authorizes
    pub fn error(&self) -> Option<&Reason> {
        self.error.as_ref()
    }
}

#[async_trait]
impl ShieldRule for RuleNot {
    async fn resolve(
        &self,
        payload: &Arc<Payload>,
        cache: &RequestCache,
        options: &ShieldOptions,
    ) -> Result<Verdict> {
        let verdicts = self.evaluate(payload, cache, options).await?;

        match verdicts.first() {
            Some(Verdict::Authorized) => Ok(self
                .error
                .clone()
                .map_or(Verdict::Denied, Verdict::DeniedWithReason)),
            _ => Ok(Verdict::Authorized),
        }
    }

    fn extract_fragments(&self) -> Vec<Fragment> {
        self.group.extract_fragments()
    }

    fn is_logic(&self) -> bool {
        true
    }
}

impl LogicRule for RuleNot {
    fn rules(&self) -> &[RuleRef] {
        self.group.rules()
    }
}

/// Always authorizes
#[derive(Debug, Clone, Default)]
pub struct RuleTrue {
    group: RuleGroup,
}

impl RuleTrue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ShieldRule for RuleTrue {
    async fn resolve(
        &self,
        _payload: &Arc<Payload>,
        _cache: &RequestCache,
        _options: &ShieldOptions,
    ) -> Result<Verdict> {
        Ok(Verdict::Authorized)
    }

    fn extract_fragments(&self) -> Vec<Fragment> {
        self.group.extract_fragments()
    }

    fn is_logic(&self) -> bool {
        true
    }
}

impl LogicRule for RuleTrue {
    fn rules(&self) -> &[RuleRef] {
        self.group.rules()
    }
}

/// Always denies
#[derive(Debug, Clone, Default)]
pub struct RuleFalse {
    group: RuleGroup,
}

impl RuleFalse {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ShieldRule for RuleFalse {
    async fn resolve(
        &self,
        _payload: &Arc<Payload>,
        _cache: &RequestCache,
        _options: &ShieldOptions,
    ) -> Result<Verdict> {
        Ok(Verdict::Denied)
    }

    fn extract_fragments(&self) -> Vec<Fragment> {
        self.group.extract_fragments()
    }

    fn is_logic(&self) -> bool {
        true
    }
}

impl LogicRule for RuleFalse {
    fn rules(&self) -> &[RuleRef] {
        self.group.rules()
    }
}
