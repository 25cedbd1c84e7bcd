//! Factory functions for building rule trees
//!
//! Every constructor hands back a [`RuleRef`], so trees compose without
//! naming concrete node types:
//!
//! ```
//! use authz_shield::constructors::{and, chain, not_with_message, rule};
//! use authz_shield::rules::RuleOptions;
//! use authz_shield::RuleResult;
//!
//! let is_authenticated = rule(Some("is_authenticated"), RuleOptions::new(), |payload| async move {
//!     Ok(RuleResult::from(!payload.context["user"].is_null()))
//! });
//! let is_banned = rule(Some("is_banned"), RuleOptions::new(), |payload| async move {
//!     Ok(RuleResult::from(payload.context["banned"] == true))
//! });
//!
//! let tree = and(vec![
//!     is_authenticated.clone(),
//!     chain(vec![is_authenticated, not_with_message(is_banned, "Account suspended")]),
//! ]);
//! assert!(tree.is_logic());
//! ```

use std::future::Future;
use std::sync::Arc;

use crate::rules::{
    InputRule, InputSchema, Payload, Rule, RuleAnd, RuleChain, RuleFalse, RuleNot, RuleOptions,
    RuleOr, RuleRace, RuleRef, RuleTrue, ValidationOptions,
};
use crate::verdict::{Reason, RuleResult};

/// Leaf rule around `predicate`; unnamed rules are named by their id
pub fn rule<F, Fut>(name: Option<&str>, options: RuleOptions, predicate: F) -> RuleRef
where
    F: Fn(Arc<Payload>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<RuleResult>> + Send + 'static,
{
    match name {
        Some(name) => Arc::new(Rule::new(name, options, predicate)),
        None => Arc::new(Rule::anonymous(options, predicate)),
    }
}

/// Rule validating operation arguments against `schema`; unnamed rules
/// are named by their id
pub fn input_rule<S>(name: Option<&str>, schema: S, options: ValidationOptions) -> RuleRef
where
    S: InputSchema + 'static,
{
    match name {
        Some(name) => Arc::new(InputRule::new(name, schema, options)),
        None => Arc::new(InputRule::anonymous(schema, options)),
    }
}

/// Authorizes when every rule authorizes; all rules run
pub fn and(rules: Vec<RuleRef>) -> RuleRef {
    Arc::new(RuleAnd::new(rules))
}

/// Authorizes when any rule authorizes; all rules run
pub fn or(rules: Vec<RuleRef>) -> RuleRef {
    Arc::new(RuleOr::new(rules))
}

/// Authorizes when every rule authorizes; stops at the first denial
pub fn chain(rules: Vec<RuleRef>) -> RuleRef {
    Arc::new(RuleChain::new(rules))
}

/// Authorizes when any rule authorizes; stops at the first authorization
pub fn race(rules: Vec<RuleRef>) -> RuleRef {
    Arc::new(RuleRace::new(rules))
}

/// Inverts `rule`, denying with `error` (if any) when it authorizes
pub fn not(rule: RuleRef, error: Option<Reason>) -> RuleRef {
    Arc::new(RuleNot::new(rule, error))
}

pub fn not_with_message(rule: RuleRef, message: &str) -> RuleRef {
    not(rule, Some(Reason::msg(message.to_string())))
}

pub fn allow() -> RuleRef {
    Arc::new(RuleTrue::new())
}

pub fn deny() -> RuleRef {
    Arc::new(RuleFalse::new())
}
