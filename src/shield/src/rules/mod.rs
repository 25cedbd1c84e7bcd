//! Rule tree nodes
//!
//! A rule tree is built once and resolved many times, each time against one
//! decision request. Leaves wrap user predicates ([`Rule`], [`InputRule`]);
//! inner nodes combine their children ([`RuleAnd`], [`RuleOr`], [`RuleChain`],
//! [`RuleRace`], [`RuleNot`]) or are constants ([`RuleTrue`], [`RuleFalse`]).
//! Rules hold no per-request state: everything request-scoped lives in the
//! [`RequestCache`] passed to [`ShieldRule::resolve`].

pub mod input;
pub mod logic;
pub mod rule;

pub use input::{InputRule, InputSchema, JsonSchema, ValidationOptions};
pub use logic::{
    LogicRule, RuleAnd, RuleChain, RuleFalse, RuleGroup, RuleNot, RuleOr, RuleRace, RuleTrue,
};
pub use rule::{Rule, RuleOptions};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::cache::RequestCache;
use crate::error::Result;
use crate::options::ShieldOptions;
use crate::verdict::Verdict;

/// Opaque metadata attached to a leaf rule
pub type Fragment = String;

/// Shared handle to any rule tree node
pub type RuleRef = Arc<dyn ShieldRule>;

/// Decision-request payload forwarded untouched to predicates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    /// Parent (source) object
    #[serde(default)]
    pub parent: Value,

    /// Operation arguments
    #[serde(default)]
    pub args: Value,

    /// Caller context
    #[serde(default)]
    pub context: Value,

    /// Request metadata
    #[serde(default)]
    pub info: Value,
}

impl Payload {
    /// Create a payload from its four parts
    pub fn new(parent: Value, args: Value, context: Value, info: Value) -> Self {
        Self {
            parent,
            args,
            context,
            info,
        }
    }

    pub fn with_parent(mut self, parent: Value) -> Self {
        self.parent = parent;
        self
    }

    pub fn with_args(mut self, args: Value) -> Self {
        self.args = args;
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    pub fn with_info(mut self, info: Value) -> Self {
        self.info = info;
        self
    }
}

/// Identity assigned to a leaf rule at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleId(Uuid);

impl RuleId {
    /// Generate a fresh identity
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Capability shared by every node of a rule tree
#[async_trait]
pub trait ShieldRule: Send + Sync + fmt::Debug {
    /// Resolve the rule against one decision request
    ///
    /// Only returns `Err` when `options.debug` is set and a predicate raised.
    async fn resolve(
        &self,
        payload: &Arc<Payload>,
        cache: &RequestCache,
        options: &ShieldOptions,
    ) -> Result<Verdict>;

    /// Fragments attached to the leaves of this rule, in child order
    fn extract_fragments(&self) -> Vec<Fragment>;

    /// Whether this node combines other rules
    fn is_logic(&self) -> bool {
        false
    }

    /// Identity of a leaf rule
    fn rule_id(&self) -> Option<RuleId> {
        None
    }

    /// Whether both nodes are the same leaf rule
    fn equals(&self, other: &dyn ShieldRule) -> bool {
        match (self.rule_id(), other.rule_id()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}
