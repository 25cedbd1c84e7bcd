//! # Authz Shield
//!
//! Composable, asynchronous permission rules for guarding operations.
//!
//! ## Features
//!
//! - **Async predicates** wrapped as leaf rules, answering with a boolean,
//!   a message or an error value
//! - **Combinators**: parallel `and`/`or`, short-circuiting `chain`/`race`, `not`
//! - **Per-request caching** so a cached rule runs at most once per request,
//!   even when reached concurrently from several branches
//! - **Input rules** validating operation arguments with JSON Schema
//! - **Fragments** collected from the tree for query shaping
//!
//! ## Example
//!
//! ```rust
//! use authz_shield::constructors::{and, not_with_message, rule};
//! use authz_shield::{CachePolicy, Payload, RuleOptions, RuleResult, Shield, ShieldOptions};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let is_authenticated = rule(
//!         Some("is_authenticated"),
//!         RuleOptions::new().with_cache(CachePolicy::Contextual),
//!         |payload| async move { Ok(RuleResult::from(payload.context["user"].is_string())) },
//!     );
//!     let is_guest = rule(Some("is_guest"), RuleOptions::new(), |payload| async move {
//!         Ok(RuleResult::from(payload.context["user"] == "guest"))
//!     });
//!     let can_post = and(vec![is_authenticated, not_with_message(is_guest, "Guests cannot post")]);
//!
//!     let shield = Shield::new(ShieldOptions::default());
//!     let verdict = shield
//!         .resolve(&can_post, Payload::default().with_context(json!({ "user": "alice" })))
//!         .await?;
//!
//!     if verdict.is_authorized() {
//!         println!("Access granted!");
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod constructors;
pub mod error;
pub mod options;
pub mod rules;
pub mod shield;
pub mod verdict;

// Re-export commonly used types
pub use cache::{CacheKey, CachePolicy, CacheStats, KeyScope, RequestCache};
pub use error::{Result, ShieldError};
pub use options::{FallbackError, ShieldOptions, ShieldSettings};
pub use rules::{
    InputRule, InputSchema, JsonSchema, Payload, Rule, RuleId, RuleOptions, RuleRef, ShieldRule,
    ValidationOptions,
};
pub use shield::Shield;
pub use verdict::{Reason, RuleResult, Verdict};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
