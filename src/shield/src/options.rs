//! Per-request configuration bundle

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::error::{Result, ShieldError};
use crate::rules::logic::RuleTrue;
use crate::rules::{Payload, RuleRef};
use crate::verdict::Reason;

/// Message of the default fallback error
pub const DEFAULT_FALLBACK_ERROR: &str = "Not Authorised!";

/// Derives the strict cache sub-key from parent and arguments
pub type HashFunction = Arc<dyn Fn(&Value, &Value) -> String + Send + Sync>;

/// Maps a failure (or `None` for a plain denial) to the outward error
pub type FallbackErrorMapper = Arc<dyn Fn(Option<&ShieldError>, &Payload) -> Reason + Send + Sync>;

#[derive(Serialize)]
struct HashMaterial {
    parent: Value,
    args: Value,
}

/// Rebuild objects with their keys in sorted order
fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), canonical(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}

/// Default strict-cache hash: BLAKE3 over the key-sorted JSON form of
/// parent and arguments
pub fn default_hash(parent: &Value, args: &Value) -> String {
    let material = HashMaterial {
        parent: canonical(parent),
        args: canonical(args),
    };
    let bytes = serde_json::to_vec(&material).unwrap_or_default();
    blake3::hash(&bytes).to_hex().to_string()
}

/// Error reported when a rule denies without a reason
#[derive(Clone)]
pub enum FallbackError {
    /// Always the same error value
    Static(Reason),

    /// Error computed from the failure and payload
    Mapper(FallbackErrorMapper),
}

impl FallbackError {
    /// Fallback error built from a message
    pub fn message(message: impl Into<String>) -> Self {
        Self::Static(Reason::msg(message.into()))
    }

    /// Fallback error computed per failure
    pub fn mapper<F>(mapper: F) -> Self
    where
        F: Fn(Option<&ShieldError>, &Payload) -> Reason + Send + Sync + 'static,
    {
        Self::Mapper(Arc::new(mapper))
    }

    /// Produce the outward error for `failure`
    pub fn resolve(&self, failure: Option<&ShieldError>, payload: &Payload) -> Reason {
        match self {
            Self::Static(reason) => reason.clone(),
            Self::Mapper(mapper) => mapper(failure, payload),
        }
    }
}

impl Default for FallbackError {
    fn default() -> Self {
        Self::message(DEFAULT_FALLBACK_ERROR)
    }
}

impl fmt::Debug for FallbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(reason) => f.debug_tuple("Static").field(reason).finish(),
            Self::Mapper(_) => f.write_str("Mapper(<fn>)"),
        }
    }
}

/// Configuration shared by every rule resolved within one decision request
///
/// Read-only to rules.
#[derive(Clone)]
pub struct ShieldOptions {
    /// Propagate raised predicate failures instead of denying
    pub debug: bool,

    /// Pass errors of protected operations through unchanged
    pub allow_external_errors: bool,

    /// Rule applied to operations without a rule of their own
    pub fallback_rule: RuleRef,

    /// Error reported for plain denials
    pub fallback_error: FallbackError,

    /// Hash used for strict cache keys
    pub hash_function: HashFunction,
}

impl ShieldOptions {
    /// Start building options from the defaults
    pub fn builder() -> ShieldOptionsBuilder {
        ShieldOptionsBuilder::default()
    }
}

impl Default for ShieldOptions {
    fn default() -> Self {
        Self {
            debug: false,
            allow_external_errors: false,
            fallback_rule: Arc::new(RuleTrue::new()),
            fallback_error: FallbackError::default(),
            hash_function: Arc::new(default_hash),
        }
    }
}

impl fmt::Debug for ShieldOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShieldOptions")
            .field("debug", &self.debug)
            .field("allow_external_errors", &self.allow_external_errors)
            .field("fallback_rule", &self.fallback_rule)
            .field("fallback_error", &self.fallback_error)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ShieldOptions`]
#[derive(Debug, Default)]
pub struct ShieldOptionsBuilder {
    options: ShieldOptions,
}

impl ShieldOptionsBuilder {
    pub fn debug(mut self, debug: bool) -> Self {
        self.options.debug = debug;
        self
    }

    pub fn allow_external_errors(mut self, allow: bool) -> Self {
        self.options.allow_external_errors = allow;
        self
    }

    pub fn fallback_rule(mut self, rule: RuleRef) -> Self {
        self.options.fallback_rule = rule;
        self
    }

    pub fn fallback_error(mut self, error: FallbackError) -> Self {
        self.options.fallback_error = error;
        self
    }

    pub fn fallback_error_message(self, message: impl Into<String>) -> Self {
        self.fallback_error(FallbackError::message(message))
    }

    pub fn hash_function<F>(mut self, hash: F) -> Self
    where
        F: Fn(&Value, &Value) -> String + Send + Sync + 'static,
    {
        self.options.hash_function = Arc::new(hash);
        self
    }

    pub fn build(self) -> ShieldOptions {
        self.options
    }
}

/// Serializable subset of [`ShieldOptions`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShieldSettings {
    /// Propagate raised predicate failures
    pub debug: bool,

    /// Pass errors of protected operations through
    pub allow_external_errors: bool,

    /// Message of the fallback error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_error: Option<String>,
}

impl ShieldSettings {
    /// Parse settings from a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ShieldError::InvalidConfig(e.to_string()))
    }
}

impl From<ShieldSettings> for ShieldOptions {
    fn from(settings: ShieldSettings) -> Self {
        let builder = ShieldOptions::builder()
            .debug(settings.debug)
            .allow_external_errors(settings.allow_external_errors);

        match settings.fallback_error {
            Some(message) => builder.fallback_error_message(message).build(),
            None => builder.build(),
        }
    }
}
