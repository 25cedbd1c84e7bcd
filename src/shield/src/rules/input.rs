//! Input-validating rule

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use jsonschema::{Draft, Validator};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use super::rule::{Rule, RuleOptions};
use super::{Fragment, Payload, RuleId, ShieldRule};
use crate::cache::{CachePolicy, RequestCache};
use crate::error::{Result, ShieldError};
use crate::options::ShieldOptions;
use crate::verdict::{Reason, RuleResult, Verdict};

/// Validation settings forwarded to the schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOptions {
    /// Stop at the first violation
    #[serde(default = "default_abort_early")]
    pub abort_early: bool,
}

fn default_abort_early() -> bool {
    true
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            abort_early: default_abort_early(),
        }
    }
}

/// Schema that operation arguments are validated against
#[async_trait]
pub trait InputSchema: Send + Sync {
    /// Validate `args`, failing with the validation error
    async fn validate(&self, args: &Value, options: &ValidationOptions) -> anyhow::Result<()>;
}

/// JSON Schema (draft 2020-12) input schema
pub struct JsonSchema {
    validator: Validator,
}

impl JsonSchema {
    /// Compile a schema document
    pub fn new(schema: &Value) -> Result<Self> {
        let validator = jsonschema::options()
            .with_draft(Draft::Draft202012)
            .build(schema)
            .map_err(|err| ShieldError::InvalidSchema(err.to_string()))?;

        Ok(Self { validator })
    }
}

#[async_trait]
impl InputSchema for JsonSchema {
    async fn validate(&self, args: &Value, options: &ValidationOptions) -> anyhow::Result<()> {
        let mut errors = self.validator.iter_errors(args).map(|err| err.to_string());
        let messages: Vec<String> = if options.abort_early {
            errors.next().into_iter().collect()
        } else {
            errors.collect()
        };

        if messages.is_empty() {
            Ok(())
        } else {
            Err(anyhow::anyhow!(messages.join("; ")))
        }
    }
}

impl fmt::Debug for JsonSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonSchema").finish_non_exhaustive()
    }
}

/// Leaf rule validating operation arguments against a schema
///
/// Always caches strictly (argument shape is keyed on the arguments) and
/// never carries a fragment. A failed validation denies with the
/// validation error as reason.
#[derive(Debug)]
pub struct InputRule {
    rule: Rule,
}

impl InputRule {
    /// Create a named input rule
    pub fn new<S>(name: impl Into<String>, schema: S, options: ValidationOptions) -> Self
    where
        S: InputSchema + 'static,
    {
        let rule = Rule::new(name, Self::rule_options(), Self::validating(schema, options));
        Self { rule }
    }

    /// Create an input rule named after its generated identity
    pub fn anonymous<S>(schema: S, options: ValidationOptions) -> Self
    where
        S: InputSchema + 'static,
    {
        let rule = Rule::anonymous(Self::rule_options(), Self::validating(schema, options));
        Self { rule }
    }

    fn rule_options() -> RuleOptions {
        RuleOptions::new().with_cache(CachePolicy::Strict)
    }

    /// Predicate validating the payload arguments against `schema`
    fn validating<S>(
        schema: S,
        options: ValidationOptions,
    ) -> impl Fn(Arc<Payload>) -> BoxFuture<'static, anyhow::Result<RuleResult>> + Send + Sync + 'static
    where
        S: InputSchema + 'static,
    {
        let schema: Arc<dyn InputSchema> = Arc::new(schema);
        move |payload: Arc<Payload>| {
            let schema = Arc::clone(&schema);
            async move {
                let result = match schema.validate(&payload.args, &options).await {
                    Ok(()) => RuleResult::Bool(true),
                    Err(err) => RuleResult::Error(Reason::from(err)),
                };
                Ok(result)
            }
            .boxed()
        }
    }

    /// Underlying leaf rule
    pub fn rule(&self) -> &Rule {
        &self.rule
    }
}

#[async_trait]
impl ShieldRule for InputRule {
    async fn resolve(
        &self,
        payload: &Arc<Payload>,
        cache: &RequestCache,
        options: &ShieldOptions,
    ) -> Result<Verdict> {
        self.rule.resolve(payload, cache, options).await
    }

    fn extract_fragments(&self) -> Vec<Fragment> {
        Vec::new()
    }

    fn rule_id(&self) -> Option<RuleId> {
        Some(self.rule.id())
    }
}
