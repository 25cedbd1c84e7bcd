//! Authorization verdicts and predicate outputs

use std::fmt;
use std::sync::Arc;

/// Opaque error value explaining why a rule denied access
///
/// Reasons are cheap to clone and may be shared between every evaluator
/// that observed the same cached computation.
#[derive(Clone)]
pub struct Reason(Arc<anyhow::Error>);

impl Reason {
    /// Create a reason from a plain message
    pub fn msg<M>(message: M) -> Self
    where
        M: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        Self(Arc::new(anyhow::Error::msg(message)))
    }

    /// Wrap an existing error value
    pub fn new<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self(Arc::new(anyhow::Error::new(error)))
    }

    /// Caller-visible message
    pub fn message(&self) -> String {
        self.0.to_string()
    }

    /// Underlying error value
    pub fn as_error(&self) -> &anyhow::Error {
        &self.0
    }

    /// Whether both reasons are the very same error value
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl From<anyhow::Error> for Reason {
    fn from(error: anyhow::Error) -> Self {
        Self(Arc::new(error))
    }
}

impl PartialEq for Reason {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.message() == other.message()
    }
}

impl fmt::Debug for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Reason").field(&self.message()).finish()
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl std::error::Error for Reason {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

/// Outcome of resolving any rule
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Access granted
    Authorized,

    /// Access denied without further detail
    Denied,

    /// Access denied with a caller-visible reason
    DeniedWithReason(Reason),
}

impl Verdict {
    /// Whether access was granted
    pub fn is_authorized(&self) -> bool {
        matches!(self, Self::Authorized)
    }

    /// Reason attached to a denial, if any
    pub fn reason(&self) -> Option<&Reason> {
        match self {
            Self::DeniedWithReason(reason) => Some(reason),
            _ => None,
        }
    }

    /// First reasoned denial in declaration order, else a plain denial
    pub(crate) fn first_denial(verdicts: &[Verdict]) -> Verdict {
        verdicts
            .iter()
            .find_map(Verdict::reason)
            .map_or(Verdict::Denied, |reason| Verdict::DeniedWithReason(reason.clone()))
    }
}

/// Value a predicate settles with
///
/// Predicates may answer with a boolean, a message, or an error value. The
/// output is decoded into a [`Verdict`] once, at the leaf rule boundary.
#[derive(Debug, Clone)]
pub enum RuleResult {
    /// `true` authorizes, `false` denies
    Bool(bool),

    /// Denial whose reason is built from the message
    Message(String),

    /// Denial carrying the returned error value
    Error(Reason),
}

impl From<bool> for RuleResult {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for RuleResult {
    fn from(message: &str) -> Self {
        Self::Message(message.to_string())
    }
}

impl From<String> for RuleResult {
    fn from(message: String) -> Self {
        Self::Message(message)
    }
}

impl From<Reason> for RuleResult {
    fn from(reason: Reason) -> Self {
        Self::Error(reason)
    }
}

impl From<RuleResult> for Verdict {
    fn from(result: RuleResult) -> Self {
        match result {
            RuleResult::Error(reason) => Verdict::DeniedWithReason(reason),
            RuleResult::Message(message) => Verdict::DeniedWithReason(Reason::msg(message)),
            RuleResult::Bool(true) => Verdict::Authorized,
            RuleResult::Bool(false) => Verdict::Denied,
        }
    }
}
