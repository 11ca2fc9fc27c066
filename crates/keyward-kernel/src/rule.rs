//! The [`Rule`] trait and the values flowing through a rule evaluation.
//!
//! A rule is evaluated in two steps:
//!
//! 1. **enable** -- inspects the context and returns an [`Activation`]. A rule
//!    may switch itself off (with a human-readable reason) or report that its
//!    configuration is invalid. Neither outcome fails enforcement.
//! 2. **define** -- only runs for enabled rules. Returns a [`Verdict`]: `Ok`
//!    when the context satisfies the rule, otherwise a [`RuleFailure`].
//!
//! Violations are passed through [`Rule::punish`] before they leave the
//! rulebook, so a rule can rewrite the message or attach extra detail.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Activation
// ---------------------------------------------------------------------------

/// Result of a rule's enable step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    /// The rule applies to this context; its define step will run.
    Enabled,
    /// The rule does not apply. The reason is recorded in the report.
    Disabled(String),
    /// The rule's configuration is invalid (e.g. a negative minimum). The
    /// rule is treated as disabled and the message is surfaced as a warning.
    Misconfigured(String),
}

impl Activation {
    /// Shorthand for [`Activation::Disabled`].
    pub fn disabled(reason: impl Into<String>) -> Self {
        Self::Disabled(reason.into())
    }

    /// Shorthand for [`Activation::Misconfigured`].
    pub fn misconfigured(message: impl Into<String>) -> Self {
        Self::Misconfigured(message.into())
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled)
    }
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

/// Why a rule's define step did not pass.
#[derive(Debug)]
pub enum RuleFailure {
    /// The context does not satisfy the rule.
    Violation { message: String },
    /// A collaborator needed to evaluate the rule failed. This is never
    /// reported as a violation.
    Collaborator(Box<dyn std::error::Error + Send + Sync>),
}

impl RuleFailure {
    pub fn violation(message: impl Into<String>) -> Self {
        Self::Violation {
            message: message.into(),
        }
    }

    pub fn collaborator(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Collaborator(source.into())
    }
}

/// Return type of [`Rule::define`].
pub type Verdict = std::result::Result<(), RuleFailure>;

/// A structured policy violation produced by the rulebook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleViolation {
    /// Hierarchical name of the failing rule, e.g. `credential/password/length`.
    pub rule: String,
    /// Short, specific failure message.
    pub message: String,
    /// Longer explanation of what the rule protects against.
    pub description: Option<String>,
}

impl std::fmt::Display for RuleViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.rule, self.message)
    }
}

// ---------------------------------------------------------------------------
// Rule trait
// ---------------------------------------------------------------------------

/// A named, self-describing check evaluated against a context of type `C`.
///
/// Rules are stateless; the same instance is shared by every enforcement
/// pass of the rulebook that owns it.
#[async_trait]
pub trait Rule<C>: Send + Sync
where
    C: Send + Sync + ?Sized,
{
    /// Hierarchical, `/`-separated rule name. Unique within a rulebook.
    fn name(&self) -> &'static str;

    /// Human-readable explanation attached to violations.
    fn description(&self) -> &'static str {
        ""
    }

    /// Decide whether the rule applies to `ctx`.
    async fn enable(&self, _ctx: &C) -> Activation {
        Activation::Enabled
    }

    /// Evaluate the rule against `ctx`.
    async fn define(&self, ctx: &C) -> Verdict;

    /// Rewrite a violation before it is returned to the caller.
    fn punish(&self, violation: RuleViolation) -> RuleViolation {
        violation
    }
}
