//! Kernel error types.
//!
//! Every public API in this crate returns [`KernelError`]. A policy violation
//! means the input does not satisfy a rule; a collaborator failure means the
//! rule could not be evaluated at all. Callers must not treat one as the
//! other.

use crate::rule::RuleViolation;

/// Unified error type for the Keyward rule engine.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    // -- Enforcement errors -------------------------------------------------
    /// A rule's define step failed; enforcement stopped at this rule.
    #[error("{0}")]
    Violation(RuleViolation),

    /// A collaborator used by a rule (filesystem, VCS, vault handle) failed
    /// while the rule was being evaluated.
    #[error("rule `{rule}` could not be evaluated: {source}")]
    Collaborator {
        rule: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    // -- Selection errors ---------------------------------------------------
    /// The rule selector is not a valid glob pattern.
    #[error("invalid rule selector `{pattern}`: {reason}")]
    InvalidSelector { pattern: String, reason: String },

    // -- Registration errors ------------------------------------------------
    /// A rule with the same name is already part of the rulebook.
    #[error("rule already registered: {name}")]
    DuplicateRule { name: String },
}

impl KernelError {
    /// The violation carried by this error, if it is one.
    pub fn violation(&self) -> Option<&RuleViolation> {
        match self {
            Self::Violation(v) => Some(v),
            _ => None,
        }
    }
}

/// Convenience alias used throughout the kernel crate.
pub type Result<T> = std::result::Result<T, KernelError>;
