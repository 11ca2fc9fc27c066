//! Ordered rule collections and their enforcement.
//!
//! A [`Rulebook`] owns rules in registration order. Enforcement selects the
//! rules whose names match a glob [`Selector`] and runs them one after the
//! other against a shared context:
//!
//! ```text
//!   Pending ──enable──► Disabled | Misconfigured | Enabled
//!                                                    │
//!                                                  define
//!                                                    ▼
//!                                             Passed | Failed
//! ```
//!
//! `Disabled`, `Misconfigured` and `Passed` let enforcement continue. The
//! first `Failed` rule stops the pass and its (punished) violation is
//! returned. Collaborator failures stop the pass as well, but surface as
//! [`KernelError::Collaborator`].
//!
//! # Example
//!
//! ```rust
//! # use keyward_kernel::{Rule, Rulebook, Verdict, RuleFailure};
//! # use async_trait::async_trait;
//! struct NonEmpty;
//!
//! #[async_trait]
//! impl Rule<String> for NonEmpty {
//!     fn name(&self) -> &'static str { "text/non-empty" }
//!     async fn define(&self, ctx: &String) -> Verdict {
//!         if ctx.is_empty() {
//!             return Err(RuleFailure::violation("text is empty"));
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let mut book = Rulebook::new("text");
//! book.add(NonEmpty).unwrap();
//! # let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! # rt.block_on(async {
//! let report = book.enforce_all(&"hello".to_string()).await.unwrap();
//! assert_eq!(report.passed().count(), 1);
//! # });
//! ```

use std::sync::Arc;

use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};

use crate::error::{KernelError, Result};
use crate::rule::{Activation, Rule, RuleFailure, RuleViolation};

// ---------------------------------------------------------------------------
// Selector
// ---------------------------------------------------------------------------

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Glob pattern over rule names. `*` never crosses a `/`; `**/*` selects
/// every rule.
#[derive(Debug, Clone)]
pub enum Selector {
    All,
    Pattern(Pattern),
}

impl Selector {
    /// Pattern text that selects every rule.
    pub const ALL: &'static str = "**/*";

    pub fn new(pattern: &str) -> Result<Self> {
        if pattern == Self::ALL {
            return Ok(Self::All);
        }
        Pattern::new(pattern)
            .map(Self::Pattern)
            .map_err(|e| KernelError::InvalidSelector {
                pattern: pattern.to_string(),
                reason: e.msg.to_string(),
            })
    }

    pub fn matches(&self, rule_name: &str) -> bool {
        match self {
            Self::All => true,
            Self::Pattern(p) => p.matches_with(rule_name, MATCH_OPTIONS),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::All => Self::ALL,
            Self::Pattern(p) => p.as_str(),
        }
    }
}

impl std::str::FromStr for Selector {
    type Err = KernelError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Final state of a rule that did not fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RuleStatus {
    Passed,
    Disabled(String),
    Misconfigured(String),
}

impl RuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Disabled(_) => "disabled",
            Self::Misconfigured(_) => "misconfigured",
        }
    }
}

impl std::fmt::Display for RuleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Passed => f.write_str("passed"),
            Self::Disabled(reason) => write!(f, "disabled ({reason})"),
            Self::Misconfigured(message) => write!(f, "misconfigured ({message})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleOutcome {
    pub rule: String,
    pub status: RuleStatus,
}

/// Per-rule outcomes of a successful enforcement pass, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnforcementReport {
    pub outcomes: Vec<RuleOutcome>,
}

impl EnforcementReport {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Status recorded for the named rule, if it was selected.
    pub fn status_of(&self, rule: &str) -> Option<&RuleStatus> {
        self.outcomes
            .iter()
            .find(|o| o.rule == rule)
            .map(|o| &o.status)
    }

    /// Names of rules whose define step passed.
    pub fn passed(&self) -> impl Iterator<Item = &str> {
        self.outcomes
            .iter()
            .filter(|o| o.status == RuleStatus::Passed)
            .map(|o| o.rule.as_str())
    }

    /// `(rule, reason)` for every self-disabled rule.
    pub fn disabled(&self) -> impl Iterator<Item = (&str, &str)> {
        self.outcomes.iter().filter_map(|o| match &o.status {
            RuleStatus::Disabled(reason) => Some((o.rule.as_str(), reason.as_str())),
            _ => None,
        })
    }

    /// `(rule, message)` for every rule with an invalid configuration.
    pub fn misconfigured(&self) -> impl Iterator<Item = (&str, &str)> {
        self.outcomes.iter().filter_map(|o| match &o.status {
            RuleStatus::Misconfigured(message) => Some((o.rule.as_str(), message.as_str())),
            _ => None,
        })
    }
}

// ---------------------------------------------------------------------------
// Rulebook
// ---------------------------------------------------------------------------

/// Ordered set of rules sharing one context type.
pub struct Rulebook<C: Send + Sync + ?Sized> {
    name: String,
    rules: Vec<Arc<dyn Rule<C>>>,
}

impl<C: Send + Sync + ?Sized> Rulebook<C> {
    /// Create an empty rulebook. `name` only appears in diagnostics.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a rule. Rules run in the order they were added.
    pub fn add<R: Rule<C> + 'static>(&mut self, rule: R) -> Result<()> {
        let name = rule.name();
        if self.rules.iter().any(|r| r.name() == name) {
            return Err(KernelError::DuplicateRule {
                name: name.to_string(),
            });
        }
        tracing::trace!(rulebook = %self.name, rule = name, "rule registered");
        self.rules.push(Arc::new(rule));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rule names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.rules.iter().map(|r| r.name())
    }

    /// `(name, description)` pairs in registration order.
    pub fn describe(&self) -> Vec<(&'static str, &'static str)> {
        self.rules
            .iter()
            .map(|r| (r.name(), r.description()))
            .collect()
    }

    /// Names of the rules a selector would run, in execution order.
    pub fn select(&self, selector: &Selector) -> Vec<&'static str> {
        self.rules
            .iter()
            .map(|r| r.name())
            .filter(|name| selector.matches(name))
            .collect()
    }

    /// Enforce every rule.
    pub async fn enforce_all(&self, ctx: &C) -> Result<EnforcementReport> {
        self.enforce_with(&Selector::All, ctx).await
    }

    /// Enforce the rules whose names match the glob `selector`.
    pub async fn enforce(&self, selector: &str, ctx: &C) -> Result<EnforcementReport> {
        let selector = Selector::new(selector)?;
        self.enforce_with(&selector, ctx).await
    }

    /// Enforce the rules matched by an already-parsed [`Selector`].
    pub async fn enforce_with(&self, selector: &Selector, ctx: &C) -> Result<EnforcementReport> {
        let mut report = EnforcementReport::default();

        for rule in self.rules.iter().filter(|r| selector.matches(r.name())) {
            let name = rule.name();

            let status = match rule.enable(ctx).await {
                Activation::Disabled(reason) => {
                    tracing::debug!(rulebook = %self.name, rule = name, reason = %reason, "rule disabled");
                    RuleStatus::Disabled(reason)
                }
                Activation::Misconfigured(message) => {
                    tracing::warn!(rulebook = %self.name, rule = name, error = %message, "rule misconfigured, skipping");
                    RuleStatus::Misconfigured(message)
                }
                Activation::Enabled => match rule.define(ctx).await {
                    Ok(()) => {
                        tracing::debug!(rulebook = %self.name, rule = name, "rule passed");
                        RuleStatus::Passed
                    }
                    Err(RuleFailure::Violation { message }) => {
                        let description = rule.description().trim();
                        let violation = rule.punish(RuleViolation {
                            rule: name.to_string(),
                            message,
                            description: (!description.is_empty())
                                .then(|| description.to_string()),
                        });
                        tracing::info!(
                            rulebook = %self.name,
                            rule = name,
                            message = %violation.message,
                            "rule violated"
                        );
                        return Err(KernelError::Violation(violation));
                    }
                    Err(RuleFailure::Collaborator(source)) => {
                        tracing::warn!(rulebook = %self.name, rule = name, error = %source, "rule evaluation failed");
                        return Err(KernelError::Collaborator {
                            rule: name.to_string(),
                            source,
                        });
                    }
                },
            };

            report.outcomes.push(RuleOutcome {
                rule: name.to_string(),
                status,
            });
        }

        Ok(report)
    }
}

impl<C: Send + Sync + ?Sized> std::fmt::Debug for Rulebook<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rulebook")
            .field("name", &self.name)
            .field("rules", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
