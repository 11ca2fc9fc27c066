//! Keyward rule engine.
//!
//! This crate provides the generic machinery every Keyward policy check is
//! built on:
//!
//! - **[`rule`]** -- The [`Rule`] trait: a named, described check with an
//!   *enable* step (may self-disable or report a configuration error), a
//!   *define* step (passes or fails with a violation) and an optional
//!   *punishment* hook that rewrites the failure.
//! - **[`rulebook`]** -- [`Rulebook`], an ordered collection of rules that is
//!   enforced against a context object, selected by glob patterns over rule
//!   names, failing fast on the first violation.
//! - **[`error`]** -- Unified kernel error types via [`thiserror`].
//!
//! Rulebooks are `Send + Sync` and can be enforced concurrently from many
//! tasks; a single enforcement pass runs its rules strictly in order.

pub mod error;
pub mod rule;
pub mod rulebook;

// Re-export the most commonly used types at the crate root for convenience.
pub use error::{KernelError, Result};
pub use rule::{Activation, Rule, RuleFailure, RuleViolation, Verdict};
pub use rulebook::{EnforcementReport, RuleOutcome, RuleStatus, Rulebook, Selector};
