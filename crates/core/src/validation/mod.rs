//! Configuration-field validation.
//!
//! - [`rules`]: rule and result types plus error codes.
//! - [`evaluator`]: pure per-field checks.
//! - [`cache`]: per-definition rule-set cache.
//! - [`engine`]: resolves rules through the registry and validates whole
//!   workflows.

pub mod cache;
pub mod engine;
pub mod evaluator;
pub mod rules;

pub use cache::{Clock, ManualClock, RuleCache, SystemClock, TtlRuleCache, DEFAULT_RULE_CACHE_TTL};
pub use engine::ValidationEngine;
pub use evaluator::validate_field;
pub use rules::{FieldError, FieldIssue, FieldRule, RuleSet, ValidationReport};
