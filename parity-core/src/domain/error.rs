// parity-core/src/domain/error.rs

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum DomainError {
    #[error("Invalid rule '{rule_id}': {reason}")]
    #[diagnostic(
        code(parity::domain::invalid_rule),
        help("Fix the parameters of this rule in your rules directory.")
    )]
    InvalidRule { rule_id: String, reason: String },

    #[error("Duplicate rule id '{0}'")]
    #[diagnostic(
        code(parity::domain::duplicate_rule),
        help("Every rule_id must be unique within a run.")
    )]
    DuplicateRuleId(String),

    #[error("Unresolved placeholder '{placeholder}' in {location}")]
    #[diagnostic(
        code(parity::domain::unresolved_placeholder),
        help("Export the referenced environment variable before running.")
    )]
    UnresolvedPlaceholder {
        placeholder: String,
        location: String,
    },

    #[error("Query is not read-only: {0}")]
    #[diagnostic(
        code(parity::domain::unsafe_query),
        help("Custom queries must be a single SELECT/WITH statement.")
    )]
    UnsafeQuery(String),

    #[error("Illegal rule state transition for '{rule_id}': {from} -> {to}")]
    #[diagnostic(code(parity::domain::state))]
    IllegalTransition {
        rule_id: String,
        from: String,
        to: String,
    },
}
