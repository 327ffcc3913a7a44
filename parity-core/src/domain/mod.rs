pub mod compiler;
pub mod compliance;
pub mod error;
pub mod rule;
pub mod verdict;

// Re-exports to keep imports short elsewhere
pub use error::DomainError;
pub use rule::{CheckKind, CheckSpec, RuleDefinition, TableRef};
pub use verdict::{Measurement, Outcome, RunSummary, Verdict, VerdictStatus};
