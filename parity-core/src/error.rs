// parity-core/src/error.rs

use crate::domain::error::DomainError;
use crate::domain::verdict::{EXIT_CONFIG, EXIT_ERROR, EXIT_FATAL_CONNECTIVITY};
use crate::infrastructure::error::InfrastructureError;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum ParityError {
    // --- DOMAIN (rule definitions, invariants) ---
    #[error(transparent)]
    #[diagnostic(transparent)]
    Domain(#[from] DomainError),

    // --- INFRASTRUCTURE (IO, parsing, driver) ---
    #[error(transparent)]
    #[diagnostic(transparent)]
    Infrastructure(#[from] InfrastructureError),

    // --- EXECUTION ---
    #[error("Store '{store}' unreachable after {attempts} attempt(s): {reason}")]
    #[diagnostic(
        code(parity::connectivity),
        help("Check that the store is running and that its path/credentials are correct.")
    )]
    Connectivity {
        store: String,
        attempts: u32,
        reason: String,
    },

    #[error("Query failed on store '{store}': {reason}")]
    #[diagnostic(code(parity::query))]
    QueryExecution { store: String, reason: String },

    #[error("Run cancelled before completion")]
    #[diagnostic(code(parity::cancelled))]
    Cancelled,

    #[error("Internal Error: {0}")]
    InternalError(String),
}

impl ParityError {
    /// Error class recorded on ERROR verdicts.
    pub fn class(&self) -> &'static str {
        match self {
            ParityError::Connectivity { .. } => "ConnectivityError",
            ParityError::QueryExecution { .. } => "QueryExecutionError",
            ParityError::Cancelled => "Cancelled",
            ParityError::Domain(_) => "RuleDefinitionError",
            ParityError::Infrastructure(_) | ParityError::InternalError(_) => "InternalError",
        }
    }
}

impl ParityError {
    /// Process exit code when this error aborts a run before any verdict.
    pub fn exit_code(&self) -> i32 {
        match self {
            ParityError::Connectivity { .. } => EXIT_FATAL_CONNECTIVITY,
            ParityError::Domain(_) => EXIT_CONFIG,
            ParityError::Infrastructure(
                InfrastructureError::ConfigError(_)
                | InfrastructureError::ConfigNotFound(_)
                | InfrastructureError::YamlError(_)
                | InfrastructureError::UnknownStore(_),
            ) => EXIT_CONFIG,
            _ => EXIT_ERROR,
        }
    }
}

impl From<std::io::Error> for ParityError {
    fn from(err: std::io::Error) -> Self {
        ParityError::Infrastructure(InfrastructureError::Io(err))
    }
}
