// parity-core/src/lib.rs

#![allow(missing_docs)]
// Memory safety
#![deny(unsafe_code)]
// Robustness
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
// Performance
#![warn(clippy::perf)]

// --- HEXAGONAL MODULES ---

// 1. Ports (Interfaces / Traits)
// Contracts towards the data stores (Connector, StoreDriver).
pub mod ports;

// 2. Domain
// Rule definitions, verdicts, tolerance maths. Depends on nothing else.
pub mod domain;

// 3. Infrastructure (Adapters)
// DuckDB, config files, rule loader, summary writer.
pub mod infrastructure;

// 4. Application (Use Cases)
// Executor, pool, retry, chunked aggregation, checks, orchestration.
pub mod application;

pub mod error;

// --- RE-EXPORTS (FACADE) ---
pub use error::ParityError;
