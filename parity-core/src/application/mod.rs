// parity-core/src/application/mod.rs

pub mod checks;
pub mod chunked;
pub mod context;
pub mod executor;
pub mod orchestrator;
pub mod results;
pub mod retry;

// --- RE-EXPORTS (FACADE PATTERN) ---
// Lets the CLI write `use parity_core::application::{run_project, RunRequest};`
// without knowing the file layout.

pub use context::{ContextOptions, RunContext, drivers_from_settings};
pub use executor::{ConnectionPool, StoreSession};
pub use orchestrator::{RunRequest, run_project, run_rules};
pub use results::{ResultAggregator, RuleState};
pub use retry::RetryPolicy;
