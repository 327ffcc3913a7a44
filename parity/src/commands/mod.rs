// parity/src/commands/mod.rs

pub mod query;
pub mod run;
pub mod validate;

use parity_core::ParityError;

/// Renders a fatal error with its diagnostic and returns the exit code.
pub(crate) fn report(err: ParityError) -> i32 {
    let code = err.exit_code();
    eprintln!("{:?}", miette::Report::new(err));
    code
}
