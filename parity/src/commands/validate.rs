// parity/src/commands/validate.rs
//
// USE CASE: Check settings and rules without connecting to anything.

use std::path::Path;

use parity_core::ParityError;
use parity_core::domain::verdict::EXIT_PASS;
use parity_core::infrastructure::config::{check_stores, load_project_settings, load_rules};

use crate::commands::report;

pub fn execute(project_dir: &Path) -> i32 {
    match validate(project_dir) {
        Ok((rules, stores)) => {
            println!("{} rule(s) valid across {} store(s)", rules, stores);
            EXIT_PASS
        }
        Err(e) => report(e),
    }
}

fn validate(project_dir: &Path) -> Result<(usize, usize), ParityError> {
    let settings = load_project_settings(project_dir)?;
    let rules = load_rules(&settings.rules_path(project_dir))?;
    check_stores(&rules, &settings)?;
    Ok((rules.len(), settings.stores.len()))
}
