// parity/src/commands/query.rs
//
// USE CASE: Run a read-only query against one configured store (ad-hoc).

use comfy_table::Table;
use comfy_table::presets::UTF8_FULL;
use std::path::Path;
use tokio_util::sync::CancellationToken;

use parity_core::ParityError;
use parity_core::application::{ContextOptions, RunContext, drivers_from_settings};
use parity_core::domain::compiler::readonly::ensure_read_only;
use parity_core::domain::verdict::EXIT_PASS;
use parity_core::infrastructure::config::load_project_settings;
use parity_core::infrastructure::error::InfrastructureError;

use crate::commands::report;

pub async fn execute(project_dir: &Path, store: &str, query: &str, limit: usize) -> i32 {
    match run(project_dir, store, query, limit).await {
        Ok(()) => EXIT_PASS,
        Err(e) => report(e),
    }
}

async fn run(project_dir: &Path, store: &str, query: &str, limit: usize) -> Result<(), ParityError> {
    ensure_read_only(query)?;
    let settings = load_project_settings(project_dir)?;
    settings.store(store)?;

    let drivers = drivers_from_settings(project_dir, &settings)
        .into_iter()
        .filter(|(name, _)| name == store)
        .collect::<Vec<_>>();
    if drivers.is_empty() {
        return Err(InfrastructureError::UnknownStore(store.to_string()).into());
    }
    let ctx = RunContext::open(
        drivers,
        ContextOptions::from_settings(&settings),
        CancellationToken::new(),
    )
    .await?;

    let rows = ctx.connect(store).await?.rows(query).await?;
    ctx.close();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    if let Some(first) = rows.first() {
        table.set_header(first.keys().cloned().collect::<Vec<_>>());
    }
    for row in rows.iter().take(limit) {
        table.add_row(
            row.values()
                .map(|v| match v.as_str() {
                    Some(s) => s.to_string(),
                    None => v.to_string(),
                })
                .collect::<Vec<_>>(),
        );
    }
    println!("{table}");
    println!("{} row(s), showing {}", rows.len(), rows.len().min(limit));
    Ok(())
}
