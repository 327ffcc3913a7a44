// parity/src/cli.rs
//
// Single source of truth for all CLI definitions (Clap structs).

use clap::{Parser, Subcommand};
use parity_core::domain::CheckKind;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "parity")]
#[command(about = "Source/target consistency checks for ETL pipelines", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Evaluates the rules and writes the run summary
    Run {
        /// Project directory
        #[arg(long, default_value = ".")]
        project_dir: PathBuf,

        /// Only these check kinds (ex: "count,null")
        #[arg(long, value_delimiter = ',')]
        checks: Vec<CheckKind>,

        /// Only this rule
        #[arg(long, short)]
        rule: Option<String>,

        /// Rules evaluated concurrently (overrides the project setting)
        #[arg(long)]
        max_parallel: Option<usize>,

        /// Whole-run deadline in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Loads settings and rules without touching any store
    Validate {
        #[arg(long, default_value = ".")]
        project_dir: PathBuf,
    },

    /// Executes a read-only query against a configured store (ad-hoc)
    Query {
        query: String,

        #[arg(long, default_value = ".")]
        project_dir: PathBuf,

        #[arg(long, default_value = "target")]
        store: String,

        /// Rows to display
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Result, bail};

    #[test]
    fn test_cli_parse_run_defaults() -> Result<()> {
        let args = Cli::parse_from(["parity", "run"]);
        match args.command {
            Commands::Run {
                project_dir,
                checks,
                rule,
                max_parallel,
                ..
            } => {
                assert_eq!(project_dir.to_string_lossy(), ".");
                assert!(checks.is_empty());
                assert_eq!(rule, None);
                assert_eq!(max_parallel, None);
                Ok(())
            }
            _ => bail!("Expected Run command"),
        }
    }

    #[test]
    fn test_cli_parse_run_filters() -> Result<()> {
        let args = Cli::parse_from([
            "parity",
            "run",
            "--checks",
            "count,fk",
            "--rule",
            "CNT-001",
            "--project-dir",
            "/tmp",
        ]);
        match args.command {
            Commands::Run {
                project_dir,
                checks,
                rule,
                ..
            } => {
                assert_eq!(project_dir.to_string_lossy(), "/tmp");
                assert_eq!(
                    checks,
                    vec![CheckKind::Count, CheckKind::ReferentialIntegrity]
                );
                assert_eq!(rule.as_deref(), Some("CNT-001"));
                Ok(())
            }
            _ => bail!("Expected Run command"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_check_kind() {
        assert!(Cli::try_parse_from(["parity", "run", "--checks", "vibes"]).is_err());
    }

    #[test]
    fn test_cli_parse_query() -> Result<()> {
        let args = Cli::parse_from(["parity", "query", "SELECT 1", "--store", "source"]);
        match args.command {
            Commands::Query {
                query,
                store,
                limit,
                ..
            } => {
                assert_eq!(query, "SELECT 1");
                assert_eq!(store, "source");
                assert_eq!(limit, 20);
                Ok(())
            }
            _ => bail!("Expected Query command"),
        }
    }
}
