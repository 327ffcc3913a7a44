// parity-core/src/infrastructure/config/settings.rs

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::domain::compliance::tolerance::DEFAULT_EPSILON;
use crate::error::ParityError;
use crate::infrastructure::adapters::duckdb::MEMORY_PATH;
use crate::infrastructure::config::placeholders;
use crate::infrastructure::error::InfrastructureError;

pub const CONFIG_CANDIDATES: [&str; 2] = ["parity_project_conf.yaml", "parity.yaml"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreEngine {
    #[default]
    Duckdb,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StoreConfig {
    #[serde(default)]
    pub engine: StoreEngine,
    /// Database file, or `:memory:`. Relative paths resolve against the project dir.
    #[validate(length(min = 1, message = "store path cannot be empty"))]
    pub path: String,
    /// Open file stores read-only. Checks never write.
    #[serde(default = "default_true")]
    pub read_only: bool,
    /// Connections per store. Defaults to the run parallelism.
    #[serde(default)]
    #[validate(range(min = 1))]
    pub pool_size: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub delay_ms: u64,
    /// 1.0 keeps a fixed delay.
    #[validate(range(min = 1.0))]
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 10,
            delay_ms: 3_000,
            backoff_multiplier: 1.0,
            max_delay_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ChunkSettings {
    #[validate(range(min = 1))]
    pub chunk_size: u64,
    /// Row estimate above which counts are chunked.
    pub threshold: u64,
}

impl Default for ChunkSettings {
    fn default() -> Self {
        Self {
            chunk_size: 100_000,
            threshold: 500_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RunSettings {
    #[validate(range(min = 1, max = 256))]
    pub max_parallel: usize,
    /// Whole-run deadline. Rules still pending when it fires are reported as not evaluated.
    pub timeout_secs: Option<u64>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            max_parallel: 4,
            timeout_secs: None,
        }
    }
}

fn default_rules_dir() -> String {
    "rules".to_string()
}

fn default_output_dir() -> String {
    "target".to_string()
}

fn default_epsilon() -> f64 {
    DEFAULT_EPSILON
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ProjectSettings {
    #[serde(default)]
    pub name: String,
    #[validate(nested)]
    pub stores: BTreeMap<String, StoreConfig>,
    #[serde(default)]
    #[validate(nested)]
    pub retry: RetrySettings,
    #[serde(default)]
    #[validate(nested)]
    pub chunking: ChunkSettings,
    #[serde(default)]
    #[validate(nested)]
    pub run: RunSettings,
    #[serde(default = "default_rules_dir")]
    pub rules_dir: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    /// Project-wide default for transform rules that do not set one.
    #[serde(default = "default_epsilon")]
    #[validate(range(min = 0.0))]
    pub epsilon: f64,
}

impl ProjectSettings {
    pub fn store(&self, name: &str) -> Result<&StoreConfig, InfrastructureError> {
        self.stores
            .get(name)
            .ok_or_else(|| InfrastructureError::UnknownStore(name.to_string()))
    }

    pub fn rules_path(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.rules_dir)
    }

    pub fn output_path(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.output_dir)
    }

    /// Store path as the driver should open it.
    pub fn resolved_store_path(&self, project_dir: &Path, store: &StoreConfig) -> String {
        if store.path == MEMORY_PATH || Path::new(&store.path).is_absolute() {
            store.path.clone()
        } else {
            project_dir.join(&store.path).to_string_lossy().into_owned()
        }
    }
}

#[instrument(skip(project_dir))]
pub fn load_project_settings(project_dir: &Path) -> Result<ProjectSettings, ParityError> {
    load_project_settings_with(project_dir, |k| std::env::var(k).ok())
}

/// Same as [`load_project_settings`] with an explicit variable source.
pub fn load_project_settings_with<F>(
    project_dir: &Path,
    lookup: F,
) -> Result<ProjectSettings, ParityError>
where
    F: Fn(&str) -> Option<String>,
{
    let config_path = find_main_config(project_dir)?;
    info!(path = ?config_path, "Loading project settings");

    let raw = fs::read_to_string(&config_path).map_err(InfrastructureError::Io)?;
    let content = placeholders::substitute(&raw, &config_path.to_string_lossy(), &lookup)?;
    let mut settings: ProjectSettings =
        serde_yaml::from_str(&content).map_err(InfrastructureError::YamlError)?;

    apply_env_overrides(&mut settings, &lookup);

    if settings.stores.is_empty() {
        return Err(InfrastructureError::ConfigError(format!(
            "{}: at least one store must be declared",
            config_path.display()
        ))
        .into());
    }

    settings.validate().map_err(|e| {
        InfrastructureError::ConfigError(format!("{}: {}", config_path.display(), e))
    })?;
    Ok(settings)
}

fn find_main_config(root: &Path) -> Result<PathBuf, InfrastructureError> {
    for filename in CONFIG_CANDIDATES {
        let p = root.join(filename);
        if p.exists() {
            return Ok(p);
        }
    }
    Err(InfrastructureError::ConfigNotFound(format!(
        "{} (checked {:?})",
        root.display(),
        CONFIG_CANDIDATES
    )))
}

// Layering: PARITY_OUTPUT_DIR=/tmp/out parity run
fn apply_env_overrides<F>(settings: &mut ProjectSettings, lookup: &F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = lookup("PARITY_RULES_DIR") {
        info!(old = ?settings.rules_dir, new = ?val, "Overriding rules dir via ENV");
        settings.rules_dir = val;
    }
    if let Some(val) = lookup("PARITY_OUTPUT_DIR") {
        info!(old = ?settings.output_dir, new = ?val, "Overriding output dir via ENV");
        settings.output_dir = val;
    }
    if let Some(val) = lookup("PARITY_MAX_PARALLEL") {
        match val.parse() {
            Ok(n) => settings.run.max_parallel = n,
            Err(_) => warn!(value = %val, "Ignoring non-numeric PARITY_MAX_PARALLEL"),
        }
    }
    if let Some(val) = lookup("PARITY_TIMEOUT_SECS") {
        match val.parse() {
            Ok(n) => settings.run.timeout_secs = Some(n),
            Err(_) => warn!(value = %val, "Ignoring non-numeric PARITY_TIMEOUT_SECS"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::collections::HashMap;
    use tempfile::tempdir;

    const YAML: &str = r#"
name: billing
stores:
  source: { path: "${SRC_DB}" }
  target: { path: ":memory:", read_only: false }
chunking:
  chunk_size: 50000
"#;

    #[test]
    fn test_load_with_defaults_and_substitution() -> Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("parity.yaml"), YAML)?;
        let env = HashMap::from([("SRC_DB", "data/src.duckdb")]);

        let s = load_project_settings_with(dir.path(), |k| env.get(k).map(|v| v.to_string()))?;
        assert_eq!(s.name, "billing");
        assert_eq!(s.stores.len(), 2);
        assert!(s.store("source")?.read_only);
        assert_eq!(s.chunking.chunk_size, 50_000);
        assert_eq!(s.chunking.threshold, 500_000);
        assert_eq!(s.retry.max_retries, 10);
        assert_eq!(s.run.max_parallel, 4);
        assert_eq!(s.rules_dir, "rules");
        assert_eq!(s.epsilon, DEFAULT_EPSILON);

        let src = s.store("source")?;
        assert!(s.resolved_store_path(dir.path(), src).ends_with("data/src.duckdb"));
        let tgt = s.store("target")?;
        assert_eq!(s.resolved_store_path(dir.path(), tgt), ":memory:");
        assert!(s.store("nowhere").is_err());
        Ok(())
    }

    #[test]
    fn test_env_overrides() -> Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("parity.yaml"), YAML)?;
        let env = HashMap::from([
            ("SRC_DB", "src.duckdb"),
            ("PARITY_OUTPUT_DIR", "/tmp/parity-out"),
            ("PARITY_MAX_PARALLEL", "2"),
            ("PARITY_TIMEOUT_SECS", "not-a-number"),
        ]);
        let s = load_project_settings_with(dir.path(), |k| env.get(k).map(|v| v.to_string()))?;
        assert_eq!(s.output_dir, "/tmp/parity-out");
        assert_eq!(s.run.max_parallel, 2);
        assert_eq!(s.run.timeout_secs, None);
        Ok(())
    }

    #[test]
    fn test_missing_config_and_unresolved_placeholder() -> Result<()> {
        let dir = tempdir()?;
        assert!(matches!(
            load_project_settings_with(dir.path(), |_| None),
            Err(ParityError::Infrastructure(InfrastructureError::ConfigNotFound(_)))
        ));

        fs::write(dir.path().join("parity.yaml"), YAML)?;
        assert!(matches!(
            load_project_settings_with(dir.path(), |_| None),
            Err(ParityError::Domain(_))
        ));
        Ok(())
    }

    #[test]
    fn test_zero_parallelism_rejected() -> Result<()> {
        let dir = tempdir()?;
        fs::write(
            dir.path().join("parity.yaml"),
            "stores:\n  target: { path: \":memory:\" }\nrun: { max_parallel: 0 }\n",
        )?;
        assert!(load_project_settings_with(dir.path(), |_| None).is_err());
        Ok(())
    }
}
