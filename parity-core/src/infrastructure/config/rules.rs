// parity-core/src/infrastructure/config/rules.rs

use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{debug, info, instrument};
use walkdir::WalkDir;

use crate::domain::error::DomainError;
use crate::domain::rule::{CheckKind, RuleDefinition};
use crate::error::ParityError;
use crate::infrastructure::config::placeholders;
use crate::infrastructure::config::settings::ProjectSettings;
use crate::infrastructure::error::InfrastructureError;

#[derive(Deserialize)]
struct RuleFile {
    #[serde(default)]
    rules: Vec<RuleDefinition>,
}

/// Which rules a run should evaluate.
#[derive(Debug, Clone, Default)]
pub struct RuleFilter {
    /// Empty means every kind.
    pub kinds: Vec<CheckKind>,
    pub rule_id: Option<String>,
}

impl RuleFilter {
    pub fn matches(&self, rule: &RuleDefinition) -> bool {
        (self.kinds.is_empty() || self.kinds.contains(&rule.kind()))
            && self.rule_id.as_deref().is_none_or(|id| id == rule.rule_id)
    }
}

#[instrument(skip(rules_dir))]
pub fn load_rules(rules_dir: &Path) -> Result<Vec<RuleDefinition>, ParityError> {
    load_rules_with(rules_dir, |k| std::env::var(k).ok())
}

/// Reads every `*.yml` / `*.yaml` under `rules_dir` (sorted by path), resolves
/// placeholders, then validates each rule and rule_id uniqueness.
pub fn load_rules_with<F>(rules_dir: &Path, lookup: F) -> Result<Vec<RuleDefinition>, ParityError>
where
    F: Fn(&str) -> Option<String>,
{
    if !rules_dir.exists() {
        return Err(InfrastructureError::ConfigNotFound(format!(
            "rules directory {}",
            rules_dir.display()
        ))
        .into());
    }

    let mut rules = Vec::new();
    for entry in WalkDir::new(rules_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e == "yml" || e == "yaml");
        if !entry.file_type().is_file() || !is_yaml {
            continue;
        }

        let location = path.to_string_lossy();
        let raw = fs::read_to_string(path).map_err(InfrastructureError::Io)?;
        let content = placeholders::substitute(&raw, &location, &lookup)?;
        let file: RuleFile = serde_yaml::from_str(&content).map_err(|e| {
            InfrastructureError::ConfigError(format!("{}: {}", location, e))
        })?;
        debug!(path = %location, count = file.rules.len(), "Loaded rule file");
        rules.extend(file.rules);
    }

    let mut seen = HashSet::new();
    for rule in &rules {
        rule.validate()?;
        if !seen.insert(rule.rule_id.as_str()) {
            return Err(DomainError::DuplicateRuleId(rule.rule_id.clone()).into());
        }
    }

    info!(count = rules.len(), dir = %rules_dir.display(), "Rules loaded");
    Ok(rules)
}

/// Every store a rule touches must be declared.
pub fn check_stores(
    rules: &[RuleDefinition],
    settings: &ProjectSettings,
) -> Result<(), InfrastructureError> {
    for rule in rules {
        for store in rule.stores() {
            if !settings.stores.contains_key(store) {
                return Err(InfrastructureError::UnknownStore(format!(
                    "{} (used by rule '{}')",
                    store, rule.rule_id
                )));
            }
        }
    }
    Ok(())
}

/// Keeps the rules matching `filter`. Naming a rule that does not exist is an error.
pub fn select_rules(
    rules: Vec<RuleDefinition>,
    filter: &RuleFilter,
) -> Result<Vec<RuleDefinition>, InfrastructureError> {
    if let Some(id) = &filter.rule_id
        && !rules.iter().any(|r| &r.rule_id == id)
    {
        return Err(InfrastructureError::ConfigError(format!(
            "no rule with id '{}'",
            id
        )));
    }
    Ok(rules.into_iter().filter(|r| filter.matches(r)).collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    const COUNTS: &str = r#"
rules:
  - rule_id: CNT-001
    check_kind: count
    source: { store: source, table: orders }
    target: orders
  - rule_id: NUL-001
    check_kind: "null"
    table: ${CUSTOMERS_TABLE}
    column: email
    include_empty_string: true
"#;

    const MASKING: &str = r#"
rules:
  - rule_id: MSK-001
    check_kind: masking
    table: customers
    column: ssn
    shape: { kind: fixed_substring, length: 14, offset: 8, literal: "*******" }
"#;

    fn env(k: &str) -> Option<String> {
        (k == "CUSTOMERS_TABLE").then(|| "customers".to_string())
    }

    #[test]
    fn test_load_rules_from_nested_dirs() -> Result<()> {
        let dir = tempdir()?;
        fs::create_dir_all(dir.path().join("pii"))?;
        fs::write(dir.path().join("a_counts.yml"), COUNTS)?;
        fs::write(dir.path().join("pii/masking.yaml"), MASKING)?;
        fs::write(dir.path().join("README.md"), "not a rule file")?;

        let rules = load_rules_with(dir.path(), env)?;
        let ids: Vec<_> = rules.iter().map(|r| r.rule_id.as_str()).collect();
        assert_eq!(ids, vec!["CNT-001", "NUL-001", "MSK-001"]);
        Ok(())
    }

    #[test]
    fn test_duplicate_rule_id_rejected() -> Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("a.yml"), MASKING)?;
        fs::write(dir.path().join("b.yml"), MASKING)?;
        assert!(matches!(
            load_rules_with(dir.path(), env),
            Err(ParityError::Domain(DomainError::DuplicateRuleId(_)))
        ));
        Ok(())
    }

    #[test]
    fn test_unresolved_placeholder_never_reaches_engine() -> Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("a.yml"), COUNTS)?;
        assert!(matches!(
            load_rules_with(dir.path(), |_| None),
            Err(ParityError::Domain(DomainError::UnresolvedPlaceholder { .. }))
        ));
        Ok(())
    }

    #[test]
    fn test_filter_by_kind_and_id() -> Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("a.yml"), COUNTS)?;
        let rules = load_rules_with(dir.path(), env)?;

        let only_null = RuleFilter {
            kinds: vec![CheckKind::Null],
            rule_id: None,
        };
        assert_eq!(select_rules(rules.clone(), &only_null)?.len(), 1);

        let by_id = RuleFilter {
            kinds: vec![],
            rule_id: Some("CNT-001".into()),
        };
        assert_eq!(select_rules(rules.clone(), &by_id)?[0].rule_id, "CNT-001");

        let unknown = RuleFilter {
            kinds: vec![],
            rule_id: Some("NOPE".into()),
        };
        assert!(select_rules(rules, &unknown).is_err());
        Ok(())
    }
}
