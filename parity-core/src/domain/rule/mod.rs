// parity-core/src/domain/rule/mod.rs

pub mod masking;
pub mod range;
pub mod transform;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use validator::Validate;

use crate::domain::compiler::readonly::ensure_read_only;
use crate::domain::error::DomainError;

pub use masking::{MaskMethod, MaskShape};
pub use range::RangeConstraint;
pub use transform::TransformComparison;

/// Store used when a table reference does not name one.
pub const DEFAULT_STORE: &str = "target";
pub const DEFAULT_SOURCE_STORE: &str = "source";
pub const DEFAULT_ID_COLUMN: &str = "id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Count,
    Null,
    Duplicate,
    Range,
    ReferentialIntegrity,
    Transform,
    Masking,
}

impl CheckKind {
    pub const ALL: [CheckKind; 7] = [
        CheckKind::Count,
        CheckKind::Null,
        CheckKind::Duplicate,
        CheckKind::Range,
        CheckKind::ReferentialIntegrity,
        CheckKind::Transform,
        CheckKind::Masking,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Null => "null",
            Self::Duplicate => "duplicate",
            Self::Range => "range",
            Self::ReferentialIntegrity => "referential_integrity",
            Self::Transform => "transform",
            Self::Masking => "masking",
        }
    }
}

impl FromStr for CheckKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "count" => Ok(Self::Count),
            "null" => Ok(Self::Null),
            "duplicate" => Ok(Self::Duplicate),
            "range" => Ok(Self::Range),
            "referential_integrity" | "fk" | "foreign_key" => Ok(Self::ReferentialIntegrity),
            "transform" => Ok(Self::Transform),
            "masking" => Ok(Self::Masking),
            other => Err(format!("Unknown check kind: {}", other)),
        }
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_store() -> String {
    DEFAULT_STORE.to_string()
}

fn default_source_store() -> String {
    DEFAULT_SOURCE_STORE.to_string()
}

fn default_id_column() -> String {
    DEFAULT_ID_COLUMN.to_string()
}

// --- TABLE REFERENCES ---

/// A table living in a named store. In YAML either `orders` (default store)
/// or `{ store: source, table: orders }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(from = "TableRefRepr")]
pub struct TableRef {
    #[validate(length(min = 1, message = "store cannot be empty"))]
    pub store: String,
    #[validate(length(min = 1, message = "table cannot be empty"))]
    pub table: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TableRefRepr {
    Short(String),
    Full {
        #[serde(default = "default_store")]
        store: String,
        table: String,
    },
}

impl From<TableRefRepr> for TableRef {
    fn from(repr: TableRefRepr) -> Self {
        match repr {
            TableRefRepr::Short(table) => TableRef::new(DEFAULT_STORE, table),
            TableRefRepr::Full { store, table } => TableRef { store, table },
        }
    }
}

impl TableRef {
    pub fn new(store: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            store: store.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.store, self.table)
    }
}

// --- PARAMETERS PER CHECK KIND ---

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CountParams {
    #[validate(nested)]
    pub source: TableRef,
    #[validate(nested)]
    pub target: TableRef,
    /// Allowed |source - target| / source.
    #[serde(default)]
    #[validate(range(min = 0.0, max = 1.0))]
    pub tolerance: f64,
    #[serde(default)]
    pub where_clause: Option<String>,
    #[serde(default)]
    pub source_query: Option<String>,
    #[serde(default)]
    pub target_query: Option<String>,
    /// Monotonic integer column used for chunked counting.
    #[serde(default = "default_id_column")]
    pub id_column: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NullParams {
    #[validate(nested)]
    pub table: TableRef,
    #[validate(length(min = 1))]
    pub column: String,
    #[serde(default)]
    #[validate(range(min = 0.0, max = 1.0))]
    pub max_null_ratio: f64,
    /// Count non-null values that trim to '' as blanks too.
    #[serde(default)]
    pub include_empty_string: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    #[default]
    PrimaryKey,
    Unique,
    Composite,
}

impl KeyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PrimaryKey => "primary_key",
            Self::Unique => "unique",
            Self::Composite => "composite",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DuplicateParams {
    #[validate(nested)]
    pub table: TableRef,
    #[validate(length(min = 1, message = "at least one key column is required"))]
    pub columns: Vec<String>,
    #[serde(default)]
    pub key_kind: KeyKind,
    /// Only meaningful for unique/composite keys.
    #[serde(default)]
    #[validate(range(min = 0.0, max = 1.0))]
    pub threshold: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RangeParams {
    #[validate(nested)]
    pub table: TableRef,
    #[serde(default)]
    pub column: Option<String>,
    pub constraint: RangeConstraint,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReferentialParams {
    #[validate(nested)]
    pub child: TableRef,
    #[validate(length(min = 1))]
    pub column: String,
    #[validate(nested)]
    pub parent: TableRef,
    #[validate(length(min = 1))]
    pub parent_column: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TransformParams {
    /// Label reported on verdicts, usually the target table.
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default = "default_source_store")]
    #[validate(length(min = 1))]
    pub source_store: String,
    #[serde(default = "default_store")]
    #[validate(length(min = 1))]
    pub target_store: String,
    /// Absolute tolerance; the project default applies when unset.
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub epsilon: Option<f64>,
    pub comparison: TransformComparison,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MaskingParams {
    #[validate(nested)]
    pub table: TableRef,
    #[validate(length(min = 1))]
    pub column: String,
    pub shape: MaskShape,
    #[serde(default)]
    pub method: MaskMethod,
}

/// The closed set of checks. One variant per `check_kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "check_kind", rename_all = "snake_case")]
pub enum CheckSpec {
    Count(CountParams),
    Null(NullParams),
    Duplicate(DuplicateParams),
    Range(RangeParams),
    ReferentialIntegrity(ReferentialParams),
    Transform(TransformParams),
    Masking(MaskingParams),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub rule_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub check: CheckSpec,
}

impl RuleDefinition {
    pub fn kind(&self) -> CheckKind {
        match &self.check {
            CheckSpec::Count(_) => CheckKind::Count,
            CheckSpec::Null(_) => CheckKind::Null,
            CheckSpec::Duplicate(_) => CheckKind::Duplicate,
            CheckSpec::Range(_) => CheckKind::Range,
            CheckSpec::ReferentialIntegrity(_) => CheckKind::ReferentialIntegrity,
            CheckSpec::Transform(_) => CheckKind::Transform,
            CheckSpec::Masking(_) => CheckKind::Masking,
        }
    }

    /// Table reported on verdicts, including ERROR verdicts.
    pub fn primary_table(&self) -> String {
        match &self.check {
            CheckSpec::Count(p) => p.target.table.clone(),
            CheckSpec::Null(p) => p.table.table.clone(),
            CheckSpec::Duplicate(p) => p.table.table.clone(),
            CheckSpec::Range(p) => p.table.table.clone(),
            CheckSpec::ReferentialIntegrity(p) => p.child.table.clone(),
            CheckSpec::Transform(p) => p.table.clone().unwrap_or_else(|| p.target_store.clone()),
            CheckSpec::Masking(p) => p.table.table.clone(),
        }
    }

    pub fn primary_column(&self) -> Option<String> {
        match &self.check {
            CheckSpec::Count(_) => None,
            CheckSpec::Null(p) => Some(p.column.clone()),
            CheckSpec::Duplicate(p) => Some(p.columns.join(", ")),
            CheckSpec::Range(p) => match &p.constraint {
                RangeConstraint::DateOrder { start_column, .. } => Some(start_column.clone()),
                _ => p.column.clone(),
            },
            CheckSpec::ReferentialIntegrity(p) => Some(p.column.clone()),
            CheckSpec::Transform(p) => p.comparison.compare_column().map(str::to_string),
            CheckSpec::Masking(p) => Some(p.column.clone()),
        }
    }

    /// Every store this rule reads from.
    pub fn stores(&self) -> BTreeSet<&str> {
        let mut stores = BTreeSet::new();
        match &self.check {
            CheckSpec::Count(p) => {
                stores.insert(p.source.store.as_str());
                stores.insert(p.target.store.as_str());
            }
            CheckSpec::Null(p) => {
                stores.insert(p.table.store.as_str());
            }
            CheckSpec::Duplicate(p) => {
                stores.insert(p.table.store.as_str());
            }
            CheckSpec::Range(p) => {
                stores.insert(p.table.store.as_str());
            }
            CheckSpec::ReferentialIntegrity(p) => {
                stores.insert(p.child.store.as_str());
                stores.insert(p.parent.store.as_str());
            }
            CheckSpec::Transform(p) => {
                stores.insert(p.source_store.as_str());
                stores.insert(p.target_store.as_str());
            }
            CheckSpec::Masking(p) => {
                stores.insert(p.table.store.as_str());
            }
        }
        stores
    }

    /// Full validation: declarative constraints plus the cross-field rules
    /// the derive cannot express.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.rule_id.trim().is_empty() {
            return Err(self.invalid("rule_id cannot be empty"));
        }

        let declarative = match &self.check {
            CheckSpec::Count(p) => p.validate(),
            CheckSpec::Null(p) => p.validate(),
            CheckSpec::Duplicate(p) => p.validate(),
            CheckSpec::Range(p) => p.validate(),
            CheckSpec::ReferentialIntegrity(p) => p.validate(),
            CheckSpec::Transform(p) => p.validate(),
            CheckSpec::Masking(p) => p.validate(),
        };
        declarative.map_err(|e| self.invalid(e.to_string()))?;

        match &self.check {
            CheckSpec::Count(p) => {
                match (&p.source_query, &p.target_query) {
                    (Some(s), Some(t)) => {
                        self.read_only(s)?;
                        self.read_only(t)?;
                    }
                    (None, None) => {}
                    _ => {
                        return Err(self.invalid(
                            "source_query and target_query must be given together",
                        ));
                    }
                }
                if let Some(clause) = &p.where_clause {
                    self.read_only(&format!("SELECT 1 WHERE {}", clause))?;
                }
            }
            CheckSpec::Duplicate(p) => {
                if p.columns.iter().any(|c| c.trim().is_empty()) {
                    return Err(self.invalid("key columns cannot be blank"));
                }
                if p.key_kind == KeyKind::PrimaryKey && p.threshold.is_some() {
                    return Err(self.invalid("primary_key rules do not accept a threshold"));
                }
            }
            CheckSpec::Range(p) => {
                p.constraint.validate().map_err(|r| self.invalid(r))?;
                if p.constraint.requires_column() && p.column.is_none() {
                    return Err(self.invalid("this range constraint needs a `column`"));
                }
            }
            CheckSpec::ReferentialIntegrity(p) => {
                if p.child.store != p.parent.store {
                    return Err(self.invalid(format!(
                        "child ({}) and parent ({}) must live in the same store",
                        p.child, p.parent
                    )));
                }
            }
            CheckSpec::Transform(p) => {
                for query in p.comparison.queries() {
                    self.read_only(query)?;
                }
            }
            CheckSpec::Masking(p) => {
                p.shape.validate().map_err(|r| self.invalid(r))?;
            }
            CheckSpec::Null(_) => {}
        }

        Ok(())
    }

    fn invalid(&self, reason: impl Into<String>) -> DomainError {
        DomainError::InvalidRule {
            rule_id: self.rule_id.clone(),
            reason: reason.into(),
        }
    }

    fn read_only(&self, query: &str) -> Result<(), DomainError> {
        ensure_read_only(query).map_err(|e| self.invalid(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> RuleDefinition {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_parse_count_rule_with_short_table_refs() {
        let rule = parse(
            r#"
rule_id: CNT-001
description: orders copied
check_kind: count
source: { store: source, table: src_orders }
target: tgt_orders
tolerance: 0.01
"#,
        );
        assert_eq!(rule.kind(), CheckKind::Count);
        let CheckSpec::Count(p) = &rule.check else {
            panic!("expected count params");
        };
        assert_eq!(p.source, TableRef::new("source", "src_orders"));
        assert_eq!(p.target, TableRef::new(DEFAULT_STORE, "tgt_orders"));
        assert_eq!(p.id_column, "id");
        assert!(rule.validate().is_ok());
        assert_eq!(rule.stores().len(), 2);
    }

    #[test]
    fn test_unknown_check_kind_fails_at_parse() {
        let res: Result<RuleDefinition, _> = serde_yaml::from_str(
            "rule_id: X\ncheck_kind: vibes\ntable: t\n",
        );
        assert!(res.is_err());
    }

    #[test]
    fn test_unknown_masking_method_fails_at_parse() {
        let res: Result<RuleDefinition, _> = serde_yaml::from_str(
            r#"
rule_id: MSK-1
check_kind: masking
table: customers
column: ssn
method: fuzzy
shape: { kind: hash }
"#,
        );
        assert!(res.is_err());
    }

    #[test]
    fn test_tolerance_out_of_bounds_is_rejected() {
        let rule = parse(
            "rule_id: C\ncheck_kind: count\nsource: a\ntarget: b\ntolerance: 1.5\n",
        );
        assert!(matches!(
            rule.validate(),
            Err(DomainError::InvalidRule { .. })
        ));
    }

    #[test]
    fn test_half_custom_count_queries_rejected() {
        let rule = parse(
            "rule_id: C\ncheck_kind: count\nsource: a\ntarget: b\nsource_query: SELECT COUNT(*) FROM a\n",
        );
        assert!(rule.validate().is_err());
    }

    #[test]
    fn test_mutating_transform_query_rejected() {
        let rule = parse(
            r#"
rule_id: TRF-1
check_kind: transform
comparison:
  mode: aggregate
  source_query: "DELETE FROM orders"
  target_query: "SELECT SUM(amount) AS total FROM orders"
  compare_column: total
"#,
        );
        assert!(rule.validate().is_err());
    }

    #[test]
    fn test_referential_across_stores_rejected() {
        let rule = parse(
            r#"
rule_id: FK-1
check_kind: referential_integrity
child: orders
column: customer_id
parent: { store: source, table: customers }
parent_column: id
"#,
        );
        assert!(rule.validate().is_err());
    }

    #[test]
    fn test_range_without_column_rejected_except_date_order() {
        let missing = parse(
            "rule_id: R\ncheck_kind: range\ntable: t\nconstraint: { kind: numeric, min: 0 }\n",
        );
        assert!(missing.validate().is_err());

        let order = parse(
            r#"
rule_id: R2
check_kind: range
table: contracts
constraint: { kind: date_order, start_column: starts_on, end_column: ends_on }
"#,
        );
        assert!(order.validate().is_ok());
        assert_eq!(order.primary_column().as_deref(), Some("starts_on"));
    }

    #[test]
    fn test_check_kind_from_str_aliases() {
        assert_eq!(
            "FK".parse::<CheckKind>().unwrap(),
            CheckKind::ReferentialIntegrity
        );
        assert!("nope".parse::<CheckKind>().is_err());
    }
}
