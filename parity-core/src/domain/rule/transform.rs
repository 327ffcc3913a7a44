// parity-core/src/domain/rule/transform.rs

use serde::{Deserialize, Serialize};

/// How source and post-transform target are compared. Queries run on the
/// rule's source and target stores respectively.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TransformComparison {
    /// Compare one aggregate value, or one value per partition when
    /// `partition_column` is set (e.g. one SUM per day).
    Aggregate {
        source_query: String,
        target_query: String,
        compare_column: String,
        #[serde(default)]
        partition_column: Option<String>,
    },
    /// Row-by-row comparison of `compare_column` matched on `join_key`.
    Join {
        source_query: String,
        target_query: String,
        join_key: String,
        compare_column: String,
    },
    /// Every source key must exist in the target.
    Existence {
        source_query: String,
        target_query: String,
        join_key: String,
    },
}

impl TransformComparison {
    pub fn queries(&self) -> [&str; 2] {
        match self {
            Self::Aggregate {
                source_query,
                target_query,
                ..
            }
            | Self::Join {
                source_query,
                target_query,
                ..
            }
            | Self::Existence {
                source_query,
                target_query,
                ..
            } => [source_query.as_str(), target_query.as_str()],
        }
    }

    pub fn compare_column(&self) -> Option<&str> {
        match self {
            Self::Aggregate { compare_column, .. } | Self::Join { compare_column, .. } => {
                Some(compare_column)
            }
            Self::Existence { join_key, .. } => Some(join_key),
        }
    }
}
