// parity-core/src/domain/rule/range.rs

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::compliance::outlier::OutlierCheck;

fn default_sigma() -> f64 {
    OutlierCheck::DEFAULT_SIGMA
}

fn default_min_samples() -> u64 {
    OutlierCheck::DEFAULT_MIN_SAMPLES
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RangeConstraint {
    /// Inclusive numeric bounds; either side may be open.
    Numeric {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    Date {
        #[serde(default)]
        min_date: Option<NaiveDate>,
        #[serde(default)]
        max_date: Option<NaiveDate>,
    },
    NoFuture,
    /// Rows where `start_column > end_column`.
    DateOrder {
        start_column: String,
        end_column: String,
    },
    AllowedValues {
        values: Vec<String>,
    },
    /// Values outside mean ± sigma·stddev. Reported as WARNING only.
    Outlier {
        #[serde(default = "default_sigma")]
        sigma: f64,
        #[serde(default = "default_min_samples")]
        min_samples: u64,
    },
}

impl RangeConstraint {
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Numeric { min, max } => match (min, max) {
                (None, None) => Err("numeric range needs `min` or `max`".into()),
                _ if min.iter().chain(max).any(|b| !b.is_finite()) => {
                    Err("numeric bounds must be finite numbers".into())
                }
                (Some(lo), Some(hi)) if lo > hi => Err(format!("min {} > max {}", lo, hi)),
                _ => Ok(()),
            },
            Self::Date { min_date, max_date } => match (min_date, max_date) {
                (None, None) => Err("date range needs `min_date` or `max_date`".into()),
                (Some(lo), Some(hi)) if lo > hi => Err(format!("min_date {} > max_date {}", lo, hi)),
                _ => Ok(()),
            },
            Self::NoFuture => Ok(()),
            Self::DateOrder {
                start_column,
                end_column,
            } => {
                if start_column.trim().is_empty() || end_column.trim().is_empty() {
                    return Err("date_order needs `start_column` and `end_column`".into());
                }
                Ok(())
            }
            Self::AllowedValues { values } => {
                if values.is_empty() {
                    return Err("allowed_values cannot be empty".into());
                }
                Ok(())
            }
            Self::Outlier { sigma, .. } => {
                if !(sigma.is_finite() && *sigma > 0.0) {
                    return Err(format!("sigma must be a positive number, got {}", sigma));
                }
                Ok(())
            }
        }
    }

    pub fn requires_column(&self) -> bool {
        !matches!(self, Self::DateOrder { .. })
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Numeric { .. } => "numeric",
            Self::Date { .. } => "date",
            Self::NoFuture => "no_future",
            Self::DateOrder { .. } => "date_order",
            Self::AllowedValues { .. } => "allowed_values",
            Self::Outlier { .. } => "outlier",
        }
    }
}
