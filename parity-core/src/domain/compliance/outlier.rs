// parity-core/src/domain/compliance/outlier.rs

use thiserror::Error;

/// Population statistics of a numeric column, as computed by the store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleStats {
    pub count: u64,
    pub mean: f64,
    pub stddev: f64,
}

#[derive(Debug, Error, PartialEq)]
pub enum OutlierSkip {
    #[error("Outlier check on '{column}' skipped: {count} sample(s), need at least {min_samples}")]
    InsufficientSample {
        column: String,
        count: u64,
        min_samples: u64,
    },
    #[error("Outlier check on '{0}' skipped: zero variance")]
    ZeroVariance(String),
}

impl OutlierSkip {
    /// Tag written into verdict details.
    pub fn reason(&self) -> &'static str {
        match self {
            OutlierSkip::InsufficientSample { .. } => "skipped_insufficient_sample",
            OutlierSkip::ZeroVariance(_) => "skipped_zero_variance",
        }
    }
}

pub struct OutlierCheck;

impl OutlierCheck {
    pub const DEFAULT_SIGMA: f64 = 3.0;
    pub const DEFAULT_MIN_SAMPLES: u64 = 30;

    /// Acceptance band `[mean - sigma*stddev, mean + sigma*stddev]`.
    /// Small samples give a meaningless stddev, so they are refused rather than judged.
    pub fn bounds(
        column: &str,
        stats: &SampleStats,
        sigma: f64,
        min_samples: u64,
    ) -> Result<(f64, f64), OutlierSkip> {
        if stats.count < min_samples.max(2) {
            return Err(OutlierSkip::InsufficientSample {
                column: column.to_string(),
                count: stats.count,
                min_samples,
            });
        }
        if !stats.stddev.is_finite() || stats.stddev <= 1e-9 {
            return Err(OutlierSkip::ZeroVariance(column.to_string()));
        }
        let half_width = sigma * stats.stddev;
        Ok((stats.mean - half_width, stats.mean + half_width))
    }
}
