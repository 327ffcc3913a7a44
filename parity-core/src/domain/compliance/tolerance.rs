// parity-core/src/domain/compliance/tolerance.rs

/// Default absolute tolerance for floating aggregates (currency-sized rounding).
pub const DEFAULT_EPSILON: f64 = 0.01;

// Absorbs binary representation noise so that |250.01 - 250.00| <= 0.01 holds.
const RELATIVE_SLACK: f64 = 1e-9;

/// `|a - b| <= epsilon`, robust to float representation error.
pub fn within_epsilon(a: f64, b: f64, epsilon: f64) -> bool {
    if a.is_nan() || b.is_nan() {
        return false;
    }
    if a == b {
        return true;
    }
    let diff = (a - b).abs();
    let scale = a.abs().max(b.abs()).max(1.0);
    diff <= epsilon + RELATIVE_SLACK * scale
}

/// Count comparison: `|source - target| <= tolerance * source`.
/// With a zero source only an exact match passes.
pub fn count_within_tolerance(source: u64, target: u64, tolerance: f64) -> bool {
    let diff = source.abs_diff(target) as f64;
    diff <= tolerance * source as f64
}

/// `violations / total`, 0 for an empty population.
pub fn ratio(violations: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        violations as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epsilon_boundary_is_inclusive() {
        assert!(within_epsilon(250.01, 250.00, 0.01));
        assert!(within_epsilon(250.005, 250.00, 0.01));
        assert!(!within_epsilon(250.02, 250.00, 0.01));
        assert!(!within_epsilon(f64::NAN, 0.0, 0.01));
    }

    #[test]
    fn test_count_tolerance() {
        assert!(count_within_tolerance(1000, 1000, 0.0));
        assert!(!count_within_tolerance(1000, 999, 0.0));
        assert!(count_within_tolerance(1000, 990, 0.01));
        assert!(!count_within_tolerance(1000, 989, 0.01));
        assert!(count_within_tolerance(0, 0, 0.5));
        assert!(!count_within_tolerance(0, 1, 0.5));
    }

    #[test]
    fn test_ratio_on_empty_population() {
        assert_eq!(ratio(0, 0), 0.0);
        assert_eq!(ratio(1, 4), 0.25);
    }
}
