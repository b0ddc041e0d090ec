//! Feature-subsample sizing strategies.

use crate::error::ForestError;

/// Strategy for sizing the per-node feature subsample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeatureSample {
    /// Square root of total features.
    Sqrt,
    /// Log base 2 of total features.
    Log2,
    /// A fraction of total features (must be in (0.0, 1.0]).
    Fraction(f64),
    /// A fixed count.
    Fixed(usize),
    /// All features (no subsampling).
    All,
}

/// Resolve a [`FeatureSample`] to a concrete count.
pub(crate) fn resolve_feature_sample(
    sample: FeatureSample,
    n_features: usize,
) -> Result<usize, ForestError> {
    let resolved = match sample {
        FeatureSample::Sqrt => (n_features as f64).sqrt().ceil() as usize,
        FeatureSample::Log2 => (n_features as f64).log2().ceil().max(1.0) as usize,
        FeatureSample::Fraction(f) => (n_features as f64 * f).ceil() as usize,
        FeatureSample::Fixed(n) => n,
        FeatureSample::All => n_features,
    };
    if resolved == 0 || resolved > n_features {
        return Err(ForestError::InvalidFeatureSample {
            resolved,
            n_features,
        });
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::{FeatureSample, resolve_feature_sample};

    #[test]
    fn sqrt_rounds_up() {
        assert_eq!(resolve_feature_sample(FeatureSample::Sqrt, 10).unwrap(), 4);
    }

    #[test]
    fn log2_floor_is_one() {
        assert_eq!(resolve_feature_sample(FeatureSample::Log2, 1).unwrap(), 1);
    }

    #[test]
    fn third_fraction_of_two_is_one() {
        assert_eq!(
            resolve_feature_sample(FeatureSample::Fraction(1.0 / 3.0), 2).unwrap(),
            1
        );
    }

    #[test]
    fn fixed_zero_rejected() {
        assert!(resolve_feature_sample(FeatureSample::Fixed(0), 5).is_err());
    }

    #[test]
    fn fixed_beyond_total_rejected() {
        assert!(resolve_feature_sample(FeatureSample::Fixed(6), 5).is_err());
    }

    #[test]
    fn all_is_total() {
        assert_eq!(resolve_feature_sample(FeatureSample::All, 7).unwrap(), 7);
    }
}
