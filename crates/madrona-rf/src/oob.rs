//! Out-of-bag evaluation of a freshly trained ensemble.

use crate::data::{Dataset, Labels};
use crate::error::ForestError;
use crate::learner::{Model, Prediction};

/// Out-of-bag summary computed at the end of training.
///
/// For each training example, only the trees whose bootstrap count for that
/// example was zero contribute, which yields an unbiased internal estimate
/// without test-set leakage. Examples in every bag are skipped; when nothing
/// is covered the loss is reported as an explicit absence.
#[derive(Debug, Clone)]
pub struct OobEstimate {
    /// RMSE (regression) or error rate (classification) over covered
    /// examples; `None` when no example had an out-of-bag tree.
    pub loss: Option<f64>,
    /// Number of examples with at least one out-of-bag tree.
    pub n_covered: usize,
    /// |label − OOB prediction| per example (regression only), zero where
    /// uncovered. Feeds the optional bias-correction learner.
    pub(crate) residual_magnitudes: Option<Vec<f64>>,
    /// Whether each example had at least one out-of-bag tree.
    pub(crate) covered: Vec<bool>,
}

/// Compute out-of-bag predictions and the aggregate loss estimate.
pub(crate) fn estimate_oob<M: Model>(
    models: &[M],
    bags: &[Vec<f64>],
    data: &Dataset,
) -> Result<OobEstimate, ForestError> {
    let n_samples = data.n_samples();
    let mut covered = vec![false; n_samples];
    let mut n_covered = 0usize;

    match data.labels() {
        Labels::Real(labels) => {
            let mut residuals = vec![0.0; n_samples];
            let mut squared_error = 0.0;
            for i in 0..n_samples {
                let mut sum = 0.0;
                let mut count = 0usize;
                for (model, bag) in models.iter().zip(bags) {
                    if bag[i] == 0.0 {
                        sum += model.predict(data.row(i))?.value();
                        count += 1;
                    }
                }
                if count == 0 {
                    continue;
                }
                covered[i] = true;
                n_covered += 1;
                let residual = labels[i] - sum / count as f64;
                residuals[i] = residual.abs();
                squared_error += residual * residual;
            }
            let loss = (n_covered > 0).then(|| (squared_error / n_covered as f64).sqrt());
            Ok(OobEstimate {
                loss,
                n_covered,
                residual_magnitudes: Some(residuals),
                covered,
            })
        }
        Labels::Class { classes, n_classes } => {
            let mut errors = 0usize;
            for i in 0..n_samples {
                let mut distribution = vec![0.0; *n_classes];
                let mut count = 0usize;
                for (model, bag) in models.iter().zip(bags) {
                    if bag[i] == 0.0 {
                        if let Prediction::Class {
                            distribution: tree_dist,
                            ..
                        } = model.predict(data.row(i))?
                        {
                            for (acc, p) in distribution.iter_mut().zip(&tree_dist) {
                                *acc += p;
                            }
                        }
                        count += 1;
                    }
                }
                if count == 0 {
                    continue;
                }
                covered[i] = true;
                n_covered += 1;
                let predicted = distribution
                    .iter()
                    .enumerate()
                    .max_by(|a, b| a.1.total_cmp(b.1))
                    .map(|(idx, _)| idx)
                    .unwrap_or(0);
                if predicted != classes[i] {
                    errors += 1;
                }
            }
            let loss = (n_covered > 0).then(|| errors as f64 / n_covered as f64);
            Ok(OobEstimate {
                loss,
                n_covered,
                residual_magnitudes: None,
                covered,
            })
        }
    }
}
