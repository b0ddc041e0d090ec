//! The fitted ensemble: aggregation, uncertainty, and influence scores.

use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::data::FeatureValue;
use crate::error::ForestError;
use crate::learner::{Model, Prediction};

/// A fitted bagged ensemble, immutable after training and safe for
/// concurrent read-only prediction.
///
/// Bootstrap inclusion counts are retained per model: out-of-bag statistics
/// and the jackknife influence scores both need them.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(bound(
    serialize = "M: serde::Serialize, B: serde::Serialize",
    deserialize = "M: serde::de::DeserializeOwned, B: serde::de::DeserializeOwned"
))]
pub struct BaggedModel<M, B = M> {
    pub(crate) models: Vec<M>,
    /// `bag_counts[model][training_example]` bootstrap multiplicities.
    pub(crate) bag_counts: Vec<Vec<f64>>,
    pub(crate) bias_model: Option<B>,
    pub(crate) n_features: usize,
}

/// Batch prediction output: per-row expected values plus optional
/// per-row uncertainty.
///
/// Uncertainty is `None` — an explicit absence, never a zero placeholder —
/// when the ensemble holds fewer than two models and dispersion is
/// undefined.
#[derive(Debug, Clone)]
pub struct PredictionResult {
    expected: Vec<Prediction>,
    uncertainty: Option<Vec<f64>>,
}

impl PredictionResult {
    /// Per-row expected values.
    #[must_use]
    pub fn expected(&self) -> &[Prediction] {
        &self.expected
    }

    /// Per-row uncertainty: jackknife standard error of the ensemble mean
    /// for regression (bias-folded when a bias model is present),
    /// `1 − max probability` for classification; `None` when dispersion is
    /// unavailable.
    #[must_use]
    pub fn uncertainty(&self) -> Option<&[f64]> {
        self.uncertainty.as_deref()
    }

    /// Number of predicted rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.expected.len()
    }

    /// Return `true` when no rows were predicted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.expected.is_empty()
    }
}

impl<M: Model, B: Model> BaggedModel<M, B> {
    pub(crate) fn new(
        models: Vec<M>,
        bag_counts: Vec<Vec<f64>>,
        bias_model: Option<B>,
        n_features: usize,
    ) -> Self {
        Self {
            models,
            bag_counts,
            bias_model,
            n_features,
        }
    }

    /// Return the number of models in the ensemble.
    #[must_use]
    pub fn n_models(&self) -> usize {
        self.models.len()
    }

    /// Return the number of features the ensemble was trained on.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Return `true` when a bias-correction model is attached.
    #[must_use]
    pub fn has_bias_model(&self) -> bool {
        self.bias_model.is_some()
    }

    /// Borrow the underlying models.
    #[must_use]
    pub fn models(&self) -> &[M] {
        &self.models
    }

    /// Predict a batch of rows in parallel.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::PredictionFeatureMismatch`] if any row has the
    /// wrong feature count, and propagates model prediction errors.
    pub fn predict(&self, rows: &[Vec<FeatureValue>]) -> Result<PredictionResult, ForestError> {
        let per_row: Vec<(Prediction, Option<f64>)> = rows
            .par_iter()
            .map(|row| self.predict_one(row))
            .collect::<Result<_, _>>()?;

        let mut expected = Vec::with_capacity(per_row.len());
        let mut uncertainties = Vec::with_capacity(per_row.len());
        let mut all_present = true;
        for (prediction, uncertainty) in per_row {
            expected.push(prediction);
            match uncertainty {
                Some(u) => uncertainties.push(u),
                None => all_present = false,
            }
        }
        Ok(PredictionResult {
            expected,
            uncertainty: all_present.then_some(uncertainties),
        })
    }

    /// Predict a single row: expected value plus optional uncertainty.
    ///
    /// # Errors
    ///
    /// Same as [`BaggedModel::predict`].
    pub fn predict_one(
        &self,
        row: &[FeatureValue],
    ) -> Result<(Prediction, Option<f64>), ForestError> {
        if row.len() != self.n_features {
            return Err(ForestError::PredictionFeatureMismatch {
                expected: self.n_features,
                got: row.len(),
            });
        }

        let predictions: Vec<Prediction> = self
            .models
            .iter()
            .map(|m| m.predict(row))
            .collect::<Result<_, _>>()?;
        let n = predictions.len() as f64;

        match &predictions[0] {
            Prediction::Real(_) => {
                let values: Vec<f64> = predictions.iter().map(Prediction::value).collect();
                let mean = values.iter().sum::<f64>() / n;
                let uncertainty = (predictions.len() >= 2).then(|| {
                    // Jackknife standard error of the ensemble mean: the
                    // across-tree dispersion shrinks as the ensemble grows.
                    let dispersion = (values
                        .iter()
                        .map(|v| (v - mean) * (v - mean))
                        .sum::<f64>()
                        / ((n - 1.0) * n))
                        .sqrt();
                    match &self.bias_model {
                        Some(bias) => {
                            let magnitude = bias
                                .predict(row)
                                .map(|p| p.value().max(0.0))
                                .unwrap_or(0.0);
                            (dispersion * dispersion + magnitude * magnitude).sqrt()
                        }
                        None => dispersion,
                    }
                });
                Ok((Prediction::Real(mean), uncertainty))
            }
            Prediction::Class { distribution, .. } => {
                let n_classes = distribution.len();
                let mut averaged = vec![0.0; n_classes];
                for prediction in &predictions {
                    if let Prediction::Class { distribution, .. } = prediction {
                        for (acc, p) in averaged.iter_mut().zip(distribution) {
                            *acc += p;
                        }
                    }
                }
                averaged.iter_mut().for_each(|p| *p /= n);
                let (class, max_prob) = averaged
                    .iter()
                    .enumerate()
                    .max_by(|a, b| a.1.total_cmp(b.1))
                    .map(|(idx, &p)| (idx, p))
                    .unwrap_or((0, 0.0));
                let uncertainty = (predictions.len() >= 2).then_some(1.0 - max_prob);
                Ok((
                    Prediction::Class {
                        class,
                        distribution: averaged,
                    },
                    uncertainty,
                ))
            }
        }
    }

    /// Influence of every training example on each prediction row.
    ///
    /// `scores[row][j]` is the squared covariance, across the ensemble,
    /// between training example `j`'s bootstrap count and the per-model
    /// prediction at `row` — the per-example terms of the jackknife
    /// variance decomposition. Training points whose inclusion moves the
    /// prediction get large scores; points the ensemble interpolates around
    /// get scores near zero.
    ///
    /// # Errors
    ///
    /// Same as [`BaggedModel::predict`].
    pub fn importance_scores(
        &self,
        rows: &[Vec<FeatureValue>],
    ) -> Result<Vec<Vec<f64>>, ForestError> {
        let n_models = self.models.len() as f64;
        let n_train = self.bag_counts.first().map_or(0, Vec::len);
        let mean_counts: Vec<f64> = (0..n_train)
            .map(|j| self.bag_counts.iter().map(|bag| bag[j]).sum::<f64>() / n_models)
            .collect();

        rows.par_iter()
            .map(|row| {
                let values: Vec<f64> = self
                    .models
                    .iter()
                    .map(|m| m.predict(row).map(|p| p.value()))
                    .collect::<Result<_, _>>()?;
                let mean = values.iter().sum::<f64>() / n_models;
                let scores = (0..n_train)
                    .map(|j| {
                        let cov = self
                            .bag_counts
                            .iter()
                            .zip(&values)
                            .map(|(bag, &v)| (bag[j] - mean_counts[j]) * (v - mean))
                            .sum::<f64>()
                            / n_models;
                        cov * cov
                    })
                    .collect();
                Ok(scores)
            })
            .collect()
    }
}
