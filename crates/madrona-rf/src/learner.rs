//! The training contract between the bagger and whatever learner it wraps.

use crate::cancel::CancelToken;
use crate::data::{Dataset, FeatureValue};
use crate::error::ForestError;

/// A single prediction from one model.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Prediction {
    /// A real-valued regression prediction.
    Real(f64),
    /// A classification prediction with its class-probability vector.
    Class {
        /// Predicted class (argmax of `distribution`).
        class: usize,
        /// Normalized class probabilities.
        distribution: Vec<f64>,
    },
}

impl Prediction {
    /// Return the prediction as a scalar: the value itself for regression,
    /// the class index for classification.
    #[must_use]
    pub fn value(&self) -> f64 {
        match self {
            Prediction::Real(v) => *v,
            Prediction::Class { class, .. } => *class as f64,
        }
    }

    /// Return the regression value, or `None` for a class prediction.
    #[must_use]
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Prediction::Real(v) => Some(*v),
            Prediction::Class { .. } => None,
        }
    }
}

/// Anything that can fit a model on weighted rows.
///
/// Implementations must be deterministic for a fixed `seed`, treat weight-0
/// rows as absent, and observe `cancel` promptly enough that a set token
/// aborts an in-flight fit within a bounded time.
pub trait Learner: Send + Sync {
    /// The fitted model type.
    type Model: Model;

    /// Fit one model on `data` with per-row `weights`.
    ///
    /// # Errors
    ///
    /// Implementations return [`ForestError::Cancelled`] when `cancel` is
    /// observed set, and their own validation errors otherwise.
    fn train(
        &self,
        data: &Dataset,
        weights: &[f64],
        seed: u64,
        cancel: &CancelToken,
    ) -> Result<Self::Model, ForestError>;
}

/// A fitted model usable for prediction and importance accounting.
pub trait Model: Send + Sync {
    /// Predict a single row.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::PredictionFeatureMismatch`] on a wrong-length
    /// row and [`ForestError::FeatureKindMismatch`] on a wrong-kind value.
    fn predict(&self, row: &[FeatureValue]) -> Result<Prediction, ForestError>;

    /// Total absolute impurity reduction attributed to each feature.
    fn feature_reductions(&self) -> Vec<f64>;

    /// Number of features this model was trained on.
    fn n_features(&self) -> usize;
}
