//! Training result types for the bagged ensemble.

use crate::importance::FeatureImportance;
use crate::learner::Model;
use crate::model::BaggedModel;
use crate::oob::OobEstimate;

/// Metadata about the training run.
#[derive(Debug, Clone)]
pub struct TrainingMetadata {
    /// Number of models trained.
    pub num_bags: usize,
    /// Number of training samples.
    pub n_samples: usize,
    /// Number of features in the dataset.
    pub n_features: usize,
    /// Bootstrap draws per bag.
    pub draw_count: usize,
}

/// Result of bagged ensemble training.
///
/// Owns the fitted model, ranked feature importances, out-of-bag summary,
/// and training metadata. Created once at the end of training and never
/// mutated afterward.
#[derive(Debug)]
pub struct BaggedTrainingResult<M, B = M> {
    model: BaggedModel<M, B>,
    importances: Vec<FeatureImportance>,
    oob: OobEstimate,
    metadata: TrainingMetadata,
}

impl<M: Model, B: Model> BaggedTrainingResult<M, B> {
    pub(crate) fn new(
        model: BaggedModel<M, B>,
        importances: Vec<FeatureImportance>,
        oob: OobEstimate,
        metadata: TrainingMetadata,
    ) -> Self {
        Self {
            model,
            importances,
            oob,
            metadata,
        }
    }

    /// Borrow the fitted ensemble.
    #[must_use]
    pub fn model(&self) -> &BaggedModel<M, B> {
        &self.model
    }

    /// Consume the result and return the fitted ensemble.
    #[must_use]
    pub fn into_model(self) -> BaggedModel<M, B> {
        self.model
    }

    /// Return the ranked feature importances.
    #[must_use]
    pub fn importances(&self) -> &[FeatureImportance] {
        &self.importances
    }

    /// Return the out-of-bag summary.
    #[must_use]
    pub fn oob(&self) -> &OobEstimate {
        &self.oob
    }

    /// Return the out-of-bag loss estimate, if any example was covered.
    #[must_use]
    pub fn loss(&self) -> Option<f64> {
        self.oob.loss
    }

    /// Return training metadata.
    #[must_use]
    pub fn metadata(&self) -> &TrainingMetadata {
        &self.metadata
    }
}
