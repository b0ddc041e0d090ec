use std::path::PathBuf;

use crate::data::FeatureKind;

/// Errors from ensemble training, split search, and prediction.
#[derive(Debug, thiserror::Error)]
pub enum ForestError {
    /// Returned when num_bags is zero.
    #[error("num_bags must be at least 1, got {num_bags}")]
    InvalidBagCount {
        /// The invalid num_bags value provided.
        num_bags: usize,
    },

    /// Returned when bag_fraction is not in (0.0, 1.0].
    #[error("bag_fraction must be in (0.0, 1.0], got {fraction}")]
    InvalidBagFraction {
        /// The invalid bag_fraction value provided.
        fraction: f64,
    },

    /// Returned when min_instances is zero.
    #[error("min_instances must be at least 1, got {min_instances}")]
    InvalidMinInstances {
        /// The invalid min_instances value provided.
        min_instances: usize,
    },

    /// Returned when temperature is not a positive finite number.
    #[error("temperature must be positive and finite, got {temperature}")]
    InvalidTemperature {
        /// The invalid temperature value provided.
        temperature: f64,
    },

    /// Returned when the feature subsample resolves to 0 or exceeds n_features.
    #[error("num_features resolved to {resolved}, but must be in [1, {n_features}]")]
    InvalidFeatureSample {
        /// The resolved subsample count.
        resolved: usize,
        /// The number of features in the dataset.
        n_features: usize,
    },

    /// Returned when max_depth is zero.
    #[error("max_depth must be at least 1, got {max_depth}")]
    InvalidMaxDepth {
        /// The invalid max_depth value provided.
        max_depth: usize,
    },

    /// Returned when the training dataset has zero samples.
    #[error("training dataset has zero samples")]
    EmptyDataset,

    /// Returned when the training dataset has zero feature columns.
    #[error("training dataset has zero feature columns")]
    ZeroFeatures,

    /// Returned when a sample has a different number of features than expected.
    #[error("sample {sample_index} has {got} features, expected {expected}")]
    FeatureCountMismatch {
        /// The expected number of features.
        expected: usize,
        /// The actual number of features in the sample.
        got: usize,
        /// The zero-based index of the offending sample.
        sample_index: usize,
    },

    /// Returned when the label vector length differs from the sample count.
    #[error("got {n_labels} labels for {n_samples} samples")]
    LabelCountMismatch {
        /// The number of training samples.
        n_samples: usize,
        /// The number of labels provided.
        n_labels: usize,
    },

    /// Returned when the weight vector length differs from the sample count.
    #[error("got {n_weights} weights for {n_samples} samples")]
    WeightCountMismatch {
        /// The number of training samples.
        n_samples: usize,
        /// The number of weights provided.
        n_weights: usize,
    },

    /// Returned when a real feature value is NaN or infinite.
    #[error("non-finite value at sample {sample_index}, feature {feature_index}")]
    NonFiniteValue {
        /// The zero-based index of the offending sample.
        sample_index: usize,
        /// The zero-based index of the offending feature column.
        feature_index: usize,
    },

    /// Returned when a regression label is NaN or infinite.
    #[error("non-finite label at sample {sample_index}")]
    NonFiniteLabel {
        /// The zero-based index of the offending sample.
        sample_index: usize,
    },

    /// Returned when a training weight is negative or non-finite.
    #[error("invalid weight {weight} at sample {sample_index}")]
    InvalidWeight {
        /// The zero-based index of the offending sample.
        sample_index: usize,
        /// The offending weight.
        weight: f64,
    },

    /// Returned when a class label is outside [0, n_classes).
    #[error("class {class} at sample {sample_index} is out of range for {n_classes} classes")]
    ClassOutOfRange {
        /// The zero-based index of the offending sample.
        sample_index: usize,
        /// The out-of-range class label.
        class: usize,
        /// The declared number of classes.
        n_classes: usize,
    },

    /// Returned when a feature value's variant contradicts the column's
    /// declared kind. This is a configuration error, not a data artifact.
    #[error("feature {feature_index} is declared {declared:?} but holds a {found:?} value")]
    FeatureKindMismatch {
        /// The zero-based index of the offending feature column.
        feature_index: usize,
        /// The kind the column was declared with.
        declared: FeatureKind,
        /// The kind actually found.
        found: FeatureKind,
    },

    /// Returned when a prediction input has the wrong number of features.
    #[error("prediction input has {got} features, expected {expected}")]
    PredictionFeatureMismatch {
        /// The expected number of features.
        expected: usize,
        /// The actual number of features in the prediction input.
        got: usize,
    },

    /// Returned when training is cancelled via a [`crate::CancelToken`].
    ///
    /// Distinct from every other failure: the caller asked training to stop,
    /// and no partial model is returned.
    #[error("training was cancelled before completion")]
    Cancelled,

    /// Returned when model serialization fails.
    #[error("failed to serialize model")]
    SerializeModel {
        /// The underlying bincode error.
        source: Box<bincode::ErrorKind>,
    },

    /// Returned when model deserialization fails.
    #[error("failed to deserialize model from {path}")]
    DeserializeModel {
        /// Path to the model file that could not be deserialized.
        path: PathBuf,
        /// The underlying bincode error.
        source: Box<bincode::ErrorKind>,
    },

    /// Returned when writing the model file fails.
    #[error("failed to write model to {path}")]
    WriteModel {
        /// Path to the file that could not be written.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when reading the model file fails.
    #[error("failed to read model from {path}")]
    ReadModel {
        /// Path to the file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when loading a model with an incompatible format version.
    #[error("incompatible model version in {path}: expected {expected}, found {found}")]
    IncompatibleModelVersion {
        /// The model format version this build expects.
        expected: u32,
        /// The model format version found in the file.
        found: u32,
        /// Path to the model file with the incompatible version.
        path: PathBuf,
    },
}
