//! Bagged randomized decision trees with calibrated uncertainty.
//!
//! Provides a random-forest-style regressor/classifier built from two
//! subsystems: a temperature-annealed, variance-minimizing split search over
//! continuous and categorical features, and a bagging engine that trains
//! trees on bootstrap resamples in parallel via rayon, estimates prediction
//! uncertainty from out-of-bag dispersion with an optional bias-correction
//! model, and supports cooperative mid-training cancellation.

mod bagger;
mod cancel;
mod config;
mod data;
mod error;
mod importance;
mod learner;
mod model;
mod node;
mod oob;
mod result;
mod serialize;
mod split;
mod tree;
mod variance;

pub use bagger::Bagger;
pub use cancel::CancelToken;
pub use config::FeatureSample;
pub use data::{Dataset, FeatureKind, FeatureValue, Labels};
pub use error::ForestError;
pub use importance::FeatureImportance;
pub use learner::{Learner, Model, Prediction};
pub use model::{BaggedModel, PredictionResult};
pub use node::{FeatureIndex, LeafValue, Node, NodeIndex};
pub use oob::OobEstimate;
pub use result::{BaggedTrainingResult, TrainingMetadata};
pub use split::SplitRule;
pub use tree::{Tree, TreeConfig};
