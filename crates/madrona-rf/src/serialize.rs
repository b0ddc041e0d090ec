//! Model serialization and deserialization via bincode.

use std::path::Path;

use tracing::{debug, info, instrument};

use crate::error::ForestError;
use crate::learner::Model;
use crate::model::BaggedModel;

/// Current binary format version.
const FORMAT_VERSION: u32 = 1;

/// Versioned envelope for the serialized ensemble.
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(bound(
    serialize = "M: serde::Serialize, B: serde::Serialize",
    deserialize = "M: serde::de::DeserializeOwned, B: serde::de::DeserializeOwned"
))]
struct ModelEnvelope<M, B> {
    /// Format version for compatibility checking.
    format_version: u32,
    /// Number of models in the ensemble.
    n_models: usize,
    /// Number of features the ensemble was trained on.
    n_features: usize,
    /// The serialized ensemble.
    model: BaggedModel<M, B>,
}

impl<M, B> BaggedModel<M, B>
where
    M: Model + Clone + serde::Serialize + serde::de::DeserializeOwned,
    B: Model + Clone + serde::Serialize + serde::de::DeserializeOwned,
{
    /// Save the ensemble to a binary file.
    ///
    /// Uses bincode encoding wrapped in a versioned envelope so an
    /// incompatible build refuses to load it. A reloaded model predicts
    /// identically to the saved one.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ForestError::SerializeModel`] | bincode encoding failed |
    /// | [`ForestError::WriteModel`] | file write failed |
    #[instrument(skip(self), fields(path = %path.as_ref().display()))]
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ForestError> {
        let path = path.as_ref();

        let envelope = ModelEnvelope {
            format_version: FORMAT_VERSION,
            n_models: self.n_models(),
            n_features: self.n_features(),
            model: self.clone(),
        };

        let bytes =
            bincode::serialize(&envelope).map_err(|e| ForestError::SerializeModel { source: e })?;

        std::fs::write(path, &bytes).map_err(|e| ForestError::WriteModel {
            path: path.to_path_buf(),
            source: e,
        })?;

        info!(
            size_bytes = bytes.len(),
            n_models = self.n_models(),
            "model saved"
        );

        Ok(())
    }

    /// Load an ensemble from a binary file.
    ///
    /// Checks the format version and returns an error on mismatch.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ForestError::ReadModel`] | file read failed |
    /// | [`ForestError::DeserializeModel`] | bincode decoding failed |
    /// | [`ForestError::IncompatibleModelVersion`] | format version mismatch |
    #[instrument(fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ForestError> {
        let path = path.as_ref();

        let bytes = std::fs::read(path).map_err(|e| ForestError::ReadModel {
            path: path.to_path_buf(),
            source: e,
        })?;

        let envelope: ModelEnvelope<M, B> =
            bincode::deserialize(&bytes).map_err(|e| ForestError::DeserializeModel {
                path: path.to_path_buf(),
                source: e,
            })?;

        if envelope.format_version != FORMAT_VERSION {
            return Err(ForestError::IncompatibleModelVersion {
                expected: FORMAT_VERSION,
                found: envelope.format_version,
                path: path.to_path_buf(),
            });
        }

        debug!(
            n_models = envelope.n_models,
            n_features = envelope.n_features,
            "model loaded"
        );

        Ok(envelope.model)
    }
}
