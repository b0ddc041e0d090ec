//! Training data representation: tagged feature values, labels, and the
//! validated [`Dataset`] container.

use crate::error::ForestError;

/// A single feature value, tagged as continuous or categorical.
///
/// The tag is fixed per feature column across the whole dataset; mixing
/// variants within a column is rejected at [`Dataset`] construction.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum FeatureValue {
    /// A continuous real-valued measurement.
    Real(f64),
    /// A categorical token drawn from a small alphabet.
    Category(u32),
}

impl FeatureValue {
    /// Return the kind tag of this value.
    #[must_use]
    pub fn kind(self) -> FeatureKind {
        match self {
            FeatureValue::Real(_) => FeatureKind::Real,
            FeatureValue::Category(_) => FeatureKind::Categorical,
        }
    }
}

/// The declared kind of a feature column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FeatureKind {
    /// Continuous real-valued column.
    Real,
    /// Categorical column.
    Categorical,
}

/// Training targets: real-valued for regression, class indices for
/// classification.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Labels {
    /// Regression targets.
    Real(Vec<f64>),
    /// Classification targets as zero-based class indices.
    Class {
        /// Per-sample class index.
        classes: Vec<usize>,
        /// Total number of distinct classes.
        n_classes: usize,
    },
}

impl Labels {
    /// Return the number of labels.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Labels::Real(v) => v.len(),
            Labels::Class { classes, .. } => classes.len(),
        }
    }

    /// Return `true` when there are no labels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the numeric target for sample `i`.
    ///
    /// Class indices are exposed as `f64` so the weighted-variance split
    /// search consumes one target type for both tasks.
    #[must_use]
    pub fn numeric(&self, i: usize) -> f64 {
        match self {
            Labels::Real(v) => v[i],
            Labels::Class { classes, .. } => classes[i] as f64,
        }
    }

    /// Return the number of classes, or `None` for regression labels.
    #[must_use]
    pub fn n_classes(&self) -> Option<usize> {
        match self {
            Labels::Real(_) => None,
            Labels::Class { n_classes, .. } => Some(*n_classes),
        }
    }
}

/// A validated, immutable training set shared read-only by all tree fits.
///
/// Rows are stored row-major (`rows[sample_idx][feature_idx]`). Column kinds
/// are inferred from the first row and enforced for every other row, so the
/// split search can dispatch on the declared kind without re-checking.
#[derive(Debug, Clone)]
pub struct Dataset {
    rows: Vec<Vec<FeatureValue>>,
    labels: Labels,
    kinds: Vec<FeatureKind>,
    feature_names: Vec<String>,
}

impl Dataset {
    /// Build a dataset from rows and labels, validating shape and content.
    ///
    /// # Errors
    ///
    /// | Variant | When |
    /// |---|---|
    /// | [`ForestError::EmptyDataset`] | `rows` is empty |
    /// | [`ForestError::ZeroFeatures`] | rows have zero feature columns |
    /// | [`ForestError::LabelCountMismatch`] | label count differs from row count |
    /// | [`ForestError::FeatureCountMismatch`] | rows have inconsistent lengths |
    /// | [`ForestError::FeatureKindMismatch`] | a column mixes real and categorical values |
    /// | [`ForestError::NonFiniteValue`] | a real feature value is NaN or infinite |
    /// | [`ForestError::NonFiniteLabel`] | a regression label is NaN or infinite |
    /// | [`ForestError::ClassOutOfRange`] | a class index is >= n_classes |
    pub fn new(rows: Vec<Vec<FeatureValue>>, labels: Labels) -> Result<Self, ForestError> {
        if rows.is_empty() {
            return Err(ForestError::EmptyDataset);
        }
        let n_features = rows[0].len();
        if n_features == 0 {
            return Err(ForestError::ZeroFeatures);
        }
        if labels.len() != rows.len() {
            return Err(ForestError::LabelCountMismatch {
                n_samples: rows.len(),
                n_labels: labels.len(),
            });
        }

        let kinds: Vec<FeatureKind> = rows[0].iter().map(|v| v.kind()).collect();

        for (sample_index, row) in rows.iter().enumerate() {
            if row.len() != n_features {
                return Err(ForestError::FeatureCountMismatch {
                    expected: n_features,
                    got: row.len(),
                    sample_index,
                });
            }
            for (feature_index, &value) in row.iter().enumerate() {
                if value.kind() != kinds[feature_index] {
                    return Err(ForestError::FeatureKindMismatch {
                        feature_index,
                        declared: kinds[feature_index],
                        found: value.kind(),
                    });
                }
                if let FeatureValue::Real(x) = value
                    && !x.is_finite()
                {
                    return Err(ForestError::NonFiniteValue {
                        sample_index,
                        feature_index,
                    });
                }
            }
        }

        match &labels {
            Labels::Real(values) => {
                for (sample_index, &y) in values.iter().enumerate() {
                    if !y.is_finite() {
                        return Err(ForestError::NonFiniteLabel { sample_index });
                    }
                }
            }
            Labels::Class { classes, n_classes } => {
                for (sample_index, &class) in classes.iter().enumerate() {
                    if class >= *n_classes {
                        return Err(ForestError::ClassOutOfRange {
                            sample_index,
                            class,
                            n_classes: *n_classes,
                        });
                    }
                }
            }
        }

        let feature_names = (0..n_features).map(|f| format!("f{f}")).collect();
        Ok(Self {
            rows,
            labels,
            kinds,
            feature_names,
        })
    }

    /// Build a regression dataset from plain `f64` feature rows.
    ///
    /// Convenience wrapper for the common all-continuous case.
    ///
    /// # Errors
    ///
    /// Same as [`Dataset::new`].
    pub fn from_real(rows: Vec<Vec<f64>>, labels: Vec<f64>) -> Result<Self, ForestError> {
        let rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(FeatureValue::Real).collect())
            .collect();
        Self::new(rows, Labels::Real(labels))
    }

    /// Replace the default `f{i}` feature names.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::FeatureCountMismatch`] when the name count
    /// differs from the feature count.
    pub fn with_feature_names(mut self, names: Vec<String>) -> Result<Self, ForestError> {
        if names.len() != self.n_features() {
            return Err(ForestError::FeatureCountMismatch {
                expected: self.n_features(),
                got: names.len(),
                sample_index: 0,
            });
        }
        self.feature_names = names;
        Ok(self)
    }

    /// Return the number of training samples.
    #[must_use]
    pub fn n_samples(&self) -> usize {
        self.rows.len()
    }

    /// Return the number of feature columns.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.rows[0].len()
    }

    /// Return all rows.
    #[must_use]
    pub fn rows(&self) -> &[Vec<FeatureValue>] {
        &self.rows
    }

    /// Return one row.
    #[must_use]
    pub fn row(&self, i: usize) -> &[FeatureValue] {
        &self.rows[i]
    }

    /// Return the labels.
    #[must_use]
    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    /// Return the declared kind of each feature column.
    #[must_use]
    pub fn kinds(&self) -> &[FeatureKind] {
        &self.kinds
    }

    /// Return the feature names.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }
}
