use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, instrument};

use crate::cancel::CancelToken;
use crate::config::{FeatureSample, resolve_feature_sample};
use crate::data::{Dataset, FeatureValue, Labels};
use crate::error::ForestError;
use crate::learner::{Learner, Model, Prediction};
use crate::node::{LeafValue, Node, NodeIndex};
use crate::split::{AnnealedSplitter, ChosenSplit};

/// Nodes whose weighted label variance falls below this floor (scaled by the
/// squared mean) are treated as pure and become leaves; the annealing
/// temperature is undefined on a zero-variance node.
const VARIANCE_FLOOR: f64 = 1e-12;

/// Configuration for a single annealed decision tree.
///
/// Construct via [`TreeConfig::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter        | Default             |
/// |------------------|---------------------|
/// | `feature_sample` | `Fraction(1/3)`     |
/// | `min_instances`  | 1                   |
/// | `temperature`    | 1.0                 |
/// | `max_depth`      | `None` (unlimited)  |
#[derive(Debug, Clone)]
pub struct TreeConfig {
    pub(crate) feature_sample: FeatureSample,
    pub(crate) min_instances: usize,
    pub(crate) temperature: f64,
    pub(crate) max_depth: Option<usize>,
}

impl TreeConfig {
    /// Create a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            feature_sample: FeatureSample::Fraction(1.0 / 3.0),
            min_instances: 1,
            temperature: 1.0,
            max_depth: None,
        }
    }

    /// Set the per-node feature subsample strategy.
    #[must_use]
    pub fn with_feature_sample(mut self, feature_sample: FeatureSample) -> Self {
        self.feature_sample = feature_sample;
        self
    }

    /// Set the minimum number of rows required in each partition of a split.
    #[must_use]
    pub fn with_min_instances(mut self, min_instances: usize) -> Self {
        self.min_instances = min_instances;
        self
    }

    /// Set the annealing temperature.
    ///
    /// Lower values favor the lowest-variance candidate more strongly;
    /// higher values sample more broadly among eligible candidates.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the maximum tree depth. `None` means grow until purity or the
    /// minimum-size stopping conditions are met.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Return the feature subsample strategy.
    #[must_use]
    pub fn feature_sample(&self) -> FeatureSample {
        self.feature_sample
    }

    /// Return the minimum rows per partition.
    #[must_use]
    pub fn min_instances(&self) -> usize {
        self.min_instances
    }

    /// Return the annealing temperature.
    #[must_use]
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Return the maximum depth limit, if any.
    #[must_use]
    pub fn max_depth(&self) -> Option<usize> {
        self.max_depth
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl Learner for TreeConfig {
    type Model = Tree;

    /// Fit one annealed decision tree.
    ///
    /// Weight-0 rows are treated as absent. The fit checks the cancellation
    /// token at every node expansion.
    ///
    /// # Errors
    ///
    /// | Variant | When |
    /// |---|---|
    /// | [`ForestError::WeightCountMismatch`] | `weights` length differs from the sample count |
    /// | [`ForestError::InvalidWeight`] | a weight is negative or non-finite |
    /// | [`ForestError::InvalidMinInstances`] | `min_instances` is zero |
    /// | [`ForestError::InvalidTemperature`] | `temperature` is not positive finite |
    /// | [`ForestError::InvalidMaxDepth`] | `max_depth` is `Some(0)` |
    /// | [`ForestError::InvalidFeatureSample`] | the subsample resolves outside [1, n_features] |
    /// | [`ForestError::EmptyDataset`] | every weight is zero |
    /// | [`ForestError::Cancelled`] | the token was set mid-fit |
    #[instrument(skip_all, fields(n_samples = data.n_samples()))]
    fn train(
        &self,
        data: &Dataset,
        weights: &[f64],
        seed: u64,
        cancel: &CancelToken,
    ) -> Result<Tree, ForestError> {
        if weights.len() != data.n_samples() {
            return Err(ForestError::WeightCountMismatch {
                n_samples: data.n_samples(),
                n_weights: weights.len(),
            });
        }
        for (sample_index, &weight) in weights.iter().enumerate() {
            if !weight.is_finite() || weight < 0.0 {
                return Err(ForestError::InvalidWeight {
                    sample_index,
                    weight,
                });
            }
        }
        if self.min_instances == 0 {
            return Err(ForestError::InvalidMinInstances { min_instances: 0 });
        }
        if !self.temperature.is_finite() || self.temperature <= 0.0 {
            return Err(ForestError::InvalidTemperature {
                temperature: self.temperature,
            });
        }
        if let Some(d) = self.max_depth
            && d == 0
        {
            return Err(ForestError::InvalidMaxDepth { max_depth: 0 });
        }

        let num_features = resolve_feature_sample(self.feature_sample, data.n_features())?;
        let indices: Vec<usize> = (0..data.n_samples())
            .filter(|&i| weights[i] > 0.0)
            .collect();
        if indices.is_empty() {
            return Err(ForestError::EmptyDataset);
        }

        let splitter = AnnealedSplitter {
            num_features,
            min_instances: self.min_instances,
            temperature: self.temperature,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut arena: Vec<Node> = Vec::new();

        build_node(
            data, weights, &indices, &splitter, self.min_instances, self.max_depth, 0, &mut rng,
            &mut arena, cancel,
        )?;

        debug!(n_nodes = arena.len(), "tree built");

        Ok(Tree {
            nodes: arena,
            n_features: data.n_features(),
            n_classes: data.labels().n_classes(),
        })
    }
}

/// Weighted label statistics for one node's rows.
struct NodeStats {
    total_sum: f64,
    total_weight: f64,
    mean: f64,
    total_variance: f64,
}

fn node_stats(data: &Dataset, weights: &[f64], indices: &[usize]) -> NodeStats {
    let mut total_sum = 0.0;
    let mut total_weight = 0.0;
    for &i in indices {
        total_sum += data.labels().numeric(i) * weights[i];
        total_weight += weights[i];
    }
    let mean = total_sum / total_weight;
    let mut total_variance = 0.0;
    for &i in indices {
        let d = data.labels().numeric(i) - mean;
        total_variance += weights[i] * d * d;
    }
    total_variance /= total_weight;
    NodeStats {
        total_sum,
        total_weight,
        mean,
        total_variance,
    }
}

/// Build the leaf value for one node's rows.
fn leaf_value(data: &Dataset, weights: &[f64], indices: &[usize], mean: f64) -> LeafValue {
    match data.labels() {
        Labels::Real(_) => LeafValue::Mean(mean),
        Labels::Class { classes, n_classes } => {
            let mut distribution = vec![0.0; *n_classes];
            let mut total = 0.0;
            for &i in indices {
                distribution[classes[i]] += weights[i];
                total += weights[i];
            }
            distribution.iter_mut().for_each(|p| *p /= total);
            LeafValue::Distribution(distribution)
        }
    }
}

/// Recursively build the arena-based tree.
///
/// Returns the [`NodeIndex`] of the node just created in `arena`.
#[allow(clippy::too_many_arguments)]
fn build_node(
    data: &Dataset,
    weights: &[f64],
    indices: &[usize],
    splitter: &AnnealedSplitter,
    min_instances: usize,
    max_depth: Option<usize>,
    depth: usize,
    rng: &mut ChaCha8Rng,
    arena: &mut Vec<Node>,
    cancel: &CancelToken,
) -> Result<NodeIndex, ForestError> {
    if cancel.is_cancelled() {
        return Err(ForestError::Cancelled);
    }

    let n_samples = indices.len();
    let stats = node_stats(data, weights, indices);

    let make_leaf = |arena: &mut Vec<Node>| -> NodeIndex {
        let idx = arena.len();
        arena.push(Node::Leaf {
            value: leaf_value(data, weights, indices, stats.mean),
            n_samples,
        });
        NodeIndex::new(idx)
    };

    // Pure nodes never reach the splitter: beta is undefined at zero variance.
    let pure = stats.total_variance <= VARIANCE_FLOOR * (1.0 + stats.mean * stats.mean);
    let too_few = n_samples < 2 * min_instances;
    let depth_exceeded = max_depth.is_some_and(|max_d| depth >= max_d);
    if pure || too_few || depth_exceeded {
        return Ok(make_leaf(arena));
    }

    let chosen = splitter.choose_split(
        data,
        indices,
        weights,
        stats.total_sum,
        stats.total_weight,
        stats.total_variance,
        rng,
    )?;
    let ChosenSplit {
        rule,
        delta_impurity,
    } = match chosen {
        Some(c) => c,
        None => return Ok(make_leaf(arena)),
    };

    let mut left_indices = Vec::with_capacity(n_samples / 2);
    let mut right_indices = Vec::with_capacity(n_samples / 2);
    for &i in indices {
        if rule.sends_left(data.row(i))? {
            left_indices.push(i);
        } else {
            right_indices.push(i);
        }
    }
    if left_indices.is_empty() || right_indices.is_empty() {
        return Ok(make_leaf(arena));
    }

    // Arena pattern: reserve the index, recurse, then overwrite with the split.
    let node_idx = arena.len();
    arena.push(Node::Leaf {
        value: leaf_value(data, weights, indices, stats.mean),
        n_samples,
    });

    let left = build_node(
        data, weights, &left_indices, splitter, min_instances, max_depth, depth + 1, rng, arena,
        cancel,
    )?;
    let right = build_node(
        data, weights, &right_indices, splitter, min_instances, max_depth, depth + 1, rng, arena,
        cancel,
    )?;

    arena[node_idx] = Node::Split {
        rule,
        left,
        right,
        n_samples,
        delta_impurity,
    };
    Ok(NodeIndex::new(node_idx))
}

/// A fitted annealed decision tree.
///
/// Stored as an arena-based `Vec<Node>` with index references for
/// cache-friendly traversal and trivial serialization.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Tree {
    pub(crate) nodes: Vec<Node>,
    pub(crate) n_features: usize,
    pub(crate) n_classes: Option<usize>,
}

impl Tree {
    /// Return the total number of nodes (splits and leaves).
    #[must_use]
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Return the number of leaf nodes.
    #[must_use]
    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Return the maximum depth of the tree (a root-only tree has depth 0).
    #[must_use]
    pub fn depth(&self) -> usize {
        if self.nodes.is_empty() {
            return 0;
        }
        let mut max_depth = 0usize;
        let mut queue = std::collections::VecDeque::new();
        queue.push_back((0usize, 0usize));
        while let Some((node_idx, d)) = queue.pop_front() {
            match &self.nodes[node_idx] {
                Node::Leaf { .. } => max_depth = max_depth.max(d),
                Node::Split { left, right, .. } => {
                    queue.push_back((left.index(), d + 1));
                    queue.push_back((right.index(), d + 1));
                }
            }
        }
        max_depth
    }

    /// Traverse from the root and return the arena index of the leaf.
    fn traverse(&self, row: &[FeatureValue]) -> Result<usize, ForestError> {
        let mut idx = 0usize;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { .. } => return Ok(idx),
                Node::Split {
                    rule, left, right, ..
                } => {
                    idx = if rule.sends_left(row)? {
                        left.index()
                    } else {
                        right.index()
                    };
                }
            }
        }
    }
}

impl Model for Tree {
    fn predict(&self, row: &[FeatureValue]) -> Result<Prediction, ForestError> {
        if row.len() != self.n_features {
            return Err(ForestError::PredictionFeatureMismatch {
                expected: self.n_features,
                got: row.len(),
            });
        }
        let leaf = self.traverse(row)?;
        match &self.nodes[leaf] {
            Node::Leaf { value, .. } => Ok(match value {
                LeafValue::Mean(mean) => Prediction::Real(*mean),
                LeafValue::Distribution(distribution) => {
                    let class = distribution
                        .iter()
                        .enumerate()
                        .max_by(|a, b| a.1.total_cmp(b.1))
                        .map(|(idx, _)| idx)
                        .unwrap_or(0);
                    Prediction::Class {
                        class,
                        distribution: distribution.clone(),
                    }
                }
            }),
            Node::Split { .. } => unreachable!("traverse always ends at a leaf"),
        }
    }

    fn feature_reductions(&self) -> Vec<f64> {
        let mut totals = vec![0.0f64; self.n_features];
        for node in &self.nodes {
            if let Node::Split {
                rule,
                delta_impurity,
                ..
            } = node
            {
                totals[rule.feature().index()] += delta_impurity;
            }
        }
        totals
    }

    fn n_features(&self) -> usize {
        self.n_features
    }
}
