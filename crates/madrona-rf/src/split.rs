//! Temperature-annealed, variance-minimizing split selection.
//!
//! At every node the splitter examines a random subsample of features. Each
//! feature contributes candidate boundaries scored by `exp(-rel_var · β)`
//! where `rel_var` is the relative partition variance and
//! `β = 1 / (temperature · node_variance)`. One candidate is drawn per
//! feature, then one feature is drawn weighted by its total candidate score.
//! `temperature → 0` recovers greedy best-split selection; `temperature → ∞`
//! samples uniformly among eligible boundaries.

use std::collections::BTreeMap;

use rand::Rng;

use crate::data::{Dataset, FeatureKind, FeatureValue};
use crate::error::ForestError;
use crate::node::FeatureIndex;
use crate::variance::relative_variance;

/// A fitted decision rule over a single feature column.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum SplitRule {
    /// Continuous split: rows with `value <= threshold` route left.
    Real {
        /// Feature column tested by this rule.
        feature: FeatureIndex,
        /// Threshold value, placed at the midpoint of two observed values.
        threshold: f64,
    },
    /// Categorical split: rows whose category is in `include` route left.
    ///
    /// `include` is sorted and holds only categories observed at the node; an
    /// empty set signals that no informative split was found.
    Categorical {
        /// Feature column tested by this rule.
        feature: FeatureIndex,
        /// Categories routed left.
        include: Vec<u32>,
    },
}

impl SplitRule {
    /// Return the feature column this rule tests.
    #[must_use]
    pub fn feature(&self) -> FeatureIndex {
        match self {
            SplitRule::Real { feature, .. } | SplitRule::Categorical { feature, .. } => *feature,
        }
    }

    /// Return `true` when `row` routes to the left child.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::FeatureKindMismatch`] when the row's value for
    /// the tested column contradicts the rule's kind. That can only happen on
    /// misconfigured inputs and is fatal by design.
    pub fn sends_left(&self, row: &[FeatureValue]) -> Result<bool, ForestError> {
        match self {
            SplitRule::Real { feature, threshold } => match row[feature.index()] {
                FeatureValue::Real(x) => Ok(x <= *threshold),
                FeatureValue::Category(_) => Err(ForestError::FeatureKindMismatch {
                    feature_index: feature.index(),
                    declared: FeatureKind::Real,
                    found: FeatureKind::Categorical,
                }),
            },
            SplitRule::Categorical { feature, include } => match row[feature.index()] {
                FeatureValue::Category(c) => Ok(include.binary_search(&c).is_ok()),
                FeatureValue::Real(_) => Err(ForestError::FeatureKindMismatch {
                    feature_index: feature.index(),
                    declared: FeatureKind::Categorical,
                    found: FeatureKind::Real,
                }),
            },
        }
    }
}

/// The split chosen for one node.
#[derive(Debug, Clone)]
pub(crate) struct ChosenSplit {
    pub(crate) rule: SplitRule,
    /// Absolute weighted impurity reduction (`-rel_var - total_sum²/total_weight`),
    /// comparable across nodes for importance accounting.
    pub(crate) delta_impurity: f64,
}

/// Outcome of searching one feature: the drawn candidate plus the feature's
/// total candidate score in log-shifted form.
///
/// Scores within a node can overflow `exp` for labels with large magnitudes,
/// so each feature reports `max_exponent` (the largest `-rel_var · β` among
/// its candidates) and `shifted_total` (the score sum with that factored
/// out). Cross-feature weights are reconstructed under a common node-wide
/// shift; every selection ratio is identical to the unshifted formulas.
#[derive(Debug, Clone)]
struct FeatureSearch {
    rule: SplitRule,
    rel_variance: f64,
    max_exponent: f64,
    shifted_total: f64,
}

/// Randomized split selection over a feature subsample.
#[derive(Debug, Clone)]
pub(crate) struct AnnealedSplitter {
    /// Number of features examined per node.
    pub(crate) num_features: usize,
    /// Minimum surviving-row count required on each side of a boundary.
    pub(crate) min_instances: usize,
    /// Annealing temperature; see module docs.
    pub(crate) temperature: f64,
}

impl AnnealedSplitter {
    /// Select one split for the node rows in `indices`.
    ///
    /// `total_sum`, `total_weight`, and `total_variance` are the node-wide
    /// weighted label statistics; the caller guarantees `total_variance > 0`
    /// (pure nodes become leaves before the splitter runs).
    ///
    /// Returns `Ok(None)` when no examined feature yields an eligible
    /// boundary, in which case the node becomes a leaf.
    pub(crate) fn choose_split(
        &self,
        data: &Dataset,
        indices: &[usize],
        weights: &[f64],
        total_sum: f64,
        total_weight: f64,
        total_variance: f64,
        rng: &mut impl Rng,
    ) -> Result<Option<ChosenSplit>, ForestError> {
        let beta = 1.0 / (self.temperature * total_variance);
        let n_features = data.n_features();

        // Partial Fisher-Yates: shuffle only the first `num_features` slots.
        let mut feature_order: Vec<usize> = (0..n_features).collect();
        let take = self.num_features.min(n_features);
        for i in 0..take {
            let j = rng.gen_range(i..n_features);
            feature_order.swap(i, j);
        }

        let mut searches: Vec<FeatureSearch> = Vec::with_capacity(take);
        for &feature_index in &feature_order[..take] {
            let feature = FeatureIndex::new(feature_index);
            let search = match data.kinds()[feature_index] {
                FeatureKind::Real => self.search_real(
                    data, indices, weights, feature, total_sum, total_weight, beta, rng,
                )?,
                FeatureKind::Categorical => self.search_categorical(
                    data, indices, weights, feature, total_sum, total_weight, beta, rng,
                )?,
            };
            if let Some(search) = search {
                searches.push(search);
            }
        }

        // Cross-feature draw weighted by each feature's total candidate
        // score, reconstructed under a common shift.
        let node_max = searches
            .iter()
            .filter(|s| s.shifted_total > 0.0)
            .map(|s| s.max_exponent)
            .fold(f64::NEG_INFINITY, f64::max);
        if node_max == f64::NEG_INFINITY {
            return Ok(None);
        }
        let feature_weights: Vec<f64> = searches
            .iter()
            .map(|s| {
                if s.shifted_total > 0.0 {
                    (s.max_exponent - node_max).exp() * s.shifted_total
                } else {
                    0.0
                }
            })
            .collect();
        let Some(picked) = weighted_draw(rng, &feature_weights) else {
            return Ok(None);
        };

        let chosen = &searches[picked];
        let delta_impurity = -chosen.rel_variance - total_sum * total_sum / total_weight;
        Ok(Some(ChosenSplit {
            rule: chosen.rule.clone(),
            delta_impurity,
        }))
    }

    /// Sweep the sorted values of one continuous feature.
    ///
    /// Boundaries strictly inside a run of tied values are never candidates,
    /// and both sides of an eligible boundary hold at least `min_instances`
    /// rows. The proposed threshold is the midpoint of the two adjacent
    /// distinct values.
    #[allow(clippy::too_many_arguments)]
    fn search_real(
        &self,
        data: &Dataset,
        indices: &[usize],
        weights: &[f64],
        feature: FeatureIndex,
        total_sum: f64,
        total_weight: f64,
        beta: f64,
        rng: &mut impl Rng,
    ) -> Result<Option<FeatureSearch>, ForestError> {
        let mut rows: Vec<(f64, f64, f64)> = Vec::with_capacity(indices.len());
        for &i in indices {
            match data.row(i)[feature.index()] {
                FeatureValue::Real(x) => rows.push((x, data.labels().numeric(i), weights[i])),
                FeatureValue::Category(_) => {
                    return Err(ForestError::FeatureKindMismatch {
                        feature_index: feature.index(),
                        declared: FeatureKind::Real,
                        found: FeatureKind::Categorical,
                    });
                }
            }
        }
        rows.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));

        let n = rows.len();
        let mut candidates: Vec<(f64, f64)> = Vec::new();
        let mut left_sum = 0.0;
        let mut left_weight = 0.0;
        for i in 0..n.saturating_sub(1) {
            let (value, label, weight) = rows[i];
            left_sum += label * weight;
            left_weight += weight;

            let next_value = rows[i + 1].0;
            if value == next_value {
                continue;
            }
            let n_left = i + 1;
            let n_right = n - n_left;
            if n_left < self.min_instances || n_right < self.min_instances {
                continue;
            }

            let rel = relative_variance(left_sum, left_weight, total_sum, total_weight);
            candidates.push((0.5 * (value + next_value), rel));
        }
        if candidates.is_empty() {
            return Ok(None);
        }

        let rels: Vec<f64> = candidates.iter().map(|&(_, rel)| rel).collect();
        let (picked, max_exponent, shifted_total) = draw_candidate(&rels, beta, rng);
        let (threshold, rel_variance) = candidates[picked];
        Ok(Some(FeatureSearch {
            rule: SplitRule::Real { feature, threshold },
            rel_variance,
            max_exponent,
            shifted_total,
        }))
    }

    /// Search one categorical feature via the mean-ordered prefix reduction.
    ///
    /// Categories are ordered by mean label so only `k−1` prefix cuts need be
    /// scored instead of `2^(k−1)` subsets. A feature dominated by singleton
    /// categories (nontrivial-group weight below half the node weight) is
    /// reported with an empty include-set and zero selection weight rather
    /// than trusted with a split.
    #[allow(clippy::too_many_arguments)]
    fn search_categorical(
        &self,
        data: &Dataset,
        indices: &[usize],
        weights: &[f64],
        feature: FeatureIndex,
        total_sum: f64,
        total_weight: f64,
        beta: f64,
        rng: &mut impl Rng,
    ) -> Result<Option<FeatureSearch>, ForestError> {
        // (weighted label sum, weight sum, row count) per category.
        let mut groups: BTreeMap<u32, (f64, f64, usize)> = BTreeMap::new();
        for &i in indices {
            match data.row(i)[feature.index()] {
                FeatureValue::Category(c) => {
                    let entry = groups.entry(c).or_insert((0.0, 0.0, 0));
                    entry.0 += data.labels().numeric(i) * weights[i];
                    entry.1 += weights[i];
                    entry.2 += 1;
                }
                FeatureValue::Real(_) => {
                    return Err(ForestError::FeatureKindMismatch {
                        feature_index: feature.index(),
                        declared: FeatureKind::Categorical,
                        found: FeatureKind::Real,
                    });
                }
            }
        }

        let nontrivial_weight: f64 = groups
            .values()
            .filter(|&&(_, _, count)| count > 1)
            .map(|&(_, weight, _)| weight)
            .sum();
        if nontrivial_weight < 0.5 * total_weight {
            // Dominated by singleton categories: excluded from the draw.
            return Ok(Some(FeatureSearch {
                rule: SplitRule::Categorical {
                    feature,
                    include: Vec::new(),
                },
                rel_variance: f64::INFINITY,
                max_exponent: f64::NEG_INFINITY,
                shifted_total: 0.0,
            }));
        }

        let mut ordered: Vec<(u32, f64, f64, usize)> = groups
            .into_iter()
            .map(|(category, (sum, weight, count))| (category, sum, weight, count))
            .collect();
        ordered.sort_by(|a, b| {
            (a.1 / a.2).total_cmp(&(b.1 / b.2)).then(a.0.cmp(&b.0))
        });

        let total_count = indices.len();
        let mut candidates: Vec<(usize, f64)> = Vec::new();
        let mut left_sum = 0.0;
        let mut left_weight = 0.0;
        let mut left_count = 0usize;
        for (k, &(_, sum, weight, count)) in
            ordered.iter().take(ordered.len().saturating_sub(1)).enumerate()
        {
            left_sum += sum;
            left_weight += weight;
            left_count += count;

            if left_count < self.min_instances || total_count - left_count < self.min_instances {
                continue;
            }
            let rel = relative_variance(left_sum, left_weight, total_sum, total_weight);
            candidates.push((k + 1, rel));
        }
        if candidates.is_empty() {
            return Ok(None);
        }

        let rels: Vec<f64> = candidates.iter().map(|&(_, rel)| rel).collect();
        let (picked, max_exponent, shifted_total) = draw_candidate(&rels, beta, rng);
        let (prefix_len, rel_variance) = candidates[picked];
        let mut include: Vec<u32> = ordered[..prefix_len].iter().map(|g| g.0).collect();
        include.sort_unstable();
        Ok(Some(FeatureSearch {
            rule: SplitRule::Categorical { feature, include },
            rel_variance,
            max_exponent,
            shifted_total,
        }))
    }
}

/// Draw one candidate proportionally to `exp(-rel_var · β)`.
///
/// Exponents are shifted by their maximum before `exp` so large-magnitude
/// labels cannot overflow; the returned `(max_exponent, shifted_total)` pair
/// lets the caller reconstruct this feature's total score for the
/// cross-feature draw under a common shift.
fn draw_candidate(rels: &[f64], beta: f64, rng: &mut impl Rng) -> (usize, f64, f64) {
    let max_exponent = rels
        .iter()
        .map(|&rel| -rel * beta)
        .fold(f64::NEG_INFINITY, f64::max);
    let scores: Vec<f64> = rels
        .iter()
        .map(|&rel| (-rel * beta - max_exponent).exp())
        .collect();
    let shifted_total: f64 = scores.iter().sum();
    // The max-score candidate has score 1.0, so the draw cannot fail.
    let picked = weighted_draw(rng, &scores).unwrap_or(rels.len() - 1);
    (picked, max_exponent, shifted_total)
}

/// Single-pass cumulative weighted draw.
///
/// Falls back to the last positive-weight entry if floating-point drift
/// pushes the scaled uniform target past the accumulated total; with
/// consistently computed scores that branch is unreachable.
pub(crate) fn weighted_draw(rng: &mut impl Rng, weights: &[f64]) -> Option<usize> {
    let total: f64 = weights.iter().filter(|w| w.is_finite()).sum();
    if total <= 0.0 {
        return None;
    }
    let target = rng.r#gen::<f64>() * total;
    let mut cumulative = 0.0;
    let mut last = None;
    for (i, &w) in weights.iter().enumerate() {
        if !(w > 0.0) || !w.is_finite() {
            continue;
        }
        last = Some(i);
        cumulative += w;
        if target < cumulative {
            return Some(i);
        }
    }
    last
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::{AnnealedSplitter, SplitRule, weighted_draw};
    use crate::data::{Dataset, FeatureValue, Labels};

    fn splitter(min_instances: usize, temperature: f64) -> AnnealedSplitter {
        AnnealedSplitter {
            num_features: usize::MAX,
            min_instances,
            temperature,
        }
    }

    fn node_stats(data: &Dataset, weights: &[f64]) -> (f64, f64, f64) {
        let total_sum: f64 = (0..data.n_samples())
            .map(|i| data.labels().numeric(i) * weights[i])
            .sum();
        let total_weight: f64 = weights.iter().sum();
        let mean = total_sum / total_weight;
        let total_variance: f64 = (0..data.n_samples())
            .map(|i| {
                let d = data.labels().numeric(i) - mean;
                weights[i] * d * d
            })
            .sum::<f64>()
            / total_weight;
        (total_sum, total_weight, total_variance)
    }

    fn choose(
        data: &Dataset,
        min_instances: usize,
        temperature: f64,
        seed: u64,
    ) -> Option<SplitRule> {
        let weights = vec![1.0; data.n_samples()];
        let indices: Vec<usize> = (0..data.n_samples()).collect();
        let (total_sum, total_weight, total_variance) = node_stats(data, &weights);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        splitter(min_instances, temperature)
            .choose_split(
                data,
                &indices,
                &weights,
                total_sum,
                total_weight,
                total_variance,
                &mut rng,
            )
            .unwrap()
            .map(|c| c.rule)
    }

    #[test]
    fn cold_draw_finds_the_gap() {
        // Obvious gap between 3.0 and 10.0; near-zero temperature must place
        // the pivot there every time.
        let data = Dataset::from_real(
            vec![
                vec![1.0],
                vec![2.0],
                vec![3.0],
                vec![10.0],
                vec![11.0],
                vec![12.0],
            ],
            vec![1.0, 1.1, 0.9, 5.0, 5.1, 4.9],
        )
        .unwrap();
        for seed in 0..50 {
            let rule = choose(&data, 1, 1e-9, seed).expect("split must exist");
            match rule {
                SplitRule::Real { threshold, .. } => {
                    assert!((threshold - 6.5).abs() < 1e-12, "threshold {threshold}");
                }
                SplitRule::Categorical { .. } => panic!("expected a real split"),
            }
        }
    }

    #[test]
    fn no_pivot_inside_tie_runs() {
        // Distinct values only at 1.0|2.0 and 2.0|3.0; every legal pivot is a
        // midpoint between distinct values, regardless of seed.
        let data = Dataset::from_real(
            vec![
                vec![1.0],
                vec![1.0],
                vec![2.0],
                vec![2.0],
                vec![2.0],
                vec![3.0],
            ],
            vec![0.0, 0.1, 1.0, 1.1, 0.9, 2.0],
        )
        .unwrap();
        for seed in 0..200 {
            let rule = choose(&data, 1, 10.0, seed).expect("split must exist");
            match rule {
                SplitRule::Real { threshold, .. } => {
                    let legal = (threshold - 1.5).abs() < 1e-12 || (threshold - 2.5).abs() < 1e-12;
                    assert!(legal, "pivot {threshold} landed inside a tie-run");
                }
                SplitRule::Categorical { .. } => panic!("expected a real split"),
            }
        }
    }

    #[test]
    fn min_instances_excludes_narrow_partitions() {
        let data = Dataset::from_real(
            vec![vec![1.0], vec![2.0], vec![3.0], vec![4.0]],
            vec![0.0, 0.0, 0.0, 10.0],
        )
        .unwrap();
        // min_instances = 2 leaves only the 2|2 boundary eligible.
        for seed in 0..50 {
            let rule = choose(&data, 2, 1.0, seed).expect("split must exist");
            match rule {
                SplitRule::Real { threshold, .. } => {
                    assert!((threshold - 2.5).abs() < 1e-12);
                }
                SplitRule::Categorical { .. } => panic!("expected a real split"),
            }
        }
    }

    #[test]
    fn constant_feature_yields_no_split() {
        let data = Dataset::from_real(
            vec![vec![5.0], vec![5.0], vec![5.0], vec![5.0]],
            vec![0.0, 1.0, 0.0, 1.0],
        )
        .unwrap();
        assert!(choose(&data, 1, 1.0, 7).is_none());
    }

    #[test]
    fn categorical_split_is_mean_ordered_prefix() {
        // Three categories with means 0.0 (cat 2), 5.0 (cat 0), 9.0 (cat 1).
        // Any chosen include-set must be a contiguous prefix of the
        // mean-ordered sequence [2, 0, 1]: {2} or {2, 0}.
        let rows: Vec<Vec<FeatureValue>> = [
            (2u32, 0.0),
            (2, 0.2),
            (2, -0.2),
            (0, 5.0),
            (0, 5.2),
            (0, 4.8),
            (1, 9.0),
            (1, 9.1),
            (1, 8.9),
        ]
        .iter()
        .map(|&(c, _)| vec![FeatureValue::Category(c)])
        .collect();
        let labels: Vec<f64> = [
            (2u32, 0.0),
            (2, 0.2),
            (2, -0.2),
            (0, 5.0),
            (0, 5.2),
            (0, 4.8),
            (1, 9.0),
            (1, 9.1),
            (1, 8.9),
        ]
        .iter()
        .map(|&(_, y)| y)
        .collect();
        let data = Dataset::new(rows, Labels::Real(labels)).unwrap();

        for seed in 0..200 {
            let rule = choose(&data, 1, 10.0, seed).expect("split must exist");
            match rule {
                SplitRule::Categorical { include, .. } => {
                    assert!(
                        include == vec![2] || include == vec![0, 2],
                        "include {include:?} is not a mean-ordered prefix"
                    );
                }
                SplitRule::Real { .. } => panic!("expected a categorical split"),
            }
        }
    }

    #[test]
    fn singleton_dominated_categorical_excluded() {
        // Five categories, four of them singletons: 4/7 of the weight sits in
        // trivial groups, so the feature must lose the draw entirely.
        let rows: Vec<Vec<FeatureValue>> = [0u32, 0, 0, 1, 2, 3, 4]
            .iter()
            .map(|&c| vec![FeatureValue::Category(c)])
            .collect();
        let data =
            Dataset::new(rows, Labels::Real(vec![0.0, 0.1, -0.1, 5.0, 6.0, 7.0, 8.0])).unwrap();
        assert!(choose(&data, 1, 1.0, 3).is_none());
    }

    #[test]
    fn hot_draw_approaches_uniform() {
        // Labels increase linearly, so boundary quality varies; at extreme
        // temperature every eligible boundary must still be selected with
        // roughly equal frequency.
        let data = Dataset::from_real(
            (0..8).map(|i| vec![i as f64]).collect(),
            (0..8).map(|i| i as f64).collect(),
        )
        .unwrap();
        let mut counts = std::collections::HashMap::new();
        let trials = 7000;
        for seed in 0..trials {
            let rule = choose(&data, 1, 1e9, seed).expect("split must exist");
            if let SplitRule::Real { threshold, .. } = rule {
                *counts.entry(format!("{threshold:.1}")).or_insert(0usize) += 1;
            }
        }
        assert_eq!(counts.len(), 7, "all 7 boundaries reachable: {counts:?}");
        let expected = trials as f64 / 7.0;
        for (pivot, &count) in &counts {
            assert!(
                (count as f64 - expected).abs() < expected * 0.25,
                "pivot {pivot} drawn {count} times, expected ~{expected}"
            );
        }
    }

    #[test]
    fn cold_draw_is_deterministically_greedy() {
        // With near-zero temperature, repeated draws over many seeds always
        // select the brute-force best boundary.
        let labels = vec![0.4, 0.1, 0.6, 3.9, 4.2, 4.0, 9.1, 9.3];
        let data = Dataset::from_real(
            (0..8).map(|i| vec![i as f64]).collect(),
            labels.clone(),
        )
        .unwrap();

        // Brute-force best boundary by total within-partition variance.
        let mut best = (0usize, f64::INFINITY);
        for cut in 1..8 {
            let (l, r) = labels.split_at(cut);
            let var = |s: &[f64]| {
                let m = s.iter().sum::<f64>() / s.len() as f64;
                s.iter().map(|y| (y - m) * (y - m)).sum::<f64>()
            };
            let total = var(l) + var(r);
            if total < best.1 {
                best = (cut, total);
            }
        }
        let best_pivot = best.0 as f64 - 0.5;

        for seed in 0..100 {
            let rule = choose(&data, 1, 1e-9, seed).expect("split must exist");
            if let SplitRule::Real { threshold, .. } = rule {
                assert!(
                    (threshold - best_pivot).abs() < 1e-12,
                    "cold draw picked {threshold}, greedy best is {best_pivot}"
                );
            }
        }
    }

    #[test]
    fn large_label_magnitudes_stay_finite() {
        // Means around 1e6 with unit variance would overflow a naive
        // exp(-rel_var·β); the shifted evaluation must still find the gap.
        let data = Dataset::from_real(
            vec![
                vec![1.0],
                vec![2.0],
                vec![3.0],
                vec![10.0],
                vec![11.0],
                vec![12.0],
            ],
            vec![1e6, 1e6 + 1.0, 1e6 - 1.0, 2e6, 2e6 + 1.0, 2e6 - 1.0],
        )
        .unwrap();
        let rule = choose(&data, 1, 1e-3, 11).expect("split must exist");
        match rule {
            SplitRule::Real { threshold, .. } => {
                assert!((threshold - 6.5).abs() < 1e-9, "threshold {threshold}");
            }
            SplitRule::Categorical { .. } => panic!("expected a real split"),
        }
    }

    #[test]
    fn weighted_draw_zero_total_is_none() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(weighted_draw(&mut rng, &[0.0, 0.0]).is_none());
        assert!(weighted_draw(&mut rng, &[]).is_none());
    }

    #[test]
    fn weighted_draw_skips_zero_weights() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for _ in 0..100 {
            let picked = weighted_draw(&mut rng, &[0.0, 1.0, 0.0]).unwrap();
            assert_eq!(picked, 1);
        }
    }
}
