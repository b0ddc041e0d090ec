//! Feature importance aggregation across the ensemble.

/// A ranked feature with its absolute and relative impurity reduction.
#[derive(Debug, Clone)]
pub struct FeatureImportance {
    /// Feature name.
    pub name: String,
    /// Total impurity reduction attributed to this feature across all trees
    /// and nodes. Non-negative; summing over features gives the model's
    /// total impurity reduction.
    pub total_reduction: f64,
    /// Share of the total reduction (sums to 1.0 when any split occurred).
    pub relative: f64,
    /// 1-based rank (1 = most important).
    pub rank: usize,
}

/// Aggregate per-tree reduction totals into ranked features.
///
/// Sums reductions across trees, sorts descending, and assigns 1-based
/// ranks. Relative shares are zero when no tree made any split.
pub(crate) fn aggregate_importances(
    per_model: &[Vec<f64>],
    names: &[String],
) -> Vec<FeatureImportance> {
    let n_features = names.len();
    let mut totals = vec![0.0f64; n_features];
    for reductions in per_model {
        for (i, &value) in reductions.iter().enumerate() {
            if i < n_features {
                totals[i] += value;
            }
        }
    }
    let sum: f64 = totals.iter().sum();

    let mut features: Vec<FeatureImportance> = names
        .iter()
        .zip(totals.iter())
        .map(|(name, &total_reduction)| FeatureImportance {
            name: name.clone(),
            total_reduction,
            relative: if sum > 0.0 { total_reduction / sum } else { 0.0 },
            rank: 0, // set after sorting
        })
        .collect();

    features.sort_by(|a, b| b.total_reduction.total_cmp(&a.total_reduction));
    for (i, feature) in features.iter_mut().enumerate() {
        feature.rank = i + 1;
    }
    features
}

#[cfg(test)]
mod tests {
    use super::aggregate_importances;

    #[test]
    fn totals_sum_across_models() {
        let per_model = vec![vec![1.0, 3.0], vec![2.0, 0.0]];
        let names = vec!["a".to_string(), "b".to_string()];
        let imp = aggregate_importances(&per_model, &names);
        assert_eq!(imp[0].name, "a");
        assert!((imp[0].total_reduction - 3.0).abs() < 1e-12);
        assert!((imp[1].total_reduction - 3.0).abs() < 1e-12);
        let total: f64 = imp.iter().map(|f| f.relative).sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn ranks_follow_descending_reduction() {
        let per_model = vec![vec![0.5, 4.0, 1.0]];
        let names = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let imp = aggregate_importances(&per_model, &names);
        assert_eq!(imp[0].name, "b");
        assert_eq!(imp[0].rank, 1);
        assert_eq!(imp[2].name, "a");
        assert_eq!(imp[2].rank, 3);
    }

    #[test]
    fn splitless_ensemble_zero_relative() {
        let per_model = vec![vec![0.0, 0.0]];
        let names = vec!["a".to_string(), "b".to_string()];
        let imp = aggregate_importances(&per_model, &names);
        assert!(imp.iter().all(|f| f.relative == 0.0));
    }
}
