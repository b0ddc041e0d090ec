//! Relative total weighted variance of a two-way partition.

/// Compute the relative total weighted variance of a left/right partition.
///
/// Given the cumulative left-partition weighted label sum and weight, plus
/// the node-wide totals, returns
///
/// `-left_sum²/left_weight - (total_sum - left_sum)²/(total_weight - left_weight)`
///
/// which equals `left_weight·Var(left) + right_weight·Var(right)` minus the
/// node's sum of squared labels. That dropped term is identical for every
/// candidate partition of the same node, so values are only meaningful
/// relative to each other: more negative means lower true variance, i.e. a
/// better split.
///
/// Callers must never evaluate a boundary where either side's weight is zero;
/// the split search's minimum-leaf-count eligibility rules guarantee this.
#[must_use]
pub(crate) fn relative_variance(
    left_sum: f64,
    left_weight: f64,
    total_sum: f64,
    total_weight: f64,
) -> f64 {
    let right_sum = total_sum - left_sum;
    let right_weight = total_weight - left_weight;
    -left_sum * left_sum / left_weight - right_sum * right_sum / right_weight
}
