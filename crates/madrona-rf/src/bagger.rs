//! Bootstrap-aggregated ensemble training with parallel tree fits.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{debug, info, instrument};

use crate::cancel::CancelToken;
use crate::data::{Dataset, Labels};
use crate::error::ForestError;
use crate::importance::aggregate_importances;
use crate::learner::Learner;
use crate::model::BaggedModel;
use crate::oob::estimate_oob;
use crate::result::{BaggedTrainingResult, TrainingMetadata};

/// Ensemble trainer: fits `num_bags` models on independent bootstrap
/// resamples of the training set, in parallel, and assembles the fitted
/// ensemble with out-of-bag statistics and feature importances.
///
/// Construct via [`Bagger::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter      | Default |
/// |----------------|---------|
/// | `bag_fraction` | 1.0     |
/// | `seed`         | 42      |
/// | `bias_learner` | `None`  |
#[derive(Debug, Clone)]
pub struct Bagger<L: Learner, B: Learner = L> {
    learner: L,
    num_bags: usize,
    bag_fraction: f64,
    seed: u64,
    bias_learner: Option<B>,
}

impl<L: Learner> Bagger<L, L> {
    /// Create a new bagger around `learner` training `num_bags` models.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::InvalidBagCount`] if `num_bags` is zero.
    pub fn new(learner: L, num_bags: usize) -> Result<Self, ForestError> {
        if num_bags == 0 {
            return Err(ForestError::InvalidBagCount { num_bags });
        }
        Ok(Self {
            learner,
            num_bags,
            bag_fraction: 1.0,
            seed: 42,
            bias_learner: None,
        })
    }
}

impl<L: Learner, B: Learner> Bagger<L, B> {
    /// Set the fraction of the training set drawn (with replacement) per bag.
    #[must_use]
    pub fn with_bag_fraction(mut self, bag_fraction: f64) -> Self {
        self.bag_fraction = bag_fraction;
        self
    }

    /// Set the random seed for reproducibility.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Attach a secondary learner fit on out-of-bag residual magnitudes;
    /// its predictions are folded into reported regression uncertainty.
    #[must_use]
    pub fn with_bias_learner<B2: Learner>(self, bias_learner: B2) -> Bagger<L, B2> {
        Bagger {
            learner: self.learner,
            num_bags: self.num_bags,
            bag_fraction: self.bag_fraction,
            seed: self.seed,
            bias_learner: Some(bias_learner),
        }
    }

    /// Return the ensemble size.
    #[must_use]
    pub fn num_bags(&self) -> usize {
        self.num_bags
    }

    /// Return the bag fraction.
    #[must_use]
    pub fn bag_fraction(&self) -> f64 {
        self.bag_fraction
    }

    /// Return the random seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Train the ensemble to completion.
    ///
    /// Equivalent to [`Bagger::fit_cancellable`] with a token nobody cancels.
    ///
    /// # Errors
    ///
    /// See [`Bagger::fit_cancellable`].
    pub fn fit(
        &self,
        data: &Dataset,
    ) -> Result<BaggedTrainingResult<L::Model, B::Model>, ForestError> {
        self.fit_cancellable(data, &CancelToken::new())
    }

    /// Train the ensemble, observing `cancel` between and within tree fits.
    ///
    /// Tree fits run in parallel on the rayon pool; each fit owns its bag
    /// and RNG, and shares the dataset read-only. A set token makes queued
    /// fits return immediately and in-flight fits abort at their next node
    /// expansion, so the call drains within a small bounded time and returns
    /// [`ForestError::Cancelled`] — never a partially trained model.
    ///
    /// # Errors
    ///
    /// | Variant | When |
    /// |---|---|
    /// | [`ForestError::InvalidBagFraction`] | `bag_fraction` outside (0.0, 1.0] |
    /// | [`ForestError::Cancelled`] | the token was set before completion |
    /// | Learner errors | propagated from the underlying fits |
    #[instrument(skip_all, fields(num_bags = self.num_bags, n_samples = data.n_samples()))]
    pub fn fit_cancellable(
        &self,
        data: &Dataset,
        cancel: &CancelToken,
    ) -> Result<BaggedTrainingResult<L::Model, B::Model>, ForestError> {
        if !(self.bag_fraction > 0.0 && self.bag_fraction <= 1.0) {
            return Err(ForestError::InvalidBagFraction {
                fraction: self.bag_fraction,
            });
        }
        let n_samples = data.n_samples();
        let draw_count = ((n_samples as f64) * self.bag_fraction).ceil() as usize;

        info!(
            num_bags = self.num_bags,
            n_samples,
            n_features = data.n_features(),
            draw_count,
            "training bagged ensemble"
        );

        // Independent per-fit seeds from the master RNG.
        let mut master_rng = ChaCha8Rng::seed_from_u64(self.seed);
        let fit_seeds: Vec<(u64, u64)> = (0..self.num_bags)
            .map(|_| (master_rng.r#gen(), master_rng.r#gen()))
            .collect();
        let bias_seed: u64 = master_rng.r#gen();

        let fits: Result<Vec<(L::Model, Vec<f64>)>, ForestError> = fit_seeds
            .into_par_iter()
            .map(|(bag_seed, model_seed)| {
                if cancel.is_cancelled() {
                    return Err(ForestError::Cancelled);
                }
                let mut rng = ChaCha8Rng::seed_from_u64(bag_seed);
                let bag = draw_bag(n_samples, draw_count, &mut rng);
                let model = self.learner.train(data, &bag, model_seed, cancel)?;
                Ok((model, bag))
            })
            .collect();
        let fits = fits?;
        if cancel.is_cancelled() {
            return Err(ForestError::Cancelled);
        }

        let mut models = Vec::with_capacity(self.num_bags);
        let mut bags = Vec::with_capacity(self.num_bags);
        for (model, bag) in fits {
            models.push(model);
            bags.push(bag);
        }

        debug!(n_models = models.len(), "ensemble fits complete");

        let oob = estimate_oob(&models, &bags, data)?;

        // The bias learner sees (features -> |OOB residual|) with uncovered
        // examples weighted out.
        let bias_model = match (&self.bias_learner, &oob.residual_magnitudes) {
            (Some(bias_learner), Some(residuals)) if oob.n_covered > 0 => {
                let bias_data =
                    Dataset::new(data.rows().to_vec(), Labels::Real(residuals.clone()))?;
                let bias_weights: Vec<f64> = oob
                    .covered
                    .iter()
                    .map(|&c| if c { 1.0 } else { 0.0 })
                    .collect();
                Some(bias_learner.train(&bias_data, &bias_weights, bias_seed, cancel)?)
            }
            _ => None,
        };

        let per_model: Vec<Vec<f64>> = models
            .iter()
            .map(crate::learner::Model::feature_reductions)
            .collect();
        let importances = aggregate_importances(&per_model, data.feature_names());

        let metadata = TrainingMetadata {
            num_bags: self.num_bags,
            n_samples,
            n_features: data.n_features(),
            draw_count,
        };

        info!(
            oob_loss = oob.loss,
            n_covered = oob.n_covered,
            "bagged ensemble training complete"
        );

        let model = BaggedModel::new(models, bags, bias_model, data.n_features());
        Ok(BaggedTrainingResult::new(model, importances, oob, metadata))
    }
}

/// Draw one bootstrap multiplicity vector: `draw_count` draws with
/// replacement over the training indices.
fn draw_bag(n_samples: usize, draw_count: usize, rng: &mut impl Rng) -> Vec<f64> {
    let mut bag = vec![0.0; n_samples];
    for _ in 0..draw_count {
        bag[rng.gen_range(0..n_samples)] += 1.0;
    }
    bag
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::{Bagger, draw_bag};
    use crate::cancel::CancelToken;
    use crate::data::Dataset;
    use crate::error::ForestError;
    use crate::tree::TreeConfig;

    fn make_linear(n: usize) -> Dataset {
        Dataset::from_real(
            (0..n).map(|i| vec![i as f64]).collect(),
            (0..n).map(|i| 2.0 * i as f64).collect(),
        )
        .unwrap()
    }

    #[test]
    fn bag_preserves_draw_count() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let bag = draw_bag(100, 100, &mut rng);
        let total: f64 = bag.iter().sum();
        assert!((total - 100.0).abs() < 1e-12);
        // Roughly 1/e of the indices should be left out of the bag.
        let n_out = bag.iter().filter(|&&w| w == 0.0).count();
        assert!((20..=55).contains(&n_out), "{n_out} out-of-bag of 100");
    }

    #[test]
    fn zero_bags_rejected() {
        assert!(matches!(
            Bagger::new(TreeConfig::new(), 0).unwrap_err(),
            ForestError::InvalidBagCount { num_bags: 0 }
        ));
    }

    #[test]
    fn invalid_bag_fraction_rejected() {
        let data = make_linear(16);
        let bagger = Bagger::new(TreeConfig::new(), 4)
            .unwrap()
            .with_bag_fraction(1.5);
        assert!(matches!(
            bagger.fit(&data).unwrap_err(),
            ForestError::InvalidBagFraction { .. }
        ));
    }

    #[test]
    fn deterministic_with_same_seed() {
        let data = make_linear(48);
        let fit = |seed| {
            Bagger::new(TreeConfig::new(), 12)
                .unwrap()
                .with_seed(seed)
                .fit(&data)
                .unwrap()
        };
        let r1 = fit(7);
        let r2 = fit(7);
        let p1 = r1.model().predict(data.rows()).unwrap();
        let p2 = r2.model().predict(data.rows()).unwrap();
        for (a, b) in p1.expected().iter().zip(p2.expected()) {
            assert_eq!(a.value(), b.value());
        }
        assert_eq!(r1.oob().loss, r2.oob().loss);
    }

    #[test]
    fn pre_cancelled_fit_reports_cancelled() {
        let data = make_linear(64);
        let token = CancelToken::new();
        token.cancel();
        let err = Bagger::new(TreeConfig::new(), 16)
            .unwrap()
            .fit_cancellable(&data, &token)
            .unwrap_err();
        assert!(matches!(err, ForestError::Cancelled));
    }

    #[test]
    fn importances_cover_all_features() {
        let data = Dataset::from_real(
            (0..40).map(|i| vec![i as f64, 0.5]).collect(),
            (0..40).map(|i| i as f64).collect(),
        )
        .unwrap();
        let result = Bagger::new(TreeConfig::new(), 16)
            .unwrap()
            .with_seed(3)
            .fit(&data)
            .unwrap();
        assert_eq!(result.importances().len(), 2);
        // The informative feature must dominate.
        assert_eq!(result.importances()[0].name, "f0");
        assert!(result.importances()[0].relative > 0.9);
    }
}
