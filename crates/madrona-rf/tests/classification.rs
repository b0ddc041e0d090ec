//! Classification through the bagger: plurality vote with averaged class
//! distributions and `1 − max probability` uncertainty.

use madrona_rf::{Bagger, Dataset, FeatureValue, Labels, Prediction, TreeConfig};

/// Three well-separated clusters on feature 0, one per class.
fn make_separable() -> Dataset {
    let mut rows = Vec::new();
    let mut classes = Vec::new();
    for class in 0..3usize {
        for i in 0..20 {
            rows.push(vec![
                FeatureValue::Real(class as f64 * 10.0 + i as f64 * 0.15),
                FeatureValue::Real(0.5),
            ]);
            classes.push(class);
        }
    }
    Dataset::new(rows, Labels::Class { classes, n_classes: 3 }).unwrap()
}

#[test]
fn separable_classes_voted_correctly() {
    let data = make_separable();
    let result = Bagger::new(TreeConfig::new(), 50)
        .unwrap()
        .with_seed(42)
        .fit(&data)
        .unwrap();

    let prediction = result.model().predict(data.rows()).unwrap();
    let mut correct = 0usize;
    for (i, p) in prediction.expected().iter().enumerate() {
        match p {
            Prediction::Class {
                class,
                distribution,
            } => {
                let expected_class = i / 20;
                if *class == expected_class {
                    correct += 1;
                }
                let sum: f64 = distribution.iter().sum();
                assert!((sum - 1.0).abs() < 1e-9, "distribution sums to {sum}");
            }
            Prediction::Real(_) => panic!("expected class predictions"),
        }
    }
    let accuracy = correct as f64 / 60.0;
    assert!(accuracy > 0.9, "vote accuracy {accuracy}");
}

#[test]
fn classification_uncertainty_is_one_minus_max_probability() {
    let data = make_separable();
    let result = Bagger::new(TreeConfig::new(), 50)
        .unwrap()
        .with_seed(42)
        .fit(&data)
        .unwrap();

    let prediction = result.model().predict(data.rows()).unwrap();
    let uncertainty = prediction.uncertainty().expect("50 models give dispersion");
    for (p, &u) in prediction.expected().iter().zip(uncertainty) {
        if let Prediction::Class { distribution, .. } = p {
            let max_prob = distribution.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            assert!((u - (1.0 - max_prob)).abs() < 1e-12);
            assert!((0.0..1.0).contains(&u));
        }
    }
}

#[test]
fn oob_error_rate_low_on_separable_data() {
    let data = make_separable();
    let result = Bagger::new(TreeConfig::new(), 50)
        .unwrap()
        .with_seed(42)
        .fit(&data)
        .unwrap();

    let loss = result.loss().expect("OOB coverage expected with 50 bags");
    assert!(loss < 0.15, "OOB error rate {loss}");
    assert!(result.oob().n_covered > 50);
}
