//! Online Multiple Instance Learning boosting.
//!
//! Every feature in the pool gets an [`OnlineStump`]: a pair of Gaussians (object and background)
//! whose parameters are blended towards the statistics of each new batch of samples. [`MilBoost`]
//! then greedily selects the stumps that best explain the latest batch, treating the positive
//! samples as one *bag* of which at least one should be the object.

use crate::{
    filter::{Ema, EmaState, Filter},
    iter::zip_exact,
    num::{sigmoid, TotalF32},
};

use super::haar::FeatureMatrix;

/// Lower bound for class variances. Keeps the log-likelihoods finite when a feature is constant
/// across a batch.
const MIN_VARIANCE: f32 = 1e-4;

/// Guards the bag likelihood against `ln(0)`.
const LIKELIHOOD_EPS: f32 = 1e-5;

/// Gaussian class-conditional model of one feature.
#[derive(Debug, Clone)]
pub struct OnlineStump {
    feature: usize,
    ema: Ema,
    /// Indexed by `[background, object]`.
    mean: [EmaState; 2],
    variance: [EmaState; 2],
}

impl OnlineStump {
    /// Creates an untrained stump for `feature`.
    ///
    /// `learning_rate` is the weight kept by the old statistics on each update (0.85 keeps 85%).
    pub fn new(feature: usize, learning_rate: f32) -> Self {
        Self {
            feature,
            ema: Ema::new(1.0 - learning_rate),
            mean: Default::default(),
            variance: Default::default(),
        }
    }

    #[inline]
    pub fn feature(&self) -> usize {
        self.feature
    }

    /// Blends the statistics of a new batch of feature values into the model.
    ///
    /// The first batch for a class sets its mean and variance directly. A class with no samples in
    /// the batch keeps its previous statistics.
    pub fn update(&mut self, positives: &[f32], negatives: &[f32]) {
        for (class, values) in [(0, negatives), (1, positives)] {
            if values.is_empty() {
                continue;
            }
            let n = values.len() as f64;
            let batch_mean = values.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
            let mean = f64::from(self.ema.filter(&mut self.mean[class], batch_mean as f32));
            let spread = values
                .iter()
                .map(|&v| (f64::from(v) - mean).powi(2))
                .sum::<f64>()
                / n;
            self.ema.filter(&mut self.variance[class], spread as f32);
        }
    }

    fn log_likelihood(&self, class: usize, x: f32) -> Option<f32> {
        let mean = self.mean[class].value()?;
        let var = self.variance[class].value()?.max(MIN_VARIANCE);
        Some(-(x - mean) * (x - mean) / (2.0 * var) - 0.5 * var.ln())
    }

    /// Returns the log-odds of `x` belonging to the object rather than to the background.
    ///
    /// Returns 0 until both classes have seen at least one sample.
    pub fn log_odds(&self, x: f32) -> f32 {
        match (self.log_likelihood(1, x), self.log_likelihood(0, x)) {
            (Some(object), Some(background)) => object - background,
            _ => 0.0,
        }
    }
}

/// Strong classifier made of greedily selected [`OnlineStump`]s.
#[derive(Debug, Clone)]
pub struct MilBoost {
    stumps: Vec<OnlineStump>,
    selected: Vec<usize>,
    num_selected: usize,
}

impl MilBoost {
    /// Creates a booster over `num_features` features that will select `num_selected` of them.
    pub fn new(num_features: usize, num_selected: usize, learning_rate: f32) -> Self {
        assert!(
            num_selected <= num_features,
            "cannot select {num_selected} out of {num_features} features"
        );
        Self {
            stumps: (0..num_features)
                .map(|feature| OnlineStump::new(feature, learning_rate))
                .collect(),
            selected: Vec::with_capacity(num_selected),
            num_selected,
        }
    }

    /// Returns the indices of the currently selected features.
    pub fn selected(&self) -> &[usize] {
        &self.selected
    }

    /// Trains all stumps on a new batch and reselects the strong classifier.
    ///
    /// `positives` and `negatives` must have been computed with the same feature pool that this
    /// booster was created for.
    pub fn update(&mut self, positives: &FeatureMatrix, negatives: &FeatureMatrix) {
        for stump in &mut self.stumps {
            stump.update(
                positives.column(stump.feature),
                negatives.column(stump.feature),
            );
        }

        // Each stump's prediction on each sample, computed once for all selection rounds.
        let predict = |matrix: &FeatureMatrix| -> Vec<Vec<f32>> {
            self.stumps
                .iter()
                .map(|stump| {
                    matrix
                        .column(stump.feature)
                        .iter()
                        .map(|&x| stump.log_odds(x))
                        .collect()
                })
                .collect()
        };
        let pos_pred = predict(positives);
        let neg_pred = predict(negatives);

        let mut pos_strong = vec![0.0; positives.num_samples()];
        let mut neg_strong = vec![0.0; negatives.num_samples()];
        self.selected.clear();
        for _ in 0..self.num_selected {
            let best = (0..self.stumps.len())
                .filter(|i| !self.selected.contains(i))
                .min_by_key(|&i| {
                    TotalF32(bag_loss(&pos_strong, &pos_pred[i], &neg_strong, &neg_pred[i]))
                });
            let Some(best) = best else { break };

            self.selected.push(best);
            for (strong, weak) in zip_exact(&mut pos_strong, &pos_pred[best]) {
                *strong += weak;
            }
            for (strong, weak) in zip_exact(&mut neg_strong, &neg_pred[best]) {
                *strong += weak;
            }
        }

        log::trace!("selected features: {:?}", self.selected);
    }

    /// Scores a sample as the summed log-odds of the selected stumps.
    ///
    /// `feature_value` is called once for each selected feature index.
    pub fn score(&self, mut feature_value: impl FnMut(usize) -> f32) -> f32 {
        self.selected
            .iter()
            .map(|&i| {
                let stump = &self.stumps[i];
                stump.log_odds(feature_value(stump.feature))
            })
            .sum()
    }
}

/// Negative log-likelihood of the current batch when `weak` is added to `strong`.
///
/// The positive samples form a single bag, which is likely if *any* of its samples is likely.
fn bag_loss(pos_strong: &[f32], pos_weak: &[f32], neg_strong: &[f32], neg_weak: &[f32]) -> f32 {
    let mut loss = 0.0;
    if !pos_strong.is_empty() {
        let all_background: f32 = zip_exact(pos_strong, pos_weak)
            .map(|(h, w)| 1.0 - sigmoid(h + w))
            .product();
        loss -= (1.0 - all_background + LIKELIHOOD_EPS).ln();
    }
    for (h, w) in zip_exact(neg_strong, neg_weak) {
        loss -= (LIKELIHOOD_EPS + 1.0 - sigmoid(h + w)).ln();
    }
    loss
}
