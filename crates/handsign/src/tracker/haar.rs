//! Randomized Haar-like features.

use fastrand::Rng;
use handsign_image::{Rect, Resolution};

use super::integral::IntegralImage;

const MIN_RECTS: usize = 2;
const MAX_RECTS: usize = 6;

/// A weighted sum of rectangle means, positioned relative to a patch's top left corner.
#[derive(Debug, Clone)]
pub struct HaarFeature {
    rects: Vec<(Rect, f32)>,
}

impl HaarFeature {
    /// Generates a feature with 2 to 6 random rectangles inside a `patch`-sized area.
    ///
    /// Each rectangle gets a weight in `[-1, 1]`.
    pub fn random(patch: Resolution, rng: &mut Rng) -> Self {
        let (w, h) = (patch.width(), patch.height());
        assert!(w > 0 && h > 0, "cannot place features in an empty {patch} patch");

        let count = rng.usize(MIN_RECTS..=MAX_RECTS);
        let rects = (0..count)
            .map(|_| {
                let x = rng.u32(0..=w.saturating_sub(3));
                let y = rng.u32(0..=h.saturating_sub(3));
                let max_w = w.saturating_sub(x + 2).max(1).min(w - x);
                let max_h = h.saturating_sub(y + 2).max(1).min(h - y);
                let rect = Rect::from_top_left(
                    x as i32,
                    y as i32,
                    rng.u32(1..=max_w),
                    rng.u32(1..=max_h),
                );
                let weight = rng.f32() * 2.0 - 1.0;
                (rect, weight)
            })
            .collect();
        Self { rects }
    }

    /// Evaluates the feature on the patch whose top left corner is at `origin`.
    pub fn evaluate(&self, integral: &IntegralImage, origin: (i32, i32)) -> f32 {
        self.rects
            .iter()
            .map(|(rect, weight)| weight * integral.rect_mean(rect.move_by(origin.0, origin.1)))
            .sum()
    }
}

/// The fixed set of features a tracker describes its patches with.
///
/// A pool is generated once per tracking session, for one patch size.
#[derive(Debug, Clone)]
pub struct FeaturePool {
    patch: Resolution,
    features: Vec<HaarFeature>,
}

impl FeaturePool {
    pub fn random(patch: Resolution, count: usize, rng: &mut Rng) -> Self {
        Self {
            patch,
            features: (0..count).map(|_| HaarFeature::random(patch, rng)).collect(),
        }
    }

    #[inline]
    pub fn patch(&self) -> Resolution {
        self.patch
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Evaluates a single feature of the pool on the patch at `origin`.
    #[inline]
    pub fn evaluate(&self, feature: usize, integral: &IntegralImage, origin: (i32, i32)) -> f32 {
        self.features[feature].evaluate(integral, origin)
    }

    /// Evaluates every feature on every sample.
    pub fn matrix(&self, integral: &IntegralImage, samples: &[Rect]) -> FeatureMatrix {
        let mut values = Vec::with_capacity(self.len() * samples.len());
        for feature in &self.features {
            values.extend(
                samples
                    .iter()
                    .map(|sample| feature.evaluate(integral, (sample.x(), sample.y()))),
            );
        }
        FeatureMatrix {
            num_samples: samples.len(),
            values,
        }
    }
}

/// Feature values of a set of samples, stored feature by feature.
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    num_samples: usize,
    values: Vec<f32>,
}

impl FeatureMatrix {
    #[inline]
    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    /// Returns the values of one feature across all samples.
    #[inline]
    pub fn column(&self, feature: usize) -> &[f32] {
        &self.values[feature * self.num_samples..(feature + 1) * self.num_samples]
    }

    #[cfg(test)]
    pub(crate) fn from_columns(columns: &[&[f32]]) -> Self {
        let num_samples = columns.first().map_or(0, |col| col.len());
        assert!(columns.iter().all(|col| col.len() == num_samples));
        Self {
            num_samples,
            values: columns.concat(),
        }
    }
}
