//! Adaptive region tracking with online Multiple Instance Learning (MIL).
//!
//! The tracker describes fixed-size patches with a pool of random Haar-like features computed on
//! the frame's luma. When tracking starts, it learns to tell the object (patches very close to the
//! reference rectangle) from the background (patches in a ring around it). On every following
//! frame it scores all patches within a search radius of the last position, moves to the best one,
//! and retrains on samples around the new position.
//!
//! Positive samples are treated as a *bag*: training only asks that some patch near the object
//! scores high, not a specific one. This tolerates imprecise localization at the cost of slow drift
//! when the object is consistently mislocated.

mod boost;
mod haar;
mod integral;
mod sampler;

pub use boost::{MilBoost, OnlineStump};
pub use haar::{FeatureMatrix, FeaturePool, HaarFeature};
pub use integral::IntegralImage;
pub use sampler::Sampler;

use fastrand::Rng;
use handsign_image::{Image, Rect, Resolution};
use serde::Deserialize;

use crate::num::{sigmoid, TotalF32};

/// Tuning parameters of a [`MilTracker`].
///
/// Radii are in pixels, measured between the top left corners of patches.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrackerParams {
    /// Radius around the reference rectangle from which positive samples are taken on
    /// initialization.
    pub init_positive_radius: f32,
    /// Number of negative samples taken on initialization (on average).
    pub init_negative_count: usize,
    /// Radius around the last position that is searched for the object on each update.
    pub search_radius: f32,
    /// Radius around the new position from which positive samples are taken after each update.
    pub track_positive_radius: f32,
    /// Number of negative samples taken after each update (on average).
    pub track_negative_count: usize,
    /// Size of the Haar feature pool.
    pub num_features: usize,
    /// Number of features the strong classifier is made of.
    pub num_selected: usize,
    /// Weight kept by the old class statistics on each update.
    pub learning_rate: f32,
    /// Minimum confidence (sigmoid of the best patch score) for an update to count as successful.
    pub confidence_threshold: f32,
    /// Seed for sampling and feature generation. Every (re)initialization starts from this seed.
    pub seed: u64,
}

impl Default for TrackerParams {
    fn default() -> Self {
        Self {
            init_positive_radius: 3.0,
            init_negative_count: 65,
            search_radius: 25.0,
            track_positive_radius: 4.0,
            track_negative_count: 65,
            num_features: 250,
            num_selected: 50,
            learning_rate: 0.85,
            confidence_threshold: 0.5,
            seed: 0,
        }
    }
}

impl TrackerParams {
    /// Checks that the parameters describe a usable tracker.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.num_selected == 0 || self.num_selected > self.num_features {
            anyhow::bail!(
                "`num_selected` must be between 1 and `num_features` ({}), got {}",
                self.num_features,
                self.num_selected
            );
        }
        if !(0.0..1.0).contains(&self.learning_rate) {
            anyhow::bail!("`learning_rate` must be in [0, 1), got {}", self.learning_rate);
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            anyhow::bail!(
                "`confidence_threshold` must be in [0, 1], got {}",
                self.confidence_threshold
            );
        }
        for (name, radius) in [
            ("init_positive_radius", self.init_positive_radius),
            ("search_radius", self.search_radius),
            ("track_positive_radius", self.track_positive_radius),
        ] {
            if !(radius > 0.0) {
                anyhow::bail!("`{name}` must be positive, got {radius}");
            }
        }
        Ok(())
    }
}

/// Result of a [`MilTracker::update`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackOutcome {
    /// The tracker's estimate of the object's location. Unchanged from the previous estimate when
    /// `ok` is `false`.
    pub rect: Rect,
    /// Sigmoid of the best patch score, in `[0, 1]`.
    pub confidence: f32,
    /// Whether `confidence` reached the configured threshold.
    pub ok: bool,
}

/// An online MIL tracker following a single rectangle.
pub struct MilTracker {
    params: TrackerParams,
    rng: Rng,
    model: Option<Model>,
}

/// Appearance model of one tracking session.
struct Model {
    frame: Resolution,
    rect: Rect,
    pool: FeaturePool,
    boost: MilBoost,
}

impl MilTracker {
    pub fn new(params: TrackerParams) -> Self {
        Self {
            rng: Rng::with_seed(params.seed),
            params,
            model: None,
        }
    }

    pub fn params(&self) -> &TrackerParams {
        &self.params
    }

    /// Returns the current estimate, or [`None`] if the tracker is not initialized.
    pub fn rect(&self) -> Option<Rect> {
        self.model.as_ref().map(|m| m.rect)
    }

    pub fn is_initialized(&self) -> bool {
        self.model.is_some()
    }

    /// Discards the appearance model.
    pub fn reset(&mut self) {
        self.model = None;
    }

    /// Starts tracking `rect` in `frame`, discarding any previous model.
    ///
    /// Parts of `rect` outside of the frame are clipped off. Fails if `rect` is empty, lies
    /// entirely outside the frame, or is too large to take any training samples around.
    pub fn initialize(&mut self, frame: &Image, rect: Rect) -> anyhow::Result<()> {
        self.model = None;
        if rect.is_empty() {
            anyhow::bail!("cannot track empty rectangle {:?}", rect);
        }
        let rect = frame.rect().intersection(&rect).ok_or_else(|| {
            anyhow::anyhow!(
                "{:?} lies outside of the {} frame",
                rect,
                frame.resolution()
            )
        })?;

        self.rng = Rng::with_seed(self.params.seed);
        let patch = Resolution::new(rect.width(), rect.height());
        let integral = IntegralImage::new(frame);
        let sampler = Sampler::new(frame.resolution(), patch);
        let origin = (rect.x(), rect.y());

        let positives = sampler.sample(
            origin,
            0.0,
            self.params.init_positive_radius,
            usize::MAX,
            &mut self.rng,
        );
        if positives.is_empty() {
            anyhow::bail!("no training samples fit around {:?}", rect);
        }
        let negatives = sampler.sample(
            origin,
            1.5 * self.params.init_positive_radius,
            2.0 * self.params.search_radius,
            self.params.init_negative_count,
            &mut self.rng,
        );

        let pool = FeaturePool::random(patch, self.params.num_features, &mut self.rng);
        let mut boost = MilBoost::new(
            pool.len(),
            self.params.num_selected,
            self.params.learning_rate,
        );
        boost.update(
            &pool.matrix(&integral, &positives),
            &pool.matrix(&integral, &negatives),
        );

        log::debug!(
            "tracker initialized at {:?} ({} positive, {} negative samples)",
            rect,
            positives.len(),
            negatives.len()
        );

        self.model = Some(Model {
            frame: frame.resolution(),
            rect,
            pool,
            boost,
        });
        Ok(())
    }

    /// Locates the object in the next frame and updates the appearance model.
    ///
    /// A low-confidence match is not an error: it is reported with `ok: false`, the estimate stays
    /// where it was, and the model is not trained on that frame. Errors are reserved for misuse:
    /// calling this before [`MilTracker::initialize`], or with a frame of a different size.
    pub fn update(&mut self, frame: &Image) -> anyhow::Result<TrackOutcome> {
        let params = &self.params;
        let rng = &mut self.rng;
        let model = self
            .model
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("tracker update called before initialization"))?;
        if frame.resolution() != model.frame {
            anyhow::bail!(
                "frame size changed from {} to {} during tracking",
                model.frame,
                frame.resolution()
            );
        }

        let integral = IntegralImage::new(frame);
        let sampler = Sampler::new(model.frame, model.pool.patch());
        let previous = model.rect;
        let origin = (previous.x(), previous.y());

        let candidates = sampler.sample(origin, 0.0, params.search_radius, usize::MAX, rng);
        let best = candidates
            .iter()
            .map(|c| {
                let score = model
                    .boost
                    .score(|f| model.pool.evaluate(f, &integral, (c.x(), c.y())));
                let dist = (c.x() - origin.0).pow(2) + (c.y() - origin.1).pow(2);
                (c, score, dist)
            })
            // Highest score wins; equal scores go to the candidate closest to the last position.
            .max_by_key(|&(_, score, dist)| (TotalF32(score), std::cmp::Reverse(dist)));

        let Some((&found, score, _)) = best else {
            log::trace!("no candidates around {:?}", previous);
            return Ok(TrackOutcome {
                rect: previous,
                confidence: 0.0,
                ok: false,
            });
        };

        let confidence = sigmoid(score);
        let ok = confidence >= params.confidence_threshold;
        log::trace!(
            "best candidate {:?} (score {score}, confidence {confidence}, ok={ok})",
            found
        );
        if !ok {
            return Ok(TrackOutcome {
                rect: previous,
                confidence,
                ok,
            });
        }

        model.rect = found;
        let origin = (found.x(), found.y());
        let positives = sampler.sample(origin, 0.0, params.track_positive_radius, usize::MAX, rng);
        let negatives = sampler.sample(
            origin,
            params.track_positive_radius + 5.0,
            1.5 * params.search_radius,
            params.track_negative_count,
            rng,
        );
        model.boost.update(
            &model.pool.matrix(&integral, &positives),
            &model.pool.matrix(&integral, &negatives),
        );

        Ok(TrackOutcome {
            rect: found,
            confidence,
            ok,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test;

    const REFERENCE: Rect = Rect::from_top_left(200, 150, 100, 100);

    #[test]
    fn static_scene_stays_put() {
        let frame = test::textured_frame();
        let mut tracker = MilTracker::new(TrackerParams::default());
        tracker.initialize(frame, REFERENCE).unwrap();
        assert_eq!(tracker.rect(), Some(REFERENCE));

        for _ in 0..3 {
            let outcome = tracker.update(frame).unwrap();
            assert!(outcome.ok, "{outcome:?}");
            assert!(outcome.rect.iou(&REFERENCE) >= 0.8, "{outcome:?}");
        }
    }

    #[test]
    fn featureless_scene_stays_put() {
        let frame = test::flat_frame();
        let start = Rect::from_top_left(50, 50, 100, 100);
        let mut tracker = MilTracker::new(TrackerParams::default());
        tracker.initialize(&frame, start).unwrap();

        for _ in 0..3 {
            let outcome = tracker.update(&frame).unwrap();
            assert!(outcome.ok, "{outcome:?}");
            assert_eq!(outcome.confidence, 0.5);
            assert_eq!(outcome.rect, start);
        }
    }

    #[test]
    fn follows_translation() {
        let (dx, dy) = (8, 6);
        let frame = test::textured_frame();
        let moved = test::shifted_frame(dx, dy);
        let mut tracker = MilTracker::new(TrackerParams::default());
        tracker.initialize(frame, REFERENCE).unwrap();

        let outcome = tracker.update(&moved).unwrap();
        assert!(outcome.ok, "{outcome:?}");
        let err_x = outcome.rect.x() - (REFERENCE.x() + dx);
        let err_y = outcome.rect.y() - (REFERENCE.y() + dy);
        assert!(err_x.abs() <= 3 && err_y.abs() <= 3, "{outcome:?}");
    }

    #[test]
    fn deterministic_for_equal_seeds() {
        let frame = test::textured_frame();
        let moved = test::shifted_frame(4, -3);
        let run = || {
            let mut tracker = MilTracker::new(TrackerParams::default());
            tracker.initialize(frame, REFERENCE).unwrap();
            tracker.update(&moved).unwrap()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn initialize_rejects_bad_rects() {
        let frame = test::textured_frame();
        let mut tracker = MilTracker::new(TrackerParams::default());
        assert!(tracker
            .initialize(frame, Rect::from_top_left(10, 10, 0, 20))
            .is_err());
        assert!(tracker
            .initialize(frame, Rect::from_top_left(700, 10, 20, 20))
            .is_err());
        assert!(!tracker.is_initialized());
    }

    #[test]
    fn initialize_clips_partially_outside_rects() {
        let frame = test::textured_frame();
        let mut tracker = MilTracker::new(TrackerParams::default());
        tracker
            .initialize(frame, Rect::from_top_left(-20, -10, 80, 60))
            .unwrap();
        assert_eq!(tracker.rect(), Some(Rect::from_top_left(0, 0, 60, 50)));
    }

    #[test]
    fn reinitialize_discards_model() {
        let frame = test::textured_frame();
        let mut tracker = MilTracker::new(TrackerParams::default());
        tracker.initialize(frame, REFERENCE).unwrap();
        let other = Rect::from_top_left(400, 300, 60, 60);
        tracker.initialize(frame, other).unwrap();
        assert_eq!(tracker.rect(), Some(other));
        let outcome = tracker.update(frame).unwrap();
        assert!(outcome.rect.iou(&other) >= 0.8, "{outcome:?}");
    }

    #[test]
    fn update_requires_initialization() {
        let mut tracker = MilTracker::new(TrackerParams::default());
        assert!(tracker.update(test::textured_frame()).is_err());
    }

    #[test]
    fn params_validation() {
        assert!(TrackerParams::default().validate().is_ok());
        let params = TrackerParams {
            num_selected: 300,
            ..Default::default()
        };
        assert!(params.validate().is_err());
        let params = TrackerParams {
            search_radius: 0.0,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }
}
