//! Candidate patch sampling around a location.

use fastrand::Rng;
use handsign_image::{Rect, Resolution};

/// Samples same-sized patches around a patch location, clipped to the frame.
///
/// Patch positions are the top left corners of the patches. A position is a candidate if its
/// distance `d` from the reference position satisfies `inner_radius <= d < outer_radius`, and the
/// whole patch lies inside the frame.
#[derive(Debug, Clone, Copy)]
pub struct Sampler {
    frame: Resolution,
    patch: Resolution,
}

impl Sampler {
    pub fn new(frame: Resolution, patch: Resolution) -> Self {
        Self { frame, patch }
    }

    /// Samples patches around `origin`.
    ///
    /// If more than `max_count` positions lie inside the search area, each is kept with probability
    /// `max_count / area`, so the number of returned samples is only `max_count` on average. With
    /// `inner_radius = 0` and a large enough `max_count`, every position in the disk is returned.
    pub fn sample(
        &self,
        origin: (i32, i32),
        inner_radius: f32,
        outer_radius: f32,
        max_count: usize,
        rng: &mut Rng,
    ) -> Vec<Rect> {
        let max_x = i64::from(self.frame.width()) - i64::from(self.patch.width());
        let max_y = i64::from(self.frame.height()) - i64::from(self.patch.height());
        if max_x < 0 || max_y < 0 {
            // The patch does not fit into the frame at all.
            return Vec::new();
        }

        let (x, y) = (i64::from(origin.0), i64::from(origin.1));
        let reach = outer_radius as i64;
        let (min_col, max_col) = ((x - reach).max(0), (x + reach).min(max_x));
        let (min_row, max_row) = ((y - reach).max(0), (y + reach).min(max_y));
        if min_col > max_col || min_row > max_row {
            return Vec::new();
        }

        let area = ((max_col - min_col + 1) * (max_row - min_row + 1)) as f64;
        let keep_prob = max_count as f64 / area;
        let inner_sq = f64::from(inner_radius) * f64::from(inner_radius);
        let outer_sq = f64::from(outer_radius) * f64::from(outer_radius);

        let mut samples = Vec::new();
        for row in min_row..=max_row {
            for col in min_col..=max_col {
                let dist_sq = ((y - row).pow(2) + (x - col).pow(2)) as f64;
                if dist_sq < inner_sq || dist_sq >= outer_sq {
                    continue;
                }
                if keep_prob < 1.0 && rng.f64() >= keep_prob {
                    continue;
                }
                samples.push(Rect::from_top_left(
                    col as i32,
                    row as i32,
                    self.patch.width(),
                    self.patch.height(),
                ));
            }
        }

        log::trace!(
            "sampled {} patches at {:?} in ring [{}, {})",
            samples.len(),
            origin,
            inner_radius,
            outer_radius
        );
        samples
    }
}
