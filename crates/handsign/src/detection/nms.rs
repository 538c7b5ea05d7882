//! Non-Maximum Suppression and Averaging.
//!
//! Region detectors tend to report the same hand several times with slightly shifted rectangles.
//! [`NonMaxSuppression`] collapses every group of overlapping detections into one, either by
//! keeping only the most confident one ([`SuppressionMode::Remove`]) or by averaging the group's
//! rectangles weighted by confidence ([`SuppressionMode::Average`], the default). Averaging
//! makes the seed rectangle less jumpy when the detector is re-run after tracking loss.

use handsign_image::Rect;

use crate::num::TotalF32;

use super::Detection;

/// A non-maximum suppression algorithm.
pub struct NonMaxSuppression {
    iou_thresh: f32,
    avg_buf: Vec<Detection>,
    out_buf: Vec<Detection>,
    mode: SuppressionMode,
}

impl NonMaxSuppression {
    /// The default intersection-over-union threshold used to determine if two detections overlap.
    pub const DEFAULT_IOU_THRESH: f32 = 0.3;

    /// Creates a suppressor using [`SuppressionMode::Average`] and [`Self::DEFAULT_IOU_THRESH`].
    pub fn new() -> Self {
        Self {
            iou_thresh: Self::DEFAULT_IOU_THRESH,
            avg_buf: Vec::new(),
            out_buf: Vec::new(),
            mode: SuppressionMode::Average,
        }
    }

    pub fn set_iou_thresh(&mut self, iou_thresh: f32) {
        self.iou_thresh = iou_thresh;
    }

    pub fn set_mode(&mut self, mode: SuppressionMode) {
        self.mode = mode;
    }

    /// Performs non-maximum suppression on `detections`.
    ///
    /// `detections` is emptied in the process. The surviving detections are returned in order of
    /// descending confidence.
    pub fn process(
        &mut self,
        detections: &mut Vec<Detection>,
    ) -> impl Iterator<Item = Detection> + '_ {
        self.out_buf.clear();

        // Sort by ascending confidence, process highest confidence first by starting at the back.
        detections.sort_unstable_by_key(|det| TotalF32(det.confidence));

        while let Some(seed) = detections.pop() {
            match self.mode {
                SuppressionMode::Remove => {
                    detections.retain(|other| seed.rect.iou(&other.rect) < self.iou_thresh);
                    self.out_buf.push(seed);
                }
                SuppressionMode::Average => {
                    self.avg_buf.clear();
                    self.avg_buf.push(seed);
                    let avg_buf = &mut self.avg_buf;
                    let iou_thresh = self.iou_thresh;
                    detections.retain(|other| {
                        if seed.rect.iou(&other.rect) >= iou_thresh {
                            avg_buf.push(*other);
                            false
                        } else {
                            true
                        }
                    });

                    // Confidence-weighted average of the group's edges.
                    let mut acc = [0.0f64; 4];
                    let mut divisor = 0.0;
                    for det in &self.avg_buf {
                        let factor = f64::from(det.confidence);
                        divisor += factor;
                        let r = det.rect;
                        let edges = [
                            f64::from(r.x()),
                            f64::from(r.y()),
                            r.right() as f64,
                            r.bottom() as f64,
                        ];
                        for (acc, edge) in acc.iter_mut().zip(edges) {
                            *acc += edge * factor;
                        }
                    }

                    let rect = if divisor > 0.0 {
                        let [l, t, r, b] = acc.map(|v| (v / divisor).round() as i32);
                        Rect::from_edges(l, t, r.max(l), b.max(t))
                    } else {
                        seed.rect
                    };
                    self.out_buf.push(Detection::new(seed.confidence, rect));
                }
            }
        }

        self.avg_buf.clear();
        self.out_buf.drain(..)
    }
}

impl Default for NonMaxSuppression {
    fn default() -> Self {
        Self::new()
    }
}

/// Describes how [`NonMaxSuppression`] should deal with overlapping detections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum SuppressionMode {
    /// Remove overlapping detections, only retain the detection with highest confidence score.
    Remove,

    /// Compute a confidence-weighted average of overlapping detections.
    Average,
}
