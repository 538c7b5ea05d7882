//! Classification window derivation.
//!
//! The tracked rectangle covers roughly the palm. The classifier, however, was trained on whole
//! hand silhouettes, so the window handed to it is stretched upwards to include raised fingers and
//! cut short below the palm. The offsets are a fixed heuristic tuned to typical hand proportions.

use std::fmt;

use handsign_image::{Rect, Resolution};
use serde::Deserialize;

/// Vertical window offsets, as multiples of the tracked rectangle's height.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WindowOffsets {
    /// How far above the tracked rectangle's top edge the window starts.
    pub top: f64,
    /// How far below the tracked rectangle's top edge the window ends.
    pub bottom: f64,
}

impl Default for WindowOffsets {
    fn default() -> Self {
        Self {
            top: 1.3,
            bottom: 0.7,
        }
    }
}

/// Edges of a derived window, before clipping. May extend past the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowEdges {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl WindowEdges {
    pub fn width(&self) -> i64 {
        i64::from(self.x2) - i64::from(self.x1)
    }

    pub fn height(&self) -> i64 {
        i64::from(self.y2) - i64::from(self.y1)
    }
}

/// Why no classification window could be derived for a frame.
///
/// This is an expected, per-frame condition: the cycle skips classification and moves on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowError {
    /// The window is wider or taller than the frame.
    Oversized { edges: WindowEdges, frame: Resolution },
    /// The window does not overlap the frame.
    OutsideFrame { edges: WindowEdges, frame: Resolution },
}

impl fmt::Display for WindowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowError::Oversized { edges, frame } => write!(
                f,
                "window {}x{} exceeds {} frame",
                edges.width(),
                edges.height(),
                frame
            ),
            WindowError::OutsideFrame { edges, frame } => {
                write!(f, "window {:?} lies outside of {} frame", edges, frame)
            }
        }
    }
}

impl std::error::Error for WindowError {}

/// Truncates toward zero like an integer cast, ignoring floating-point representation error.
fn truncate(v: f64) -> i32 {
    (v + v.signum() * 1e-9).trunc() as i32
}

impl WindowOffsets {
    /// Computes the window edges for a tracked rectangle.
    ///
    /// ```text
    /// x1 = x          y1 = y - top * h
    /// x2 = x + w      y2 = y + bottom * h
    /// ```
    pub fn edges(&self, tracked: Rect) -> WindowEdges {
        let (x, y) = (tracked.x(), tracked.y());
        let h = f64::from(tracked.height());
        WindowEdges {
            x1: x,
            y1: truncate(f64::from(y) - self.top * h),
            x2: (tracked.right()).clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32,
            y2: truncate(f64::from(y) + self.bottom * h),
        }
    }

    /// Derives the frame area to classify for a tracked rectangle.
    ///
    /// Windows larger than the frame in either dimension are rejected. Otherwise the window is
    /// clamped to the frame edges, so the result can always be read without going out of bounds.
    pub fn window(&self, tracked: Rect, frame: Resolution) -> Result<Rect, WindowError> {
        let edges = self.edges(tracked);
        if edges.width() > i64::from(frame.width()) || edges.height() > i64::from(frame.height())
        {
            return Err(WindowError::Oversized { edges, frame });
        }

        let left = edges.x1.max(0);
        let top = edges.y1.max(0);
        let right = i64::from(edges.x2).min(i64::from(frame.width())) as i32;
        let bottom = i64::from(edges.y2).min(i64::from(frame.height())) as i32;
        if left >= right || top >= bottom {
            return Err(WindowError::OutsideFrame { edges, frame });
        }

        let window = Rect::from_edges(left, top, right, bottom);
        log::trace!("window for {:?}: {:?} -> {:?}", tracked, edges, window);
        Ok(window)
    }
}
