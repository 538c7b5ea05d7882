//! Rectangle type.
//!
//! Rectangles are used for raw detections, tracker estimates, and derived classification windows.

use std::fmt;

/// An axis-aligned rectangle.
///
/// This rectangle type uses (signed) integer pixel coordinates. The top left corner may lie
/// outside of an image (eg. at negative coordinates); operations that read pixels clip the
/// rectangle first.
///
/// Rectangles are allowed to have zero height and/or width. Negative dimensions are not allowed.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rect {
    x: i32,
    y: i32,
    width: u32,
    height: u32,
}

impl Rect {
    /// Creates a rectangle extending downwards and right from a point.
    #[inline]
    pub const fn from_top_left(top_left_x: i32, top_left_y: i32, width: u32, height: u32) -> Self {
        Self {
            x: top_left_x,
            y: top_left_y,
            width,
            height,
        }
    }

    /// Creates a rectangle extending outwards from a center point.
    pub fn from_center(x_center: i32, y_center: i32, width: u32, height: u32) -> Self {
        Self::from_top_left(
            x_center - (width / 2) as i32,
            y_center - (height / 2) as i32,
            width,
            height,
        )
    }

    /// Creates a rectangle from its left, top, right, and bottom edges.
    ///
    /// `right` and `bottom` are *exclusive*: the rectangle `from_edges(0, 0, 2, 2)` covers 2x2
    /// pixels.
    ///
    /// # Panics
    ///
    /// Panics if `right < left` or `bottom < top`.
    pub fn from_edges(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        assert!(left <= right, "left={}, right={}", left, right);
        assert!(top <= bottom, "top={}, bottom={}", top, bottom);
        Self {
            x: left,
            y: top,
            width: (i64::from(right) - i64::from(left)) as u32,
            height: (i64::from(bottom) - i64::from(top)) as u32,
        }
    }

    /// Returns the X coordinate of the left side of the rectangle.
    #[inline]
    pub fn x(&self) -> i32 {
        self.x
    }

    /// Returns the Y coordinate of the top side of the rectangle.
    #[inline]
    pub fn y(&self) -> i32 {
        self.y
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns the (exclusive) X coordinate of the right side of the rectangle.
    #[inline]
    pub fn right(&self) -> i64 {
        i64::from(self.x) + i64::from(self.width)
    }

    /// Returns the (exclusive) Y coordinate of the bottom side of the rectangle.
    #[inline]
    pub fn bottom(&self) -> i64 {
        i64::from(self.y) + i64::from(self.height)
    }

    pub fn center(&self) -> (i32, i32) {
        (
            self.x + (self.width / 2) as i32,
            self.y + (self.height / 2) as i32,
        )
    }

    /// Returns the number of pixels contained in `self`.
    #[inline]
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Returns whether this rectangle covers no pixels.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    #[must_use]
    pub fn move_by(&self, x: i32, y: i32) -> Rect {
        Rect::from_top_left(self.x + x, self.y + y, self.width, self.height)
    }

    /// Computes the intersection of `self` and `other`.
    ///
    /// Returns `None` when the intersection is empty (ie. the rectangles do not overlap).
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if i64::from(left) >= right || i64::from(top) >= bottom {
            return None;
        }

        let rect = Rect::from_top_left(
            left,
            top,
            (right - i64::from(left)) as u32,
            (bottom - i64::from(top)) as u32,
        );
        assert!(
            self.contains_rect(&rect) && other.contains_rect(&rect),
            "intersect self={:?} other={:?} res={:?}",
            self,
            other,
            rect,
        );
        Some(rect)
    }

    /// Returns whether `self` contains `other`.
    pub fn contains_rect(&self, other: &Rect) -> bool {
        self.x <= other.x
            && self.y <= other.y
            && self.right() >= other.right()
            && self.bottom() >= other.bottom()
    }

    /// Computes the Intersection over Union (IOU) of `self` and `other`.
    ///
    /// Two empty rectangles have an IOU of 0.
    pub fn iou(&self, other: &Rect) -> f32 {
        let inter = self.intersection(other).map_or(0, |rect| rect.area());
        let union = self.area() + other.area() - inter;
        if union == 0 {
            return 0.0;
        }
        inter as f32 / union as f32
    }
}

impl fmt::Debug for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (x, y, w, h) = (self.x, self.y, self.width, self.height);
        let (bx, by) = (self.right(), self.bottom());
        write!(f, "Rect @ ({x},{y})-({bx},{by})/{w}x{h}")
    }
}
