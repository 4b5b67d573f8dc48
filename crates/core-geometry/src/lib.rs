//! Geometry primitives shared by the capture, segmentation and matching
//! crates: integer points, half-open spans and axis-aligned bounding boxes.

use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};

/// An integer point in printout coordinates (x = column, y = row).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl Add for Point {
    type Output = Point;
    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;
    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// A half-open integer interval `[beg, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub beg: i32,
    pub end: i32,
}

impl Span {
    pub const fn new(beg: i32, end: i32) -> Self {
        Self { beg, end }
    }

    /// Length of the span; zero or negative if `end <= beg`.
    pub fn len(&self) -> i32 {
        self.end - self.beg
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 0
    }

    /// Range of `usize` indices this span addresses into a buffer, clamped
    /// so a negative or inverted span yields an empty range rather than
    /// panicking at the call site.
    pub fn as_range(&self) -> std::ops::Range<usize> {
        let beg = self.beg.max(0) as usize;
        let end = self.end.max(self.beg.max(0)) as usize;
        beg..end
    }
}

/// An axis-aligned box: `p1` is the inclusive top-left corner, `p2` the
/// exclusive bottom-right corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub p1: Point,
    pub p2: Point,
}

impl BoundingBox {
    pub const fn new(p1: Point, p2: Point) -> Self {
        Self { p1, p2 }
    }

    pub fn from_spans(xspan: Span, yspan: Span) -> Self {
        Self::new(
            Point::new(xspan.beg, yspan.beg),
            Point::new(xspan.end, yspan.end),
        )
    }

    pub fn width(&self) -> i32 {
        self.p2.x - self.p1.x
    }

    pub fn height(&self) -> i32 {
        self.p2.y - self.p1.y
    }

    pub fn center(&self) -> Point {
        Point::new(
            self.p1.x + (self.p2.x - self.p1.x) / 2,
            self.p1.y + (self.p2.y - self.p1.y) / 2,
        )
    }

    pub fn horizontal_span(&self) -> Span {
        Span::new(self.p1.x, self.p2.x)
    }

    pub fn vertical_span(&self) -> Span {
        Span::new(self.p1.y, self.p2.y)
    }

    /// Clamp this box coordinate-wise so it lies entirely within `outer`.
    pub fn clamp(&self, outer: &BoundingBox) -> BoundingBox {
        let clamp_axis = |v: i32, lo: i32, hi: i32| v.min(hi).max(lo);
        BoundingBox::new(
            Point::new(
                clamp_axis(self.p1.x, outer.p1.x, outer.p2.x),
                clamp_axis(self.p1.y, outer.p1.y, outer.p2.y),
            ),
            Point::new(
                clamp_axis(self.p2.x, outer.p1.x, outer.p2.x),
                clamp_axis(self.p2.y, outer.p1.y, outer.p2.y),
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_len_and_range() {
        let s = Span::new(3, 10);
        assert_eq!(s.len(), 7);
        assert_eq!(s.as_range(), 3..10);
        assert!(!s.is_empty());
        assert!(Span::new(5, 5).is_empty());
    }

    #[test]
    fn bbox_dimensions_and_center() {
        let bbox = BoundingBox::from_spans(Span::new(10, 20), Span::new(0, 8));
        assert_eq!(bbox.width(), 10);
        assert_eq!(bbox.height(), 8);
        assert_eq!(bbox.center(), Point::new(15, 4));
        assert_eq!(bbox.horizontal_span(), Span::new(10, 20));
        assert_eq!(bbox.vertical_span(), Span::new(0, 8));
    }

    #[test]
    fn bbox_clamp_keeps_box_inside_outer() {
        let outer = BoundingBox::new(Point::new(0, 0), Point::new(100, 50));
        let inner = BoundingBox::new(Point::new(-10, -5), Point::new(120, 60));
        let clamped = inner.clamp(&outer);
        assert_eq!(clamped, outer);

        let partially_outside = BoundingBox::new(Point::new(90, 40), Point::new(110, 60));
        let clamped2 = partially_outside.clamp(&outer);
        assert_eq!(clamped2, BoundingBox::new(Point::new(90, 40), Point::new(100, 50)));
    }

    #[test]
    fn point_add_sub() {
        let a = Point::new(5, 7);
        let b = Point::new(2, 3);
        assert_eq!(a + b, Point::new(7, 10));
        assert_eq!(a - b, Point::new(3, 4));
    }
}
