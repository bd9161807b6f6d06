//! Planar geometry primitives.
//!
//! Everything here is allocation-free and deterministic: the pathfinder
//! calls [`Segment::is_point_on`] and [`Rect::contains`] for every sampled
//! point and every expanded search node.

use serde::{Deserialize, Serialize};
use wayfind_types::Point3D;

/// A point on a floor plan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A straight wall between two points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: Point2D,
    pub end: Point2D,
}

impl Segment {
    pub fn new(start: Point2D, end: Point2D) -> Self {
        Self { start, end }
    }

    pub fn length(&self) -> f64 {
        (self.end.x - self.start.x).hypot(self.end.y - self.start.y)
    }

    /// True when `(x, y)` lies within `buffer` of the segment.
    ///
    /// The projection of the point must fall inside the segment's extent
    /// (clamped dot-product test) and its perpendicular distance to the
    /// supporting line must not exceed `buffer`. A degenerate segment is
    /// treated as a single point.
    pub fn is_point_on(&self, x: f64, y: f64, buffer: f64) -> bool {
        let dx = self.end.x - self.start.x;
        let dy = self.end.y - self.start.y;
        let px = x - self.start.x;
        let py = y - self.start.y;
        let len_sq = dx * dx + dy * dy;

        if len_sq == 0.0 {
            return px.hypot(py) <= buffer;
        }

        let dot = px * dx + py * dy;
        if dot < 0.0 || dot > len_sq {
            return false;
        }

        let cross = py * dx - px * dy;
        cross.abs() / len_sq.sqrt() <= buffer
    }
}

/// Axis-aligned rectangle given by its lower-left corner and extent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    /// Inclusive containment: points on the border are inside.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x && x <= self.x + self.w && y >= self.y && y <= self.y + self.h
    }

    pub fn max_x(&self) -> f64 {
        self.x + self.w
    }

    pub fn max_y(&self) -> f64 {
        self.y + self.h
    }

    /// Smallest rectangle covering both `self` and `other`.
    pub fn union(&self, other: &Rect) -> Rect {
        let min_x = self.x.min(other.x);
        let min_y = self.y.min(other.y);
        let max_x = self.max_x().max(other.max_x());
        let max_y = self.max_y().max(other.max_y());
        Rect::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }

    /// Grow the rectangle by `margin` on every side.
    pub fn inflate(&self, margin: f64) -> Rect {
        Rect::new(
            self.x - margin,
            self.y - margin,
            self.w + 2.0 * margin,
            self.h + 2.0 * margin,
        )
    }
}

/// Planar distance from `p` to the segment `a`–`b`.
///
/// Heights are ignored: route segments that cross floors are measured in
/// their horizontal projection.
pub fn point_segment_distance(p: &Point3D, a: &Point3D, b: &Point3D) -> f64 {
    let abx = b.x - a.x;
    let aby = b.y - a.y;
    let len_sq = abx * abx + aby * aby;
    if len_sq == 0.0 {
        return (p.x - a.x).hypot(p.y - a.y);
    }
    let t = (((p.x - a.x) * abx + (p.y - a.y) * aby) / len_sq).clamp(0.0, 1.0);
    let proj_x = a.x + t * abx;
    let proj_y = a.y + t * aby;
    (p.x - proj_x).hypot(p.y - proj_y)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wall(x0: f64, y0: f64, x1: f64, y1: f64) -> Segment {
        Segment::new(Point2D::new(x0, y0), Point2D::new(x1, y1))
    }

    #[test]
    fn point_within_buffer_is_on_wall() {
        let w = wall(0.0, 0.0, 10.0, 0.0);
        assert!(w.is_point_on(5.0, 0.0, 0.5));
        assert!(w.is_point_on(5.0, 0.5, 0.5));
        assert!(!w.is_point_on(5.0, 0.6, 0.5));
    }

    #[test]
    fn perpendicular_distance_is_scaled_by_length() {
        // A long diagonal wall: the raw cross product would exceed the
        // buffer even for points sitting right next to it.
        let w = wall(0.0, 0.0, 30.0, 30.0);
        assert!(w.is_point_on(10.2, 10.0, 0.5));
        assert!(!w.is_point_on(11.0, 10.0, 0.5));
    }

    #[test]
    fn projection_outside_extent_is_not_on_wall() {
        let w = wall(0.0, 0.0, 10.0, 0.0);
        assert!(!w.is_point_on(-0.3, 0.0, 0.5));
        assert!(!w.is_point_on(10.3, 0.0, 0.5));
        assert!(w.is_point_on(10.0, 0.0, 0.5));
    }

    #[test]
    fn degenerate_wall_acts_like_a_post() {
        let w = wall(2.0, 2.0, 2.0, 2.0);
        assert!(w.is_point_on(2.3, 2.0, 0.5));
        assert!(!w.is_point_on(3.0, 2.0, 0.5));
    }

    #[test]
    fn rect_contains_is_inclusive() {
        let r = Rect::new(8.0, 3.0, 8.0, 4.0);
        assert!(r.contains(8.0, 3.0));
        assert!(r.contains(16.0, 7.0));
        assert!(r.contains(10.0, 5.0));
        assert!(!r.contains(16.1, 5.0));
    }

    #[test]
    fn rect_union_and_inflate() {
        let a = Rect::new(0.0, 0.0, 2.0, 2.0);
        let b = Rect::new(5.0, -1.0, 1.0, 1.0);
        let u = a.union(&b);
        assert_eq!(u, Rect::new(0.0, -1.0, 6.0, 3.0));
        assert_eq!(u.inflate(1.0), Rect::new(-1.0, -2.0, 8.0, 5.0));
    }

    #[test]
    fn point_segment_distance_clamps_to_endpoints() {
        let a = Point3D::new(0.0, 0.0, 0.0, 1);
        let b = Point3D::new(10.0, 0.0, 0.0, 1);
        let mid = Point3D::new(5.0, 4.0, 0.0, 1);
        let beyond = Point3D::new(13.0, 4.0, 0.0, 1);
        assert!((point_segment_distance(&mid, &a, &b) - 4.0).abs() < 1e-12);
        assert!((point_segment_distance(&beyond, &a, &b) - 5.0).abs() < 1e-12);
        assert!((point_segment_distance(&beyond, &a, &a) - 13.0_f64.hypot(4.0)).abs() < 1e-12);
    }
}
