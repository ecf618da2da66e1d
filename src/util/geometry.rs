//! Pure polygon and polyline helpers used by the territory simulation
//!
//! Polygons are implicit rings: the closing edge from the last point back
//! to the first is never stored. Area sums run in f64 because territories
//! reach millions of square units and the capture tolerance is a few units.

use crate::util::vec2::Vec2;
use std::f32::consts::TAU;

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Vec2,
    pub max: Vec2,
}

impl Bounds {
    /// Bounds of a point set, `None` when empty
    pub fn of(points: &[Vec2]) -> Option<Self> {
        let first = *points.first()?;
        let mut bounds = Self {
            min: first,
            max: first,
        };
        for p in &points[1..] {
            bounds.min.x = bounds.min.x.min(p.x);
            bounds.min.y = bounds.min.y.min(p.y);
            bounds.max.x = bounds.max.x.max(p.x);
            bounds.max.y = bounds.max.y.max(p.y);
        }
        Some(bounds)
    }

    #[inline]
    pub fn overlaps(&self, other: &Bounds) -> bool {
        self.min.x <= other.max.x
            && other.min.x <= self.max.x
            && self.min.y <= other.max.y
            && other.min.y <= self.max.y
    }
}

/// Intersection of two segments
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentHit {
    pub point: Vec2,
    /// Parameter along the first segment, in [0, 1]
    pub t: f32,
    /// Parameter along the second segment, in [0, 1]
    pub u: f32,
}

// ============================================================================
// Area / containment
// ============================================================================

/// Shoelace area with sign (positive for clockwise in screen space, y down)
pub fn signed_area(polygon: &[Vec2]) -> f64 {
    if polygon.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0f64;
    let mut prev = polygon[polygon.len() - 1];
    for &p in polygon {
        sum += prev.x as f64 * p.y as f64 - p.x as f64 * prev.y as f64;
        prev = p;
    }
    sum * 0.5
}

/// Absolute polygon area
#[inline]
pub fn polygon_area(polygon: &[Vec2]) -> f32 {
    signed_area(polygon).abs() as f32
}

/// Even-odd ray cast. Points exactly on an edge may land either way.
pub fn point_in_polygon(point: Vec2, polygon: &[Vec2]) -> bool {
    if polygon.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let pi = polygon[i];
        let pj = polygon[j];
        if (pi.y > point.y) != (pj.y > point.y) {
            let x_cross = (pj.x - pi.x) * (point.y - pi.y) / (pj.y - pi.y) + pi.x;
            if point.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

// ============================================================================
// Segments
// ============================================================================

/// Proper or touching intersection of segments `a1-a2` and `b1-b2`.
/// Parallel and collinear segments report no hit.
pub fn segment_intersection(a1: Vec2, a2: Vec2, b1: Vec2, b2: Vec2) -> Option<SegmentHit> {
    let (ax, ay) = (a1.x as f64, a1.y as f64);
    let (rx, ry) = ((a2.x - a1.x) as f64, (a2.y - a1.y) as f64);
    let (sx, sy) = ((b2.x - b1.x) as f64, (b2.y - b1.y) as f64);
    let denom = rx * sy - ry * sx;
    if denom.abs() < 1e-12 {
        return None;
    }
    let (qx, qy) = (b1.x as f64 - ax, b1.y as f64 - ay);
    let t = (qx * sy - qy * sx) / denom;
    let u = (qx * ry - qy * rx) / denom;
    if !(0.0..=1.0).contains(&t) || !(0.0..=1.0).contains(&u) {
        return None;
    }
    Some(SegmentHit {
        point: Vec2::new((ax + t * rx) as f32, (ay + t * ry) as f32),
        t: t as f32,
        u: u as f32,
    })
}

/// Closest point to `p` on segment `a-b`
pub fn closest_point_on_segment(p: Vec2, a: Vec2, b: Vec2) -> Vec2 {
    let ab = b - a;
    let len_sq = ab.length_sq();
    if len_sq <= f32::EPSILON {
        return a;
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    a + ab * t
}

#[inline]
pub fn point_segment_distance(p: Vec2, a: Vec2, b: Vec2) -> f32 {
    p.distance_to(closest_point_on_segment(p, a, b))
}

// ============================================================================
// Polylines
// ============================================================================

pub fn polyline_length(points: &[Vec2]) -> f32 {
    points.windows(2).map(|w| w[0].distance_to(w[1])).sum()
}

/// Point at `distance` along the polyline, clamped to its ends
pub fn point_along_polyline(points: &[Vec2], distance: f32) -> Option<Vec2> {
    let first = *points.first()?;
    if distance <= 0.0 {
        return Some(first);
    }
    let mut remaining = distance;
    for w in points.windows(2) {
        let seg = w[0].distance_to(w[1]);
        if remaining <= seg {
            if seg <= f32::EPSILON {
                return Some(w[1]);
            }
            return Some(w[0].lerp(w[1], remaining / seg));
        }
        remaining -= seg;
    }
    points.last().copied()
}

/// Drop consecutive points closer than `min_distance`, including a
/// trailing point that duplicates the first (ring closure)
pub fn dedupe_ring(points: &[Vec2], min_distance: f32) -> Vec<Vec2> {
    let min_sq = min_distance * min_distance;
    let mut out: Vec<Vec2> = Vec::with_capacity(points.len());
    for &p in points {
        match out.last() {
            Some(last) if last.distance_sq_to(p) < min_sq => {}
            _ => out.push(p),
        }
    }
    while out.len() > 1 {
        let (first, last) = (out[0], out[out.len() - 1]);
        if first.distance_sq_to(last) < min_sq {
            out.pop();
        } else {
            break;
        }
    }
    out
}

/// Ramer-Douglas-Peucker over an open polyline, keeping both endpoints.
/// Runs on an explicit stack so long near-collinear inputs cannot
/// exhaust the call stack.
pub fn simplify_polyline(points: &[Vec2], epsilon: f32) -> Vec<Vec2> {
    let n = points.len();
    if n <= 2 {
        return points.to_vec();
    }

    let mut keep = vec![false; n];
    keep[0] = true;
    keep[n - 1] = true;

    let mut stack: Vec<(usize, usize)> = Vec::with_capacity(32);
    stack.push((0, n - 1));

    while let Some((start, end)) = stack.pop() {
        if end <= start + 1 {
            continue;
        }
        let (a, b) = (points[start], points[end]);
        let mut max_dist = 0.0f32;
        let mut max_index = start;
        for (i, &p) in points.iter().enumerate().take(end).skip(start + 1) {
            let d = point_segment_distance(p, a, b);
            if d > max_dist {
                max_dist = d;
                max_index = i;
            }
        }
        if max_dist > epsilon {
            keep[max_index] = true;
            stack.push((start, max_index));
            stack.push((max_index, end));
        }
    }

    points
        .iter()
        .zip(keep)
        .filter_map(|(&p, k)| k.then_some(p))
        .collect()
}

/// RDP for a closed ring. Falls back to the input when the result would
/// no longer be a polygon.
pub fn simplify_polygon(polygon: &[Vec2], epsilon: f32) -> Vec<Vec2> {
    if polygon.len() <= 4 {
        return polygon.to_vec();
    }
    let mut ring = Vec::with_capacity(polygon.len() + 1);
    ring.extend_from_slice(polygon);
    ring.push(polygon[0]);

    let mut simplified = simplify_polyline(&ring, epsilon);
    simplified.pop();
    if simplified.len() < 3 {
        polygon.to_vec()
    } else {
        simplified
    }
}

/// Regular polygon approximating a circle
pub fn circle_polygon(center: Vec2, radius: f32, segments: usize) -> Vec<Vec2> {
    (0..segments)
        .map(|i| {
            let a = i as f32 / segments as f32 * TAU;
            center + Vec2::from_angle(a) * radius
        })
        .collect()
}
