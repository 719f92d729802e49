// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Geometric predicates consumed by the Boolean engine
//!
//! Side-of-plane classification, parametric line/plane and segment/segment
//! solves, point-in-polygon tests and ray crossings. Every division that can
//! blow up is checked and reported as [`BoolError::NonFinite`].
//!
//! [`BoolError::NonFinite`]: crate::error::BoolError::NonFinite

use nalgebra::{Point2, Point3, Vector2, Vector3};

use super::{Plane, Polygon, Tolerance};
use crate::error::{finite, BooleanResult};
use crate::utils::math::lex_less;

/// Classify point relative to plane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Front,
    Back,
    On,
}

impl Side {
    pub fn of_distance(distance: f64, eps: f64) -> Self {
        if distance > eps {
            Side::Front
        } else if distance < -eps {
            Side::Back
        } else {
            Side::On
        }
    }

    pub fn sign(self) -> i8 {
        match self {
            Side::Front => 1,
            Side::Back => -1,
            Side::On => 0,
        }
    }
}

pub fn side_of_plane(plane: &Plane, point: &Point3<f64>, tol: &Tolerance) -> Side {
    Side::of_distance(plane.signed_distance(point), tol.eps)
}

/// Where a point lies relative to a polygon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointLocation {
    Inside,
    /// On the edge starting at this vertex index.
    Boundary(usize),
    Outside,
}

/// Crossing of the edge (a, b) with a plane, given both signed distances.
///
/// The endpoints are ordered lexicographically first, so the two polygons
/// sharing an edge compute the identical point.
pub fn edge_plane_crossing(
    a: &Point3<f64>,
    b: &Point3<f64>,
    da: f64,
    db: f64,
) -> BooleanResult<Point3<f64>> {
    let (p, q, dp, dq) = if lex_less(b, a) {
        (b, a, db, da)
    } else {
        (a, b, da, db)
    };
    let t = finite(dp / (dp - dq), "edge/plane parameter")?;
    Ok(p + (q - p) * t.clamp(0.0, 1.0))
}

/// Parameter `t` where `origin + t * dir` meets the plane, if not parallel.
pub fn line_plane_param(
    plane: &Plane,
    origin: &Point3<f64>,
    dir: &Vector3<f64>,
) -> BooleanResult<Option<f64>> {
    let denom = plane.normal.dot(dir);
    if denom.abs() <= 1e-14 * dir.norm().max(1.0) {
        return Ok(None);
    }
    let t = finite(-plane.signed_distance(origin) / denom, "line/plane parameter")?;
    Ok(Some(t))
}

/// Distance from `point` to the infinite line through `origin` along `dir`.
pub fn distance_to_line(point: &Point3<f64>, origin: &Point3<f64>, dir: &Vector3<f64>) -> f64 {
    let length = dir.norm();
    if length <= f64::MIN_POSITIVE {
        return (point - origin).norm();
    }
    (point - origin).cross(dir).norm() / length
}

/// Point-in-convex-polygon test in 3-D, for points on the polygon's plane.
pub fn point_in_convex_polygon(
    point: &Point3<f64>,
    polygon: &Polygon,
    tol: &Tolerance,
) -> PointLocation {
    let mut boundary = None;
    for i in 0..polygon.len() {
        let (a, b) = polygon.edge(i);
        let inward = polygon.plane.normal.cross(&(b - a));
        let length = inward.norm();
        if length <= f64::MIN_POSITIVE {
            continue;
        }
        let f = inward.dot(&(point - a)) / length;
        if f < -tol.eps {
            return PointLocation::Outside;
        }
        if f <= tol.eps && boundary.is_none() {
            boundary = Some(i);
        }
    }
    boundary.map_or(PointLocation::Inside, PointLocation::Boundary)
}

#[inline]
pub fn cross2(a: &Vector2<f64>, b: &Vector2<f64>) -> f64 {
    a.x * b.y - a.y * b.x
}

/// Twice-free signed area of a 2-D loop (positive when counter-clockwise).
pub fn signed_area_2d(points: &[Point2<f64>]) -> f64 {
    let n = points.len();
    let mut twice = 0.0;
    for i in 0..n {
        let a = points[i];
        let b = points[(i + 1) % n];
        twice += a.x * b.y - b.x * a.y;
    }
    twice * 0.5
}

/// Distance from `p` to the segment (a, b) and the clamped parameter.
pub fn segment_distance_2d(p: &Point2<f64>, a: &Point2<f64>, b: &Point2<f64>) -> (f64, f64) {
    let ab = b - a;
    let len2 = ab.norm_squared();
    if len2 <= f64::MIN_POSITIVE {
        return ((p - a).norm(), 0.0);
    }
    let t = ((p - a).dot(&ab) / len2).clamp(0.0, 1.0);
    ((p - (a + ab * t)).norm(), t)
}

/// General point-in-polygon by crossing parity, with boundary detection.
pub fn point_in_polygon_2d(p: &Point2<f64>, polygon: &[Point2<f64>], eps: f64) -> PointLocation {
    let n = polygon.len();
    for i in 0..n {
        let (distance, _) = segment_distance_2d(p, &polygon[i], &polygon[(i + 1) % n]);
        if distance <= eps {
            return PointLocation::Boundary(i);
        }
    }
    let mut inside = false;
    for i in 0..n {
        let a = polygon[i];
        let b = polygon[(i + 1) % n];
        if (a.y > p.y) != (b.y > p.y) {
            let x = a.x + (p.y - a.y) * (b.x - a.x) / (b.y - a.y);
            if p.x < x {
                inside = !inside;
            }
        }
    }
    if inside {
        PointLocation::Inside
    } else {
        PointLocation::Outside
    }
}

/// Result of intersecting two 2-D segments, in the parameters of each.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SegmentHit2d {
    None,
    Point { t: f64, s: f64 },
    Overlap { t: (f64, f64), s: (f64, f64) },
}

pub fn segment_intersection_2d(
    a0: &Point2<f64>,
    a1: &Point2<f64>,
    b0: &Point2<f64>,
    b1: &Point2<f64>,
    eps: f64,
) -> SegmentHit2d {
    let r = a1 - a0;
    let s = b1 - b0;
    let r_len = r.norm();
    let s_len = s.norm();
    if r_len <= eps || s_len <= eps {
        return SegmentHit2d::None;
    }
    let qp = b0 - a0;
    let denom = cross2(&r, &s);
    let t_eps = eps / r_len;
    let s_eps = eps / s_len;
    let param_on_b = |point: Point2<f64>| ((point - b0).dot(&s) / (s_len * s_len)).clamp(0.0, 1.0);

    if denom.abs() <= 1e-12 * r_len * s_len {
        if cross2(&qp, &r).abs() / r_len > eps {
            return SegmentHit2d::None;
        }
        let r2 = r_len * r_len;
        let t0 = qp.dot(&r) / r2;
        let t1 = (b1 - a0).dot(&r) / r2;
        let lo = t0.min(t1).max(0.0);
        let hi = t0.max(t1).min(1.0);
        if lo > hi + t_eps {
            return SegmentHit2d::None;
        }
        let p_lo = a0 + r * lo;
        if hi - lo <= t_eps {
            return SegmentHit2d::Point {
                t: lo,
                s: param_on_b(p_lo),
            };
        }
        let p_hi = a0 + r * hi;
        return SegmentHit2d::Overlap {
            t: (lo, hi),
            s: (param_on_b(p_lo), param_on_b(p_hi)),
        };
    }

    let t = cross2(&qp, &s) / denom;
    let u = cross2(&qp, &r) / denom;
    if t < -t_eps || t > 1.0 + t_eps || u < -s_eps || u > 1.0 + s_eps {
        return SegmentHit2d::None;
    }
    SegmentHit2d::Point {
        t: t.clamp(0.0, 1.0),
        s: u.clamp(0.0, 1.0),
    }
}

/// Outcome of firing a ray at one polygon.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RayHit {
    Miss,
    Hit(f64),
    /// The ray touches an edge or runs inside the polygon's plane.
    Grazing,
}

/// Drop the dominant normal axis to get a 2-D view of a planar polygon.
pub fn project_dominant(normal: &Vector3<f64>, point: &Point3<f64>) -> Point2<f64> {
    let n = normal.abs();
    if n.x >= n.y && n.x >= n.z {
        Point2::new(point.y, point.z)
    } else if n.y >= n.z {
        Point2::new(point.z, point.x)
    } else {
        Point2::new(point.x, point.y)
    }
}

pub fn ray_polygon_hit(
    origin: &Point3<f64>,
    dir: &Vector3<f64>,
    polygon: &Polygon,
    tol: &Tolerance,
) -> BooleanResult<RayHit> {
    let t = match line_plane_param(&polygon.plane, origin, dir)? {
        Some(t) => t,
        None => {
            return Ok(if tol.is_zero(polygon.plane.signed_distance(origin)) {
                RayHit::Grazing
            } else {
                RayHit::Miss
            })
        }
    };
    if t <= tol.eps {
        return Ok(RayHit::Miss);
    }
    let hit = origin + dir * t;
    let normal = polygon.plane.normal;
    let flat: Vec<Point2<f64>> = polygon
        .vertices
        .iter()
        .map(|v| project_dominant(&normal, &v.position))
        .collect();
    Ok(
        match point_in_polygon_2d(&project_dominant(&normal, &hit), &flat, tol.eps) {
            PointLocation::Inside => RayHit::Hit(t),
            PointLocation::Boundary(_) => RayHit::Grazing,
            PointLocation::Outside => RayHit::Miss,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_square() -> Polygon {
        Polygon::from_points(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ])
        .unwrap()
    }

    #[test]
    fn test_side_of_distance() {
        assert_eq!(Side::of_distance(1.0, 1e-9), Side::Front);
        assert_eq!(Side::of_distance(-1.0, 1e-9), Side::Back);
        assert_eq!(Side::of_distance(1e-12, 1e-9), Side::On);
    }

    #[test]
    fn test_edge_crossing_is_direction_independent() {
        let a = Point3::new(0.1, 0.2, -0.3);
        let b = Point3::new(0.7, -0.4, 0.9);
        let plane = Plane::new(Vector3::z(), 0.0);
        let (da, db) = (plane.signed_distance(&a), plane.signed_distance(&b));
        let forward = edge_plane_crossing(&a, &b, da, db).unwrap();
        let backward = edge_plane_crossing(&b, &a, db, da).unwrap();
        assert_eq!(forward, backward);
        assert_relative_eq!(forward.z, 0.0, epsilon = 1e-15);
    }

    #[test]
    fn test_point_in_convex_polygon() {
        let sq = unit_square();
        let tol = Tolerance::default();
        assert_eq!(
            point_in_convex_polygon(&Point3::new(0.5, 0.5, 0.0), &sq, &tol),
            PointLocation::Inside
        );
        assert_eq!(
            point_in_convex_polygon(&Point3::new(0.5, 0.0, 0.0), &sq, &tol),
            PointLocation::Boundary(0)
        );
        assert_eq!(
            point_in_convex_polygon(&Point3::new(1.5, 0.5, 0.0), &sq, &tol),
            PointLocation::Outside
        );
    }

    #[test]
    fn test_point_in_polygon_2d_concave() {
        let l_shape = [
            Point2::new(0.0, 0.0),
            Point2::new(2.0, 0.0),
            Point2::new(2.0, 1.0),
            Point2::new(1.0, 1.0),
            Point2::new(1.0, 2.0),
            Point2::new(0.0, 2.0),
        ];
        assert_eq!(
            point_in_polygon_2d(&Point2::new(0.5, 1.5), &l_shape, 1e-9),
            PointLocation::Inside
        );
        assert_eq!(
            point_in_polygon_2d(&Point2::new(1.5, 1.5), &l_shape, 1e-9),
            PointLocation::Outside
        );
        assert_eq!(
            point_in_polygon_2d(&Point2::new(1.5, 1.0), &l_shape, 1e-9),
            PointLocation::Boundary(2)
        );
        assert_relative_eq!(signed_area_2d(&l_shape), 3.0);
    }

    #[test]
    fn test_segment_intersection_2d() {
        let hit = segment_intersection_2d(
            &Point2::new(0.0, 0.0),
            &Point2::new(2.0, 0.0),
            &Point2::new(1.0, -1.0),
            &Point2::new(1.0, 1.0),
            1e-9,
        );
        assert_eq!(hit, SegmentHit2d::Point { t: 0.5, s: 0.5 });

        let overlap = segment_intersection_2d(
            &Point2::new(0.0, 0.0),
            &Point2::new(2.0, 0.0),
            &Point2::new(3.0, 0.0),
            &Point2::new(1.0, 0.0),
            1e-9,
        );
        match overlap {
            SegmentHit2d::Overlap { t, s } => {
                assert_relative_eq!(t.0, 0.5);
                assert_relative_eq!(t.1, 1.0);
                assert_relative_eq!(s.0, 1.0);
                assert_relative_eq!(s.1, 0.5);
            }
            other => panic!("expected overlap, got {other:?}"),
        }

        let parallel = segment_intersection_2d(
            &Point2::new(0.0, 0.0),
            &Point2::new(1.0, 0.0),
            &Point2::new(0.0, 1.0),
            &Point2::new(1.0, 1.0),
            1e-9,
        );
        assert_eq!(parallel, SegmentHit2d::None);
    }

    #[test]
    fn test_ray_polygon_hit() {
        let sq = unit_square();
        let tol = Tolerance::default();
        let down = Vector3::new(0.0, 0.0, -1.0);
        assert_eq!(
            ray_polygon_hit(&Point3::new(0.3, 0.4, 2.0), &down, &sq, &tol).unwrap(),
            RayHit::Hit(2.0)
        );
        assert_eq!(
            ray_polygon_hit(&Point3::new(1.0, 0.4, 2.0), &down, &sq, &tol).unwrap(),
            RayHit::Grazing
        );
        assert_eq!(
            ray_polygon_hit(&Point3::new(0.3, 0.4, -2.0), &down, &sq, &tol).unwrap(),
            RayHit::Miss
        );
    }

    #[test]
    fn test_distance_to_line() {
        let d = distance_to_line(
            &Point3::new(0.0, 2.0, 0.0),
            &Point3::origin(),
            &Vector3::new(3.0, 0.0, 0.0),
        );
        assert_relative_eq!(d, 2.0);
    }
}
