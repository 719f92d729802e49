// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Inside/outside classification
//!
//! Two tests decide where a piece of boundary lies relative to the other
//! operand. The directional test looks at a cut edge: moving into the piece
//! either runs against the producing polygon's outward normal (inside) or
//! with it (outside). The ray-parity test fires rays from a representative
//! interior point and is used for whole untouched components and anything
//! the flood fill cannot reach.

use nalgebra::{Point2, Point3, Vector3};
use tracing::warn;

use super::Location;
use crate::error::BooleanResult;
use crate::geometry::predicates::{
    point_in_polygon_2d, project_dominant, ray_polygon_hit, signed_area_2d, PointLocation, RayHit,
};
use crate::geometry::{Mesh, PlaneFrame, Polygon, Tolerance};
use crate::utils::math::PROBE_BLEND;

/// Ray directions tried in turn until one crosses no edge.
const RAY_DIRECTIONS: [[f64; 3]; 3] = [
    [0.267_261_241_912_424_4, 0.534_522_483_824_848_8, 0.801_783_725_737_273_1],
    [-0.700_140_042_014_004_7, 0.310_062_018_606_202_1, 0.642_771_599_311_456_7],
    [0.434_016_864_869_014_2, -0.827_404_587_534_637_8, 0.356_083_462_521_271_8],
];

/// Smallest |cos| between a cut's inward direction and the producing normal
/// that the directional test trusts.
pub const MIN_DIRECTIONAL_STRENGTH: f64 = 1e-6;

/// Location of the region lying to the left of a cut edge running along
/// `dir` on a polygon with normal `normal`, produced by a polygon with
/// outward normal `other_normal`, together with how decisive it is.
pub fn side_of_cut(
    normal: &Vector3<f64>,
    dir: &Vector3<f64>,
    other_normal: &Vector3<f64>,
) -> Option<(Location, f64)> {
    let left = normal.cross(dir);
    let length = left.norm();
    if length <= f64::MIN_POSITIVE {
        return None;
    }
    let cos = left.dot(other_normal) / length;
    let location = if cos < 0.0 {
        Location::Inside
    } else {
        Location::Outside
    };
    Some((location, cos.abs()))
}

/// True when `point` lies on some polygon of `mesh`.
pub fn on_boundary(point: &Point3<f64>, mesh: &Mesh, tol: &Tolerance) -> bool {
    mesh.polygons.iter().any(|polygon| {
        if !tol.is_zero(polygon.plane.signed_distance(point)) {
            return false;
        }
        let normal = polygon.plane.normal;
        let flat: Vec<Point2<f64>> = polygon
            .vertices
            .iter()
            .map(|v| project_dominant(&normal, &v.position))
            .collect();
        point_in_polygon_2d(&project_dominant(&normal, point), &flat, tol.eps) != PointLocation::Outside
    })
}

/// Ray-parity point-in-solid test. `None` when the point lies on the
/// boundary of `mesh`, where parity says nothing.
pub fn point_in_solid(
    point: &Point3<f64>,
    mesh: &Mesh,
    tol: &Tolerance,
) -> BooleanResult<Option<Location>> {
    if on_boundary(point, mesh, tol) {
        return Ok(None);
    }
    let mut last = 0usize;
    for dir in RAY_DIRECTIONS {
        let dir = Vector3::from(dir);
        let mut crossings = 0usize;
        let mut grazed = false;
        for polygon in &mesh.polygons {
            match ray_polygon_hit(point, &dir, polygon, tol)? {
                RayHit::Hit(_) => crossings += 1,
                RayHit::Grazing => {
                    grazed = true;
                    break;
                }
                RayHit::Miss => {}
            }
        }
        last = crossings;
        if !grazed {
            return Ok(Some(parity(crossings)));
        }
    }
    warn!(?point, "every probe ray grazed an edge; using the last crossing count");
    Ok(Some(parity(last)))
}

fn parity(crossings: usize) -> Location {
    if crossings % 2 == 1 {
        Location::Inside
    } else {
        Location::Outside
    }
}

/// A point strictly inside `polygon`, which may be concave or slit.
///
/// Picks an ear (a convex corner whose triangle holds no other vertex) and
/// returns a point on its median, off the exact middle by [`PROBE_BLEND`].
pub fn interior_point(polygon: &Polygon, tol: &Tolerance) -> Option<Point3<f64>> {
    let frame = PlaneFrame::new(&polygon.plane, polygon.point(0)).ok()?;
    let flat = frame.to_local_all(&polygon.points());
    let n = flat.len();
    if n < 3 {
        return None;
    }
    let sign = signed_area_2d(&flat).signum();
    let area_eps = tol.eps * tol.eps;

    for i in 0..n {
        let a = flat[(i + n - 1) % n];
        let b = flat[i];
        let c = flat[(i + 1) % n];
        let turn = (b - a).perp(&(c - b)) * sign;
        if turn <= area_eps {
            continue;
        }
        let blocked = flat.iter().any(|p| {
            !tol.same_point_2d(p, &a)
                && !tol.same_point_2d(p, &b)
                && !tol.same_point_2d(p, &c)
                && point_in_polygon_2d(p, &[a, b, c], 0.0) != PointLocation::Outside
        });
        if blocked {
            continue;
        }
        let median = Point2::from((a.coords + c.coords) * 0.5);
        let probe = b + (median - b) * PROBE_BLEND;
        return Some(frame.to_world(&probe));
    }
    None
}

/// How a boundary segment of one planar polygon relates to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentClass {
    Inside,
    Outside,
    /// On the other boundary, running the same way.
    Shared,
    /// On the other boundary, running the opposite way.
    AntiShared,
}

/// Sample votes for one segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentVotes {
    pub inside: u32,
    pub outside: u32,
    pub shared: u32,
    pub anti_shared: u32,
}

impl SegmentVotes {
    pub fn add(&mut self, class: SegmentClass) {
        match class {
            SegmentClass::Inside => self.inside += 1,
            SegmentClass::Outside => self.outside += 1,
            SegmentClass::Shared => self.shared += 1,
            SegmentClass::AntiShared => self.anti_shared += 1,
        }
    }

    /// A single nonzero count wins outright. Mixed votes, which happen at
    /// tangencies, go to the larger of inside/outside and of
    /// shared/anti-shared, then to the group with more votes.
    pub fn resolve(&self) -> Option<SegmentClass> {
        let counts = [
            (self.inside, SegmentClass::Inside),
            (self.outside, SegmentClass::Outside),
            (self.shared, SegmentClass::Shared),
            (self.anti_shared, SegmentClass::AntiShared),
        ];
        let nonzero: Vec<_> = counts.iter().filter(|(c, _)| *c > 0).collect();
        match nonzero.len() {
            0 => return None,
            1 => return Some(nonzero[0].1),
            _ => {}
        }
        let volume = if self.inside > self.outside {
            SegmentClass::Inside
        } else {
            SegmentClass::Outside
        };
        let surface = if self.anti_shared > self.shared {
            SegmentClass::AntiShared
        } else {
            SegmentClass::Shared
        };
        if self.inside + self.outside >= self.shared + self.anti_shared {
            Some(volume)
        } else {
            Some(surface)
        }
    }
}
