// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Plane equations and the plane-aligned 2-D frame used by the planar solver.

use nalgebra::{Point2, Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::{finite, BoolError, BooleanResult};
use crate::utils::math::newell_normal;

/// Oriented plane `normal . p + offset = 0` with a unit normal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    pub normal: Vector3<f64>,
    pub offset: f64,
}

impl Plane {
    pub fn new(normal: Vector3<f64>, offset: f64) -> Self {
        Self { normal, offset }
    }

    /// Plane through `point` with the given (not necessarily unit) normal.
    pub fn from_point_normal(point: &Point3<f64>, normal: &Vector3<f64>) -> BooleanResult<Self> {
        let length = finite(normal.norm(), "plane normal length")?;
        if length <= f64::MIN_POSITIVE {
            return Err(BoolError::numerical("plane normal has zero length"));
        }
        let unit = normal / length;
        Ok(Self {
            normal: unit,
            offset: -unit.dot(&point.coords),
        })
    }

    /// Best-fit plane of a closed vertex loop (Newell's method).
    pub fn from_points(points: &[Point3<f64>]) -> BooleanResult<Self> {
        if points.len() < 3 {
            return Err(BoolError::malformed(format!(
                "a plane needs at least 3 points, got {}",
                points.len()
            )));
        }
        let normal = newell_normal(points.iter());
        let centroid = points
            .iter()
            .fold(Vector3::zeros(), |acc, p| acc + p.coords)
            / points.len() as f64;
        Self::from_point_normal(&Point3::from(centroid), &normal)
    }

    #[inline]
    pub fn signed_distance(&self, point: &Point3<f64>) -> f64 {
        self.normal.dot(&point.coords) + self.offset
    }

    pub fn flipped(&self) -> Self {
        Self {
            normal: -self.normal,
            offset: -self.offset,
        }
    }

    /// Orthogonal projection of `point` onto the plane.
    pub fn project(&self, point: &Point3<f64>) -> Point3<f64> {
        point - self.normal * self.signed_distance(point)
    }

    /// `Some(true)` when both planes coincide with the same orientation,
    /// `Some(false)` when they coincide with opposite orientation.
    pub fn coincides(&self, other: &Plane, eps: f64) -> Option<bool> {
        let cos = self.normal.dot(&other.normal);
        if (1.0 - cos.abs()) > eps {
            return None;
        }
        let same = cos > 0.0;
        let offset_gap = if same {
            (self.offset - other.offset).abs()
        } else {
            (self.offset + other.offset).abs()
        };
        (offset_gap <= eps).then_some(same)
    }
}

/// Orthonormal frame lying in a plane; `u x v == normal`, so counter-clockwise
/// in 2-D is counter-clockwise about the plane normal.
#[derive(Debug, Clone, Copy)]
pub struct PlaneFrame {
    pub origin: Point3<f64>,
    pub u: Vector3<f64>,
    pub v: Vector3<f64>,
    pub normal: Vector3<f64>,
}

impl PlaneFrame {
    pub fn new(plane: &Plane, origin: &Point3<f64>) -> BooleanResult<Self> {
        let n = plane.normal;
        let helper = if n.x.abs() <= n.y.abs() && n.x.abs() <= n.z.abs() {
            Vector3::x()
        } else if n.y.abs() <= n.z.abs() {
            Vector3::y()
        } else {
            Vector3::z()
        };
        let u = n.cross(&helper);
        let length = finite(u.norm(), "plane frame axis")?;
        if length <= f64::MIN_POSITIVE {
            return Err(BoolError::numerical("cannot build a frame on a degenerate plane"));
        }
        let u = u / length;
        let v = n.cross(&u);
        Ok(Self {
            origin: plane.project(origin),
            u,
            v,
            normal: n,
        })
    }

    /// Rotate into the plane.
    #[inline]
    pub fn to_local(&self, point: &Point3<f64>) -> Point2<f64> {
        let d = point - self.origin;
        Point2::new(d.dot(&self.u), d.dot(&self.v))
    }

    /// Rotate back out of the plane.
    #[inline]
    pub fn to_world(&self, point: &Point2<f64>) -> Point3<f64> {
        self.origin + self.u * point.x + self.v * point.y
    }

    pub fn to_local_all(&self, points: &[Point3<f64>]) -> Vec<Point2<f64>> {
        points.iter().map(|p| self.to_local(p)).collect()
    }
}
