// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Convex-faced primitive solids and planar polygons
//!
//! Every face is emitted counter-clockwise about its outward normal, which
//! is the orientation the Boolean engine expects of closed operands.

use std::f64::consts::PI;

use nalgebra::{Point2, Point3, Vector3};

use super::{BoundingBox, Mesh, Plane, PlaneFrame, Polygon};
use crate::error::{BoolError, BooleanResult};

/// Geometric primitives
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Cube { size: Vector3<f64>, center: bool },
    Cuboid { min: Point3<f64>, max: Point3<f64> },
    Sphere { r: f64, fn_: u32 },
    Cylinder { h: f64, r: f64, fn_: u32 },
}

impl Primitive {
    pub fn cube(size: Vector3<f64>, center: bool) -> Self {
        Self::Cube { size, center }
    }

    pub fn cuboid(min: Point3<f64>, max: Point3<f64>) -> Self {
        Self::Cuboid { min, max }
    }

    pub fn sphere(r: f64, fn_: u32) -> Self {
        let segments = if fn_ > 0 { fn_ } else { 32 };
        Self::Sphere { r, fn_: segments }
    }

    pub fn cylinder(h: f64, r: f64, fn_: u32) -> Self {
        let segments = if fn_ > 0 { fn_ } else { 32 };
        Self::Cylinder {
            h,
            r,
            fn_: segments,
        }
    }

    /// Mesh with one polygon per face (quads where the face is a quad).
    pub fn to_mesh(&self) -> BooleanResult<Mesh> {
        let faces = self.faces()?;
        let polygons = faces
            .into_iter()
            .map(Polygon::from_points)
            .collect::<BooleanResult<Vec<_>>>()?;
        Ok(Mesh::from_polygons(polygons))
    }

    /// Mesh with every face fanned into triangles.
    pub fn to_triangle_mesh(&self) -> BooleanResult<Mesh> {
        let mut polygons = Vec::new();
        for face in self.faces()? {
            for i in 1..face.len() - 1 {
                polygons.push(Polygon::from_points(vec![face[0], face[i], face[i + 1]])?);
            }
        }
        Ok(Mesh::from_polygons(polygons))
    }

    fn faces(&self) -> BooleanResult<Vec<Vec<Point3<f64>>>> {
        match self {
            Self::Cube { size, center } => {
                let min = if *center {
                    Point3::from(-size / 2.0)
                } else {
                    Point3::origin()
                };
                cuboid_faces(min, min + size)
            }
            Self::Cuboid { min, max } => cuboid_faces(*min, *max),
            Self::Sphere { r, fn_ } => sphere_faces(*r, *fn_),
            Self::Cylinder { h, r, fn_ } => cylinder_faces(*h, *r, *fn_),
        }
    }
}

fn cuboid_faces(min: Point3<f64>, max: Point3<f64>) -> BooleanResult<Vec<Vec<Point3<f64>>>> {
    if !(0..3).all(|i| max[i] > min[i]) {
        return Err(BoolError::malformed(format!(
            "cuboid needs positive extent, got {min:?}..{max:?}"
        )));
    }
    // 8 corners, bottom ring then top ring
    let p = [
        Point3::new(min.x, min.y, min.z),
        Point3::new(max.x, min.y, min.z),
        Point3::new(max.x, max.y, min.z),
        Point3::new(min.x, max.y, min.z),
        Point3::new(min.x, min.y, max.z),
        Point3::new(max.x, min.y, max.z),
        Point3::new(max.x, max.y, max.z),
        Point3::new(min.x, max.y, max.z),
    ];
    let faces = [
        [0, 3, 2, 1], // z-
        [4, 5, 6, 7], // z+
        [0, 1, 5, 4], // y-
        [3, 7, 6, 2], // y+
        [0, 4, 7, 3], // x-
        [1, 2, 6, 5], // x+
    ];
    Ok(faces
        .iter()
        .map(|face| face.iter().map(|&i| p[i]).collect())
        .collect())
}

fn sphere_faces(r: f64, fn_: u32) -> BooleanResult<Vec<Vec<Point3<f64>>>> {
    if r <= 0.0 || fn_ < 3 {
        return Err(BoolError::malformed(format!(
            "sphere needs r > 0 and at least 3 segments, got r={r}, segments={fn_}"
        )));
    }
    let slices = fn_ as usize;
    let stacks = (slices / 2).max(2);
    let at = |i: usize, j: usize| {
        let theta = PI * i as f64 / stacks as f64;
        let phi = 2.0 * PI * (j % slices) as f64 / slices as f64;
        Point3::new(
            r * theta.sin() * phi.cos(),
            r * theta.sin() * phi.sin(),
            r * theta.cos(),
        )
    };
    let north = Point3::new(0.0, 0.0, r);
    let south = Point3::new(0.0, 0.0, -r);

    let mut faces = Vec::with_capacity(slices * stacks);
    for j in 0..slices {
        faces.push(vec![north, at(1, j), at(1, j + 1)]);
    }
    for i in 1..stacks - 1 {
        for j in 0..slices {
            faces.push(vec![at(i, j), at(i + 1, j), at(i + 1, j + 1), at(i, j + 1)]);
        }
    }
    for j in 0..slices {
        faces.push(vec![at(stacks - 1, j), south, at(stacks - 1, j + 1)]);
    }
    Ok(faces)
}

fn cylinder_faces(h: f64, r: f64, fn_: u32) -> BooleanResult<Vec<Vec<Point3<f64>>>> {
    if h <= 0.0 || r <= 0.0 || fn_ < 3 {
        return Err(BoolError::malformed(format!(
            "cylinder needs h > 0, r > 0 and at least 3 segments, got h={h}, r={r}, segments={fn_}"
        )));
    }
    let ring: Vec<Point2<f64>> = regular_ring(r, fn_ as usize);
    let bottom: Vec<Point3<f64>> = ring.iter().map(|p| Point3::new(p.x, p.y, 0.0)).collect();
    let top: Vec<Point3<f64>> = ring.iter().map(|p| Point3::new(p.x, p.y, h)).collect();

    let mut faces = Vec::with_capacity(ring.len() + 2);
    faces.push(bottom.iter().rev().copied().collect());
    faces.push(top.clone());
    let n = ring.len();
    for j in 0..n {
        let k = (j + 1) % n;
        faces.push(vec![bottom[j], bottom[k], top[k], top[j]]);
    }
    Ok(faces)
}

fn regular_ring(r: f64, segments: usize) -> Vec<Point2<f64>> {
    (0..segments)
        .map(|j| {
            let phi = 2.0 * PI * j as f64 / segments as f64;
            Point2::new(r * phi.cos(), r * phi.sin())
        })
        .collect()
}

/// Axis-aligned square in the plane `z = z`, counter-clockwise about +Z.
pub fn square(center: Point2<f64>, half: f64, z: f64) -> BooleanResult<Polygon> {
    Polygon::from_points(vec![
        Point3::new(center.x - half, center.y - half, z),
        Point3::new(center.x + half, center.y - half, z),
        Point3::new(center.x + half, center.y + half, z),
        Point3::new(center.x - half, center.y + half, z),
    ])
}

/// Regular polygon lying on `plane`, centered on the projection of `center`,
/// counter-clockwise about the plane normal.
pub fn regular_polygon(
    plane: &Plane,
    center: &Point3<f64>,
    radius: f64,
    segments: usize,
) -> BooleanResult<Polygon> {
    if segments < 3 || radius <= 0.0 {
        return Err(BoolError::malformed(format!(
            "regular polygon needs radius > 0 and 3+ segments, got {radius}, {segments}"
        )));
    }
    let frame = PlaneFrame::new(plane, center)?;
    let points = regular_ring(radius, segments)
        .iter()
        .map(|p| frame.to_world(p))
        .collect();
    let mut polygon = Polygon::from_points(points)?;
    polygon.plane = *plane;
    Ok(polygon)
}

/// A disk on `plane` large enough to cover `bbox` entirely.
pub fn covering_disk(plane: &Plane, bbox: &BoundingBox, segments: usize) -> BooleanResult<Polygon> {
    let radius = (bbox.diagonal() * 0.5 + 1.0) * 1.5 / (PI / segments as f64).cos();
    regular_polygon(plane, &bbox.center(), radius, segments)
}
