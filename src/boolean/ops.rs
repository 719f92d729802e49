// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Public Boolean operators
//!
//! Thin wrappers over [`BooleanEngine`]. Use the engine directly when the
//! evaluation statistics are needed.

use nalgebra::{Point3, Vector3};
use tracing::{debug, instrument, trace};

use super::engine::{BoolStats, BooleanEngine};
use super::intersect::intersect_self;
use super::loops::chain_polylines;
use super::BoolOp;
use crate::config::{Axis, BoolConfig};
use crate::error::{BoolError, BooleanResult};
use crate::geometry::primitives::covering_disk;
use crate::geometry::{BoundingBox, Mesh, Plane, Polygon, Tolerance};

/// Sides of the disk synthesized for contouring.
const CONTOUR_SEGMENTS: usize = 16;

fn binary(op: BoolOp, a: &Mesh, b: &Mesh, config: &BoolConfig) -> BooleanResult<Mesh> {
    Ok(BooleanEngine::new(config.clone()).evaluate(op, a, b)?.mesh)
}

/// Union of `a` and `b`.
pub fn boolean_or(a: &Mesh, b: &Mesh, config: &BoolConfig) -> BooleanResult<Mesh> {
    binary(BoolOp::Or, a, b, config)
}

/// Intersection of `a` and `b`.
pub fn boolean_and(a: &Mesh, b: &Mesh, config: &BoolConfig) -> BooleanResult<Mesh> {
    binary(BoolOp::And, a, b, config)
}

/// `a` minus `b`.
pub fn boolean_sub(a: &Mesh, b: &Mesh, config: &BoolConfig) -> BooleanResult<Mesh> {
    binary(BoolOp::Sub, a, b, config)
}

/// The part of `a`'s surface outside `b`.
pub fn boolean_cut(a: &Mesh, b: &Mesh, config: &BoolConfig) -> BooleanResult<Mesh> {
    binary(BoolOp::Cut, a, b, config)
}

/// The part of `a`'s surface inside `b`.
pub fn boolean_icut(a: &Mesh, b: &Mesh, config: &BoolConfig) -> BooleanResult<Mesh> {
    binary(BoolOp::ICut, a, b, config)
}

/// Complement: every plane and winding reversed.
pub fn boolean_neg(mesh: &Mesh) -> BooleanResult<Mesh> {
    mesh.validate("A")?;
    Ok(mesh.reversed())
}

/// Self-intersection curves of `mesh`, as polylines.
#[instrument(skip_all, fields(polygons = mesh.len()))]
pub fn boolean_self(mesh: &Mesh, config: &BoolConfig) -> BooleanResult<Mesh> {
    config.validate()?;
    mesh.validate("A")?;
    let tol = Tolerance::for_operands(config, &[mesh.bounding_box()]);
    let mut stats = BoolStats::default();
    let segments = intersect_self(mesh, config, &tol, &mut stats)?;
    let curves = chain_polylines(&segments, &tol);
    debug!(segments = segments.len(), curves = curves.len(), "self-intersection curves");
    Ok(Mesh::from_polylines(curves))
}

/// Cross-section of `mesh` on `plane`: the part of a disk covering the mesh
/// that lies inside it. With [`BoolConfig::intersection_curves`] set, the
/// section outline is returned as polylines instead.
pub fn boolean_contour(mesh: &Mesh, plane: &Plane, config: &BoolConfig) -> BooleanResult<Mesh> {
    mesh.validate("B")?;
    let disk = covering_disk(plane, &mesh.bounding_box(), CONTOUR_SEGMENTS)?;
    boolean_icut(&Mesh::from_polygons(vec![disk]), mesh, config)
}

/// Cross-sections of `mesh` at each of `levels` along `axis`, in the order
/// the levels are given.
///
/// Levels are visited in ascending order while a window of polygons whose
/// extent spans the current level is maintained, so each section only sees
/// the polygons that can reach it.
#[instrument(skip_all, fields(polygons = mesh.len(), levels = levels.len(), ?axis))]
pub fn boolean_multi_contour(
    mesh: &Mesh,
    axis: Axis,
    levels: &[f64],
    config: &BoolConfig,
) -> BooleanResult<Vec<Mesh>> {
    mesh.validate("B")?;
    if let Some(bad) = levels.iter().find(|l| !l.is_finite()) {
        return Err(BoolError::malformed(format!("contour level {bad} is not finite")));
    }
    let k = axis.index();
    let boxes: Vec<BoundingBox> = mesh.polygons.iter().map(Polygon::bounding_box).collect();
    let mut order: Vec<usize> = (0..mesh.len()).collect();
    order.sort_by(|&i, &j| boxes[i].min[k].total_cmp(&boxes[j].min[k]));
    let mut visit: Vec<usize> = (0..levels.len()).collect();
    visit.sort_by(|&i, &j| levels[i].total_cmp(&levels[j]));

    let mut normal = Vector3::zeros();
    normal[k] = 1.0;
    let mut sections = vec![Mesh::new(); levels.len()];
    let mut active: Vec<usize> = Vec::new();
    let mut next = 0;

    for li in visit {
        let level = levels[li];
        while next < order.len() && boxes[order[next]].min[k] <= level {
            active.push(order[next]);
            next += 1;
        }
        active.retain(|&i| boxes[i].max[k] >= level);
        if active.is_empty() {
            trace!(level, "no polygon spans this level");
            continue;
        }
        let window = Mesh::from_polygons(active.iter().map(|&i| mesh.polygons[i].clone()).collect());
        let mut origin = Point3::origin();
        origin[k] = level;
        let plane = Plane::from_point_normal(&origin, &normal)?;
        sections[li] = boolean_contour(&window, &plane, config)?;
        trace!(level, active = active.len(), polygons = sections[li].len(), "section cut");
    }
    Ok(sections)
}
