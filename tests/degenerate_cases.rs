// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Tangent operands, the perturb-and-retry path and the no-intersection
//! fallback.

use anyhow::Result;
use approx::assert_relative_eq;
use nalgebra::{Point3, Rotation3, Vector3};
use polybool::{
    BoolConfig, BoolError, BoolOp, BooleanEngine, Mesh, NoIntersectionPolicy, Polygon, Primitive,
};
use std::f64::consts::{FRAC_1_SQRT_2, FRAC_PI_4};

fn cuboid(min: [f64; 3], max: [f64; 3]) -> Result<Mesh> {
    Ok(Primitive::cuboid(Point3::from(min), Point3::from(max)).to_mesh()?)
}

/// Two unit cubes sharing the face `x = 1`.
fn face_to_face() -> Result<(Mesh, Mesh)> {
    let a = cuboid([0.0, 0.0, 0.0], [1.0, 1.0, 1.0])?;
    let b = a.translated(&Vector3::new(1.0, 0.0, 0.0));
    Ok((a, b))
}

#[test]
fn tangent_union_concatenates() -> Result<()> {
    let (a, b) = face_to_face()?;
    let engine = BooleanEngine::new(BoolConfig::default().with_coplanar(false));
    let outcome = engine.evaluate(BoolOp::Or, &a, &b)?;

    assert!(!outcome.mesh.is_empty());
    assert_eq!(outcome.stats.retries, 0);
    assert!(outcome.stats.no_intersection);
    assert_relative_eq!(outcome.mesh.signed_volume(), 2.0, epsilon = 1e-9);
    Ok(())
}

#[test]
fn tangent_intersection_retries_once() -> Result<()> {
    let (a, b) = face_to_face()?;
    let engine = BooleanEngine::new(BoolConfig::default().with_coplanar(false));
    let outcome = engine.evaluate(BoolOp::And, &a, &b)?;

    assert_eq!(outcome.stats.retries, 1);
    assert!(!outcome.mesh.is_empty());
    // B moved into A by the perturbation, leaving a thin sliver.
    let volume = outcome.mesh.signed_volume();
    assert!(volume > 0.0 && volume < 1e-5, "sliver volume {volume}");
    Ok(())
}

#[test]
fn without_perturbation_falls_back() -> Result<()> {
    let (a, b) = face_to_face()?;
    let config = BoolConfig::default().with_coplanar(false).with_perturbation(0.0);
    let outcome = BooleanEngine::new(config).evaluate(BoolOp::Sub, &a, &b)?;

    assert_eq!(outcome.stats.retries, 0);
    assert!(outcome.stats.no_intersection);
    assert_relative_eq!(outcome.mesh.signed_volume(), 1.0, epsilon = 1e-9);
    Ok(())
}

#[test]
fn strict_mode_reports_no_intersection() -> Result<()> {
    let (a, b) = face_to_face()?;
    let engine = BooleanEngine::new(BoolConfig::strict().with_coplanar(false));

    let err = engine.evaluate(BoolOp::And, &a, &b).unwrap_err();
    assert!(matches!(err, BoolError::NoIntersection));
    assert!(err.is_recoverable());

    // Union of disjoint operands is never an error.
    let union = engine.evaluate(BoolOp::Or, &a, &b)?;
    assert_eq!(union.mesh.len(), 12);

    let config = BoolConfig::default().with_no_intersection(NoIntersectionPolicy::Error);
    let far = a.translated(&Vector3::new(5.0, 0.0, 0.0));
    let err = BooleanEngine::new(config).evaluate(BoolOp::Sub, &a, &far).unwrap_err();
    assert!(matches!(err, BoolError::NoIntersection));
    Ok(())
}

#[test]
fn coplanar_faces_resolve_without_retry() -> Result<()> {
    let (a, b) = face_to_face()?;
    let engine = BooleanEngine::new(BoolConfig::default());

    let union = engine.evaluate(BoolOp::Or, &a, &b)?;
    assert_eq!(union.stats.retries, 0);
    assert!(union.stats.coplanar_pairs > 0);
    assert_relative_eq!(union.mesh.signed_volume(), 2.0, epsilon = 1e-9);
    // Opposite-facing shared faces cancel.
    assert_eq!(union.mesh.len(), 10);
    Ok(())
}

#[test]
fn untouched_component_is_classified_by_propagation() -> Result<()> {
    let mut a = cuboid([0.0, 0.0, 0.0], [1.0, 1.0, 1.0])?;
    let far = cuboid([5.0, 5.0, 5.0], [6.0, 6.0, 6.0])?;
    a.extend(far.clone());
    let b = cuboid([0.5, 0.25, 0.3], [1.5, 1.25, 1.3])?;
    let engine = BooleanEngine::new(BoolConfig::default());

    let far_faces = |mesh: &Mesh| {
        mesh.polygons
            .iter()
            .filter(|p| p.bounding_box().min.x >= 5.0)
            .count()
    };

    let union = engine.evaluate(BoolOp::Or, &a, &b)?;
    assert_eq!(union.stats.component_tests, 1);
    assert_eq!(union.stats.polygon_tests, 0);
    assert_eq!(far_faces(&union.mesh), 6);

    let intersection = engine.evaluate(BoolOp::And, &a, &b)?;
    assert_eq!(far_faces(&intersection.mesh), 0);
    assert_relative_eq!(intersection.mesh.signed_volume(), 0.5 * 0.75 * 0.7, epsilon = 1e-9);
    Ok(())
}

/// Unit cube turned 45 degrees about x, so two of its edges run along x at
/// the height of `center`, and one edge sits `FRAC_1_SQRT_2` below it.
fn diamond_bar(center: Point3<f64>) -> Result<Mesh> {
    let rotation = Rotation3::from_axis_angle(&Vector3::x_axis(), FRAC_PI_4);
    let cube = Primitive::cube(Vector3::new(1.0, 1.0, 1.0), true).to_mesh()?;
    let mut polygons = Vec::with_capacity(cube.len());
    for polygon in &cube.polygons {
        let points = polygon.points().iter().map(|p| center + rotation * p.coords).collect();
        polygons.push(Polygon::from_points(points)?);
    }
    Ok(Mesh::from_polygons(polygons))
}

#[test]
fn edge_resting_on_a_face_is_a_touch() -> Result<()> {
    let block = cuboid([0.0, 0.0, 0.0], [2.0, 2.0, 2.0])?;
    let bar = diamond_bar(Point3::new(1.0, 1.0, 2.0 + FRAC_1_SQRT_2))?;
    let engine = BooleanEngine::new(BoolConfig::default());

    let union = engine.evaluate(BoolOp::Or, &block, &bar)?;
    assert!(union.stats.no_intersection);
    assert_relative_eq!(union.mesh.signed_volume(), 9.0, epsilon = 1e-9);

    let intersection = engine.evaluate(BoolOp::And, &block, &bar)?;
    assert!(intersection.mesh.is_empty());

    let difference = engine.evaluate(BoolOp::Sub, &block, &bar)?;
    assert_relative_eq!(difference.mesh.signed_volume(), 8.0, epsilon = 1e-9);
    Ok(())
}

#[test]
fn edges_lying_in_a_face_cut_it() -> Result<()> {
    let block = cuboid([0.0, 0.0, 0.0], [2.0, 2.0, 2.0])?;
    // Half the bar sinks into the block, two of its edges flush with the top.
    let bar = diamond_bar(Point3::new(1.0, 1.0, 2.0))?;
    let engine = BooleanEngine::new(BoolConfig::default());

    let intersection = engine.evaluate(BoolOp::And, &block, &bar)?;
    assert_eq!(intersection.stats.retries, 0);
    assert_relative_eq!(intersection.mesh.signed_volume(), 0.5, epsilon = 1e-9);
    let union = engine.evaluate(BoolOp::Or, &block, &bar)?;
    assert_relative_eq!(union.mesh.signed_volume(), 8.5, epsilon = 1e-9);
    let difference = engine.evaluate(BoolOp::Sub, &block, &bar)?;
    assert_relative_eq!(difference.mesh.signed_volume(), 7.5, epsilon = 1e-9);
    Ok(())
}

/// Closed L-shaped prism: a leg `x in [0.5, 1], z in [1, 3]` with a step
/// `x in [1, 1.5], z in [2, 3]`, both over `y in [0.5, 1.5]`.
fn l_prism() -> Result<Mesh> {
    let faces: [&[[f64; 3]]; 10] = [
        // y = 0.5, as two rectangles
        &[[0.5, 0.5, 1.0], [1.0, 0.5, 1.0], [1.0, 0.5, 3.0], [0.5, 0.5, 3.0]],
        &[[1.0, 0.5, 2.0], [1.5, 0.5, 2.0], [1.5, 0.5, 3.0], [1.0, 0.5, 3.0]],
        // y = 1.5
        &[[0.5, 1.5, 1.0], [0.5, 1.5, 3.0], [1.0, 1.5, 3.0], [1.0, 1.5, 1.0]],
        &[[1.0, 1.5, 2.0], [1.0, 1.5, 3.0], [1.5, 1.5, 3.0], [1.5, 1.5, 2.0]],
        // leg bottom and step bottom
        &[[0.5, 0.5, 1.0], [0.5, 1.5, 1.0], [1.0, 1.5, 1.0], [1.0, 0.5, 1.0]],
        &[[1.0, 0.5, 2.0], [1.0, 1.5, 2.0], [1.5, 1.5, 2.0], [1.5, 0.5, 2.0]],
        // top
        &[[0.5, 0.5, 3.0], [1.5, 0.5, 3.0], [1.5, 1.5, 3.0], [0.5, 1.5, 3.0]],
        // x = 0.5, x = 1 below the step, x = 1.5
        &[[0.5, 0.5, 1.0], [0.5, 0.5, 3.0], [0.5, 1.5, 3.0], [0.5, 1.5, 1.0]],
        &[[1.0, 0.5, 1.0], [1.0, 1.5, 1.0], [1.0, 1.5, 2.0], [1.0, 0.5, 2.0]],
        &[[1.5, 0.5, 2.0], [1.5, 1.5, 2.0], [1.5, 1.5, 3.0], [1.5, 0.5, 3.0]],
    ];
    let polygons = faces
        .iter()
        .map(|face| Polygon::from_points(face.iter().map(|p| Point3::from(*p)).collect()))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Mesh::from_polygons(polygons))
}

#[test]
fn coplanar_face_is_also_cut_by_crossing_walls() -> Result<()> {
    let block = cuboid([0.0, 0.0, 0.0], [2.0, 2.0, 2.0])?;
    let bracket = l_prism()?;
    assert_relative_eq!(bracket.signed_volume(), 1.5, epsilon = 1e-12);
    let engine = BooleanEngine::new(BoolConfig::default());

    // The step sits flush on the block's top while the leg passes through it.
    let union = engine.evaluate(BoolOp::Or, &block, &bracket)?;
    assert!(union.stats.coplanar_pairs > 0);
    assert_relative_eq!(union.mesh.signed_volume(), 9.0, epsilon = 1e-9);

    let intersection = engine.evaluate(BoolOp::And, &block, &bracket)?;
    assert_relative_eq!(intersection.mesh.signed_volume(), 0.5, epsilon = 1e-9);

    let difference = engine.evaluate(BoolOp::Sub, &block, &bracket)?;
    assert_relative_eq!(difference.mesh.signed_volume(), 7.5, epsilon = 1e-9);
    Ok(())
}
