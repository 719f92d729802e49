// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

use anyhow::Result;
use nalgebra::{Point3, Vector3};
use polybool::boolean::adjacency::is_reciprocal;
use polybool::boolean::{compute_adjacency, mark_disjoint_parts};
use polybool::geometry::Tolerance;
use polybool::{Mesh, Polygon, Primitive};

fn flat(points: &[[f64; 2]]) -> Result<Polygon> {
    Ok(Polygon::from_points(
        points.iter().map(|p| Point3::new(p[0], p[1], 0.0)).collect(),
    )?)
}

#[test]
fn closed_triangle_mesh() -> Result<()> {
    let tol = Tolerance::default();
    let mut mesh = Primitive::cube(Vector3::new(1.0, 1.0, 1.0), true).to_triangle_mesh()?;
    let report = compute_adjacency(&mut mesh, &tol)?;

    assert!(report.closed);
    assert_eq!(report.exact_links, 18);
    assert_eq!(report.partial_links, 0);
    assert!(is_reciprocal(&mesh, &tol));
    Ok(())
}

#[test]
fn edge_shared_in_halves_is_slit() -> Result<()> {
    let tol = Tolerance::default();
    let mut mesh = Mesh::from_polygons(vec![
        flat(&[[0.0, 0.0], [2.0, 0.0], [2.0, 1.0], [0.0, 1.0]])?,
        flat(&[[0.0, 1.0], [1.0, 1.0], [0.5, 2.0]])?,
        flat(&[[1.0, 1.0], [2.0, 1.0], [1.5, 2.0]])?,
    ]);
    let report = compute_adjacency(&mut mesh, &tol)?;

    assert!(!report.closed);
    assert!(report.partial_links >= 2);
    assert_eq!(report.split_vertices, 1);
    assert_eq!(mesh.polygons[0].len(), 5);
    assert!(is_reciprocal(&mesh, &tol));

    let quad = &mesh.polygons[0];
    let partners: Vec<usize> = quad.vertices.iter().filter_map(|v| v.adjacent).map(|p| p.0).collect();
    assert_eq!(partners.len(), 2);
    assert!(partners.contains(&1) && partners.contains(&2));
    Ok(())
}

#[test]
fn recomputing_is_stable() -> Result<()> {
    let tol = Tolerance::default();
    let mut mesh = Primitive::cylinder(1.0, 0.5, 10).to_mesh()?;
    let first = compute_adjacency(&mut mesh, &tol)?;
    let second = compute_adjacency(&mut mesh, &tol)?;
    assert_eq!(first, second);
    assert!(second.closed);
    Ok(())
}

#[test]
fn components_follow_adjacency() -> Result<()> {
    let tol = Tolerance::default();
    let mut mesh = Primitive::cube(Vector3::new(1.0, 1.0, 1.0), false).to_mesh()?;
    mesh.extend(Primitive::sphere(0.5, 8).to_mesh()?.translated(&Vector3::new(4.0, 0.0, 0.0)));
    compute_adjacency(&mut mesh, &tol)?;

    let parts = mark_disjoint_parts(&mesh, 1024)?;
    assert_eq!(parts.count, 2);
    assert_eq!(parts.members(parts.label(polybool::PolyId(0))).count(), 6);
    assert!(mark_disjoint_parts(&mesh, 1).is_err());
    Ok(())
}
