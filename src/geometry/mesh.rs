// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Polygonal mesh representation and utilities

use nalgebra::{Point3, Vector2, Vector3};
use serde::{Deserialize, Serialize};

use super::{BoundingBox, Plane, Tolerance};
use crate::error::{BoolError, BooleanResult};

/// Stable handle of a polygon inside one [`Mesh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PolyId(pub usize);

impl PolyId {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Transient per-vertex tag bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexTags {
    /// The vertex lies on the boundary of an input polygon.
    pub input_boundary: bool,
    /// The vertex belongs to a hole bridge.
    pub slit: bool,
}

/// Polygon corner. The edge starting here runs to the next vertex of the
/// owning polygon; `adjacent` names the polygon across that edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub position: Point3<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uv: Option<Vector2<f64>>,
    #[serde(skip)]
    pub adjacent: Option<PolyId>,
    #[serde(skip)]
    pub tags: VertexTags,
}

impl Vertex {
    pub fn new(position: Point3<f64>) -> Self {
        Self {
            position,
            uv: None,
            adjacent: None,
            tags: VertexTags {
                input_boundary: true,
                slit: false,
            },
        }
    }

    pub fn with_uv(mut self, uv: Vector2<f64>) -> Self {
        self.uv = Some(uv);
        self
    }

    /// A vertex created by the engine rather than read from the input.
    pub(crate) fn created(position: Point3<f64>, uv: Option<Vector2<f64>>) -> Self {
        Self {
            position,
            uv,
            adjacent: None,
            tags: VertexTags::default(),
        }
    }
}

/// Classification lifecycle of a polygon during one Boolean evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PolyState {
    #[default]
    Untested,
    /// No intersection segments; awaiting classification.
    Complete,
    /// Replaced by reconstructed pieces.
    Split,
    /// Inside the other operand.
    Inside,
    /// Outside the other operand.
    Outside,
}

/// Planar polygon with an ordered, cyclic vertex list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub vertices: Vec<Vertex>,
    pub plane: Plane,
    /// False for reconstructed polygons that carry a hole slit or a concave trim.
    pub convex: bool,
    #[serde(skip)]
    pub state: PolyState,
    #[serde(skip)]
    pub coplanar: bool,
}

impl Polygon {
    /// Build a polygon from positions, computing its plane.
    pub fn from_points(points: Vec<Point3<f64>>) -> BooleanResult<Self> {
        Self::from_vertices(points.into_iter().map(Vertex::new).collect())
    }

    pub fn from_vertices(vertices: Vec<Vertex>) -> BooleanResult<Self> {
        if vertices.len() < 3 {
            return Err(BoolError::malformed(format!(
                "polygon needs at least 3 vertices, got {}",
                vertices.len()
            )));
        }
        if let Some(bad) = vertices.iter().find(|v| !v.position.coords.iter().all(|c| c.is_finite())) {
            return Err(BoolError::malformed(format!(
                "non-finite vertex {:?}",
                bad.position
            )));
        }
        let points: Vec<_> = vertices.iter().map(|v| v.position).collect();
        let plane = Plane::from_points(&points).map_err(|e| match e {
            BoolError::Numerical { .. } => BoolError::malformed("polygon has zero area"),
            other => other,
        })?;
        let mut polygon = Self {
            vertices,
            plane,
            convex: true,
            state: PolyState::Untested,
            coplanar: false,
        };
        polygon.convex = polygon.is_convex(&Tolerance::default());
        Ok(polygon)
    }

    /// A polygon cut from a parent, keeping the parent's plane.
    pub(crate) fn with_plane(vertices: Vec<Vertex>, plane: Plane, convex: bool) -> Self {
        Self {
            vertices,
            plane,
            convex,
            state: PolyState::Untested,
            coplanar: false,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    #[inline]
    pub fn next(&self, i: usize) -> usize {
        (i + 1) % self.vertices.len()
    }

    #[inline]
    pub fn prev(&self, i: usize) -> usize {
        (i + self.vertices.len() - 1) % self.vertices.len()
    }

    #[inline]
    pub fn point(&self, i: usize) -> &Point3<f64> {
        &self.vertices[i].position
    }

    /// Edge `i` runs from vertex `i` to its successor.
    #[inline]
    pub fn edge(&self, i: usize) -> (Point3<f64>, Point3<f64>) {
        (self.vertices[i].position, self.vertices[self.next(i)].position)
    }

    pub fn points(&self) -> Vec<Point3<f64>> {
        self.vertices.iter().map(|v| v.position).collect()
    }

    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_points(self.vertices.iter().map(|v| &v.position))
    }

    pub fn centroid(&self) -> Point3<f64> {
        let sum = self
            .vertices
            .iter()
            .fold(Vector3::zeros(), |acc, v| acc + v.position.coords);
        Point3::from(sum / self.vertices.len().max(1) as f64)
    }

    /// Signed area about the polygon's own normal; valid for slit polygons.
    pub fn area(&self) -> f64 {
        let origin = self.vertices[0].position;
        let mut twice = 0.0;
        for i in 1..self.len().saturating_sub(1) {
            let a = self.vertices[i].position - origin;
            let b = self.vertices[i + 1].position - origin;
            twice += a.cross(&b).dot(&self.plane.normal);
        }
        twice * 0.5
    }

    /// Convexity about the plane normal; collinear corners are allowed.
    pub fn is_convex(&self, tol: &Tolerance) -> bool {
        let n = self.len();
        (0..n).all(|i| {
            let a = self.vertices[self.prev(i)].position;
            let b = self.vertices[i].position;
            let c = self.vertices[self.next(i)].position;
            (b - a).cross(&(c - b)).dot(&self.plane.normal) >= -tol.eps
        })
    }

    /// Plane sign and winding reversed.
    pub fn reversed(&self) -> Self {
        let mut vertices: Vec<Vertex> = self.vertices.iter().rev().copied().collect();
        for v in &mut vertices {
            v.adjacent = None;
        }
        Self {
            vertices,
            plane: self.plane.flipped(),
            convex: self.convex,
            state: self.state,
            coplanar: self.coplanar,
        }
    }

    pub fn translate(&mut self, offset: &Vector3<f64>) {
        for v in &mut self.vertices {
            v.position += offset;
        }
        self.plane.offset -= self.plane.normal.dot(offset);
    }

    pub fn clear_adjacency(&mut self) {
        for v in &mut self.vertices {
            v.adjacent = None;
        }
    }

    /// Drop consecutive duplicate vertices. Returns the number removed.
    pub fn remove_zero_length_edges(&mut self, tol: &Tolerance) -> usize {
        let before = self.vertices.len();
        let mut kept: Vec<Vertex> = Vec::with_capacity(before);
        for v in &self.vertices {
            match kept.last() {
                Some(last) if tol.same_point(&last.position, &v.position) => {}
                _ => kept.push(*v),
            }
        }
        while kept.len() > 1 {
            let (first, last) = (kept[0].position, kept[kept.len() - 1].position);
            if tol.same_point(&first, &last) {
                kept.pop();
            } else {
                break;
            }
        }
        self.vertices = kept;
        before - self.vertices.len()
    }

    /// Geometric equality up to the starting vertex.
    pub fn same_shape(&self, other: &Polygon, tol: &Tolerance) -> bool {
        let n = self.len();
        if n != other.len() || n == 0 {
            return false;
        }
        (0..n).any(|shift| {
            (0..n).all(|i| tol.same_point(self.point(i), other.point((i + shift) % n)))
        })
    }
}

/// Open or closed chain of points, used for intersection curves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polyline {
    pub points: Vec<Point3<f64>>,
    pub closed: bool,
}

impl Polyline {
    pub fn length(&self) -> f64 {
        let mut total: f64 = self.points.windows(2).map(|w| (w[1] - w[0]).norm()).sum();
        if self.closed && self.points.len() > 2 {
            total += (self.points[0] - self.points[self.points.len() - 1]).norm();
        }
        total
    }
}

/// Unordered collection of polygons, plus intersection curves when a call
/// was asked for them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    pub polygons: Vec<Polygon>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub polylines: Vec<Polyline>,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_polygons(polygons: Vec<Polygon>) -> Self {
        Self {
            polygons,
            polylines: Vec::new(),
        }
    }

    pub fn from_polylines(polylines: Vec<Polyline>) -> Self {
        Self {
            polygons: Vec::new(),
            polylines,
        }
    }

    pub fn push(&mut self, polygon: Polygon) -> PolyId {
        self.polygons.push(polygon);
        PolyId(self.polygons.len() - 1)
    }

    #[inline]
    pub fn polygon(&self, id: PolyId) -> &Polygon {
        &self.polygons[id.0]
    }

    #[inline]
    pub fn polygon_mut(&mut self, id: PolyId) -> &mut Polygon {
        &mut self.polygons[id.0]
    }

    pub fn ids(&self) -> impl Iterator<Item = PolyId> {
        (0..self.polygons.len()).map(PolyId)
    }

    pub fn len(&self) -> usize {
        self.polygons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty() && self.polylines.is_empty()
    }

    pub fn vertex_count(&self) -> usize {
        self.polygons.iter().map(Polygon::len).sum()
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let mut bbox = BoundingBox::from_points(
            self.polygons
                .iter()
                .flat_map(|p| p.vertices.iter().map(|v| &v.position)),
        );
        for line in &self.polylines {
            for p in &line.points {
                bbox.expand_to_include(p);
            }
        }
        bbox
    }

    /// Reject meshes the engine cannot evaluate.
    pub fn validate(&self, name: &str) -> BooleanResult<()> {
        if self.polygons.is_empty() {
            return Err(BoolError::malformed(format!("operand {name} is an empty mesh")));
        }
        for (i, polygon) in self.polygons.iter().enumerate() {
            if polygon.len() < 3 {
                return Err(BoolError::malformed(format!(
                    "operand {name}: polygon {i} has {} vertices",
                    polygon.len()
                )));
            }
            let finite = polygon
                .vertices
                .iter()
                .all(|v| v.position.coords.iter().all(|c| c.is_finite()))
                && polygon.plane.normal.iter().all(|c| c.is_finite())
                && polygon.plane.offset.is_finite();
            if !finite {
                return Err(BoolError::malformed(format!(
                    "operand {name}: polygon {i} has non-finite coordinates"
                )));
            }
        }
        Ok(())
    }

    pub fn translated(&self, offset: &Vector3<f64>) -> Mesh {
        let mut moved = self.clone();
        for polygon in &mut moved.polygons {
            polygon.translate(offset);
        }
        for line in &mut moved.polylines {
            for p in &mut line.points {
                *p += offset;
            }
        }
        moved
    }

    /// Every polygon with flipped plane and winding.
    pub fn reversed(&self) -> Mesh {
        Mesh {
            polygons: self.polygons.iter().map(Polygon::reversed).collect(),
            polylines: self.polylines.clone(),
        }
    }

    pub fn extend(&mut self, other: Mesh) {
        self.polygons.extend(other.polygons);
        self.polylines.extend(other.polylines);
    }

    pub fn clear_adjacency(&mut self) {
        for polygon in &mut self.polygons {
            polygon.clear_adjacency();
        }
    }

    /// Remove zero-length edges and drop polygons left with fewer than three
    /// vertices. Returns the number of vertices removed.
    pub fn cleanup(&mut self, tol: &Tolerance) -> usize {
        let mut removed = 0;
        for polygon in &mut self.polygons {
            removed += polygon.remove_zero_length_edges(tol);
        }
        self.polygons.retain(|p| p.len() >= 3);
        removed
    }

    /// Total signed area of all polygons.
    pub fn area(&self) -> f64 {
        self.polygons.iter().map(Polygon::area).sum()
    }

    /// Enclosed volume (divergence theorem over fan triangles).
    pub fn signed_volume(&self) -> f64 {
        let mut six = 0.0;
        for polygon in &self.polygons {
            let o = polygon.vertices[0].position.coords;
            for i in 1..polygon.len().saturating_sub(1) {
                let a = polygon.vertices[i].position.coords;
                let b = polygon.vertices[i + 1].position.coords;
                six += o.dot(&a.cross(&b));
            }
        }
        six / 6.0
    }

    /// True when both meshes hold the same polygons in any order.
    pub fn same_polygons(&self, other: &Mesh, tol: &Tolerance) -> bool {
        if self.len() != other.len() {
            return false;
        }
        let mut used = vec![false; other.len()];
        self.polygons.iter().all(|p| {
            let found = other
                .polygons
                .iter()
                .enumerate()
                .find(|(j, q)| !used[*j] && p.same_shape(q, tol));
            match found {
                Some((j, _)) => {
                    used[j] = true;
                    true
                }
                None => false,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square(z: f64) -> Polygon {
        Polygon::from_points(vec![
            Point3::new(0.0, 0.0, z),
            Point3::new(1.0, 0.0, z),
            Point3::new(1.0, 1.0, z),
            Point3::new(0.0, 1.0, z),
        ])
        .unwrap()
    }

    #[test]
    fn test_polygon_rejects_bad_input() {
        assert!(Polygon::from_points(vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)]).is_err());
        let err = Polygon::from_points(vec![
            Point3::origin(),
            Point3::new(f64::NAN, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ])
        .unwrap_err();
        assert!(matches!(err, BoolError::MalformedInput { .. }));
    }

    #[test]
    fn test_area_and_convexity() {
        let sq = square(0.0);
        assert_relative_eq!(sq.area(), 1.0, epsilon = 1e-12);
        assert!(sq.convex);

        let l_shape = Polygon::from_points(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(2.0, 1.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(1.0, 2.0, 0.0),
            Point3::new(0.0, 2.0, 0.0),
        ])
        .unwrap();
        assert!(!l_shape.convex);
        assert_relative_eq!(l_shape.area(), 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_reverse_twice_restores() {
        let sq = square(1.0);
        let back = sq.reversed().reversed();
        assert_eq!(back.points(), sq.points());
        assert_relative_eq!(back.plane.normal, sq.plane.normal);
        assert_relative_eq!(sq.reversed().plane.normal, -sq.plane.normal);
    }

    #[test]
    fn test_translate_keeps_plane_consistent() {
        let mut sq = square(0.0);
        sq.translate(&Vector3::new(0.0, 0.0, 2.0));
        for v in &sq.vertices {
            assert_relative_eq!(sq.plane.signed_distance(&v.position), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_zero_length_edge_cleanup() {
        let mut sq = square(0.0);
        sq.vertices.insert(1, sq.vertices[1]);
        sq.vertices.push(sq.vertices[0]);
        assert_eq!(sq.remove_zero_length_edges(&Tolerance::default()), 2);
        assert_eq!(sq.len(), 4);
    }

    #[test]
    fn test_same_shape_ignores_start() {
        let sq = square(0.0);
        let mut rotated = sq.clone();
        rotated.vertices.rotate_left(2);
        assert!(sq.same_shape(&rotated, &Tolerance::default()));
        assert!(!sq.same_shape(&sq.reversed(), &Tolerance::default()));
    }

    #[test]
    fn test_validate_empty_mesh() {
        let err = Mesh::new().validate("A").unwrap_err();
        assert!(err.to_string().contains("empty mesh"));
        assert!(Mesh::from_polygons(vec![square(0.0)]).validate("A").is_ok());
    }
}
