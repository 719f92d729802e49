// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! 2-D coplanar solver
//!
//! Polygons whose planes coincide are rotated into a shared plane frame,
//! combined there and carried back out. Vertices keep their 3-D positions
//! throughout; the frame is only used for the planar predicates.

use std::f64::consts::TAU;

use nalgebra::Point2;
use tracing::{debug, trace, warn};

use super::classify::{SegmentClass, SegmentVotes};
use super::intersect::Segment;
use super::slit::slit_holes;
use super::{BoolOp, Operand};
use crate::error::{BoolError, BooleanResult, TopologyFault};
use crate::geometry::predicates::{
    cross2, point_in_polygon_2d, segment_intersection_2d, signed_area_2d, PointLocation,
    SegmentHit2d,
};
use crate::geometry::{Mesh, PlaneFrame, PolyId, Polygon, Tolerance, Vertex};
use crate::utils::math::{lerp, lerp_point, PROBE_BLEND};

/// Planar Boolean operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op2d {
    Or,
    And,
    Sub,
}

/// Sample positions along a boundary segment used to classify it.
const SAMPLES: [f64; 3] = [0.25, PROBE_BLEND, 0.75];

#[derive(Debug, Clone, Copy)]
struct Corner {
    vertex: Vertex,
    flat: Point2<f64>,
}

fn corners(polygon: &Polygon, frame: &PlaneFrame) -> Vec<Corner> {
    let mut ring: Vec<Corner> = polygon
        .vertices
        .iter()
        .map(|v| {
            let mut vertex = *v;
            vertex.adjacent = None;
            Corner {
                vertex,
                flat: frame.to_local(&v.position),
            }
        })
        .collect();
    let flat: Vec<Point2<f64>> = ring.iter().map(|c| c.flat).collect();
    if signed_area_2d(&flat) < 0.0 {
        ring.reverse();
    }
    ring
}

fn same_ring(p: &[Corner], q: &[Corner], tol: &Tolerance) -> bool {
    let n = p.len();
    n == q.len()
        && (0..n).any(|shift| (0..n).all(|i| tol.same_point_2d(&p[i].flat, &q[(i + shift) % n].flat)))
}

/// Whether a touch at vertex `k` of `ring` on the line through (a, b) only
/// grazes the line: both neighbors of the vertex lie strictly on one side.
fn grazes(ring: &[Corner], k: usize, a: &Point2<f64>, b: &Point2<f64>, tol: &Tolerance) -> bool {
    let n = ring.len();
    let axis = b - a;
    let length = axis.norm();
    if length <= tol.eps {
        return false;
    }
    let side = |p: &Point2<f64>| cross2(&axis, &(p - a)) / length;
    let before = side(&ring[(k + n - 1) % n].flat);
    let after = side(&ring[(k + 1) % n].flat);
    (before > tol.eps && after > tol.eps) || (before < -tol.eps && after < -tol.eps)
}

fn vertex_index(ring_len: usize, edge: usize, param: f64, param_tol: f64) -> Option<usize> {
    if param <= param_tol {
        Some(edge)
    } else if param >= 1.0 - param_tol {
        Some((edge + 1) % ring_len)
    } else {
        None
    }
}

/// Split parameters for every edge of both rings.
fn split_parameters(p: &[Corner], q: &[Corner], tol: &Tolerance) -> (Vec<Vec<f64>>, Vec<Vec<f64>>) {
    let mut splits_p = vec![Vec::new(); p.len()];
    let mut splits_q = vec![Vec::new(); q.len()];
    let mut crossings = 0usize;

    for i in 0..p.len() {
        let (a0, a1) = (p[i].flat, p[(i + 1) % p.len()].flat);
        let tol_a = tol.param((a1 - a0).norm());
        for j in 0..q.len() {
            let (b0, b1) = (q[j].flat, q[(j + 1) % q.len()].flat);
            let tol_b = tol.param((b1 - b0).norm());
            match segment_intersection_2d(&a0, &a1, &b0, &b1, tol.eps) {
                SegmentHit2d::None => {}
                SegmentHit2d::Point { t, s } => {
                    let at_p = vertex_index(p.len(), i, t, tol_a);
                    let at_q = vertex_index(q.len(), j, s, tol_b);
                    let graze = match (at_p, at_q) {
                        (None, Some(k)) => grazes(q, k, &a0, &a1, tol),
                        (Some(k), None) => grazes(p, k, &b0, &b1, tol),
                        _ => false,
                    };
                    if graze {
                        trace!(i, j, "grazing touch rejected");
                        continue;
                    }
                    crossings += 1;
                    splits_p[i].push(t);
                    splits_q[j].push(s);
                }
                SegmentHit2d::Overlap { t, s } => {
                    crossings += 1;
                    splits_p[i].extend([t.0, t.1]);
                    splits_q[j].extend([s.0, s.1]);
                }
            }
        }
    }
    trace!(crossings, "planar boundary intersections");
    (splits_p, splits_q)
}

/// The ring with a vertex inserted at every interior split parameter.
fn subdivide(ring: &[Corner], splits: &mut [Vec<f64>], tol: &Tolerance) -> Vec<Corner> {
    let n = ring.len();
    let mut out = Vec::with_capacity(n + splits.iter().map(Vec::len).sum::<usize>());
    for i in 0..n {
        let (a, b) = (ring[i], ring[(i + 1) % n]);
        out.push(a);
        let param_tol = tol.param((b.flat - a.flat).norm());
        let params = &mut splits[i];
        params.retain(|t| *t > param_tol && *t < 1.0 - param_tol);
        params.sort_by(f64::total_cmp);
        params.dedup_by(|x, y| (*x - *y).abs() <= param_tol);
        for &t in params.iter() {
            let uv = match (a.vertex.uv, b.vertex.uv) {
                (Some(ua), Some(ub)) => Some(ua.zip_map(&ub, |x, y| lerp(x, y, t))),
                _ => None,
            };
            out.push(Corner {
                vertex: Vertex::created(lerp_point(&a.vertex.position, &b.vertex.position, t), uv),
                flat: a.flat + (b.flat - a.flat) * t,
            });
        }
    }
    out
}

fn classify_segment(a: &Point2<f64>, b: &Point2<f64>, other: &[Point2<f64>], tol: &Tolerance) -> SegmentClass {
    let dir = b - a;
    let mut votes = SegmentVotes::default();
    for s in SAMPLES {
        let probe = a + dir * s;
        let class = match point_in_polygon_2d(&probe, other, tol.eps) {
            PointLocation::Inside => SegmentClass::Inside,
            PointLocation::Outside => SegmentClass::Outside,
            PointLocation::Boundary(e) => {
                let edge = other[(e + 1) % other.len()] - other[e];
                if edge.dot(&dir) > 0.0 {
                    SegmentClass::Shared
                } else {
                    SegmentClass::AntiShared
                }
            }
        };
        votes.add(class);
    }
    votes.resolve().unwrap_or(SegmentClass::Outside)
}

type Edge2 = (Corner, Corner);

fn classified_edges(ring: &[Corner], other: &[Corner], tol: &Tolerance) -> Vec<(Edge2, SegmentClass)> {
    let other_flat: Vec<Point2<f64>> = other.iter().map(|c| c.flat).collect();
    let n = ring.len();
    (0..n)
        .filter_map(|i| {
            let (a, b) = (ring[i], ring[(i + 1) % n]);
            if tol.same_point_2d(&a.flat, &b.flat) {
                return None;
            }
            Some(((a, b), classify_segment(&a.flat, &b.flat, &other_flat, tol)))
        })
        .collect()
}

/// Chain directed edges into closed loops by coordinate match.
fn chain_loops(mut edges: Vec<Edge2>, tol: &Tolerance) -> BooleanResult<Vec<Vec<Corner>>> {
    let mut loops = Vec::new();
    while let Some(first) = edges.pop() {
        let start = first.0;
        let mut ring = vec![first.0];
        let mut end = first.1;
        while !tol.same_point_2d(&end.flat, &start.flat) {
            let next = edges
                .iter()
                .position(|(a, _)| tol.same_point_2d(&a.flat, &end.flat))
                .ok_or_else(|| {
                    BoolError::topology(
                        TopologyFault::LoopClosure,
                        format!("planar boundary chain stops at {:?}", end.vertex.position),
                    )
                })?;
            let (a, b) = edges.swap_remove(next);
            ring.push(a);
            end = b;
        }
        loops.push(ring);
    }
    Ok(loops)
}

/// Drop repeated vertices, and created vertices that sit on a straight run.
/// Input vertices stay so neighbors across the polygon's edges still match.
fn simplify(mut ring: Vec<Corner>, tol: &Tolerance) -> Vec<Corner> {
    ring.dedup_by(|b, a| tol.same_point_2d(&a.flat, &b.flat));
    while ring.len() > 1 && tol.same_point_2d(&ring[0].flat, &ring[ring.len() - 1].flat) {
        ring.pop();
    }
    let mut i = 0;
    while ring.len() > 3 && i < ring.len() {
        let n = ring.len();
        if ring[i].vertex.tags.input_boundary {
            i += 1;
            continue;
        }
        let a = ring[(i + n - 1) % n].flat;
        let c = ring[(i + 1) % n].flat;
        let span = (c - a).norm();
        let off = if span > tol.eps {
            cross2(&(c - a), &(ring[i].flat - a)).abs() / span
        } else {
            f64::INFINITY
        };
        if off <= tol.eps && (ring[i].flat - a).dot(&(c - a)) > 0.0 {
            ring.remove(i);
        } else {
            i += 1;
        }
    }
    ring
}

/// Boolean of two coplanar polygons (convex or not, facing either way).
/// Output polygons carry `p1`'s plane and orientation.
pub fn boolean_2d(p1: &Polygon, p2: &Polygon, op: Op2d, tol: &Tolerance) -> BooleanResult<Vec<Polygon>> {
    let frame = PlaneFrame::new(&p1.plane, p1.point(0))?;
    let ring1 = corners(p1, &frame);
    let ring2 = corners(p2, &frame);

    if same_ring(&ring1, &ring2, tol) {
        return Ok(match op {
            Op2d::Or | Op2d::And => {
                let mut copy = p1.clone();
                copy.clear_adjacency();
                vec![copy]
            }
            Op2d::Sub => Vec::new(),
        });
    }

    let (mut splits1, mut splits2) = split_parameters(&ring1, &ring2, tol);
    let sub1 = subdivide(&ring1, &mut splits1, tol);
    let sub2 = subdivide(&ring2, &mut splits2, tol);
    let edges1 = classified_edges(&sub1, &ring2, tol);
    let edges2 = classified_edges(&sub2, &ring1, tol);

    let mut selected: Vec<Edge2> = Vec::new();
    for (edge, class) in edges1 {
        let keep = match op {
            Op2d::Or => matches!(class, SegmentClass::Outside | SegmentClass::Shared),
            Op2d::And => matches!(class, SegmentClass::Inside | SegmentClass::Shared),
            Op2d::Sub => matches!(class, SegmentClass::Outside | SegmentClass::AntiShared),
        };
        if keep {
            selected.push(edge);
        }
    }
    for ((a, b), class) in edges2 {
        match (op, class) {
            (Op2d::Or, SegmentClass::Outside) | (Op2d::And, SegmentClass::Inside) => selected.push((a, b)),
            (Op2d::Sub, SegmentClass::Inside) => selected.push((b, a)),
            _ => {}
        }
    }

    let loops = chain_loops(selected, tol)?;
    assemble(loops, p1, &frame, tol)
}

/// Sort loops into outer boundaries and holes and slit the holes in.
fn assemble(
    loops: Vec<Vec<Corner>>,
    parent: &Polygon,
    frame: &PlaneFrame,
    tol: &Tolerance,
) -> BooleanResult<Vec<Polygon>> {
    let min_area = tol.eps * tol.eps;
    let mut outers: Vec<(f64, Vec<Corner>)> = Vec::new();
    let mut holes: Vec<Vec<Corner>> = Vec::new();
    for ring in loops {
        let ring = simplify(ring, tol);
        if ring.len() < 3 {
            continue;
        }
        let flat: Vec<Point2<f64>> = ring.iter().map(|c| c.flat).collect();
        let area = signed_area_2d(&flat);
        if area > min_area {
            outers.push((area, ring));
        } else if area < -min_area {
            holes.push(ring);
        }
    }

    let mut assigned: Vec<Vec<Vec<Vertex>>> = vec![Vec::new(); outers.len()];
    for hole in holes {
        let probe = hole[0].flat + (hole[1].flat - hole[0].flat) * PROBE_BLEND;
        let owner = outers
            .iter()
            .enumerate()
            .filter(|(_, (_, ring))| {
                let flat: Vec<Point2<f64>> = ring.iter().map(|c| c.flat).collect();
                point_in_polygon_2d(&probe, &flat, 0.0) != PointLocation::Outside
            })
            .min_by(|a, b| a.1 .0.total_cmp(&b.1 .0))
            .map(|(i, _)| i);
        match owner {
            Some(i) => assigned[i].push(hole.iter().map(|c| c.vertex).collect()),
            None => warn!(vertices = hole.len(), "planar hole without an enclosing boundary dropped"),
        }
    }

    let mut out = Vec::with_capacity(outers.len());
    for ((_, ring), holes) in outers.into_iter().zip(assigned) {
        let has_holes = !holes.is_empty();
        let outer: Vec<Vertex> = ring.into_iter().map(|c| c.vertex).collect();
        let vertices = if has_holes {
            slit_holes(outer, holes, frame)?
        } else {
            outer
        };
        let mut polygon = Polygon::with_plane(vertices, parent.plane, true);
        polygon.convex = !has_holes && polygon.is_convex(tol);
        out.push(polygon);
    }
    Ok(out)
}

/// Boundary ring and cuts of one piece, merged into a planar graph.
#[derive(Default)]
struct Arrangement {
    nodes: Vec<Corner>,
    /// Directed edges. Every face is traced with its interior on the left.
    edges: Vec<(usize, usize)>,
}

impl Arrangement {
    fn node(&mut self, corner: Corner, tol: &Tolerance) -> usize {
        match self.nodes.iter().position(|c| tol.same_point_2d(&c.flat, &corner.flat)) {
            Some(i) => i,
            None => {
                self.nodes.push(corner);
                self.nodes.len() - 1
            }
        }
    }

    /// The edge leaving `v` that turns furthest left after arriving from
    /// `u`. Going back along the arrival edge is the last resort.
    fn next_edge(&self, leaving: &[usize], u: usize, v: usize) -> Option<usize> {
        let back = self.nodes[u].flat - self.nodes[v].flat;
        let turn = |h: usize| {
            let out = self.nodes[self.edges[h].1].flat - self.nodes[v].flat;
            let clockwise = -cross2(&back, &out).atan2(back.dot(&out));
            if clockwise <= 0.0 {
                clockwise + TAU
            } else {
                clockwise
            }
        };
        leaving.iter().copied().min_by(|&a, &b| turn(a).total_cmp(&turn(b)))
    }

    /// Closed boundary walks, one per face and one per floating hole.
    fn faces(&self) -> BooleanResult<Vec<Vec<Corner>>> {
        let mut leaving = vec![Vec::new(); self.nodes.len()];
        for (h, &(u, _)) in self.edges.iter().enumerate() {
            leaving[u].push(h);
        }
        let mut used = vec![false; self.edges.len()];
        let mut loops = Vec::new();
        for start in 0..self.edges.len() {
            if used[start] {
                continue;
            }
            let mut ring = Vec::new();
            let mut h = start;
            while !used[h] {
                used[h] = true;
                let (u, v) = self.edges[h];
                ring.push(self.nodes[u]);
                h = self.next_edge(&leaving[v], u, v).ok_or_else(|| {
                    BoolError::topology(
                        TopologyFault::LoopClosure,
                        format!("cut arrangement dead-ends at {:?}", self.nodes[v].vertex.position),
                    )
                })?;
            }
            if h != start {
                return Err(BoolError::topology(
                    TopologyFault::LoopClosure,
                    format!("cut arrangement face starting at {:?} does not close", ring[0].vertex.position),
                ));
            }
            loops.push(ring);
        }
        Ok(loops)
    }
}

/// Cut a planar piece along segments lying in its plane.
///
/// Parts of a segment outside the piece or on its boundary are ignored, and
/// chains that end inside the piece without meeting anything are pruned.
/// Returns the faces of the arrangement with any enclosed hole slit in;
/// the piece itself when nothing cuts it.
pub fn split_by_cuts(piece: &Polygon, cuts: &[Segment], tol: &Tolerance) -> BooleanResult<Vec<Polygon>> {
    let frame = PlaneFrame::new(&piece.plane, piece.point(0))?;
    let ring = corners(piece, &frame);
    let ring_flat: Vec<Point2<f64>> = ring.iter().map(|c| c.flat).collect();
    let lines: Vec<(Point2<f64>, Point2<f64>)> = cuts
        .iter()
        .map(|s| (frame.to_local(&s.start), frame.to_local(&s.end)))
        .collect();

    let mut ring_splits = vec![Vec::new(); ring.len()];
    let mut cut_splits = vec![vec![0.0, 1.0]; cuts.len()];
    for (c, (a, b)) in lines.iter().enumerate() {
        for i in 0..ring.len() {
            let (p, q) = (ring_flat[i], ring_flat[(i + 1) % ring.len()]);
            match segment_intersection_2d(&p, &q, a, b, tol.eps) {
                SegmentHit2d::None => {}
                SegmentHit2d::Point { t, s } => {
                    ring_splits[i].push(t);
                    cut_splits[c].push(s);
                }
                SegmentHit2d::Overlap { t, s } => {
                    ring_splits[i].extend([t.0, t.1]);
                    cut_splits[c].extend([s.0, s.1]);
                }
            }
        }
        for (d, (e, f)) in lines.iter().enumerate().skip(c + 1) {
            match segment_intersection_2d(a, b, e, f, tol.eps) {
                SegmentHit2d::None => {}
                SegmentHit2d::Point { t, s } => {
                    cut_splits[c].push(t);
                    cut_splits[d].push(s);
                }
                SegmentHit2d::Overlap { t, s } => {
                    cut_splits[c].extend([t.0, t.1]);
                    cut_splits[d].extend([s.0, s.1]);
                }
            }
        }
    }

    let mut graph = Arrangement::default();
    let boundary: Vec<usize> = subdivide(&ring, &mut ring_splits, tol)
        .into_iter()
        .map(|corner| graph.node(corner, tol))
        .collect();
    let mut ring_edges = Vec::with_capacity(boundary.len());
    for k in 0..boundary.len() {
        let (u, v) = (boundary[k], boundary[(k + 1) % boundary.len()]);
        if u != v {
            ring_edges.push((u, v));
        }
    }

    let mut cut_edges: Vec<(usize, usize)> = Vec::new();
    for ((segment, (a, b)), params) in cuts.iter().zip(&lines).zip(&mut cut_splits) {
        let param_tol = tol.param((b - a).norm());
        for t in params.iter_mut() {
            *t = t.clamp(0.0, 1.0);
        }
        params.sort_by(f64::total_cmp);
        params.dedup_by(|x, y| (*x - *y).abs() <= param_tol);
        let corner = |t: f64| Corner {
            vertex: Vertex::created(lerp_point(&segment.start, &segment.end, t), None),
            flat: a + (b - a) * t,
        };
        for span in params.windows(2) {
            let mid = a + (b - a) * (0.5 * (span[0] + span[1]));
            if point_in_polygon_2d(&mid, &ring_flat, tol.eps) != PointLocation::Inside {
                continue;
            }
            let u = graph.node(corner(span[0]), tol);
            let v = graph.node(corner(span[1]), tol);
            if u != v && !cut_edges.contains(&(u, v)) && !cut_edges.contains(&(v, u)) {
                cut_edges.push((u, v));
            }
        }
    }

    loop {
        let mut degree = vec![0usize; graph.nodes.len()];
        for &(u, v) in ring_edges.iter().chain(&cut_edges) {
            degree[u] += 1;
            degree[v] += 1;
        }
        let before = cut_edges.len();
        cut_edges.retain(|&(u, v)| degree[u] > 1 && degree[v] > 1);
        if cut_edges.len() == before {
            break;
        }
    }
    if cut_edges.is_empty() {
        trace!(cuts = cuts.len(), "no cut reaches across the piece");
        return Ok(vec![piece.clone()]);
    }

    graph.edges = ring_edges;
    for &(u, v) in &cut_edges {
        graph.edges.extend([(u, v), (v, u)]);
    }
    let faces = assemble(graph.faces()?, piece, &frame, tol)?;
    debug!(cuts = cut_edges.len(), faces = faces.len(), "planar piece cut");
    Ok(faces)
}

/// How one polygon with coplanar partners contributes to the result.
#[derive(Debug, Clone, Default)]
pub struct CoplanarResolution {
    /// Overlap pieces the operator keeps.
    pub overlap: Vec<Polygon>,
    /// Pieces outside every partner; classified like untouched polygons.
    pub remainder: Vec<Polygon>,
}

/// Resolve a polygon against its coplanar partners in `other`. Returns
/// `None` when no partner overlaps it with positive area.
///
/// Overlaps are emitted from operand A only, so each coincident region
/// appears at most once in the result.
pub fn resolve_coplanar(
    polygon: &Polygon,
    partners: &[(PolyId, bool)],
    other: &Mesh,
    operand: Operand,
    op: BoolOp,
    tol: &Tolerance,
) -> BooleanResult<Option<CoplanarResolution>> {
    let min_area = tol.eps;
    let mut resolution = CoplanarResolution::default();
    let mut overlapping = Vec::new();

    for &(id, same) in partners {
        let partner = other.polygon(id);
        let pieces = boolean_2d(polygon, partner, Op2d::And, tol)?;
        let area: f64 = pieces.iter().map(|p| p.area().abs()).sum();
        if area <= min_area {
            continue;
        }
        overlapping.push(partner);
        if operand == Operand::A && op.keeps_overlap(same) {
            resolution.overlap.extend(pieces);
        }
    }
    if overlapping.is_empty() {
        return Ok(None);
    }

    let mut remainder = vec![polygon.clone()];
    for partner in overlapping {
        let mut next = Vec::with_capacity(remainder.len());
        for piece in &remainder {
            next.extend(boolean_2d(piece, partner, Op2d::Sub, tol)?);
        }
        remainder = next;
    }
    resolution.remainder = remainder;
    debug!(
        overlap = resolution.overlap.len(),
        remainder = resolution.remainder.len(),
        "coplanar polygon resolved"
    );
    Ok(Some(resolution))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::primitives::square;
    use approx::assert_relative_eq;

    fn area(polygons: &[Polygon]) -> f64 {
        polygons.iter().map(Polygon::area).sum()
    }

    fn tol() -> Tolerance {
        Tolerance::default()
    }

    #[test]
    fn test_overlapping_squares() {
        let p = square(Point2::new(1.0, 1.0), 1.0, 0.0).unwrap();
        let q = square(Point2::new(2.0, 2.0), 1.0, 0.0).unwrap();

        let or = boolean_2d(&p, &q, Op2d::Or, &tol()).unwrap();
        assert_eq!(or.len(), 1);
        assert_relative_eq!(area(&or), 7.0, epsilon = 1e-9);
        assert!(!or[0].convex);

        let and = boolean_2d(&p, &q, Op2d::And, &tol()).unwrap();
        assert_eq!(and.len(), 1);
        assert_relative_eq!(area(&and), 1.0, epsilon = 1e-9);
        assert!(and[0].convex);

        let sub = boolean_2d(&p, &q, Op2d::Sub, &tol()).unwrap();
        assert_eq!(sub.len(), 1);
        assert_relative_eq!(area(&sub), 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_contained_square_becomes_slit_hole() {
        let outer = square(Point2::new(2.0, 2.0), 2.0, 1.0).unwrap();
        let inner = square(Point2::new(1.5, 1.5), 0.5, 1.0).unwrap();

        let sub = boolean_2d(&outer, &inner, Op2d::Sub, &tol()).unwrap();
        assert_eq!(sub.len(), 1);
        assert_eq!(sub[0].len(), outer.len() + inner.len() + 2);
        assert_eq!(sub[0].vertices.iter().filter(|v| v.tags.slit).count(), 4);
        assert_relative_eq!(sub[0].area(), 15.0, epsilon = 1e-9);

        let and = boolean_2d(&outer, &inner, Op2d::And, &tol()).unwrap();
        assert_eq!(and.len(), 1);
        assert!(and[0].same_shape(&inner, &tol()));
    }

    #[test]
    fn test_opposite_facing_partner() {
        let p = square(Point2::new(1.0, 1.0), 1.0, 0.0).unwrap();
        let q = square(Point2::new(2.0, 1.0), 1.0, 0.0).unwrap().reversed();
        let and = boolean_2d(&p, &q, Op2d::And, &tol()).unwrap();
        assert_relative_eq!(area(&and), 2.0, epsilon = 1e-9);
        // Results keep the first polygon's orientation.
        assert!(and[0].plane.normal.z > 0.0);
    }

    #[test]
    fn test_identical_and_disjoint() {
        let p = square(Point2::new(0.0, 0.0), 1.0, 0.0).unwrap();
        let mut rotated = p.clone();
        rotated.vertices.rotate_left(1);
        assert_eq!(boolean_2d(&p, &rotated, Op2d::And, &tol()).unwrap().len(), 1);
        assert!(boolean_2d(&p, &rotated, Op2d::Sub, &tol()).unwrap().is_empty());

        let far = square(Point2::new(5.0, 0.0), 1.0, 0.0).unwrap();
        assert!(boolean_2d(&p, &far, Op2d::And, &tol()).unwrap().is_empty());
        assert_eq!(boolean_2d(&p, &far, Op2d::Or, &tol()).unwrap().len(), 2);
        let sub = boolean_2d(&p, &far, Op2d::Sub, &tol()).unwrap();
        assert!(sub.len() == 1 && sub[0].same_shape(&p, &tol()));
    }

    #[test]
    fn test_edge_neighbors_merge_under_or() {
        let p = square(Point2::new(0.5, 0.5), 0.5, 0.0).unwrap();
        let q = square(Point2::new(1.5, 0.5), 0.5, 0.0).unwrap();
        let or = boolean_2d(&p, &q, Op2d::Or, &tol()).unwrap();
        assert_eq!(or.len(), 1);
        assert_relative_eq!(area(&or), 2.0, epsilon = 1e-9);
        assert!(boolean_2d(&p, &q, Op2d::And, &tol()).unwrap().is_empty());
    }

    fn cut(a: [f64; 2], b: [f64; 2]) -> Segment {
        Segment {
            start: nalgebra::Point3::new(a[0], a[1], 0.0),
            end: nalgebra::Point3::new(b[0], b[1], 0.0),
            start_touch: None,
            end_touch: None,
            other: PolyId(0),
        }
    }

    fn sorted_areas(polygons: &[Polygon]) -> Vec<f64> {
        let mut areas: Vec<f64> = polygons.iter().map(Polygon::area).collect();
        areas.sort_by(f64::total_cmp);
        areas
    }

    #[test]
    fn test_cut_across_a_square() {
        let face = square(Point2::new(2.0, 2.0), 2.0, 0.0).unwrap();
        // Runs past the square on both sides.
        let faces = split_by_cuts(&face, &[cut([1.0, -1.0], [1.0, 5.0])], &tol()).unwrap();
        let areas = sorted_areas(&faces);
        assert_eq!(areas.len(), 2);
        assert_relative_eq!(areas[0], 4.0, epsilon = 1e-9);
        assert_relative_eq!(areas[1], 12.0, epsilon = 1e-9);

        // A chain ending inside the square cuts nothing.
        let stub = split_by_cuts(&face, &[cut([1.0, 1.0], [2.0, 2.0])], &tol()).unwrap();
        assert_eq!(stub.len(), 1);
        assert!(stub[0].same_shape(&face, &tol()));
    }

    #[test]
    fn test_cuts_closing_against_a_hole() {
        let big = square(Point2::new(0.0, 0.0), 2.0, 0.0).unwrap();
        let hole = square(Point2::new(0.5, 0.0), 0.5, 0.0).unwrap();
        let pieces = boolean_2d(&big, &hole, Op2d::Sub, &tol()).unwrap();
        assert_eq!(pieces.len(), 1);

        // Three sides of a box whose fourth side is the hole's left edge,
        // plus a stray stub.
        let cuts = [
            cut([0.0, -0.5], [-1.0, -0.5]),
            cut([-1.0, -0.5], [-1.0, 0.5]),
            cut([-1.0, 0.5], [0.0, 0.5]),
            cut([1.5, 1.5], [1.7, 1.7]),
        ];
        let faces = split_by_cuts(&pieces[0], &cuts, &tol()).unwrap();
        let areas = sorted_areas(&faces);
        assert_eq!(areas.len(), 2);
        assert_relative_eq!(areas[0], 1.0, epsilon = 1e-9);
        assert_relative_eq!(areas[1], 14.0, epsilon = 1e-9);
    }

    #[test]
    fn test_resolve_coplanar_emits_overlap_from_a_only() {
        let face = square(Point2::new(0.5, 0.5), 0.5, 1.0).unwrap();
        let other = Mesh::from_polygons(vec![square(Point2::new(1.0, 0.5), 0.5, 1.0).unwrap()]);
        let partners = [(PolyId(0), true)];

        let on_a = resolve_coplanar(&face, &partners, &other, Operand::A, BoolOp::Or, &tol())
            .unwrap()
            .unwrap();
        assert_relative_eq!(area(&on_a.overlap), 0.5, epsilon = 1e-9);
        assert_relative_eq!(area(&on_a.remainder), 0.5, epsilon = 1e-9);

        let on_b = resolve_coplanar(&face, &partners, &other, Operand::B, BoolOp::Or, &tol())
            .unwrap()
            .unwrap();
        assert!(on_b.overlap.is_empty());

        let sub = resolve_coplanar(&face, &partners, &other, Operand::A, BoolOp::Sub, &tol())
            .unwrap()
            .unwrap();
        assert!(sub.overlap.is_empty());
    }
}
