// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Adjacency engine
//!
//! Links every polygon edge to the polygon across it. Adjacency lives on the
//! vertex that starts the edge (`Vertex::adjacent`), is rebuilt at the start of
//! each call and cleared before the call returns.
//!
//! Matching runs in two passes. The first pass hashes each edge by a weighted
//! sum of its endpoints and links edges whose endpoints agree (in either
//! order). The second pass hashes the leftovers by direction and links
//! collinear, overlapping edges, slitting the longer edge so that each
//! sub-edge has exactly one neighbor.

use ahash::AHashMap;
use nalgebra::{Point3, Vector3};
use tracing::{debug, instrument};

use crate::error::{BoolError, BooleanResult, TopologyFault};
use crate::geometry::predicates::distance_to_line;
use crate::geometry::{Mesh, PolyId, Tolerance, Vertex};
use crate::utils::math::lerp;

/// Weights folding a point into the scalar hash key.
const KEY_WEIGHTS: [f64; 3] = [1.0, 1.732_050_807_568_877, 2.236_067_977_499_79];

/// Buckets per unit of projected direction in the second pass.
const DIRECTION_QUANTUM: f64 = 1e5;

/// Largest deviation from (anti)parallel accepted for collinear edges.
const COLLINEAR_COS: f64 = 1e-9;

/// Summary of one adjacency computation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdjacencyReport {
    /// Every edge found a neighbor.
    pub closed: bool,
    /// Edge pairs linked by exact endpoint match.
    pub exact_links: usize,
    /// Edge pairs linked by collinear overlap.
    pub partial_links: usize,
    /// Vertices inserted to slit partially shared edges.
    pub split_vertices: usize,
    /// Edges left without a neighbor.
    pub unmatched: usize,
}

#[derive(Debug, Clone, Copy)]
struct EdgeSlot {
    poly: PolyId,
    index: usize,
}

/// Edge named by its endpoints, which survive vertex insertion elsewhere in
/// the polygon.
#[derive(Debug, Clone, Copy)]
struct EdgeRef {
    poly: PolyId,
    start: Point3<f64>,
    end: Point3<f64>,
}

fn spatial_key(a: &Point3<f64>, b: &Point3<f64>, cell: f64) -> i64 {
    let s: f64 = (0..3).map(|i| (a[i] + b[i]) * KEY_WEIGHTS[i]).sum();
    (s / cell).floor() as i64
}

fn direction_key(dir: &Vector3<f64>) -> i64 {
    let w = Vector3::new(KEY_WEIGHTS[0], KEY_WEIGHTS[1], KEY_WEIGHTS[2]).normalize();
    (dir.dot(&w) * DIRECTION_QUANTUM).floor() as i64
}

/// Build adjacency over `mesh`. Returns whether the mesh is closed.
///
/// Open or non-manifold input is not an error; the report only says how
/// much of the mesh could be linked.
#[instrument(skip_all, fields(polygons = mesh.len()))]
pub fn compute_adjacency(mesh: &mut Mesh, tol: &Tolerance) -> BooleanResult<AdjacencyReport> {
    mesh.clear_adjacency();
    let mut report = AdjacencyReport::default();

    let edge_count = mesh.vertex_count();
    let extent = mesh.bounding_box().max_extent();
    let cell = (tol.eps * 64.0).max(extent / edge_count.max(1) as f64);

    // Pass 1: exact endpoint matches.
    let mut buckets: AHashMap<i64, Vec<EdgeSlot>> = AHashMap::with_capacity(edge_count);
    let mut slots = Vec::with_capacity(edge_count);
    for poly in mesh.ids() {
        let polygon = mesh.polygon(poly);
        for index in 0..polygon.len() {
            let (a, b) = polygon.edge(index);
            let slot = EdgeSlot { poly, index };
            buckets.entry(spatial_key(&a, &b, cell)).or_default().push(slot);
            slots.push((slot, spatial_key(&a, &b, cell)));
        }
    }

    let mut matched: Vec<Vec<bool>> = mesh.polygons.iter().map(|p| vec![false; p.len()]).collect();
    for (slot, key) in &slots {
        if matched[slot.poly.0][slot.index] {
            continue;
        }
        let (a, b) = mesh.polygon(slot.poly).edge(slot.index);
        let mut found: Option<(EdgeSlot, bool)> = None;
        'search: for k in key - 1..=key + 1 {
            let Some(bucket) = buckets.get(&k) else {
                continue;
            };
            for other in bucket {
                if other.poly == slot.poly || matched[other.poly.0][other.index] {
                    continue;
                }
                let (c, d) = mesh.polygon(other.poly).edge(other.index);
                let reversed = tol.same_point(&a, &d) && tol.same_point(&b, &c);
                let forward = tol.same_point(&a, &c) && tol.same_point(&b, &d);
                if reversed {
                    found = Some((*other, true));
                    break 'search;
                }
                if forward && found.is_none() {
                    found = Some((*other, false));
                }
            }
        }
        if let Some((other, _)) = found {
            matched[slot.poly.0][slot.index] = true;
            matched[other.poly.0][other.index] = true;
            mesh.polygon_mut(slot.poly).vertices[slot.index].adjacent = Some(other.poly);
            mesh.polygon_mut(other.poly).vertices[other.index].adjacent = Some(slot.poly);
            report.exact_links += 1;
        }
    }
    drop(buckets);

    // Pass 2: collinear partial overlaps among the leftovers.
    let mut table: AHashMap<i64, Vec<EdgeRef>> = AHashMap::new();
    let mut work: Vec<EdgeRef> = Vec::new();
    for (slot, _) in &slots {
        if matched[slot.poly.0][slot.index] {
            continue;
        }
        let (start, end) = mesh.polygon(slot.poly).edge(slot.index);
        if tol.same_point(&start, &end) {
            continue;
        }
        let edge = EdgeRef {
            poly: slot.poly,
            start,
            end,
        };
        table.entry(direction_key(&(end - start).normalize())).or_default().push(edge);
        work.push(edge);
    }
    debug!(leftover = work.len(), exact = report.exact_links, "adjacency first pass done");

    while let Some(edge) = work.pop() {
        if locate(mesh, &edge).is_none() {
            continue;
        }
        let Some((other, overlap)) = find_collinear(mesh, &table, &edge, tol) else {
            continue;
        };
        let leftovers = link_overlap(mesh, &edge, &other, overlap, tol, &mut report)?;
        for piece in leftovers {
            table
                .entry(direction_key(&(piece.end - piece.start).normalize()))
                .or_default()
                .push(piece);
            work.push(piece);
        }
    }

    report.unmatched = mesh
        .polygons
        .iter()
        .flat_map(|p| p.vertices.iter())
        .filter(|v| v.adjacent.is_none())
        .count();
    report.closed = report.unmatched == 0;
    debug!(
        closed = report.closed,
        partial = report.partial_links,
        split = report.split_vertices,
        unmatched = report.unmatched,
        "adjacency computed"
    );
    Ok(report)
}

/// Index of the edge's start vertex, if the edge still exists unlinked.
fn locate(mesh: &Mesh, edge: &EdgeRef) -> Option<usize> {
    let polygon = mesh.polygon(edge.poly);
    (0..polygon.len()).find(|&i| {
        let (a, b) = polygon.edge(i);
        a == edge.start && b == edge.end && polygon.vertices[i].adjacent.is_none()
    })
}

/// Overlap of a collinear partner, as parameters along `edge`.
#[derive(Debug, Clone, Copy)]
struct Overlap {
    lo: f64,
    hi: f64,
}

fn find_collinear(
    mesh: &Mesh,
    table: &AHashMap<i64, Vec<EdgeRef>>,
    edge: &EdgeRef,
    tol: &Tolerance,
) -> Option<(EdgeRef, Overlap)> {
    let axis = edge.end - edge.start;
    let length = axis.norm();
    let dir = axis / length;
    let keys = [direction_key(&dir), direction_key(&-dir)];
    for key in keys {
        for k in key - 1..=key + 1 {
            let Some(bucket) = table.get(&k) else {
                continue;
            };
            for other in bucket {
                if other.poly == edge.poly {
                    continue;
                }
                let other_dir = (other.end - other.start).normalize();
                if 1.0 - dir.dot(&other_dir).abs() > COLLINEAR_COS {
                    continue;
                }
                if distance_to_line(&other.start, &edge.start, &dir) > tol.eps
                    || distance_to_line(&other.end, &edge.start, &dir) > tol.eps
                {
                    continue;
                }
                let tc = (other.start - edge.start).dot(&dir);
                let td = (other.end - edge.start).dot(&dir);
                let lo = tc.min(td).max(0.0);
                let hi = tc.max(td).min(length);
                if hi - lo <= tol.eps {
                    continue;
                }
                if locate(mesh, other).is_none() {
                    continue;
                }
                return Some((*other, Overlap { lo, hi }));
            }
        }
    }
    None
}

/// Insert `point` after the start of the edge (start, end) of `poly`.
fn insert_on_edge(
    mesh: &mut Mesh,
    poly: PolyId,
    start: &Point3<f64>,
    end: &Point3<f64>,
    point: Point3<f64>,
) -> BooleanResult<()> {
    let edge = EdgeRef {
        poly,
        start: *start,
        end: *end,
    };
    let index = locate(mesh, &edge).ok_or_else(|| {
        BoolError::topology(
            TopologyFault::VertexLookup,
            format!("edge {start:?} -> {end:?} vanished from polygon {}", poly.0),
        )
    })?;
    let polygon = mesh.polygon_mut(poly);
    let next = polygon.next(index);
    let (a, b) = (polygon.vertices[index], polygon.vertices[next]);
    let span = (b.position - a.position).norm();
    let t = if span > 0.0 {
        (point - a.position).norm() / span
    } else {
        0.0
    };
    let uv = match (a.uv, b.uv) {
        (Some(ua), Some(ub)) => Some(ua.zip_map(&ub, |x, y| lerp(x, y, t))),
        _ => None,
    };
    let mut vertex = Vertex::created(point, uv);
    vertex.tags.input_boundary = true;
    polygon.vertices.insert(index + 1, vertex);
    Ok(())
}

/// Slit both edges at the ends of their overlap, link the shared sub-edge and
/// return the sub-edges still looking for a partner.
fn link_overlap(
    mesh: &mut Mesh,
    edge: &EdgeRef,
    other: &EdgeRef,
    overlap: Overlap,
    tol: &Tolerance,
    report: &mut AdjacencyReport,
) -> BooleanResult<Vec<EdgeRef>> {
    let axis = edge.end - edge.start;
    let length = axis.norm();
    let dir = axis / length;
    let other_start_t = (other.start - edge.start).dot(&dir);
    let other_end_t = (other.end - edge.start).dot(&dir);

    // Snap the overlap ends to existing vertices of the partner edge.
    let snap = |t: f64, own: Point3<f64>| -> Point3<f64> {
        if (other_start_t - t).abs() <= tol.eps {
            other.start
        } else if (other_end_t - t).abs() <= tol.eps {
            other.end
        } else {
            own
        }
    };
    let lo_point = if overlap.lo <= tol.eps {
        edge.start
    } else {
        snap(overlap.lo, edge.start + dir * overlap.lo)
    };
    let hi_point = if overlap.hi >= length - tol.eps {
        edge.end
    } else {
        snap(overlap.hi, edge.start + dir * overlap.hi)
    };

    let mut leftovers = Vec::new();

    // Slit `edge` into start -> lo -> hi -> end.
    let mut chain = vec![edge.start];
    for p in [lo_point, hi_point] {
        let last = chain[chain.len() - 1];
        if !tol.same_point(&p, &last) && !tol.same_point(&p, &edge.end) {
            insert_on_edge(mesh, edge.poly, &last, &edge.end, p)?;
            report.split_vertices += 1;
            chain.push(p);
        }
    }
    chain.push(edge.end);

    // Slit `other` the same way, ordered along its own direction.
    let other_axis = other.end - other.start;
    let mut inner: Vec<Point3<f64>> = [lo_point, hi_point]
        .into_iter()
        .filter(|p| !tol.same_point(p, &other.start) && !tol.same_point(p, &other.end))
        .collect();
    inner.sort_by(|p, q| {
        (p - other.start)
            .dot(&other_axis)
            .total_cmp(&(q - other.start).dot(&other_axis))
    });
    inner.dedup_by(|p, q| tol.same_point(p, q));
    let mut other_chain = vec![other.start];
    for p in inner {
        let last = other_chain[other_chain.len() - 1];
        insert_on_edge(mesh, other.poly, &last, &other.end, p)?;
        report.split_vertices += 1;
        other_chain.push(p);
    }
    other_chain.push(other.end);

    let shared = |a: &Point3<f64>, b: &Point3<f64>| {
        (tol.same_point(a, &lo_point) && tol.same_point(b, &hi_point))
            || (tol.same_point(a, &hi_point) && tol.same_point(b, &lo_point))
    };

    for (poly, partner, chain) in [
        (edge.poly, other.poly, &chain),
        (other.poly, edge.poly, &other_chain),
    ] {
        let mut linked = false;
        for pair in chain.windows(2) {
            let piece = EdgeRef {
                poly,
                start: pair[0],
                end: pair[1],
            };
            if !linked && shared(&pair[0], &pair[1]) {
                let index = locate(mesh, &piece).ok_or_else(|| {
                    BoolError::topology(
                        TopologyFault::VertexLookup,
                        format!("shared sub-edge missing from polygon {}", poly.0),
                    )
                })?;
                mesh.polygon_mut(poly).vertices[index].adjacent = Some(partner);
                linked = true;
            } else {
                leftovers.push(piece);
            }
        }
    }
    report.partial_links += 1;
    Ok(leftovers)
}

/// True when every adjacency reference has a matching reference back.
pub fn is_reciprocal(mesh: &Mesh, tol: &Tolerance) -> bool {
    mesh.ids().all(|id| {
        let polygon = mesh.polygon(id);
        (0..polygon.len()).all(|i| {
            let Some(partner) = polygon.vertices[i].adjacent else {
                return true;
            };
            let (a, b) = polygon.edge(i);
            let other = mesh.polygon(partner);
            (0..other.len()).any(|j| {
                let (c, d) = other.edge(j);
                other.vertices[j].adjacent == Some(id)
                    && ((tol.same_point(&a, &d) && tol.same_point(&b, &c))
                        || (tol.same_point(&a, &c) && tol.same_point(&b, &d)))
            })
        })
    })
}

/// Connected-component labels over adjacency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Components {
    pub labels: Vec<usize>,
    pub count: usize,
}

impl Components {
    pub fn label(&self, id: PolyId) -> usize {
        self.labels[id.0]
    }

    pub fn members(&self, label: usize) -> impl Iterator<Item = PolyId> + '_ {
        self.labels
            .iter()
            .enumerate()
            .filter(move |(_, &l)| l == label)
            .map(|(i, _)| PolyId(i))
    }
}

/// Label connected components by an explicit-stack flood fill.
#[instrument(skip_all, fields(polygons = mesh.len()))]
pub fn mark_disjoint_parts(mesh: &Mesh, stack_limit: usize) -> BooleanResult<Components> {
    let mut labels: Vec<Option<usize>> = vec![None; mesh.len()];
    let mut count = 0;
    let mut stack: Vec<PolyId> = Vec::new();

    for seed in mesh.ids() {
        if labels[seed.0].is_some() {
            continue;
        }
        let label = count;
        count += 1;
        labels[seed.0] = Some(label);
        stack.push(seed);

        while let Some(current) = stack.pop() {
            for vertex in &mesh.polygon(current).vertices {
                let Some(neighbor) = vertex.adjacent else {
                    continue;
                };
                match labels[neighbor.0] {
                    None => {
                        labels[neighbor.0] = Some(label);
                        if stack.len() >= stack_limit {
                            return Err(BoolError::topology(
                                TopologyFault::StackOverflow,
                                format!("component flood exceeded {stack_limit} entries"),
                            ));
                        }
                        stack.push(neighbor);
                    }
                    Some(existing) if existing != label => {
                        return Err(BoolError::topology(
                            TopologyFault::DisjointConflict,
                            format!(
                                "polygon {} is in component {existing} but is reached from {label}",
                                neighbor.0
                            ),
                        ));
                    }
                    Some(_) => {}
                }
            }
        }
    }

    debug!(components = count, "disjoint parts marked");
    Ok(Components {
        labels: labels.into_iter().map(|l| l.unwrap_or(0)).collect(),
        count,
    })
}
