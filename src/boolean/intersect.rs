// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Spatial pairwise-intersection engine
//!
//! Candidate pairs come from a sweep over polygons sorted by their minimum
//! along the configured axis. Each surviving pair of convex polygons yields at
//! most one segment per polygon: the overlap, along the line where the two
//! planes meet, of the two polygons' chords on that line.
//!
//! Chord ends are computed from the crossing polygon's own edges with
//! [`edge_plane_crossing`], which orders the edge endpoints first. Two
//! polygons sharing an edge therefore produce bit-identical chain points, and
//! segments can later be chained by coordinate.

use nalgebra::{Point3, Vector3};
use tracing::{debug, instrument, trace};

use super::engine::BoolStats;
use crate::config::BoolConfig;
use crate::error::BooleanResult;
use crate::geometry::predicates::{edge_plane_crossing, side_of_plane, Side};
use crate::geometry::{BoundingBox, Mesh, PolyId, Polygon, Tolerance};

/// Where a segment end lies on the boundary of the polygon it is filed under.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Touch {
    /// Edge index (the edge starts at this vertex).
    pub edge: usize,
    /// Fractional position along the edge, in `[0, 1)`.
    pub t: f64,
}

impl Touch {
    /// Perimeter key: edge index plus fractional position.
    pub fn key(&self) -> f64 {
        self.edge as f64 + self.t
    }

    /// The input vertex this touch coincides with, if any.
    pub fn vertex(&self) -> Option<usize> {
        (self.t == 0.0).then_some(self.edge)
    }
}

/// One intersection segment, owned by the polygon it is filed under.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub start: Point3<f64>,
    pub end: Point3<f64>,
    pub start_touch: Option<Touch>,
    pub end_touch: Option<Touch>,
    /// The polygon of the other operand that produced this segment.
    pub other: PolyId,
}

impl Segment {
    /// The same segment traversed the other way.
    pub fn reversed(&self) -> Self {
        Self {
            start: self.end,
            end: self.start,
            start_touch: self.end_touch,
            end_touch: self.start_touch,
            other: self.other,
        }
    }

    pub fn length(&self) -> f64 {
        (self.end - self.start).norm()
    }

    fn same_as(&self, other: &Segment, tol: &Tolerance) -> bool {
        (tol.same_point(&self.start, &other.start) && tol.same_point(&self.end, &other.end))
            || (tol.same_point(&self.start, &other.end) && tol.same_point(&self.end, &other.start))
    }
}

/// Everything the intersection phase learned about one polygon.
#[derive(Debug, Clone, Default)]
pub struct PolygonHits {
    pub segments: Vec<Segment>,
    /// Edges along which the other operand's surface runs; flood fill must
    /// not cross them.
    pub contact_edges: Vec<usize>,
    /// Coplanar partners in the other operand, with whether they face the
    /// same way.
    pub coplanar: Vec<(PolyId, bool)>,
}

impl PolygonHits {
    /// File a segment unless an equal one is already present.
    pub fn file(&mut self, segment: Segment, tol: &Tolerance) -> bool {
        if self.segments.iter().any(|s| s.same_as(&segment, tol)) {
            return false;
        }
        self.segments.push(segment);
        true
    }

    pub fn is_contact(&self, edge: usize) -> bool {
        self.contact_edges.contains(&edge)
    }

    pub fn is_split(&self) -> bool {
        !self.segments.is_empty()
    }
}

/// Per-polygon results for both operands.
#[derive(Debug, Clone, Default)]
pub struct Intersections {
    pub a: Vec<PolygonHits>,
    pub b: Vec<PolygonHits>,
}

impl Intersections {
    pub fn empty(a: &Mesh, b: &Mesh) -> Self {
        Self {
            a: vec![PolygonHits::default(); a.len()],
            b: vec![PolygonHits::default(); b.len()],
        }
    }

    pub fn segment_count(&self) -> usize {
        self.a.iter().chain(&self.b).map(|h| h.segments.len()).sum()
    }
}

/// Outcome of testing one polygon against another.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PairOutcome {
    Disjoint,
    /// The planes coincide; `same` when they face the same way.
    Coplanar { same: bool },
    /// The other polygon meets this one only along the given edge.
    Contact { edge: usize },
    Segment(Segment),
    /// The other polygon reaches this plane with an edge and stays on one
    /// side of it. Whether the segment is real depends on the polygon across
    /// that edge; `behind` tells which side the other polygon is on.
    Flush { segment: Segment, behind: bool },
}

/// One end of a polygon's chord on the intersection line.
#[derive(Debug, Clone, Copy)]
struct ChordEnd {
    point: Point3<f64>,
    param: f64,
    touch: Touch,
}

/// The extent of `polygon` on the line `param = dir . p` where it crosses
/// the plane whose signed distances are `dist`.
fn chord(
    polygon: &Polygon,
    dist: &[f64],
    sides: &[Side],
    dir: &Vector3<f64>,
    tol: &Tolerance,
) -> BooleanResult<Option<(ChordEnd, ChordEnd)>> {
    let n = polygon.len();
    let mut lo: Option<ChordEnd> = None;
    let mut hi: Option<ChordEnd> = None;
    let mut offer = |end: ChordEnd| {
        if lo.map_or(true, |l| end.param < l.param) {
            lo = Some(end);
        }
        if hi.map_or(true, |h| end.param > h.param) {
            hi = Some(end);
        }
    };

    for i in 0..n {
        let j = polygon.next(i);
        let (a, b) = polygon.edge(i);
        if sides[i] == Side::On {
            offer(ChordEnd {
                point: a,
                param: dir.dot(&a.coords),
                touch: Touch { edge: i, t: 0.0 },
            });
        }
        if sides[i].sign() * sides[j].sign() < 0 {
            let point = edge_plane_crossing(&a, &b, dist[i], dist[j])?;
            let length = (b - a).norm();
            let along = (point - a).norm();
            let touch = if along <= tol.eps {
                Touch { edge: i, t: 0.0 }
            } else if length - along <= tol.eps {
                Touch { edge: j, t: 0.0 }
            } else {
                Touch {
                    edge: i,
                    t: along / length,
                }
            };
            offer(ChordEnd {
                point,
                param: dir.dot(&point.coords),
                touch,
            });
        }
    }

    Ok(match (lo, hi) {
        (Some(lo), Some(hi)) if hi.param - lo.param > tol.eps => Some((lo, hi)),
        _ => None,
    })
}

fn signed_distances(polygon: &Polygon, plane_of: &Polygon, tol: &Tolerance) -> (Vec<f64>, Vec<Side>) {
    let dist: Vec<f64> = polygon
        .vertices
        .iter()
        .map(|v| plane_of.plane.signed_distance(&v.position))
        .collect();
    let sides = polygon
        .vertices
        .iter()
        .map(|v| side_of_plane(&plane_of.plane, &v.position, tol))
        .collect();
    (dist, sides)
}

fn one_sided(sides: &[Side]) -> bool {
    sides.iter().all(|s| *s == Side::Front) || sides.iter().all(|s| *s == Side::Back)
}

/// The edge of `polygon` that the whole segment (a, b) lies along, if any.
fn edge_along(polygon: &Polygon, a: &Point3<f64>, b: &Point3<f64>, tol: &Tolerance) -> Option<usize> {
    let mid = nalgebra::center(a, b);
    (0..polygon.len()).find(|&i| {
        let (p, q) = polygon.edge(i);
        let axis = q - p;
        let len2 = axis.norm_squared();
        if len2 <= f64::MIN_POSITIVE {
            return false;
        }
        let near = |x: &Point3<f64>| {
            let t = ((x - p).dot(&axis) / len2).clamp(0.0, 1.0);
            (x - (p + axis * t)).norm() <= tol.eps
        };
        near(a) && near(b) && near(&mid)
    })
}

/// Intersect `pb` against `pa` and describe the result from `pa`'s side.
///
/// Both polygons must be convex. `other` is the handle of `pb`, stored on
/// the produced segment.
pub fn intersect_one(
    pa: &Polygon,
    pb: &Polygon,
    other: PolyId,
    tol: &Tolerance,
) -> BooleanResult<PairOutcome> {
    let (db, sides_b) = signed_distances(pb, pa, tol);
    if one_sided(&sides_b) {
        return Ok(PairOutcome::Disjoint);
    }
    if sides_b.iter().all(|s| *s == Side::On) {
        return Ok(match pa.plane.coincides(&pb.plane, tol.eps.max(1e-9)) {
            Some(same) => PairOutcome::Coplanar { same },
            None => PairOutcome::Coplanar {
                same: pa.plane.normal.dot(&pb.plane.normal) > 0.0,
            },
        });
    }
    let flush = !sides_b.contains(&Side::Front) || !sides_b.contains(&Side::Back);
    let (da, sides_a) = signed_distances(pa, pb, tol);
    if one_sided(&sides_a) {
        return Ok(PairOutcome::Disjoint);
    }

    let dir = pa.plane.normal.cross(&pb.plane.normal);
    let length = dir.norm();
    if length <= 1e-12 {
        return Ok(PairOutcome::Disjoint);
    }
    let dir = dir / length;

    let Some((b_lo, b_hi)) = chord(pb, &db, &sides_b, &dir, tol)? else {
        return Ok(PairOutcome::Disjoint);
    };
    let Some((a_lo, a_hi)) = chord(pa, &da, &sides_a, &dir, tol)? else {
        return Ok(PairOutcome::Disjoint);
    };

    // Ends coming from pa's own chord lie on pa's boundary.
    let (start, start_touch) = if a_lo.param >= b_lo.param - tol.eps {
        (a_lo.point, Some(a_lo.touch))
    } else {
        (b_lo.point, None)
    };
    let (end, end_touch) = if a_hi.param <= b_hi.param + tol.eps {
        (a_hi.point, Some(a_hi.touch))
    } else {
        (b_hi.point, None)
    };
    if dir.dot(&(end - start)) <= tol.eps {
        return Ok(PairOutcome::Disjoint);
    }

    if start_touch.is_some() && end_touch.is_some() {
        if let Some(edge) = edge_along(pa, &start, &end, tol) {
            return Ok(PairOutcome::Contact { edge });
        }
    }

    let segment = Segment {
        start,
        end,
        start_touch,
        end_touch,
        other,
    };
    if flush {
        return Ok(PairOutcome::Flush {
            segment,
            behind: sides_b.contains(&Side::Back),
        });
    }
    Ok(PairOutcome::Segment(segment))
}

/// Whether the surface of `source` passes through `pa`'s plane along the
/// edges of `pb` lying in it: every polygon across those edges reaches the
/// front side.
fn surface_crosses(pa: &Polygon, pb: &Polygon, source: &Mesh, tol: &Tolerance) -> bool {
    let on_plane = |p: &Point3<f64>| side_of_plane(&pa.plane, p, tol) == Side::On;
    let mut flush_edges = (0..pb.len())
        .filter(|&i| on_plane(pb.point(i)) && on_plane(pb.point(pb.next(i))))
        .peekable();
    flush_edges.peek().is_some()
        && flush_edges.all(|i| {
            pb.vertices[i].adjacent.map_or(false, |n| {
                source
                    .polygon(n)
                    .vertices
                    .iter()
                    .any(|v| side_of_plane(&pa.plane, &v.position, tol) == Side::Front)
            })
        })
}

/// Turn a flush outcome into a segment or nothing. A surface crossing the
/// plane along an edge is filed once, from the polygon behind the plane;
/// a surface that only rests on the plane leaves no segment.
fn settle_flush(
    outcome: PairOutcome,
    pa: &Polygon,
    pb: &Polygon,
    source: &Mesh,
    tol: &Tolerance,
) -> PairOutcome {
    match outcome {
        PairOutcome::Flush { segment, behind } => {
            if behind && surface_crosses(pa, pb, source, tol) {
                PairOutcome::Segment(segment)
            } else {
                trace!(other = segment.other.index(), "edge resting on the plane skipped");
                PairOutcome::Disjoint
            }
        }
        other => other,
    }
}

fn file_outcome(hits: &mut PolygonHits, outcome: PairOutcome, tol: &Tolerance, stats: &mut BoolStats) {
    match outcome {
        PairOutcome::Segment(segment) => {
            if hits.file(segment, tol) {
                stats.segments += 1;
            }
        }
        PairOutcome::Contact { edge } => {
            if !hits.is_contact(edge) {
                hits.contact_edges.push(edge);
            }
        }
        PairOutcome::Coplanar { .. } | PairOutcome::Flush { .. } | PairOutcome::Disjoint => {}
    }
}

/// Polygon indices sorted by bounding-box minimum along `axis`.
fn sorted_by_axis(boxes: &[BoundingBox], axis: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..boxes.len()).collect();
    order.sort_by(|&i, &j| boxes[i].min[axis].total_cmp(&boxes[j].min[axis]));
    order
}

/// Find every intersecting pair between `a` and `b` and file the segments.
#[instrument(skip_all, fields(a = a.len(), b = b.len()))]
pub fn intersect_all(
    a: &Mesh,
    b: &Mesh,
    config: &BoolConfig,
    tol: &Tolerance,
    stats: &mut BoolStats,
) -> BooleanResult<Intersections> {
    let axis = config.sort_axis.index();
    let boxes_a: Vec<BoundingBox> = a.polygons.iter().map(Polygon::bounding_box).collect();
    let boxes_b: Vec<BoundingBox> = b.polygons.iter().map(Polygon::bounding_box).collect();
    let order_a = sorted_by_axis(&boxes_a, axis);
    let order_b = sorted_by_axis(&boxes_b, axis);

    let mut hits = Intersections::empty(a, b);
    let mut window = 0;

    for &ia in &order_a {
        let box_a = &boxes_a[ia];
        while window < order_b.len() && boxes_b[order_b[window]].max[axis] < box_a.min[axis] - tol.eps {
            window += 1;
        }
        for &ib in &order_b[window..] {
            let box_b = &boxes_b[ib];
            if box_b.min[axis] > box_a.max[axis] + tol.eps {
                break;
            }
            stats.candidate_pairs += 1;
            if !box_a.overlaps(box_b, tol.eps) {
                continue;
            }

            let (pa, pb) = (&a.polygons[ia], &b.polygons[ib]);
            stats.exact_pair_tests += 1;
            let on_a = intersect_one(pa, pb, PolyId(ib), tol)?;
            if let PairOutcome::Coplanar { same } = on_a {
                if config.coplanar {
                    trace!(ia, ib, same, "coplanar pair deferred");
                    hits.a[ia].coplanar.push((PolyId(ib), same));
                    hits.b[ib].coplanar.push((PolyId(ia), same));
                    stats.coplanar_pairs += 1;
                }
                continue;
            }
            if on_a == PairOutcome::Disjoint {
                continue;
            }
            file_outcome(&mut hits.a[ia], settle_flush(on_a, pa, pb, b, tol), tol, stats);
            let on_b = intersect_one(pb, pa, PolyId(ia), tol)?;
            file_outcome(&mut hits.b[ib], settle_flush(on_b, pb, pa, a, tol), tol, stats);
        }
    }

    debug!(
        candidates = stats.candidate_pairs,
        exact = stats.exact_pair_tests,
        segments = stats.segments,
        coplanar = stats.coplanar_pairs,
        "pairwise intersection done"
    );
    Ok(hits)
}

/// Intersection segments of a mesh with itself. Polygons sharing a vertex
/// are neighbors and are not tested against each other.
#[instrument(skip_all, fields(polygons = mesh.len()))]
pub fn intersect_self(
    mesh: &Mesh,
    config: &BoolConfig,
    tol: &Tolerance,
    stats: &mut BoolStats,
) -> BooleanResult<Vec<Segment>> {
    let axis = config.sort_axis.index();
    let boxes: Vec<BoundingBox> = mesh.polygons.iter().map(Polygon::bounding_box).collect();
    let order = sorted_by_axis(&boxes, axis);
    let mut found = PolygonHits::default();

    for (k, &i) in order.iter().enumerate() {
        for &j in &order[k + 1..] {
            if boxes[j].min[axis] > boxes[i].max[axis] + tol.eps {
                break;
            }
            stats.candidate_pairs += 1;
            if !boxes[i].overlaps(&boxes[j], tol.eps) {
                continue;
            }
            let (pi, pj) = (&mesh.polygons[i], &mesh.polygons[j]);
            let touching = pi
                .vertices
                .iter()
                .any(|v| pj.vertices.iter().any(|w| tol.same_point(&v.position, &w.position)));
            if touching {
                continue;
            }
            stats.exact_pair_tests += 1;
            if let PairOutcome::Segment(segment) | PairOutcome::Flush { segment, .. } =
                intersect_one(pi, pj, PolyId(j), tol)?
            {
                if found.file(segment, tol) {
                    stats.segments += 1;
                }
            }
        }
    }
    Ok(found.segments)
}
