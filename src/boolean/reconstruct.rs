// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Polygon reconstructor
//!
//! Cuts every split polygon along its loops, classifies the pieces, and
//! propagates inside/outside labels from them to untouched neighbors across
//! shared edges. Polygons the flood cannot reach are settled with ray-parity
//! tests: one per untouched component, one per polygon otherwise.

use nalgebra::{Matrix3, Matrix3x2, Point2, Point3, Vector2, Vector3};
use tracing::{debug, instrument, trace, warn};

use super::adjacency::mark_disjoint_parts;
use super::classify::{interior_point, point_in_solid, side_of_cut, MIN_DIRECTIONAL_STRENGTH};
use super::coplanar::{split_by_cuts, CoplanarResolution};
use super::engine::BoolStats;
use super::intersect::{PolygonHits, Segment};
use super::loops::{extract_loops, sort_open_loops, EndRef, Loop, LoopEnd, LoopSet, PerimeterOrder};
use super::slit::slit_holes;
use super::{BoolOp, Location, Operand};
use crate::config::{BoolConfig, UvMode};
use crate::error::{BoolError, BooleanResult, TopologyFault};
use crate::geometry::predicates::{point_in_polygon_2d, signed_area_2d, PointLocation};
use crate::geometry::{Mesh, PlaneFrame, PolyId, PolyState, Polygon, Tolerance, Vertex};

impl From<Location> for PolyState {
    fn from(location: Location) -> Self {
        match location {
            Location::Inside => PolyState::Inside,
            Location::Outside => PolyState::Outside,
        }
    }
}

fn location_of(state: PolyState) -> Option<Location> {
    match state {
        PolyState::Inside => Some(Location::Inside),
        PolyState::Outside => Some(Location::Outside),
        _ => None,
    }
}

/// Corner of a region being carved out of a split polygon.
#[derive(Debug, Clone, Copy)]
struct Node {
    position: Point3<f64>,
    /// Input vertex index, when the node is one.
    original: Option<usize>,
    /// Open-loop end not yet cut off at this node.
    end: Option<EndRef>,
    /// Producer of the cut edge starting here; `None` on the input boundary.
    cut: Option<PolyId>,
}

impl Node {
    fn boundary(position: Point3<f64>, original: Option<usize>) -> Self {
        Self {
            position,
            original,
            end: None,
            cut: None,
        }
    }

    fn cut(position: Point3<f64>, producer: PolyId) -> Self {
        Self {
            position,
            original: None,
            end: None,
            cut: Some(producer),
        }
    }
}

/// Affine map from plane-frame coordinates to texture coordinates.
#[derive(Debug, Clone, Copy)]
struct UvFit(Matrix3x2<f64>);

impl UvFit {
    /// Least-squares fit over the polygon's corners; `None` unless every
    /// corner carries a UV and the corners span the plane.
    fn of(polygon: &Polygon, frame: &PlaneFrame) -> Option<Self> {
        let mut normal = Matrix3::<f64>::zeros();
        let mut rhs = Matrix3x2::<f64>::zeros();
        for vertex in &polygon.vertices {
            let uv = vertex.uv?;
            let flat = frame.to_local(&vertex.position);
            let row = Vector3::new(flat.x, flat.y, 1.0);
            normal += row * row.transpose();
            rhs += row * uv.transpose();
        }
        let inverse = normal.try_inverse()?;
        Some(Self(inverse * rhs))
    }

    fn at(&self, flat: &Point2<f64>) -> Vector2<f64> {
        self.0.transpose() * Vector3::new(flat.x, flat.y, 1.0)
    }
}

/// Per-polygon geometry shared by every piece cut from it.
struct Parent<'p> {
    polygon: &'p Polygon,
    frame: PlaneFrame,
    uv: Option<UvFit>,
}

impl<'p> Parent<'p> {
    fn new(polygon: &'p Polygon, uv_mode: UvMode) -> BooleanResult<Self> {
        let frame = PlaneFrame::new(&polygon.plane, polygon.point(0))?;
        let uv = match uv_mode {
            UvMode::Interpolate => UvFit::of(polygon, &frame),
            UvMode::Ignore => None,
        };
        Ok(Self { polygon, frame, uv })
    }

    fn vertex(&self, node: &Node) -> Vertex {
        match node.original {
            Some(i) => {
                let mut vertex = self.polygon.vertices[i];
                vertex.adjacent = None;
                vertex
            }
            None => {
                let uv = self.uv.map(|fit| fit.at(&self.frame.to_local(&node.position)));
                Vertex::created(node.position, uv)
            }
        }
    }

    fn vertices(&self, nodes: &[Node], tol: &Tolerance) -> Vec<Vertex> {
        let mut out: Vec<Vertex> = Vec::with_capacity(nodes.len());
        for node in nodes {
            match out.last() {
                Some(last) if tol.same_point(&last.position, &node.position) => {}
                _ => out.push(self.vertex(node)),
            }
        }
        while out.len() > 1 && tol.same_point(&out[0].position, &out[out.len() - 1].position) {
            out.pop();
        }
        out
    }

    fn flat(&self, nodes: &[Node]) -> Vec<Point2<f64>> {
        nodes.iter().map(|n| self.frame.to_local(&n.position)).collect()
    }
}

/// Boundary ring of a polygon with a node inserted at every open-loop end,
/// in perimeter order.
fn boundary_ring(polygon: &Polygon, open: &[Loop], ends: &[EndRef]) -> Vec<Node> {
    let n = polygon.len();
    let mut ring = Vec::with_capacity(n + ends.len());
    let mut next = 0;
    for &end in ends {
        let Some(touch) = open[end.loop_index].touch(end.end) else {
            continue;
        };
        while next < n && (next < touch.edge || (next == touch.edge && touch.t > 0.0)) {
            ring.push(Node::boundary(*polygon.point(next), Some(next)));
            next += 1;
        }
        let (position, original) = match touch.vertex() {
            Some(v) => {
                if next == v {
                    next += 1;
                }
                (*polygon.point(v), Some(v))
            }
            None => (open[end.loop_index].point(end.end), None),
        };
        ring.push(Node {
            position,
            original,
            end: Some(end),
            cut: None,
        });
    }
    while next < n {
        ring.push(Node::boundary(*polygon.point(next), Some(next)));
        next += 1;
    }
    ring
}

/// Input edges of `polygon` that appear whole, in order, on `face`.
fn whole_edges(polygon: &Polygon, face: &Polygon, tol: &Tolerance) -> Vec<usize> {
    (0..polygon.len())
        .filter(|&i| {
            let (a, b) = polygon.edge(i);
            (0..face.len())
                .any(|k| tol.same_point(face.point(k), &a) && tol.same_point(face.point(face.next(k)), &b))
        })
        .collect()
}

fn find_end(ring: &[Node], end: EndRef) -> BooleanResult<usize> {
    ring.iter().position(|n| n.end == Some(end)).ok_or_else(|| {
        BoolError::topology(
            TopologyFault::VertexLookup,
            format!("open loop {} end {:?} is missing from the boundary", end.loop_index, end.end),
        )
    })
}

/// Nodes from `from` forward to `to`, both included.
fn arc(ring: &[Node], from: usize, to: usize) -> Vec<Node> {
    let n = ring.len();
    let mut out = Vec::new();
    let mut i = from;
    loop {
        out.push(ring[i]);
        if i == to {
            return out;
        }
        i = (i + 1) % n;
    }
}

/// Append the interior of `chain` walked from `from`, and mark the last node
/// already in `nodes` as the start of the first cut step.
fn append_walk(nodes: &mut Vec<Node>, chain: &Loop, from: LoopEnd) {
    let (inner, others) = chain.walk(from);
    if let Some(last) = nodes.last_mut() {
        last.cut = Some(others[0]);
    }
    nodes.extend(inner.iter().zip(&others[1..]).map(|(p, o)| Node::cut(*p, *o)));
}

/// Carve the regions bounded by open loops. The last region is what remains
/// after every loop has been cut off.
fn carve(polygon: &Polygon, open: &[Loop], order: &PerimeterOrder) -> BooleanResult<Vec<Vec<Node>>> {
    let mut ring = boundary_ring(polygon, open, &order.ends);
    let mut regions = Vec::with_capacity(order.extraction.len() + 1);
    for &first in &order.extraction {
        let second = EndRef {
            loop_index: first.loop_index,
            end: first.end.other(),
        };
        let chain = &open[first.loop_index];
        let i1 = find_end(&ring, first)?;
        let i2 = find_end(&ring, second)?;

        let mut piece = arc(&ring, i1, i2);
        append_walk(&mut piece, chain, second.end);

        let mut rest = arc(&ring, i2, i1);
        rest[0].end = None;
        if let Some(last) = rest.last_mut() {
            last.end = None;
        }
        append_walk(&mut rest, chain, first.end);

        regions.push(piece);
        ring = rest;
    }
    regions.push(ring);
    Ok(regions)
}

/// Cuts, classifies and emits the polygons of one operand.
pub struct Reconstructor<'a> {
    pub op: BoolOp,
    pub operand: Operand,
    pub config: &'a BoolConfig,
    pub tol: &'a Tolerance,
    /// Intersection results for this operand's polygons.
    pub hits: &'a [PolygonHits],
    /// Coplanar resolutions for this operand's polygons.
    pub coplanar: &'a [Option<CoplanarResolution>],
    /// The other operand.
    pub other: &'a Mesh,
}

impl<'a> Reconstructor<'a> {
    /// Classify `mesh` against the other operand and return the polygons the
    /// operator keeps, reversed where it asks for that.
    #[instrument(skip_all, fields(operand = ?self.operand, op = %self.op, polygons = mesh.len()))]
    pub fn extract_polygons(&self, mesh: &mut Mesh, stats: &mut BoolStats) -> BooleanResult<Vec<Polygon>> {
        let Some(wanted) = self.op.wanted(self.operand) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        let mut seeds: Vec<(PolyId, usize, Location)> = Vec::new();

        for id in mesh.ids() {
            let polygon = mesh.polygon_mut(id);
            polygon.state = PolyState::Complete;
            polygon.coplanar = false;
        }

        for id in mesh.ids() {
            if let Some(resolution) = self.coplanar.get(id.index()).and_then(Option::as_ref) {
                let polygon = mesh.polygon_mut(id);
                polygon.state = PolyState::Split;
                polygon.coplanar = true;
                out.extend(resolution.overlap.iter().cloned());
                let segments = &self.hits[id.index()].segments;
                if !segments.is_empty() {
                    stats.split_polygons += 1;
                }
                let remainder = &resolution.remainder;
                let edges = self.split_remainder(mesh.polygon(id), remainder, segments, wanted, &mut out)?;
                seeds.extend(edges.into_iter().map(|(edge, location)| (id, edge, location)));
                continue;
            }
            let segments = &self.hits[id.index()].segments;
            if segments.is_empty() {
                continue;
            }
            mesh.polygon_mut(id).state = PolyState::Split;
            stats.split_polygons += 1;
            let edges = self.split_polygon(mesh.polygon(id), segments, wanted, &mut out, stats)?;
            seeds.extend(edges.into_iter().map(|(edge, location)| (id, edge, location)));
        }

        let flooded = self.flood(mesh, seeds, stats)?;
        self.settle_leftovers(mesh, stats)?;
        debug!(flooded, split = stats.split_polygons, "classification settled");

        for polygon in &mesh.polygons {
            if location_of(polygon.state) == Some(wanted) {
                let mut kept = polygon.clone();
                kept.clear_adjacency();
                kept.state = PolyState::Untested;
                kept.coplanar = false;
                out.push(kept);
            }
        }
        if self.operand == Operand::B && self.op.reverses_b() {
            for polygon in &mut out {
                *polygon = polygon.reversed();
            }
        }
        Ok(out)
    }

    /// Parity test of a representative interior point of `polygon`.
    fn probe(&self, polygon: &Polygon) -> BooleanResult<Option<Location>> {
        let probes = interior_point(polygon, self.tol)
            .into_iter()
            .chain(std::iter::once(polygon.centroid()));
        for point in probes {
            if let Some(location) = point_in_solid(&point, self.other, self.tol)? {
                return Ok(Some(location));
            }
        }
        Ok(None)
    }

    /// Cut the parts of a coplanar polygon left outside its partners along
    /// the polygon's own segments, then classify and emit each face.
    fn split_remainder(
        &self,
        polygon: &Polygon,
        remainder: &[Polygon],
        segments: &[Segment],
        wanted: Location,
        out: &mut Vec<Polygon>,
    ) -> BooleanResult<Vec<(usize, Location)>> {
        let parent = Parent::new(polygon, self.config.uv_mode)?;
        let mut edge_locations = Vec::new();
        for piece in remainder {
            let faces = if segments.is_empty() {
                vec![piece.clone()]
            } else {
                split_by_cuts(piece, segments, self.tol)?
            };
            for mut face in faces {
                let location = self.probe(&face)?.unwrap_or(Location::Outside);
                let whole = whole_edges(polygon, &face, self.tol);
                edge_locations.extend(whole.into_iter().map(|i| (i, location)));
                if location != wanted {
                    continue;
                }
                if let Some(fit) = parent.uv {
                    for vertex in face.vertices.iter_mut().filter(|v| v.uv.is_none()) {
                        vertex.uv = Some(fit.at(&parent.frame.to_local(&vertex.position)));
                    }
                }
                out.push(face);
            }
        }
        Ok(edge_locations)
    }

    /// Location of a region from its cut edges, falling back to a parity
    /// probe when no cut edge is decisive.
    fn classify_region(&self, parent: &Parent<'_>, nodes: &[Node], vertices: &[Vertex]) -> BooleanResult<Option<Location>> {
        let n = nodes.len();
        let mut best: Option<(Location, f64)> = None;
        for k in 0..n {
            let Some(producer) = nodes[k].cut else {
                continue;
            };
            let step = nodes[(k + 1) % n].position - nodes[k].position;
            let length = step.norm();
            if length <= self.tol.eps {
                continue;
            }
            let producer_normal = self.other.polygon(producer).plane.normal;
            if let Some((location, strength)) = side_of_cut(&parent.polygon.plane.normal, &(step / length), &producer_normal) {
                if best.map_or(true, |(_, s)| strength > s) {
                    best = Some((location, strength));
                }
            }
        }
        match best {
            Some((location, strength)) if strength >= MIN_DIRECTIONAL_STRENGTH => Ok(Some(location)),
            _ if vertices.len() >= 3 => {
                trace!("no decisive cut edge; probing");
                let piece = Polygon::with_plane(vertices.to_vec(), parent.polygon.plane, false);
                self.probe(&piece)
            }
            _ => Ok(None),
        }
    }

    /// Cut one polygon along its loops, emit the kept pieces and report the
    /// location of every input edge that lies wholly inside one piece.
    fn split_polygon(
        &self,
        polygon: &Polygon,
        segments: &[Segment],
        wanted: Location,
        out: &mut Vec<Polygon>,
        stats: &mut BoolStats,
    ) -> BooleanResult<Vec<(usize, Location)>> {
        let tol = self.tol;
        let parent = Parent::new(polygon, self.config.uv_mode)?;
        let LoopSet { open, mut closed } = extract_loops(segments, tol)?;
        stats.open_loops += open.len();
        stats.closed_loops += closed.len();
        let order = sort_open_loops(&open, self.config.loop_order_retries)?;
        let min_area = tol.eps * tol.eps;

        let regions: Vec<Vec<Node>> = carve(polygon, &open, &order)?
            .into_iter()
            .filter(|nodes| signed_area_2d(&parent.flat(nodes)) > min_area)
            .collect();

        // Closed loops, counter-clockwise, with their interior location and
        // the loop directly enclosing each.
        for chain in &mut closed {
            let flat = parent.frame.to_local_all(&chain.points);
            if signed_area_2d(&flat) < 0.0 {
                chain.reverse_closed();
            }
        }
        let loop_nodes: Vec<Vec<Node>> = closed
            .iter()
            .map(|chain| {
                chain
                    .points
                    .iter()
                    .zip(&chain.others)
                    .map(|(p, o)| Node::cut(*p, *o))
                    .collect()
            })
            .collect();
        let loop_vertices: Vec<Vec<Vertex>> = loop_nodes.iter().map(|nodes| parent.vertices(nodes, tol)).collect();
        let loop_flat: Vec<Vec<Point2<f64>>> = loop_nodes.iter().map(|nodes| parent.flat(nodes)).collect();
        let loop_areas: Vec<f64> = loop_flat.iter().map(|f| signed_area_2d(f)).collect();
        let mut loop_probe = Vec::with_capacity(closed.len());
        let mut loop_location = Vec::with_capacity(closed.len());
        for (nodes, vertices) in loop_nodes.iter().zip(&loop_vertices) {
            let piece = Polygon::with_plane(vertices.clone(), polygon.plane, false);
            loop_probe.push(interior_point(&piece, tol).map(|p| parent.frame.to_local(&p)));
            loop_location.push(self.classify_region(&parent, nodes, vertices)?);
        }
        let contains = |outer: usize, probe: &Point2<f64>| {
            point_in_polygon_2d(probe, &loop_flat[outer], 0.0) == PointLocation::Inside
        };
        let loop_parent: Vec<Option<usize>> = (0..closed.len())
            .map(|i| {
                let probe = loop_probe[i]?;
                (0..closed.len())
                    .filter(|&j| j != i && loop_areas[j] > loop_areas[i] && contains(j, &probe))
                    .min_by(|&x, &y| loop_areas[x].total_cmp(&loop_areas[y]))
            })
            .collect();

        // Top-level closed loops belong to the region holding their probe.
        let region_flat: Vec<Vec<Point2<f64>>> = regions.iter().map(|nodes| parent.flat(nodes)).collect();
        let mut region_holes: Vec<Vec<usize>> = vec![Vec::new(); regions.len()];
        for i in 0..closed.len() {
            if loop_parent[i].is_some() {
                continue;
            }
            let Some(probe) = loop_probe[i] else {
                warn!(loop_index = i, "closed loop without an interior point ignored");
                continue;
            };
            match region_flat
                .iter()
                .position(|flat| point_in_polygon_2d(&probe, flat, 0.0) == PointLocation::Inside)
            {
                Some(r) => region_holes[r].push(i),
                None => warn!(loop_index = i, "closed loop outside every region ignored"),
            }
        }

        let mut edge_locations = Vec::new();
        for (r, nodes) in regions.iter().enumerate() {
            let vertices = parent.vertices(nodes, tol);
            let has_cut = nodes.iter().any(|n| n.cut.is_some());
            let location = if has_cut {
                self.classify_region(&parent, nodes, &vertices)?
            } else {
                region_holes[r]
                    .iter()
                    .find_map(|&i| loop_location[i])
                    .map(Location::flipped)
            };
            let location = match location {
                Some(location) => location,
                None => {
                    let piece = Polygon::with_plane(vertices.clone(), polygon.plane, false);
                    self.probe(&piece)?.unwrap_or(Location::Outside)
                }
            };

            for k in 0..nodes.len() {
                let next = &nodes[(k + 1) % nodes.len()];
                if let (Some(i), Some(j), None) = (nodes[k].original, next.original, nodes[k].cut) {
                    if j == polygon.next(i) {
                        edge_locations.push((i, location));
                    }
                }
            }

            if location == wanted {
                let holes: Vec<Vec<Vertex>> = region_holes[r]
                    .iter()
                    .filter(|&&i| loop_location[i] != Some(location))
                    .map(|&i| loop_vertices[i].clone())
                    .collect();
                self.emit(vertices, holes, &parent, out)?;
            }
        }

        for i in 0..closed.len() {
            let Some(location) = loop_location[i] else {
                continue;
            };
            if location != wanted {
                continue;
            }
            let holes: Vec<Vec<Vertex>> = (0..closed.len())
                .filter(|&j| loop_parent[j] == Some(i) && loop_location[j] != Some(location))
                .map(|j| loop_vertices[j].clone())
                .collect();
            self.emit(loop_vertices[i].clone(), holes, &parent, out)?;
        }

        trace!(
            regions = regions.len(),
            closed = closed.len(),
            retries = order.retries,
            "polygon reconstructed"
        );
        Ok(edge_locations)
    }

    fn emit(
        &self,
        outer: Vec<Vertex>,
        holes: Vec<Vec<Vertex>>,
        parent: &Parent<'_>,
        out: &mut Vec<Polygon>,
    ) -> BooleanResult<()> {
        if outer.len() < 3 {
            return Ok(());
        }
        let has_holes = !holes.is_empty();
        let vertices = if has_holes {
            slit_holes(outer, holes, &parent.frame)?
        } else {
            outer
        };
        let mut piece = Polygon::with_plane(vertices, parent.polygon.plane, false);
        piece.remove_zero_length_edges(self.tol);
        if piece.len() < 3 {
            return Ok(());
        }
        piece.convex = !has_holes && piece.is_convex(self.tol);
        out.push(piece);
        Ok(())
    }

    /// Whether the flood may cross from `from` into its neighbor `to` over
    /// `from`'s edge `edge`.
    fn crossable(&self, mesh: &Mesh, from: PolyId, edge: usize, to: PolyId) -> bool {
        if self.hits[from.index()].is_contact(edge) || mesh.polygon(to).state != PolyState::Complete {
            return false;
        }
        let hits = &self.hits[to.index()];
        !mesh
            .polygon(to)
            .vertices
            .iter()
            .enumerate()
            .any(|(j, v)| v.adjacent == Some(from) && hits.is_contact(j))
    }

    /// Propagate locations across shared edges. `seeds` name a classified
    /// polygon, one of its edges and the location on that edge's far side.
    fn flood(
        &self,
        mesh: &mut Mesh,
        seeds: Vec<(PolyId, usize, Location)>,
        stats: &mut BoolStats,
    ) -> BooleanResult<usize> {
        let limit = self.config.flood_stack_limit;
        let mut stack: Vec<(PolyId, Location)> = Vec::new();
        let push = |stack: &mut Vec<(PolyId, Location)>, entry| {
            if stack.len() >= limit {
                return Err(BoolError::topology(
                    TopologyFault::StackOverflow,
                    format!("classification flood exceeded {limit} entries"),
                ));
            }
            stack.push(entry);
            Ok(())
        };
        for (from, edge, location) in seeds {
            if let Some(to) = mesh.polygon(from).vertices[edge].adjacent {
                if self.crossable(mesh, from, edge, to) {
                    push(&mut stack, (to, location))?;
                }
            }
        }

        let mut classified = 0;
        while let Some((id, location)) = stack.pop() {
            if mesh.polygon(id).state != PolyState::Complete {
                continue;
            }
            mesh.polygon_mut(id).state = location.into();
            classified += 1;
            for edge in 0..mesh.polygon(id).len() {
                let Some(next) = mesh.polygon(id).vertices[edge].adjacent else {
                    continue;
                };
                if self.crossable(mesh, id, edge, next) {
                    push(&mut stack, (next, location))?;
                }
            }
        }
        stats.flood_classified += classified;
        Ok(classified)
    }

    /// Classify everything the flood from split polygons did not reach.
    fn settle_leftovers(&self, mesh: &mut Mesh, stats: &mut BoolStats) -> BooleanResult<()> {
        let components = mark_disjoint_parts(mesh, self.config.flood_stack_limit)?;
        for label in 0..components.count {
            let members: Vec<PolyId> = components.members(label).collect();
            let untouched = members.iter().all(|&id| {
                mesh.polygon(id).state == PolyState::Complete && self.hits[id.index()].contact_edges.is_empty()
            });
            if !untouched {
                continue;
            }
            stats.component_tests += 1;
            let mut location = None;
            for &id in &members {
                location = self.probe(mesh.polygon(id))?;
                if location.is_some() {
                    break;
                }
            }
            let location = location.unwrap_or(Location::Outside);
            trace!(label, members = members.len(), ?location, "component classified");
            for &id in &members {
                mesh.polygon_mut(id).state = location.into();
            }
        }

        for id in mesh.ids() {
            if mesh.polygon(id).state != PolyState::Complete {
                continue;
            }
            stats.polygon_tests += 1;
            let location = self.probe(mesh.polygon(id))?.unwrap_or(Location::Outside);
            mesh.polygon_mut(id).state = location.into();
            let seeds = (0..mesh.polygon(id).len()).map(|edge| (id, edge, location)).collect();
            self.flood(mesh, seeds, stats)?;
        }
        Ok(())
    }
}
