// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Hole slitting
//!
//! Joins holes into their outer boundary with a bridge: a ray fired in +u
//! from the hole's rightmost vertex picks a visible outer vertex, and the two
//! are connected by a pair of coincident, opposite cut edges. The result is a
//! single weakly simple polygon with `outer + hole + 2` vertices per hole.

use nalgebra::Point2;

use crate::error::{BoolError, BooleanResult};
use crate::geometry::predicates::signed_area_2d;
use crate::geometry::{PlaneFrame, Vertex};

fn flat(frame: &PlaneFrame, ring: &[Vertex]) -> Vec<Point2<f64>> {
    ring.iter().map(|v| frame.to_local(&v.position)).collect()
}

fn rightmost(points: &[Point2<f64>]) -> usize {
    let mut best = 0;
    for (i, p) in points.iter().enumerate() {
        let b = points[best];
        if p.x > b.x || (p.x == b.x && p.y < b.y) {
            best = i;
        }
    }
    best
}

fn in_triangle(p: &Point2<f64>, a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>) -> bool {
    (c.x - p.x) * (a.y - p.y) - (a.x - p.x) * (c.y - p.y) >= 0.0
        && (a.x - p.x) * (b.y - p.y) - (b.x - p.x) * (a.y - p.y) >= 0.0
        && (b.x - p.x) * (c.y - p.y) - (c.x - p.x) * (b.y - p.y) >= 0.0
}

fn is_reflex(prev: &Point2<f64>, at: &Point2<f64>, next: &Point2<f64>) -> bool {
    (at - prev).perp(&(next - at)) < 0.0
}

/// Index of the outer vertex that the hole vertex `h` can be bridged to.
fn bridge_target(outer: &[Point2<f64>], h: &Point2<f64>) -> Option<usize> {
    let n = outer.len();
    let mut best_x = f64::NEG_INFINITY;
    let mut target = None;

    // Nearest edge crossed by the ray h + t * (1, 0), t >= 0, keeping its
    // endpoint with the larger x.
    let mut hit_x = f64::INFINITY;
    for i in 0..n {
        let a = outer[i];
        let b = outer[(i + 1) % n];
        if (a.y <= h.y && h.y <= b.y) || (b.y <= h.y && h.y <= a.y) {
            if a.y == b.y {
                continue;
            }
            let x = a.x + (h.y - a.y) * (b.x - a.x) / (b.y - a.y);
            if x >= h.x && x < hit_x {
                hit_x = x;
                target = Some(if a.x > b.x { i } else { (i + 1) % n });
                if x == h.x {
                    // The hole vertex touches the edge.
                    return target;
                }
            }
        }
    }
    let mut m = target?;
    let hit = Point2::new(hit_x, h.y);
    let mp = outer[m];

    // A reflex vertex inside the triangle (h, hit, m) would block the bridge;
    // take the one closest in angle to the ray instead.
    let mut best_tan = f64::INFINITY;
    for i in 0..n {
        let p = outer[i];
        if i == m || p.x < h.x || p.x > mp.x {
            continue;
        }
        let (a, c) = if h.y < mp.y { (*h, hit) } else { (hit, *h) };
        let inside = in_triangle(&p, &a, &mp, &c) || in_triangle(&p, &c, &mp, &a);
        if !inside || !is_reflex(&outer[(i + n - 1) % n], &p, &outer[(i + 1) % n]) {
            continue;
        }
        let tan = (h.y - p.y).abs() / (p.x - h.x).max(f64::MIN_POSITIVE);
        if tan < best_tan || (tan == best_tan && p.x > best_x) {
            best_tan = tan;
            best_x = p.x;
            m = i;
        }
    }
    Some(m)
}

/// Bridge every hole into `outer`.
///
/// `outer` must be counter-clockwise in `frame`; holes are re-oriented
/// clockwise as needed. Bridge vertices are tagged as slit vertices.
pub fn slit_holes(
    outer: Vec<Vertex>,
    holes: Vec<Vec<Vertex>>,
    frame: &PlaneFrame,
) -> BooleanResult<Vec<Vertex>> {
    let mut holes: Vec<(f64, Vec<Vertex>)> = holes
        .into_iter()
        .filter(|h| h.len() >= 3)
        .map(|mut hole| {
            let pts = flat(frame, &hole);
            if signed_area_2d(&pts) > 0.0 {
                hole.reverse();
            }
            let max_x = pts.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
            (max_x, hole)
        })
        .collect();
    // Rightmost holes first, so later bridges never cross earlier ones.
    holes.sort_by(|a, b| b.0.total_cmp(&a.0));

    let mut merged = outer;
    for (_, hole) in holes {
        let hole_pts = flat(frame, &hole);
        let h = rightmost(&hole_pts);
        let outer_pts = flat(frame, &merged);
        let m = bridge_target(&outer_pts, &hole_pts[h]).ok_or_else(|| {
            BoolError::numerical("hole is not enclosed by its outer boundary")
        })?;

        let mut bridge_out = merged[m];
        bridge_out.tags.slit = true;
        bridge_out.adjacent = None;
        let mut bridge_in = hole[h];
        bridge_in.tags.slit = true;
        bridge_in.adjacent = None;

        let mut spliced = Vec::with_capacity(merged.len() + hole.len() + 2);
        spliced.extend_from_slice(&merged[..m]);
        spliced.push(bridge_out);
        spliced.push(bridge_in);
        spliced.extend(hole[h + 1..].iter().copied());
        spliced.extend(hole[..h].iter().copied());
        spliced.push(bridge_in);
        spliced.push(bridge_out);
        spliced.extend_from_slice(&merged[m + 1..]);
        merged = spliced;
    }
    Ok(merged)
}
