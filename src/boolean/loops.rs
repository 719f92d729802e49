// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Loop extractor
//!
//! Chains one polygon's unordered segments into open loops (boundary to
//! boundary) and closed loops (interior cycles), then finds the order in
//! which open loops can be cut off the polygon without crossing.

use nalgebra::Point3;
use tracing::{debug, trace};

use super::intersect::{Segment, Touch};
use crate::error::{BoolError, BooleanResult, TopologyFault};
use crate::geometry::{PolyId, Polyline, Tolerance, LADDER_RUNGS};

/// Which end of an open loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopEnd {
    Start,
    End,
}

impl LoopEnd {
    pub fn other(self) -> Self {
        match self {
            Self::Start => Self::End,
            Self::End => Self::Start,
        }
    }
}

/// A chain of segments. `others[j]` produced the step from `points[j]` to
/// `points[j + 1]` (wrapping to `points[0]` for closed loops).
#[derive(Debug, Clone, PartialEq)]
pub struct Loop {
    pub points: Vec<Point3<f64>>,
    pub others: Vec<PolyId>,
    pub start_touch: Option<Touch>,
    pub end_touch: Option<Touch>,
    pub closed: bool,
}

impl Loop {
    pub fn touch(&self, end: LoopEnd) -> Option<Touch> {
        match end {
            LoopEnd::Start => self.start_touch,
            LoopEnd::End => self.end_touch,
        }
    }

    pub fn point(&self, end: LoopEnd) -> Point3<f64> {
        match end {
            LoopEnd::Start => self.points[0],
            LoopEnd::End => self.points[self.points.len() - 1],
        }
    }

    /// Interior points and per-step producers when walking an open loop from
    /// `from` to the opposite end. The end points themselves are excluded;
    /// `others` has one more entry than the returned points.
    pub fn walk(&self, from: LoopEnd) -> (Vec<Point3<f64>>, Vec<PolyId>) {
        let inner = &self.points[1..self.points.len() - 1];
        match from {
            LoopEnd::Start => (inner.to_vec(), self.others.clone()),
            LoopEnd::End => (
                inner.iter().rev().copied().collect(),
                self.others.iter().rev().copied().collect(),
            ),
        }
    }

    /// Reverse a closed loop in place.
    pub fn reverse_closed(&mut self) {
        // Step j runs points[j] -> points[j+1]; after reversal the step out of
        // the new points[k] is the old step into it.
        let n = self.points.len();
        let points: Vec<Point3<f64>> = (0..n).map(|k| self.points[(n - k) % n]).collect();
        let others: Vec<PolyId> = (0..n).map(|k| self.others[(2 * n - k - 1) % n]).collect();
        self.points = points;
        self.others = others;
    }
}

/// Open and closed loops of one polygon.
#[derive(Debug, Clone, Default)]
pub struct LoopSet {
    pub open: Vec<Loop>,
    pub closed: Vec<Loop>,
}

/// Take the unused segment that continues from `at`, oriented to start there.
/// The match tolerance escalates along the ladder only when nothing matches
/// at the base tolerance.
fn take_next(
    segments: &[Segment],
    used: &mut [bool],
    at: &Point3<f64>,
    tol: &Tolerance,
) -> Option<Segment> {
    for rung in 0..LADDER_RUNGS {
        let eps = tol.widened(rung);
        let found = segments.iter().enumerate().find_map(|(i, s)| {
            if used[i] {
                None
            } else if eps.same_point(&s.start, at) {
                Some((i, *s))
            } else if eps.same_point(&s.end, at) {
                Some((i, s.reversed()))
            } else {
                None
            }
        });
        if let Some((i, segment)) = found {
            if rung > 0 {
                trace!(rung, "segment chained on a widened tolerance");
            }
            used[i] = true;
            return Some(segment);
        }
    }
    None
}

fn closure_error(details: String) -> BoolError {
    BoolError::topology(TopologyFault::LoopClosure, details)
}

/// Chain `segments` into loops.
pub fn extract_loops(segments: &[Segment], tol: &Tolerance) -> BooleanResult<LoopSet> {
    let mut used = vec![false; segments.len()];
    let mut set = LoopSet::default();

    // Open loops start at a boundary touch.
    while let Some(first) = (0..segments.len())
        .find(|&i| !used[i] && (segments[i].start_touch.is_some() || segments[i].end_touch.is_some()))
    {
        used[first] = true;
        let mut current = if segments[first].start_touch.is_some() {
            segments[first]
        } else {
            segments[first].reversed()
        };
        let mut chain = Loop {
            points: vec![current.start],
            others: Vec::new(),
            start_touch: current.start_touch,
            end_touch: None,
            closed: false,
        };
        loop {
            chain.points.push(current.end);
            chain.others.push(current.other);
            if current.end_touch.is_some() {
                chain.end_touch = current.end_touch;
                break;
            }
            current = take_next(segments, &mut used, &current.end, tol).ok_or_else(|| {
                closure_error(format!(
                    "open chain stops at {:?} without reaching the boundary",
                    current.end
                ))
            })?;
        }
        set.open.push(chain);
    }

    // Whatever is left must form cycles.
    while let Some(first) = used.iter().position(|u| !u) {
        used[first] = true;
        let start = segments[first].start;
        let mut current = segments[first];
        let mut chain = Loop {
            points: vec![start],
            others: vec![current.other],
            start_touch: None,
            end_touch: None,
            closed: true,
        };
        loop {
            if tol.same_point(&current.end, &start) {
                break;
            }
            let next = take_next(segments, &mut used, &current.end, tol);
            match next {
                Some(segment) => {
                    chain.points.push(segment.start);
                    chain.others.push(segment.other);
                    current = segment;
                }
                None if (0..LADDER_RUNGS).any(|r| tol.widened(r).same_point(&current.end, &start)) => {
                    break;
                }
                None => {
                    return Err(closure_error(format!(
                        "closed chain from {start:?} stops at {:?}",
                        current.end
                    )));
                }
            }
        }
        if chain.points.len() >= 3 {
            set.closed.push(chain);
        } else {
            trace!(points = chain.points.len(), "degenerate closed chain dropped");
        }
    }

    debug!(open = set.open.len(), closed = set.closed.len(), "loops extracted");
    Ok(set)
}

/// Reference to one end of one open loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndRef {
    pub loop_index: usize,
    pub end: LoopEnd,
}

/// The perimeter order of all open-loop ends and the order in which loops
/// can be cut off. Each extraction names the end at which the boundary arc
/// between the loop's two ends begins (walking forward along the polygon).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerimeterOrder {
    pub ends: Vec<EndRef>,
    pub extraction: Vec<EndRef>,
    pub retries: usize,
}

/// Key distance under which two ends are considered tied.
const TIE_KEY: f64 = 1e-7;

fn try_extract(ends: &[EndRef]) -> Option<Vec<EndRef>> {
    let mut remaining: Vec<EndRef> = ends.to_vec();
    let mut extraction = Vec::with_capacity(ends.len() / 2);
    while !remaining.is_empty() {
        let n = remaining.len();
        let j = (0..n).find(|&j| remaining[j].loop_index == remaining[(j + 1) % n].loop_index)?;
        extraction.push(remaining[j]);
        let k = (j + 1) % n;
        let (hi, lo) = if j > k { (j, k) } else { (k, j) };
        remaining.remove(hi);
        remaining.remove(lo);
    }
    Some(extraction)
}

/// Sort open-loop ends around the perimeter and find a non-crossing cut
/// order. Near-tied keys are swapped at most `max_retries` times.
pub fn sort_open_loops(open: &[Loop], max_retries: usize) -> BooleanResult<PerimeterOrder> {
    let mut keyed: Vec<(f64, EndRef)> = Vec::with_capacity(open.len() * 2);
    for (loop_index, chain) in open.iter().enumerate() {
        for end in [LoopEnd::Start, LoopEnd::End] {
            let touch = chain.touch(end).ok_or_else(|| {
                BoolError::topology(
                    TopologyFault::OpenLoopOrder,
                    format!("open loop {loop_index} has no boundary touch at its {end:?}"),
                )
            })?;
            keyed.push((touch.key(), EndRef { loop_index, end }));
        }
    }
    keyed.sort_by(|a, b| a.0.total_cmp(&b.0));

    let keys: Vec<f64> = keyed.iter().map(|(k, _)| *k).collect();
    let mut ends: Vec<EndRef> = keyed.into_iter().map(|(_, e)| e).collect();
    let ties: Vec<usize> = (0..keys.len().saturating_sub(1))
        .filter(|&i| keys[i + 1] - keys[i] <= TIE_KEY)
        .collect();

    let mut retries = 0;
    loop {
        if let Some(extraction) = try_extract(&ends) {
            if retries > 0 {
                debug!(retries, "open loop order resolved after re-ordering ties");
            }
            return Ok(PerimeterOrder {
                ends,
                extraction,
                retries,
            });
        }
        if ties.is_empty() || retries >= max_retries {
            return Err(BoolError::topology(
                TopologyFault::OpenLoopOrder,
                format!(
                    "{} open loops cannot be ordered without crossing after {retries} retries",
                    open.len()
                ),
            ));
        }
        let i = ties[retries % ties.len()];
        ends.swap(i, i + 1);
        retries += 1;
    }
}

/// Chain loose segments into polylines for intersection-curve output.
pub fn chain_polylines(segments: &[Segment], tol: &Tolerance) -> Vec<Polyline> {
    let mut used = vec![false; segments.len()];
    let mut lines = Vec::new();
    while let Some(first) = used.iter().position(|u| !u) {
        used[first] = true;
        let mut points = vec![segments[first].start, segments[first].end];
        // Grow forward, then backward from the first point.
        while let Some(next) = take_next(segments, &mut used, &points[points.len() - 1], tol) {
            points.push(next.end);
        }
        let mut closed = points.len() > 3 && tol.same_point(&points[0], &points[points.len() - 1]);
        if closed {
            points.pop();
        } else {
            while let Some(prev) = take_next(segments, &mut used, &points[0], tol) {
                points.insert(0, prev.end);
            }
            if points.len() > 3 && tol.same_point(&points[0], &points[points.len() - 1]) {
                points.pop();
                closed = true;
            }
        }
        lines.push(Polyline { points, closed });
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(a: [f64; 3], b: [f64; 3], other: usize) -> Segment {
        Segment {
            start: Point3::from(a),
            end: Point3::from(b),
            start_touch: None,
            end_touch: None,
            other: PolyId(other),
        }
    }

    fn touched(mut s: Segment, start: Option<(usize, f64)>, end: Option<(usize, f64)>) -> Segment {
        s.start_touch = start.map(|(edge, t)| Touch { edge, t });
        s.end_touch = end.map(|(edge, t)| Touch { edge, t });
        s
    }

    #[test]
    fn test_closed_square_from_shuffled_segments() {
        let segments = vec![
            seg([1.0, 1.0, 0.0], [2.0, 1.0, 0.0], 0),
            seg([2.0, 2.0, 0.0], [1.0, 2.0, 0.0], 2),
            seg([2.0, 2.0, 0.0], [2.0, 1.0, 0.0], 1),
            seg([1.0, 2.0, 0.0], [1.0, 1.0, 0.0], 3),
        ];
        let set = extract_loops(&segments, &Tolerance::default()).unwrap();
        assert!(set.open.is_empty());
        assert_eq!(set.closed.len(), 1);
        assert_eq!(set.closed[0].points.len(), 4);
        assert_eq!(set.closed[0].others.len(), 4);
    }

    #[test]
    fn test_open_chain_runs_between_touches() {
        let segments = vec![
            touched(seg([1.0, 0.5, 0.0], [0.5, 0.5, 0.0], 1), None, Some((3, 0.5))),
            touched(seg([2.0, 0.0, 0.0], [1.0, 0.5, 0.0], 0), Some((0, 0.5)), None),
        ];
        let set = extract_loops(&segments, &Tolerance::default()).unwrap();
        assert_eq!(set.open.len(), 1);
        let chain = &set.open[0];
        assert_eq!(chain.points.len(), 3);
        assert_eq!(chain.others, vec![PolyId(1), PolyId(0)]);
        assert_eq!(chain.start_touch.map(|t| t.edge), Some(3));
        assert_eq!(chain.end_touch.map(|t| t.edge), Some(0));
        assert_eq!(chain.point(LoopEnd::End), Point3::new(2.0, 0.0, 0.0));
    }

    #[test]
    fn test_dangling_chain_is_a_closure_error() {
        let segments = vec![touched(seg([0.0, 0.0, 0.0], [0.5, 0.5, 0.0], 0), Some((0, 0.0)), None)];
        let err = extract_loops(&segments, &Tolerance::default()).unwrap_err();
        assert_eq!(err.topology_kind(), Some(TopologyFault::LoopClosure));
    }

    fn open_loop(start: (usize, f64), end: (usize, f64)) -> Loop {
        Loop {
            points: vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)],
            others: vec![PolyId(0)],
            start_touch: Some(Touch { edge: start.0, t: start.1 }),
            end_touch: Some(Touch { edge: end.0, t: end.1 }),
            closed: false,
        }
    }

    #[test]
    fn test_nested_open_loops_extract_inner_first() {
        // Loop 0 spans edges 0..2, loop 1 sits inside it on edge 0..1.
        let open = vec![open_loop((0, 0.1), (2, 0.5)), open_loop((0, 0.5), (1, 0.5))];
        let order = sort_open_loops(&open, 4).unwrap();
        assert_eq!(order.ends.len(), 4);
        assert_eq!(order.extraction[0].loop_index, 1);
        assert_eq!(order.extraction[1].loop_index, 0);
        assert_eq!(order.retries, 0);
    }

    #[test]
    fn test_crossing_loops_cannot_be_ordered() {
        let open = vec![open_loop((0, 0.2), (2, 0.2)), open_loop((1, 0.2), (3, 0.2))];
        let err = sort_open_loops(&open, 4).unwrap_err();
        assert_eq!(err.topology_kind(), Some(TopologyFault::OpenLoopOrder));
    }

    #[test]
    fn test_tied_keys_are_reordered() {
        // Both loops touch edge 1 at the same spot and the stable sort puts
        // the tied ends in crossing order.
        let open = vec![open_loop((1, 0.5), (2, 0.5)), open_loop((0, 0.5), (1, 0.5))];
        let order = sort_open_loops(&open, 4).unwrap();
        assert_eq!(order.retries, 1);
        assert_eq!(order.extraction.len(), 2);

        let err = sort_open_loops(&open, 0).unwrap_err();
        assert_eq!(err.topology_kind(), Some(TopologyFault::OpenLoopOrder));
    }

    #[test]
    fn test_reverse_closed_keeps_producers_on_their_steps() {
        let mut chain = Loop {
            points: vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(1.0, 1.0, 0.0),
            ],
            others: vec![PolyId(10), PolyId(11), PolyId(12)],
            start_touch: None,
            end_touch: None,
            closed: true,
        };
        chain.reverse_closed();
        assert_eq!(chain.points[0], Point3::new(0.0, 0.0, 0.0));
        assert_eq!(chain.points[1], Point3::new(1.0, 1.0, 0.0));
        // (0,0)->(1,1) was step 2, (1,1)->(1,0) was step 1.
        assert_eq!(chain.others, vec![PolyId(12), PolyId(11), PolyId(10)]);
    }

    #[test]
    fn test_chain_polylines() {
        let segments = vec![
            seg([0.0, 0.0, 0.0], [1.0, 0.0, 0.0], 0),
            seg([2.0, 0.0, 0.0], [1.0, 0.0, 0.0], 0),
            seg([5.0, 0.0, 0.0], [6.0, 0.0, 0.0], 0),
        ];
        let lines = chain_polylines(&segments, &Tolerance::default());
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].points.len(), 3);
        assert!(!lines[0].closed);
        assert!((lines[0].length() - 2.0).abs() < 1e-12);
    }
}
