// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Orchestration: phase sequencing, statistics and the perturb-and-retry
//! policy.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use super::adjacency::compute_adjacency;
use super::coplanar::{resolve_coplanar, CoplanarResolution};
use super::intersect::{intersect_all, Intersections, PolygonHits, Segment};
use super::loops::chain_polylines;
use super::reconstruct::Reconstructor;
use super::{BoolOp, Operand};
use crate::config::{BoolConfig, NoIntersectionPolicy};
use crate::error::{BoolError, BooleanResult};
use crate::geometry::{Mesh, Tolerance};

/// Counters collected during one evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoolStats {
    /// Pairs surviving the sweep along the sort axis.
    pub candidate_pairs: usize,
    /// Pairs surviving the bounding-box test.
    pub exact_pair_tests: usize,
    pub segments: usize,
    pub open_loops: usize,
    pub closed_loops: usize,
    pub split_polygons: usize,
    pub coplanar_pairs: usize,
    /// Polygons labeled by propagation across shared edges.
    pub flood_classified: usize,
    /// Parity tests spent on whole untouched components.
    pub component_tests: usize,
    /// Parity tests spent on single polygons.
    pub polygon_tests: usize,
    pub retries: usize,
    /// The result came from the classification-only fallback.
    pub no_intersection: bool,
}

/// Result mesh and the statistics of the evaluation that produced it.
#[derive(Debug, Clone)]
pub struct BoolOutcome {
    pub mesh: Mesh,
    pub stats: BoolStats,
}

/// Direction in which the second operand is nudged before a retry.
fn perturbation_offset(distance: f64) -> Vector3<f64> {
    Vector3::new(-3.0, 2.0, 1.0).normalize() * distance
}

/// Evaluates binary Boolean operators under one configuration.
#[derive(Debug, Clone, Default)]
pub struct BooleanEngine {
    config: BoolConfig,
}

impl BooleanEngine {
    pub fn new(config: BoolConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BoolConfig {
        &self.config
    }

    /// Evaluate `op` on `a` and `b`.
    ///
    /// A recoverable failure is retried once with `b` translated by the
    /// configured perturbation (never for OR). When no intersection remains,
    /// both operands are classified whole; under
    /// [`NoIntersectionPolicy::Error`] that case is returned as
    /// [`BoolError::NoIntersection`] instead, except for OR, where disjoint
    /// operands simply concatenate.
    #[instrument(skip_all, fields(op = %op, a = a.len(), b = b.len()))]
    pub fn evaluate(&self, op: BoolOp, a: &Mesh, b: &Mesh) -> BooleanResult<BoolOutcome> {
        self.config.validate()?;
        a.validate("A")?;
        b.validate("B")?;

        let mut stats = BoolStats::default();
        let mut perturbed: Option<Mesh> = None;
        loop {
            let operand_b = perturbed.as_ref().unwrap_or(b);
            match self.run(op, a, operand_b, &mut stats) {
                Ok(mesh) => {
                    info!(polygons = mesh.len(), retries = stats.retries, "boolean evaluated");
                    return Ok(BoolOutcome { mesh, stats });
                }
                Err(err)
                    if err.is_recoverable()
                        && op != BoolOp::Or
                        && self.config.retry_enabled()
                        && perturbed.is_none() =>
                {
                    warn!(%err, distance = self.config.perturbation, "retrying with operand B perturbed");
                    stats = BoolStats {
                        retries: stats.retries + 1,
                        ..BoolStats::default()
                    };
                    perturbed = Some(b.translated(&perturbation_offset(self.config.perturbation)));
                }
                Err(BoolError::NoIntersection) => {
                    if op != BoolOp::Or && self.config.no_intersection == NoIntersectionPolicy::Error {
                        debug!("no intersection reported to the caller");
                        return Err(BoolError::NoIntersection);
                    }
                    stats.no_intersection = true;
                    let mesh = if self.config.intersection_curves {
                        Mesh::new()
                    } else {
                        self.classify_only(op, a, b, &mut stats)?
                    };
                    info!(polygons = mesh.len(), "operands do not intersect; classified whole");
                    return Ok(BoolOutcome { mesh, stats });
                }
                Err(err) => {
                    error!(%err, "boolean evaluation failed");
                    return Err(err);
                }
            }
        }
    }

    fn tolerance(&self, a: &Mesh, b: &Mesh) -> Tolerance {
        Tolerance::for_operands(&self.config, &[a.bounding_box(), b.bounding_box()])
    }

    /// One full pass: adjacency, intersection, coplanar resolution and
    /// reconstruction of both operands.
    fn run(&self, op: BoolOp, a: &Mesh, b: &Mesh, stats: &mut BoolStats) -> BooleanResult<Mesh> {
        let tol = self.tolerance(a, b);
        let mut work_a = a.clone();
        let mut work_b = b.clone();
        let report_a = compute_adjacency(&mut work_a, &tol)?;
        let report_b = compute_adjacency(&mut work_b, &tol)?;
        debug!(
            eps = tol.eps,
            closed_a = report_a.closed,
            closed_b = report_b.closed,
            "operands linked"
        );

        let hits = intersect_all(&work_a, &work_b, &self.config, &tol, stats)?;

        if self.config.intersection_curves {
            let segments: Vec<Segment> = hits
                .a
                .iter()
                .flat_map(|h| h.segments.iter().copied())
                .collect();
            if segments.is_empty() {
                return Err(BoolError::NoIntersection);
            }
            let curves = chain_polylines(&segments, &tol);
            debug!(segments = segments.len(), curves = curves.len(), "intersection curves chained");
            return Ok(Mesh::from_polylines(curves));
        }

        let coplanar_a = resolve_side(&work_a, &hits.a, &work_b, Operand::A, op, &tol)?;
        let coplanar_b = resolve_side(&work_b, &hits.b, &work_a, Operand::B, op, &tol)?;
        let overlaps = coplanar_a.iter().chain(&coplanar_b).filter(|r| r.is_some()).count();
        if hits.segment_count() == 0 && overlaps == 0 {
            return Err(BoolError::NoIntersection);
        }

        let kept_a = Reconstructor {
            op,
            operand: Operand::A,
            config: &self.config,
            tol: &tol,
            hits: &hits.a,
            coplanar: &coplanar_a,
            other: &work_b,
        }
        .extract_polygons(&mut work_a, stats)?;
        let kept_b = Reconstructor {
            op,
            operand: Operand::B,
            config: &self.config,
            tol: &tol,
            hits: &hits.b,
            coplanar: &coplanar_b,
            other: &work_a,
        }
        .extract_polygons(&mut work_b, stats)?;

        let mut result = Mesh::from_polygons(kept_a);
        result.polygons.extend(kept_b);
        Ok(self.finish(result, &tol))
    }

    /// Classify both operands whole, without intersecting them.
    fn classify_only(&self, op: BoolOp, a: &Mesh, b: &Mesh, stats: &mut BoolStats) -> BooleanResult<Mesh> {
        let tol = self.tolerance(a, b);
        let mut work_a = a.clone();
        let mut work_b = b.clone();
        compute_adjacency(&mut work_a, &tol)?;
        compute_adjacency(&mut work_b, &tol)?;
        let hits = Intersections::empty(&work_a, &work_b);
        let none_a = vec![None; work_a.len()];
        let none_b = vec![None; work_b.len()];

        let kept_a = Reconstructor {
            op,
            operand: Operand::A,
            config: &self.config,
            tol: &tol,
            hits: &hits.a,
            coplanar: &none_a,
            other: &work_b,
        }
        .extract_polygons(&mut work_a, stats)?;
        let kept_b = Reconstructor {
            op,
            operand: Operand::B,
            config: &self.config,
            tol: &tol,
            hits: &hits.b,
            coplanar: &none_b,
            other: &work_a,
        }
        .extract_polygons(&mut work_b, stats)?;

        let mut result = Mesh::from_polygons(kept_a);
        result.polygons.extend(kept_b);
        Ok(self.finish(result, &tol))
    }

    fn finish(&self, mut mesh: Mesh, tol: &Tolerance) -> Mesh {
        if self.config.cleanup {
            let removed = mesh.cleanup(tol);
            if removed > 0 {
                debug!(removed, "zero-length edges removed");
            }
        }
        mesh.clear_adjacency();
        mesh
    }
}

/// Coplanar resolution of every polygon of one operand that has coplanar
/// partners.
fn resolve_side(
    mesh: &Mesh,
    hits: &[PolygonHits],
    other: &Mesh,
    operand: Operand,
    op: BoolOp,
    tol: &Tolerance,
) -> BooleanResult<Vec<Option<CoplanarResolution>>> {
    mesh.ids()
        .map(|id| {
            let partners = &hits[id.index()].coplanar;
            if partners.is_empty() {
                Ok(None)
            } else {
                resolve_coplanar(mesh.polygon(id), partners, other, operand, op, tol)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Primitive;
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    fn cuboid(min: [f64; 3], max: [f64; 3]) -> Mesh {
        Primitive::cuboid(Point3::from(min), Point3::from(max))
            .to_mesh()
            .unwrap()
    }

    #[test]
    fn test_overlapping_cubes() {
        let a = cuboid([0.0, 0.0, 0.0], [1.0, 1.0, 1.0]);
        let b = cuboid([0.5, 0.25, 0.3], [1.5, 1.25, 1.3]);
        let engine = BooleanEngine::default();

        let and = engine.evaluate(BoolOp::And, &a, &b).unwrap();
        assert_relative_eq!(and.mesh.signed_volume(), 0.2625, epsilon = 1e-9);
        assert!(!and.stats.no_intersection);
        assert_eq!(and.stats.retries, 0);
        assert!(and.stats.segments > 0);

        let or = engine.evaluate(BoolOp::Or, &a, &b).unwrap();
        assert_relative_eq!(or.mesh.signed_volume(), 1.7375, epsilon = 1e-9);

        let sub = engine.evaluate(BoolOp::Sub, &a, &b).unwrap();
        assert_relative_eq!(sub.mesh.signed_volume(), 0.7375, epsilon = 1e-9);
    }

    #[test]
    fn test_rejects_invalid_input() {
        let a = cuboid([0.0, 0.0, 0.0], [1.0, 1.0, 1.0]);
        let engine = BooleanEngine::default();
        let err = engine.evaluate(BoolOp::Or, &a, &Mesh::new()).unwrap_err();
        assert!(matches!(err, BoolError::MalformedInput { .. }));

        let bad = BooleanEngine::new(BoolConfig::default().with_perturbation(-1.0));
        assert!(bad.evaluate(BoolOp::Or, &a, &a).is_err());
    }

    #[test]
    fn test_curve_mode_returns_polylines() {
        let a = cuboid([0.0, 0.0, 0.0], [1.0, 1.0, 1.0]);
        let b = cuboid([0.5, 0.25, 0.3], [1.5, 1.25, 1.3]);
        let engine = BooleanEngine::new(BoolConfig::curves());
        let outcome = engine.evaluate(BoolOp::And, &a, &b).unwrap();
        assert!(outcome.mesh.polygons.is_empty());
        assert!(!outcome.mesh.polylines.is_empty());
        let total: f64 = outcome.mesh.polylines.iter().map(|l| l.length()).sum();
        // Six corner segments of the overlap box lie on A's faces.
        assert_relative_eq!(total, 2.0 * (0.5 + 0.75 + 0.7), epsilon = 1e-9);
    }

    #[test]
    fn test_stats_serde_round_trip() {
        let stats = BoolStats {
            segments: 12,
            retries: 1,
            no_intersection: true,
            ..BoolStats::default()
        };
        let json = serde_json::to_string(&stats).unwrap();
        let back: BoolStats = serde_json::from_str(&json).unwrap();
        assert_eq!(stats, back);
    }
}
