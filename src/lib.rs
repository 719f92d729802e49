// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Polybool
//!
//! Polygonal Boolean engine for solid modelling. Given two polyhedral meshes
//! of convex polygons, computes union, intersection, difference and surface
//! cuts as new meshes, plus self-intersection curves and planar sections.
//! Degenerate tangencies are handled by perturbing the second operand once
//! and retrying; operands that never intersect are classified whole.

pub mod boolean;
pub mod config;
pub mod error;
pub mod geometry;
pub mod utils;

pub use boolean::{
    boolean_2d, boolean_and, boolean_contour, boolean_cut, boolean_icut, boolean_multi_contour,
    boolean_neg, boolean_or, boolean_self, boolean_sub, BoolOp, BoolOutcome, BoolStats,
    BooleanEngine, Op2d,
};
pub use config::{Axis, BoolConfig, NoIntersectionPolicy, UvMode};
pub use error::{BoolError, BooleanResult, TopologyFault};
pub use geometry::{BoundingBox, Mesh, Plane, PolyId, Polygon, Polyline, Primitive, Vertex};

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    #[test]
    fn test_basic_union() {
        let a = Primitive::cube(Vector3::new(1.0, 1.0, 1.0), false).to_mesh().unwrap();
        let b = a.translated(&Vector3::new(0.5, 0.5, 0.5));
        let result = boolean_or(&a, &b, &BoolConfig::default());
        assert!(result.is_ok());
    }
}
