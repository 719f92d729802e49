// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Polygonal Boolean engine
//!
//! Phases, leaves first:
//!
//! 1. [`adjacency`] links polygons across shared edges.
//! 2. [`intersect`] files one intersection segment per intersecting convex pair.
//! 3. [`loops`] chains each polygon's segments into open and closed loops.
//! 4. [`reconstruct`] cuts polygons along their loops and flood-classifies the rest.
//! 5. [`coplanar`] resolves coincident polygon pairs in a plane-aligned 2-D frame.
//! 6. [`engine`] sequences the phases and owns the perturb-and-retry policy.
//!
//! The operator functions in [`ops`] are the public surface.

pub mod adjacency;
pub mod classify;
pub mod coplanar;
pub mod engine;
pub mod intersect;
pub mod loops;
pub mod ops;
pub mod reconstruct;
pub mod slit;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Binary Boolean operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoolOp {
    /// Union.
    Or,
    /// Intersection.
    And,
    /// A minus B.
    Sub,
    /// The part of A's boundary outside B.
    Cut,
    /// The part of A's boundary inside B.
    ICut,
}

/// Which input a polygon came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    A,
    B,
}

/// Position of a polygon or piece relative to the other operand's volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Location {
    Inside,
    Outside,
}

impl Location {
    pub fn flipped(self) -> Self {
        match self {
            Self::Inside => Self::Outside,
            Self::Outside => Self::Inside,
        }
    }
}

impl BoolOp {
    /// The location an operand's polygons must have to be kept, or `None`
    /// when the operand contributes nothing.
    pub fn wanted(self, operand: Operand) -> Option<Location> {
        use Location::*;
        match (self, operand) {
            (Self::Or, _) => Some(Outside),
            (Self::And, _) => Some(Inside),
            (Self::Sub, Operand::A) => Some(Outside),
            (Self::Sub, Operand::B) => Some(Inside),
            (Self::Cut, Operand::A) => Some(Outside),
            (Self::ICut, Operand::A) => Some(Inside),
            (Self::Cut | Self::ICut, Operand::B) => None,
        }
    }

    /// B's kept polygons are emitted with reversed orientation.
    pub fn reverses_b(self) -> bool {
        self == Self::Sub
    }

    /// Whether a coplanar overlap (emitted from A) is kept; `same` tells
    /// whether the two polygons face the same way.
    pub fn keeps_overlap(self, same: bool) -> bool {
        match self {
            Self::Or | Self::And | Self::ICut => same,
            Self::Sub | Self::Cut => !same,
        }
    }
}

impl fmt::Display for BoolOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Or => "or",
            Self::And => "and",
            Self::Sub => "sub",
            Self::Cut => "cut",
            Self::ICut => "icut",
        };
        f.write_str(name)
    }
}

pub use adjacency::{compute_adjacency, mark_disjoint_parts, AdjacencyReport, Components};
pub use coplanar::{boolean_2d, Op2d};
pub use engine::{BoolOutcome, BoolStats, BooleanEngine};
pub use ops::{
    boolean_and, boolean_contour, boolean_cut, boolean_icut, boolean_multi_contour,
    boolean_neg, boolean_or, boolean_self, boolean_sub,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_table() {
        assert_eq!(BoolOp::Or.wanted(Operand::A), Some(Location::Outside));
        assert_eq!(BoolOp::Or.wanted(Operand::B), Some(Location::Outside));
        assert_eq!(BoolOp::And.wanted(Operand::B), Some(Location::Inside));
        assert_eq!(BoolOp::Sub.wanted(Operand::A), Some(Location::Outside));
        assert_eq!(BoolOp::Sub.wanted(Operand::B), Some(Location::Inside));
        assert_eq!(BoolOp::Cut.wanted(Operand::B), None);
        assert_eq!(BoolOp::ICut.wanted(Operand::A), Some(Location::Inside));
        assert!(BoolOp::Sub.reverses_b());
        assert!(!BoolOp::Or.reverses_b());
    }

    #[test]
    fn test_overlap_rule() {
        assert!(BoolOp::Or.keeps_overlap(true));
        assert!(!BoolOp::Or.keeps_overlap(false));
        assert!(BoolOp::Sub.keeps_overlap(false));
        assert!(!BoolOp::Sub.keeps_overlap(true));
    }
}
