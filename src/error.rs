// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Error types for Boolean evaluation.
//!
//! Every failure of the engine surfaces as a [`BoolError`]. Only
//! [`BoolError::NoIntersection`] and [`BoolError::NonFinite`] are
//! recoverable: the orchestration layer answers them with a perturbation
//! retry or a classification-only fallback. Everything else aborts the call.

use std::fmt;

use thiserror::Error;

/// Which topological invariant was broken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyFault {
    /// Flood fill met a polygon already labeled with another component.
    DisjointConflict,
    /// An explicit traversal stack grew past its configured cap.
    StackOverflow,
    /// A chain of intersection segments could not be closed.
    LoopClosure,
    /// A vertex expected on a polygon boundary was not found.
    VertexLookup,
    /// Open loops could not be put into a non-crossing perimeter order.
    OpenLoopOrder,
}

impl fmt::Display for TopologyFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DisjointConflict => "disjoint propagation conflict",
            Self::StackOverflow => "adjacency stack overflow",
            Self::LoopClosure => "failed loop closure",
            Self::VertexLookup => "failed vertex lookup",
            Self::OpenLoopOrder => "open loop ordering",
        };
        f.write_str(name)
    }
}

/// Errors that can occur during a Boolean operation.
#[derive(Debug, Error)]
pub enum BoolError {
    /// The input is not a usable polygonal mesh.
    #[error("malformed input: {details}")]
    MalformedInput {
        /// What was wrong with the input.
        details: String,
    },

    /// The transient topology built during the call is inconsistent.
    #[error("topological inconsistency ({kind}): {details}")]
    Topology {
        /// Which invariant failed.
        kind: TopologyFault,
        /// Where it failed.
        details: String,
    },

    /// A geometric construction that must succeed did not.
    #[error("numerical degeneracy: {details}")]
    Numerical {
        /// Description of the degeneracy.
        details: String,
    },

    /// An arithmetic step produced NaN or infinity.
    #[error("non-finite arithmetic result in {context}")]
    NonFinite {
        /// The computation that produced the value.
        context: &'static str,
    },

    /// The operands do not intersect.
    #[error("no intersection found between operands")]
    NoIntersection,
}

impl BoolError {
    pub fn malformed(details: impl Into<String>) -> Self {
        Self::MalformedInput {
            details: details.into(),
        }
    }

    pub fn topology(kind: TopologyFault, details: impl Into<String>) -> Self {
        Self::Topology {
            kind,
            details: details.into(),
        }
    }

    pub fn numerical(details: impl Into<String>) -> Self {
        Self::Numerical {
            details: details.into(),
        }
    }

    /// True for the conditions the orchestration layer may retry.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NoIntersection | Self::NonFinite { .. })
    }

    /// The topology fault kind, if this is a topology error.
    pub fn topology_kind(&self) -> Option<TopologyFault> {
        match self {
            Self::Topology { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Result type for Boolean operations.
pub type BooleanResult<T> = Result<T, BoolError>;

/// Fails with [`BoolError::NonFinite`] unless `value` is finite.
#[inline]
pub(crate) fn finite(value: f64, context: &'static str) -> BooleanResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(BoolError::NonFinite { context })
    }
}
