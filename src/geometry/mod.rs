// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Geometry module - polygon meshes, planes and the predicates the Boolean
//! engine consumes

mod bbox;
mod mesh;
mod plane;
pub mod predicates;
pub mod primitives;
mod tolerance;

pub use bbox::BoundingBox;
pub use mesh::{Mesh, PolyId, PolyState, Polygon, Polyline, Vertex, VertexTags};
pub use plane::{Plane, PlaneFrame};
pub use primitives::Primitive;
pub use tolerance::{Tolerance, LADDER_RUNGS};
