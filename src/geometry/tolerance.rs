// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Absolute tolerance scaled to the size of the operands of one call.

use nalgebra::{Point2, Point3};

use super::BoundingBox;
use crate::config::BoolConfig;

/// Rungs of the escalating tolerance ladder used when closing loops.
pub const LADDER_RUNGS: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    pub eps: f64,
}

impl Tolerance {
    pub fn new(eps: f64) -> Self {
        Self { eps }
    }

    /// Scale the configured base tolerance by the largest extent of the
    /// operands; models smaller than a unit keep the base value.
    pub fn for_operands(config: &BoolConfig, boxes: &[BoundingBox]) -> Self {
        let extent = boxes
            .iter()
            .fold(BoundingBox::empty(), |acc, b| acc.union(b))
            .max_extent();
        let scale = if extent.is_finite() { extent.max(1.0) } else { 1.0 };
        Self::new(config.tolerance * config.tolerance_scale * scale)
    }

    #[inline]
    pub fn is_zero(&self, value: f64) -> bool {
        value.abs() <= self.eps
    }

    #[inline]
    pub fn same_point(&self, a: &Point3<f64>, b: &Point3<f64>) -> bool {
        (a - b).norm_squared() <= self.eps * self.eps
    }

    #[inline]
    pub fn same_point_2d(&self, a: &Point2<f64>, b: &Point2<f64>) -> bool {
        (a - b).norm_squared() <= self.eps * self.eps
    }

    /// Tolerance at rung `level` of the ladder: eps, 10 eps, 100 eps, ...
    pub fn ladder(&self, level: u32) -> f64 {
        self.eps * 10f64.powi(level as i32)
    }

    /// Same tolerance, widened to rung `level`.
    pub fn widened(&self, level: u32) -> Self {
        Self::new(self.ladder(level))
    }

    /// Tolerance on a parameter along an edge of the given length.
    pub fn param(&self, length: f64) -> f64 {
        if length > self.eps {
            self.eps / length
        } else {
            1.0
        }
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Self::new(1e-9)
    }
}
