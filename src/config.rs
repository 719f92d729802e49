// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Boolean evaluation configuration
//!
//! All tunables that affect tolerance and behavior live in [`BoolConfig`],
//! which is passed explicitly into every entry point.
//!
//! ```
//! use polybool::{Axis, BoolConfig};
//!
//! let config = BoolConfig::default()
//!     .with_perturbation(0.0)
//!     .with_sort_axis(Axis::Z);
//! assert!(!config.retry_enabled());
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::{BoolError, BooleanResult};

const CONFIG_FILE: &str = "polybool.toml";

/// Coordinate axis used for candidate sorting and multi-contour slicing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    #[default]
    X,
    Y,
    Z,
}

impl Axis {
    pub fn index(self) -> usize {
        match self {
            Self::X => 0,
            Self::Y => 1,
            Self::Z => 2,
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "x" | "0" => Some(Self::X),
            "y" | "1" => Some(Self::Y),
            "z" | "2" => Some(Self::Z),
            _ => None,
        }
    }
}

/// How UV coordinates are produced for vertices created by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UvMode {
    /// New vertices carry no UV.
    Ignore,
    /// New vertices get UVs by affine interpolation over their polygon.
    #[default]
    Interpolate,
}

/// What the orchestration layer does once "no intersection" can no longer
/// be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoIntersectionPolicy {
    /// Classify whole components and return the well-defined result.
    #[default]
    Fallback,
    /// Return [`BoolError::NoIntersection`] to the caller.
    Error,
}

/// Configuration for Boolean operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoolConfig {
    /// Translation applied to the second operand on retry. Zero disables retry.
    pub perturbation: f64,
    /// Resolve coplanar polygon pairs with the planar solver.
    pub coplanar: bool,
    /// Return the intersection curves instead of a solid.
    pub intersection_curves: bool,
    /// UV handling for new vertices.
    pub uv_mode: UvMode,
    /// Axis used to sort candidate polygons.
    pub sort_axis: Axis,
    /// Base absolute tolerance for a unit-sized model.
    pub tolerance: f64,
    /// Extra multiplier on the size-scaled tolerance.
    pub tolerance_scale: f64,
    /// Safety cap on explicit traversal stacks.
    pub flood_stack_limit: usize,
    /// Re-ordering attempts allowed when sorting open loops.
    pub loop_order_retries: usize,
    /// Behavior once no intersection is found and retry is exhausted.
    pub no_intersection: NoIntersectionPolicy,
    /// Remove zero-length edges from the result.
    pub cleanup: bool,
}

impl Default for BoolConfig {
    fn default() -> Self {
        Self {
            perturbation: 1e-6,
            coplanar: true,
            intersection_curves: false,
            uv_mode: UvMode::default(),
            sort_axis: Axis::default(),
            tolerance: 1e-9,
            tolerance_scale: 1.0,
            flood_stack_limit: 1 << 22,
            loop_order_retries: 16,
            no_intersection: NoIntersectionPolicy::default(),
            cleanup: true,
        }
    }
}

impl BoolConfig {
    /// No retry, and "no intersection" is reported as an error.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            perturbation: 0.0,
            no_intersection: NoIntersectionPolicy::Error,
            ..Self::default()
        }
    }

    /// Return intersection curves instead of solids.
    #[must_use]
    pub fn curves() -> Self {
        Self {
            intersection_curves: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_perturbation(mut self, distance: f64) -> Self {
        self.perturbation = distance;
        self
    }

    #[must_use]
    pub fn with_coplanar(mut self, enabled: bool) -> Self {
        self.coplanar = enabled;
        self
    }

    #[must_use]
    pub fn with_intersection_curves(mut self, enabled: bool) -> Self {
        self.intersection_curves = enabled;
        self
    }

    #[must_use]
    pub fn with_uv_mode(mut self, mode: UvMode) -> Self {
        self.uv_mode = mode;
        self
    }

    #[must_use]
    pub fn with_sort_axis(mut self, axis: Axis) -> Self {
        self.sort_axis = axis;
        self
    }

    #[must_use]
    pub fn with_tolerance_scale(mut self, scale: f64) -> Self {
        self.tolerance_scale = scale;
        self
    }

    #[must_use]
    pub fn with_flood_stack_limit(mut self, limit: usize) -> Self {
        self.flood_stack_limit = limit;
        self
    }

    #[must_use]
    pub fn with_no_intersection(mut self, policy: NoIntersectionPolicy) -> Self {
        self.no_intersection = policy;
        self
    }

    #[must_use]
    pub fn with_cleanup(mut self, enabled: bool) -> Self {
        self.cleanup = enabled;
        self
    }

    pub fn retry_enabled(&self) -> bool {
        self.perturbation > 0.0
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> BooleanResult<()> {
        if !self.perturbation.is_finite() || self.perturbation < 0.0 {
            return Err(BoolError::malformed(format!(
                "perturbation must be a finite non-negative distance, got {}",
                self.perturbation
            )));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(BoolError::malformed(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        if !(self.tolerance_scale.is_finite() && self.tolerance_scale > 0.0) {
            return Err(BoolError::malformed(format!(
                "tolerance scale must be positive, got {}",
                self.tolerance_scale
            )));
        }
        if self.flood_stack_limit == 0 {
            return Err(BoolError::malformed("flood stack limit must be non-zero"));
        }
        Ok(())
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: BoolConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {:?}", path.as_ref()))?;
        Ok(config)
    }

    /// Load `polybool.toml` if present, then apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = if PathBuf::from(CONFIG_FILE).exists() {
            Self::from_file(CONFIG_FILE)?
        } else {
            Self::default()
        };

        if let Ok(value) = std::env::var("POLYBOOL_PERTURBATION") {
            config.perturbation = value
                .parse()
                .with_context(|| format!("Invalid POLYBOOL_PERTURBATION: {value}"))?;
        }

        if let Ok(value) = std::env::var("POLYBOOL_COPLANAR") {
            config.coplanar = value
                .parse()
                .with_context(|| format!("Invalid POLYBOOL_COPLANAR: {value}"))?;
        }

        if let Ok(value) = std::env::var("POLYBOOL_SORT_AXIS") {
            config.sort_axis =
                Axis::parse(&value).with_context(|| format!("Invalid POLYBOOL_SORT_AXIS: {value}"))?;
        }

        if let Ok(value) = std::env::var("POLYBOOL_TOLERANCE_SCALE") {
            config.tolerance_scale = value
                .parse()
                .with_context(|| format!("Invalid POLYBOOL_TOLERANCE_SCALE: {value}"))?;
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file: {:?}", path.as_ref()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_defaults() {
        let config = BoolConfig::default();
        assert_eq!(config.perturbation, 1e-6);
        assert!(config.coplanar);
        assert!(config.retry_enabled());
        assert_eq!(config.sort_axis, Axis::X);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_strict_disables_retry() {
        let config = BoolConfig::strict();
        assert!(!config.retry_enabled());
        assert_eq!(config.no_intersection, NoIntersectionPolicy::Error);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(BoolConfig::default().with_perturbation(-1.0).validate().is_err());
        assert!(BoolConfig::default()
            .with_tolerance_scale(0.0)
            .validate()
            .is_err());
        assert!(BoolConfig::default()
            .with_flood_stack_limit(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("polybool.toml");
        let config = BoolConfig::default()
            .with_sort_axis(Axis::Y)
            .with_coplanar(false);
        config.save(&path).unwrap();

        let loaded = BoolConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: BoolConfig = toml::from_str("sort_axis = \"z\"\nperturbation = 0.0\n").unwrap();
        assert_eq!(config.sort_axis, Axis::Z);
        assert!(!config.retry_enabled());
        assert!(config.coplanar);
    }

    /// Serializes the tests that touch process-wide environment variables.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_load_applies_environment_overrides() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        std::env::set_var("POLYBOOL_SORT_AXIS", "z");
        std::env::set_var("POLYBOOL_COPLANAR", "false");
        let config = BoolConfig::load();
        std::env::remove_var("POLYBOOL_SORT_AXIS");
        std::env::remove_var("POLYBOOL_COPLANAR");

        let config = config.unwrap();
        assert_eq!(config.sort_axis, Axis::Z);
        assert!(!config.coplanar);
    }

    #[test]
    fn test_load_rejects_malformed_environment_values() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        std::env::set_var("POLYBOOL_COPLANAR", "sometimes");
        let err = BoolConfig::load().unwrap_err();
        std::env::remove_var("POLYBOOL_COPLANAR");
        assert!(format!("{err:#}").contains("POLYBOOL_COPLANAR"));

        std::env::set_var("POLYBOOL_SORT_AXIS", "w");
        let err = BoolConfig::load().unwrap_err();
        std::env::remove_var("POLYBOOL_SORT_AXIS");
        assert!(format!("{err:#}").contains("POLYBOOL_SORT_AXIS"));
    }

    #[test]
    fn test_axis_parse() {
        assert_eq!(Axis::parse("Y"), Some(Axis::Y));
        assert_eq!(Axis::parse("2"), Some(Axis::Z));
        assert_eq!(Axis::parse("w"), None);
    }
}
