// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

use anyhow::Result;
use nalgebra::{Point3, Vector3};
use polybool::{Axis, BoolConfig, BoolOp, BooleanEngine, Mesh, Primitive, UvMode};

#[test]
fn config_survives_toml_and_json() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("polybool.toml");
    let config = BoolConfig::default()
        .with_sort_axis(Axis::Z)
        .with_uv_mode(UvMode::Ignore)
        .with_perturbation(1e-5)
        .with_cleanup(false);

    config.save(&path)?;
    assert_eq!(BoolConfig::from_file(&path)?, config);

    let json = serde_json::to_string(&config)?;
    let back: BoolConfig = serde_json::from_str(&json)?;
    assert_eq!(back, config);
    Ok(())
}

#[test]
fn invalid_config_file_is_rejected() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "perturbation = -1.0\n")?;
    let err = BoolConfig::from_file(&path).unwrap_err();
    assert!(format!("{err:#}").contains("perturbation"));

    std::fs::write(&path, "sort_axis = \"w\"\n")?;
    assert!(BoolConfig::from_file(&path).is_err());
    assert!(BoolConfig::from_file(dir.path().join("missing.toml")).is_err());
    Ok(())
}

#[test]
fn result_mesh_and_stats_serialize() -> Result<()> {
    let a = Primitive::cuboid(Point3::origin(), Point3::new(1.0, 1.0, 1.0)).to_mesh()?;
    let b = a.translated(&Vector3::new(0.5, 0.5, 0.5));
    let outcome = BooleanEngine::default().evaluate(BoolOp::Sub, &a, &b)?;
    assert!(outcome.stats.segments > 0);

    let json = serde_json::to_string(&outcome.mesh)?;
    let mesh: Mesh = serde_json::from_str(&json)?;
    assert_eq!(mesh.len(), outcome.mesh.len());
    assert!((mesh.signed_volume() - outcome.mesh.signed_volume()).abs() < 1e-12);

    let stats = serde_json::to_value(&outcome.stats)?;
    assert_eq!(stats["retries"], 0);
    assert_eq!(stats["no_intersection"], false);
    Ok(())
}
