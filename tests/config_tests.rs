//! Configuration file handling tests

use std::path::PathBuf;
use virtual_try_on::{
    config::{TryOnConfig, EXAMPLE_CONFIG},
    coordinate_mapper::FitMode,
    pose_estimation::OrientationMode,
    Error,
};

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("virtual-try-on-{}-{name}", std::process::id()))
}

#[test]
fn test_file_round_trip() {
    let path = temp_path("round-trip.yaml");
    let mut config = TryOnConfig::default();
    config.mapping.fit_mode = FitMode::Contain;
    config.mapping.mirror = false;
    config.pose.orientation_mode = OrientationMode::YawOnly;
    config.smoothing.position = 0.6;
    config.yaw_boost.enabled = true;

    config.to_file(&path).unwrap();
    let loaded = TryOnConfig::from_file(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(loaded, config);
}

#[test]
fn test_missing_file_is_io_error() {
    let result = TryOnConfig::from_file(temp_path("does-not-exist.yaml"));
    assert!(matches!(result, Err(Error::Io(_))));
}

#[test]
fn test_invalid_file_rejected() {
    let path = temp_path("invalid.yaml");
    std::fs::write(&path, "smoothing:\n  position: 1.5\n").unwrap();
    let result = TryOnConfig::from_file(&path);
    std::fs::remove_file(&path).ok();
    assert!(matches!(result, Err(Error::ConfigError(_))));
}

#[test]
fn test_example_config_file_loads() {
    let path = temp_path("example.yaml");
    std::fs::write(&path, EXAMPLE_CONFIG).unwrap();
    let loaded = TryOnConfig::from_file(&path).unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(loaded, TryOnConfig::default());
}
