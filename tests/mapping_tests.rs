//! Coordinate mapping tests across fit modes and mirroring


use nalgebra::Vector3;
use proptest::prelude::*;
use test_helpers::{SyntheticFace, SOURCE};
use virtual_try_on::{
    config::MappingConfig,
    coordinate_mapper::{source_to_displayed, CoordinateMapper, Dimensions, FitMode},
};

fn mapper(fit_mode: FitMode, mirror: bool, display: Dimensions) -> CoordinateMapper {
    let config = MappingConfig {
        fit_mode,
        mirror,
        ..MappingConfig::default()
    };
    let mut mapper = CoordinateMapper::new(&config);
    assert!(mapper.update_frame(SOURCE, display));
    mapper
}

#[test]
fn test_cover_crops_wide_source_in_portrait_container() {
    let display = Dimensions::new(360.0, 640.0);
    // Cover scales by height: 640 / 720
    let p = source_to_displayed(0.0, 0.0, SOURCE, display, FitMode::Cover, false).unwrap();
    let scale = 640.0 / 720.0;
    assert!((p.x - (360.0 - 1280.0 * scale) / 2.0).abs() < 1e-9);
    assert!(p.y.abs() < 1e-9);

    let center = source_to_displayed(640.0, 360.0, SOURCE, display, FitMode::Cover, false).unwrap();
    assert!((center.x - 180.0).abs() < 1e-9);
    assert!((center.y - 320.0).abs() < 1e-9);
}

#[test]
fn test_contain_letterboxes_in_portrait_container() {
    let display = Dimensions::new(360.0, 640.0);
    let scale = 360.0 / 1280.0;
    let p = source_to_displayed(0.0, 0.0, SOURCE, display, FitMode::Contain, false).unwrap();
    assert!(p.x.abs() < 1e-9);
    assert!((p.y - (640.0 - 720.0 * scale) / 2.0).abs() < 1e-9);
}

#[test]
fn test_world_plane_matches_display_aspect() {
    let display = Dimensions::new(800.0, 400.0);
    let m = mapper(FitMode::Cover, false, display);
    assert!((m.frame().unwrap().plane_height - 8.0).abs() < 1e-9);

    // Display corners land on the plane corners
    let top_left = m.to_world_xy(&Vector3::new(0.0, 40.0, 0.0)).unwrap();
    assert!((top_left.x + 8.0).abs() < 1e-9);
    assert!((top_left.y - 4.0).abs() < 1e-9);
}

#[test]
fn test_map_all_agrees_with_single_landmarks() {
    let m = mapper(FitMode::Cover, true, Dimensions::new(800.0, 450.0));
    let set = SyntheticFace::at(500.0, 300.0).landmarks(SOURCE);
    let all = m.map_all(&set);
    assert_eq!(all.len(), set.len());
    for index in [10, 33, 168, 234, 263, 454] {
        assert_eq!(all[index], m.map_landmark(&set, index));
    }
}

#[test]
fn test_mapping_unavailable_before_geometry() {
    let m = CoordinateMapper::new(&MappingConfig::default());
    let set = SyntheticFace::at(500.0, 300.0).landmarks(SOURCE);
    assert!(m.map_landmark(&set, 168).is_none());
    assert!(m.map_all(&set).iter().all(Option::is_none));
}

proptest! {
    #[test]
    fn prop_mirror_reflects_x_only(
        x in 0.0f64..1280.0,
        y in 0.0f64..720.0,
        w in 200.0f64..2000.0,
        h in 200.0f64..2000.0,
        cover in any::<bool>(),
    ) {
        let fit = if cover { FitMode::Cover } else { FitMode::Contain };
        let display = Dimensions::new(w, h);
        let plain = source_to_displayed(x, y, SOURCE, display, fit, false).unwrap();
        let mirrored = source_to_displayed(x, y, SOURCE, display, fit, true).unwrap();
        prop_assert!((plain.x + mirrored.x - w).abs() < 1e-6);
        prop_assert!((plain.y - mirrored.y).abs() < 1e-9);
    }

    #[test]
    fn prop_cover_fills_display(w in 200.0f64..2000.0, h in 200.0f64..2000.0) {
        let display = Dimensions::new(w, h);
        let origin = source_to_displayed(0.0, 0.0, SOURCE, display, FitMode::Cover, false).unwrap();
        let corner = source_to_displayed(1280.0, 720.0, SOURCE, display, FitMode::Cover, false).unwrap();
        prop_assert!(origin.x <= 1e-9 && origin.y <= 1e-9);
        prop_assert!(corner.x >= w - 1e-6 && corner.y >= h - 1e-6);
    }
}
