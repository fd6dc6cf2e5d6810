//! End-to-end tests: synthetic landmark sequences through the whole pipeline


use std::time::{Duration, Instant};
use test_helpers::{frame, FakeCamera, RecordingOverlay, ScriptedDetector, SyntheticFace, SOURCE};
use virtual_try_on::{
    config::TryOnConfig,
    session::{FrameOutcome, TryOnSession},
};

const NOSE_Y: f64 = 100.0;

fn pipeline_config(alpha: f64, mirror: bool) -> TryOnConfig {
    let mut config = TryOnConfig::default();
    config.mapping.mirror = mirror;
    config.depth_reference.enabled = false;
    config.smoothing.position = alpha;
    config.smoothing.rotation = alpha;
    config.smoothing.scale = alpha;
    config.smoothing.yaw = alpha;
    config
}

/// Applied X positions for a sequence of nose positions
fn replay(config: &TryOnConfig, nose_xs: &[f64]) -> Vec<f64> {
    let start = Instant::now();
    let mut detector = ScriptedDetector::new(nose_xs.iter().map(|&x| SyntheticFace::at(x, NOSE_Y).output()));
    let mut session = TryOnSession::new(config).unwrap();
    session.on_resize(SOURCE, start);
    session.start(&mut FakeCamera::new(), &mut detector, start).unwrap();
    session.attach_overlay(Box::new(RecordingOverlay::new().0));

    (0..nose_xs.len() as u64)
        .map(|i| {
            let now = start + Duration::from_millis(33 * i);
            session.render_tick(now);
            match session.process_frame(&mut detector, frame(33 * i), now) {
                FrameOutcome::Applied(t) => t.position.x,
                other => panic!("frame {i}: expected an applied pose, got {other:?}"),
            }
        })
        .collect()
}

/// Unsmoothed target X for a nose position (first frame bootstraps)
fn target_x(config: &TryOnConfig, nose_x: f64) -> f64 {
    replay(config, &[nose_x])[0]
}

#[test]
fn test_slow_motion_is_monotonic_and_converges() {
    let config = pipeline_config(0.5, false);
    let ramp = [100.0, 102.5, 105.0, 107.5, 110.0];
    let hold = [110.0, 110.0];
    let sequence: Vec<f64> = ramp.iter().chain(hold.iter()).copied().collect();

    let xs = replay(&config, &sequence);
    let start = target_x(&config, 100.0);
    let end = target_x(&config, 110.0);
    assert!(end > start);
    assert!((xs[0] - start).abs() < 1e-9, "first frame must bootstrap to the target");

    for pair in xs.windows(2) {
        assert!(pair[1] > pair[0], "applied X must increase: {xs:?}");
    }
    for &x in &xs {
        assert!(x <= end + 1e-9, "smoothing must not overshoot: {xs:?}");
    }

    let progress = |x: f64| (x - start) / (end - start);
    // 0.5-blending a linear ramp leaves 23.4% behind on the last ramp frame
    assert!(progress(xs[4]) >= 0.75, "frame 5 progress {}", progress(xs[4]));
    assert!(progress(xs[6]) >= 0.9, "after holding, progress {}", progress(xs[6]));
}

#[test]
fn test_mirrored_motion_moves_left() {
    let config = pipeline_config(0.5, true);
    let xs = replay(&config, &[100.0, 105.0, 110.0]);
    assert!(xs[1] < xs[0]);
    assert!(xs[2] < xs[1]);
}

#[test]
fn test_stationary_face_is_stable() {
    let config = pipeline_config(0.25, false);
    let xs = replay(&config, &[640.0; 6]);
    for &x in &xs {
        assert!((x - xs[0]).abs() < 1e-9);
    }
}

#[test]
fn test_centered_face_maps_near_origin() {
    let config = pipeline_config(0.25, false);
    let x = target_x(&config, 640.0);
    assert!(x.abs() < 1e-6, "centered nose should map to world x = 0, got {x}");
}

#[test]
fn test_nearer_face_scales_up() {
    let config = pipeline_config(0.0, false);
    let start = Instant::now();
    let near = SyntheticFace::at(640.0, 360.0).with_ear_half_width(160.0).output();
    let far = SyntheticFace::at(640.0, 360.0).with_ear_half_width(80.0).output();
    let mut detector = ScriptedDetector::new([far, near]);
    let mut session = TryOnSession::new(&config).unwrap();
    session.on_resize(SOURCE, start);
    session.start(&mut FakeCamera::new(), &mut detector, start).unwrap();

    let scales: Vec<f64> = (0..2)
        .map(|i| match session.process_frame(&mut detector, frame(i), start) {
            FrameOutcome::Applied(t) => t.scale,
            other => panic!("expected an applied pose, got {other:?}"),
        })
        .collect();
    assert!(scales[1] > scales[0], "scales {scales:?}");
}
