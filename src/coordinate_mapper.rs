//! Source-pixel → display-pixel → world-space coordinate mapping.
//!
//! The display mapping must reproduce exactly how the video element is
//! fitted into its container (`cover` crops, `contain` letterboxes), otherwise
//! the overlay drifts off the tracked features whenever the container shape
//! changes.

use crate::config::MappingConfig;
use crate::landmarks::LandmarkSet;
use log::debug;
use nalgebra::{Point2, Vector3};
use serde::{Deserialize, Serialize};

/// Width and height of a video stream or display container, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: f64,
    pub height: f64,
}

impl Dimensions {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Both sides positive and finite
    pub fn is_valid(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }

    /// Width over height; `None` for unusable dimensions
    pub fn aspect(&self) -> Option<f64> {
        self.is_valid().then(|| self.width / self.height)
    }
}

/// How the source video is fitted into the display container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitMode {
    /// Scale to fill the container, cropping the overflow
    #[default]
    Cover,
    /// Scale to fit entirely inside the container, letterboxing the rest
    Contain,
}

impl FitMode {
    /// Uniform scale factor applied to the source to fit the display
    pub fn scale_factor(self, source: Dimensions, display: Dimensions) -> f64 {
        let sx = display.width / source.width;
        let sy = display.height / source.height;
        match self {
            Self::Cover => sx.max(sy),
            Self::Contain => sx.min(sy),
        }
    }
}

/// Map a source-pixel point into displayed-pixel space.
///
/// Returns `None` when either frame has a zero or non-finite side (no video
/// metadata or no layout yet).
pub fn source_to_displayed(
    x: f64,
    y: f64,
    source: Dimensions,
    display: Dimensions,
    fit_mode: FitMode,
    mirror: bool,
) -> Option<Point2<f64>> {
    if !source.is_valid() || !display.is_valid() {
        return None;
    }

    let s = fit_mode.scale_factor(source, display);
    let offset_x = (source.width * s - display.width) / 2.0;
    let offset_y = (source.height * s - display.height) / 2.0;

    let mut dx = x * s - offset_x;
    let dy = y * s - offset_y;
    if mirror {
        dx = display.width - dx;
    }

    Some(Point2::new(dx, dy))
}

/// Map a displayed-pixel point onto the centered world plane (z = 0).
///
/// Pixel Y grows downward while world Y grows upward.
pub fn displayed_to_world_xy(
    dx: f64,
    dy: f64,
    display: Dimensions,
    plane_width: f64,
    plane_height: f64,
) -> Option<Vector3<f64>> {
    if !display.is_valid() {
        return None;
    }
    let x = (dx / display.width - 0.5) * plane_width;
    let y = (0.5 - dy / display.height) * plane_height;
    Some(Vector3::new(x, y, 0.0))
}

/// Convert a detector's relative depth into a bounded world Z.
///
/// `landmark_z` is in the detector's relative unit; `source_width` brings it
/// to source pixels (pass `1.0` for depths already in pixels).
pub fn depth_to_world_z(landmark_z: f64, source_width: f64, base_z: f64, depth_gain: f64, clamp_range: f64) -> f64 {
    let range = clamp_range.abs();
    let offset = landmark_z * source_width * depth_gain;
    if offset.is_finite() {
        base_z + offset.clamp(-range, range)
    } else {
        base_z
    }
}

/// Source and display geometry a mapping is computed against
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MappingFrame {
    pub source: Dimensions,
    pub display: Dimensions,
    pub plane_height: f64,
}

/// Stateful mapper holding the last valid viewport geometry
#[derive(Debug, Clone)]
pub struct CoordinateMapper {
    fit_mode: FitMode,
    mirror: bool,
    plane_width: f64,
    base_z: f64,
    depth_gain: f64,
    depth_clamp: f64,
    frame: Option<MappingFrame>,
}

impl CoordinateMapper {
    /// Create a mapper from the mapping configuration; it starts without geometry
    pub fn new(config: &MappingConfig) -> Self {
        Self {
            fit_mode: config.fit_mode,
            mirror: config.mirror,
            plane_width: config.plane_width,
            base_z: config.plane_z + config.model_z_shift,
            depth_gain: config.depth_gain,
            depth_clamp: config.depth_clamp,
            frame: None,
        }
    }

    /// Adopt new source/display geometry.
    ///
    /// Invalid dimensions are ignored and the previous mapping is kept;
    /// returns whether the geometry was accepted.
    pub fn update_frame(&mut self, source: Dimensions, display: Dimensions) -> bool {
        let Some(aspect) = display.aspect() else {
            debug!("Ignoring display geometry {}x{}", display.width, display.height);
            return false;
        };
        if !source.is_valid() {
            debug!("Ignoring source geometry {}x{}", source.width, source.height);
            return false;
        }
        self.frame = Some(MappingFrame {
            source,
            display,
            plane_height: self.plane_width / aspect,
        });
        true
    }

    pub fn frame(&self) -> Option<MappingFrame> {
        self.frame
    }

    pub fn is_ready(&self) -> bool {
        self.frame.is_some()
    }

    pub fn fit_mode(&self) -> FitMode {
        self.fit_mode
    }

    pub fn mirror(&self) -> bool {
        self.mirror
    }

    pub fn plane_width(&self) -> f64 {
        self.plane_width
    }

    /// Base world depth of the overlay before the per-landmark depth offset
    pub fn base_z(&self) -> f64 {
        self.base_z
    }

    /// Displayed-pixel position of a source-pixel point
    pub fn to_displayed(&self, source_px: &Vector3<f64>) -> Option<Point2<f64>> {
        let frame = self.frame?;
        source_to_displayed(
            source_px.x,
            source_px.y,
            frame.source,
            frame.display,
            self.fit_mode,
            self.mirror,
        )
    }

    /// World XY of a source-pixel point on the z = 0 plane
    pub fn to_world_xy(&self, source_px: &Vector3<f64>) -> Option<Vector3<f64>> {
        let frame = self.frame?;
        let displayed = self.to_displayed(source_px)?;
        displayed_to_world_xy(displayed.x, displayed.y, frame.display, self.plane_width, frame.plane_height)
    }

    /// Full world position of a source-pixel point whose z is in source pixels
    pub fn to_world(&self, source_px: &Vector3<f64>) -> Option<Vector3<f64>> {
        let mut world = self.to_world_xy(source_px)?;
        world.z = depth_to_world_z(source_px.z, 1.0, self.base_z, self.depth_gain, self.depth_clamp);
        Some(world)
    }

    /// World position of one landmark of `set`
    pub fn map_landmark(&self, set: &LandmarkSet, index: usize) -> Option<Vector3<f64>> {
        let frame = self.frame?;
        let source_px = set.source_px(index, frame.source)?;
        self.to_world(&source_px)
    }

    /// World positions of every landmark, index-aligned with `set`.
    ///
    /// Hosts use this to drive a depth-only face occluder mesh with the same
    /// mapping as the overlay.
    pub fn map_all(&self, set: &LandmarkSet) -> Vec<Option<Vector3<f64>>> {
        (0..set.len()).map(|i| self.map_landmark(set, i)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::{Landmark, LandmarkSpace};

    const SOURCE: Dimensions = Dimensions::new(1280.0, 720.0);
    const SQUARE: Dimensions = Dimensions::new(400.0, 400.0);

    #[test]
    fn test_cover_center_maps_to_container_center() {
        let p = source_to_displayed(640.0, 360.0, SOURCE, SQUARE, FitMode::Cover, false).unwrap();
        assert!((p.x - 200.0).abs() < 1e-9);
        assert!((p.y - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_contain_origin_reflects_letterbox() {
        let p = source_to_displayed(0.0, 0.0, SOURCE, SQUARE, FitMode::Contain, false).unwrap();
        assert!(p.x.abs() < 1e-9);
        assert!((p.y - 87.5).abs() < 1e-9);
    }

    #[test]
    fn test_cover_origin_is_cropped() {
        let p = source_to_displayed(0.0, 0.0, SOURCE, SQUARE, FitMode::Cover, false).unwrap();
        assert!(p.x < 0.0, "left edge should be cropped off screen");
        assert!(p.y.abs() < 1e-9);
    }

    #[test]
    fn test_mirror_only_changes_x() {
        let plain = source_to_displayed(300.0, 500.0, SOURCE, SQUARE, FitMode::Cover, false).unwrap();
        let mirrored = source_to_displayed(300.0, 500.0, SOURCE, SQUARE, FitMode::Cover, true).unwrap();
        assert_eq!(plain.y.to_bits(), mirrored.y.to_bits());
        assert!((mirrored.x - (400.0 - plain.x)).abs() < 1e-9);
    }

    #[test]
    fn test_zero_dimensions_short_circuit() {
        let zero = Dimensions::new(0.0, 0.0);
        assert!(source_to_displayed(1.0, 1.0, zero, SQUARE, FitMode::Cover, false).is_none());
        assert!(source_to_displayed(1.0, 1.0, SOURCE, zero, FitMode::Cover, false).is_none());
        assert!(displayed_to_world_xy(1.0, 1.0, zero, 16.0, 9.0).is_none());
    }

    #[test]
    fn test_displayed_to_world_inverts_y() {
        let top_left = displayed_to_world_xy(0.0, 0.0, SQUARE, 16.0, 16.0).unwrap();
        assert_eq!(top_left, Vector3::new(-8.0, 8.0, 0.0));
        let center = displayed_to_world_xy(200.0, 200.0, SQUARE, 16.0, 16.0).unwrap();
        assert_eq!(center, Vector3::zeros());
    }

    #[test]
    fn test_depth_is_clamped() {
        assert_eq!(depth_to_world_z(0.0, 1280.0, -6.6, 0.012, 0.8), -6.6);
        assert!((depth_to_world_z(1.0, 1280.0, -6.6, 0.012, 0.8) - (-5.8)).abs() < 1e-12);
        assert!((depth_to_world_z(-1.0, 1280.0, -6.6, 0.012, 0.8) - (-7.4)).abs() < 1e-12);
        assert_eq!(depth_to_world_z(f64::NAN, 1280.0, -6.6, 0.012, 0.8), -6.6);
    }

    #[test]
    fn test_mapper_keeps_previous_frame_on_invalid_update() {
        let mut mapper = CoordinateMapper::new(&MappingConfig::default());
        assert!(!mapper.is_ready());
        assert!(mapper.update_frame(SOURCE, SQUARE));
        let before = mapper.frame();

        assert!(!mapper.update_frame(Dimensions::new(0.0, 720.0), SQUARE));
        assert!(!mapper.update_frame(SOURCE, Dimensions::new(400.0, 0.0)));
        assert_eq!(mapper.frame(), before);
        assert!((before.unwrap().plane_height - 16.0).abs() < 1e-12);
    }

    #[test]
    fn test_map_all_is_index_aligned() {
        let mut mapper = CoordinateMapper::new(&MappingConfig::default());
        mapper.update_frame(SOURCE, SQUARE);
        let set = LandmarkSet::new(
            vec![Landmark::new(0.5, 0.5, 0.0), Landmark::missing()],
            LandmarkSpace::Normalized,
        );
        let mapped = mapper.map_all(&set);
        assert_eq!(mapped.len(), 2);
        let center = mapped[0].unwrap();
        assert!(center.x.abs() < 1e-9 && center.y.abs() < 1e-9);
        assert!((center.z - mapper.base_z()).abs() < 1e-12);
        assert!(mapped[1].is_none());
    }
}
