//! Configuration management for the try-on pipeline
//!
//! Every tunable of the pipeline lives in one `TryOnConfig` record. It is
//! built once per session and passed explicitly to each component.

use crate::constants::{
    DEFAULT_DEPTH_CLAMP, DEFAULT_DEPTH_GAIN, DEFAULT_DETECTION_TIMEOUT_MS, DEFAULT_EAR_COEFFICIENT,
    DEFAULT_EAR_WEIGHT, DEFAULT_EYE_COEFFICIENT, DEFAULT_EYE_WEIGHT, DEFAULT_FLAT_Z_THRESHOLD,
    DEFAULT_MAX_SCALE, DEFAULT_MIN_LANDMARKS, DEFAULT_MIN_SCALE, DEFAULT_MODEL_Z_SHIFT, DEFAULT_ORIENTATION_SETTLE_MS, DEFAULT_PLANE_WIDTH, DEFAULT_PLANE_Z,
    DEFAULT_RESIZE_DEBOUNCE_MS, DEFAULT_SMOOTHING, FOV_LARGE_DEG, FOV_SMALL_DEG, FRAME_WIDTH_REFERENCE,
    LARGE_VIEWPORT_WIDTH, MAX_PIXEL_RATIO, SMALL_VIEWPORT_WIDTH,
};
use crate::coordinate_mapper::FitMode;
use crate::landmarks::AnchorSet;
use crate::pose_estimation::OrientationMode;
use crate::smoothing::{PoseFilter, SmoothingFactors};
use crate::{Error, Result};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complete pipeline configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TryOnConfig {
    /// Source → display → world mapping
    pub mapping: MappingConfig,

    /// Anatomical anchor landmark indices
    pub anchors: AnchorSet,

    /// Pose estimation
    pub pose: PoseConfig,

    /// Optional yaw-dependent scale boost
    pub yaw_boost: YawBoostConfig,

    /// Adaptive face depth reference
    pub depth_reference: DepthReferenceConfig,

    /// Temporal smoothing
    pub smoothing: SmoothingConfig,

    /// Viewport tracking
    pub viewport: ViewportConfig,

    /// Frame pacing
    pub session: SessionConfig,
}

/// Coordinate mapping parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    /// How the video is fitted into its container
    pub fit_mode: FitMode,

    /// Mirror the displayed video horizontally (selfie view)
    pub mirror: bool,

    /// Width of the world plane the display maps onto
    pub plane_width: f64,

    /// World Z of the display plane
    pub plane_z: f64,

    /// Extra Z shift applied to the overlay model
    pub model_z_shift: f64,

    /// World units per source pixel of landmark depth
    pub depth_gain: f64,

    /// Maximum depth offset from the base Z, either direction
    pub depth_clamp: f64,
}

/// Pose estimation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseConfig {
    /// Local offset added to the nose-bridge position, in the head frame
    pub bridge_offset: Vector3<f64>,

    /// Scale per unit of inter-ear distance over source width
    pub ear_coefficient: f64,

    /// Scale per unit of inter-eye distance over source width
    pub eye_coefficient: f64,

    /// Weight of the ear estimate in the scale mix
    pub ear_weight: f64,

    /// Weight of the eye estimate in the scale mix
    pub eye_weight: f64,

    /// Lower scale bound
    pub min_scale: f64,

    /// Upper scale bound
    pub max_scale: f64,

    /// User frame-width value that leaves the scale unchanged
    pub frame_width_reference: f64,

    /// Landmark sets smaller than this are treated as no face
    pub min_landmarks: usize,

    /// Landmark Z range below which depth is ignored
    pub flat_z_threshold: f64,

    /// How much of the estimated rotation is kept
    pub orientation_mode: OrientationMode,

    /// Per-axis gains for `level` mode
    pub level_gains: AxisValues,

    /// Per-axis clamps for `level` mode, degrees
    pub level_max_deg: AxisValues,

    /// Largest yaw derived from 2D cues, degrees
    pub planar_max_yaw_deg: f64,

    /// Largest roll derived from 2D cues, degrees
    pub planar_max_roll_deg: f64,

    /// Head transformation matrix handling
    pub matrix: MatrixConfig,
}

/// Yaw / pitch / roll triple
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisValues {
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
}

/// Detector transformation matrix handling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatrixConfig {
    /// Use the matrix when the detector supplies one
    pub prefer_matrix: bool,

    /// Negate the Z axis of the detector matrix
    pub flip_z: bool,

    /// Push along the head's local Z axis after decomposition
    pub depth_offset: f64,
}

/// Yaw-driven scale boost, for calibrating assets that look narrow when turned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct YawBoostConfig {
    pub enabled: bool,

    /// Yaw at which the boost saturates, degrees
    pub max_angle_deg: f64,

    /// Maximum relative boost on small containers
    pub scale_boost_small: f64,

    /// Maximum relative boost on large containers
    pub scale_boost_large: f64,

    /// World Z shift at full yaw
    pub depth_shift: f64,
}

/// Adaptive reference for the nose-bridge to forehead depth difference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthReferenceConfig {
    pub enabled: bool,

    pub min: f64,
    pub max: f64,

    /// EMA rate towards the current depth
    pub adapt_rate: f64,

    /// Bounds of the per-frame depth ratio
    pub min_ratio: f64,
    pub max_ratio: f64,

    /// Exponent applied to the ratio before it divides the scale. Below 1 so
    /// a nearer face still grows the frame.
    pub strength: f64,

    /// Face depths below this leave the ratio at 1
    pub min_face_depth: f64,
}

/// Temporal smoothing parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    /// Filter type: "exponential" or "none"
    pub filter: String,

    /// Fraction of the previous position kept per frame
    pub position: f64,

    /// Fraction of the previous orientation kept per frame
    pub rotation: f64,

    /// Fraction of the previous scale kept per frame
    pub scale: f64,

    /// Fraction of the previous yaw kept per frame (`yaw_only` mode)
    pub yaw: f64,
}

/// Viewport tracking parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    /// Minimum interval between applied resize events
    pub debounce_ms: u64,

    /// Delay before an orientation change forces a resync
    pub orientation_settle_ms: u64,

    /// Field of view on small containers, degrees
    pub fov_small_deg: f64,

    /// Field of view on large containers, degrees
    pub fov_large_deg: f64,

    /// Container width where the size factor is 0
    pub small_width: f64,

    /// Container width where the size factor is 1
    pub large_width: f64,

    /// Device pixel ratio cap
    pub max_pixel_ratio: f64,

    /// Distance from the render camera to the display plane
    pub camera_distance: f64,
}

/// Session frame pacing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// A detection not completed or cancelled within this window is abandoned
    pub detection_timeout_ms: u64,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            fit_mode: FitMode::Cover,
            mirror: true,
            plane_width: DEFAULT_PLANE_WIDTH,
            plane_z: DEFAULT_PLANE_Z,
            model_z_shift: DEFAULT_MODEL_Z_SHIFT,
            depth_gain: DEFAULT_DEPTH_GAIN,
            depth_clamp: DEFAULT_DEPTH_CLAMP,
        }
    }
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            bridge_offset: Vector3::new(0.0, -0.25, 0.0),
            ear_coefficient: DEFAULT_EAR_COEFFICIENT,
            eye_coefficient: DEFAULT_EYE_COEFFICIENT,
            ear_weight: DEFAULT_EAR_WEIGHT,
            eye_weight: DEFAULT_EYE_WEIGHT,
            min_scale: DEFAULT_MIN_SCALE,
            max_scale: DEFAULT_MAX_SCALE,
            frame_width_reference: FRAME_WIDTH_REFERENCE,
            min_landmarks: DEFAULT_MIN_LANDMARKS,
            flat_z_threshold: DEFAULT_FLAT_Z_THRESHOLD,
            orientation_mode: OrientationMode::Full,
            level_gains: AxisValues {
                yaw: 1.0,
                pitch: 0.25,
                roll: 0.35,
            },
            level_max_deg: AxisValues {
                yaw: 30.0,
                pitch: 12.0,
                roll: 15.0,
            },
            planar_max_yaw_deg: 25.0,
            planar_max_roll_deg: 20.0,
            matrix: MatrixConfig::default(),
        }
    }
}

impl Default for MatrixConfig {
    fn default() -> Self {
        Self {
            prefer_matrix: true,
            flip_z: true,
            depth_offset: -5.5,
        }
    }
}

impl Default for YawBoostConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_angle_deg: 45.0,
            scale_boost_small: 0.12,
            scale_boost_large: 0.25,
            depth_shift: 0.0,
        }
    }
}

impl Default for DepthReferenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min: 0.06,
            max: 0.22,
            adapt_rate: 0.02,
            min_ratio: 0.75,
            max_ratio: 1.35,
            strength: 0.5,
            min_face_depth: 1e-4,
        }
    }
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            filter: "exponential".to_string(),
            position: DEFAULT_SMOOTHING,
            rotation: DEFAULT_SMOOTHING,
            scale: DEFAULT_SMOOTHING,
            yaw: DEFAULT_SMOOTHING,
        }
    }
}

impl SmoothingConfig {
    /// Per-concern factors for the smoother
    pub fn factors(&self) -> SmoothingFactors {
        SmoothingFactors {
            position: self.position,
            rotation: self.rotation,
            scale: self.scale,
            yaw: self.yaw,
        }
    }
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_RESIZE_DEBOUNCE_MS,
            orientation_settle_ms: DEFAULT_ORIENTATION_SETTLE_MS,
            fov_small_deg: FOV_SMALL_DEG,
            fov_large_deg: FOV_LARGE_DEG,
            small_width: SMALL_VIEWPORT_WIDTH,
            large_width: LARGE_VIEWPORT_WIDTH,
            max_pixel_ratio: MAX_PIXEL_RATIO,
            camera_distance: 5.0,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            detection_timeout_ms: DEFAULT_DETECTION_TIMEOUT_MS,
        }
    }
}

fn check_positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::ConfigError(format!("{name} must be a positive number, got {value}")))
    }
}

fn check_factor(name: &str, value: f64) -> Result<()> {
    if (0.0..1.0).contains(&value) {
        Ok(())
    } else {
        Err(Error::ConfigError(format!("{name} must be in [0, 1), got {value}")))
    }
}

impl TryOnConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or fails `from_yaml`
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigError` for malformed YAML or invalid values
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(content).map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)?;

        Ok(())
    }

    /// Create the pose filter selected by the smoothing section
    pub fn create_filter(&self) -> Result<Box<dyn PoseFilter>> {
        crate::smoothing::create_filter(&self.smoothing.filter, self.smoothing.factors())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let m = &self.mapping;
        check_positive("mapping.plane_width", m.plane_width)?;
        check_positive("mapping.depth_gain", m.depth_gain)?;
        if !m.depth_clamp.is_finite() || m.depth_clamp < 0.0 {
            return Err(Error::ConfigError("mapping.depth_clamp must be non-negative".to_string()));
        }
        if !m.plane_z.is_finite() || !m.model_z_shift.is_finite() {
            return Err(Error::ConfigError("mapping plane depth must be finite".to_string()));
        }

        let p = &self.pose;
        check_positive("pose.min_scale", p.min_scale)?;
        check_positive("pose.max_scale", p.max_scale)?;
        if p.min_scale > p.max_scale {
            return Err(Error::ConfigError(format!(
                "pose.min_scale ({}) must not exceed pose.max_scale ({})",
                p.min_scale, p.max_scale
            )));
        }
        check_positive("pose.frame_width_reference", p.frame_width_reference)?;
        if p.ear_weight < 0.0 || p.eye_weight < 0.0 || p.ear_weight + p.eye_weight <= 0.0 {
            return Err(Error::ConfigError(
                "Scale mix weights must be non-negative and not both zero".to_string(),
            ));
        }
        let indices = self.anchors.indices();
        if indices.iter().enumerate().any(|(i, a)| indices[..i].contains(a)) {
            return Err(Error::ConfigError(format!("Anchor indices must be distinct, got {indices:?}")));
        }
        if p.min_landmarks == 0 {
            return Err(Error::ConfigError("pose.min_landmarks must be greater than 0".to_string()));
        }
        if p.bridge_offset.iter().any(|v| !v.is_finite()) || !p.matrix.depth_offset.is_finite() {
            return Err(Error::ConfigError("Pose offsets must be finite".to_string()));
        }

        let d = &self.depth_reference;
        if d.enabled {
            check_positive("depth_reference.min", d.min)?;
            if d.min > d.max || d.min_ratio > d.max_ratio || d.min_ratio <= 0.0 {
                return Err(Error::ConfigError("Depth reference bounds are inverted".to_string()));
            }
            if !(0.0..=1.0).contains(&d.adapt_rate) {
                return Err(Error::ConfigError("depth_reference.adapt_rate must be in [0, 1]".to_string()));
            }
            check_factor("depth_reference.strength", d.strength)?;
        }

        let y = &self.yaw_boost;
        if y.enabled {
            check_positive("yaw_boost.max_angle_deg", y.max_angle_deg)?;
        }

        let s = &self.smoothing;
        check_factor("smoothing.position", s.position)?;
        check_factor("smoothing.rotation", s.rotation)?;
        check_factor("smoothing.scale", s.scale)?;
        check_factor("smoothing.yaw", s.yaw)?;

        let v = &self.viewport;
        if v.large_width <= v.small_width {
            return Err(Error::ConfigError(
                "viewport.large_width must be greater than viewport.small_width".to_string(),
            ));
        }
        check_positive("viewport.max_pixel_ratio", v.max_pixel_ratio)?;
        check_positive("viewport.camera_distance", v.camera_distance)?;
        check_positive("viewport.fov_small_deg", v.fov_small_deg)?;
        check_positive("viewport.fov_large_deg", v.fov_large_deg)?;

        if self.session.detection_timeout_ms == 0 {
            return Err(Error::ConfigError(
                "session.detection_timeout_ms must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Example configuration file content
pub const EXAMPLE_CONFIG: &str = r#"# Virtual Try-On Configuration

# Video to world mapping
mapping:
  fit_mode: cover          # cover | contain, must match the on-screen video fit
  mirror: true
  plane_width: 16.0
  plane_z: -5.0
  model_z_shift: -1.6
  depth_gain: 0.012
  depth_clamp: 0.8

# Face mesh anchor indices
anchors:
  nose_bridge: 168
  forehead: 10
  left_ear: 234
  right_ear: 454
  left_eye_outer: 263
  right_eye_outer: 33

# Pose estimation
pose:
  bridge_offset: [0.0, -0.25, 0.0]
  ear_coefficient: 3.68
  eye_coefficient: 3.2
  ear_weight: 0.7
  eye_weight: 0.3
  min_scale: 0.5
  max_scale: 8.0
  frame_width_reference: 0.3
  min_landmarks: 200
  flat_z_threshold: 0.002
  orientation_mode: full   # full | level | yaw_only
  level_gains: { yaw: 1.0, pitch: 0.25, roll: 0.35 }
  level_max_deg: { yaw: 30.0, pitch: 12.0, roll: 15.0 }
  planar_max_yaw_deg: 25.0
  planar_max_roll_deg: 20.0
  matrix:
    prefer_matrix: true
    flip_z: true
    depth_offset: -5.5

# Yaw scale boost
yaw_boost:
  enabled: false
  max_angle_deg: 45.0
  scale_boost_small: 0.12
  scale_boost_large: 0.25
  depth_shift: 0.0

# Adaptive depth reference
depth_reference:
  enabled: true
  min: 0.06
  max: 0.22
  adapt_rate: 0.02
  min_ratio: 0.75
  max_ratio: 1.35
  strength: 0.5            # 1 cancels growth of the frame as the face nears
  min_face_depth: 0.0001

# Temporal smoothing (fraction of the previous pose kept per frame)
smoothing:
  filter: "exponential"    # exponential | none
  position: 0.25
  rotation: 0.25
  scale: 0.25
  yaw: 0.25

# Viewport tracking
viewport:
  debounce_ms: 120
  orientation_settle_ms: 250
  fov_small_deg: 52.0
  fov_large_deg: 45.0
  small_width: 360.0
  large_width: 900.0
  max_pixel_ratio: 2.0
  camera_distance: 5.0

# Frame pacing
session:
  detection_timeout_ms: 1000
"#;
