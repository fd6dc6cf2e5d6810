//! Constants used throughout the try-on pipeline

/// Face mesh landmark indices used as anatomical anchors
pub const NOSE_BRIDGE_INDEX: usize = 168;
pub const FOREHEAD_INDEX: usize = 10;
pub const LEFT_EAR_INDEX: usize = 234;
pub const RIGHT_EAR_INDEX: usize = 454;
pub const LEFT_EYE_OUTER_INDEX: usize = 263;
pub const RIGHT_EYE_OUTER_INDEX: usize = 33;

/// Number of points in a full face mesh
pub const FACE_MESH_LANDMARKS: usize = 468;

/// Minimum landmarks a set must carry to be treated as a face
pub const DEFAULT_MIN_LANDMARKS: usize = 200;

/// World plane placement
pub const DEFAULT_PLANE_WIDTH: f64 = 16.0;
pub const DEFAULT_PLANE_Z: f64 = -5.0;
pub const DEFAULT_MODEL_Z_SHIFT: f64 = -1.6;

/// Detector depth calibration
pub const DEFAULT_DEPTH_GAIN: f64 = 0.012;
pub const DEFAULT_DEPTH_CLAMP: f64 = 0.8;

/// Scale estimation
pub const DEFAULT_EAR_COEFFICIENT: f64 = 3.68;
pub const DEFAULT_EYE_COEFFICIENT: f64 = 3.2;
pub const DEFAULT_EAR_WEIGHT: f64 = 0.7;
pub const DEFAULT_EYE_WEIGHT: f64 = 0.3;
pub const DEFAULT_MIN_SCALE: f64 = 0.5;
pub const DEFAULT_MAX_SCALE: f64 = 8.0;

/// Frame width slider; the reference value is the neutral multiplier
pub const FRAME_WIDTH_REFERENCE: f64 = 0.3;

/// Z range below which landmark depth is treated as missing
pub const DEFAULT_FLAT_Z_THRESHOLD: f64 = 0.002;

/// Default smoothing factor (higher = smoother)
pub const DEFAULT_SMOOTHING: f64 = 0.25;

/// Resize debounce window in milliseconds
pub const DEFAULT_RESIZE_DEBOUNCE_MS: u64 = 120;

/// Window after which an unfinished detection is abandoned
pub const DEFAULT_DETECTION_TIMEOUT_MS: u64 = 1000;

/// Delay before resyncing after an orientation change
pub const DEFAULT_ORIENTATION_SETTLE_MS: u64 = 250;

/// Container widths bounding the viewport size factor
pub const SMALL_VIEWPORT_WIDTH: f64 = 360.0;
pub const LARGE_VIEWPORT_WIDTH: f64 = 900.0;

/// Render camera field of view on small and large containers (degrees)
pub const FOV_SMALL_DEG: f64 = 52.0;
pub const FOV_LARGE_DEG: f64 = 45.0;

/// Upper bound applied to the device pixel ratio
pub const MAX_PIXEL_RATIO: f64 = 2.0;

/// Numeric precision epsilon for geometry checks
pub const EPSILON: f64 = 1e-9;
