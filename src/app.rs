//! Trace replay application: drives a real try-on session from a recorded
//! YAML trace of detector output, standing in for camera, detector and
//! renderer.

use crate::{
    config::TryOnConfig,
    constants::FACE_MESH_LANDMARKS,
    coordinate_mapper::Dimensions,
    error::{Error, Result},
    landmarks::{DetectorOutput, Landmark, LandmarkSet, LandmarkSpace},
    overlay::OverlayObject,
    session::{CameraBackend, FrameOutcome, LandmarkDetector, MediaStream, TryOnSession, VideoFrame},
    transform::EulerYxz,
};
use log::{debug, info, warn};
use nalgebra::Matrix4;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::time::{Duration, Instant};

/// Recorded session: video geometry plus per-frame detector output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    /// Native video resolution
    pub source: Dimensions,

    /// Display container size at the start of the replay
    pub container: Dimensions,

    /// Device pixel ratio of the display
    #[serde(default = "default_pixel_ratio")]
    pub pixel_ratio: f64,

    /// Frame-width slider value
    #[serde(default)]
    pub frame_width: Option<f64>,

    pub frames: Vec<TraceFrame>,
}

fn default_pixel_ratio() -> f64 {
    1.0
}

/// One recorded frame
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceFrame {
    pub timestamp_ms: u64,

    /// Dense, index-ordered landmarks as `[x, y, z]`
    pub landmarks: Option<Vec<[f64; 3]>>,

    /// Sparse landmarks by index, padded to `landmark_count`
    pub sparse_landmarks: Option<BTreeMap<usize, [f64; 3]>>,

    /// Total landmark count of a sparse frame
    pub landmark_count: Option<usize>,

    pub space: LandmarkSpace,

    /// Column-major head transformation matrix
    pub matrix: Option<Vec<f64>>,

    /// Container resize observed at this frame
    pub resize: Option<Dimensions>,

    /// Detector failed on this frame
    pub detector_error: Option<String>,
}

impl TraceFrame {
    /// Detector output recorded for this frame
    ///
    /// # Errors
    ///
    /// Returns an error if sparse indices or the matrix are malformed
    pub fn detector_output(&self) -> Result<DetectorOutput> {
        let landmarks = if let Some(dense) = &self.landmarks {
            Some(LandmarkSet::new(
                dense.iter().copied().map(Landmark::from).collect(),
                self.space,
            ))
        } else if let Some(sparse) = &self.sparse_landmarks {
            let len = self.landmark_count.unwrap_or(FACE_MESH_LANDMARKS);
            Some(LandmarkSet::from_sparse(
                len,
                sparse.iter().map(|(&i, &p)| (i, Landmark::from(p))),
                self.space,
            )?)
        } else {
            None
        };

        let transformation_matrix = match &self.matrix {
            Some(values) => Some(<[f64; 16]>::try_from(values.as_slice()).map_err(|_| {
                Error::TraceError(format!(
                    "Frame {}: matrix needs 16 values, got {}",
                    self.timestamp_ms,
                    values.len()
                ))
            })?),
            None => None,
        };

        Ok(DetectorOutput {
            landmarks,
            transformation_matrix,
        })
    }
}

impl Trace {
    /// Load a trace from a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid trace
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse a trace from YAML text
    ///
    /// # Errors
    ///
    /// Returns `Error::TraceError` for malformed YAML or a non-positive source size
    pub fn from_yaml(content: &str) -> Result<Self> {
        let trace: Self =
            serde_yaml::from_str(content).map_err(|e| Error::TraceError(format!("Failed to parse trace: {e}")))?;
        if !trace.source.is_valid() {
            return Err(Error::TraceError("Trace source dimensions must be positive".to_string()));
        }
        Ok(trace)
    }
}

/// Camera stand-in reporting the trace's video resolution
struct TraceCamera {
    source: Dimensions,
}

struct TraceStream {
    source: Dimensions,
}

impl MediaStream for TraceStream {
    fn dimensions(&self) -> Option<Dimensions> {
        Some(self.source)
    }

    fn stop(&mut self) {
        debug!("Trace stream stopped");
    }
}

impl CameraBackend for TraceCamera {
    fn acquire(&mut self) -> Result<Box<dyn MediaStream>> {
        Ok(Box::new(TraceStream { source: self.source }))
    }
}

/// Detector stand-in answering with the recorded output for each timestamp
struct TraceDetector {
    outputs: HashMap<u64, std::result::Result<DetectorOutput, String>>,
}

impl LandmarkDetector for TraceDetector {
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }

    fn detect(&mut self, frame: &VideoFrame) -> Result<DetectorOutput> {
        match self.outputs.remove(&frame.timestamp_ms) {
            Some(Ok(output)) => Ok(output),
            Some(Err(reason)) => Err(Error::DetectionError(reason)),
            None => Ok(DetectorOutput::default()),
        }
    }
}

/// Overlay stand-in that logs what a renderer would draw
struct LogOverlay;

impl OverlayObject for LogOverlay {
    fn set_matrix(&mut self, matrix: &Matrix4<f64>) {
        debug!("Overlay matrix translation [{:.3}, {:.3}, {:.3}]", matrix[(0, 3)], matrix[(1, 3)], matrix[(2, 3)]);
    }

    fn set_visible(&mut self, visible: bool) {
        debug!("Overlay visible: {visible}");
    }
}

/// Result of one replayed frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    pub timestamp_ms: u64,
    pub outcome: FrameOutcome,
}

impl fmt::Display for FrameReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:>6} ms] ", self.timestamp_ms)?;
        match &self.outcome {
            FrameOutcome::Applied(t) => {
                let e = EulerYxz::from_quaternion(&t.orientation);
                write!(
                    f,
                    "pos ({:7.3}, {:7.3}, {:7.3})  yaw {:6.1}  pitch {:6.1}  roll {:6.1}  scale {:.3}",
                    t.position.x,
                    t.position.y,
                    t.position.z,
                    e.yaw.to_degrees(),
                    e.pitch.to_degrees(),
                    e.roll.to_degrees(),
                    t.scale
                )
            }
            FrameOutcome::NoTarget(reason) => write!(f, "hidden ({reason})"),
            FrameOutcome::Dropped => write!(f, "dropped"),
            FrameOutcome::Discarded => write!(f, "discarded"),
            FrameOutcome::Inactive => write!(f, "inactive"),
        }
    }
}

/// Replays a trace through a try-on session
pub struct ReplayApp {
    session: TryOnSession,
    trace: Trace,
}

impl ReplayApp {
    /// Create the replay application
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid
    pub fn new(config: &TryOnConfig, trace: Trace) -> Result<Self> {
        info!(
            "Initializing replay of {} frames ({}x{} source)",
            trace.frames.len(),
            trace.source.width,
            trace.source.height
        );
        let session = TryOnSession::new(config)?;
        Ok(Self { session, trace })
    }

    /// Override the trace's frame-width slider value
    pub fn set_frame_width(&mut self, value: f64) {
        self.trace.frame_width = Some(value);
    }

    /// Run every frame of the trace and stop the session
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot start or a frame is malformed
    pub fn run(&mut self) -> Result<Vec<FrameReport>> {
        let start = Instant::now();
        let at = |ms: u64| start + Duration::from_millis(ms);

        let mut outputs = HashMap::new();
        for frame in &self.trace.frames {
            let output = match &frame.detector_error {
                Some(reason) => Err(reason.clone()),
                None => Ok(frame.detector_output()?),
            };
            if outputs.insert(frame.timestamp_ms, output).is_some() {
                warn!("Duplicate trace timestamp {}", frame.timestamp_ms);
            }
        }
        let mut camera = TraceCamera {
            source: self.trace.source,
        };
        let mut detector = TraceDetector { outputs };

        if let Some(value) = self.trace.frame_width {
            self.session.set_user_adjustment(value);
        }
        self.session.set_device_pixel_ratio(self.trace.pixel_ratio);
        self.session.attach_overlay(Box::new(LogOverlay));
        self.session.on_resize(self.trace.container, start);
        self.session.start(&mut camera, &mut detector, start)?;

        let mut reports = Vec::with_capacity(self.trace.frames.len());
        for frame in &self.trace.frames {
            let now = at(frame.timestamp_ms);
            if let Some(container) = frame.resize {
                self.session.on_resize(container, now);
            }
            self.session.render_tick(now);

            let video_frame = VideoFrame {
                timestamp_ms: frame.timestamp_ms,
                dimensions: self.trace.source,
            };
            let outcome = self.session.process_frame(&mut detector, video_frame, now);
            reports.push(FrameReport {
                timestamp_ms: frame.timestamp_ms,
                outcome,
            });
        }

        let status = self.session.status();
        info!(
            "Replay finished: {} applied, {} dropped",
            status.frames_applied, status.frames_dropped
        );
        self.session.stop();
        Ok(reports)
    }

    pub fn session(&self) -> &TryOnSession {
        &self.session
    }
}
