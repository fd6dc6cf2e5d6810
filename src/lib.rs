//! Landmark-driven pose engine for real-time virtual eyewear try-on.
//!
//! The crate turns per-frame face landmarks from an external detector into a
//! smoothed rigid transform for a 3D overlay drawn by an external renderer:
//! 1. Coordinate mapping from video-source pixels to display pixels to world
//!    space, matching how the video is fitted on screen
//! 2. Pose estimation: anchor-based position, an orthonormal orientation
//!    basis and a distance-independent scale
//! 3. Temporal smoothing against the previously applied pose
//! 4. Viewport tracking and overlay application
//!
//! Detector, camera, renderer and asset loader stay outside, behind the traits
//! in [`session`], [`overlay`] and [`viewport`].
//!
//! # Examples
//!
//! ```no_run
//! use std::time::Instant;
//! use virtual_try_on::{
//!     config::TryOnConfig,
//!     coordinate_mapper::Dimensions,
//!     session::{CameraBackend, LandmarkDetector, TryOnSession, VideoFrame},
//! };
//!
//! # fn run(camera: &mut dyn CameraBackend, detector: &mut dyn LandmarkDetector) -> virtual_try_on::Result<()> {
//! let mut session = TryOnSession::new(&TryOnConfig::default())?;
//! session.on_resize(Dimensions::new(800.0, 450.0), Instant::now());
//! session.start(camera, detector, Instant::now())?;
//!
//! let frame = VideoFrame { timestamp_ms: 0, dimensions: Dimensions::new(1280.0, 720.0) };
//! let outcome = session.process_frame(detector, frame, Instant::now());
//! println!("{outcome:?}");
//!
//! session.stop();
//! # Ok(())
//! # }
//! ```

/// Error types and result handling
pub mod error;

/// Constants used throughout the pipeline
pub mod constants;

/// Configuration management
pub mod config;

/// Landmark sets, anatomical anchors and detector output
pub mod landmarks;

/// Rigid transforms and rotation helpers
pub mod transform;

/// Source → display → world coordinate mapping
pub mod coordinate_mapper;

/// Target pose estimation from landmarks or a head matrix
pub mod pose_estimation;

/// Temporal smoothing filters
pub mod smoothing;

/// Viewport and projection tracking
pub mod viewport;

/// Overlay object driver
pub mod overlay;

/// Cross-thread hand-off of the applied pose
pub mod handoff;

/// Session lifecycle and per-frame pipeline
pub mod session;

/// Trace replay application
pub mod app;

pub use error::{Error, Result};
