//! Try-on session: camera lifecycle, frame pacing and the per-frame pipeline
//! (estimate → smooth → apply).
//!
//! The session is single-threaded and frame-driven. A captured frame is
//! turned into a [`FrameTicket`] by [`TryOnSession::begin_frame`]; the host
//! runs its detector and hands the result back through
//! [`TryOnSession::complete_frame`] (or gives it up through
//! [`TryOnSession::cancel_frame`]). Only one detection is ever in flight;
//! frames arriving meanwhile are dropped, never queued. A detection that is
//! neither completed nor cancelled within the configured timeout is
//! abandoned so a lost ticket cannot stall the session.

use crate::config::TryOnConfig;
use crate::coordinate_mapper::{CoordinateMapper, Dimensions};
use crate::handoff::{PoseHandoff, RenderState};
use crate::landmarks::DetectorOutput;
use crate::overlay::{AssetLoader, AssetState, OverlayDriver, OverlayObject};
use crate::pose_estimation::{Estimate, NoTargetReason, OrientationMode, PoseEstimator};
use crate::smoothing::{PoseFilter, SmootherState};
use crate::transform::RigidTransform;
use crate::viewport::{ProjectionSink, ProjectionUpdate, ViewportAdapter, ViewportPhase};
use crate::{Error, Result};
use log::{debug, info, warn};
use std::time::{Duration, Instant};

/// Landmark detector run by the host for each captured frame
pub trait LandmarkDetector {
    /// Prepare the model; called once per session start
    ///
    /// # Errors
    ///
    /// Returns an error when the detector cannot be initialized
    fn warm_up(&mut self) -> Result<()>;

    /// Detect the first face in `frame`
    ///
    /// # Errors
    ///
    /// Returns an error when detection fails for this frame
    fn detect(&mut self, frame: &VideoFrame) -> Result<DetectorOutput>;
}

/// Live camera stream owned by a running session
pub trait MediaStream: Send {
    /// Native resolution, once the stream reports it
    fn dimensions(&self) -> Option<Dimensions>;

    /// Release the camera hardware
    fn stop(&mut self);
}

/// Source of camera streams
pub trait CameraBackend {
    /// # Errors
    ///
    /// Returns an error when permission is denied or no device is available
    fn acquire(&mut self) -> Result<Box<dyn MediaStream>>;
}

/// One captured video frame, as far as the pipeline is concerned
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoFrame {
    pub timestamp_ms: u64,
    pub dimensions: Dimensions,
}

/// Permission to run one detection, tied to the session run that issued it.
///
/// Hand it back through `complete_frame` or `cancel_frame`; a dropped ticket
/// holds the detection slot until the timeout expires.
#[must_use = "a ticket holds the detection slot until completed or cancelled"]
#[derive(Debug)]
pub struct FrameTicket {
    generation: u64,
    id: u64,
    frame: VideoFrame,
}

/// The detection currently allowed to run
#[derive(Debug, Clone, Copy)]
struct PendingDetection {
    id: u64,
    since: Instant,
}

impl FrameTicket {
    pub fn frame(&self) -> &VideoFrame {
        &self.frame
    }
}

/// What happened to one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameOutcome {
    /// A pose was applied to the overlay
    Applied(RigidTransform),
    /// No pose this frame; the overlay is hidden and smoothing state kept
    NoTarget(NoTargetReason),
    /// A detection was already in flight
    Dropped,
    /// The result belonged to a stopped or restarted run, or arrived after
    /// its detection was abandoned
    Discarded,
    /// The session is not running
    Inactive,
}

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Running,
    Stopped,
}

/// Snapshot for hosts that render status or retry affordances
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub phase: SessionPhase,
    pub asset: AssetState,
    pub viewport: ViewportPhase,
    pub overlay_visible: bool,
    pub frames_applied: u64,
    pub frames_dropped: u64,
    pub last_no_target: Option<NoTargetReason>,
}

/// One try-on session
pub struct TryOnSession {
    mapper: CoordinateMapper,
    estimator: PoseEstimator,
    filter: Box<dyn PoseFilter>,
    viewport: ViewportAdapter,
    overlay: OverlayDriver,
    orientation_mode: OrientationMode,
    user_adjustment: f64,
    stream: Option<Box<dyn MediaStream>>,
    projection_sink: Option<Box<dyn ProjectionSink + Send>>,
    handoff: Option<PoseHandoff>,
    phase: SessionPhase,
    generation: u64,
    in_flight: Option<PendingDetection>,
    next_ticket: u64,
    detection_timeout: Duration,
    applied: Option<RigidTransform>,
    sequence: u64,
    frames_applied: u64,
    frames_dropped: u64,
    last_no_target: Option<NoTargetReason>,
}

impl TryOnSession {
    /// Build a session from a validated configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid
    pub fn new(config: &TryOnConfig) -> Result<Self> {
        config.validate()?;
        let filter = config.create_filter()?;
        info!("Creating try-on session with filter: {}", filter.name());

        Ok(Self {
            mapper: CoordinateMapper::new(&config.mapping),
            estimator: PoseEstimator::new(config),
            filter,
            viewport: ViewportAdapter::new(config),
            overlay: OverlayDriver::new(),
            orientation_mode: config.pose.orientation_mode,
            user_adjustment: config.pose.frame_width_reference,
            stream: None,
            projection_sink: None,
            handoff: None,
            phase: SessionPhase::Idle,
            generation: 0,
            in_flight: None,
            next_ticket: 0,
            detection_timeout: Duration::from_millis(config.session.detection_timeout_ms),
            applied: None,
            sequence: 0,
            frames_applied: 0,
            frames_dropped: 0,
            last_no_target: None,
        })
    }

    /// Publish every applied state to `handoff`
    pub fn with_handoff(mut self, handoff: PoseHandoff) -> Self {
        self.handoff = Some(handoff);
        self
    }

    /// Forward projection updates to `sink`
    pub fn set_projection_sink(&mut self, sink: Box<dyn ProjectionSink + Send>) {
        self.projection_sink = Some(sink);
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        matches!(self.phase, SessionPhase::Running)
    }

    /// Last transform written to the overlay
    pub fn applied(&self) -> Option<&RigidTransform> {
        self.applied.as_ref()
    }

    pub fn mapper(&self) -> &CoordinateMapper {
        &self.mapper
    }

    pub fn viewport(&self) -> &ViewportAdapter {
        &self.viewport
    }

    pub fn overlay(&self) -> &OverlayDriver {
        &self.overlay
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            phase: self.phase,
            asset: self.overlay.state().clone(),
            viewport: self.viewport.phase(),
            overlay_visible: self.overlay.is_visible(),
            frames_applied: self.frames_applied,
            frames_dropped: self.frames_dropped,
            last_no_target: self.last_no_target,
        }
    }

    /// Acquire the camera and warm up the detector.
    ///
    /// On failure nothing stays acquired: a stream obtained before a later
    /// step fails is released immediately.
    ///
    /// # Errors
    ///
    /// Returns `Error::CameraUnavailable` or `Error::DetectorUnavailable`
    pub fn start(
        &mut self,
        camera: &mut dyn CameraBackend,
        detector: &mut dyn LandmarkDetector,
        now: Instant,
    ) -> Result<()> {
        if self.is_running() {
            return Err(Error::SessionError("Session is already running".to_string()));
        }

        let mut stream = camera.acquire().map_err(|e| match e {
            Error::CameraUnavailable(_) => e,
            other => Error::CameraUnavailable(other.to_string()),
        })?;

        if let Err(e) = detector.warm_up() {
            stream.stop();
            warn!("Detector warm-up failed, camera released: {e}");
            return Err(match e {
                Error::DetectorUnavailable(_) => e,
                other => Error::DetectorUnavailable(other.to_string()),
            });
        }

        self.generation += 1;
        self.in_flight = None;
        self.estimator.reset();
        self.filter.reset();
        self.applied = None;
        self.last_no_target = None;

        if let Some(dimensions) = stream.dimensions() {
            self.on_source_resolution(dimensions, now);
        }
        self.stream = Some(stream);
        self.phase = SessionPhase::Running;
        info!("Try-on session started (run {})", self.generation);
        Ok(())
    }

    /// Stop detection, release the camera and hide the overlay.
    ///
    /// Safe to call repeatedly and before any start.
    pub fn stop(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            info!("Camera stream released");
        }
        if self.is_running() {
            self.phase = SessionPhase::Stopped;
            self.generation += 1;
            info!("Try-on session stopped");
        }
        self.in_flight = None;
        self.overlay.hide();
        self.publish();
    }

    /// Set the user's frame-width preference
    pub fn set_user_adjustment(&mut self, value: f64) {
        self.user_adjustment = value;
    }

    pub fn set_device_pixel_ratio(&mut self, ratio: f64) {
        self.viewport.set_device_pixel_ratio(ratio);
    }

    /// Container box changed (debounced)
    pub fn on_resize(&mut self, container: Dimensions, now: Instant) {
        let update = self.viewport.on_resize(container, now);
        self.after_viewport_change(update);
    }

    pub fn on_orientation_change(&mut self, now: Instant) {
        self.viewport.on_orientation_change(now);
    }

    /// Video resolution became known or changed (forces a resync)
    pub fn on_source_resolution(&mut self, source: Dimensions, now: Instant) {
        let update = self.viewport.set_source(source, now);
        self.after_viewport_change(update);
    }

    /// Load the overlay asset; failure is recorded in the status
    pub fn load_asset(&mut self, loader: &mut dyn AssetLoader, source: &str) -> AssetState {
        self.overlay.load(loader, source).clone()
    }

    /// Attach an overlay object loaded by the host
    pub fn attach_overlay(&mut self, object: Box<dyn OverlayObject>) {
        self.overlay.attach(object);
    }

    /// Record an asset failure reported by the host
    pub fn asset_failed(&mut self, reason: String) {
        self.overlay.fail(reason);
    }

    /// Request detection for a captured frame.
    ///
    /// Returns `None` while inactive or while another detection is pending
    /// and has not yet timed out.
    pub fn begin_frame(&mut self, frame: VideoFrame, now: Instant) -> Option<FrameTicket> {
        if !self.is_running() {
            return None;
        }
        if let Some(pending) = self.in_flight {
            let waited = now.saturating_duration_since(pending.since);
            if waited < self.detection_timeout {
                self.frames_dropped += 1;
                debug!("Dropping frame {} (detection in flight)", frame.timestamp_ms);
                return None;
            }
            warn!(
                "Detection {} unfinished after {} ms, abandoning it",
                pending.id,
                waited.as_millis()
            );
        }
        let known = self.viewport.geometry().and_then(|g| g.source);
        if frame.dimensions.is_valid() && known != Some(frame.dimensions) {
            self.on_source_resolution(frame.dimensions, now);
        }
        self.next_ticket += 1;
        self.in_flight = Some(PendingDetection {
            id: self.next_ticket,
            since: now,
        });
        Some(FrameTicket {
            generation: self.generation,
            id: self.next_ticket,
            frame,
        })
    }

    /// Give up a detection without a result, freeing the slot at once
    pub fn cancel_frame(&mut self, ticket: FrameTicket) {
        if self.owns_slot(&ticket) {
            debug!("Detection {} cancelled", ticket.id);
            self.in_flight = None;
        }
    }

    fn owns_slot(&self, ticket: &FrameTicket) -> bool {
        ticket.generation == self.generation && self.in_flight.is_some_and(|pending| pending.id == ticket.id)
    }

    /// Apply a detection result issued for `ticket`
    pub fn complete_frame(
        &mut self,
        ticket: FrameTicket,
        result: Result<DetectorOutput>,
        now: Instant,
    ) -> FrameOutcome {
        if ticket.generation != self.generation || !self.is_running() {
            debug!("Discarding detection for frame {} from a previous run", ticket.frame.timestamp_ms);
            return FrameOutcome::Discarded;
        }
        if !self.owns_slot(&ticket) {
            debug!("Discarding detection {} (abandoned after timeout)", ticket.id);
            return FrameOutcome::Discarded;
        }
        self.in_flight = None;

        let output = match result {
            Ok(output) => output,
            Err(e) => {
                warn!("Detection failed for frame {}: {e}", ticket.frame.timestamp_ms);
                DetectorOutput::default()
            }
        };
        self.apply_detection(&output, now)
    }

    /// Begin, detect and complete a frame with a synchronous detector
    pub fn process_frame(
        &mut self,
        detector: &mut dyn LandmarkDetector,
        frame: VideoFrame,
        now: Instant,
    ) -> FrameOutcome {
        if !self.is_running() {
            return FrameOutcome::Inactive;
        }
        let Some(ticket) = self.begin_frame(frame, now) else {
            return FrameOutcome::Dropped;
        };
        let result = detector.detect(ticket.frame());
        self.complete_frame(ticket, result, now)
    }

    /// Per-display-frame work. Never waits on detection.
    pub fn render_tick(&mut self, now: Instant) -> RenderState {
        if self.is_running() {
            let update = self.viewport.tick(now);
            self.after_viewport_change(update);
        }
        self.render_state()
    }

    /// State a renderer needs for the current frame
    pub fn render_state(&self) -> RenderState {
        RenderState {
            transform: self.applied,
            visible: self.overlay.is_visible(),
            sequence: self.sequence,
        }
    }

    fn apply_detection(&mut self, output: &DetectorOutput, now: Instant) -> FrameOutcome {
        let update = self.viewport.tick(now);
        self.after_viewport_change(update);

        let size_factor = self.viewport.geometry().map_or(0.0, |g| g.size_factor);
        match self
            .estimator
            .estimate(output, &self.mapper, size_factor, self.user_adjustment)
        {
            Estimate::Target(target) => {
                let state = self.filter.apply(&SmootherState::from(&target));
                let transform = match self.orientation_mode {
                    OrientationMode::YawOnly => state.yaw_only_transform(),
                    OrientationMode::Full | OrientationMode::Level => state.transform(),
                };
                self.overlay.show(&transform);
                self.applied = Some(transform);
                self.frames_applied += 1;
                self.last_no_target = None;
                self.publish();
                FrameOutcome::Applied(transform)
            }
            Estimate::NoTarget(NoTargetReason::ViewportNotReady) => {
                debug!("Viewport not ready, frame skipped");
                FrameOutcome::NoTarget(NoTargetReason::ViewportNotReady)
            }
            Estimate::NoTarget(reason) => {
                if self.last_no_target != Some(reason) {
                    debug!("No target: {reason}");
                }
                self.overlay.hide();
                self.last_no_target = Some(reason);
                self.publish();
                FrameOutcome::NoTarget(reason)
            }
        }
    }

    fn after_viewport_change(&mut self, update: Option<ProjectionUpdate>) {
        let Some(update) = update else {
            return;
        };
        if let Some(geometry) = self.viewport.geometry() {
            if let Some(source) = geometry.source {
                self.mapper.update_frame(source, geometry.display);
            }
        }
        if let Some(sink) = self.projection_sink.as_mut() {
            sink.apply_projection(&update);
        }
    }

    fn publish(&mut self) {
        self.sequence += 1;
        if let Some(handoff) = &self.handoff {
            handoff.publish(self.render_state());
        }
    }
}

impl Drop for TryOnSession {
    fn drop(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoCamera;

    impl CameraBackend for NoCamera {
        fn acquire(&mut self) -> Result<Box<dyn MediaStream>> {
            Err(Error::InvalidInput("permission denied".to_string()))
        }
    }

    struct NullDetector;

    impl LandmarkDetector for NullDetector {
        fn warm_up(&mut self) -> Result<()> {
            Ok(())
        }

        fn detect(&mut self, _frame: &VideoFrame) -> Result<DetectorOutput> {
            Ok(DetectorOutput::default())
        }
    }

    #[test]
    fn test_stop_before_start_is_safe() {
        let mut session = TryOnSession::new(&TryOnConfig::default()).unwrap();
        session.stop();
        session.stop();
        assert_eq!(session.phase(), SessionPhase::Idle);
    }

    #[test]
    fn test_camera_failure_is_distinct() {
        let mut session = TryOnSession::new(&TryOnConfig::default()).unwrap();
        let err = session
            .start(&mut NoCamera, &mut NullDetector, Instant::now())
            .unwrap_err();
        assert!(matches!(err, Error::CameraUnavailable(_)));
        assert!(!session.is_running());
    }

    #[test]
    fn test_inactive_session_ignores_frames() {
        let mut session = TryOnSession::new(&TryOnConfig::default()).unwrap();
        let frame = VideoFrame {
            timestamp_ms: 0,
            dimensions: Dimensions::new(640.0, 480.0),
        };
        assert!(session.begin_frame(frame, Instant::now()).is_none());
        assert_eq!(
            session.process_frame(&mut NullDetector, frame, Instant::now()),
            FrameOutcome::Inactive
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = TryOnConfig::default();
        config.smoothing.filter = "kalman".to_string();
        assert!(TryOnSession::new(&config).is_err());
    }
}
