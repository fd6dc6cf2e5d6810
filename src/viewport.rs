//! Viewport tracking: keeps display size, projection and plane geometry in
//! sync with the container and the video's native resolution.
//!
//! Container resizes arrive in bursts. They are debounced so projection work
//! happens at most once per window, but never lost: a resize that lands inside
//! the window stays pending and is flushed on a later tick.

use crate::config::{TryOnConfig, ViewportConfig};
use crate::coordinate_mapper::{Dimensions, FitMode};
use log::{debug, info};
use std::time::{Duration, Instant};

/// Repeat and offset a renderer applies to a video texture so it shows the
/// same crop (or letterbox) as the on-screen video element
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureCrop {
    pub repeat_x: f64,
    pub repeat_y: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl Default for TextureCrop {
    fn default() -> Self {
        Self {
            repeat_x: 1.0,
            repeat_y: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
        }
    }
}

/// Texture crop for drawing `source` into `display` with `fit_mode`
pub fn texture_crop(source: Dimensions, display: Dimensions, fit_mode: FitMode) -> Option<TextureCrop> {
    let video_aspect = source.aspect()?;
    let canvas_aspect = display.aspect()?;
    let mut crop = TextureCrop::default();

    // Cover samples less than the full texture along the overflowing axis;
    // contain samples more, leaving bars.
    let wider = video_aspect > canvas_aspect;
    let ratio = match (fit_mode, wider) {
        (FitMode::Cover, true) | (FitMode::Contain, false) => canvas_aspect / video_aspect,
        (FitMode::Cover, false) | (FitMode::Contain, true) => video_aspect / canvas_aspect,
    };
    if wider == (fit_mode == FitMode::Cover) {
        crop.repeat_x = ratio;
        crop.offset_x = (1.0 - ratio) / 2.0;
    } else {
        crop.repeat_y = ratio;
        crop.offset_y = (1.0 - ratio) / 2.0;
    }
    Some(crop)
}

/// Position of `width` between the small and large container widths, in `[0, 1]`
pub fn size_factor(width: f64, small_width: f64, large_width: f64) -> f64 {
    ((width - small_width) / (large_width - small_width)).clamp(0.0, 1.0)
}

/// Height of the view frustum at `distance` for a vertical field of view
pub fn plane_height_at_distance(fov_deg: f64, distance: f64) -> f64 {
    2.0 * distance * (fov_deg.to_radians() / 2.0).tan()
}

/// Projection parameters pushed to the renderer after a resync
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionUpdate {
    pub width: f64,
    pub height: f64,
    pub aspect: f64,
    pub fov_deg: f64,
    pub pixel_ratio: f64,
    /// Scene height visible at the display plane's camera distance
    pub visible_height: f64,
}

/// Receiver of projection updates (the external renderer)
pub trait ProjectionSink {
    fn apply_projection(&mut self, update: &ProjectionUpdate);
}

/// Derived viewport geometry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportGeometry {
    pub display: Dimensions,
    /// Native video resolution, once known
    pub source: Option<Dimensions>,
    pub fit_mode: FitMode,
    pub aspect: f64,
    pub plane_width: f64,
    pub plane_height: f64,
    pub fov_deg: f64,
    pub visible_height: f64,
    pub size_factor: f64,
    pub pixel_ratio: f64,
    pub texture_crop: Option<TextureCrop>,
}

impl ViewportGeometry {
    pub fn projection(&self) -> ProjectionUpdate {
        ProjectionUpdate {
            width: self.display.width,
            height: self.display.height,
            aspect: self.aspect,
            fov_deg: self.fov_deg,
            pixel_ratio: self.pixel_ratio,
            visible_height: self.visible_height,
        }
    }
}

/// Adapter lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewportPhase {
    /// Container or source resolution not known yet
    Uninitialized,
    /// Geometry computed with both container and source resolution
    Ready,
}

/// Tracks container and video size and recomputes viewport geometry
pub struct ViewportAdapter {
    config: ViewportConfig,
    fit_mode: FitMode,
    plane_width: f64,
    device_pixel_ratio: f64,
    container: Option<Dimensions>,
    source: Option<Dimensions>,
    pending: Option<Dimensions>,
    last_sync: Option<Instant>,
    settle_deadline: Option<Instant>,
    geometry: Option<ViewportGeometry>,
}

impl ViewportAdapter {
    pub fn new(config: &TryOnConfig) -> Self {
        Self {
            config: config.viewport.clone(),
            fit_mode: config.mapping.fit_mode,
            plane_width: config.mapping.plane_width,
            device_pixel_ratio: 1.0,
            container: None,
            source: None,
            pending: None,
            last_sync: None,
            settle_deadline: None,
            geometry: None,
        }
    }

    pub fn phase(&self) -> ViewportPhase {
        if self.geometry.is_some_and(|g| g.source.is_some()) {
            ViewportPhase::Ready
        } else {
            ViewportPhase::Uninitialized
        }
    }

    pub fn geometry(&self) -> Option<&ViewportGeometry> {
        self.geometry.as_ref()
    }

    /// True while a debounced resize or an orientation resync is outstanding
    pub fn has_pending(&self) -> bool {
        self.pending.is_some() || self.settle_deadline.is_some()
    }

    /// Record the device pixel ratio; applied on the next sync
    pub fn set_device_pixel_ratio(&mut self, ratio: f64) {
        if ratio.is_finite() && ratio > 0.0 {
            self.device_pixel_ratio = ratio;
        }
    }

    /// Container box changed. Applied immediately unless a sync happened
    /// within the debounce window, in which case it waits for `tick`.
    pub fn on_resize(&mut self, container: Dimensions, now: Instant) -> Option<ProjectionUpdate> {
        if !container.is_valid() {
            debug!("Ignoring container size {}x{}", container.width, container.height);
            return None;
        }
        self.pending = Some(container);
        if self.debounce_elapsed(now) {
            self.sync(now)
        } else {
            None
        }
    }

    /// Device orientation changed; the container settles before resyncing
    pub fn on_orientation_change(&mut self, now: Instant) {
        self.settle_deadline = Some(now + Duration::from_millis(self.config.orientation_settle_ms));
    }

    /// Native video resolution became known or changed. Always resyncs.
    pub fn set_source(&mut self, source: Dimensions, now: Instant) -> Option<ProjectionUpdate> {
        if !source.is_valid() {
            debug!("Ignoring source size {}x{}", source.width, source.height);
            return None;
        }
        if self.source != Some(source) {
            info!("Video source resolution {}x{}", source.width, source.height);
        }
        self.source = Some(source);
        self.sync(now)
    }

    /// Flush work whose delay has elapsed; called once per render tick
    pub fn tick(&mut self, now: Instant) -> Option<ProjectionUpdate> {
        if let Some(deadline) = self.settle_deadline {
            if now >= deadline {
                self.settle_deadline = None;
                return self.sync(now);
            }
        }
        if self.pending.is_some() && self.debounce_elapsed(now) {
            return self.sync(now);
        }
        None
    }

    /// Recompute geometry from the latest container and source sizes
    pub fn sync(&mut self, now: Instant) -> Option<ProjectionUpdate> {
        if let Some(pending) = self.pending.take() {
            self.container = Some(pending);
        }
        let display = self.container?;
        let aspect = display.aspect()?;
        self.last_sync = Some(now);

        let c = &self.config;
        let t = size_factor(display.width, c.small_width, c.large_width);
        let fov_deg = c.fov_small_deg + (c.fov_large_deg - c.fov_small_deg) * t;
        let pixel_ratio = self.device_pixel_ratio.min(c.max_pixel_ratio);
        let texture_crop = self.source.and_then(|source| texture_crop(source, display, self.fit_mode));
        let was_ready = self.phase() == ViewportPhase::Ready;

        let geometry = ViewportGeometry {
            display,
            source: self.source,
            fit_mode: self.fit_mode,
            aspect,
            plane_width: self.plane_width,
            plane_height: self.plane_width / aspect,
            fov_deg,
            visible_height: plane_height_at_distance(fov_deg, c.camera_distance),
            size_factor: t,
            pixel_ratio,
            texture_crop,
        };
        self.geometry = Some(geometry);
        if !was_ready && self.phase() == ViewportPhase::Ready {
            info!("Viewport ready: {}x{} (fov {:.1})", display.width, display.height, fov_deg);
        } else {
            debug!("Viewport resync: {}x{} (fov {:.1})", display.width, display.height, fov_deg);
        }
        Some(geometry.projection())
    }

    fn debounce_elapsed(&self, now: Instant) -> bool {
        self.last_sync.map_or(true, |last| {
            now.saturating_duration_since(last) >= Duration::from_millis(self.config.debounce_ms)
        })
    }
}
