//! Overlay driver: owns the renderable eyewear object and writes the applied
//! pose onto it.

use crate::transform::RigidTransform;
use crate::Result;
use log::{info, warn};
use nalgebra::Matrix4;

/// Renderable object drawn by an external engine
pub trait OverlayObject: Send {
    /// Replace the object's world matrix (column-major `T * R * S`)
    fn set_matrix(&mut self, matrix: &Matrix4<f64>);

    fn set_visible(&mut self, visible: bool);
}

/// Loads the 3D asset and wraps it as an overlay object
pub trait AssetLoader {
    /// # Errors
    ///
    /// Returns an error when the asset cannot be fetched or decoded
    fn load(&mut self, source: &str) -> Result<Box<dyn OverlayObject>>;
}

/// Asset lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetState {
    Loading,
    Ready,
    Failed(String),
}

/// Applies smoothed transforms to the overlay object
pub struct OverlayDriver {
    state: AssetState,
    object: Option<Box<dyn OverlayObject>>,
    visible: bool,
    last_matrix: Option<Matrix4<f64>>,
}

impl Default for OverlayDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl OverlayDriver {
    pub fn new() -> Self {
        Self {
            state: AssetState::Loading,
            object: None,
            visible: false,
            last_matrix: None,
        }
    }

    pub fn state(&self) -> &AssetState {
        &self.state
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Matrix most recently written to the object
    pub fn last_matrix(&self) -> Option<&Matrix4<f64>> {
        self.last_matrix.as_ref()
    }

    /// Load the asset through `loader`. A failure is recorded, not returned:
    /// the frame loop keeps running without an overlay.
    pub fn load(&mut self, loader: &mut dyn AssetLoader, source: &str) -> &AssetState {
        self.state = AssetState::Loading;
        match loader.load(source) {
            Ok(object) => self.attach(object),
            Err(e) => self.fail(e.to_string()),
        }
        &self.state
    }

    /// Take ownership of a loaded object; it starts hidden
    pub fn attach(&mut self, mut object: Box<dyn OverlayObject>) {
        object.set_visible(false);
        self.object = Some(object);
        self.visible = false;
        self.state = AssetState::Ready;
        info!("Overlay asset ready");
    }

    /// Record an asset load failure
    pub fn fail(&mut self, reason: String) {
        warn!("Overlay asset failed to load: {reason}");
        self.object = None;
        self.visible = false;
        self.state = AssetState::Failed(reason);
    }

    /// Write `transform` to the object and show it.
    ///
    /// Returns false when there is no object to drive.
    pub fn show(&mut self, transform: &RigidTransform) -> bool {
        let Some(object) = self.object.as_mut() else {
            return false;
        };
        let matrix = transform.to_matrix();
        object.set_matrix(&matrix);
        if !self.visible {
            object.set_visible(true);
            self.visible = true;
        }
        self.last_matrix = Some(matrix);
        true
    }

    /// Hide the object, keeping its last matrix
    pub fn hide(&mut self) {
        if let (Some(object), true) = (self.object.as_mut(), self.visible) {
            object.set_visible(false);
        }
        self.visible = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use nalgebra::{UnitQuaternion, Vector3};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorded {
        matrices: Vec<Matrix4<f64>>,
        visibility: Vec<bool>,
    }

    struct RecordingObject(Arc<Mutex<Recorded>>);

    impl OverlayObject for RecordingObject {
        fn set_matrix(&mut self, matrix: &Matrix4<f64>) {
            self.0.lock().unwrap().matrices.push(*matrix);
        }

        fn set_visible(&mut self, visible: bool) {
            self.0.lock().unwrap().visibility.push(visible);
        }
    }

    struct FailingLoader;

    impl AssetLoader for FailingLoader {
        fn load(&mut self, source: &str) -> Result<Box<dyn OverlayObject>> {
            Err(Error::AssetLoad(format!("{source}: 404")))
        }
    }

    fn transform() -> RigidTransform {
        RigidTransform::new(Vector3::new(1.0, 2.0, -6.0), UnitQuaternion::identity(), 2.0)
    }

    #[test]
    fn test_show_without_asset_is_noop() {
        let mut driver = OverlayDriver::new();
        assert!(!driver.show(&transform()));
        assert!(!driver.is_visible());
        assert_eq!(driver.state(), &AssetState::Loading);
    }

    #[test]
    fn test_show_writes_matrix_and_toggles_visibility_once() {
        let record = Arc::new(Mutex::new(Recorded::default()));
        let mut driver = OverlayDriver::new();
        driver.attach(Box::new(RecordingObject(Arc::clone(&record))));
        assert!(driver.show(&transform()));
        assert!(driver.show(&transform()));
        driver.hide();
        driver.hide();

        let record = record.lock().unwrap();
        assert_eq!(record.matrices.len(), 2);
        assert_eq!(record.matrices[0], transform().to_matrix());
        assert_eq!(record.visibility, vec![false, true, false]);
    }

    #[test]
    fn test_load_failure_is_recorded() {
        let mut driver = OverlayDriver::new();
        let state = driver.load(&mut FailingLoader, "frames.glb").clone();
        assert!(matches!(state, AssetState::Failed(ref reason) if reason.contains("404")));
        assert!(!driver.show(&transform()));
    }
}
