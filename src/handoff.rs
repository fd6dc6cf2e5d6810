//! Hand-off of the latest applied pose from the frame loop to a render thread

use crate::transform::RigidTransform;
use nalgebra::Matrix4;
use std::sync::{Arc, Mutex, PoisonError};

/// What the renderer needs to draw the overlay for one frame
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RenderState {
    /// Last applied transform, kept while the overlay is hidden
    pub transform: Option<RigidTransform>,
    pub visible: bool,
    /// Incremented by the session on every state change
    pub sequence: u64,
}

impl RenderState {
    /// Renderer matrix of the applied transform
    pub fn matrix(&self) -> Option<Matrix4<f64>> {
        self.transform.as_ref().map(RigidTransform::to_matrix)
    }
}

/// Single-slot, latest-value-wins channel between the session and a renderer
#[derive(Debug, Clone, Default)]
pub struct PoseHandoff {
    slot: Arc<Mutex<RenderState>>,
}

impl PoseHandoff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the shared state
    pub fn publish(&self, state: RenderState) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Copy of the latest published state
    pub fn latest(&self) -> RenderState {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
