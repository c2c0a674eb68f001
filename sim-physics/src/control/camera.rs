//! Chase camera that follows a target with the same controllers a ship flies
//! with, plus a blended view pose.

use bevy::ecs::component::Component;
use na::{Isometry3, Matrix3, Translation3};

use crate::control::{OrientationController, PositionController};
use crate::error::Result;
use crate::motion::{MotionState, renormalized};

pub const DEFAULT_POS_BLEND: f64 = 0.5;
pub const DEFAULT_QUAT_BLEND: f64 = 0.8;

/// Chase camera: turn toward the target attitude, then track the target
/// position.
#[derive(Debug, Clone, Component)]
pub struct CameraController {
    orientation: OrientationController,
    position: PositionController,
    pub pos_blend_ratio: f64,
    pub quat_blend_ratio: f64,
}

impl CameraController {
    pub fn new() -> Result<Self> {
        Ok(Self {
            orientation: OrientationController::new(Matrix3::identity())?,
            position: PositionController::new()?,
            pos_blend_ratio: DEFAULT_POS_BLEND,
            quat_blend_ratio: DEFAULT_QUAT_BLEND,
        })
    }

    pub fn update(&mut self, state: &MotionState, target: &MotionState, dt: f64) -> MotionState {
        let turned = self.orientation.update_motion(state, target, dt);
        self.position.update(&turned, target, dt)
    }

    /// Pose to render from: the controlled pose pulled part of the way onto
    /// the target, which hides the controller's lag.
    pub fn view_pose(&self, state: &MotionState, target: &MotionState) -> Isometry3<f64> {
        let position = state.position.lerp(&target.position, self.pos_blend_ratio);
        let orientation = state
            .orientation
            .try_slerp(&target.orientation, self.quat_blend_ratio, 1.0e-9)
            .unwrap_or(target.orientation);
        Isometry3::from_parts(Translation3::from(position), renormalized(orientation))
    }
}
