//! Fighter flight: attitude control followed by velocity control, capped by
//! the ship's motion limits.

use bevy::ecs::component::Component;
use na::Matrix3;

use crate::control::{OrientationController, VelocityController};
use crate::error::Result;
use crate::motion::{MotionLimits, MotionState};

/// Fighter flight controller: turn toward the target attitude, then fly the
/// target speed along the new heading.
#[derive(Debug, Clone, Component)]
pub struct ShipController {
    orientation: OrientationController,
    velocity: VelocityController,
    limits: MotionLimits,
}

impl ShipController {
    pub fn new(inertia: Matrix3<f64>, limits: MotionLimits) -> Result<Self> {
        Ok(Self {
            orientation: OrientationController::new(inertia)?,
            velocity: VelocityController::new()?,
            limits,
        })
    }

    pub fn limits(&self) -> &MotionLimits {
        &self.limits
    }

    pub fn update(&mut self, state: &MotionState, target: &MotionState, dt: f64) -> MotionState {
        let turned = self.orientation.update_motion(state, target, dt);
        let next = self.velocity.update(&turned, target, dt);
        self.limits.apply(state, next, dt)
    }
}
