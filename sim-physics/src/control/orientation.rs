//! PD attitude control in the world frame.

use bevy::ecs::component::Component;
use bevy::log::warn;
use na::{Matrix3, UnitQuaternion, Vector3};

use crate::error::{Result, SimError};
use crate::motion::{MotionState, exp_quat, renormalized, rotation_error, world_inertia};

pub const DEFAULT_KP: f64 = 150.0;
pub const DEFAULT_KD: f64 = 30.0;

/// Orientation (body -> world) plus world frame angular velocity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttitudeState {
    pub orientation: UnitQuaternion<f64>,
    pub angular_velocity: Vector3<f64>,
}

impl Default for AttitudeState {
    fn default() -> Self {
        Self {
            orientation: UnitQuaternion::identity(),
            angular_velocity: Vector3::zeros(),
        }
    }
}

impl From<&MotionState> for AttitudeState {
    fn from(state: &MotionState) -> Self {
        Self {
            orientation: state.orientation,
            angular_velocity: state.angular_velocity,
        }
    }
}

/// Drives an [`AttitudeState`] toward a goal with a body-axis PD torque law.
///
/// The gains are per body axis and get rotated into the world frame each
/// step, so a fighter keeps its handling whichever way it is pointing.
#[derive(Debug, Clone, Component)]
pub struct OrientationController {
    state: AttitudeState,
    goal: AttitudeState,
    angular_momentum: Vector3<f64>,
    kp: Vector3<f64>,
    kd: Vector3<f64>,
    inertia: Matrix3<f64>,
    inertia_inv: Matrix3<f64>,
}

impl OrientationController {
    /// Controller for a body with the given body-frame inertia and default
    /// gains.
    pub fn new(inertia: Matrix3<f64>) -> Result<Self> {
        Self::with_gains(
            inertia,
            Vector3::repeat(DEFAULT_KP),
            Vector3::repeat(DEFAULT_KD),
        )
    }

    pub fn with_gains(inertia: Matrix3<f64>, kp: Vector3<f64>, kd: Vector3<f64>) -> Result<Self> {
        let inertia_inv = invert_inertia(&inertia)?;
        Ok(Self {
            state: AttitudeState::default(),
            goal: AttitudeState::default(),
            angular_momentum: Vector3::zeros(),
            kp,
            kd,
            inertia,
            inertia_inv,
        })
    }

    pub fn state(&self) -> &AttitudeState {
        &self.state
    }

    pub fn goal(&self) -> &AttitudeState {
        &self.goal
    }

    pub fn angular_momentum(&self) -> &Vector3<f64> {
        &self.angular_momentum
    }

    pub fn inertia(&self) -> &Matrix3<f64> {
        &self.inertia
    }

    pub fn set_state(&mut self, state: AttitudeState) {
        self.state = AttitudeState {
            orientation: renormalized(state.orientation),
            ..state
        };
        self.angular_momentum =
            world_inertia(&self.state.orientation, &self.inertia) * self.state.angular_velocity;
    }

    pub fn set_goal(&mut self, goal: AttitudeState) {
        self.goal = AttitudeState {
            orientation: renormalized(goal.orientation),
            ..goal
        };
    }

    /// Rotate the goal by `delta`, expressed in the goal's own body frame.
    pub fn update_goal(&mut self, delta: &UnitQuaternion<f64>) {
        self.goal.orientation = renormalized(self.goal.orientation * delta);
    }

    /// Advance the controlled attitude by one step of `dt`.
    pub fn update(&mut self, dt: f64) {
        let q = self.state.orientation;
        let w = self.state.angular_velocity;

        let momentum = world_inertia(&q, &self.inertia) * w;

        let q_err = rotation_error(&self.goal.orientation, &q);
        let w_err = self.goal.angular_velocity - w;
        let torque = gains_in_world(&q, &self.kp).component_mul(&q_err)
            + gains_in_world(&q, &self.kd).component_mul(&w_err);

        let q_next = renormalized(exp_quat(&w, dt) * q);
        self.angular_momentum = momentum + torque * dt;
        self.state = AttitudeState {
            orientation: q_next,
            angular_velocity: world_inertia(&q_next, &self.inertia_inv) * self.angular_momentum,
        };
    }

    /// Switch to a new body-frame inertia. A singular or non-finite matrix
    /// is refused and the current one kept.
    pub fn set_inertia(&mut self, inertia: Matrix3<f64>) -> Result<()> {
        self.inertia_inv = invert_inertia(&inertia)?;
        self.inertia = inertia;
        Ok(())
    }

    /// Load `state` and `goal`, take one step, and write the attitude back
    /// into a copy of `state`. The body's inertia comes from
    /// `state.inertia_matrix`.
    pub fn update_motion(&mut self, state: &MotionState, goal: &MotionState, dt: f64) -> MotionState {
        if state.inertia_matrix != self.inertia {
            if let Err(err) = self.set_inertia(state.inertia_matrix) {
                warn!("keeping previous inertia: {}", err);
            }
        }
        self.set_state(state.into());
        self.set_goal(goal.into());
        self.update(dt);

        let mut next = state.clone();
        next.orientation = self.state.orientation;
        next.angular_velocity = self.state.angular_velocity;
        next.angular_momentum = self.angular_momentum;
        next
    }
}

fn invert_inertia(inertia: &Matrix3<f64>) -> Result<Matrix3<f64>> {
    if inertia.iter().any(|x| !x.is_finite()) {
        return Err(SimError::Config("inertia matrix has non-finite entries".into()));
    }
    inertia
        .try_inverse()
        .ok_or_else(|| SimError::Config("inertia matrix is singular".into()))
}

/// Diagonal of `R diag(k) R^T`.
fn gains_in_world(q: &UnitQuaternion<f64>, k: &Vector3<f64>) -> Vector3<f64> {
    world_inertia(q, &Matrix3::from_diagonal(k)).diagonal()
}
