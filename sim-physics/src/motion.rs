//! Kinematic state of a rigid body and its fixed-step integrator.
//!
//! Conventions: Z-up, right handed, body +X is the nose. All vectors are in
//! the world frame except the inertia matrix, which is body frame with the
//! center of mass at the body origin.

use bevy::ecs::component::Component;
use na::{Isometry3, Matrix3, Rotation3, Translation3, Unit, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Nose direction in the body frame.
pub fn body_forward() -> Vector3<f64> {
    Vector3::x()
}

/// Rates below this are treated as "not rotating".
const MIN_RATE: f64 = 1e-10;

#[derive(Debug, Clone, PartialEq, Component, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionState {
    pub position: Vector3<f64>,
    /// Orientation: body -> world
    pub orientation: UnitQuaternion<f64>,
    pub velocity: Vector3<f64>,
    pub acceleration: Vector3<f64>,
    pub angular_velocity: Vector3<f64>,
    pub angular_momentum: Vector3<f64>,
    /// Body frame inertia.
    pub inertia_matrix: Matrix3<f64>,
}

impl Default for MotionState {
    fn default() -> Self {
        Self {
            position: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
            velocity: Vector3::zeros(),
            acceleration: Vector3::zeros(),
            angular_velocity: Vector3::zeros(),
            angular_momentum: Vector3::zeros(),
            inertia_matrix: Matrix3::identity(),
        }
    }
}

impl MotionState {
    /// A body at rest at the given pose.
    pub fn at_rest(position: Vector3<f64>, orientation: UnitQuaternion<f64>) -> Self {
        Self {
            position,
            orientation,
            ..Default::default()
        }
    }

    pub fn with_inertia(mut self, inertia_matrix: Matrix3<f64>) -> Self {
        self.inertia_matrix = inertia_matrix;
        self.angular_momentum = self.world_inertia() * self.angular_velocity;
        self
    }

    pub fn pose(&self) -> Isometry3<f64> {
        Isometry3::from_parts(Translation3::from(self.position), self.orientation)
    }

    /// The nose direction in the world frame.
    pub fn forward(&self) -> Vector3<f64> {
        self.orientation * body_forward()
    }

    pub fn world_inertia(&self) -> Matrix3<f64> {
        world_inertia(&self.orientation, &self.inertia_matrix)
    }

    /// Advance by one fixed step.
    ///
    /// Position is extrapolated with the velocity from *before* the step, then
    /// velocity takes the acceleration, then the orientation is rotated by the
    /// angular velocity. Angular velocity and momentum are left to the
    /// controllers.
    pub fn integrate(&self, dt: f64) -> Self {
        let mut next = self.clone();
        next.position += self.velocity * dt;
        next.velocity += self.acceleration * dt;
        next.orientation = renormalized(exp_quat(&self.angular_velocity, dt) * self.orientation);
        next
    }
}

/// Incremental rotation for spinning at `w` (rad/s, world frame) for `dt`.
///
/// Returns identity when `w` is too small to have a defined axis.
pub fn exp_quat(w: &Vector3<f64>, dt: f64) -> UnitQuaternion<f64> {
    let rate = w.norm();
    if rate < MIN_RATE {
        UnitQuaternion::identity()
    } else {
        UnitQuaternion::from_axis_angle(&Unit::new_unchecked(w / rate), rate * dt)
    }
}

/// Re-project onto the unit sphere to stop drift from accumulating.
pub fn renormalized(q: UnitQuaternion<f64>) -> UnitQuaternion<f64> {
    UnitQuaternion::new_normalize(q.into_inner())
}

/// `R I R^T` for the rotation `q`.
pub fn world_inertia(q: &UnitQuaternion<f64>, inertia_body: &Matrix3<f64>) -> Matrix3<f64> {
    let r = q.to_rotation_matrix().into_inner();
    r * inertia_body * r.transpose()
}

/// Rotation vector (axis * angle) that takes `from` onto `to` in the world
/// frame, i.e. the angle-axis of `to * from^-1`, taken along the short arc.
pub fn rotation_error(to: &UnitQuaternion<f64>, from: &UnitQuaternion<f64>) -> Vector3<f64> {
    let mut q = (to * from.inverse()).into_inner();
    if q.w < 0.0 {
        q = -q;
    }
    let v = q.imag();
    let s = v.norm();
    if s < MIN_RATE {
        // Small angle: angle ~ 2 s, axis ~ v / s.
        return v * 2.0;
    }
    v * (2.0 * s.atan2(q.w) / s)
}

/// Orientation whose nose (body +X) points along `forward` with body +Z as
/// close to `up` as possible.
///
/// Falls back to an arbitrary perpendicular up when `forward` is parallel to
/// `up`. Returns `None` for a zero `forward`.
pub fn look_along(forward: &Vector3<f64>, up: &Vector3<f64>) -> Option<UnitQuaternion<f64>> {
    let x = forward.try_normalize(MIN_RATE)?;
    let mut z = up - x * up.dot(&x);
    if z.norm_squared() < 1e-12 {
        z = any_orthonormal_vector(&x);
    }
    let z = z.normalize();
    let y = z.cross(&x);
    let r = Matrix3::from_columns(&[x, y, z]);
    Some(UnitQuaternion::from_rotation_matrix(
        &Rotation3::from_matrix_unchecked(r),
    ))
}

/// Some unit vector perpendicular to `v`, crossing with the axis `v` is least
/// aligned with.
fn any_orthonormal_vector(v: &Vector3<f64>) -> Vector3<f64> {
    let a = v.abs();
    let axis = if a.x <= a.y && a.x <= a.z {
        Vector3::x()
    } else if a.y <= a.z {
        Vector3::y()
    } else {
        Vector3::z()
    };
    v.cross(&axis).normalize()
}

/// Scale `v` down to `limit` if it is longer, keeping its direction.
pub fn clamp_norm(v: Vector3<f64>, limit: f64) -> Vector3<f64> {
    let norm = v.norm();
    if norm > limit && norm > 0.0 {
        v * (limit / norm)
    } else {
        v
    }
}

/// Per-vector magnitude limits for a fighter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionLimits {
    pub velocity: Option<f64>,
    pub acceleration: Option<f64>,
    pub angular_velocity: Option<f64>,
    pub angular_acceleration: Option<f64>,
}

impl MotionLimits {
    /// Clamp `next`, the result of a step of length `dt` from `previous`.
    ///
    /// Each vector is limited independently. The angular acceleration limit
    /// applies to the change of angular velocity over the step, and angular
    /// momentum follows whatever angular velocity survives.
    pub fn apply(&self, previous: &MotionState, mut next: MotionState, dt: f64) -> MotionState {
        if let Some(limit) = self.velocity {
            next.velocity = clamp_norm(next.velocity, limit);
        }
        if let Some(limit) = self.acceleration {
            next.acceleration = clamp_norm(next.acceleration, limit);
        }

        let mut w = next.angular_velocity;
        if let Some(limit) = self.angular_acceleration {
            if dt > 0.0 {
                let alpha = clamp_norm((w - previous.angular_velocity) / dt, limit);
                w = previous.angular_velocity + alpha * dt;
            }
        }
        if let Some(limit) = self.angular_velocity {
            w = clamp_norm(w, limit);
        }
        if w != next.angular_velocity {
            next.angular_velocity = w;
            next.angular_momentum = next.world_inertia() * w;
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use std::f64::consts::FRAC_PI_2;

    const DT: f64 = 1.0 / 60.0;

    #[test]
    fn zero_motion_is_a_fixed_point() {
        let state = MotionState::at_rest(
            Vector3::new(1.0, -2.0, 3.0),
            UnitQuaternion::from_euler_angles(0.1, 0.2, 0.3),
        );
        let next = state.integrate(DT);
        assert_eq!(next.position, state.position);
        assert_abs_diff_eq!(next.orientation, state.orientation, epsilon = 1e-12);
        assert_eq!(next.velocity, state.velocity);
    }

    #[test]
    fn position_uses_velocity_from_before_the_step() {
        let state = MotionState {
            velocity: Vector3::new(1.0, 0.0, 0.0),
            acceleration: Vector3::new(10.0, 0.0, 0.0),
            ..Default::default()
        };
        let next = state.integrate(0.5);
        assert_relative_eq!(next.position.x, 0.5);
        assert_relative_eq!(next.velocity.x, 6.0);
    }

    #[test]
    fn spin_rotates_on_the_left() {
        let state = MotionState {
            orientation: UnitQuaternion::from_axis_angle(&Vector3::x_axis(), FRAC_PI_2),
            angular_velocity: Vector3::new(0.0, 0.0, FRAC_PI_2),
            ..Default::default()
        };
        let next = state.integrate(1.0);

        // World-frame yaw applied after the body roll.
        let expected = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), FRAC_PI_2)
            * UnitQuaternion::from_axis_angle(&Vector3::x_axis(), FRAC_PI_2);
        assert_abs_diff_eq!(next.orientation, expected, epsilon = 1e-12);
        assert_abs_diff_eq!(next.forward(), Vector3::y(), epsilon = 1e-12);
    }

    #[test]
    fn orientation_stays_normalized() {
        let rates = [
            Vector3::zeros(),
            Vector3::new(1e-14, 0.0, 0.0),
            Vector3::new(3.0, -7.0, 11.0),
            Vector3::new(0.0, 250.0, 0.0),
        ];
        for w in rates {
            let mut state = MotionState {
                angular_velocity: w,
                ..Default::default()
            };
            for _ in 0..1000 {
                state = state.integrate(DT);
            }
            assert_abs_diff_eq!(state.orientation.quaternion().norm(), 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn exp_quat_guards_zero_rate() {
        assert_eq!(exp_quat(&Vector3::zeros(), DT), UnitQuaternion::identity());
    }

    #[test]
    fn rotation_error_takes_the_short_arc() {
        let from = UnitQuaternion::identity();
        let to = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.3);
        assert_abs_diff_eq!(
            rotation_error(&to, &from),
            Vector3::new(0.0, 0.0, 0.3),
            epsilon = 1e-12
        );

        // Same rotation with the quaternion sign flipped.
        let flipped = UnitQuaternion::new_unchecked(-to.into_inner());
        assert_abs_diff_eq!(
            rotation_error(&flipped, &from),
            Vector3::new(0.0, 0.0, 0.3),
            epsilon = 1e-12
        );

        assert_abs_diff_eq!(rotation_error(&to, &to), Vector3::zeros(), epsilon = 1e-12);
    }

    #[test]
    fn look_along_points_the_nose() {
        let dir = Vector3::new(1.0, 1.0, 0.5);
        let q = look_along(&dir, &Vector3::z()).unwrap();
        assert_abs_diff_eq!(q * Vector3::x(), dir.normalize(), epsilon = 1e-12);
        // Wings stay level.
        assert_abs_diff_eq!((q * Vector3::y()).z, 0.0, epsilon = 1e-12);
        assert!((q * Vector3::z()).z > 0.0);

        let straight_up = look_along(&Vector3::z(), &Vector3::z()).unwrap();
        assert_abs_diff_eq!(straight_up * Vector3::x(), Vector3::z(), epsilon = 1e-12);
        assert!(look_along(&Vector3::zeros(), &Vector3::z()).is_none());
    }

    #[test]
    fn velocity_limit_rescales_to_exactly_the_limit() {
        let v = Vector3::new(60.0, 80.0, 0.0);
        let clamped = clamp_norm(v, 10.0);
        assert_relative_eq!(clamped.norm(), 10.0, epsilon = 1e-12);
        assert_abs_diff_eq!(clamped.normalize(), v.normalize(), epsilon = 1e-12);

        let small = Vector3::new(1.0, 0.0, 0.0);
        assert_eq!(clamp_norm(small, 10.0), small);
    }

    #[test]
    fn limits_apply_independently() {
        let limits = MotionLimits {
            velocity: Some(10.0),
            acceleration: None,
            angular_velocity: Some(1.0),
            angular_acceleration: None,
        };
        let previous = MotionState::default();
        let next = MotionState {
            velocity: Vector3::new(0.0, 100.0, 0.0),
            acceleration: Vector3::new(0.0, 0.0, 500.0),
            angular_velocity: Vector3::new(0.0, 0.0, 4.0),
            angular_momentum: Vector3::new(0.0, 0.0, 4.0),
            ..Default::default()
        };
        let clamped = limits.apply(&previous, next, DT);

        assert_relative_eq!(clamped.velocity.norm(), 10.0);
        assert_relative_eq!(clamped.acceleration.z, 500.0);
        assert_relative_eq!(clamped.angular_velocity.z, 1.0);
        assert_relative_eq!(clamped.angular_momentum.z, 1.0);
    }

    #[test]
    fn angular_acceleration_limit_bounds_rate_change() {
        let limits = MotionLimits {
            angular_acceleration: Some(6.0),
            ..Default::default()
        };
        let previous = MotionState::default();
        let next = MotionState {
            angular_velocity: Vector3::new(1.0, 0.0, 0.0),
            ..Default::default()
        };
        let clamped = limits.apply(&previous, next, DT);
        assert_relative_eq!(clamped.angular_velocity.x, 6.0 * DT, epsilon = 1e-12);
    }

    #[test]
    fn deserializes_with_defaults() {
        let state: MotionState = serde_json::from_str(r#"{"position": [1.0, 2.0, 3.0]}"#).unwrap();
        assert_eq!(state.position, Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(state.orientation, UnitQuaternion::identity());
        assert_eq!(state.inertia_matrix, Matrix3::identity());
    }
}
