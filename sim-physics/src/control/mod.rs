//! Closed-loop controllers that drive a [`MotionState`](crate::MotionState)
//! toward a target.
//!
//! The leaf controllers each own one aspect of the motion: translation with an
//! LQR gain ([`position`], [`velocity`]) or attitude with a PD law
//! ([`orientation`]). [`ship`] and [`camera`] chain an orientation stage with a
//! translation stage, orientation first, so the translation stage sees the
//! heading that was just produced.

pub mod camera;
pub mod orientation;
pub mod position;
pub mod ship;
pub mod velocity;

pub use camera::CameraController;
pub use orientation::{AttitudeState, OrientationController};
pub use position::PositionController;
pub use ship::ShipController;
pub use velocity::VelocityController;
