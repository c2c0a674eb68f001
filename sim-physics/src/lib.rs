//! Rigid body motion, flight control and collision for the starfighter sim.
//!
//! Frames are Z-up and right handed, with body +X as the nose. Everything runs
//! on a fixed step; controller gains are solved once when a controller is
//! built, never per step.

extern crate nalgebra as na;

pub mod collision;
pub mod combat;
pub mod control;
pub mod error;
pub mod fighter;
pub mod fire;
pub mod linalg;
pub mod lqr;
pub mod motion;

pub use error::{Result, SimError};
pub use fighter::{FighterConfig, FighterParts};
pub use fire::{FireControl, FireControlConfig, FireMode};
pub use motion::{MotionLimits, MotionState};
