//! Speed control along the body's current heading.

use bevy::ecs::component::Component;
use na::{Matrix1, Matrix2, SMatrix, Vector2};

use crate::error::Result;
use crate::lqr::LqrModel;
use crate::motion::MotionState;

/// State is `[speed, acceleration]` along the heading; the single input is
/// the commanded change of acceleration.
#[derive(Debug, Clone, Component)]
pub struct VelocityController {
    model: LqrModel<2, 1>,
}

impl VelocityController {
    pub fn new() -> Result<Self> {
        Self::with_weights(Matrix2::new(50.0, 0.0, 0.0, 1.0), Matrix1::new(1.0))
    }

    pub fn with_weights(q: Matrix2<f64>, r: Matrix1<f64>) -> Result<Self> {
        let a = Matrix2::new(0.0, 1.0, 0.0, 1.0);
        let b = SMatrix::<f64, 2, 1>::new(0.0, 1.0);
        Ok(Self {
            model: LqrModel::new(a, b, q, r)?,
        })
    }

    pub fn gain(&self) -> &SMatrix<f64, 1, 2> {
        self.model.gain()
    }

    /// One control step toward the goal speed.
    ///
    /// The goal speed is `goal.velocity` projected on `state`'s heading, and
    /// the resulting velocity and acceleration point along that heading.
    pub fn update(&self, state: &MotionState, goal: &MotionState, dt: f64) -> MotionState {
        let heading = state.forward();
        let x = Vector2::new(state.velocity.dot(&heading), state.acceleration.dot(&heading));
        let x_goal = Vector2::new(goal.velocity.dot(&heading), goal.acceleration.dot(&heading));
        let x = self.model.step(&x, &x_goal, dt);

        let mut next = state.clone();
        next.velocity = heading * x[0];
        next.acceleration = heading * x[1];
        next
    }
}
