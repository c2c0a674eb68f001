//! Position hold/tracking with a 9-state LQR.
//!
//! Per axis the model is a chain `p' = v, v' = a, a' = u`: the controller
//! commands jerk, and the three axes are stacked as
//! `[position(3), velocity(3), acceleration(3)]`.

use bevy::ecs::component::Component;
use na::{SMatrix, SVector, Vector3};

use crate::error::Result;
use crate::lqr::LqrModel;
use crate::motion::MotionState;

pub const STATE_DIM: usize = 9;
pub const CONTROL_DIM: usize = 3;

type StateVector = SVector<f64, STATE_DIM>;

#[derive(Debug, Clone, Component)]
pub struct PositionController {
    model: LqrModel<STATE_DIM, CONTROL_DIM>,
}

impl PositionController {
    /// Controller with the default tuning.
    pub fn new() -> Result<Self> {
        let mut q = SVector::<f64, STATE_DIM>::repeat(1.0);
        q.fixed_rows_mut::<3>(0).fill(10.0);
        Self::with_weights(
            SMatrix::from_diagonal(&q),
            SMatrix::<f64, CONTROL_DIM, CONTROL_DIM>::identity() * 0.1,
        )
    }

    /// Controller with custom state and input cost weights.
    pub fn with_weights(
        q: SMatrix<f64, STATE_DIM, STATE_DIM>,
        r: SMatrix<f64, CONTROL_DIM, CONTROL_DIM>,
    ) -> Result<Self> {
        let (a, b) = model_matrices();
        Ok(Self {
            model: LqrModel::new(a, b, q, r)?,
        })
    }

    pub fn gain(&self) -> &SMatrix<f64, CONTROL_DIM, STATE_DIM> {
        self.model.gain()
    }

    /// One control step toward `goal`'s position, velocity and acceleration.
    ///
    /// Everything but the translational state is carried over from `state`.
    pub fn update(&self, state: &MotionState, goal: &MotionState, dt: f64) -> MotionState {
        let x = stack(&state.position, &state.velocity, &state.acceleration);
        let x_goal = stack(&goal.position, &goal.velocity, &goal.acceleration);
        let x = self.model.step(&x, &x_goal, dt);

        let mut next = state.clone();
        next.position = x.fixed_rows::<3>(0).into_owned();
        next.velocity = x.fixed_rows::<3>(3).into_owned();
        next.acceleration = x.fixed_rows::<3>(6).into_owned();
        next
    }
}

fn stack(p: &Vector3<f64>, v: &Vector3<f64>, a: &Vector3<f64>) -> StateVector {
    let mut x = StateVector::zeros();
    x.fixed_rows_mut::<3>(0).copy_from(p);
    x.fixed_rows_mut::<3>(3).copy_from(v);
    x.fixed_rows_mut::<3>(6).copy_from(a);
    x
}

fn model_matrices() -> (
    SMatrix<f64, STATE_DIM, STATE_DIM>,
    SMatrix<f64, STATE_DIM, CONTROL_DIM>,
) {
    let mut a = SMatrix::<f64, STATE_DIM, STATE_DIM>::zeros();
    let mut b = SMatrix::<f64, STATE_DIM, CONTROL_DIM>::zeros();
    for axis in 0..3 {
        a[(axis, 3 + axis)] = 1.0;
        a[(3 + axis, 6 + axis)] = 1.0;
        b[(6 + axis, axis)] = 1.0;
    }
    (a, b)
}
