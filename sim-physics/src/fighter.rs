//! Static description of a fighter type and the runtime parts built from it.

use na::{Matrix3, Matrix3xX, Vector3};
use serde::{Deserialize, Serialize};

use crate::collision::{CollisionShape, GeometryData};
use crate::combat::LaserConfig;
use crate::control::ShipController;
use crate::error::{Result, SimError};
use crate::fire::{FireControl, FireControlConfig};
use crate::motion::MotionLimits;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FighterConfig {
    pub name: String,
    /// Body frame inertia, row major.
    #[serde(default = "identity_rows")]
    pub inertia: [[f64; 3]; 3],
    #[serde(default)]
    pub limits: MotionLimits,
    pub fire_control: FireControlConfig,
    #[serde(default)]
    pub laser: LaserConfig,
    pub geometry: GeometryData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hull_points: Option<Vec<[f64; 3]>>,
    #[serde(default = "default_health")]
    pub health: f64,
}

fn identity_rows() -> [[f64; 3]; 3] {
    [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]
}

fn default_health() -> f64 {
    100.0
}

/// Everything a fighter entity needs, built and validated from a
/// [`FighterConfig`].
#[derive(Debug, Clone)]
pub struct FighterParts {
    pub inertia: Matrix3<f64>,
    pub controller: ShipController,
    pub fire_control: FireControl,
    pub shape: CollisionShape,
    pub hull_points: Option<Matrix3xX<f64>>,
}

impl FighterConfig {
    pub fn inertia_matrix(&self) -> Matrix3<f64> {
        Matrix3::from_fn(|r, c| self.inertia[r][c])
    }

    pub fn build(&self) -> Result<FighterParts> {
        let inertia = self.inertia_matrix();
        if (inertia - inertia.transpose()).abs().max() > 1e-9 {
            return Err(SimError::Config(format!(
                "{}: inertia matrix is not symmetric",
                self.name
            )));
        }
        if inertia.cholesky().is_none() {
            return Err(SimError::Config(format!(
                "{}: inertia matrix is not positive definite",
                self.name
            )));
        }
        if !(self.health > 0.0) {
            return Err(SimError::Config(format!("{}: health must be positive", self.name)));
        }

        let hull_points = self.hull_points.as_ref().map(|points| {
            let columns: Vec<Vector3<f64>> = points.iter().map(|p| Vector3::from(*p)).collect();
            Matrix3xX::from_columns(&columns)
        });

        Ok(FighterParts {
            inertia,
            controller: ShipController::new(inertia, self.limits)?,
            fire_control: FireControl::from_config(&self.fire_control)?,
            shape: CollisionShape::from_geometry(&self.geometry)?,
            hull_points,
        })
    }
}
