//! A small space-combat sandbox on top of `sim-physics`.
//!
//! Notably, the simulation is Z-up right handed with the nose along body +X;
//! only the rendering side converts to bevy's Y-up frame.

// Recommended alias.
extern crate nalgebra as na;

use anyhow::Result;
use bevy::prelude::*;

mod config;
mod flight;
mod ui;
mod weapons;

use config::{DEFAULT_SCENARIO, Scenario};

/// Simulation rate. Controller tuning assumes this step.
const SIM_HZ: f64 = 60.0;

/// Phases of one fixed step, in order.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum SimSet {
    Integrate,
    Control,
    Fire,
    Collide,
    Prune,
}

fn main() -> Result<()> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_SCENARIO.to_string());
    let scenario = Scenario::load(&path)?;

    App::new()
        .add_plugins(DefaultPlugins)
        .insert_resource(Time::<Fixed>::from_hz(SIM_HZ))
        .insert_resource(scenario)
        .configure_sets(
            FixedUpdate,
            (
                SimSet::Integrate,
                SimSet::Control,
                SimSet::Fire,
                SimSet::Collide,
                SimSet::Prune,
            )
                .chain(),
        )
        .add_plugins((flight::FlightPlugin, weapons::WeaponsPlugin, ui::UIPlugin))
        .run();

    Ok(())
}
