//! Scenario description, read once at startup.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use bevy::prelude::*;
use na::Vector3;
use serde::{Deserialize, Serialize};
use sim_physics::FighterConfig;

pub const DEFAULT_SCENARIO: &str = "assets/scenario.json";

#[derive(Resource, Clone, Debug, Serialize, Deserialize)]
pub struct Scenario {
    /// Fighter types, by name.
    pub fighters: BTreeMap<String, FighterConfig>,
    pub actors: Vec<ActorSpawn>,
    #[serde(default)]
    pub camera: ChaseCamera,
}

/// One fighter placed in the scene.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActorSpawn {
    pub fighter: String,
    #[serde(default)]
    pub player: bool,
    pub position: Vector3<f64>,
    /// Heading about world +Z, degrees.
    #[serde(default)]
    pub yaw_deg: f64,
    #[serde(default)]
    pub speed: f64,
    /// Waypoints for computer-flown fighters; ignored for the player.
    #[serde(default)]
    pub patrol: Vec<Vector3<f64>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ChaseCamera {
    /// Where the camera sits relative to the player, player body frame.
    pub offset: Vector3<f64>,
}

impl Default for ChaseCamera {
    fn default() -> Self {
        Self {
            offset: Vector3::new(-25.0, 0.0, 6.0),
        }
    }
}

impl Scenario {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("loading scenario {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let scenario: Scenario = serde_json::from_str(text).context("parsing scenario JSON")?;
        scenario.validate()?;
        Ok(scenario)
    }

    fn validate(&self) -> Result<()> {
        for (i, actor) in self.actors.iter().enumerate() {
            if !self.fighters.contains_key(&actor.fighter) {
                bail!("actor {} uses unknown fighter type '{}'", i, actor.fighter);
            }
        }
        let players = self.actors.iter().filter(|a| a.player).count();
        if players > 1 {
            bail!("{} actors are marked as the player, expected at most one", players);
        }
        Ok(())
    }

    pub fn fighter(&self, name: &str) -> Option<&FighterConfig> {
        self.fighters.get(name)
    }
}
