//! Weapon recharge timing and muzzle cycling.

use bevy::ecs::component::Component;
use bevy::log::warn;
use na::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};

/// How a fighter's lasers are loaded, as read from the fighter description.
///
/// `fire_modes[i]` is the number of shots mode `i` emits per trigger pull and
/// `recharge_times_s[i]` its cooldown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FireControlConfig {
    /// Muzzle positions, body frame.
    pub offsets: Vec<Vector3<f64>>,
    pub fire_modes: Vec<usize>,
    pub recharge_times_s: Vec<f64>,
    /// First muzzle used after switching to each mode. All zero if missing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_indices: Option<Vec<usize>>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FireMode {
    pub start_index: usize,
    pub shots: usize,
    pub recharge_time_s: f64,
}

#[derive(Debug, Clone, Component)]
pub struct FireControl {
    offsets: Vec<Vector3<f64>>,
    modes: Vec<FireMode>,
    current_mode: usize,
    current_offset_index: usize,
    last_fire_time: Option<f64>,
}

impl FireControl {
    pub fn new(offsets: Vec<Vector3<f64>>, modes: Vec<FireMode>) -> Result<Self> {
        if offsets.is_empty() {
            return Err(config_error("no laser offsets"));
        }
        if modes.is_empty() {
            return Err(config_error("no fire modes"));
        }
        for (i, mode) in modes.iter().enumerate() {
            if mode.shots == 0 {
                return Err(config_error(format!("fire mode {} emits no shots", i)));
            }
            if !(mode.recharge_time_s >= 0.0 && mode.recharge_time_s.is_finite()) {
                return Err(config_error(format!(
                    "fire mode {} has invalid recharge time {}",
                    i, mode.recharge_time_s
                )));
            }
            if mode.start_index >= offsets.len() {
                return Err(config_error(format!(
                    "fire mode {} starts at offset {} but there are only {}",
                    i,
                    mode.start_index,
                    offsets.len()
                )));
            }
        }

        let current_offset_index = modes[0].start_index;
        Ok(Self {
            offsets,
            modes,
            current_mode: 0,
            current_offset_index,
            last_fire_time: None,
        })
    }

    pub fn from_config(config: &FireControlConfig) -> Result<Self> {
        if config.fire_modes.len() != config.recharge_times_s.len() {
            return Err(config_error(format!(
                "{} fire modes but {} recharge times",
                config.fire_modes.len(),
                config.recharge_times_s.len()
            )));
        }
        let start_indices = match &config.start_indices {
            Some(indices) if indices.len() != config.fire_modes.len() => {
                return Err(config_error(format!(
                    "{} fire modes but {} start indices",
                    config.fire_modes.len(),
                    indices.len()
                )));
            }
            Some(indices) => indices.clone(),
            None => vec![0; config.fire_modes.len()],
        };

        let modes = config
            .fire_modes
            .iter()
            .zip(&config.recharge_times_s)
            .zip(start_indices)
            .map(|((&shots, &recharge_time_s), start_index)| FireMode {
                start_index,
                shots,
                recharge_time_s,
            })
            .collect();
        Self::new(config.offsets.clone(), modes)
    }

    /// Pull the trigger at time `now_s`.
    ///
    /// Returns the body-frame offsets to spawn lasers at, or `None` while the
    /// current mode is still recharging.
    pub fn fire(&mut self, now_s: f64) -> Option<Vec<Vector3<f64>>> {
        let mode = self.modes[self.current_mode];
        if let Some(last) = self.last_fire_time {
            if now_s < last + mode.recharge_time_s {
                return None;
            }
        }
        self.last_fire_time = Some(now_s);

        let mut dispatches = Vec::with_capacity(mode.shots);
        for _ in 0..mode.shots {
            dispatches.push(self.offsets[self.current_offset_index]);
            self.current_offset_index = (self.current_offset_index + 1) % self.offsets.len();
        }
        Some(dispatches)
    }

    pub fn toggle_fire_mode(&mut self) {
        self.current_mode = (self.current_mode + 1) % self.modes.len();
        self.current_offset_index = self.modes[self.current_mode].start_index;
    }

    pub fn fire_mode(&self) -> usize {
        self.current_mode
    }

    pub fn mode(&self) -> &FireMode {
        &self.modes[self.current_mode]
    }

    pub fn num_modes(&self) -> usize {
        self.modes.len()
    }
}

fn config_error(msg: impl Into<String>) -> SimError {
    let msg = msg.into();
    warn!("rejecting fire control: {}", msg);
    SimError::Config(msg)
}
