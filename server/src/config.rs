//! Tunable game parameters.
//!
//! Every field has a default, so a config file only needs the keys it wants to
//! change. Values are validated once at load time; the rest of the server
//! trusts them.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// How a match resolves deploys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum MatchMode {
    /// Continuous play: troops persist and attack on their own cadence.
    #[default]
    Realtime,
    /// Strict alternation: each deploy is one immediate attack.
    TurnBased,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub mode: MatchMode,
    pub tick_interval_ms: u64,
    pub troop_attack_interval_ms: u64,
    pub match_duration_secs: u64,
    pub heartbeat_interval_secs: u64,
    pub max_players: usize,

    pub mana_cap: u32,
    pub initial_mana: u32,
    pub crit_chance: f64,
    pub crit_multiplier: f64,

    pub healer_troop: String,
    pub heal_amount: i32,

    pub king_exp: u32,
    pub princess_exp: u32,
    pub guard_exp: u32,
    pub cannon_exp: u32,
    pub win_exp: u32,
    pub loss_exp: u32,
    pub draw_exp: u32,

    pub initial_next_level: u32,
    pub initial_multiplier: f64,

    pub guard_tower: String,
    pub king_tower: String,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            mode: MatchMode::Realtime,
            tick_interval_ms: 1000,
            troop_attack_interval_ms: 2000,
            match_duration_secs: 180,
            heartbeat_interval_secs: 5,
            max_players: 10,
            mana_cap: 10,
            initial_mana: 10,
            crit_chance: 0.1,
            crit_multiplier: 1.2,
            healer_troop: "queen".to_string(),
            heal_amount: 300,
            king_exp: 200,
            princess_exp: 150,
            guard_exp: 100,
            cannon_exp: 50,
            win_exp: 30,
            loss_exp: 5,
            draw_exp: 10,
            initial_next_level: 100,
            initial_multiplier: 1.0,
            guard_tower: "guard_tower".to_string(),
            king_tower: "king_tower".to_string(),
        }
    }
}

impl GameConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)?;
        let config: GameConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| -> Result<(), ConfigError> {
            Err(ConfigError::Invalid(reason.to_string()))
        };

        if self.tick_interval_ms == 0 {
            return invalid("tick_interval_ms must be positive");
        }
        if self.troop_attack_interval_ms == 0 {
            return invalid("troop_attack_interval_ms must be positive");
        }
        if self.match_duration_secs == 0 {
            return invalid("match_duration_secs must be positive");
        }
        if self.heartbeat_interval_secs == 0 {
            return invalid("heartbeat_interval_secs must be positive");
        }
        if self.max_players < 2 {
            return invalid("max_players must allow at least one pair");
        }
        if self.mana_cap == 0 {
            return invalid("mana_cap must be positive");
        }
        if self.initial_mana > self.mana_cap {
            return invalid("initial_mana exceeds mana_cap");
        }
        if !(0.0..=1.0).contains(&self.crit_chance) {
            return invalid("crit_chance must be within [0, 1]");
        }
        if self.crit_multiplier < 1.0 {
            return invalid("crit_multiplier must be at least 1");
        }
        if self.heal_amount < 0 {
            return invalid("heal_amount must not be negative");
        }
        if self.initial_next_level == 0 {
            return invalid("initial_next_level must be positive");
        }
        if self.healer_troop.is_empty() || self.guard_tower.is_empty() || self.king_tower.is_empty()
        {
            return invalid("spec keys must not be empty");
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn troop_attack_interval(&self) -> Duration {
        Duration::from_millis(self.troop_attack_interval_ms)
    }

    pub fn match_duration(&self) -> Duration {
        Duration::from_secs(self.match_duration_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}
