//! Troop and tower stat tables.
//!
//! Loaded once from a JSON file with two top-level maps, `troops` and
//! `towers`, keyed by spec name. The catalog is validated on load and is
//! read-only afterwards, so matches share it through an `Arc` without locking.

use serde::{Deserialize, Serialize};
use shared::TowerKind;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpecError {
    #[error("cannot read spec catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse spec catalog: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no {0} defined")]
    Empty(&'static str),

    #[error("invalid spec `{name}`: {reason}")]
    Invalid { name: String, reason: String },

    #[error("required tower spec `{0}` is missing")]
    MissingTower(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetClass {
    Ground,
    Air,
    Both,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TroopSpec {
    pub name: String,
    #[serde(rename = "type", default)]
    pub category: String,
    pub health: i32,
    pub damage: i32,
    pub defence: i32,
    pub range: f64,
    pub speed: f64,
    pub attack_speed: f64,
    pub cost: u32,
    pub target: TargetClass,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TowerSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: TowerKind,
    pub health: i32,
    pub damage: i32,
    pub defence: i32,
    pub range: f64,
    pub attack_speed: f64,
    pub target: TargetClass,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpecCatalog {
    pub troops: HashMap<String, TroopSpec>,
    pub towers: HashMap<String, TowerSpec>,
}

impl SpecCatalog {
    /// Reads and validates a catalog. `required_towers` are the keys a match
    /// instantiates towers from; their absence is a load error rather than a
    /// failure at pairing time.
    pub fn load(path: impl AsRef<Path>, required_towers: &[&str]) -> Result<Self, SpecError> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json(&data, required_towers)
    }

    pub fn from_json(data: &str, required_towers: &[&str]) -> Result<Self, SpecError> {
        let catalog: SpecCatalog = serde_json::from_str(data)?;
        catalog.validate(required_towers)?;
        Ok(catalog)
    }

    pub fn validate(&self, required_towers: &[&str]) -> Result<(), SpecError> {
        if self.troops.is_empty() {
            return Err(SpecError::Empty("troops"));
        }
        for (name, troop) in &self.troops {
            validate_troop(name, troop)?;
        }

        if self.towers.is_empty() {
            return Err(SpecError::Empty("towers"));
        }
        for (name, tower) in &self.towers {
            validate_tower(name, tower)?;
        }

        for key in required_towers {
            if !self.towers.contains_key(*key) {
                return Err(SpecError::MissingTower(key.to_string()));
            }
        }
        Ok(())
    }

    pub fn troop(&self, key: &str) -> Option<&TroopSpec> {
        self.troops.get(key)
    }

    pub fn tower(&self, key: &str) -> Option<&TowerSpec> {
        self.towers.get(key)
    }
}

fn invalid(name: &str, reason: String) -> SpecError {
    SpecError::Invalid {
        name: name.to_string(),
        reason,
    }
}

fn validate_troop(name: &str, troop: &TroopSpec) -> Result<(), SpecError> {
    if name.is_empty() {
        return Err(invalid(name, "troop key cannot be empty".to_string()));
    }
    if troop.health <= 0 {
        return Err(invalid(name, format!("health must be positive, got {}", troop.health)));
    }
    if troop.damage < 0 {
        return Err(invalid(name, format!("negative damage {}", troop.damage)));
    }
    if troop.defence < 0 {
        return Err(invalid(name, format!("negative defence {}", troop.defence)));
    }
    if troop.range <= 0.0 {
        return Err(invalid(name, format!("range must be positive, got {}", troop.range)));
    }
    if troop.speed <= 0.0 {
        return Err(invalid(name, format!("speed must be positive, got {}", troop.speed)));
    }
    if troop.attack_speed <= 0.0 {
        return Err(invalid(
            name,
            format!("attack speed must be positive, got {}", troop.attack_speed),
        ));
    }
    if troop.cost == 0 {
        return Err(invalid(name, "cost must be positive".to_string()));
    }
    Ok(())
}

fn validate_tower(name: &str, tower: &TowerSpec) -> Result<(), SpecError> {
    if name.is_empty() {
        return Err(invalid(name, "tower key cannot be empty".to_string()));
    }
    if tower.health <= 0 {
        return Err(invalid(name, format!("health must be positive, got {}", tower.health)));
    }
    if tower.damage < 0 {
        return Err(invalid(name, format!("negative damage {}", tower.damage)));
    }
    if tower.defence < 0 {
        return Err(invalid(name, format!("negative defence {}", tower.defence)));
    }
    if tower.range <= 0.0 {
        return Err(invalid(name, format!("range must be positive, got {}", tower.range)));
    }
    if tower.attack_speed <= 0.0 {
        return Err(invalid(
            name,
            format!("attack speed must be positive, got {}", tower.attack_speed),
        ));
    }
    Ok(())
}
