//! Drone-type and upgrade tables
//!
//! Plain data read by the combat and progression code. A deployment can
//! supply its own tables as JSON (`TUNING_PATH`); otherwise the built-in
//! catalog is used.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Multipliers applied to the base drone constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroneType {
    pub name: String,
    pub damage_mult: f32,
    pub range_mult: f32,
    pub cooldown_mult: f32,
}

/// Stats granted from `level` upward until the next tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpgradeTier {
    pub level: u8,
    pub max_hp: f32,
    pub drone_count: u8,
    /// Index into `drone_types` for drones added at this tier
    pub drone_type: u8,
    pub speed_mult: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningTables {
    pub drone_types: Vec<DroneType>,
    /// Sorted by `level`, first tier at level 1
    pub upgrades: Vec<UpgradeTier>,
}

#[derive(Debug, thiserror::Error)]
pub enum TuningError {
    #[error("failed to read tuning file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid tuning json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("tuning tables are incomplete: {0}")]
    Incomplete(&'static str),
}

impl TuningTables {
    pub fn builtin() -> Self {
        let drone = |name: &str, damage_mult, range_mult, cooldown_mult| DroneType {
            name: name.to_string(),
            damage_mult,
            range_mult,
            cooldown_mult,
        };
        let tier = |level, max_hp, drone_count, drone_type, speed_mult| UpgradeTier {
            level,
            max_hp,
            drone_count,
            drone_type,
            speed_mult,
        };
        Self {
            drone_types: vec![
                drone("scout", 1.0, 1.0, 1.0),
                drone("striker", 1.25, 0.95, 1.1),
                drone("lancer", 1.1, 1.25, 1.0),
            ],
            upgrades: vec![
                tier(1, 100.0, 1, 0, 1.0),
                tier(3, 110.0, 2, 0, 1.0),
                tier(6, 120.0, 2, 0, 1.02),
                tier(10, 135.0, 3, 1, 1.02),
                tier(15, 150.0, 4, 1, 1.04),
                tier(22, 170.0, 5, 2, 1.04),
                tier(30, 190.0, 6, 2, 1.06),
            ],
        }
    }

    pub fn from_json(json: &str) -> Result<Self, TuningError> {
        let mut tables: TuningTables = serde_json::from_str(json)?;
        tables.upgrades.sort_by_key(|t| t.level);
        tables.validate()?;
        Ok(tables)
    }

    /// Tables from `TUNING_PATH` if set and valid, else the built-in set
    pub fn load_or_builtin() -> Self {
        let Ok(path) = std::env::var("TUNING_PATH") else {
            return Self::builtin();
        };
        match Self::load(Path::new(&path)) {
            Ok(tables) => {
                info!("Loaded tuning tables from {}", path);
                tables
            }
            Err(e) => {
                warn!("Ignoring TUNING_PATH '{}': {}", path, e);
                Self::builtin()
            }
        }
    }

    fn load(path: &Path) -> Result<Self, TuningError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    fn validate(&self) -> Result<(), TuningError> {
        if self.drone_types.is_empty() {
            return Err(TuningError::Incomplete("no drone types"));
        }
        match self.upgrades.first() {
            Some(t) if t.level <= 1 => Ok(()),
            _ => Err(TuningError::Incomplete("no level 1 upgrade tier")),
        }
    }

    /// Highest tier unlocked at `level`
    pub fn tier_for_level(&self, level: u8) -> Option<&UpgradeTier> {
        self.upgrades.iter().rev().find(|t| t.level <= level)
    }

    pub fn drone_type(&self, index: u8) -> Option<&DroneType> {
        self.drone_types
            .get(index as usize)
            .or_else(|| self.drone_types.first())
    }
}

impl Default for TuningTables {
    fn default() -> Self {
        Self::builtin()
    }
}
