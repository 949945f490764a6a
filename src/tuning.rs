//! Data-driven game balance
//!
//! Every tuned literal of the simulation lives here so it can be adjusted from
//! a JSON file without touching code. Missing fields fall back to defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::{MAX_FRAME_TIME, MAX_STEPS_PER_UPDATE};

#[derive(Debug, Error)]
pub enum TuningError {
    #[error("failed to read tuning file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse tuning: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Scheduler parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimestepTuning {
    /// Seconds per fixed step
    pub fixed_dt: f64,
    /// Longest frame the scheduler accounts for
    pub max_frame_time: f64,
    /// Hard cap on fixed steps per `update`
    pub max_steps_per_update: u32,
}

impl Default for TimestepTuning {
    fn default() -> Self {
        Self {
            fixed_dt: 1.0 / 60.0,
            max_frame_time: MAX_FRAME_TIME as f64,
            max_steps_per_update: MAX_STEPS_PER_UPDATE,
        }
    }
}

/// How the spawner chooses what to place next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SpawnMode {
    /// Weighted random rules only
    #[default]
    Procedural,
    /// Authored patterns, procedural fill between them
    Patterned,
}

/// Spawner and level-flow parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnTuning {
    pub mode: SpawnMode,
    /// Chance that a spawn cycle places nothing
    pub skip_chance: f32,
    /// Rolls above this spawn obstacles, below it a gem
    pub obstacle_threshold: f32,
    /// Cluster-size roll above this spawns two obstacles
    pub two_lane_threshold: f32,
    /// Cluster-size roll above this spawns three obstacles
    pub three_lane_threshold: f32,
    /// Chance of a bonus gem floating above each obstacle
    pub bonus_gem_chance: f32,
    /// Chance an obstacle slot becomes enemies (from `enemy_min_level`)
    pub enemy_chance: f32,
    pub enemy_min_level: u32,
    /// Enemy-count roll above this spawns two enemies
    pub double_enemy_threshold: f32,
    /// Enemies fire once they scroll past this longitudinal coordinate
    pub enemy_fire_z: f32,
    /// Projectile speed on top of the scroll speed
    pub projectile_speed: f32,
    /// Minimum spacing between spawn rows at zero speed
    pub min_gap_base: f32,
    /// Extra spacing per unit of speed
    pub min_gap_per_speed: f32,
    /// Distance between letters on level 1
    pub base_letter_interval: f32,
    /// Letter interval growth per level
    pub letter_interval_growth: f32,
    /// Distance between checkpoint offers
    pub checkpoint_interval: f32,
    /// Simulated seconds between difficulty metric reports
    pub metrics_interval: f32,
    /// How strongly the difficulty multiplier scales scroll speed
    pub speed_influence: f32,
    /// Longitudinal units per pattern offset step
    pub pattern_spacing: f32,
    /// Point value of a regular gem
    pub gem_points: u32,
    /// Point value of a gem floating above an obstacle
    pub bonus_gem_points: u32,
    /// Point value of a beer pickup
    pub beer_points: u32,
}

impl Default for SpawnTuning {
    fn default() -> Self {
        Self {
            mode: SpawnMode::Procedural,
            skip_chance: 0.1,
            obstacle_threshold: 0.5,
            two_lane_threshold: 0.5,
            three_lane_threshold: 0.8,
            bonus_gem_chance: 0.3,
            enemy_chance: 0.2,
            enemy_min_level: 2,
            double_enemy_threshold: 0.7,
            enemy_fire_z: -90.0,
            projectile_speed: 30.0,
            min_gap_base: 12.0,
            min_gap_per_speed: 0.4,
            base_letter_interval: 150.0,
            letter_interval_growth: 1.2,
            checkpoint_interval: 50.0,
            metrics_interval: 1.0,
            speed_influence: 0.25,
            pattern_spacing: 6.0,
            gem_points: 50,
            bonus_gem_points: 100,
            beer_points: 75,
        }
    }
}

impl SpawnTuning {
    /// Distance between letters on `level`; grows geometrically as tracks lengthen
    pub fn letter_interval(&self, level: u32) -> f32 {
        let exponent = level.saturating_sub(1) as i32;
        self.base_letter_interval * self.letter_interval_growth.powi(exponent)
    }

    /// Spacing between spawn rows at `speed`
    pub fn min_gap(&self, speed: f32) -> f32 {
        self.min_gap_base + speed * self.min_gap_per_speed
    }
}

/// Difficulty controller parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DifficultyTuning {
    /// Seconds between automatic adjustments
    pub adjustment_interval: f64,
    /// Weight of the heuristic when blending with the learned model
    pub heuristic_weight: f32,
    /// Multipliers below this are Relax
    pub relax_cutoff: f32,
    /// Multipliers above this are Hardcore
    pub hardcore_cutoff: f32,
    pub min_multiplier: f32,
    pub max_multiplier: f32,
    pub history_capacity: usize,
    pub reaction_capacity: usize,
    pub training_capacity: usize,
    /// Chance an adjustment requests a retrain
    pub training_probability: f32,
    pub min_training_examples: usize,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f32,
}

impl Default for DifficultyTuning {
    fn default() -> Self {
        Self {
            adjustment_interval: 5.0,
            heuristic_weight: 0.7,
            relax_cutoff: 0.8,
            hardcore_cutoff: 1.3,
            min_multiplier: 0.5,
            max_multiplier: 2.0,
            history_capacity: 20,
            reaction_capacity: 10,
            training_capacity: 50,
            training_probability: 0.2,
            min_training_examples: 10,
            epochs: 10,
            batch_size: 4,
            learning_rate: 0.01,
        }
    }
}

impl DifficultyTuning {
    /// Replace unusable multiplier bounds with the defaults
    pub fn validated(mut self) -> Self {
        let (min, max) = (self.min_multiplier, self.max_multiplier);
        if !(min.is_finite() && max.is_finite() && min <= max) {
            let defaults = Self::default();
            log::warn!(
                "Invalid multiplier bounds {min}..{max}, using {}..{}",
                defaults.min_multiplier,
                defaults.max_multiplier
            );
            self.min_multiplier = defaults.min_multiplier;
            self.max_multiplier = defaults.max_multiplier;
        }
        self
    }
}

/// Complete balance sheet
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    pub timestep: TimestepTuning,
    pub spawn: SpawnTuning,
    pub difficulty: DifficultyTuning,
}

impl Tuning {
    pub fn from_json_str(json: &str) -> Result<Self, TuningError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, TuningError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Load from `path`, falling back to defaults on any failure
    pub fn load(path: &Path) -> Self {
        match Self::from_file(path) {
            Ok(tuning) => {
                log::info!("Loaded tuning from {}", path.display());
                tuning
            }
            Err(e) => {
                log::warn!("Using default tuning ({e})");
                Self::default()
            }
        }
    }

    pub fn to_json_string(&self) -> Result<String, TuningError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
