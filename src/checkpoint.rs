//! Mid-run checkpoints
//!
//! A checkpoint pairs the store's `SessionSnapshot` with the simulation's
//! `LevelSnapshot`. Both halves are owned copies: the live simulation and a
//! saved checkpoint never share entity storage.

use serde::{Deserialize, Serialize};

use crate::consts::TARGET_WORD;
use crate::session::SessionSnapshot;
use crate::sim::Entity;
use crate::tuning::SpawnTuning;

/// Distance between automatic checkpoints
pub const CHECKPOINT_INTERVAL: f32 = 50.0;
/// Checkpoints older than this are rejected (seconds)
pub const MAX_CHECKPOINT_AGE: f64 = 24.0 * 60.0 * 60.0;

/// Simulation half of a checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelSnapshot {
    pub entities: Vec<Entity>,
    pub distance_traveled: f32,
    pub next_letter_distance: f32,
}

/// A complete restore point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub session: SessionSnapshot,
    pub level: LevelSnapshot,
    /// Creation time (seconds)
    pub created_at: f64,
}

/// Where checkpoints are kept
pub trait CheckpointStore {
    /// Has enough distance passed since the last checkpoint?
    fn should_create_checkpoint(&self, distance: f32) -> bool;
    /// Record a checkpoint from copies of both halves
    fn create_checkpoint(
        &mut self,
        session: &SessionSnapshot,
        level: &LevelSnapshot,
        now: f64,
    ) -> Checkpoint;
    fn last_checkpoint(&self) -> Option<&Checkpoint>;
    /// Structural and age check
    fn validate_checkpoint(&self, checkpoint: &Checkpoint, now: f64) -> bool;
    fn clear_checkpoint(&mut self);
}

/// In-memory checkpoint store keeping only the latest checkpoint
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    last: Option<Checkpoint>,
    interval: f32,
    last_distance: f32,
}

impl Default for CheckpointManager {
    fn default() -> Self {
        Self::new(CHECKPOINT_INTERVAL)
    }
}

impl CheckpointManager {
    pub fn new(interval: f32) -> Self {
        Self {
            last: None,
            interval,
            last_distance: 0.0,
        }
    }

    pub fn from_tuning(tuning: &SpawnTuning) -> Self {
        Self::new(tuning.checkpoint_interval)
    }

    pub fn has_checkpoint(&self) -> bool {
        self.last.is_some()
    }

    pub fn to_json(&self) -> Option<String> {
        let checkpoint = self.last.as_ref()?;
        match serde_json::to_string(checkpoint) {
            Ok(json) => Some(json),
            Err(e) => {
                log::warn!("Failed to serialize checkpoint: {e}");
                None
            }
        }
    }

    /// Adopt a previously serialized checkpoint; malformed input is ignored
    pub fn load_json(&mut self, json: &str) -> bool {
        match serde_json::from_str::<Checkpoint>(json) {
            Ok(checkpoint) => {
                self.last_distance = checkpoint.level.distance_traveled;
                self.last = Some(checkpoint);
                true
            }
            Err(e) => {
                log::warn!("Ignoring malformed checkpoint: {e}");
                false
            }
        }
    }
}

impl CheckpointStore for CheckpointManager {
    fn should_create_checkpoint(&self, distance: f32) -> bool {
        distance - self.last_distance >= self.interval
    }

    fn create_checkpoint(
        &mut self,
        session: &SessionSnapshot,
        level: &LevelSnapshot,
        now: f64,
    ) -> Checkpoint {
        let checkpoint = Checkpoint {
            session: session.clone(),
            level: level.clone(),
            created_at: now,
        };
        self.last = Some(checkpoint.clone());
        self.last_distance = level.distance_traveled;
        log::info!(
            "Checkpoint created at distance {:.1} ({} entities)",
            level.distance_traveled,
            level.entities.len()
        );
        checkpoint
    }

    fn last_checkpoint(&self) -> Option<&Checkpoint> {
        self.last.as_ref()
    }

    fn validate_checkpoint(&self, checkpoint: &Checkpoint, now: f64) -> bool {
        let age = now - checkpoint.created_at;
        if !(0.0..MAX_CHECKPOINT_AGE).contains(&age) {
            return false;
        }
        let level = &checkpoint.level;
        if !level.distance_traveled.is_finite() || !level.next_letter_distance.is_finite() {
            return false;
        }
        if level.entities.iter().any(|e| !e.position.is_finite()) {
            return false;
        }
        checkpoint
            .session
            .collected_letters
            .iter()
            .all(|&i| i < TARGET_WORD.len())
    }

    fn clear_checkpoint(&mut self) {
        self.last = None;
        self.last_distance = 0.0;
        log::debug!("Checkpoint cleared");
    }
}
