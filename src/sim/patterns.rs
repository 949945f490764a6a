//! Authored spawn patterns and their rotation
//!
//! Patterns are declarative: a type tag, a duration and a list of spawn
//! instructions. `PatternManager` walks a fixed Respite/Tension/Peak/Variation
//! cycle and picks a random pattern of the requested type each time.

use std::collections::VecDeque;

use rand::SeedableRng;
use rand::seq::IndexedRandom;
use rand_pcg::Pcg32;

use super::EntityKind;
use super::EntityKind::{Alien, Beer, Missile, Obstacle};

/// Pacing role of a pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternType {
    /// Low density, recovery moment
    Respite,
    /// Moderate challenge
    Tension,
    /// High intensity
    Peak,
    /// Special set piece
    Variation,
}

/// One entity placement inside a pattern
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnInstruction {
    pub kind: EntityKind,
    /// Lane relative to center, -2..=2
    pub lane: i32,
    /// Steps further ahead than the pattern's anchor
    pub z_offset: f32,
    /// Letter index for `EntityKind::Letter`
    pub target_index: Option<usize>,
}

const fn at(kind: EntityKind, lane: i32, z_offset: f32) -> SpawnInstruction {
    SpawnInstruction {
        kind,
        lane,
        z_offset,
        target_index: None,
    }
}

const fn letter(lane: i32, z_offset: f32, target_index: usize) -> SpawnInstruction {
    SpawnInstruction {
        kind: EntityKind::Letter,
        lane,
        z_offset,
        target_index: Some(target_index),
    }
}

/// A named, timed group of spawn instructions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelPattern {
    pub id: &'static str,
    pub name: &'static str,
    pub pattern_type: PatternType,
    /// Seconds before the manager moves on
    pub duration: f64,
    pub spawns: &'static [SpawnInstruction],
}

pub static LEVEL_PATTERNS: &[LevelPattern] = &[
    LevelPattern {
        id: "respite_sparse",
        name: "Light Breather",
        pattern_type: PatternType::Respite,
        duration: 6.0,
        spawns: &[
            at(Obstacle, -1, 2.0),
            at(Beer, 0, 3.0),
            at(Obstacle, 1, 4.0),
            at(Beer, -1, 5.0),
            at(Obstacle, 0, 6.0),
            at(Beer, 1, 7.0),
            at(Obstacle, -1, 8.0),
            at(Beer, 0, 9.0),
        ],
    },
    LevelPattern {
        id: "respite_bonanza",
        name: "Beer Bonanza",
        pattern_type: PatternType::Respite,
        duration: 6.0,
        spawns: &[
            at(Beer, -2, 3.0),
            at(Beer, -1, 5.0),
            at(Beer, 0, 7.0),
            at(Beer, 1, 9.0),
            at(Beer, 2, 11.0),
            at(Obstacle, 0, 13.0),
        ],
    },
    LevelPattern {
        id: "tension_alternating",
        name: "Alternating Threats",
        pattern_type: PatternType::Tension,
        duration: 10.0,
        spawns: &[
            at(Obstacle, -2, 3.0),
            at(Alien, 2, 5.0),
            at(Obstacle, 0, 7.0),
            at(Beer, 1, 8.0),
            at(Alien, -1, 10.0),
            at(Obstacle, 1, 12.0),
            at(Beer, -1, 14.0),
        ],
    },
    LevelPattern {
        id: "tension_zigzag",
        name: "Obstacle Zigzag",
        pattern_type: PatternType::Tension,
        duration: 12.0,
        spawns: &[
            at(Obstacle, -2, 3.0),
            at(Obstacle, 2, 5.0),
            at(Obstacle, -1, 7.0),
            at(Obstacle, 1, 9.0),
            at(Obstacle, 0, 11.0),
            at(Beer, 1, 12.0),
            at(Obstacle, -2, 14.0),
            at(Beer, 0, 16.0),
        ],
    },
    LevelPattern {
        id: "peak_wall",
        name: "Obstacle Wall",
        pattern_type: PatternType::Peak,
        duration: 8.0,
        spawns: &[
            at(Obstacle, -2, 3.0),
            at(Obstacle, -1, 4.0),
            at(Obstacle, 0, 5.0),
            at(Obstacle, 1, 6.0),
            at(Obstacle, 2, 7.0),
            at(Beer, 0, 9.0),
            at(Alien, -1, 10.0),
            at(Alien, 1, 11.0),
            at(Obstacle, -1, 13.0),
            at(Obstacle, 1, 14.0),
        ],
    },
    LevelPattern {
        id: "peak_homing",
        name: "Homing Missiles",
        pattern_type: PatternType::Peak,
        duration: 10.0,
        spawns: &[
            at(Obstacle, 0, 4.0),
            at(Missile, -2, 6.0),
            at(Missile, 2, 6.0),
            at(Obstacle, -1, 8.0),
            at(Missile, 0, 10.0),
            at(Obstacle, 1, 12.0),
            at(Beer, 0, 14.0),
        ],
    },
    LevelPattern {
        id: "variation_letter_rush",
        name: "Letter Rush",
        pattern_type: PatternType::Variation,
        duration: 15.0,
        spawns: &[
            letter(-2, 4.0, 0),
            at(Obstacle, 0, 5.0),
            at(Beer, 1, 6.0),
            letter(2, 8.0, 1),
            at(Alien, -1, 9.0),
            letter(0, 11.0, 2),
            at(Obstacle, 1, 12.0),
            at(Beer, -1, 13.0),
            letter(-1, 15.0, 3),
            at(Beer, 1, 17.0),
        ],
    },
    LevelPattern {
        id: "variation_missile_barrage",
        name: "Missile Barrage",
        pattern_type: PatternType::Variation,
        duration: 12.0,
        spawns: &[
            at(Obstacle, 0, 3.0),
            at(Missile, -2, 5.0),
            at(Missile, -1, 6.0),
            at(Missile, 0, 7.0),
            at(Missile, 1, 8.0),
            at(Missile, 2, 9.0),
            at(Beer, 0, 11.0),
            at(Obstacle, -1, 13.0),
            at(Obstacle, 1, 13.0),
        ],
    },
];

/// Balanced pacing cycle, repeated forever
const PATTERN_CYCLE: [PatternType; 8] = [
    PatternType::Respite,
    PatternType::Tension,
    PatternType::Peak,
    PatternType::Variation,
    PatternType::Respite,
    PatternType::Tension,
    PatternType::Peak,
    PatternType::Variation,
];

/// Rotates through authored patterns
#[derive(Debug, Clone)]
pub struct PatternManager {
    patterns: &'static [LevelPattern],
    queue: VecDeque<PatternType>,
    current: Option<&'static LevelPattern>,
    started_at: f64,
    rng: Pcg32,
}

impl PatternManager {
    pub fn new(seed: u64) -> Self {
        Self::with_patterns(LEVEL_PATTERNS, seed)
    }

    /// Use a custom pattern table; every cycle type must have at least one entry
    pub fn with_patterns(patterns: &'static [LevelPattern], seed: u64) -> Self {
        Self {
            patterns,
            queue: PATTERN_CYCLE.iter().copied().collect(),
            current: None,
            started_at: 0.0,
            rng: Pcg32::seed_from_u64(seed),
        }
    }

    pub fn current_pattern(&self) -> Option<&'static LevelPattern> {
        self.current
    }

    /// True when nothing is running or the current pattern has run its course
    pub fn should_switch_pattern(&self, now: f64) -> bool {
        match self.current {
            None => true,
            Some(p) => now - self.started_at >= p.duration,
        }
    }

    /// Advance the cycle and start a random pattern of the next type.
    ///
    /// Returns `None` only if the table has no pattern of that type.
    pub fn next_pattern(&mut self, now: f64) -> Option<&'static LevelPattern> {
        let next_type = match self.queue.pop_front() {
            Some(t) => t,
            None => {
                self.queue.extend(PATTERN_CYCLE);
                self.queue.pop_front()?
            }
        };
        if self.queue.is_empty() {
            self.queue.extend(PATTERN_CYCLE);
        }

        let candidates: Vec<&'static LevelPattern> = self.patterns_by_type(next_type).collect();
        let Some(&chosen) = candidates.choose(&mut self.rng) else {
            log::warn!("No authored pattern of type {:?}", next_type);
            return None;
        };

        log::debug!("Pattern {} ({:?}) started", chosen.id, chosen.pattern_type);
        self.current = Some(chosen);
        self.started_at = now;
        Some(chosen)
    }

    /// Fraction of the current pattern elapsed, in [0, 1]
    pub fn pattern_progress(&self, now: f64) -> f64 {
        match self.current {
            None => 0.0,
            Some(p) if p.duration <= 0.0 => 1.0,
            Some(p) => ((now - self.started_at) / p.duration).clamp(0.0, 1.0),
        }
    }

    pub fn all_patterns(&self) -> &'static [LevelPattern] {
        self.patterns
    }

    pub fn patterns_by_type(
        &self,
        pattern_type: PatternType,
    ) -> impl Iterator<Item = &'static LevelPattern> + '_ {
        self.patterns
            .iter()
            .filter(move |p| p.pattern_type == pattern_type)
    }
}
