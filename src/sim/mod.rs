//! Deterministic simulation module
//!
//! All level logic lives here. This module must stay pure and deterministic:
//! - Fixed timestep only
//! - Seeded RNG only
//! - Stable iteration order (spawn order)
//! - No rendering, audio or platform dependencies

pub mod collision;
pub mod entity;
pub mod events;
pub mod patterns;
pub mod spawn;
pub mod tick;

pub use collision::{Contact, check_contact};
pub use entity::{Entity, EntityKind, EntityPayload};
pub use events::{EventQueue, GameEvent};
pub use patterns::{LEVEL_PATTERNS, LevelPattern, PatternManager, PatternType, SpawnInstruction};
pub use spawn::{ActiveEntities, SpawnInputs, SpawnOutcome, Spawner};
pub use tick::{LevelSimulation, PlayerTransform, SimSnapshot, TickContext};
