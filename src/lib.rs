//! Calamar Loco - endless-runner simulation core
//!
//! Core modules:
//! - `timestep`: Fixed-timestep scheduler that drives the simulation
//! - `pool`: Reusable instance allocator for transient entities
//! - `sim`: Per-tick entity movement, spawning, collisions and patterns
//! - `difficulty`: Adaptive difficulty controller with an optional learned model
//! - `session`: Game-state store contract and reference implementation
//! - `checkpoint`: Mid-run snapshots and their validation
//! - `tuning`: Data-driven game balance

pub mod checkpoint;
pub mod difficulty;
pub mod pool;
pub mod session;
pub mod sim;
pub mod timestep;
pub mod tuning;

pub use checkpoint::{Checkpoint, CheckpointManager, CheckpointStore, LevelSnapshot};
pub use difficulty::{DifficultyController, DifficultyState, DifficultyTier, MetricsUpdate};
pub use pool::{ObjectPool, PoolStats};
pub use session::{GameSession, GameStatus, GameStore};
pub use sim::{GameEvent, LevelSimulation, PatternManager, PlayerTransform, TickContext};
pub use timestep::FixedTimestepLoop;
pub use tuning::Tuning;

/// Game configuration constants
pub mod consts {
    /// Fixed simulation timestep (60 Hz)
    pub const SIM_DT: f32 = 1.0 / 60.0;
    /// Longest frame the scheduler will account for
    pub const MAX_FRAME_TIME: f32 = 0.25;
    /// Maximum fixed updates per scheduler call
    pub const MAX_STEPS_PER_UPDATE: u32 = 10;

    /// Lateral distance between lane centers
    pub const LANE_WIDTH: f32 = 2.2;
    /// Base run speed (units/s)
    pub const RUN_SPEED_BASE: f32 = 22.5;
    /// How far ahead of the player new entities appear
    pub const SPAWN_DISTANCE: f32 = 120.0;
    /// How far behind the player entities are removed
    pub const REMOVE_DISTANCE: f32 = 20.0;

    /// Obstacles span from the ground up to this height
    pub const OBSTACLE_HEIGHT: f32 = 1.6;
    /// Player collision box height above its feet
    pub const PLAYER_HEIGHT: f32 = 1.2;

    /// Lanes available at level 1
    pub const START_LANES: u32 = 3;
    /// Lane count never grows past this
    pub const MAX_LANES: u32 = 9;
    /// Final level; completing the word here wins the run
    pub const MAX_LEVEL: u32 = 3;
    /// Starting lives
    pub const START_LIVES: u32 = 3;

    /// Word spelled by letter tokens, one index per letter
    pub const TARGET_WORD: [char; 11] = ['C', 'A', 'L', 'A', 'M', 'A', 'R', 'L', 'O', 'C', 'O'];

    /// Display color (0xRRGGBB) per target letter index
    pub const LETTER_COLORS: [u32; 11] = [
        0xff4444, 0xff8800, 0xffcc00, 0x44ff44, 0x00ccff, 0xff8800, 0x9944ff, 0xffcc00, 0xff4444,
        0x00ccff, 0xff44aa,
    ];
}

/// Half-width of the lane set in lane units (3 lanes -> 1, 5 lanes -> 2)
#[inline]
pub fn max_lane_offset(lane_count: u32) -> i32 {
    (lane_count / 2) as i32
}

/// All lane offsets for a lane count, left to right
pub fn lane_offsets(lane_count: u32) -> Vec<i32> {
    let max = max_lane_offset(lane_count);
    (-max..=max).collect()
}

/// Convert a lane offset to a lateral world coordinate
#[inline]
pub fn lane_to_x(lane: i32) -> f32 {
    lane as f32 * consts::LANE_WIDTH
}
