//! Game-state store
//!
//! The simulation never mutates run state directly; it calls the `GameStore`
//! operations. `GameSession` is the reference store: a status state machine
//! plus lives, score, speed, lanes, level and letter progress.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use crate::checkpoint::{CheckpointStore, LevelSnapshot};
use crate::consts::*;

/// Top-level run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GameStatus {
    #[default]
    Menu,
    Playing,
    Shop,
    GameOver,
    Victory,
}

impl GameStatus {
    /// Allowed transitions out of this status
    pub fn can_transition_to(self, next: GameStatus) -> bool {
        use GameStatus::*;
        matches!(
            (self, next),
            (Menu, Playing)
                | (Playing, Shop | GameOver | Victory | Playing)
                | (Shop, Playing)
                | (GameOver, Playing)
                | (Victory, Playing)
        )
    }
}

/// Things the player can buy in the shop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShopItem {
    DoubleJump,
    MaxLife,
    Heal,
    Immortal,
}

/// Seconds an activated immortality lasts
pub const IMMORTALITY_DURATION: f32 = 5.0;
/// Score bonus for winning the run
pub const VICTORY_BONUS: u64 = 5000;

/// Persistable run state, the store half of a checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub score: u64,
    pub lives: u32,
    pub max_lives: u32,
    pub speed: f32,
    pub collected_letters: Vec<usize>,
    pub level: u32,
    pub lane_count: u32,
    pub gems_collected: u32,
    pub distance: f32,
    pub has_double_jump: bool,
    pub has_immortality: bool,
    pub immortality_active: bool,
}

/// Read and mutate operations the simulation needs from the run state
pub trait GameStore {
    fn status(&self) -> GameStatus;
    fn lives(&self) -> u32;
    fn score(&self) -> u64;
    fn speed(&self) -> f32;
    fn lane_count(&self) -> u32;
    fn level(&self) -> u32;
    fn collected_letters(&self) -> &[usize];

    fn take_damage(&mut self);
    fn add_score(&mut self, amount: u64);
    fn collect_gem(&mut self, base_value: u32);
    fn collect_letter(&mut self, index: usize);
    fn open_shop(&mut self);
    fn advance_level(&mut self);
    fn set_distance(&mut self, distance: f32);

    /// Copy of the persistable state for a checkpoint
    fn snapshot(&self) -> SessionSnapshot;
}

/// Reference run-state store
#[derive(Debug, Clone)]
pub struct GameSession {
    status: GameStatus,
    score: u64,
    lives: u32,
    max_lives: u32,
    speed: f32,
    collected_letters: Vec<usize>,
    level: u32,
    lane_count: u32,
    gems_collected: u32,
    distance: f32,
    has_double_jump: bool,
    has_immortality: bool,
    /// Seconds of immortality left; active while > 0
    immortality_remaining: f32,
    rng: Pcg32,
}

impl GameSession {
    pub fn new(seed: u64) -> Self {
        Self {
            status: GameStatus::Menu,
            score: 0,
            lives: START_LIVES,
            max_lives: START_LIVES,
            speed: 0.0,
            collected_letters: Vec::new(),
            level: 1,
            lane_count: START_LANES,
            gems_collected: 0,
            distance: 0.0,
            has_double_jump: false,
            has_immortality: false,
            immortality_remaining: 0.0,
            rng: Pcg32::seed_from_u64(seed),
        }
    }

    /// Move to `next` if the transition table allows it
    pub fn transition_to(&mut self, next: GameStatus) -> bool {
        if self.status.can_transition_to(next) {
            self.status = next;
            true
        } else {
            log::warn!("Invalid transition attempt: {:?} -> {:?}", self.status, next);
            false
        }
    }

    fn reset_run(&mut self) {
        self.score = 0;
        self.lives = START_LIVES;
        self.max_lives = START_LIVES;
        self.speed = RUN_SPEED_BASE;
        self.collected_letters.clear();
        self.level = 1;
        self.lane_count = START_LANES;
        self.gems_collected = 0;
        self.distance = 0.0;
        self.has_double_jump = false;
        self.has_immortality = false;
        self.immortality_remaining = 0.0;
    }

    /// Menu -> Playing with a fresh run
    pub fn start_game(&mut self) -> bool {
        if self.transition_to(GameStatus::Playing) {
            self.reset_run();
            log::info!("Run started");
            true
        } else {
            false
        }
    }

    /// GameOver/Victory -> Playing with a fresh run
    pub fn restart_game(&mut self) -> bool {
        self.start_game()
    }

    pub fn close_shop(&mut self) -> bool {
        self.status == GameStatus::Shop && self.transition_to(GameStatus::Playing)
    }

    /// Spend score on a shop item; false if unaffordable
    pub fn buy_item(&mut self, item: ShopItem, cost: u64) -> bool {
        if self.score < cost {
            return false;
        }
        self.score -= cost;
        match item {
            ShopItem::DoubleJump => self.has_double_jump = true,
            ShopItem::MaxLife => {
                // Scales with current max lives
                let increase = (self.max_lives / 3).max(1);
                self.max_lives += increase;
                self.lives += increase;
            }
            ShopItem::Heal => self.lives = (self.lives + 1).min(self.max_lives),
            ShopItem::Immortal => self.has_immortality = true,
        }
        log::info!("Bought {:?} for {}", item, cost);
        true
    }

    /// Start the immortality window if owned and not already running
    pub fn activate_immortality(&mut self) -> bool {
        if self.has_immortality && !self.is_immortality_active() {
            self.immortality_remaining = IMMORTALITY_DURATION;
            true
        } else {
            false
        }
    }

    pub fn is_immortality_active(&self) -> bool {
        self.immortality_remaining > 0.0
    }

    /// Count down timed effects
    pub fn advance_timers(&mut self, dt: f32) {
        if self.immortality_remaining > 0.0 {
            self.immortality_remaining = (self.immortality_remaining - dt).max(0.0);
        }
    }

    pub fn max_lives(&self) -> u32 {
        self.max_lives
    }

    pub fn gems_collected(&self) -> u32 {
        self.gems_collected
    }

    pub fn distance(&self) -> f32 {
        self.distance
    }

    pub fn has_double_jump(&self) -> bool {
        self.has_double_jump
    }

    /// Restore from the store's last valid checkpoint.
    ///
    /// Returns the level payload the simulation must adopt, or `None` when no
    /// valid checkpoint exists or the status cannot move to Playing.
    pub fn restore_from_checkpoint(
        &mut self,
        checkpoints: &dyn CheckpointStore,
        now: f64,
    ) -> Option<LevelSnapshot> {
        let Some(checkpoint) = checkpoints.last_checkpoint() else {
            log::warn!("No checkpoint available");
            return None;
        };
        if !checkpoints.validate_checkpoint(checkpoint, now) {
            log::warn!("Checkpoint rejected by validation");
            return None;
        }
        if !self.transition_to(GameStatus::Playing) {
            return None;
        }

        let s = &checkpoint.session;
        self.score = s.score;
        self.lives = s.lives;
        self.max_lives = s.max_lives;
        self.speed = s.speed;
        self.collected_letters = s.collected_letters.clone();
        self.level = s.level;
        self.lane_count = s.lane_count;
        self.gems_collected = s.gems_collected;
        self.distance = s.distance;
        self.has_double_jump = s.has_double_jump;
        self.has_immortality = s.has_immortality;
        self.immortality_remaining = if s.immortality_active {
            IMMORTALITY_DURATION
        } else {
            0.0
        };

        log::info!(
            "Restored checkpoint at distance {:.1}",
            checkpoint.level.distance_traveled
        );
        Some(checkpoint.level.clone())
    }

    #[doc(hidden)]
    pub fn set_status_for_test(&mut self, status: GameStatus) {
        self.status = status;
    }

    #[doc(hidden)]
    pub fn set_lives_for_test(&mut self, lives: u32) {
        self.lives = lives;
    }

    #[doc(hidden)]
    pub fn set_level_for_test(&mut self, level: u32) {
        self.level = level;
    }
}

impl GameStore for GameSession {
    fn status(&self) -> GameStatus {
        self.status
    }

    fn lives(&self) -> u32 {
        self.lives
    }

    fn score(&self) -> u64 {
        self.score
    }

    fn speed(&self) -> f32 {
        self.speed
    }

    fn lane_count(&self) -> u32 {
        self.lane_count
    }

    fn level(&self) -> u32 {
        self.level
    }

    fn collected_letters(&self) -> &[usize] {
        &self.collected_letters
    }

    fn take_damage(&mut self) {
        if self.is_immortality_active() || self.status != GameStatus::Playing {
            return;
        }
        if self.lives > 1 {
            self.lives -= 1;
        } else {
            self.lives = 0;
            self.speed = 0.0;
            self.transition_to(GameStatus::GameOver);
            log::info!("Game over at level {} with score {}", self.level, self.score);
        }
    }

    fn add_score(&mut self, amount: u64) {
        self.score = self.score.saturating_add(amount);
    }

    fn collect_gem(&mut self, base_value: u32) {
        // Faster runs and distance milestones are worth more, capped at 2x
        let speed_bonus = (self.speed / RUN_SPEED_BASE).min(2.0) * 0.25;
        let milestone_bonus = (self.distance / 1000.0).floor() * 0.1;
        let mut multiplier = (1.0 + speed_bonus + milestone_bonus).min(2.0);
        multiplier *= self.rng.random_range(0.8..1.2);

        let value = (base_value as f32 * multiplier).round().max(0.0) as u64;
        self.score = self.score.saturating_add(value);
        self.gems_collected += 1;
    }

    fn collect_letter(&mut self, index: usize) {
        if index >= TARGET_WORD.len() || self.collected_letters.contains(&index) {
            return;
        }
        self.collected_letters.push(index);

        let increase = (RUN_SPEED_BASE * 0.05).min(5.0);
        self.speed = (self.speed + increase).min(RUN_SPEED_BASE * 3.0);

        if self.collected_letters.len() == TARGET_WORD.len() {
            if self.level < MAX_LEVEL {
                self.advance_level();
            } else if self.transition_to(GameStatus::Victory) {
                self.score = self.score.saturating_add(VICTORY_BONUS);
                log::info!("Victory with score {}", self.score);
            }
        }
    }

    fn open_shop(&mut self) {
        self.transition_to(GameStatus::Shop);
    }

    fn advance_level(&mut self) {
        let finished = self.level;
        self.level += 1;
        self.lane_count = (self.lane_count + 2).min(MAX_LANES);
        self.speed = (self.speed + RUN_SPEED_BASE * 0.2).min(RUN_SPEED_BASE * 3.0);
        self.collected_letters.clear();
        log::info!(
            "Level {} complete, now level {} with {} lanes",
            finished,
            self.level,
            self.lane_count
        );
    }

    fn set_distance(&mut self, distance: f32) {
        self.distance = distance;
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            score: self.score,
            lives: self.lives,
            max_lives: self.max_lives,
            speed: self.speed,
            collected_letters: self.collected_letters.clone(),
            level: self.level,
            lane_count: self.lane_count,
            gems_collected: self.gems_collected,
            distance: self.distance,
            has_double_jump: self.has_double_jump,
            has_immortality: self.has_immortality,
            immortality_active: self.is_immortality_active(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::CheckpointManager;

    fn playing() -> GameSession {
        let mut s = GameSession::new(42);
        assert!(s.start_game());
        s
    }

    #[test]
    fn test_valid_transitions() {
        let mut s = GameSession::new(1);
        assert!(s.transition_to(GameStatus::Playing));
        assert!(s.transition_to(GameStatus::Shop));
        assert!(s.transition_to(GameStatus::Playing));
        assert_eq!(s.status(), GameStatus::Playing);
    }

    #[test]
    fn test_invalid_transitions_are_refused() {
        let mut s = GameSession::new(1);
        assert!(!s.transition_to(GameStatus::Shop));
        assert_eq!(s.status(), GameStatus::Menu);
        assert!(!s.transition_to(GameStatus::Victory));

        s.transition_to(GameStatus::Playing);
        assert!(!s.transition_to(GameStatus::Menu));
        assert_eq!(s.status(), GameStatus::Playing);
    }

    #[test]
    fn test_three_hits_end_the_run() {
        let mut s = playing();
        assert_eq!(s.lives(), 3);
        s.take_damage();
        assert_eq!(s.lives(), 2);
        assert_eq!(s.status(), GameStatus::Playing);
        s.take_damage();
        assert_eq!(s.lives(), 1);
        s.take_damage();
        assert_eq!(s.lives(), 0);
        assert_eq!(s.status(), GameStatus::GameOver);
        assert_eq!(s.speed(), 0.0);

        // GameOver -> Menu is not allowed, retry is
        assert!(!s.transition_to(GameStatus::Menu));
        assert!(s.restart_game());
        assert_eq!(s.lives(), 3);
    }

    #[test]
    fn test_immortality_blocks_damage_then_expires() {
        let mut s = playing();
        assert!(!s.activate_immortality());
        s.add_score(1000);
        assert!(s.buy_item(ShopItem::Immortal, 500));
        assert!(s.activate_immortality());

        s.take_damage();
        assert_eq!(s.lives(), 3);

        s.advance_timers(IMMORTALITY_DURATION + 0.1);
        assert!(!s.is_immortality_active());
        s.take_damage();
        assert_eq!(s.lives(), 2);
    }

    #[test]
    fn test_full_word_advances_level() {
        let mut s = playing();
        let speed_before = s.speed();
        for i in 0..TARGET_WORD.len() {
            s.collect_letter(i);
        }
        assert_eq!(s.level(), 2);
        assert!(s.collected_letters().is_empty());
        assert_eq!(s.lane_count(), 5);
        assert_eq!(s.status(), GameStatus::Playing);
        assert!(s.speed() > speed_before);
    }

    #[test]
    fn test_full_word_on_last_level_wins() {
        let mut s = playing();
        s.set_level_for_test(MAX_LEVEL);
        for i in 0..TARGET_WORD.len() {
            s.collect_letter(i);
        }
        assert_eq!(s.status(), GameStatus::Victory);
        assert_eq!(s.level(), MAX_LEVEL);
        assert_eq!(s.score(), VICTORY_BONUS);
    }

    #[test]
    fn test_duplicate_letters_ignored() {
        let mut s = playing();
        s.collect_letter(3);
        s.collect_letter(3);
        s.collect_letter(99);
        assert_eq!(s.collected_letters(), &[3]);
    }

    #[test]
    fn test_speed_caps_at_three_times_base() {
        let mut s = playing();
        for _ in 0..40 {
            s.advance_level();
        }
        assert!((s.speed() - RUN_SPEED_BASE * 3.0).abs() < 1e-3);
        assert_eq!(s.lane_count(), MAX_LANES);
    }

    #[test]
    fn test_gem_value_within_bounds() {
        let mut s = playing();
        for _ in 0..50 {
            let before = s.score();
            s.collect_gem(50);
            let gained = s.score() - before;
            // 1.25x speed bonus at base speed, then +-20%
            assert!((50..=75).contains(&gained), "gained {gained}");
        }
        assert_eq!(s.gems_collected(), 50);
    }

    #[test]
    fn test_shop_flow_and_purchases() {
        let mut s = playing();
        s.open_shop();
        assert_eq!(s.status(), GameStatus::Shop);
        assert!(!s.buy_item(ShopItem::Heal, 10));

        s.add_score(300);
        s.set_lives_for_test(1);
        assert!(s.buy_item(ShopItem::Heal, 100));
        assert_eq!(s.lives(), 2);
        assert!(s.buy_item(ShopItem::MaxLife, 100));
        assert_eq!(s.max_lives(), 4);
        assert_eq!(s.lives(), 3);
        assert!(s.buy_item(ShopItem::DoubleJump, 100));
        assert!(s.has_double_jump());
        assert_eq!(s.score(), 0);

        assert!(s.close_shop());
        assert_eq!(s.status(), GameStatus::Playing);
    }

    #[test]
    fn test_restore_from_checkpoint() {
        let mut s = playing();
        s.add_score(1234);
        s.collect_letter(0);
        let mut cps = CheckpointManager::default();
        let level = LevelSnapshot {
            entities: Vec::new(),
            distance_traveled: 75.0,
            next_letter_distance: 150.0,
        };
        cps.create_checkpoint(&s.snapshot(), &level, 10.0);

        for _ in 0..3 {
            s.take_damage();
        }
        assert_eq!(s.status(), GameStatus::GameOver);

        let restored = s.restore_from_checkpoint(&cps, 20.0).unwrap();
        assert_eq!(restored, level);
        assert_eq!(s.status(), GameStatus::Playing);
        assert_eq!(s.score(), 1234);
        assert_eq!(s.lives(), 3);
        assert_eq!(s.collected_letters(), &[0]);
    }

    #[test]
    fn test_restore_without_checkpoint() {
        let mut s = playing();
        let cps = CheckpointManager::default();
        assert!(s.restore_from_checkpoint(&cps, 0.0).is_none());
    }
}
