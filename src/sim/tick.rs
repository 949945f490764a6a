//! Fixed timestep level simulation
//!
//! One `tick` moves every live entity toward the player, fires alien
//! projectiles, resolves contacts against the player box, recycles what left
//! the track and spawns new rows at the far end. All outside state is reached
//! through `TickContext`; the simulation itself only owns entities, the
//! travelled distance and the letter schedule.

use glam::Vec3;

use super::collision::{Contact, check_contact};
use super::entity::{Entity, EntityKind, EntityPayload};
use super::events::{EventQueue, GameEvent};
use super::spawn::{ActiveEntities, SpawnInputs, SpawnOutcome, Spawner};
use crate::checkpoint::{CheckpointStore, LevelSnapshot};
use crate::consts::{LANE_WIDTH, REMOVE_DISTANCE, SPAWN_DISTANCE};
use crate::difficulty::{DifficultyController, MetricsUpdate};
use crate::pool::PoolStats;
use crate::session::{GameStatus, GameStore};
use crate::tuning::SpawnTuning;
use crate::{lane_to_x, max_lane_offset};

/// Entities further ahead than this are dropped on level-up
const LEVEL_UP_CLEAR_Z: f32 = -80.0;
/// Where the shop portal appears after a level-up
const SHOP_PORTAL_Z: f32 = -100.0;
/// Missiles appear just in front of their alien
const MISSILE_LEAD: f32 = 2.0;

/// Player state read once per tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerTransform {
    /// Feet position
    pub position: Vec3,
    pub grounded: bool,
}

impl Default for PlayerTransform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            grounded: true,
        }
    }
}

/// Collaborators borrowed for one tick
pub struct TickContext<'a> {
    pub store: &'a mut dyn GameStore,
    pub checkpoints: &'a mut dyn CheckpointStore,
    pub difficulty: &'a mut DifficultyController,
    pub player: PlayerTransform,
    /// Host clock (seconds)
    pub now: f64,
}

/// Debug view of the simulation
#[derive(Debug, Clone, PartialEq)]
pub struct SimSnapshot {
    pub entity_count: usize,
    pub distance_traveled: f32,
    pub next_letter_distance: f32,
    pub last_status: GameStatus,
    pub last_level: u32,
    pub pool: PoolStats,
    pub pending_events: usize,
}

/// Owner of the live entity set
#[derive(Debug)]
pub struct LevelSimulation {
    active: ActiveEntities,
    spawner: Spawner,
    events: EventQueue,
    distance_traveled: f32,
    last_status: GameStatus,
    last_level: u32,
    was_grounded: Option<bool>,
    metrics_timer: f32,
}

impl LevelSimulation {
    pub fn new(tuning: SpawnTuning, seed: u64) -> Self {
        Self {
            active: ActiveEntities::new(),
            spawner: Spawner::new(tuning, seed),
            events: EventQueue::default(),
            distance_traveled: 0.0,
            last_status: GameStatus::Menu,
            last_level: 1,
            was_grounded: None,
            metrics_timer: 0.0,
        }
    }

    /// Advance the level by one fixed step
    pub fn tick(&mut self, dt: f32, ctx: &mut TickContext<'_>) {
        self.sync_status(ctx);
        self.track_landing(ctx.player);

        // Shop holds positions; every other non-playing status is frozen too
        if ctx.store.status() != GameStatus::Playing {
            return;
        }

        let tuning = self.spawner.tuning();
        let multiplier = ctx.difficulty.difficulty_multiplier();
        let speed = ctx.store.speed() * (1.0 + (multiplier - 1.0) * tuning.speed_influence);
        let projectile_speed = tuning.projectile_speed;
        let enemy_fire_z = tuning.enemy_fire_z;
        let metrics_interval = tuning.metrics_interval;

        let step = speed * dt;
        self.distance_traveled += step;

        if ctx.checkpoints.should_create_checkpoint(self.distance_traveled) {
            let level = self.level_snapshot();
            ctx.checkpoints
                .create_checkpoint(&ctx.store.snapshot(), &level, ctx.now);
            self.events.push(GameEvent::CheckpointCreated {
                distance: self.distance_traveled,
            });
        }

        self.advance_entities(dt, step, projectile_speed, enemy_fire_z, ctx);

        let remove_z = ctx.player.position.z + REMOVE_DISTANCE;
        self.active
            .retain(|e| e.active && e.position.z <= remove_z);

        // Contacts may have ended the run or completed the word
        self.sync_status(ctx);
        if ctx.store.status() == GameStatus::Playing {
            let collected = ctx.store.collected_letters().to_vec();
            let inputs = SpawnInputs {
                lane_count: ctx.store.lane_count(),
                level: ctx.store.level(),
                speed,
                multiplier,
                collected_letters: &collected,
                distance: self.distance_traveled,
                player_z: ctx.player.position.z,
                now: ctx.now,
            };
            let outcome = self.spawner.spawn_cycle(&mut self.active, &inputs);
            if outcome != SpawnOutcome::NotDue {
                log::debug!(
                    "Spawn {:?} at distance {:.1} ({} live)",
                    outcome,
                    self.distance_traveled,
                    self.active.len()
                );
            }
        }

        self.metrics_timer += dt;
        if self.metrics_timer >= metrics_interval {
            self.metrics_timer = 0.0;
            let update = MetricsUpdate {
                score: Some(ctx.store.score() as f32),
                distance: Some(self.distance_traveled),
                current_speed: Some(speed),
                obstacle_density: Some(self.obstacle_density(ctx)),
            };
            ctx.difficulty.update_metrics(update, ctx.now);
        }
    }

    /// Move, fire and collide every live entity
    fn advance_entities(
        &mut self,
        dt: f32,
        step: f32,
        projectile_speed: f32,
        enemy_fire_z: f32,
        ctx: &mut TickContext<'_>,
    ) {
        let player = ctx.player.position;
        let mut fired: Vec<Vec3> = Vec::new();

        for entity in self.active.iter_mut() {
            let prev_z = entity.position.z;
            entity.position.z += step;
            if entity.kind == EntityKind::Missile {
                entity.position.z += projectile_speed * dt;
            }

            if entity.active && entity.is_armed() && entity.position.z > enemy_fire_z {
                entity.mark_fired();
                fired.push(entity.position);
            }

            match check_contact(entity, prev_z, player) {
                Contact::None => {}
                Contact::Damage => {
                    entity.active = false;
                    let lives_before = ctx.store.lives();
                    ctx.store.take_damage();
                    if ctx.store.lives() < lives_before {
                        ctx.difficulty.record_death();
                    }
                    self.events.push(GameEvent::PlayerHit { kind: entity.kind });
                    if entity.kind == EntityKind::Missile {
                        self.events.push(GameEvent::ParticleBurst {
                            position: entity.position,
                            color: entity.color,
                        });
                    }
                }
                Contact::Collect => {
                    entity.active = false;
                    Self::collect(entity, &mut *ctx.store, &mut self.events);
                }
                Contact::EnterShop => {
                    entity.active = false;
                    ctx.store.open_shop();
                    self.events.push(GameEvent::ShopEntered);
                    log::info!("Shop portal reached");
                }
            }
        }

        // Missiles fly down the player's lane, not the alien's
        let max_lane = max_lane_offset(ctx.store.lane_count());
        let player_lane = ((player.x / LANE_WIDTH).round() as i32).clamp(-max_lane, max_lane);
        let target_x = lane_to_x(player_lane);
        for origin in fired {
            self.active
                .spawn()
                .missile(target_x, origin.z + MISSILE_LEAD);
        }
    }

    fn collect(entity: &Entity, store: &mut dyn GameStore, events: &mut EventQueue) {
        match entity.payload {
            EntityPayload::Points(points) => {
                store.collect_gem(points);
                events.push(GameEvent::GemCollected { points });
            }
            EntityPayload::Letter {
                value,
                target_index,
            } => {
                store.collect_letter(target_index);
                events.push(GameEvent::LetterCollected {
                    value,
                    target_index,
                });
            }
            _ => {}
        }
        events.push(GameEvent::ParticleBurst {
            position: entity.position,
            color: entity.color,
        });
    }

    /// React to status and level changes made by the store
    fn sync_status(&mut self, ctx: &mut TickContext<'_>) {
        let status = ctx.store.status();
        let level = ctx.store.level();
        let previous = self.last_status;

        let entered_menu = status == GameStatus::Menu && previous != GameStatus::Menu;
        let new_run = status == GameStatus::Playing
            && matches!(
                previous,
                GameStatus::Menu | GameStatus::GameOver | GameStatus::Victory
            );

        if entered_menu || new_run {
            self.reset_run();
            ctx.checkpoints.clear_checkpoint();
            ctx.difficulty.start_session(ctx.now);
            log::info!("Level reset for a new run");
        } else if level != self.last_level && status == GameStatus::Playing && level > 1 {
            self.on_level_up(level);
        } else if status != previous
            && matches!(status, GameStatus::GameOver | GameStatus::Victory)
        {
            let distance = self.distance_traveled.floor();
            ctx.store.set_distance(distance);
            self.events.push(if status == GameStatus::Victory {
                GameEvent::Victory
            } else {
                GameEvent::GameOver { distance }
            });
            log::info!("Run ended ({:?}) at distance {distance}", status);
        }

        self.last_status = status;
        self.last_level = level;
    }

    fn reset_run(&mut self) {
        self.active.clear();
        self.distance_traveled = 0.0;
        self.metrics_timer = 0.0;
        self.spawner.reset_letters();
    }

    fn on_level_up(&mut self, level: u32) {
        self.active.retain(|e| e.position.z > LEVEL_UP_CLEAR_Z);
        self.active.spawn().shop_portal(SHOP_PORTAL_Z);
        let interval = self.spawner.tuning().letter_interval(level);
        self.spawner
            .set_next_letter_distance(self.distance_traveled - SPAWN_DISTANCE + interval);
        self.events.push(GameEvent::LevelAdvanced { level });
        log::info!("Level {level} reached, shop portal placed");
    }

    fn track_landing(&mut self, player: PlayerTransform) {
        if self.was_grounded == Some(false) && player.grounded {
            self.events.push(GameEvent::PlayerLand);
        }
        self.was_grounded = Some(player.grounded);
    }

    /// Share of lane slots ahead of the player taken by hazards
    fn obstacle_density(&self, ctx: &TickContext<'_>) -> f32 {
        let player_z = ctx.player.position.z;
        let hazards = self
            .active
            .as_slice()
            .iter()
            .filter(|e| {
                e.kind.is_damage_source()
                    && e.position.z < player_z
                    && e.position.z >= player_z - SPAWN_DISTANCE
            })
            .count();
        let rows = SPAWN_DISTANCE / self.spawner.tuning().min_gap_base.max(1.0);
        let slots = rows * ctx.store.lane_count().max(1) as f32;
        hazards as f32 / slots
    }

    /// Copy of the state a checkpoint needs
    pub fn level_snapshot(&self) -> LevelSnapshot {
        LevelSnapshot {
            entities: self.active.as_slice().to_vec(),
            distance_traveled: self.distance_traveled,
            next_letter_distance: self.spawner.next_letter_distance(),
        }
    }

    /// Replace the whole level with a checkpoint's copy.
    ///
    /// `store` must already hold the restored session so the next tick does
    /// not mistake the restore for a fresh run.
    pub fn restore_checkpoint(&mut self, snapshot: &LevelSnapshot, store: &dyn GameStore) {
        self.active.replace_with(&snapshot.entities);
        self.distance_traveled = snapshot.distance_traveled;
        self.spawner
            .set_next_letter_distance(snapshot.next_letter_distance);
        self.last_status = store.status();
        self.last_level = store.level();
        self.metrics_timer = 0.0;
        self.events.push(GameEvent::CheckpointRestored {
            distance: snapshot.distance_traveled,
        });
        log::info!(
            "Level restored at distance {:.1} with {} entities",
            snapshot.distance_traveled,
            snapshot.entities.len()
        );
    }

    /// Take all events raised since the last drain
    pub fn drain_events(&mut self) -> Vec<GameEvent> {
        self.events.drain().collect()
    }

    pub fn entities(&self) -> &[Entity] {
        self.active.as_slice()
    }

    pub fn distance_traveled(&self) -> f32 {
        self.distance_traveled
    }

    pub fn next_letter_distance(&self) -> f32 {
        self.spawner.next_letter_distance()
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.active.pool_stats()
    }

    pub fn snapshot_internal_state(&self) -> SimSnapshot {
        SimSnapshot {
            entity_count: self.active.len(),
            distance_traveled: self.distance_traveled,
            next_letter_distance: self.spawner.next_letter_distance(),
            last_status: self.last_status,
            last_level: self.last_level,
            pool: self.active.pool_stats(),
            pending_events: self.events.len(),
        }
    }

    /// Place an entity directly, bypassing spawn rules
    #[doc(hidden)]
    pub fn insert_for_test(&mut self, init: impl FnOnce(&mut Entity)) -> u32 {
        let entity = self.active.spawn();
        init(entity);
        entity.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::CheckpointManager;
    use crate::consts::{MAX_LEVEL, SIM_DT, TARGET_WORD};
    use crate::difficulty::MemoryModelStorage;
    use crate::lane_to_x;
    use crate::session::{GameSession, ShopItem};
    use crate::tuning::DifficultyTuning;
    use std::collections::HashSet;

    struct World {
        sim: LevelSimulation,
        session: GameSession,
        checkpoints: CheckpointManager,
        difficulty: DifficultyController,
        player: PlayerTransform,
        now: f64,
    }

    impl World {
        fn new(seed: u64) -> Self {
            let _ = env_logger::builder().is_test(true).try_init();
            let mut session = GameSession::new(seed);
            session.start_game();
            Self {
                sim: LevelSimulation::new(SpawnTuning::default(), seed),
                session,
                checkpoints: CheckpointManager::default(),
                difficulty: DifficultyController::new(
                    DifficultyTuning::default(),
                    Box::new(MemoryModelStorage::default()),
                    seed,
                ),
                player: PlayerTransform::default(),
                now: 0.0,
            }
        }

        fn tick(&mut self) {
            self.now += SIM_DT as f64;
            let mut ctx = TickContext {
                store: &mut self.session,
                checkpoints: &mut self.checkpoints,
                difficulty: &mut self.difficulty,
                player: self.player,
                now: self.now,
            };
            self.sim.tick(SIM_DT, &mut ctx);
        }

        fn ahead(&self) -> usize {
            self.sim
                .entities()
                .iter()
                .filter(|e| e.position.z < self.player.position.z)
                .count()
        }
    }

    #[test]
    fn test_first_tick_spawns_ahead() {
        let mut w = World::new(1);
        assert!(w.sim.entities().is_empty());
        w.tick();
        assert!(w.ahead() > 0);
        assert!(w.sim.distance_traveled() > 0.0);
    }

    #[test]
    fn test_never_empty_ahead_while_playing() {
        let mut w = World::new(5);
        // Park the player in a lane nothing will hit
        w.player.position.x = 100.0;
        for _ in 0..3000 {
            w.tick();
            assert!(w.ahead() > 0);
        }
        assert_eq!(w.session.status(), GameStatus::Playing);
    }

    #[test]
    fn test_ids_unique_and_pool_balanced() {
        let mut w = World::new(11);
        w.player.position.x = 100.0;
        for _ in 0..2000 {
            w.tick();
            let ids: HashSet<u32> = w.sim.entities().iter().map(|e| e.id).collect();
            assert_eq!(ids.len(), w.sim.entities().len());
        }
        assert_eq!(w.sim.pool_stats().active, w.sim.entities().len());
    }

    #[test]
    fn test_obstacle_hit_costs_a_life() {
        let mut w = World::new(2);
        w.tick();
        w.sim.insert_for_test(|e| e.obstacle(0.0, -0.2));
        w.tick();
        assert_eq!(w.session.lives(), 2);
        let events = w.sim.drain_events();
        assert!(events.contains(&GameEvent::PlayerHit {
            kind: EntityKind::Obstacle
        }));
        assert_eq!(w.difficulty.snapshot_internal_state().death_count, 1);
    }

    #[test]
    fn test_immortal_hit_is_not_a_death() {
        let mut w = World::new(2);
        w.session.add_score(10_000);
        assert!(w.session.buy_item(ShopItem::Immortal, 100));
        assert!(w.session.activate_immortality());
        w.tick();
        w.sim.insert_for_test(|e| e.obstacle(0.0, -0.2));
        w.tick();
        assert_eq!(w.session.lives(), 3);
        assert_eq!(w.difficulty.snapshot_internal_state().death_count, 0);
    }

    #[test]
    fn test_hits_after_game_over_are_not_deaths() {
        let mut w = World::new(2);
        w.session.set_lives_for_test(1);
        w.tick();
        w.sim.insert_for_test(|e| e.obstacle(0.0, -0.2));
        w.sim.insert_for_test(|e| e.obstacle(0.0, -0.3));
        w.tick();
        assert_eq!(w.session.status(), GameStatus::GameOver);
        assert_eq!(w.difficulty.snapshot_internal_state().death_count, 1);
    }

    #[test]
    fn test_jumping_clears_obstacle_but_not_gem() {
        let mut w = World::new(2);
        w.tick();
        w.player.position.y = 2.0;
        w.sim.insert_for_test(|e| e.obstacle(0.0, -0.2));
        w.sim.insert_for_test(|e| e.gem(lane_to_x(0), 3.0, -0.2, 50));
        let score = w.session.score();
        w.tick();
        assert_eq!(w.session.lives(), 3);
        assert!(w.session.score() > score);
    }

    #[test]
    fn test_three_hits_end_the_run() {
        let mut w = World::new(3);
        for _ in 0..3 {
            w.tick();
            w.sim.insert_for_test(|e| e.obstacle(0.0, -0.2));
            w.tick();
        }
        assert_eq!(w.session.status(), GameStatus::GameOver);
        let events = w.sim.drain_events();
        let over = events
            .iter()
            .filter(|e| matches!(e, GameEvent::GameOver { .. }))
            .count();
        assert_eq!(over, 1);
        assert_eq!(w.session.distance(), w.sim.distance_traveled().floor());

        // Frozen once the run is over
        let distance = w.sim.distance_traveled();
        w.tick();
        assert_eq!(w.sim.distance_traveled(), distance);
    }

    #[test]
    fn test_full_word_advances_level_with_shop_portal() {
        let mut w = World::new(4);
        w.tick();
        for i in 0..TARGET_WORD.len() {
            w.sim.insert_for_test(|e| {
                e.letter(0.0, -0.2, i);
            });
            w.tick();
        }
        assert_eq!(w.session.level(), 2);
        assert!(w.session.collected_letters().is_empty());
        assert_eq!(w.session.status(), GameStatus::Playing);
        assert!(
            w.sim
                .entities()
                .iter()
                .any(|e| e.kind == EntityKind::ShopPortal)
        );
        assert!(w.sim.entities().iter().all(|e| e.position.z > -80.0
            || e.kind == EntityKind::ShopPortal
            || e.position.z <= -SPAWN_DISTANCE));
        assert!(
            w.sim
                .drain_events()
                .contains(&GameEvent::LevelAdvanced { level: 2 })
        );
    }

    #[test]
    fn test_full_word_on_last_level_wins() {
        let mut w = World::new(6);
        w.session.set_level_for_test(MAX_LEVEL);
        w.tick();
        for i in 0..TARGET_WORD.len() {
            w.sim.insert_for_test(|e| {
                e.letter(0.0, -0.2, i);
            });
            w.tick();
        }
        assert_eq!(w.session.status(), GameStatus::Victory);
        assert!(w.sim.drain_events().contains(&GameEvent::Victory));
    }

    #[test]
    fn test_shop_holds_positions() {
        let mut w = World::new(7);
        w.tick();
        w.sim.insert_for_test(|e| e.shop_portal(-0.2));
        w.tick();
        assert_eq!(w.session.status(), GameStatus::Shop);

        let before = w.sim.level_snapshot();
        for _ in 0..30 {
            w.tick();
        }
        assert_eq!(w.sim.level_snapshot(), before);

        assert!(w.session.close_shop());
        w.tick();
        assert!(w.sim.distance_traveled() > before.distance_traveled);
    }

    #[test]
    fn test_alien_fires_once() {
        let mut w = World::new(8);
        w.player.position.x = 100.0;
        w.tick();
        let alien = w.sim.insert_for_test(|e| e.alien(0.0, -89.9));
        w.tick();
        w.tick();
        let missiles = w
            .sim
            .entities()
            .iter()
            .filter(|e| e.kind == EntityKind::Missile)
            .count();
        assert_eq!(missiles, 1);
        let alien = w.sim.entities().iter().find(|e| e.id == alien).unwrap();
        assert!(!alien.is_armed());
    }

    #[test]
    fn test_missile_targets_player_lane() {
        let mut w = World::new(8);
        w.player.position.x = lane_to_x(1);
        w.tick();
        w.sim.insert_for_test(|e| e.alien(lane_to_x(-1), -89.9));
        w.tick();
        let missile = w
            .sim
            .entities()
            .iter()
            .find(|e| e.kind == EntityKind::Missile)
            .unwrap();
        assert_eq!(missile.position.x, w.player.position.x);

        // Off-track positions aim at the nearest outer lane
        let mut w = World::new(8);
        w.player.position.x = -100.0;
        w.tick();
        w.sim.insert_for_test(|e| e.alien(0.0, -89.9));
        w.tick();
        let missile = w
            .sim
            .entities()
            .iter()
            .find(|e| e.kind == EntityKind::Missile)
            .unwrap();
        assert_eq!(missile.position.x, lane_to_x(-1));
    }

    #[test]
    fn test_missile_outruns_scroll() {
        let mut w = World::new(8);
        w.player.position.x = 100.0;
        w.tick();
        let id = w.sim.insert_for_test(|e| e.missile(0.0, -60.0));
        w.tick();
        let z = w.sim.entities().iter().find(|e| e.id == id).unwrap().position.z;
        let scroll = w.session.speed() * SIM_DT;
        assert!(z + 60.0 > scroll + 1e-3);
    }

    #[test]
    fn test_checkpoint_created_and_restored() {
        let mut w = World::new(9);
        w.player.position.x = 100.0;
        while !w.checkpoints.has_checkpoint() {
            w.tick();
        }
        assert!(
            w.sim
                .drain_events()
                .iter()
                .any(|e| matches!(e, GameEvent::CheckpointCreated { .. }))
        );
        let saved = w.checkpoints.last_checkpoint().unwrap().level.clone();

        for _ in 0..60 {
            w.tick();
        }
        w.session.set_lives_for_test(1);
        w.player.position.x = 0.0;
        while w.session.status() == GameStatus::Playing {
            w.sim.insert_for_test(|e| e.obstacle(0.0, -0.2));
            w.tick();
        }

        let snapshot = w
            .session
            .restore_from_checkpoint(&w.checkpoints, w.now)
            .unwrap();
        w.sim.restore_checkpoint(&snapshot, &w.session);
        assert_eq!(w.sim.distance_traveled(), saved.distance_traveled);
        assert_eq!(w.sim.entities(), saved.entities.as_slice());
        assert_eq!(w.session.status(), GameStatus::Playing);

        w.player.position.x = 100.0;
        w.tick();
        // Restored, not reset
        assert!(w.sim.distance_traveled() > saved.distance_traveled);
        assert!(w.checkpoints.has_checkpoint());
    }

    #[test]
    fn test_restart_clears_level_and_checkpoint() {
        let mut w = World::new(10);
        w.player.position.x = 100.0;
        while !w.checkpoints.has_checkpoint() {
            w.tick();
        }
        w.session.set_status_for_test(GameStatus::GameOver);
        w.tick();
        assert!(w.session.restart_game());
        w.tick();
        assert!(!w.checkpoints.has_checkpoint());
        assert!(w.sim.distance_traveled() < 1.0);
    }

    #[test]
    fn test_landing_event() {
        let mut w = World::new(12);
        w.player.grounded = false;
        w.tick();
        w.player.grounded = true;
        w.tick();
        assert!(w.sim.drain_events().contains(&GameEvent::PlayerLand));
    }

    #[test]
    fn test_metrics_reach_controller() {
        let mut w = World::new(13);
        w.player.position.x = 100.0;
        for _ in 0..(60 * 7) {
            w.tick();
        }
        let snap = w.difficulty.snapshot_internal_state();
        assert!(snap.history_len >= 5);
        assert!(w.difficulty.latest_metrics().unwrap().distance > 0.0);
    }
}
