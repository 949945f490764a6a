//! Entity ownership and spawn decisions
//!
//! `ActiveEntities` is the single live collection; every entity enters it
//! through the pool and leaves it back into the pool. `Spawner` decides what
//! to put at the far end of the track whenever the nearest row has scrolled
//! close enough.

use std::collections::HashSet;

use rand::seq::{IndexedRandom, SliceRandom};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use super::entity::{Entity, EntityKind};
use super::patterns::{LevelPattern, PatternManager};
use crate::consts::{OBSTACLE_HEIGHT, SPAWN_DISTANCE, TARGET_WORD};
use crate::pool::{ObjectPool, PoolStats};
use crate::tuning::{SpawnMode, SpawnTuning};
use crate::{lane_offsets, lane_to_x, max_lane_offset};

/// Instances created up front
pub const POOL_INITIAL_SIZE: usize = 50;
/// Free list cap
pub const POOL_MAX_SIZE: usize = 500;

/// Gems float at this height
const GEM_HEIGHT: f32 = 1.2;

/// The live entity list plus the pool that recycles it
pub struct ActiveEntities {
    entities: Vec<Entity>,
    pool: ObjectPool<Entity>,
    next_id: u32,
}

impl std::fmt::Debug for ActiveEntities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveEntities")
            .field("len", &self.entities.len())
            .field("pool", &self.pool.stats())
            .field("next_id", &self.next_id)
            .finish()
    }
}

impl Default for ActiveEntities {
    fn default() -> Self {
        Self::new()
    }
}

impl ActiveEntities {
    pub fn new() -> Self {
        Self {
            entities: Vec::new(),
            pool: ObjectPool::new(
                Entity::default,
                Entity::reset,
                POOL_INITIAL_SIZE,
                POOL_MAX_SIZE,
            ),
            next_id: 1,
        }
    }

    /// Pull an instance from the pool, give it an id if it is new, and append it
    pub fn spawn(&mut self) -> &mut Entity {
        let mut entity = self.pool.acquire();
        if entity.id == 0 {
            entity.id = self.next_id;
            self.next_id += 1;
        }
        let index = self.entities.len();
        self.entities.push(entity);
        &mut self.entities[index]
    }

    /// Release every entity `keep` rejects back to the pool, preserving order
    pub fn retain(&mut self, mut keep: impl FnMut(&Entity) -> bool) {
        let mut kept = Vec::with_capacity(self.entities.len());
        for entity in self.entities.drain(..) {
            if keep(&entity) {
                kept.push(entity);
            } else {
                self.pool.release(entity);
            }
        }
        self.entities = kept;
    }

    /// Release everything
    pub fn clear(&mut self) {
        for entity in self.entities.drain(..) {
            self.pool.release(entity);
        }
    }

    /// Replace the live set with copies of `entities`.
    ///
    /// The free list is dropped so no pooled instance can share an id with a
    /// restored one; ids that are missing or repeated get fresh ones.
    pub fn replace_with(&mut self, entities: &[Entity]) {
        self.entities.clear();
        self.pool.clear();

        let max_id = entities.iter().map(|e| e.id).max().unwrap_or(0);
        self.next_id = self.next_id.max(max_id.saturating_add(1));

        let mut seen = HashSet::with_capacity(entities.len());
        for source in entities {
            let slot = self.spawn();
            let fresh_id = slot.id;
            *slot = source.clone();
            if slot.id == 0 || !seen.insert(slot.id) {
                slot.id = fresh_id;
                seen.insert(fresh_id);
            }
        }
    }

    pub fn as_slice(&self) -> &[Entity] {
        &self.entities
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Entity> {
        self.entities.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Smallest travel coordinate among non-projectile entities
    pub fn furthest_static_z(&self) -> Option<f32> {
        self.entities
            .iter()
            .filter(|e| e.kind != EntityKind::Missile)
            .map(|e| e.position.z)
            .min_by(f32::total_cmp)
    }
}

/// World facts the spawner reads for one decision
#[derive(Debug, Clone, Copy)]
pub struct SpawnInputs<'a> {
    pub lane_count: u32,
    pub level: u32,
    /// Effective scroll speed
    pub speed: f32,
    /// Current difficulty multiplier
    pub multiplier: f32,
    pub collected_letters: &'a [usize],
    pub distance: f32,
    pub player_z: f32,
    pub now: f64,
}

/// What a spawn cycle produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnOutcome {
    /// Nearest row has not scrolled far enough yet
    NotDue,
    /// Deliberate gap
    Skipped,
    Letter,
    Pattern,
    Obstacles,
    Enemies,
    Gem,
}

/// Procedural and pattern-driven spawning
#[derive(Debug, Clone)]
pub struct Spawner {
    tuning: SpawnTuning,
    rng: Pcg32,
    patterns: PatternManager,
    next_letter_distance: f32,
}

impl Spawner {
    pub fn new(tuning: SpawnTuning, seed: u64) -> Self {
        let next_letter_distance = tuning.letter_interval(1);
        Self {
            tuning,
            rng: Pcg32::seed_from_u64(seed),
            patterns: PatternManager::new(seed.wrapping_add(1)),
            next_letter_distance,
        }
    }

    pub fn tuning(&self) -> &SpawnTuning {
        &self.tuning
    }

    pub fn next_letter_distance(&self) -> f32 {
        self.next_letter_distance
    }

    pub fn set_next_letter_distance(&mut self, distance: f32) {
        self.next_letter_distance = distance;
    }

    /// Letter schedule back to the start of level 1
    pub fn reset_letters(&mut self) {
        self.next_letter_distance = self.tuning.letter_interval(1);
    }

    pub fn patterns(&self) -> &PatternManager {
        &self.patterns
    }

    fn random_lane(&mut self, lane_count: u32) -> i32 {
        let max = max_lane_offset(lane_count);
        self.rng.random_range(-max..=max)
    }

    /// Lane offsets in random order
    fn shuffled_lanes(&mut self, lane_count: u32) -> Vec<i32> {
        let mut lanes = lane_offsets(lane_count);
        lanes.shuffle(&mut self.rng);
        lanes
    }

    /// Run one spawn decision against the live set
    pub fn spawn_cycle(&mut self, active: &mut ActiveEntities, inputs: &SpawnInputs<'_>) -> SpawnOutcome {
        let multiplier = if inputs.multiplier.is_finite() && inputs.multiplier > 0.0 {
            inputs.multiplier
        } else {
            1.0
        };

        let spawn_z = match active.furthest_static_z() {
            None => -SPAWN_DISTANCE,
            Some(furthest) if furthest > -SPAWN_DISTANCE => {
                let min_gap = self.tuning.min_gap(inputs.speed) / multiplier;
                (furthest - min_gap).min(-SPAWN_DISTANCE)
            }
            Some(_) => return SpawnOutcome::NotDue,
        };

        if self.tuning.mode == SpawnMode::Patterned
            && self.patterns.should_switch_pattern(inputs.now)
        {
            if let Some(pattern) = self.patterns.next_pattern(inputs.now) {
                if self.stamp_pattern(active, pattern, spawn_z, inputs) > 0 {
                    return SpawnOutcome::Pattern;
                }
            }
        }

        if inputs.distance >= self.next_letter_distance {
            return self.spawn_letter(active, spawn_z, inputs);
        }

        // Never open a gap when nothing is left in front of the player
        let anything_ahead = active
            .as_slice()
            .iter()
            .any(|e| e.active && e.position.z < inputs.player_z);
        let skip_chance = (self.tuning.skip_chance / multiplier).clamp(0.0, 1.0);
        if anything_ahead && self.rng.random::<f32>() < skip_chance {
            log::debug!("Spawn skipped at z {spawn_z:.1}");
            return SpawnOutcome::Skipped;
        }

        if self.rng.random::<f32>() > self.tuning.obstacle_threshold {
            if inputs.level >= self.tuning.enemy_min_level
                && self.rng.random::<f32>() < self.tuning.enemy_chance
            {
                self.spawn_enemies(active, spawn_z, inputs.lane_count);
                SpawnOutcome::Enemies
            } else {
                self.spawn_obstacle_cluster(active, spawn_z, inputs.lane_count);
                SpawnOutcome::Obstacles
            }
        } else {
            let lane = self.random_lane(inputs.lane_count);
            active
                .spawn()
                .gem(lane_to_x(lane), GEM_HEIGHT, spawn_z, self.tuning.gem_points);
            SpawnOutcome::Gem
        }
    }

    /// Spawn a letter for a random uncollected index, or a gem when the word is done
    fn spawn_letter(
        &mut self,
        active: &mut ActiveEntities,
        spawn_z: f32,
        inputs: &SpawnInputs<'_>,
    ) -> SpawnOutcome {
        let lane = self.random_lane(inputs.lane_count);
        let available: Vec<usize> = (0..TARGET_WORD.len())
            .filter(|i| !inputs.collected_letters.contains(i))
            .collect();

        match available.choose(&mut self.rng) {
            Some(&index) => {
                active.spawn().letter(lane_to_x(lane), spawn_z, index);
                self.next_letter_distance += self.tuning.letter_interval(inputs.level);
                log::debug!(
                    "Letter {} spawned, next at {:.0}",
                    TARGET_WORD[index],
                    self.next_letter_distance
                );
                SpawnOutcome::Letter
            }
            None => {
                active
                    .spawn()
                    .gem(lane_to_x(lane), GEM_HEIGHT, spawn_z, self.tuning.gem_points);
                SpawnOutcome::Gem
            }
        }
    }

    /// One to three obstacles side by side, leaving a lane open when possible
    fn spawn_obstacle_cluster(&mut self, active: &mut ActiveEntities, spawn_z: f32, lane_count: u32) {
        let lanes = self.shuffled_lanes(lane_count);
        let roll = self.rng.random::<f32>();
        let wanted = if roll > self.tuning.three_lane_threshold {
            3
        } else if roll > self.tuning.two_lane_threshold {
            2
        } else {
            1
        };
        let count = wanted.min(lanes.len().saturating_sub(1).max(1));

        for &lane in &lanes[..count] {
            let x = lane_to_x(lane);
            active.spawn().obstacle(x, spawn_z);
            if self.rng.random::<f32>() < self.tuning.bonus_gem_chance {
                active
                    .spawn()
                    .gem(x, OBSTACLE_HEIGHT + 1.0, spawn_z, self.tuning.bonus_gem_points);
            }
        }
    }

    /// One or two aliens in distinct lanes
    fn spawn_enemies(&mut self, active: &mut ActiveEntities, spawn_z: f32, lane_count: u32) {
        let lanes = self.shuffled_lanes(lane_count);
        let wanted = if self.rng.random::<f32>() > self.tuning.double_enemy_threshold {
            2
        } else {
            1
        };
        let count = wanted.min(lanes.len().saturating_sub(1).max(1));
        for &lane in &lanes[..count] {
            active.spawn().alien(lane_to_x(lane), spawn_z);
        }
        log::debug!("{count} enemies spawned at z {spawn_z:.1}");
    }

    /// Place every instruction of `pattern` behind `anchor_z`; returns how many were placed
    fn stamp_pattern(
        &mut self,
        active: &mut ActiveEntities,
        pattern: &LevelPattern,
        anchor_z: f32,
        inputs: &SpawnInputs<'_>,
    ) -> usize {
        let max = max_lane_offset(inputs.lane_count);
        let mut placed = 0;
        for instruction in pattern.spawns {
            let x = lane_to_x(instruction.lane.clamp(-max, max));
            let z = anchor_z - instruction.z_offset * self.tuning.pattern_spacing;
            match instruction.kind {
                EntityKind::Obstacle => active.spawn().obstacle(x, z),
                EntityKind::Gem => active.spawn().gem(x, GEM_HEIGHT, z, self.tuning.gem_points),
                EntityKind::Beer => active.spawn().beer(x, z, self.tuning.beer_points),
                EntityKind::Alien => active.spawn().alien(x, z),
                EntityKind::Missile => active.spawn().missile(x, z),
                EntityKind::Letter => {
                    let Some(index) = instruction.target_index else {
                        continue;
                    };
                    if index >= TARGET_WORD.len() || inputs.collected_letters.contains(&index) {
                        continue;
                    }
                    active.spawn().letter(x, z, index);
                }
                EntityKind::ShopPortal => continue,
            }
            placed += 1;
        }
        log::debug!("Pattern {} placed {placed} entities", pattern.id);
        placed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::RUN_SPEED_BASE;

    fn inputs(collected: &[usize]) -> SpawnInputs<'_> {
        SpawnInputs {
            lane_count: 3,
            level: 1,
            speed: RUN_SPEED_BASE,
            multiplier: 1.0,
            collected_letters: collected,
            distance: 0.0,
            player_z: 0.0,
            now: 0.0,
        }
    }

    #[test]
    fn test_spawn_assigns_unique_ids_and_recycles() {
        let mut active = ActiveEntities::new();
        let a = active.spawn().id;
        let b = active.spawn().id;
        assert_ne!(a, b);

        active.retain(|e| e.id != a);
        assert_eq!(active.len(), 1);
        let c = active.spawn().id;
        // Recycled instance keeps its id
        assert_eq!(c, a);
    }

    #[test]
    fn test_replace_with_fixes_ids_and_copies() {
        let mut active = ActiveEntities::new();
        active.spawn().obstacle(0.0, -10.0);

        let mut source = vec![Entity::default(); 3];
        source[0].id = 40;
        source[1].id = 40;
        source[2].id = 0;
        for e in &mut source {
            e.obstacle(0.0, -50.0);
        }
        active.replace_with(&source);

        let ids: HashSet<u32> = active.as_slice().iter().map(|e| e.id).collect();
        assert_eq!(ids.len(), 3);
        assert!(!ids.contains(&0));
        assert!(ids.contains(&40));
        assert_eq!(active.pool_stats().active, 3);

        source[0].position.z = 99.0;
        assert!(active.as_slice().iter().all(|e| e.position.z == -50.0));
    }

    #[test]
    fn test_empty_set_spawns_immediately() {
        let mut active = ActiveEntities::new();
        let mut spawner = Spawner::new(SpawnTuning::default(), 1);
        let outcome = spawner.spawn_cycle(&mut active, &inputs(&[]));
        assert_ne!(outcome, SpawnOutcome::NotDue);
        assert_ne!(outcome, SpawnOutcome::Skipped);
        assert!(!active.is_empty());
        assert!(active.as_slice().iter().all(|e| e.position.z <= -SPAWN_DISTANCE));
    }

    #[test]
    fn test_not_due_while_far_row_is_far() {
        let mut active = ActiveEntities::new();
        active.spawn().obstacle(0.0, -SPAWN_DISTANCE - 5.0);
        let mut spawner = Spawner::new(SpawnTuning::default(), 1);
        assert_eq!(
            spawner.spawn_cycle(&mut active, &inputs(&[])),
            SpawnOutcome::NotDue
        );
        assert_eq!(active.len(), 1);
    }

    #[test]
    fn test_spawn_row_respects_min_gap() {
        let mut active = ActiveEntities::new();
        active.spawn().obstacle(0.0, -115.0);
        let mut spawner = Spawner::new(SpawnTuning::default(), 3);
        spawner.spawn_cycle(&mut active, &inputs(&[]));
        let gap = spawner.tuning().min_gap(RUN_SPEED_BASE);
        for e in &active.as_slice()[1..] {
            assert!((e.position.z - (-115.0 - gap)).abs() < 1e-4);
        }
    }

    #[test]
    fn test_letter_due_picks_uncollected_index() {
        let collected: Vec<usize> = (0..TARGET_WORD.len()).filter(|&i| i != 6).collect();
        let mut active = ActiveEntities::new();
        let mut spawner = Spawner::new(SpawnTuning::default(), 9);
        let mut world = inputs(&collected);
        world.distance = 1000.0;

        let before = spawner.next_letter_distance();
        assert_eq!(spawner.spawn_cycle(&mut active, &world), SpawnOutcome::Letter);
        assert_eq!(active.as_slice()[0].target_index(), Some(6));
        assert!(spawner.next_letter_distance() > before);
    }

    #[test]
    fn test_letter_due_with_word_complete_spawns_gem() {
        let collected: Vec<usize> = (0..TARGET_WORD.len()).collect();
        let mut active = ActiveEntities::new();
        let mut spawner = Spawner::new(SpawnTuning::default(), 9);
        let mut world = inputs(&collected);
        world.distance = 1000.0;
        assert_eq!(spawner.spawn_cycle(&mut active, &world), SpawnOutcome::Gem);
        assert_eq!(active.as_slice()[0].kind, EntityKind::Gem);
    }

    #[test]
    fn test_clusters_leave_a_free_lane() {
        let tuning = SpawnTuning {
            skip_chance: 0.0,
            obstacle_threshold: 0.0,
            two_lane_threshold: 0.0,
            three_lane_threshold: 0.0,
            bonus_gem_chance: 0.0,
            ..SpawnTuning::default()
        };
        for seed in 0..20 {
            let mut active = ActiveEntities::new();
            let mut spawner = Spawner::new(tuning.clone(), seed);
            spawner.spawn_cycle(&mut active, &inputs(&[]));
            let obstacles = active
                .as_slice()
                .iter()
                .filter(|e| e.kind == EntityKind::Obstacle)
                .count();
            assert_eq!(obstacles, 2, "seed {seed}");
        }
    }

    #[test]
    fn test_enemies_only_from_level_two() {
        let tuning = SpawnTuning {
            skip_chance: 0.0,
            obstacle_threshold: 0.0,
            enemy_chance: 1.0,
            ..SpawnTuning::default()
        };
        let mut active = ActiveEntities::new();
        let mut spawner = Spawner::new(tuning.clone(), 4);
        assert_eq!(
            spawner.spawn_cycle(&mut active, &inputs(&[])),
            SpawnOutcome::Obstacles
        );

        let mut active = ActiveEntities::new();
        let mut spawner = Spawner::new(tuning, 4);
        let mut world = inputs(&[]);
        world.level = 2;
        assert_eq!(spawner.spawn_cycle(&mut active, &world), SpawnOutcome::Enemies);
        assert!(active.as_slice().iter().all(|e| e.kind == EntityKind::Alien));
    }

    #[test]
    fn test_patterned_mode_stamps_pattern() {
        let tuning = SpawnTuning {
            mode: SpawnMode::Patterned,
            ..SpawnTuning::default()
        };
        let mut active = ActiveEntities::new();
        let mut spawner = Spawner::new(tuning, 2);
        assert_eq!(
            spawner.spawn_cycle(&mut active, &inputs(&[])),
            SpawnOutcome::Pattern
        );
        let pattern = spawner.patterns().current_pattern().unwrap();
        assert_eq!(active.len(), pattern.spawns.len());
        // Lanes clamped to the three available
        assert!(active.as_slice().iter().all(|e| e.position.x.abs() <= lane_to_x(1) + 1e-4));
    }

    #[test]
    fn test_skip_never_applies_with_nothing_ahead() {
        let tuning = SpawnTuning {
            skip_chance: 1.0,
            ..SpawnTuning::default()
        };
        let mut active = ActiveEntities::new();
        // Only something behind the player
        active.spawn().obstacle(0.0, 5.0);
        let mut spawner = Spawner::new(tuning, 8);
        let outcome = spawner.spawn_cycle(&mut active, &inputs(&[]));
        assert_ne!(outcome, SpawnOutcome::Skipped);
        assert!(active.as_slice().iter().any(|e| e.position.z < 0.0));
    }
}
