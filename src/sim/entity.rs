//! Transient simulation objects
//!
//! Everything that scrolls toward the player is an `Entity`. Entities are
//! recycled through the object pool, so `id` survives a reset while every
//! gameplay field goes back to its baseline.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::consts::{LETTER_COLORS, OBSTACLE_HEIGHT, TARGET_WORD};

/// What an entity is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EntityKind {
    /// Static hazard that spans from the ground up
    #[default]
    Obstacle,
    /// Collectible worth points
    Gem,
    /// Bonus collectible worth points
    Beer,
    /// One letter of the target word
    Letter,
    /// Entering it opens the shop
    ShopPortal,
    /// Hazard that fires a single projectile
    Alien,
    /// Projectile fired by an alien, faster than the scroll
    Missile,
}

impl EntityKind {
    /// Touching it costs the player a life
    pub fn is_damage_source(self) -> bool {
        matches!(self, EntityKind::Obstacle | EntityKind::Alien | EntityKind::Missile)
    }

    pub fn is_collectible(self) -> bool {
        matches!(self, EntityKind::Gem | EntityKind::Beer | EntityKind::Letter)
    }
}

/// Kind-dependent data
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum EntityPayload {
    #[default]
    None,
    /// Score value of a gem or beer
    Points(u32),
    /// Letter token for index `target_index` of the target word
    Letter { value: char, target_index: usize },
    /// Alien fire state; at most one projectile per life
    Enemy { has_fired: bool },
}

/// A transient simulated object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Stable identity, kept across pool recycling. 0 = not yet assigned.
    pub id: u32,
    pub kind: EntityKind,
    /// (lane axis, height axis, travel axis); travel increases toward the player
    pub position: Vec3,
    /// False once logically destroyed
    pub active: bool,
    pub payload: EntityPayload,
    /// Display color (0xRRGGBB)
    pub color: u32,
}

impl Default for Entity {
    fn default() -> Self {
        Self {
            id: 0,
            kind: EntityKind::Obstacle,
            position: Vec3::ZERO,
            active: false,
            payload: EntityPayload::None,
            color: 0xffffff,
        }
    }
}

impl Entity {
    /// Return to the pooled baseline, keeping the id
    pub fn reset(&mut self) {
        let id = self.id;
        *self = Self { id, ..Self::default() };
    }

    /// Re-initialize a pooled instance as a live entity of `kind`
    pub fn activate(&mut self, kind: EntityKind, position: Vec3) {
        self.kind = kind;
        self.position = position;
        self.active = true;
        self.payload = EntityPayload::None;
        self.color = 0xffffff;
    }

    pub fn obstacle(&mut self, x: f32, z: f32) {
        self.activate(EntityKind::Obstacle, Vec3::new(x, OBSTACLE_HEIGHT / 2.0, z));
        self.color = 0x8b4513;
    }

    pub fn gem(&mut self, x: f32, y: f32, z: f32, points: u32) {
        self.activate(EntityKind::Gem, Vec3::new(x, y, z));
        self.payload = EntityPayload::Points(points);
    }

    pub fn beer(&mut self, x: f32, z: f32, points: u32) {
        self.activate(EntityKind::Beer, Vec3::new(x, 1.2, z));
        self.payload = EntityPayload::Points(points);
        self.color = 0xffb300;
    }

    /// Letter token for `target_index`; out-of-range indices are rejected
    pub fn letter(&mut self, x: f32, z: f32, target_index: usize) -> bool {
        let Some(&value) = TARGET_WORD.get(target_index) else {
            return false;
        };
        self.activate(EntityKind::Letter, Vec3::new(x, 1.0, z));
        self.payload = EntityPayload::Letter { value, target_index };
        self.color = LETTER_COLORS[target_index];
        true
    }

    pub fn alien(&mut self, x: f32, z: f32) {
        self.activate(EntityKind::Alien, Vec3::new(x, 1.5, z));
        self.payload = EntityPayload::Enemy { has_fired: false };
        self.color = 0x00ff00;
    }

    pub fn missile(&mut self, x: f32, z: f32) {
        self.activate(EntityKind::Missile, Vec3::new(x, 1.0, z));
    }

    pub fn shop_portal(&mut self, z: f32) {
        self.activate(EntityKind::ShopPortal, Vec3::new(0.0, 0.0, z));
        self.color = 0x8b4513;
    }

    pub fn points(&self) -> Option<u32> {
        match self.payload {
            EntityPayload::Points(p) => Some(p),
            _ => None,
        }
    }

    pub fn target_index(&self) -> Option<usize> {
        match self.payload {
            EntityPayload::Letter { target_index, .. } => Some(target_index),
            _ => None,
        }
    }

    /// Aliens that have not fired yet
    pub fn is_armed(&self) -> bool {
        matches!(self.payload, EntityPayload::Enemy { has_fired: false })
    }

    pub fn mark_fired(&mut self) {
        if let EntityPayload::Enemy { has_fired } = &mut self.payload {
            *has_fired = true;
        }
    }
}
