//! Player-versus-entity hit detection
//!
//! The player is an upright box standing on `player.y`. An entity is only
//! tested while it sweeps through a narrow band around the player's travel
//! coordinate, which keeps fast movers from tunnelling through the player.

use glam::Vec3;

use super::entity::{Entity, EntityKind};
use crate::consts::{OBSTACLE_HEIGHT, PLAYER_HEIGHT};

/// Half-width of the travel-axis band around the player
pub const Z_TOLERANCE: f32 = 2.0;
/// Maximum lateral distance for a hit (less than half a lane)
pub const LATERAL_THRESHOLD: f32 = 0.9;
/// Maximum vertical distance for a pickup
pub const COLLECT_VERTICAL_RANGE: f32 = 2.5;
/// Travel-axis distance at which a shop portal triggers
pub const SHOP_RANGE: f32 = 2.0;
/// Half-height of entities without a specific box
pub const DEFAULT_HALF_HEIGHT: f32 = 0.5;
/// Vertical band occupied by projectiles
pub const MISSILE_BAND: (f32, f32) = (0.5, 1.5);

/// Outcome of testing one entity against the player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Contact {
    None,
    /// Damage-class entity overlapped the player
    Damage,
    /// Collectible reached the player
    Collect,
    /// Shop portal reached the player
    EnterShop,
}

/// (bottom, top) of an entity's collision box
pub fn vertical_extent(entity: &Entity) -> (f32, f32) {
    match entity.kind {
        EntityKind::Obstacle => (0.0, OBSTACLE_HEIGHT),
        EntityKind::Missile => MISSILE_BAND,
        _ => (
            entity.position.y - DEFAULT_HALF_HEIGHT,
            entity.position.y + DEFAULT_HALF_HEIGHT,
        ),
    }
}

/// True when a move from `prev_z` to `z` overlaps the band around `player_z`
#[inline]
pub fn in_travel_band(prev_z: f32, z: f32, player_z: f32) -> bool {
    prev_z < player_z + Z_TOLERANCE && z > player_z - Z_TOLERANCE
}

/// Test an active entity that just moved from `prev_z` against the player
pub fn check_contact(entity: &Entity, prev_z: f32, player: Vec3) -> Contact {
    if !entity.active {
        return Contact::None;
    }

    if entity.kind == EntityKind::ShopPortal {
        let dz = (entity.position.z - player.z).abs();
        return if dz < SHOP_RANGE {
            Contact::EnterShop
        } else {
            Contact::None
        };
    }

    if !in_travel_band(prev_z, entity.position.z, player.z) {
        return Contact::None;
    }
    if (entity.position.x - player.x).abs() >= LATERAL_THRESHOLD {
        return Contact::None;
    }

    if entity.kind.is_damage_source() {
        let (bottom, top) = vertical_extent(entity);
        let player_bottom = player.y;
        let player_top = player.y + PLAYER_HEIGHT;
        if player_bottom < top && player_top > bottom {
            Contact::Damage
        } else {
            Contact::None
        }
    } else if entity.kind.is_collectible() {
        if (entity.position.y - player.y).abs() < COLLECT_VERTICAL_RANGE {
            Contact::Collect
        } else {
            Contact::None
        }
    } else {
        Contact::None
    }
}
