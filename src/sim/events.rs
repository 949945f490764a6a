//! Fire-and-forget notifications produced by the simulation
//!
//! The host drains the queue once per frame and forwards events to audio,
//! particles and HUD. Nothing in the simulation waits on them.

use glam::Vec3;

/// Something observable happened during a tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GameEvent {
    /// A damage-class entity hit the player
    PlayerHit { kind: super::EntityKind },
    /// The player touched the ground after being airborne
    PlayerLand,
    /// Cosmetic burst at a collision point
    ParticleBurst { position: Vec3, color: u32 },
    /// Gem or beer picked up
    GemCollected { points: u32 },
    /// Letter token picked up
    LetterCollected { value: char, target_index: usize },
    /// Player ran into a shop portal
    ShopEntered,
    /// A checkpoint was written at this distance
    CheckpointCreated { distance: f32 },
    /// Simulation state was replaced from a checkpoint
    CheckpointRestored { distance: f32 },
    /// All letters collected below the last level
    LevelAdvanced { level: u32 },
    /// All letters collected on the last level
    Victory,
    /// Last life lost
    GameOver { distance: f32 },
}

/// Per-simulation event buffer
#[derive(Debug, Default, Clone)]
pub struct EventQueue {
    events: Vec<GameEvent>,
}

impl EventQueue {
    pub fn push(&mut self, event: GameEvent) {
        self.events.push(event);
    }

    /// Take every pending event in emission order
    pub fn drain(&mut self) -> impl Iterator<Item = GameEvent> + '_ {
        self.events.drain(..)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GameEvent> {
        self.events.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_preserves_order_and_empties() {
        let mut q = EventQueue::default();
        q.push(GameEvent::PlayerLand);
        q.push(GameEvent::ShopEntered);
        let drained: Vec<_> = q.drain().collect();
        assert_eq!(drained, vec![GameEvent::PlayerLand, GameEvent::ShopEntered]);
        assert!(q.is_empty());
    }
}
