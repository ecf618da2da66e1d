//! Drone orbit, targeting and hitscan damage (tick phase 5)

use std::f32::consts::TAU;

use crate::game::constants::drone;
use crate::game::spatial::SpatialGrid;
use crate::game::state::{Drone, DirtyFlags, EntityId, Player};
use crate::game::storage::EntityStore;
use crate::game::tuning::TuningTables;
use crate::util::vec2::{wrap_angle, Vec2};

/// Damage of the drone at `index` in its owner's roster, before the
/// drone-type multiplier and territory reduction
#[inline]
pub fn drone_damage(index: usize) -> f32 {
    match index {
        0 => drone::BASE_DAMAGE,
        n => drone::BASE_DAMAGE * drone::SECOND_DRONE_MULT * drone::EXTRA_DRONE_DECAY.powi(n as i32 - 1),
    }
}

/// Final damage against a target
#[inline]
pub fn hit_damage(index: usize, damage_mult: f32, target_in_territory: bool) -> f32 {
    let damage = drone_damage(index) * damage_mult;
    if target_in_territory {
        damage * (1.0 - drone::TERRITORY_REDUCTION)
    } else {
        damage
    }
}

/// Grow or shrink the drone roster to `count`, then spread phase offsets
/// evenly. New drones get type `kind` and a fresh id.
pub fn sync_drones<F>(player: &mut Player, count: usize, kind: u8, alloc_id: &mut F)
where
    F: FnMut() -> EntityId,
{
    let count = count.min(drone::MAX_DRONES);
    if player.drones.len() == count {
        return;
    }
    player.drones.truncate(count);
    while player.drones.len() < count {
        player.drones.push(Drone {
            id: alloc_id(),
            owner: player.id,
            phase_offset: 0.0,
            cooldown: drone::COOLDOWN,
            target: None,
            position: player.position,
            kind,
        });
    }
    let n = player.drones.len() as f32;
    for (i, d) in player.drones.iter_mut().enumerate() {
        d.phase_offset = TAU * i as f32 / n;
    }
    player.mark_dirty(DirtyFlags::DRONES);
}

/// Move drones around their owner and tick cooldowns
pub fn orbit(player: &mut Player, dt: f32) {
    player.orbit_angle = wrap_angle(player.orbit_angle + drone::ORBIT_SPEED * dt);
    let (center, base) = (player.position, player.orbit_angle);
    for d in player.drones.iter_mut() {
        d.position = center + Vec2::from_angle(base + d.phase_offset) * drone::ORBIT_RADIUS;
        d.cooldown = (d.cooldown - dt).max(0.0);
    }
}

/// A resolved drone shot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shot {
    pub owner: EntityId,
    pub drone_index: usize,
    pub target: EntityId,
    pub damage: f32,
    pub cooldown: f32,
}

/// Shots for every ready drone of `owner`: nearest live non-owner player
/// in range, no target stickiness
pub fn acquire_targets(
    owner: &Player,
    players: &EntityStore<Player>,
    grid: &SpatialGrid,
    tuning: &TuningTables,
    shots: &mut Vec<Shot>,
) {
    for (index, d) in owner.drones.iter().enumerate() {
        if d.cooldown > 0.0 {
            continue;
        }
        let Some(kind) = tuning.drone_type(d.kind) else {
            continue;
        };
        let range = drone::RANGE * kind.range_mult;
        let found = grid.nearest(d.position, range, |id| {
            id != owner.id && players.get(id).is_some_and(Player::is_alive)
        });
        let Some((target_id, _)) = found else {
            continue;
        };
        let Some(target) = players.get(target_id) else {
            continue;
        };
        shots.push(Shot {
            owner: owner.id,
            drone_index: index,
            target: target_id,
            damage: hit_damage(index, kind.damage_mult, target.in_territory),
            cooldown: drone::COOLDOWN * kind.cooldown_mult,
        });
    }
}
