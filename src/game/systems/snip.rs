//! Snip fuse (tick phase 3)
//!
//! A trail hit does not kill outright. A fuse starts at the hit point
//! and burns along the trail toward the victim, accelerating
//! exponentially after a grace period. Distance burned is a closed-form
//! function of elapsed time, so identical inputs give identical fuses
//! regardless of tick size.

use crate::game::constants::{player::BASE_SPEED, snip};
use crate::game::state::{mark_dead, Death, DirtyFlags, EntityId, KillType, Player, SnipState};
use crate::game::world::WorldEvent;
use crate::util::geometry::{closest_point_on_segment, point_along_polyline, polyline_length};
use crate::util::vec2::Vec2;

#[inline]
fn initial_speed() -> f64 {
    (snip::INITIAL_SPEED_MULT * BASE_SPEED) as f64
}

#[inline]
fn max_speed() -> f64 {
    (snip::MAX_SPEED_MULT * BASE_SPEED) as f64
}

/// Seconds after the grace period at which the fuse hits its speed cap
#[inline]
fn time_to_cap() -> f64 {
    (max_speed() / initial_speed()).ln() / snip::ACCELERATION as f64
}

/// Fuse speed (units/s) after `elapsed` seconds snipped
pub fn fuse_speed(elapsed: f32) -> f32 {
    let s = (elapsed - snip::GRACE_PERIOD) as f64;
    if s <= 0.0 {
        return 0.0;
    }
    (initial_speed() * (snip::ACCELERATION as f64 * s).exp()).min(max_speed()) as f32
}

/// Distance burned after `elapsed` seconds snipped: the integral of
/// `fuse_speed`, exponential up to the cap and linear after it
pub fn fuse_distance(elapsed: f32) -> f32 {
    let s = (elapsed - snip::GRACE_PERIOD) as f64;
    if s <= 0.0 {
        return 0.0;
    }
    let (v0, vmax, k) = (initial_speed(), max_speed(), snip::ACCELERATION as f64);
    let t_cap = time_to_cap();
    let d = if s <= t_cap {
        v0 / k * ((k * s).exp() - 1.0)
    } else {
        (vmax - v0) / k + vmax * (s - t_cap)
    };
    d as f32
}

/// Elapsed snip time at which the fuse has burned `length` units.
/// Inverse of `fuse_distance`.
pub fn burn_time(length: f32) -> f32 {
    let length = length.max(0.0) as f64;
    let (v0, vmax, k) = (initial_speed(), max_speed(), snip::ACCELERATION as f64);
    let at_cap = (vmax - v0) / k;
    let s = if length <= at_cap {
        (length * k / v0 + 1.0).ln() / k
    } else {
        time_to_cap() + (length - at_cap) / vmax
    };
    snip::GRACE_PERIOD + s as f32
}

/// Fuse path: hit point, the trail after the hit segment, then the body
pub fn fuse_path(player: &Player, state: &SnipState) -> Vec<Vec2> {
    let mut path = Vec::with_capacity(player.trail.len() + 2);
    path.push(state.hit_point);
    if let Some(rest) = player.trail.get(state.hit_segment + 1..) {
        path.extend_from_slice(rest);
    }
    path.push(player.position);
    path
}

/// Put `victim` into the snipped state after contact at `contact` with
/// trail segment `segment`. No-op if already snipped.
pub fn start(victim: &mut Player, attacker: Option<EntityId>, segment: usize, contact: Vec2) -> Option<WorldEvent> {
    if victim.is_snipped() {
        return None;
    }
    let (a, b) = victim.trail_segments().nth(segment)?;
    let hit_point = closest_point_on_segment(contact, a, b);

    let mut state = SnipState {
        snipped_by: attacker,
        hit_segment: segment,
        hit_point,
        progress_dist: 0.0,
        total_trail_length: 0.0,
        elapsed: 0.0,
        fuse_position: hit_point,
    };
    state.total_trail_length = polyline_length(&fuse_path(victim, &state));
    victim.snip = Some(state);
    victim.mark_dirty(DirtyFlags::TRAIL);

    Some(WorldEvent::SnipStart {
        victim: victim.id,
        attacker,
        position: hit_point,
    })
}

/// Advance the fuse. Returns true if it reached the player this tick.
pub fn update(player: &mut Player, dt: f32, deaths: &mut Vec<Death>) -> bool {
    let Some(mut state) = player.snip.take() else {
        return false;
    };

    state.elapsed += dt;
    state.progress_dist = fuse_distance(state.elapsed);

    // The victim keeps drawing trail, so the path grows every tick
    let path = fuse_path(player, &state);
    state.total_trail_length = polyline_length(&path);
    state.fuse_position = point_along_polyline(&path, state.progress_dist).unwrap_or(player.position);

    let burned = state.progress_dist >= state.total_trail_length;
    let killer = state.snipped_by;
    player.snip = Some(state);
    player.mark_dirty(DirtyFlags::TRAIL);

    if burned {
        return mark_dead(player, killer, KillType::Snip, deaths);
    }
    false
}

/// Clear the snip after the victim made it home
pub fn clear(player: &mut Player) {
    if player.snip.take().is_some() {
        player.mark_dirty(DirtyFlags::TRAIL);
    }
    player.clear_trail();
}
