//! Steering, speed buff, integration and vitals (tick phase 2)

use crate::game::constants::{player as tuning, speed_buff};
use crate::game::state::{mark_dead, Death, DirtyFlags, KillType, Player};
use crate::util::vec2::{angle_delta, wrap_angle, Vec2};

/// Speed multiplier after `time_outside` seconds of trailing.
/// Eases from 1.0 to `MAX_MULTIPLIER` over `RAMP_DURATION`.
#[inline]
pub fn speed_buff_for(time_outside: f32) -> f32 {
    let t = (time_outside / speed_buff::RAMP_DURATION).clamp(0.0, 1.0);
    1.0 + (speed_buff::MAX_MULTIPLIER - 1.0) * t.powf(speed_buff::EASING_EXPONENT)
}

/// Turn `angle` toward `target` by at most `max_step` radians
#[inline]
pub fn turn_toward(angle: f32, target: f32, max_step: f32) -> f32 {
    let delta = angle_delta(angle, target);
    if delta.abs() <= max_step {
        wrap_angle(target)
    } else {
        wrap_angle(angle + max_step * delta.signum())
    }
}

/// Current movement speed in units per second
pub fn current_speed(player: &Player) -> f32 {
    tuning::BASE_SPEED * player.speed_mult * player.speed_buff
}

/// Advance one player's heading and position
pub fn update(player: &mut Player, dt: f32, map_size: f32) {
    let new_angle = turn_toward(player.angle, player.target_angle, tuning::TURN_RATE * dt);
    if new_angle != player.angle {
        player.angle = new_angle;
        player.mark_dirty(DirtyFlags::ANGLE);
    }

    // Snipped players are pinned to base speed; the buff resets at home
    player.speed_buff = if player.is_snipped() || player.in_territory {
        1.0
    } else {
        player.time_outside += dt;
        speed_buff_for(player.time_outside)
    };

    player.prev_position = player.position;
    let step = Vec2::from_angle(player.angle) * (current_speed(player) * dt);
    player.position = (player.position + step).clamp_to_square(0.0, map_size);
    if player.position != player.prev_position {
        player.mark_dirty(DirtyFlags::POSITION);
    }
}

/// Stamina drains outside territory and HP drains once it is exhausted.
/// Both regenerate at home. Returns true if this killed the player.
pub fn update_vitals(player: &mut Player, dt: f32, deaths: &mut Vec<Death>) -> bool {
    let old_hp = player.hp;

    if player.in_territory {
        player.stamina = (player.stamina + tuning::STAMINA_REGEN * dt).min(player.max_stamina);
        player.hp = (player.hp + tuning::HP_REGEN * dt).min(player.max_hp);
    } else {
        player.stamina = (player.stamina - tuning::STAMINA_DRAIN * dt).max(0.0);
        if player.stamina <= 0.0 {
            player.hp = (player.hp - tuning::EXHAUSTION_DAMAGE * dt).max(0.0);
        }
    }

    if player.hp != old_hp {
        player.mark_dirty(DirtyFlags::HP);
    }
    if player.hp <= 0.0 {
        return mark_dead(player, None, KillType::Exhaustion, deaths);
    }
    false
}
