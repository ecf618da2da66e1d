//! XP, levels and upgrade tiers

use crate::game::constants::xp;
use crate::game::state::{DirtyFlags, EntityId, Player};
use crate::game::systems::combat;
use crate::game::tuning::TuningTables;

/// XP needed to go from `level` to `level + 1`
#[inline]
pub fn xp_to_next(level: u8) -> u32 {
    xp::LEVEL_BASE + xp::LEVEL_STEP * (level.max(1) as u32 - 1)
}

/// Apply the tier unlocked at the player's level: max HP (current HP is
/// topped up by the gain), speed multiplier and drone roster
pub fn apply_tier<F>(player: &mut Player, tuning: &TuningTables, alloc_id: &mut F)
where
    F: FnMut() -> EntityId,
{
    let Some(tier) = tuning.tier_for_level(player.level) else {
        return;
    };
    if tier.max_hp > player.max_hp {
        let gain = tier.max_hp - player.max_hp;
        player.max_hp = tier.max_hp;
        player.hp = (player.hp + gain).min(player.max_hp);
        player.mark_dirty(DirtyFlags::HP);
    }
    player.speed_mult = tier.speed_mult;
    combat::sync_drones(player, tier.drone_count as usize, tier.drone_type, alloc_id);
}

/// Award XP, levelling up as many times as it covers. Returns the new
/// level if it changed.
pub fn add_xp<F>(player: &mut Player, amount: u32, tuning: &TuningTables, alloc_id: &mut F) -> Option<u8>
where
    F: FnMut() -> EntityId,
{
    if amount == 0 {
        return None;
    }
    player.total_xp = player.total_xp.saturating_add(amount);
    player.xp = player.xp.saturating_add(amount);
    player.mark_dirty(DirtyFlags::XP);

    let start = player.level;
    while player.level < xp::MAX_LEVEL {
        let need = xp_to_next(player.level);
        if player.xp < need {
            break;
        }
        player.xp -= need;
        player.level += 1;
    }
    if player.level >= xp::MAX_LEVEL {
        player.xp = player.xp.min(xp_to_next(xp::MAX_LEVEL));
    }

    if player.level == start {
        return None;
    }
    player.mark_dirty(DirtyFlags::LEVEL);
    apply_tier(player, tuning, alloc_id);
    Some(player.level)
}

/// Convert area captured this tick into XP, keeping the fractional part
pub fn territory_xp(player: &mut Player) -> u32 {
    if player.area_gained <= 0.0 {
        return 0;
    }
    player.territory_xp_carry += player.area_gained / xp::AREA_PER_XP;
    player.area_gained = 0.0;
    let whole = player.territory_xp_carry.floor();
    player.territory_xp_carry -= whole;
    whole as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::HslColor;
    use crate::util::vec2::Vec2;

    fn fresh() -> Player {
        let color = HslColor { hue: 0, sat: 0, lum: 0 };
        Player::new(1, "p".into(), Vec2::new(500.0, 500.0), 0.0, color, None)
    }

    fn counter() -> impl FnMut() -> EntityId {
        let mut next = 100;
        move || {
            next += 1;
            next
        }
    }

    #[test]
    fn test_xp_curve() {
        assert_eq!(xp_to_next(1), 40);
        assert_eq!(xp_to_next(2), 60);
        assert_eq!(xp_to_next(10), 220);
    }

    #[test]
    fn test_single_level_up() {
        let tuning = TuningTables::builtin();
        let mut alloc = counter();
        let mut p = fresh();
        assert_eq!(add_xp(&mut p, 39, &tuning, &mut alloc), None);
        assert_eq!(add_xp(&mut p, 5, &tuning, &mut alloc), Some(2));
        assert_eq!(p.xp, 4);
        assert_eq!(p.total_xp, 44);
    }

    #[test]
    fn test_multi_level_up_applies_tier() {
        let tuning = TuningTables::builtin();
        let mut alloc = counter();
        let mut p = fresh();
        p.hp = 50.0;
        // 40 + 60 = 100 reaches level 3
        assert_eq!(add_xp(&mut p, 100, &tuning, &mut alloc), Some(3));
        let tier = tuning.tier_for_level(3).unwrap();
        assert_eq!(p.max_hp, tier.max_hp);
        assert_eq!(p.hp, 50.0 + (tier.max_hp - 100.0));
        assert_eq!(p.drone_count(), tier.drone_count as usize);
        assert!(p.dirty.contains(DirtyFlags::LEVEL | DirtyFlags::DRONES));
    }

    #[test]
    fn test_level_capped() {
        let tuning = TuningTables::builtin();
        let mut alloc = counter();
        let mut p = fresh();
        add_xp(&mut p, 10_000_000, &tuning, &mut alloc);
        assert_eq!(p.level, xp::MAX_LEVEL);
        assert!(p.xp <= xp_to_next(xp::MAX_LEVEL));
    }

    #[test]
    fn test_territory_xp_carries_fraction() {
        let mut p = fresh();
        p.area_gained = xp::AREA_PER_XP * 2.5;
        assert_eq!(territory_xp(&mut p), 2);
        p.area_gained = xp::AREA_PER_XP * 0.5;
        assert_eq!(territory_xp(&mut p), 1);
        assert_eq!(p.area_gained, 0.0);
    }
}
