//! Entity model: players, their drones, and XP coins
//!
//! Every field is set at construction; invariants (territory has 3+
//! points, trail only while outside, vitals in range) are established
//! there and maintained by the world's tick phases.

use bitvec::prelude::*;
use smallvec::SmallVec;

use crate::game::constants::{player as tuning, territory};
use crate::game::spatial::{CellKey, GridEntity};
use crate::util::geometry::{circle_polygon, point_in_polygon, point_segment_distance, polygon_area};
use crate::util::vec2::{wrap_angle, Vec2};

/// Entity id, unique across players, drones and coins of one world.
/// Zero is reserved for "none" on the wire.
pub type EntityId = u32;

// ============================================================================
// Dirty flags
// ============================================================================

/// Per-field change bits, one per replicated player field. The bit
/// positions are the wire delta mask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DirtyFlags(u8);

impl DirtyFlags {
    pub const POSITION: DirtyFlags = DirtyFlags(1 << 0);
    pub const ANGLE: DirtyFlags = DirtyFlags(1 << 1);
    pub const HP: DirtyFlags = DirtyFlags(1 << 2);
    pub const XP: DirtyFlags = DirtyFlags(1 << 3);
    pub const LEVEL: DirtyFlags = DirtyFlags(1 << 4);
    pub const DRONES: DirtyFlags = DirtyFlags(1 << 5);
    pub const TERRITORY: DirtyFlags = DirtyFlags(1 << 6);
    pub const TRAIL: DirtyFlags = DirtyFlags(1 << 7);
    pub const NONE: DirtyFlags = DirtyFlags(0);
    pub const ALL: DirtyFlags = DirtyFlags(0xFF);

    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    #[inline]
    pub fn insert(&mut self, other: DirtyFlags) {
        self.0 |= other.0;
    }

    #[inline]
    pub const fn contains(self, other: DirtyFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn clear(&mut self) {
        self.0 = 0;
    }
}

impl std::ops::BitOr for DirtyFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

// ============================================================================
// Kill bookkeeping
// ============================================================================

/// How a player died. Client feedback only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum KillType {
    /// Snip fuse reached the player
    Snip = 1,
    /// Lost a body collision
    Body = 2,
    /// Drone hitscan
    Drone = 3,
    /// Territory subtracted below a polygon
    Territory = 4,
    /// Enclosed by another player's capture
    Trapped = 5,
    /// HP drained by exhausted stamina
    Exhaustion = 6,
    /// Left the room
    Disconnect = 7,
}

impl KillType {
    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// A queued death, processed at the end of the tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Death {
    pub victim: EntityId,
    /// `None` for suicides, ties and environmental deaths
    pub killer: Option<EntityId>,
    pub kill_type: KillType,
    pub position: Vec2,
}

/// Flag `victim` dead and queue the death. Only the first death counts.
pub fn mark_dead(victim: &mut Player, killer: Option<EntityId>, kill_type: KillType, deaths: &mut Vec<Death>) -> bool {
    if victim.dead {
        return false;
    }
    victim.dead = true;
    deaths.push(Death {
        victim: victim.id,
        killer,
        kill_type,
        position: victim.position,
    });
    true
}

// ============================================================================
// Colors
// ============================================================================

/// HSL color with 8-bit channels (hue spans 0..=255 for 0..360 degrees)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HslColor {
    pub hue: u8,
    pub sat: u8,
    pub lum: u8,
}

/// Fixed palette of distinct hues handed out on join
pub struct ColorPalette {
    used: BitVec,
}

impl ColorPalette {
    pub const SIZE: usize = 24;

    pub fn new() -> Self {
        Self {
            used: bitvec![0; Self::SIZE],
        }
    }

    fn color_for_slot(slot: usize) -> HslColor {
        // Spread adjacent slots around the wheel
        let hue = (slot * 7 % Self::SIZE) * 256 / Self::SIZE;
        HslColor {
            hue: hue as u8,
            sat: if slot % 2 == 0 { 200 } else { 170 },
            lum: 140,
        }
    }

    /// First free palette slot, or a hue hashed from the id when full
    pub fn acquire(&mut self, id: EntityId) -> (Option<u8>, HslColor) {
        match self.used.first_zero() {
            Some(slot) => {
                self.used.set(slot, true);
                (Some(slot as u8), Self::color_for_slot(slot))
            }
            None => {
                let hue = (id.wrapping_mul(2_654_435_761) >> 24) as u8;
                (None, HslColor { hue, sat: 150, lum: 150 })
            }
        }
    }

    pub fn release(&mut self, slot: Option<u8>) {
        if let Some(slot) = slot {
            if (slot as usize) < Self::SIZE {
                self.used.set(slot as usize, false);
            }
        }
    }

    pub fn in_use(&self) -> usize {
        self.used.count_ones()
    }
}

impl Default for ColorPalette {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Drone / Coin
// ============================================================================

/// Orbiting auto-targeting drone. Position is derived from the owner.
#[derive(Debug, Clone)]
pub struct Drone {
    pub id: EntityId,
    pub owner: EntityId,
    /// Offset from the owner's orbit angle
    pub phase_offset: f32,
    /// Seconds until the next shot
    pub cooldown: f32,
    pub target: Option<EntityId>,
    pub position: Vec2,
    /// Index into the drone-type table
    pub kind: u8,
}

/// XP pickup
#[derive(Debug, Clone)]
pub struct Coin {
    pub id: EntityId,
    pub position: Vec2,
    pub value: u32,
    grid_cell: Option<CellKey>,
}

impl Coin {
    pub fn new(id: EntityId, position: Vec2, value: u32) -> Self {
        Self {
            id,
            position,
            value,
            grid_cell: None,
        }
    }
}

impl GridEntity for Coin {
    fn grid_id(&self) -> EntityId {
        self.id
    }
    fn grid_position(&self) -> Vec2 {
        self.position
    }
    fn grid_cell(&self) -> Option<CellKey> {
        self.grid_cell
    }
    fn set_grid_cell(&mut self, cell: Option<CellKey>) {
        self.grid_cell = cell;
    }
}

// ============================================================================
// Player
// ============================================================================

/// Delayed-death state after a trail hit
#[derive(Debug, Clone, PartialEq)]
pub struct SnipState {
    /// Attacker, `None` for a self-snip (no kill credit)
    pub snipped_by: Option<EntityId>,
    /// Trail segment that was hit
    pub hit_segment: usize,
    pub hit_point: Vec2,
    /// Fuse distance burned so far
    pub progress_dist: f32,
    /// Path length from the hit point to the player
    pub total_trail_length: f32,
    pub elapsed: f32,
    pub fuse_position: Vec2,
}

impl SnipState {
    /// Fuse progress over the path, in [0, 1]
    pub fn fraction(&self) -> f32 {
        if self.total_trail_length <= f32::EPSILON {
            1.0
        } else {
            (self.progress_dist / self.total_trail_length).clamp(0.0, 1.0)
        }
    }
}

pub type DroneList = SmallVec<[Drone; 4]>;

#[derive(Debug, Clone)]
pub struct Player {
    // Identity
    pub id: EntityId,
    pub name: String,
    pub color: HslColor,
    pub color_slot: Option<u8>,

    // Transform
    pub position: Vec2,
    /// Position before this tick's move; anchors a trail on exit
    pub prev_position: Vec2,
    pub angle: f32,
    pub target_angle: f32,

    // Vitals
    pub hp: f32,
    pub max_hp: f32,
    pub stamina: f32,
    pub max_stamina: f32,
    pub level: u8,
    /// XP toward the next level
    pub xp: u32,
    /// Lifetime XP (sizes the death drop)
    pub total_xp: u32,
    /// Upgrade-tier speed multiplier
    pub speed_mult: f32,

    // Territory and trail
    pub territory: Vec<Vec2>,
    territory_area: f32,
    pub trail: Vec<Vec2>,
    pub in_territory: bool,
    /// Seconds since leaving territory (speed buff ramp)
    pub time_outside: f32,
    pub speed_buff: f32,
    /// Area captured during the current tick
    pub area_gained: f32,
    /// Fractional territory XP carried between ticks
    pub territory_xp_carry: f32,
    pub captured_this_tick: bool,

    // Combat
    pub snip: Option<SnipState>,
    pub drones: DroneList,
    pub orbit_angle: f32,
    pub kills: u32,

    pub dead: bool,
    pub dirty: DirtyFlags,
    grid_cell: Option<CellKey>,
}

impl Player {
    /// New player standing in a fresh circular starter territory
    pub fn new(id: EntityId, name: String, position: Vec2, angle: f32, color: HslColor, color_slot: Option<u8>) -> Self {
        let territory = circle_polygon(position, territory::STARTER_RADIUS, territory::STARTER_POINTS);
        let territory_area = polygon_area(&territory);
        let angle = wrap_angle(angle);
        Self {
            id,
            name,
            color,
            color_slot,
            position,
            prev_position: position,
            angle,
            target_angle: angle,
            hp: tuning::MAX_HP,
            max_hp: tuning::MAX_HP,
            stamina: tuning::MAX_STAMINA,
            max_stamina: tuning::MAX_STAMINA,
            level: 1,
            xp: 0,
            total_xp: 0,
            speed_mult: 1.0,
            territory,
            territory_area,
            trail: Vec::new(),
            in_territory: true,
            time_outside: 0.0,
            speed_buff: 1.0,
            area_gained: 0.0,
            territory_xp_carry: 0.0,
            captured_this_tick: false,
            snip: None,
            drones: SmallVec::new(),
            orbit_angle: 0.0,
            kills: 0,
            dead: false,
            dirty: DirtyFlags::ALL,
            grid_cell: None,
        }
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        !self.dead
    }

    #[inline]
    pub fn is_snipped(&self) -> bool {
        self.snip.is_some()
    }

    #[inline]
    pub fn snipped_by(&self) -> Option<EntityId> {
        self.snip.as_ref().and_then(|s| s.snipped_by)
    }

    /// Collision radius scaled by level
    pub fn radius(&self) -> f32 {
        let scale = 1.0 + tuning::RADIUS_PER_LEVEL * (self.level.saturating_sub(1)) as f32;
        tuning::BASE_RADIUS * scale.min(tuning::MAX_RADIUS_SCALE)
    }

    #[inline]
    pub fn drone_count(&self) -> usize {
        self.drones.len()
    }

    #[inline]
    pub fn territory_area(&self) -> f32 {
        self.territory_area
    }

    /// Replace the territory polygon and refresh the cached area
    pub fn set_territory(&mut self, polygon: Vec<Vec2>) {
        self.territory_area = polygon_area(&polygon);
        self.territory = polygon;
        self.dirty.insert(DirtyFlags::TERRITORY);
    }

    #[inline]
    pub fn contains_point(&self, point: Vec2) -> bool {
        point_in_polygon(point, &self.territory)
    }

    /// Trail segments including the live one from the last point to the body
    pub fn trail_segments(&self) -> impl Iterator<Item = (Vec2, Vec2)> + '_ {
        let live = self.trail.last().map(|&last| (last, self.position));
        self.trail.windows(2).map(|w| (w[0], w[1])).chain(live)
    }

    pub fn trail_segment_count(&self) -> usize {
        if self.trail.is_empty() {
            0
        } else {
            self.trail.len()
        }
    }

    /// First trail segment closer than `radius` to `point`, ignoring the
    /// `skip_recent` newest segments
    pub fn hits_trail(&self, point: Vec2, radius: f32, skip_recent: usize) -> Option<usize> {
        let checked = self.trail_segment_count().saturating_sub(skip_recent);
        self.trail_segments()
            .take(checked)
            .position(|(a, b)| point_segment_distance(point, a, b) < radius)
    }

    /// Wipe the trail (home safely or snip cleared)
    pub fn clear_trail(&mut self) {
        if !self.trail.is_empty() {
            self.trail.clear();
            self.dirty.insert(DirtyFlags::TRAIL);
        }
    }

    /// Status bits on the wire: bit0 snipped, bit1 in own territory
    pub fn status_bits(&self) -> u8 {
        (self.is_snipped() as u8) | ((self.in_territory as u8) << 1)
    }

    pub fn mark_dirty(&mut self, flags: DirtyFlags) {
        self.dirty.insert(flags);
    }
}

impl GridEntity for Player {
    fn grid_id(&self) -> EntityId {
        self.id
    }
    fn grid_position(&self) -> Vec2 {
        self.position
    }
    fn grid_cell(&self) -> Option<CellKey> {
        self.grid_cell
    }
    fn set_grid_cell(&mut self, cell: Option<CellKey>) {
        self.grid_cell = cell;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_player() -> Player {
        let color = HslColor { hue: 0, sat: 0, lum: 0 };
        Player::new(1, "tester".into(), Vec2::new(500.0, 500.0), 0.0, color, None)
    }

    #[test]
    fn test_new_player_invariants() {
        let p = test_player();
        assert_eq!(p.territory.len(), territory::STARTER_POINTS);
        assert!(p.trail.is_empty());
        assert!(p.contains_point(p.position));
        assert_eq!(p.hp, p.max_hp);
        assert!(!p.is_snipped());
        assert!(p.territory_area() > 0.0);
        assert_eq!(p.dirty, DirtyFlags::ALL);
    }

    #[test]
    fn test_radius_grows_and_caps() {
        let mut p = test_player();
        let base = p.radius();
        p.level = 5;
        assert!(p.radius() > base);
        p.level = 200;
        assert!((p.radius() - tuning::BASE_RADIUS * tuning::MAX_RADIUS_SCALE).abs() < 1e-4);
    }

    #[test]
    fn test_hits_trail_with_skip() {
        let mut p = test_player();
        p.trail = vec![
            Vec2::new(600.0, 500.0),
            Vec2::new(700.0, 500.0),
            Vec2::new(700.0, 600.0),
        ];
        p.position = Vec2::new(600.0, 600.0);
        // Segment 0 runs along y = 500
        assert_eq!(p.hits_trail(Vec2::new(650.0, 505.0), 10.0, 0), Some(0));
        // Live segment (700,600)->(600,600) is index 2
        assert_eq!(p.hits_trail(Vec2::new(650.0, 598.0), 10.0, 0), Some(2));
        assert_eq!(p.hits_trail(Vec2::new(650.0, 598.0), 10.0, 1), None);
        assert_eq!(p.hits_trail(Vec2::new(650.0, 505.0), 10.0, 3), None);
        assert_eq!(p.hits_trail(Vec2::new(650.0, 550.0), 10.0, 0), None);
    }

    #[test]
    fn test_dirty_flags() {
        let mut flags = DirtyFlags::NONE;
        assert!(flags.is_empty());
        flags.insert(DirtyFlags::HP | DirtyFlags::TRAIL);
        assert!(flags.contains(DirtyFlags::HP));
        assert!(!flags.contains(DirtyFlags::XP));
        assert_eq!(flags.bits(), 0b1000_0100);
        flags.clear();
        assert!(flags.is_empty());
    }

    #[test]
    fn test_palette_acquire_release() {
        let mut palette = ColorPalette::new();
        let (slot_a, color_a) = palette.acquire(1);
        let (slot_b, color_b) = palette.acquire(2);
        assert_eq!(slot_a, Some(0));
        assert_eq!(slot_b, Some(1));
        assert_ne!(color_a, color_b);
        palette.release(slot_a);
        assert_eq!(palette.acquire(3).0, Some(0));
    }

    #[test]
    fn test_palette_exhaustion_still_colors() {
        let mut palette = ColorPalette::new();
        for id in 0..ColorPalette::SIZE as u32 {
            palette.acquire(id);
        }
        let (slot, _) = palette.acquire(999);
        assert_eq!(slot, None);
        assert_eq!(palette.in_use(), ColorPalette::SIZE);
    }

    #[test]
    fn test_snip_fraction() {
        let snip = SnipState {
            snipped_by: Some(2),
            hit_segment: 0,
            hit_point: Vec2::ZERO,
            progress_dist: 25.0,
            total_trail_length: 100.0,
            elapsed: 1.0,
            fuse_position: Vec2::ZERO,
        };
        assert!((snip.fraction() - 0.25).abs() < 1e-6);
    }
}
