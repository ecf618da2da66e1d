//! Area of Interest (AOI) membership
//!
//! Decides which players and coins each client hears about. Players
//! enter the set inside `radius` and only leave once they are beyond
//! `radius + hysteresis`, so an entity hovering on the edge does not
//! flicker in and out. Coins use the plain radius.

use rustc_hash::FxHashSet;

use crate::config::GameConfig;
use crate::game::spatial::SpatialGrid;
use crate::game::state::EntityId;
use crate::util::vec2::Vec2;

/// Set of entity ids one client currently sees
pub type VisibleSet = FxHashSet<EntityId>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AoiConfig {
    /// Entry radius
    pub radius: f32,
    /// Extra distance before a visible entity is dropped
    pub hysteresis: f32,
}

impl AoiConfig {
    pub fn from_game(config: &GameConfig) -> Self {
        Self {
            radius: config.aoi_radius,
            hysteresis: config.aoi_hysteresis,
        }
    }

    #[inline]
    pub fn exit_radius(&self) -> f32 {
        self.radius + self.hysteresis
    }
}

impl Default for AoiConfig {
    fn default() -> Self {
        Self::from_game(&GameConfig::default())
    }
}

/// Players visible from `center` given what was visible last flush.
/// The viewer itself is never part of the set.
pub fn visible_players(
    grid: &SpatialGrid,
    center: Vec2,
    viewer: EntityId,
    previous: &VisibleSet,
    config: &AoiConfig,
) -> VisibleSet {
    let enter_sq = config.radius * config.radius;
    let mut visible = VisibleSet::default();
    grid.for_each_nearby(center.x, center.y, config.exit_radius(), |entry, d_sq| {
        if entry.id != viewer && (d_sq <= enter_sq || previous.contains(&entry.id)) {
            visible.insert(entry.id);
        }
    });
    visible
}

/// Coins within `radius` of `center`
pub fn visible_coins(grid: &SpatialGrid, center: Vec2, config: &AoiConfig) -> VisibleSet {
    let mut visible = VisibleSet::default();
    grid.for_each_nearby(center.x, center.y, config.radius, |entry, _| {
        visible.insert(entry.id);
    });
    visible
}

/// Whether a point is close enough to `center` to matter to a client
#[inline]
pub fn in_range(center: Vec2, point: Vec2, config: &AoiConfig) -> bool {
    center.distance_sq_to(point) <= config.radius * config.radius
}

/// Statistics about AOI filtering for one client
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AoiStats {
    pub total_players: usize,
    pub visible_players: usize,
    pub total_coins: usize,
    pub visible_coins: usize,
}

impl AoiStats {
    /// Share of players filtered out, in percent
    pub fn reduction_percent(&self) -> f32 {
        if self.total_players == 0 {
            0.0
        } else {
            (1.0 - self.visible_players as f32 / self.total_players as f32) * 100.0
        }
    }
}
