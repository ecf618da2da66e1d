//! Authoritative room simulation
//!
//! The world owns every entity of one room and advances them by a fixed
//! step. `tick` runs ten phases in order; each phase works over the live
//! slot list, so removals never reorder entities mid-phase. Everything
//! observable that happened is appended to an event list returned from
//! the tick.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

use crate::config::GameConfig;
use crate::game::constants::{aoi, coin, territory as territory_consts, world};
use crate::game::spatial::SpatialGrid;
use crate::game::state::{mark_dead, Coin, ColorPalette, Death, DirtyFlags, EntityId, KillType, Player};
use crate::game::storage::EntityStore;
use crate::game::systems::{coins, collision, combat, movement, progression, snip, territory};
use crate::game::tuning::TuningTables;
use crate::util::vec2::{wrap_angle, Vec2};

// ============================================================================
// Events and results
// ============================================================================

/// Something that happened during a tick, for replication
#[derive(Debug, Clone, PartialEq)]
pub enum WorldEvent {
    Kill {
        victim: EntityId,
        killer: Option<EntityId>,
        kill_type: KillType,
        position: Vec2,
    },
    Capture {
        player: EntityId,
        area_gained: f32,
        position: Vec2,
    },
    LevelUp {
        player: EntityId,
        level: u8,
        position: Vec2,
    },
    CoinSpawn {
        coin: EntityId,
        position: Vec2,
    },
    CoinPickup {
        coin: EntityId,
        player: EntityId,
        position: Vec2,
    },
    SnipStart {
        victim: EntityId,
        attacker: Option<EntityId>,
        position: Vec2,
    },
    /// Player left the world (death or disconnect)
    Left {
        player: EntityId,
        position: Vec2,
    },
}

impl WorldEvent {
    /// Where it happened, for proximity relevance
    pub fn position(&self) -> Vec2 {
        match *self {
            WorldEvent::Kill { position, .. }
            | WorldEvent::Capture { position, .. }
            | WorldEvent::LevelUp { position, .. }
            | WorldEvent::CoinSpawn { position, .. }
            | WorldEvent::CoinPickup { position, .. }
            | WorldEvent::SnipStart { position, .. }
            | WorldEvent::Left { position, .. } => position,
        }
    }

    /// True if `id` is a participant (not just a bystander)
    pub fn involves(&self, id: EntityId) -> bool {
        match *self {
            WorldEvent::Kill { victim, killer, .. } => victim == id || killer == Some(id),
            WorldEvent::Capture { player, .. } | WorldEvent::LevelUp { player, .. } => player == id,
            WorldEvent::CoinPickup { player, .. } => player == id,
            WorldEvent::SnipStart { victim, attacker, .. } => victim == id || attacker == Some(id),
            WorldEvent::Left { player, .. } => player == id,
            WorldEvent::CoinSpawn { .. } => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum JoinError {
    #[error("room is full")]
    RoomFull,
    #[error("no free spawn point")]
    NoSpawn,
}

#[derive(Debug, Clone, Default)]
pub struct TickResult {
    /// Frame number after this tick
    pub frame: u32,
    pub events: Vec<WorldEvent>,
}

/// Take the next id from the shared counter. Zero is never handed out.
fn next_entity_id(next: &mut EntityId) -> EntityId {
    let id = *next;
    *next = next.wrapping_add(1).max(1);
    id
}

// ============================================================================
// World
// ============================================================================

pub struct World {
    config: GameConfig,
    tuning: Arc<TuningTables>,
    players: EntityStore<Player>,
    coins: EntityStore<Coin>,
    player_grid: SpatialGrid,
    coin_grid: SpatialGrid,
    palette: ColorPalette,
    coin_spawner: coins::CoinSpawner,
    rng: StdRng,
    next_id: EntityId,
    frame: u32,
    events: Vec<WorldEvent>,
    deaths: Vec<Death>,
}

impl World {
    pub fn new(config: GameConfig, tuning: Arc<TuningTables>) -> Self {
        Self::with_rng(config, tuning, StdRng::from_entropy())
    }

    /// Deterministic world for tests and replays
    pub fn with_seed(config: GameConfig, tuning: Arc<TuningTables>, seed: u64) -> Self {
        Self::with_rng(config, tuning, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: GameConfig, tuning: Arc<TuningTables>, rng: StdRng) -> Self {
        Self {
            players: EntityStore::with_capacity(config.max_players),
            coins: EntityStore::with_capacity(config.max_coins),
            player_grid: SpatialGrid::new(aoi::CELL_SIZE),
            coin_grid: SpatialGrid::new(aoi::CELL_SIZE),
            palette: ColorPalette::new(),
            coin_spawner: coins::CoinSpawner::new(),
            rng,
            next_id: 1,
            frame: 0,
            events: Vec::new(),
            deaths: Vec::new(),
            config,
            tuning,
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    #[inline]
    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    #[inline]
    pub fn frame(&self) -> u32 {
        self.frame
    }

    #[inline]
    pub fn players(&self) -> &EntityStore<Player> {
        &self.players
    }

    #[inline]
    pub fn coins(&self) -> &EntityStore<Coin> {
        &self.coins
    }

    #[inline]
    pub fn player(&self, id: EntityId) -> Option<&Player> {
        self.players.get(id)
    }

    #[inline]
    pub fn player_mut(&mut self, id: EntityId) -> Option<&mut Player> {
        self.players.get_mut(id)
    }

    #[inline]
    pub fn player_grid(&self) -> &SpatialGrid {
        &self.player_grid
    }

    #[inline]
    pub fn coin_grid(&self) -> &SpatialGrid {
        &self.coin_grid
    }

    #[inline]
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    #[inline]
    pub fn coin_count(&self) -> usize {
        self.coins.len()
    }

    fn alloc_id(&mut self) -> EntityId {
        next_entity_id(&mut self.next_id)
    }

    // ------------------------------------------------------------------
    // Join / leave / input
    // ------------------------------------------------------------------

    /// Join at a random collision-free spawn point
    pub fn add_player(&mut self, name: String) -> Result<EntityId, JoinError> {
        if self.players.len() >= self.config.max_players {
            return Err(JoinError::RoomFull);
        }
        let position = self.find_spawn().ok_or(JoinError::NoSpawn)?;
        let angle = self.rng.gen_range(0.0..std::f32::consts::TAU);
        self.spawn_player_at(name, position, angle)
    }

    /// Join at a given position, skipping the spawn search
    pub fn spawn_player_at(&mut self, name: String, position: Vec2, angle: f32) -> Result<EntityId, JoinError> {
        if self.players.len() >= self.config.max_players {
            return Err(JoinError::RoomFull);
        }
        let id = self.alloc_id();
        let (color_slot, color) = self.palette.acquire(id);
        let mut player = Player::new(id, name, position, angle, color, color_slot);
        let mut alloc = || next_entity_id(&mut self.next_id);
        progression::apply_tier(&mut player, &self.tuning, &mut alloc);

        self.player_grid.insert(&mut player);
        debug!("Player {} '{}' spawned at ({:.0}, {:.0})", id, player.name, position.x, position.y);
        self.players.insert(id, player);
        Ok(id)
    }

    fn find_spawn(&mut self) -> Option<Vec2> {
        let lo = world::SPAWN_MARGIN;
        let hi = self.config.map_size - world::SPAWN_MARGIN;
        if hi <= lo {
            return None;
        }
        for _ in 0..world::SPAWN_ATTEMPTS {
            let candidate = Vec2::new(self.rng.gen_range(lo..hi), self.rng.gen_range(lo..hi));
            if self.spawn_is_clear(candidate) {
                return Some(candidate);
            }
        }
        None
    }

    /// Away from every body and outside every territory, with room for
    /// a starter circle
    fn spawn_is_clear(&self, candidate: Vec2) -> bool {
        self.players.iter().all(|p| {
            p.position.distance_to(candidate) >= world::SPAWN_CLEARANCE
                && !p.contains_point(candidate)
                && p.territory
                    .iter()
                    .all(|v| v.distance_to(candidate) >= territory_consts::STARTER_RADIUS)
        })
    }

    /// Disconnect: remove immediately. Idempotent.
    pub fn remove_player(&mut self, id: EntityId) -> bool {
        let Some(mut player) = self.players.remove(id) else {
            return false;
        };
        self.player_grid.remove(&mut player);
        self.palette.release(player.color_slot);
        self.events.push(WorldEvent::Left {
            player: id,
            position: player.position,
        });
        debug!("Player {} removed", id);
        true
    }

    /// Set the steering target. Ignored for unknown or dead players.
    pub fn handle_input(&mut self, id: EntityId, angle: f32) {
        if !angle.is_finite() {
            return;
        }
        if let Some(player) = self.players.get_mut(id) {
            if player.is_alive() {
                player.target_angle = wrap_angle(angle);
            }
        }
    }

    /// Place a coin. Fails only at the hard population cap.
    pub fn spawn_coin_at(&mut self, position: Vec2, value: u32) -> Option<EntityId> {
        if self.coins.len() >= coin::HARD_CAP {
            return None;
        }
        let id = self.alloc_id();
        let mut c = Coin::new(id, position, value);
        self.coin_grid.insert(&mut c);
        self.coins.insert(id, c);
        self.events.push(WorldEvent::CoinSpawn { coin: id, position });
        Some(id)
    }

    /// Reset change tracking after a replication flush
    pub fn clear_dirty(&mut self) {
        for p in self.players.iter_mut() {
            p.dirty.clear();
        }
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// Advance the simulation by `dt` seconds
    pub fn tick(&mut self, dt: f32) -> TickResult {
        let dt = if dt.is_finite() && dt > 0.0 { dt } else { 0.0 };

        for p in self.players.iter_mut() {
            p.captured_this_tick = false;
            p.area_gained = 0.0;
        }

        self.spawn_coins(dt);
        self.move_players(dt);
        self.burn_fuses(dt);
        self.capture_or_extend();
        self.fire_drones(dt);
        self.pick_up_coins();
        self.award_territory_xp();
        self.resolve_interactions();
        self.process_deaths();

        self.frame = self.frame.wrapping_add(1);
        TickResult {
            frame: self.frame,
            events: std::mem::take(&mut self.events),
        }
    }

    /// Phase 1
    fn spawn_coins(&mut self, dt: f32) {
        if self.coin_spawner.tick(dt, self.coins.len(), self.config.max_coins) {
            let position = coins::random_position(&mut self.rng, self.config.map_size);
            self.spawn_coin_at(position, coin::VALUE);
        }
    }

    /// Phase 2
    fn move_players(&mut self, dt: f32) {
        let map_size = self.config.map_size;
        let center = Vec2::new(map_size * 0.5, map_size * 0.5);
        for slot in self.players.slots() {
            let Some(p) = self.players.at_mut(slot) else {
                continue;
            };
            if p.dead {
                continue;
            }
            movement::update(p, dt, map_size);

            if !p.position.is_finite() || !p.angle.is_finite() {
                warn!("Player {} has a non-finite transform, repairing", p.id);
                p.position = if p.prev_position.is_finite() { p.prev_position } else { center };
                p.angle = 0.0;
                p.target_angle = 0.0;
                p.mark_dirty(DirtyFlags::POSITION | DirtyFlags::ANGLE);
            }

            movement::update_vitals(p, dt, &mut self.deaths);
            self.player_grid.update(p);
        }
    }

    /// Phase 3
    fn burn_fuses(&mut self, dt: f32) {
        for slot in self.players.slots() {
            if let Some(p) = self.players.at_mut(slot) {
                if !p.dead && p.is_snipped() {
                    snip::update(p, dt, &mut self.deaths);
                }
            }
        }
    }

    /// Phase 4
    fn capture_or_extend(&mut self) {
        for slot in self.players.slots() {
            let Some(p) = self.players.at_mut(slot) else {
                continue;
            };
            if p.dead {
                continue;
            }
            if let Some(event) = territory::step(p) {
                self.events.push(event);
            }
        }
    }

    /// Phase 5
    fn fire_drones(&mut self, dt: f32) {
        for p in self.players.iter_mut() {
            if !p.dead {
                combat::orbit(p, dt);
            }
        }

        let mut shots = Vec::new();
        for owner in self.players.iter().filter(|p| p.is_alive()) {
            combat::acquire_targets(owner, &self.players, &self.player_grid, &self.tuning, &mut shots);
        }

        for shot in shots {
            if let Some(d) = self
                .players
                .get_mut(shot.owner)
                .and_then(|owner| owner.drones.get_mut(shot.drone_index))
            {
                d.cooldown = shot.cooldown;
                d.target = Some(shot.target);
            }
            let Some(target) = self.players.get_mut(shot.target) else {
                continue;
            };
            if target.dead {
                continue;
            }
            target.hp = (target.hp - shot.damage).max(0.0);
            target.mark_dirty(DirtyFlags::HP);
            if target.hp <= 0.0 {
                mark_dead(target, Some(shot.owner), KillType::Drone, &mut self.deaths);
            }
        }
    }

    /// Phase 6
    fn pick_up_coins(&mut self) {
        for slot in self.players.slots() {
            let Some(p) = self.players.at_mut(slot) else {
                continue;
            };
            if p.dead {
                continue;
            }
            let mut found = self
                .coin_grid
                .get_nearby(p.position.x, p.position.y, coins::pickup_radius(p.radius()));
            if found.is_empty() {
                continue;
            }
            found.sort_unstable();

            for coin_id in found {
                let Some(mut c) = self.coins.remove(coin_id) else {
                    continue;
                };
                self.coin_grid.remove(&mut c);
                self.events.push(WorldEvent::CoinPickup {
                    coin: coin_id,
                    player: p.id,
                    position: c.position,
                });
                let mut alloc = || next_entity_id(&mut self.next_id);
                if let Some(level) = progression::add_xp(p, c.value, &self.tuning, &mut alloc) {
                    self.events.push(WorldEvent::LevelUp {
                        player: p.id,
                        level,
                        position: p.position,
                    });
                }
            }
        }
    }

    /// Phase 7
    fn award_territory_xp(&mut self) {
        for slot in self.players.slots() {
            let Some(p) = self.players.at_mut(slot) else {
                continue;
            };
            if p.dead {
                continue;
            }
            let amount = progression::territory_xp(p);
            let mut alloc = || next_entity_id(&mut self.next_id);
            if let Some(level) = progression::add_xp(p, amount, &self.tuning, &mut alloc) {
                self.events.push(WorldEvent::LevelUp {
                    player: p.id,
                    level,
                    position: p.position,
                });
            }
        }
    }

    /// Phase 8: every pair of the alive snapshot, then self-trail checks
    fn resolve_interactions(&mut self) {
        let alive: Vec<usize> = self
            .players
            .slots()
            .into_iter()
            .filter(|&slot| self.players.at(slot).is_some_and(Player::is_alive))
            .collect();

        for (i, &a) in alive.iter().enumerate() {
            for &b in &alive[i + 1..] {
                if let Some((pa, pb)) = self.players.pair_mut(a, b) {
                    collision::interact(pa, pb, &mut self.events, &mut self.deaths);
                }
            }
        }

        for &slot in &alive {
            if let Some(p) = self.players.at_mut(slot) {
                collision::self_trail(p, &mut self.events);
            }
        }
    }

    /// Phase 9
    fn process_deaths(&mut self) {
        for death in std::mem::take(&mut self.deaths) {
            let Some(mut victim) = self.players.remove(death.victim) else {
                continue;
            };
            self.player_grid.remove(&mut victim);
            self.palette.release(victim.color_slot);

            if let Some(killer) = death.killer.and_then(|k| self.players.get_mut(k)) {
                killer.kills += 1;
            }

            let (count, value) = coins::death_drop(victim.total_xp);
            for position in coins::ring_positions(victim.position, count, self.config.map_size) {
                if self.spawn_coin_at(position, value).is_none() {
                    break;
                }
            }

            debug!(
                "Player {} died ({:?}, killer {:?})",
                death.victim, death.kill_type, death.killer
            );
            self.events.push(WorldEvent::Kill {
                victim: death.victim,
                killer: death.killer,
                kill_type: death.kill_type,
                position: death.position,
            });
            self.events.push(WorldEvent::Left {
                player: death.victim,
                position: death.position,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::constants::physics::DT;
    use std::f32::consts::PI;

    fn test_world() -> World {
        World::with_seed(GameConfig::default(), Arc::new(TuningTables::builtin()), 42)
    }

    fn disarm(world: &mut World, id: EntityId) {
        world.player_mut(id).unwrap().drones.clear();
    }

    #[test]
    fn test_add_player_spawns_in_starter_territory() {
        let mut world = test_world();
        let id = world.add_player("alice".into()).unwrap();
        let p = world.player(id).unwrap();
        assert!(p.contains_point(p.position));
        assert_eq!(p.territory.len(), territory_consts::STARTER_POINTS);
        assert_eq!(p.drone_count(), 1);
        assert_eq!(world.player_grid().len(), 1);
    }

    #[test]
    fn test_room_full() {
        let config = GameConfig::default().with_max_players(1);
        let mut world = World::with_seed(config, Arc::new(TuningTables::builtin()), 1);
        world.add_player("a".into()).unwrap();
        assert_eq!(world.add_player("b".into()), Err(JoinError::RoomFull));
    }

    #[test]
    fn test_no_spawn_when_crowded() {
        let config = GameConfig {
            map_size: 400.0,
            ..GameConfig::default()
        };
        let mut world = World::with_seed(config, Arc::new(TuningTables::builtin()), 1);
        world.spawn_player_at("a".into(), Vec2::new(200.0, 200.0), 0.0).unwrap();
        assert_eq!(world.add_player("b".into()), Err(JoinError::NoSpawn));
    }

    #[test]
    fn test_ids_are_unique_across_kinds() {
        let mut world = test_world();
        let a = world.add_player("a".into()).unwrap();
        let coin = world.spawn_coin_at(Vec2::new(10.0, 10.0), 1).unwrap();
        let drone = world.player(a).unwrap().drones[0].id;
        assert!(a != coin && a != drone && coin != drone);
        assert!(a > 0);
    }

    #[test]
    fn test_id_counter_skips_zero_on_wrap() {
        let mut next = EntityId::MAX;
        assert_eq!(next_entity_id(&mut next), EntityId::MAX);
        assert_eq!(next_entity_id(&mut next), 1);
        assert_eq!(next, 2);
    }

    #[test]
    fn test_input_ignored_for_unknown_and_bad_angles() {
        let mut world = test_world();
        let id = world.add_player("a".into()).unwrap();
        world.handle_input(999, 1.0);
        world.handle_input(id, f32::NAN);
        let before = world.player(id).unwrap().target_angle;
        world.handle_input(id, before);
        world.handle_input(id, 1.0 + 2.0 * PI);
        assert!((world.player(id).unwrap().target_angle - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_remove_player_is_idempotent() {
        let mut world = test_world();
        let id = world.add_player("a".into()).unwrap();
        assert!(world.remove_player(id));
        assert!(!world.remove_player(id));
        let result = world.tick(DT);
        assert!(result.events.iter().any(|e| matches!(e, WorldEvent::Left { player, .. } if *player == id)));
        assert!(world.player_grid().is_empty());
    }

    #[test]
    fn test_frame_counter_and_event_drain() {
        let mut world = test_world();
        world.spawn_coin_at(Vec2::new(10.0, 10.0), 1);
        let first = world.tick(DT);
        assert_eq!(first.frame, 1);
        assert!(!first.events.is_empty());
        let second = world.tick(DT);
        assert_eq!(second.frame, 2);
        assert!(second.events.iter().all(|e| !matches!(e, WorldEvent::CoinSpawn { position, .. } if *position == Vec2::new(10.0, 10.0))));
    }

    #[test]
    fn test_coin_pickup_awards_xp() {
        let mut world = test_world();
        let id = world.spawn_player_at("a".into(), Vec2::new(1000.0, 1000.0), 0.0).unwrap();
        let coin_id = world.spawn_coin_at(Vec2::new(1003.0, 1000.0), 7).unwrap();
        let result = world.tick(DT);
        assert!(world.coins().get(coin_id).is_none());
        assert_eq!(world.player(id).unwrap().total_xp, 7);
        assert!(result
            .events
            .iter()
            .any(|e| matches!(e, WorldEvent::CoinPickup { coin, player, .. } if *coin == coin_id && *player == id)));
    }

    #[test]
    fn test_dirty_cleared_only_on_request() {
        let mut world = test_world();
        let id = world.spawn_player_at("a".into(), Vec2::new(1000.0, 1000.0), 0.0).unwrap();
        world.tick(DT);
        world.tick(DT);
        assert!(world.player(id).unwrap().dirty.contains(DirtyFlags::POSITION));
        world.clear_dirty();
        assert!(world.player(id).unwrap().dirty.is_empty());
    }

    #[test]
    fn test_speed_buff_ramps_outside_territory() {
        let mut world = test_world();
        let id = world.spawn_player_at("a".into(), Vec2::new(1500.0, 1500.0), 0.0).unwrap();
        disarm(&mut world, id);
        let home_step = {
            world.tick(DT);
            let p = world.player(id).unwrap();
            p.position.distance_to(p.prev_position)
        };

        for _ in 0..240 {
            world.tick(DT);
        }
        let p = world.player(id).unwrap();
        assert!(p.is_alive() && !p.in_territory);
        assert!(p.time_outside > 2.0);
        assert!(p.speed_buff > 1.0);
        assert!(p.position.distance_to(p.prev_position) > home_step * 1.1);
    }

    /// Out 200 units and back in: the trail closes into a bigger territory
    #[test]
    fn test_scenario_out_and_back_captures() {
        let mut world = test_world();
        let id = world.spawn_player_at("a".into(), Vec2::new(1500.0, 1500.0), 0.0).unwrap();
        disarm(&mut world, id);
        let start_area = world.player(id).unwrap().territory_area();
        let turn_at = 1500.0 + territory_consts::STARTER_RADIUS + 200.0;

        let home = Vec2::new(1500.0, 1500.0);
        let mut max_trail = 0;
        let mut turned = false;
        let mut captured = false;
        for _ in 0..1200 {
            let result = world.tick(DT);
            let p = world.player(id).unwrap();
            max_trail = max_trail.max(p.trail.len());
            turned |= p.position.x >= turn_at;
            if turned {
                let heading = (home - p.position).angle();
                world.handle_input(id, heading);
            }
            if result.events.iter().any(|e| matches!(e, WorldEvent::Capture { player, .. } if *player == id)) {
                captured = true;
                break;
            }
        }

        assert!(turned && captured);
        let p = world.player(id).unwrap();
        assert!(max_trail >= 2);
        assert!(p.trail.is_empty());
        assert!(p.territory_area() > start_area);
    }

    /// A body crossing a trail snips its owner, and the fuse kills them
    #[test]
    fn test_scenario_snip_then_fuse_kill() {
        let mut world = test_world();
        let victim = world.spawn_player_at("v".into(), Vec2::new(1000.0, 1000.0), 0.0).unwrap();
        let attacker = world.spawn_player_at("a".into(), Vec2::new(2000.0, 2000.0), PI / 2.0).unwrap();
        disarm(&mut world, victim);
        disarm(&mut world, attacker);

        // Victim heads out along +x
        for _ in 0..60 {
            world.tick(DT);
        }
        let v = world.player(victim).unwrap();
        assert!(!v.in_territory && v.trail.len() >= 2);

        // Drop the attacker onto the trail
        let a = world.player_mut(attacker).unwrap();
        a.position = Vec2::new(1100.0, 995.0);
        a.prev_position = a.position;
        let result = world.tick(DT);
        assert!(result.events.iter().any(|e| matches!(
            e,
            WorldEvent::SnipStart { victim: v, attacker: Some(a), .. } if *v == victim && *a == attacker
        )));
        let v = world.player(victim).unwrap();
        assert!(v.is_snipped());
        assert_eq!(v.snipped_by(), Some(attacker));

        let mut elapsed = 0.0;
        let mut kill = None;
        for _ in 0..600 {
            let result = world.tick(DT);
            elapsed += DT;
            kill = result.events.into_iter().find(|e| matches!(e, WorldEvent::Kill { victim: v, .. } if *v == victim));
            if kill.is_some() {
                break;
            }
        }
        let Some(WorldEvent::Kill { killer, kill_type, .. }) = kill else {
            panic!("victim survived the fuse");
        };
        assert_eq!(killer, Some(attacker));
        assert_eq!(kill_type, KillType::Snip);
        assert!(elapsed > crate::game::constants::snip::GRACE_PERIOD);
        assert!(world.player(victim).is_none());
    }

    /// Equal territories colliding outside: both die, nobody credited
    #[test]
    fn test_scenario_head_on_tie() {
        let mut world = test_world();
        let a = world.spawn_player_at("a".into(), Vec2::new(1000.0, 1000.0), 0.0).unwrap();
        let b = world.spawn_player_at("b".into(), Vec2::new(1400.0, 1000.0), PI).unwrap();
        disarm(&mut world, a);
        disarm(&mut world, b);
        let coins_before = world.coin_count();

        let mut kills = Vec::new();
        let mut lefts = 0;
        for _ in 0..300 {
            let result = world.tick(DT);
            for e in result.events {
                match e {
                    WorldEvent::Kill { victim, killer, kill_type, .. } => kills.push((victim, killer, kill_type)),
                    WorldEvent::Left { .. } => lefts += 1,
                    _ => {}
                }
            }
            if !kills.is_empty() {
                break;
            }
        }

        kills.sort_by_key(|k| k.0);
        assert_eq!(kills, vec![(a, None, KillType::Body), (b, None, KillType::Body)]);
        assert_eq!(lefts, 2);
        assert_eq!(world.player_count(), 0);
        assert!(world.coin_count() >= coins_before + 6);
    }

    #[test]
    fn test_identical_inputs_identical_worlds() {
        let run = || {
            let mut world = test_world();
            let a = world.spawn_player_at("a".into(), Vec2::new(800.0, 800.0), 0.0).unwrap();
            let b = world.spawn_player_at("b".into(), Vec2::new(1600.0, 800.0), PI).unwrap();
            for i in 0..240 {
                world.handle_input(a, (i as f32 * 0.01).sin());
                world.handle_input(b, PI + (i as f32 * 0.02).cos());
                world.tick(DT);
            }
            world
                .players()
                .iter()
                .map(|p| (p.id, p.position, p.hp, p.snip.clone(), p.territory.len()))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }
}
