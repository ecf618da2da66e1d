//! XP coin spawning, pickup and death drops

use rand::Rng;

use crate::game::constants::coin;
use crate::util::vec2::Vec2;

/// Coins stay this far from the map edge
const SPAWN_EDGE_MARGIN: f32 = 20.0;

/// Countdown between ambient spawns
#[derive(Debug, Clone)]
pub struct CoinSpawner {
    timer: f32,
}

impl CoinSpawner {
    pub fn new() -> Self {
        Self {
            timer: coin::SPAWN_INTERVAL,
        }
    }

    /// Advance the timer; true when a coin should spawn now. The timer
    /// only resets on an actual spawn, so a capped population spawns as
    /// soon as there is room.
    pub fn tick(&mut self, dt: f32, population: usize, cap: usize) -> bool {
        self.timer -= dt;
        if self.timer > 0.0 || population >= cap.min(coin::HARD_CAP) {
            return false;
        }
        self.timer += coin::SPAWN_INTERVAL;
        if self.timer <= 0.0 {
            self.timer = coin::SPAWN_INTERVAL;
        }
        true
    }
}

impl Default for CoinSpawner {
    fn default() -> Self {
        Self::new()
    }
}

/// Uniform position inside the map
pub fn random_position<R: Rng>(rng: &mut R, map_size: f32) -> Vec2 {
    let hi = (map_size - SPAWN_EDGE_MARGIN).max(SPAWN_EDGE_MARGIN + 1.0);
    Vec2::new(
        rng.gen_range(SPAWN_EDGE_MARGIN..hi),
        rng.gen_range(SPAWN_EDGE_MARGIN..hi),
    )
}

/// Split a death drop into `(count, value per coin)`
pub fn death_drop(total_xp: u32) -> (u32, u32) {
    let pool = ((total_xp as f32 * coin::DEATH_DROP_FRACTION) as u32).max(coin::DEATH_DROP_MIN);
    let count = (pool / coin::DEATH_DROP_COIN_VALUE).clamp(coin::DEATH_DROP_MIN_COINS, coin::DEATH_DROP_MAX_COINS);
    let value = (pool / count).max(1);
    (count, value)
}

/// Evenly spaced drop positions on a ring, clamped into the map
pub fn ring_positions(center: Vec2, count: u32, map_size: f32) -> Vec<Vec2> {
    (0..count)
        .map(|i| {
            let a = std::f32::consts::TAU * i as f32 / count as f32;
            (center + Vec2::from_angle(a) * coin::DEATH_RING_RADIUS).clamp_to_square(0.0, map_size)
        })
        .collect()
}

/// Pickup distance for a player body of `radius`
#[inline]
pub fn pickup_radius(radius: f32) -> f32 {
    radius + coin::RADIUS
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_spawner_interval() {
        let mut spawner = CoinSpawner::new();
        let dt = 0.1;
        let mut spawned = 0;
        for _ in 0..40 {
            if spawner.tick(dt, 0, 100) {
                spawned += 1;
            }
        }
        // 4 seconds at one coin per 0.4 s
        assert!((9..=10).contains(&spawned));
    }

    #[test]
    fn test_spawner_respects_cap() {
        let mut spawner = CoinSpawner::new();
        assert!(!spawner.tick(1.0, 100, 100));
        assert!(spawner.tick(0.0, 99, 100));
        assert!(!spawner.tick(1.0, coin::HARD_CAP, 10_000));
    }

    #[test]
    fn test_death_drop_split() {
        assert_eq!(death_drop(0), (3, 4));
        let (count, value) = death_drop(200);
        assert_eq!(count, 12);
        assert_eq!(value, 8);
        let (count, _) = death_drop(1_000_000);
        assert_eq!(count, coin::DEATH_DROP_MAX_COINS);
    }

    #[test]
    fn test_ring_positions() {
        let ring = ring_positions(Vec2::new(500.0, 500.0), 4, 3000.0);
        assert_eq!(ring.len(), 4);
        for p in &ring {
            assert!((p.distance_to(Vec2::new(500.0, 500.0)) - coin::DEATH_RING_RADIUS).abs() < 1e-3);
        }
        let clamped = ring_positions(Vec2::new(0.0, 0.0), 8, 3000.0);
        assert!(clamped.iter().all(|p| p.x >= 0.0 && p.y >= 0.0));
    }

    #[test]
    fn test_random_position_in_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let p = random_position(&mut rng, 3000.0);
            assert!(p.x >= SPAWN_EDGE_MARGIN && p.x < 3000.0 - SPAWN_EDGE_MARGIN);
            assert!(p.y >= SPAWN_EDGE_MARGIN && p.y < 3000.0 - SPAWN_EDGE_MARGIN);
        }
    }
}
