/// Simulation and broadcast timing
pub mod physics {
    /// Simulation tick rate in Hz
    pub const TICK_RATE: u32 = 60;
    /// Delta time per tick in seconds
    pub const DT: f32 = 1.0 / TICK_RATE as f32;
    /// Tick duration in microseconds (16_666)
    pub const TICK_DURATION_US: u64 = 1_000_000 / TICK_RATE as u64;
    /// Network flush rate in Hz
    pub const BROADCAST_RATE: u32 = 20;
    /// Sim ticks between flushes
    pub const TICKS_PER_BROADCAST: u64 = (TICK_RATE / BROADCAST_RATE) as u64;
}

/// Map and join limits
pub mod world {
    /// Side of the square map in world units
    pub const MAP_SIZE: f32 = 3000.0;
    /// Maximum players per room
    pub const MAX_PLAYERS: usize = 50;
    /// Attempts to find a collision-free spawn before giving up
    pub const SPAWN_ATTEMPTS: u32 = 64;
    /// Spawns keep this far from the map edge
    pub const SPAWN_MARGIN: f32 = 150.0;
    /// Minimum distance from any other player body at spawn
    pub const SPAWN_CLEARANCE: f32 = 120.0;
}

/// Player movement and vitals
pub mod player {
    /// Base movement speed (units/s)
    pub const BASE_SPEED: f32 = 140.0;
    /// Maximum turn rate (rad/s)
    pub const TURN_RATE: f32 = 4.5;
    /// Collision radius at level 1
    pub const BASE_RADIUS: f32 = 12.0;
    /// Radius growth per level beyond 1
    pub const RADIUS_PER_LEVEL: f32 = 0.04;
    /// Radius scale cap
    pub const MAX_RADIUS_SCALE: f32 = 1.6;
    pub const MAX_HP: f32 = 100.0;
    pub const MAX_STAMINA: f32 = 100.0;
    /// Stamina drain per second while outside own territory
    pub const STAMINA_DRAIN: f32 = 6.0;
    /// Stamina regen per second inside own territory
    pub const STAMINA_REGEN: f32 = 20.0;
    /// HP lost per second while stamina is exhausted
    pub const EXHAUSTION_DAMAGE: f32 = 10.0;
    /// HP regen per second inside own territory
    pub const HP_REGEN: f32 = 4.0;
    /// Maximum name length accepted on join
    pub const MAX_NAME_LEN: usize = 16;
}

/// Speed buff while trailing outside territory
pub mod speed_buff {
    /// Multiplier reached at the end of the ramp
    pub const MAX_MULTIPLIER: f32 = 1.35;
    /// Seconds outside territory to reach the max
    pub const RAMP_DURATION: f32 = 2.5;
    /// Easing exponent of the ramp curve
    pub const EASING_EXPONENT: f32 = 2.0;
}

/// Trail polyline
pub mod trail {
    /// Minimum spacing between stored trail points
    pub const MIN_POINT_SPACING: f32 = 8.0;
    /// Most recent segments ignored by the self-hit test
    pub const SELF_SKIP_SEGMENTS: usize = 3;
}

/// Territory polygons
pub mod territory {
    /// Legacy grid unit used to size starter territories
    pub const CELL_WIDTH: f32 = 50.0;
    /// Starter territory radius
    pub const STARTER_RADIUS: f32 = 1.5 * CELL_WIDTH;
    /// Starter territory vertex count
    pub const STARTER_POINTS: usize = 12;
    /// Area slack for accepting/rejecting a capture (units^2)
    pub const CAPTURE_AREA_TOLERANCE: f32 = 4.0;
    /// Consecutive capture points closer than this are merged
    pub const DEDUPE_DISTANCE: f32 = 0.5;
    /// RDP tolerance applied after capture and subtraction
    pub const SIMPLIFY_EPSILON: f32 = 1.5;
    /// Polygon point cap; simplification escalates until under it
    pub const MAX_POINTS: usize = 512;
    /// Area difference treated as a tie in body collisions
    pub const AREA_TIE_TOLERANCE: f32 = 4.0;
}

/// Snip fuse
pub mod snip {
    /// Seconds before the fuse starts burning
    pub const GRACE_PERIOD: f32 = 0.75;
    /// Initial fuse speed as a multiple of base speed
    pub const INITIAL_SPEED_MULT: f32 = 1.0;
    /// Exponential acceleration constant (1/s)
    pub const ACCELERATION: f32 = 1.1;
    /// Fuse speed cap as a multiple of base speed
    pub const MAX_SPEED_MULT: f32 = 6.0;
}

/// Drone combat
pub mod drone {
    pub const ORBIT_RADIUS: f32 = 42.0;
    /// Angular speed (rad/s)
    pub const ORBIT_SPEED: f32 = 2.4;
    pub const RANGE: f32 = 260.0;
    /// Seconds between shots
    pub const COOLDOWN: f32 = 0.8;
    /// Damage dealt by the first drone
    pub const BASE_DAMAGE: f32 = 9.0;
    /// Damage multiplier for the second drone
    pub const SECOND_DRONE_MULT: f32 = 0.7;
    /// Geometric decay per drone beyond the second
    pub const EXTRA_DRONE_DECAY: f32 = 0.6;
    /// Damage reduction when the target stands in its own territory
    pub const TERRITORY_REDUCTION: f32 = 0.4;
    pub const MAX_DRONES: usize = 6;
}

/// XP coins
pub mod coin {
    /// Seconds between spawns
    pub const SPAWN_INTERVAL: f32 = 0.4;
    /// Population cap for ambient spawns
    pub const MAX_COINS: usize = 220;
    /// Hard cap including death drops
    pub const HARD_CAP: usize = 600;
    pub const VALUE: u32 = 4;
    pub const RADIUS: f32 = 6.0;
    /// Share of lifetime XP dropped on death
    pub const DEATH_DROP_FRACTION: f32 = 0.5;
    pub const DEATH_DROP_MIN: u32 = 12;
    pub const DEATH_DROP_MIN_COINS: u32 = 3;
    pub const DEATH_DROP_MAX_COINS: u32 = 16;
    /// XP per drop coin before the count clamp
    pub const DEATH_DROP_COIN_VALUE: u32 = 8;
    pub const DEATH_RING_RADIUS: f32 = 36.0;
}

/// Experience and levels
pub mod xp {
    /// Captured area per XP point (units^2)
    pub const AREA_PER_XP: f32 = 80.0;
    pub const MAX_LEVEL: u8 = 50;
    pub const LEVEL_BASE: u32 = 40;
    pub const LEVEL_STEP: u32 = 20;
}

/// Area-of-interest replication
pub mod aoi {
    pub const RADIUS: f32 = 900.0;
    /// Extra distance before a visible entity is dropped
    pub const HYSTERESIS: f32 = 150.0;
    /// Spatial grid cell size
    pub const CELL_SIZE: f32 = 250.0;
    /// Full player records per packet; the rest follow in later flushes
    pub const MAX_NEW_PER_FRAME: usize = 16;
}

/// Network constants
pub mod net {
    /// Maximum framed message size (64 KiB)
    pub const MAX_MESSAGE_SIZE: usize = 65536;
    /// Maximum datagram size
    pub const MAX_DATAGRAM_SIZE: usize = 1200;
    /// Outbound packets buffered per client before frames are dropped
    pub const OUTBOUND_QUEUE: usize = 64;
    /// Pending inputs across a room between ticks
    pub const INPUT_QUEUE: usize = 4096;
    /// Seconds without inbound traffic before a client is dropped
    pub const STALE_TIMEOUT_SECS: u64 = 15;
    /// Acked frames older than this force a full resync
    pub const DESYNC_FRAME_WINDOW: u32 = 60;
}
