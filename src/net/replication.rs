//! Per-client replication state
//!
//! Tracks which players and coins a client already knows about and
//! turns the world into INIT and FRAME packets for it:
//!
//! - players entering the AOI go out as full records (`new`)
//! - known players with dirty fields go out as delta records (`updated`)
//! - players and coins leaving the AOI, dying or despawning go in `removed`
//! - coins entering the AOI go in `coins`
//! - events are sent when the client is involved or they happened nearby
//!
//! Dirty flags are read here but never cleared; the room clears them
//! once per flush after every client has been encoded.

use crate::game::constants::{aoi as aoi_consts, net};
use crate::game::state::{EntityId, Player};
use crate::game::world::{World, WorldEvent};
use crate::net::aoi::{self, AoiConfig, AoiStats, VisibleSet};
use crate::net::protocol::{encode_frame, encode_init, FrameContent};

pub struct ReplicationState {
    player_id: EntityId,
    known_players: VisibleSet,
    known_coins: VisibleSet,
    /// Last frame number sent (INIT or FRAME)
    last_frame: u32,
    needs_resync: bool,
    stats: AoiStats,
}

impl ReplicationState {
    /// Fresh state; the first packet built is an INIT
    pub fn new(player_id: EntityId) -> Self {
        Self {
            player_id,
            known_players: VisibleSet::default(),
            known_coins: VisibleSet::default(),
            last_frame: 0,
            needs_resync: true,
            stats: AoiStats::default(),
        }
    }

    #[inline]
    pub fn player_id(&self) -> EntityId {
        self.player_id
    }

    #[inline]
    pub fn last_frame(&self) -> u32 {
        self.last_frame
    }

    #[inline]
    pub fn needs_resync(&self) -> bool {
        self.needs_resync
    }

    #[inline]
    pub fn stats(&self) -> AoiStats {
        self.stats
    }

    pub fn is_known(&self, id: EntityId) -> bool {
        self.known_players.contains(&id) || self.known_coins.contains(&id)
    }

    /// Send a full INIT on the next flush
    pub fn request_resync(&mut self) {
        self.needs_resync = true;
    }

    /// Frame ACK from the client. An ACK ahead of what was sent, or too
    /// far behind it, means the client lost track; returns true when a
    /// resync was scheduled.
    pub fn on_ack(&mut self, frame: u32) -> bool {
        let desynced = frame > self.last_frame || self.last_frame - frame > net::DESYNC_FRAME_WINDOW;
        if desynced {
            self.needs_resync = true;
        }
        desynced
    }

    /// Packet for this flush: INIT when a resync is pending, FRAME
    /// otherwise. `None` once the player is gone from the world.
    pub fn build_packet(&mut self, world: &World, events: &[WorldEvent], config: &AoiConfig) -> Option<Vec<u8>> {
        if self.needs_resync {
            self.build_init(world, config)
        } else {
            self.build_frame(world, events, config)
        }
    }

    /// Full snapshot of everything in range, resetting the known sets
    pub fn build_init(&mut self, world: &World, config: &AoiConfig) -> Option<Vec<u8>> {
        let me = world.player(self.player_id)?;
        let map_size = world.config().map_size;

        let visible = aoi::visible_players(world.player_grid(), me.position, me.id, &VisibleSet::default(), config);
        let players = closest_first(world, me, &visible, aoi_consts::MAX_NEW_PER_FRAME);
        let coin_ids = sorted(&aoi::visible_coins(world.coin_grid(), me.position, config));
        let coins: Vec<_> = coin_ids.iter().filter_map(|&id| world.coins().get(id)).collect();

        let packet = encode_init(me, map_size, &players, &coins);

        self.known_players = players.iter().map(|p| p.id).collect();
        self.known_coins = coins.iter().map(|c| c.id).collect();
        self.last_frame = world.frame();
        self.needs_resync = false;
        self.record_stats(world, visible.len(), coins.len());
        Some(packet)
    }

    /// Diff against what the client already knows
    pub fn build_frame(&mut self, world: &World, events: &[WorldEvent], config: &AoiConfig) -> Option<Vec<u8>> {
        let me = world.player(self.player_id)?;
        let map_size = world.config().map_size;

        let visible = aoi::visible_players(world.player_grid(), me.position, me.id, &self.known_players, config);

        // Entering: nearest first, capped; the rest wait for a later flush
        let entering: VisibleSet = visible.difference(&self.known_players).copied().collect();
        let new = closest_first(world, me, &entering, aoi_consts::MAX_NEW_PER_FRAME);

        let mut updated: Vec<_> = visible
            .intersection(&self.known_players)
            .filter_map(|&id| world.player(id))
            .filter(|p| !p.dirty.is_empty())
            .map(|p| (p, p.dirty))
            .collect();
        updated.sort_unstable_by_key(|(p, _)| p.id);

        let mut removed: Vec<EntityId> = self.known_players.difference(&visible).copied().collect();

        let visible_coins = aoi::visible_coins(world.coin_grid(), me.position, config);
        removed.extend(self.known_coins.difference(&visible_coins).copied());
        removed.sort_unstable();
        let entering_coins: VisibleSet = visible_coins.difference(&self.known_coins).copied().collect();
        let coins: Vec<_> = sorted(&entering_coins)
            .into_iter()
            .filter_map(|id| world.coins().get(id))
            .collect();

        let relevant: Vec<&WorldEvent> = events
            .iter()
            .filter(|e| e.involves(me.id) || aoi::in_range(me.position, e.position(), config))
            .collect();

        let content = FrameContent {
            frame: world.frame(),
            me,
            new,
            updated,
            removed,
            coins,
            events: relevant,
        };
        let packet = encode_frame(&content, map_size);

        for id in &content.removed {
            self.known_players.remove(id);
            self.known_coins.remove(id);
        }
        self.known_players.extend(content.new.iter().map(|p| p.id));
        self.known_coins.extend(content.coins.iter().map(|c| c.id));
        self.last_frame = content.frame;
        self.record_stats(world, visible.len(), visible_coins.len());
        Some(packet)
    }

    fn record_stats(&mut self, world: &World, visible_players: usize, visible_coins: usize) {
        self.stats = AoiStats {
            total_players: world.player_count().saturating_sub(1),
            visible_players,
            total_coins: world.coin_count(),
            visible_coins,
        };
    }
}

fn sorted(set: &VisibleSet) -> Vec<EntityId> {
    let mut ids: Vec<EntityId> = set.iter().copied().collect();
    ids.sort_unstable();
    ids
}

/// Up to `limit` players from `ids`, nearest to `me` first (ties by id)
fn closest_first<'w>(world: &'w World, me: &Player, ids: &VisibleSet, limit: usize) -> Vec<&'w Player> {
    let mut players: Vec<&Player> = ids.iter().filter_map(|&id| world.player(id)).collect();
    players.sort_unstable_by(|a, b| {
        let da = a.position.distance_sq_to(me.position);
        let db = b.position.distance_sq_to(me.position);
        da.total_cmp(&db).then(a.id.cmp(&b.id))
    });
    players.truncate(limit);
    players
}
