//! Binary packet protocol
//!
//! Every packet starts with a one-byte tag. Client packets are decoded
//! into [`ClientPacket`]; server packets are written straight from world
//! state by the `encode_*` functions. All multi-byte fields are
//! little-endian; positions, angles and HP are quantized (see `codec`).

use crate::game::constants::player::MAX_NAME_LEN;
use crate::game::state::{Coin, DirtyFlags, EntityId, KillType, Player};
use crate::game::world::{JoinError, WorldEvent};
use crate::net::codec::{
    dequantize_angle_u16, quantize_angle_u16, quantize_angle_u8, quantize_fraction, quantize_hp,
    saturate_u16, saturate_u8, PacketReader, PacketWriter,
};

/// Packet tags
pub mod tags {
    // Client -> server
    pub const HELLO: u8 = 0x01;
    pub const INPUT: u8 = 0x02;
    pub const PING: u8 = 0x03;
    pub const ACK: u8 = 0x04;

    // Server -> client
    pub const HELLO_ACK: u8 = 0x10;
    pub const INIT: u8 = 0x11;
    pub const FRAME: u8 = 0x12;
    pub const DEAD: u8 = 0x13;
    pub const PONG: u8 = 0x14;
}

/// Event record tags inside FRAME
pub mod event_tags {
    pub const KILL: u8 = 1;
    pub const CAPTURE: u8 = 2;
    pub const LEVEL_UP: u8 = 3;
    pub const COIN_SPAWN: u8 = 4;
    pub const COIN_PICKUP: u8 = 5;
    pub const SNIP_START: u8 = 6;
    pub const LEFT: u8 = 7;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("empty packet")]
    Empty,
    #[error("truncated {0} packet")]
    Truncated(&'static str),
    #[error("unknown packet tag 0x{0:02x}")]
    UnknownTag(u8),
    #[error("name is not valid UTF-8")]
    InvalidUtf8,
    #[error("name too long: {0} chars (max {max})", max = MAX_NAME_LEN)]
    NameTooLong(usize),
    #[error("name is empty")]
    EmptyName,
}

/// Why a HELLO was refused. The discriminant is the wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RejectReason {
    RoomFull = 1,
    NoSpawn = 2,
    InvalidName = 3,
    AlreadyJoined = 4,
}

impl From<JoinError> for RejectReason {
    fn from(err: JoinError) -> Self {
        match err {
            JoinError::RoomFull => RejectReason::RoomFull,
            JoinError::NoSpawn => RejectReason::NoSpawn,
        }
    }
}

// ============================================================================
// Client packets
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ClientPacket {
    /// Join (or rejoin after death) with a display name
    Hello { name: String },
    /// Target heading in radians
    Input { angle: f32 },
    Ping { timestamp: f64 },
    /// Frame-desync report: the last frame the client applied
    Ack { frame: u32 },
}

impl ClientPacket {
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = PacketReader::new(data);
        let tag = r.u8().ok_or(ProtocolError::Empty)?;
        match tag {
            tags::HELLO => {
                let raw = r.string_bytes().ok_or(ProtocolError::Truncated("HELLO"))?;
                let name = std::str::from_utf8(raw).map_err(|_| ProtocolError::InvalidUtf8)?;
                Ok(ClientPacket::Hello { name: name.to_string() })
            }
            tags::INPUT => {
                let angle = r.u16().ok_or(ProtocolError::Truncated("INPUT"))?;
                Ok(ClientPacket::Input {
                    angle: dequantize_angle_u16(angle),
                })
            }
            tags::PING => {
                let timestamp = r.f64().ok_or(ProtocolError::Truncated("PING"))?;
                Ok(ClientPacket::Ping { timestamp })
            }
            tags::ACK => {
                let frame = r.u32().ok_or(ProtocolError::Truncated("ACK"))?;
                Ok(ClientPacket::Ack { frame })
            }
            other => Err(ProtocolError::UnknownTag(other)),
        }
    }

    /// Client-side encoding, used by bots and tests
    pub fn encode(&self) -> Vec<u8> {
        let mut w = PacketWriter::with_capacity(24);
        match self {
            ClientPacket::Hello { name } => {
                w.u8(tags::HELLO).string(name);
            }
            ClientPacket::Input { angle } => {
                w.u8(tags::INPUT).u16(quantize_angle_u16(*angle));
            }
            ClientPacket::Ping { timestamp } => {
                w.u8(tags::PING).f64(*timestamp);
            }
            ClientPacket::Ack { frame } => {
                w.u8(tags::ACK).u32(*frame);
            }
        }
        w.finish()
    }
}

/// Trim, drop control characters and collapse whitespace runs
pub fn sanitize_name(raw: &str) -> Result<String, ProtocolError> {
    let cleaned: String = raw.chars().filter(|c| !c.is_control()).collect();
    let name = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    let len = name.chars().count();
    if len == 0 {
        return Err(ProtocolError::EmptyName);
    }
    if len > MAX_NAME_LEN {
        return Err(ProtocolError::NameTooLong(len));
    }
    Ok(name)
}

// ============================================================================
// Records
// ============================================================================

/// Full player record
pub fn write_player(w: &mut PacketWriter, p: &Player, map_size: f32) {
    w.u32(p.id)
        .string(&p.name)
        .u8(p.color.hue)
        .u8(p.color.sat)
        .u8(p.color.lum)
        .position(p.position, map_size)
        .u8(quantize_angle_u8(p.angle))
        .u8(quantize_hp(p.hp, p.max_hp))
        .u16(saturate_u16(p.xp))
        .u8(p.level)
        .u8(saturate_u8(p.drone_count()));
    write_snip_status(w, p);
    w.points(&p.territory, map_size).points(&p.trail, map_size);
}

fn write_snip_status(w: &mut PacketWriter, p: &Player) {
    let fuse = p.snip.as_ref().map_or(0, |s| quantize_fraction(s.fraction()));
    w.u8(p.status_bits()).u8(fuse);
}

/// Delta record carrying only the fields in `mask`
pub fn write_player_delta(w: &mut PacketWriter, p: &Player, mask: DirtyFlags, map_size: f32) {
    w.u32(p.id).u8(mask.bits());
    if mask.contains(DirtyFlags::POSITION) {
        w.position(p.position, map_size);
    }
    if mask.contains(DirtyFlags::ANGLE) {
        w.u8(quantize_angle_u8(p.angle));
    }
    if mask.contains(DirtyFlags::HP) {
        w.u8(quantize_hp(p.hp, p.max_hp));
    }
    if mask.contains(DirtyFlags::XP) {
        w.u16(saturate_u16(p.xp));
    }
    if mask.contains(DirtyFlags::LEVEL) {
        w.u8(p.level);
    }
    if mask.contains(DirtyFlags::DRONES) {
        w.u8(saturate_u8(p.drone_count()));
    }
    if mask.contains(DirtyFlags::TERRITORY) {
        w.points(&p.territory, map_size);
    }
    if mask.contains(DirtyFlags::TRAIL) {
        write_snip_status(w, p);
        w.points(&p.trail, map_size);
    }
}

pub fn write_coin(w: &mut PacketWriter, c: &Coin, map_size: f32) {
    w.u32(c.id)
        .position(c.position, map_size)
        .u8(c.value.min(u8::MAX as u32) as u8);
}

pub fn write_event(w: &mut PacketWriter, event: &WorldEvent, map_size: f32) {
    match *event {
        WorldEvent::Kill {
            victim,
            killer,
            kill_type,
            position,
        } => {
            w.u8(event_tags::KILL)
                .u32(victim)
                .u32(killer.unwrap_or(0))
                .u8(kill_type.as_u8())
                .position(position, map_size);
        }
        WorldEvent::Capture { player, area_gained, .. } => {
            w.u8(event_tags::CAPTURE).u32(player).f32(area_gained);
        }
        WorldEvent::LevelUp { player, level, .. } => {
            w.u8(event_tags::LEVEL_UP).u32(player).u8(level);
        }
        WorldEvent::CoinSpawn { coin, position } => {
            w.u8(event_tags::COIN_SPAWN).u32(coin).position(position, map_size);
        }
        WorldEvent::CoinPickup { coin, player, .. } => {
            w.u8(event_tags::COIN_PICKUP).u32(coin).u32(player);
        }
        WorldEvent::SnipStart {
            victim,
            attacker,
            position,
        } => {
            w.u8(event_tags::SNIP_START)
                .u32(victim)
                .u32(attacker.unwrap_or(0))
                .position(position, map_size);
        }
        WorldEvent::Left { player, .. } => {
            w.u8(event_tags::LEFT).u32(player);
        }
    }
}

/// Write a u16 count followed by each item
fn write_list<T>(w: &mut PacketWriter, items: &[T], mut each: impl FnMut(&mut PacketWriter, &T)) {
    let n = items.len().min(u16::MAX as usize);
    w.u16(n as u16);
    for item in &items[..n] {
        each(w, item);
    }
}

// ============================================================================
// Server packets
// ============================================================================

pub fn encode_hello_ack(result: Result<(), RejectReason>) -> Vec<u8> {
    let mut w = PacketWriter::with_capacity(3);
    w.u8(tags::HELLO_ACK);
    match result {
        Ok(()) => {
            w.u8(1);
        }
        Err(reason) => {
            w.u8(0).u8(reason as u8);
        }
    }
    w.finish()
}

/// Full snapshot sent on join and on resync
pub fn encode_init(me: &Player, map_size: f32, players: &[&Player], coins: &[&Coin]) -> Vec<u8> {
    let mut w = PacketWriter::with_capacity(4096);
    w.u8(tags::INIT).u32(me.id).f32(map_size);
    write_player(&mut w, me, map_size);
    write_list(&mut w, players, |w, p| write_player(w, p, map_size));
    write_list(&mut w, coins, |w, c| write_coin(w, c, map_size));
    w.finish()
}

/// Everything one client needs for one flush
pub struct FrameContent<'a> {
    pub frame: u32,
    pub me: &'a Player,
    pub new: Vec<&'a Player>,
    pub updated: Vec<(&'a Player, DirtyFlags)>,
    pub removed: Vec<EntityId>,
    pub coins: Vec<&'a Coin>,
    pub events: Vec<&'a WorldEvent>,
}

pub fn encode_frame(content: &FrameContent<'_>, map_size: f32) -> Vec<u8> {
    let mut w = PacketWriter::with_capacity(1024);
    w.u8(tags::FRAME).u32(content.frame);
    write_player(&mut w, content.me, map_size);
    write_list(&mut w, &content.new, |w, p| write_player(w, p, map_size));
    write_list(&mut w, &content.updated, |w, (p, mask)| {
        write_player_delta(w, p, *mask, map_size)
    });
    write_list(&mut w, &content.removed, |w, id| {
        w.u32(*id);
    });
    write_list(&mut w, &content.coins, |w, c| write_coin(w, c, map_size));
    write_list(&mut w, &content.events, |w, e| write_event(w, e, map_size));
    w.finish()
}

pub fn encode_dead(killer: Option<EntityId>, kill_type: KillType) -> Vec<u8> {
    let mut w = PacketWriter::with_capacity(6);
    w.u8(tags::DEAD).u32(killer.unwrap_or(0)).u8(kill_type.as_u8());
    w.finish()
}

pub fn encode_pong(timestamp: f64) -> Vec<u8> {
    let mut w = PacketWriter::with_capacity(9);
    w.u8(tags::PONG).f64(timestamp);
    w.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::HslColor;
    use crate::net::codec::dequantize_coord;
    use crate::util::vec2::Vec2;

    fn test_player(id: EntityId) -> Player {
        let color = HslColor { hue: 10, sat: 20, lum: 30 };
        Player::new(id, "bob".into(), Vec2::new(1500.0, 750.0), 0.0, color, None)
    }

    #[test]
    fn test_decode_client_packets() {
        let packets = [
            ClientPacket::Hello { name: "alice".into() },
            ClientPacket::Ping { timestamp: 123.25 },
            ClientPacket::Ack { frame: 77 },
        ];
        for packet in packets {
            assert_eq!(ClientPacket::decode(&packet.encode()), Ok(packet));
        }
        let Ok(ClientPacket::Input { angle }) = ClientPacket::decode(&ClientPacket::Input { angle: 1.0 }.encode()) else {
            panic!("input did not decode");
        };
        assert!((angle - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(ClientPacket::decode(&[]), Err(ProtocolError::Empty));
        assert_eq!(ClientPacket::decode(&[0x7f]), Err(ProtocolError::UnknownTag(0x7f)));
        assert_eq!(ClientPacket::decode(&[tags::INPUT, 1]), Err(ProtocolError::Truncated("INPUT")));
        assert_eq!(ClientPacket::decode(&[tags::HELLO, 4, b'a']), Err(ProtocolError::Truncated("HELLO")));
        assert_eq!(ClientPacket::decode(&[tags::HELLO, 2, 0xff, 0xfe]), Err(ProtocolError::InvalidUtf8));
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("  bob  "), Ok("bob".to_string()));
        assert_eq!(sanitize_name("a\u{0007}b"), Ok("ab".to_string()));
        assert_eq!(sanitize_name("big   \t  tuna"), Ok("big tuna".to_string()));
        assert_eq!(sanitize_name(" \n "), Err(ProtocolError::EmptyName));
        assert_eq!(sanitize_name("abcdefghijklmnopq"), Err(ProtocolError::NameTooLong(17)));
        assert!(sanitize_name("ééééééééééééééé").is_ok());
    }

    #[test]
    fn test_hello_ack_layout() {
        assert_eq!(encode_hello_ack(Ok(())), vec![tags::HELLO_ACK, 1]);
        assert_eq!(encode_hello_ack(Err(RejectReason::InvalidName)), vec![tags::HELLO_ACK, 0, 3]);
        assert_eq!(RejectReason::from(JoinError::RoomFull) as u8, 1);
        assert_eq!(RejectReason::from(JoinError::NoSpawn) as u8, 2);
    }

    #[test]
    fn test_full_player_record_layout() {
        let p = test_player(9);
        let mut w = PacketWriter::new();
        write_player(&mut w, &p, 3000.0);
        let data = w.finish();

        let mut r = PacketReader::new(&data);
        assert_eq!(r.u32(), Some(9));
        assert_eq!(r.string_bytes(), Some(&b"bob"[..]));
        assert_eq!((r.u8(), r.u8(), r.u8()), (Some(10), Some(20), Some(30)));
        let x = dequantize_coord(r.u16().unwrap(), 3000.0);
        let y = dequantize_coord(r.u16().unwrap(), 3000.0);
        assert!((x - 1500.0).abs() < 0.1 && (y - 750.0).abs() < 0.1);
        assert_eq!(r.u8(), Some(0)); // angle
        assert_eq!(r.u8(), Some(255)); // hp
        assert_eq!(r.u16(), Some(0)); // xp
        assert_eq!(r.u8(), Some(1)); // level
        assert_eq!(r.u8(), Some(0)); // drones
        assert_eq!(r.u8(), Some(0b10)); // in territory
        assert_eq!(r.u8(), Some(0)); // fuse
        assert_eq!(r.u16(), Some(p.territory.len() as u16));
        r.take(p.territory.len() * 4);
        assert_eq!(r.u16(), Some(0));
        assert!(!r.has_remaining());
    }

    #[test]
    fn test_delta_writes_only_masked_fields() {
        let p = test_player(3);
        let mut w = PacketWriter::new();
        write_player_delta(&mut w, &p, DirtyFlags::HP | DirtyFlags::LEVEL, 3000.0);
        assert_eq!(w.finish(), vec![3, 0, 0, 0, 0b0001_0100, 255, 1]);
    }

    #[test]
    fn test_event_records() {
        let mut w = PacketWriter::new();
        write_event(
            &mut w,
            &WorldEvent::Kill {
                victim: 5,
                killer: None,
                kill_type: KillType::Snip,
                position: Vec2::ZERO,
            },
            3000.0,
        );
        write_event(&mut w, &WorldEvent::Left { player: 5, position: Vec2::ZERO }, 3000.0);
        let data = w.finish();
        assert_eq!(
            data,
            vec![event_tags::KILL, 5, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0, event_tags::LEFT, 5, 0, 0, 0]
        );
    }

    #[test]
    fn test_frame_counts() {
        let me = test_player(1);
        let other = test_player(2);
        let content = FrameContent {
            frame: 42,
            me: &me,
            new: vec![&other],
            updated: Vec::new(),
            removed: vec![7, 8],
            coins: Vec::new(),
            events: Vec::new(),
        };
        let data = encode_frame(&content, 3000.0);
        let mut r = PacketReader::new(&data);
        assert_eq!(r.u8(), Some(tags::FRAME));
        assert_eq!(r.u32(), Some(42));
        assert!(data.len() > 5);
    }

    #[test]
    fn test_dead_and_pong() {
        assert_eq!(encode_dead(Some(4), KillType::Drone), vec![tags::DEAD, 4, 0, 0, 0, 3]);
        assert_eq!(encode_dead(None, KillType::Exhaustion)[1..5], [0, 0, 0, 0]);
        let pong = encode_pong(5.5);
        assert_eq!(pong[0], tags::PONG);
        assert_eq!(PacketReader::new(&pong[1..]).f64(), Some(5.5));
    }
}
