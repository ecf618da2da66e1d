//! Little-endian packet writer/reader and field quantization
//!
//! Positions travel as u16 fractions of the map side, angles as u8 (or
//! u16 for client steering), HP as a u8 fraction of max HP.

use std::f32::consts::TAU;

use crate::util::vec2::{wrap_angle, Vec2};

// ============================================================================
// Quantization
// ============================================================================

/// World coordinate to u16 over `[0, map_size]`
#[inline]
pub fn quantize_coord(value: f32, map_size: f32) -> u16 {
    if !value.is_finite() || map_size <= 0.0 {
        return 0;
    }
    let t = (value / map_size).clamp(0.0, 1.0);
    (t * u16::MAX as f32).round() as u16
}

#[inline]
pub fn dequantize_coord(value: u16, map_size: f32) -> f32 {
    value as f32 / u16::MAX as f32 * map_size
}

/// Heading to u8 (1.4 degree steps)
#[inline]
pub fn quantize_angle_u8(angle: f32) -> u8 {
    if !angle.is_finite() {
        return 0;
    }
    let t = wrap_angle(angle) / TAU;
    ((t * 256.0).round() as u32 % 256) as u8
}

#[inline]
pub fn dequantize_angle_u8(value: u8) -> f32 {
    value as f32 / 256.0 * TAU
}

/// Heading to u16, as sent by clients
#[inline]
pub fn quantize_angle_u16(angle: f32) -> u16 {
    if !angle.is_finite() {
        return 0;
    }
    let t = wrap_angle(angle) / TAU;
    ((t * 65536.0).round() as u32 % 65536) as u16
}

#[inline]
pub fn dequantize_angle_u16(value: u16) -> f32 {
    value as f32 / 65536.0 * TAU
}

/// HP as a fraction of max HP
#[inline]
pub fn quantize_hp(hp: f32, max_hp: f32) -> u8 {
    if !hp.is_finite() || max_hp <= 0.0 {
        return 0;
    }
    ((hp / max_hp).clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Unit fraction to u8
#[inline]
pub fn quantize_fraction(value: f32) -> u8 {
    if !value.is_finite() {
        return 0;
    }
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[inline]
pub fn saturate_u16(value: u32) -> u16 {
    value.min(u16::MAX as u32) as u16
}

#[inline]
pub fn saturate_u8(value: usize) -> u8 {
    value.min(u8::MAX as usize) as u8
}

// ============================================================================
// Writer
// ============================================================================

/// Growable little-endian packet buffer
#[derive(Debug, Default)]
pub struct PacketWriter {
    buffer: Vec<u8>,
}

impl PacketWriter {
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.buffer.push(value);
        self
    }

    #[inline]
    pub fn u16(&mut self, value: u16) -> &mut Self {
        self.buffer.extend_from_slice(&value.to_le_bytes());
        self
    }

    #[inline]
    pub fn u32(&mut self, value: u32) -> &mut Self {
        self.buffer.extend_from_slice(&value.to_le_bytes());
        self
    }

    #[inline]
    pub fn f32(&mut self, value: f32) -> &mut Self {
        self.buffer.extend_from_slice(&value.to_le_bytes());
        self
    }

    #[inline]
    pub fn f64(&mut self, value: f64) -> &mut Self {
        self.buffer.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn bytes(&mut self, data: &[u8]) -> &mut Self {
        self.buffer.extend_from_slice(data);
        self
    }

    /// u8 length prefix, then the bytes. Longer strings are cut at a
    /// char boundary.
    pub fn string(&mut self, value: &str) -> &mut Self {
        let mut end = value.len().min(u8::MAX as usize);
        while !value.is_char_boundary(end) {
            end -= 1;
        }
        self.u8(end as u8);
        self.bytes(&value.as_bytes()[..end])
    }

    /// Quantized position pair
    #[inline]
    pub fn position(&mut self, p: Vec2, map_size: f32) -> &mut Self {
        self.u16(quantize_coord(p.x, map_size));
        self.u16(quantize_coord(p.y, map_size))
    }

    /// u16 count followed by quantized points; extra points are dropped
    pub fn points(&mut self, points: &[Vec2], map_size: f32) -> &mut Self {
        let n = points.len().min(u16::MAX as usize);
        self.u16(n as u16);
        for &p in &points[..n] {
            self.position(p, map_size);
        }
        self
    }

    /// Reserve a u16 count to be filled in later
    pub fn placeholder_u16(&mut self) -> usize {
        let at = self.buffer.len();
        self.u16(0);
        at
    }

    pub fn patch_u16(&mut self, at: usize, value: u16) {
        if let Some(slot) = self.buffer.get_mut(at..at + 2) {
            slot.copy_from_slice(&value.to_le_bytes());
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn finish(self) -> Vec<u8> {
        self.buffer
    }
}

// ============================================================================
// Reader
// ============================================================================

/// Bounds-checked cursor over a received packet
pub struct PacketReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    pub fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.position.checked_add(n)?;
        let slice = self.data.get(self.position..end)?;
        self.position = end;
        Some(slice)
    }

    pub fn u8(&mut self) -> Option<u8> {
        self.take(1).map(|b| b[0])
    }

    pub fn u16(&mut self) -> Option<u16> {
        self.take(2).map(|b| u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn u32(&mut self) -> Option<u32> {
        self.take(4).map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn f32(&mut self) -> Option<f32> {
        self.take(4).map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn f64(&mut self) -> Option<f64> {
        self.take(8).and_then(|b| b.try_into().ok()).map(f64::from_le_bytes)
    }

    /// u8-length-prefixed raw string bytes
    pub fn string_bytes(&mut self) -> Option<&'a [u8]> {
        let len = self.u8()? as usize;
        self.take(len)
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    #[inline]
    pub fn has_remaining(&self) -> bool {
        self.position < self.data.len()
    }
}
