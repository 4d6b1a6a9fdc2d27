//! Wire format for a single reading: `u16` sensor id, `f64` value, `i64`
//! timestamp, back to back, no framing header. Explicitly little-endian
//! regardless of host byte order — the original read the three fields as
//! a raw host-order `memcpy`, which the redesign flags call out as a
//! portability hazard worth fixing.

use crate::model::Reading;

/// Total byte length of one frame: 2 (id) + 8 (value) + 8 (timestamp).
pub const FRAME_LEN: usize = 18;

pub fn decode(buf: &[u8]) -> Reading {
    debug_assert!(buf.len() >= FRAME_LEN);
    let sensor_id = u16::from_le_bytes([buf[0], buf[1]]);
    let value = f64::from_le_bytes(buf[2..10].try_into().unwrap());
    let timestamp = i64::from_le_bytes(buf[10..18].try_into().unwrap());
    Reading {
        sensor_id,
        value,
        timestamp,
    }
}

pub fn encode(reading: &Reading) -> [u8; FRAME_LEN] {
    let mut out = [0u8; FRAME_LEN];
    out[0..2].copy_from_slice(&reading.sensor_id.to_le_bytes());
    out[2..10].copy_from_slice(&reading.value.to_le_bytes());
    out[10..18].copy_from_slice(&reading.timestamp.to_le_bytes());
    out
}
