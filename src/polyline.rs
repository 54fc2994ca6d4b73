//! Encoded polyline decoding.
//!
//! Decodes the de-facto standard polyline format used by routing
//! services: each point is a pair of zig-zag encoded deltas (latitude
//! first), each delta split into 5-bit chunks offset by 63 with bit
//! 0x20 marking continuation. Deltas are accumulated as integers and
//! scaled by 1e5, so decoding is exact and repeatable.
//!
//! Unlike permissive decoders, malformed input is rejected instead of
//! producing a truncated or garbage point list.

use crate::error::DecodeError;
use crate::geo::Coordinate;

/// Precision factor of the format (5 decimal places).
pub const PRECISION: f64 = 1e5;

const CHAR_OFFSET: u8 = 63;
const CONTINUATION: u64 = 0x20;
const CHUNK_MASK: u64 = 0x1f;
/// Shift of the 7th and last chunk of a 32-bit value; only its low 2 bits fit.
const LAST_CHUNK_SHIFT: u32 = 30;
const LAST_CHUNK_MAX: u64 = 0x3;

/// Decode an encoded polyline into its coordinate sequence.
///
/// An empty string decodes to an empty sequence.
pub fn decode(encoded: &str) -> Result<Vec<Coordinate>, DecodeError> {
    let bytes = encoded.as_bytes();
    let mut points = Vec::new();
    let mut offset = 0;
    let mut lat: i64 = 0;
    let mut lon: i64 = 0;

    while offset < bytes.len() {
        lat += next_value(bytes, &mut offset)?;

        if offset == bytes.len() {
            return Err(DecodeError::UnpairedValue { offset });
        }
        lon += next_value(bytes, &mut offset)?;

        points.push(Coordinate {
            lat: lat as f64 / PRECISION,
            lon: lon as f64 / PRECISION,
        });
    }

    Ok(points)
}

/// Read one zig-zag encoded value starting at `offset`, advancing it
/// past the terminating chunk.
fn next_value(bytes: &[u8], offset: &mut usize) -> Result<i64, DecodeError> {
    let start = *offset;
    let mut result: u64 = 0;
    let mut shift: u32 = 0;

    loop {
        let Some(&byte) = bytes.get(*offset) else {
            return Err(DecodeError::Truncated { offset: *offset });
        };
        if !(CHAR_OFFSET..=126).contains(&byte) {
            return Err(DecodeError::InvalidCharacter {
                offset: *offset,
                byte,
            });
        }
        let chunk = u64::from(byte - CHAR_OFFSET);
        if shift == LAST_CHUNK_SHIFT && chunk > LAST_CHUNK_MAX {
            return Err(DecodeError::Overflow { offset: start });
        }

        result |= (chunk & CHUNK_MASK) << shift;
        shift += 5;
        *offset += 1;

        if chunk < CONTINUATION {
            break;
        }
    }

    let magnitude = (result >> 1) as i64;
    Ok(if result & 1 != 0 { !magnitude } else { magnitude })
}
