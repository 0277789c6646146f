//! Google encoded polyline codec.
//!
//! Every coordinate is scaled by `10^precision`, delta encoded against the
//! previous point, zig-zag mapped to an unsigned value and written as 5-bit
//! chunks offset into the printable range `63..=126`.

use std::fmt;
use tracing::{instrument, trace};

use crate::types::LatLng;

pub mod geojson;

pub const DEFAULT_PRECISION: u32 = 5;
pub const MAX_PRECISION: u32 = 10;

const CHUNK_BITS: u32 = 5;
const CHUNK_MASK: u64 = 0x1f;
const CONTINUATION: u64 = 0x20;
const CHAR_OFFSET: u8 = 63;
const CHAR_MAX: u8 = 126;

// Keeps deltas and their zig-zag form inside i64.
const MAX_SCALED: f64 = 9.0e15;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PolylineError {
    #[error("Malformed polyline at byte {position}: {reason}")]
    MalformedInput {
        position: usize,
        reason: &'static str,
    },
    #[error("Invalid precision: {0}")]
    InvalidPrecision(String),
    #[error("Coordinate {index} cannot be encoded (not finite or out of range)")]
    InvalidCoordinate { index: usize },
}

/// Number of decimal digits kept by the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Precision(u32);

impl Precision {
    pub fn new(digits: u32) -> Result<Self, PolylineError> {
        if digits > MAX_PRECISION {
            return Err(PolylineError::InvalidPrecision(format!(
                "{} exceeds the maximum of {}",
                digits, MAX_PRECISION
            )));
        }
        Ok(Self(digits))
    }

    pub fn digits(self) -> u32 {
        self.0
    }

    pub fn factor(self) -> f64 {
        10f64.powi(self.0 as i32)
    }
}

impl Default for Precision {
    fn default() -> Self {
        Self(DEFAULT_PRECISION)
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<i64> for Precision {
    type Error = PolylineError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if value < 0 {
            return Err(PolylineError::InvalidPrecision(format!(
                "{} is negative",
                value
            )));
        }
        let digits = u32::try_from(value)
            .map_err(|_| PolylineError::InvalidPrecision(format!("{} is too large", value)))?;
        Self::new(digits)
    }
}

/// JSON numbers arrive as f64, so `2.5` and `-1` are caught here.
impl TryFrom<f64> for Precision {
    type Error = PolylineError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if !value.is_finite() || value.fract() != 0.0 {
            return Err(PolylineError::InvalidPrecision(format!(
                "{} is not an integer",
                value
            )));
        }
        if value > MAX_PRECISION as f64 {
            return Err(PolylineError::InvalidPrecision(format!(
                "{} exceeds the maximum of {}",
                value, MAX_PRECISION
            )));
        }
        Self::try_from(value as i64)
    }
}

/// Resolves an optional caller supplied precision against a fallback.
pub fn resolve_precision(
    requested: Option<f64>,
    fallback: Precision,
) -> Result<Precision, PolylineError> {
    match requested {
        Some(value) => Precision::try_from(value),
        None => Ok(fallback),
    }
}

#[instrument(level = "trace", skip_all, fields(points = coordinates.len(), precision = %precision))]
pub fn encode(coordinates: &[LatLng], precision: Precision) -> Result<String, PolylineError> {
    let factor = precision.factor();
    let mut output = String::with_capacity(coordinates.len() * 8);
    let mut previous = (0i64, 0i64);

    for (index, point) in coordinates.iter().enumerate() {
        let lat = scale(point.lat, factor).ok_or(PolylineError::InvalidCoordinate { index })?;
        let lng = scale(point.lng, factor).ok_or(PolylineError::InvalidCoordinate { index })?;

        encode_value(lat - previous.0, &mut output);
        encode_value(lng - previous.1, &mut output);
        previous = (lat, lng);
    }

    trace!("Encoded {} points into {} bytes", coordinates.len(), output.len());
    Ok(output)
}

#[instrument(level = "trace", skip_all, fields(len = polyline.len(), precision = %precision))]
pub fn decode(polyline: &str, precision: Precision) -> Result<Vec<LatLng>, PolylineError> {
    let factor = precision.factor();
    let bytes = polyline.as_bytes();
    let mut coordinates = Vec::with_capacity(bytes.len() / 4);
    let mut position = 0;
    let mut lat = 0i64;
    let mut lng = 0i64;

    while position < bytes.len() {
        let (lat_delta, next) = decode_value(bytes, position)?;
        if next >= bytes.len() {
            return Err(PolylineError::MalformedInput {
                position: next,
                reason: "latitude without a longitude",
            });
        }
        let (lng_delta, next) = decode_value(bytes, next)?;

        lat = lat
            .checked_add(lat_delta)
            .ok_or(PolylineError::MalformedInput {
                position,
                reason: "latitude overflows",
            })?;
        lng = lng
            .checked_add(lng_delta)
            .ok_or(PolylineError::MalformedInput {
                position,
                reason: "longitude overflows",
            })?;

        coordinates.push(LatLng::new(lat as f64 / factor, lng as f64 / factor));
        position = next;
    }

    trace!("Decoded {} points", coordinates.len());
    Ok(coordinates)
}

fn scale(value: f64, factor: f64) -> Option<i64> {
    let scaled = (value * factor).round();
    if scaled.is_finite() && scaled.abs() <= MAX_SCALED {
        Some(scaled as i64)
    } else {
        None
    }
}

fn encode_value(delta: i64, output: &mut String) {
    let shifted = (delta << 1) as u64;
    let mut value = if delta < 0 { !shifted } else { shifted };

    while value >= CONTINUATION {
        output.push(char::from(
            (CONTINUATION | (value & CHUNK_MASK)) as u8 + CHAR_OFFSET,
        ));
        value >>= CHUNK_BITS;
    }
    output.push(char::from(value as u8 + CHAR_OFFSET));
}

/// Reads one zig-zag value starting at `start`, returns it with the index
/// of the first byte after it.
fn decode_value(bytes: &[u8], start: usize) -> Result<(i64, usize), PolylineError> {
    let mut result = 0u64;
    let mut shift = 0u32;
    let mut position = start;

    loop {
        let Some(&byte) = bytes.get(position) else {
            return Err(PolylineError::MalformedInput {
                position,
                reason: "value ends without a terminating chunk",
            });
        };
        if !(CHAR_OFFSET..=CHAR_MAX).contains(&byte) {
            return Err(PolylineError::MalformedInput {
                position,
                reason: "character outside the polyline alphabet",
            });
        }
        if shift >= u64::BITS {
            return Err(PolylineError::MalformedInput {
                position,
                reason: "value wider than 64 bits",
            });
        }

        let chunk = u64::from(byte - CHAR_OFFSET);
        // The last chunk that fits may only carry the bits left below 64.
        if shift > u64::BITS - CHUNK_BITS && (chunk & CHUNK_MASK) >> (u64::BITS - shift) != 0 {
            return Err(PolylineError::MalformedInput {
                position,
                reason: "value wider than 64 bits",
            });
        }
        result |= (chunk & CHUNK_MASK) << shift;
        shift += CHUNK_BITS;
        position += 1;

        if chunk & CONTINUATION == 0 {
            break;
        }
    }

    let value = if result & 1 == 1 {
        !(result >> 1)
    } else {
        result >> 1
    };
    Ok((value as i64, position))
}
