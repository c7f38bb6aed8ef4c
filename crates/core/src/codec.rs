//! Fixed-width byte codecs
//!
//! All multi-byte integers in persisted keys and values are big-endian so
//! that byte-wise ordering of keys matches numeric ordering.
//!
//! The score transform maps an `f64` onto a `u64` whose big-endian bytes
//! sort the same way the floats do, negatives included.

use crate::error::{Error, Result};
use byteorder::{BigEndian, ByteOrder};

const SIGN_BIT: u64 = 1 << 63;

/// Encode a `u64` as 8 big-endian bytes
pub fn encode_u64(value: u64) -> [u8; 8] {
    let mut buf = [0u8; 8];
    BigEndian::write_u64(&mut buf, value);
    buf
}

/// Encode an `i64` as 8 big-endian bytes (two's complement)
pub fn encode_i64(value: i64) -> [u8; 8] {
    let mut buf = [0u8; 8];
    BigEndian::write_i64(&mut buf, value);
    buf
}

/// Decode a big-endian `u64` from the first 8 bytes of `buf`
pub fn decode_u64(buf: &[u8]) -> Result<u64> {
    if buf.len() < 8 {
        return Err(Error::corruption(format!(
            "u64 needs 8 bytes, got {}",
            buf.len()
        )));
    }
    Ok(BigEndian::read_u64(buf))
}

/// Decode a big-endian `i64` from the first 8 bytes of `buf`
pub fn decode_i64(buf: &[u8]) -> Result<i64> {
    if buf.len() < 8 {
        return Err(Error::corruption(format!(
            "i64 needs 8 bytes, got {}",
            buf.len()
        )));
    }
    Ok(BigEndian::read_i64(buf))
}

/// Order-preserving transform of a float's bit pattern
///
/// Non-negative floats get the sign bit set; negative floats are inverted.
pub fn score_to_ordered(score: f64) -> u64 {
    let bits = score.to_bits();
    if score >= 0.0 {
        bits | SIGN_BIT
    } else {
        !bits
    }
}

/// Inverse of [`score_to_ordered`]
pub fn ordered_to_score(ordered: u64) -> f64 {
    let bits = if ordered & SIGN_BIT != 0 {
        ordered & !SIGN_BIT
    } else {
        !ordered
    };
    f64::from_bits(bits)
}

/// Score as the 8 bytes stored in a score-ordered key
pub fn encode_score(score: f64) -> [u8; 8] {
    encode_u64(score_to_ordered(score))
}

/// Decode 8 score bytes back into the float
pub fn decode_score(buf: &[u8]) -> Result<f64> {
    decode_u64(buf).map(ordered_to_score)
}

/// Parse bytes as a base-10 signed integer
pub fn parse_i64(buf: &[u8]) -> Result<i64> {
    std::str::from_utf8(buf)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| Error::NumericConversion(String::from_utf8_lossy(buf).into_owned()))
}

/// Parse bytes as a finite float
pub fn parse_f64(buf: &[u8]) -> Result<f64> {
    std::str::from_utf8(buf)
        .ok()
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|f| !f.is_nan())
        .ok_or_else(|| Error::NumericConversion(String::from_utf8_lossy(buf).into_owned()))
}

/// Textual form used when a float is stored or returned
pub fn format_f64(value: f64) -> Vec<u8> {
    format!("{}", value).into_bytes()
}
