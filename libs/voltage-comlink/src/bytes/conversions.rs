//! Numeric type conversions with byte order support
//!
//! Provides functions for converting between:
//! - Register arrays (u16[]) ↔ big-endian value bytes
//! - Register arrays ↔ numeric types (u16, i16, u32, i32, f32, u64, i64, f64)
//! - Register arrays ↔ fixed-length ASCII strings
//!
//! All conversions support configurable byte order via the `ByteOrder` enum.
//! Decoding returns `None` when the register count does not match the type.

use super::ByteOrder;

// ============================================================================
// Register <-> Bytes Conversions
// ============================================================================

/// Convert registers to value bytes, most significant byte first
pub fn regs_to_bytes(regs: &[u16], order: ByteOrder) -> Vec<u8> {
    let mut words = regs.to_vec();
    if order.has_word_swap() {
        words.reverse();
    }
    words
        .iter()
        .flat_map(|w| {
            if order.has_byte_swap() {
                w.to_le_bytes()
            } else {
                w.to_be_bytes()
            }
        })
        .collect()
}

/// Convert value bytes (most significant first) to registers
///
/// Inverse of [`regs_to_bytes`]. A trailing odd byte is padded with zero.
pub fn bytes_to_regs(bytes: &[u8], order: ByteOrder) -> Vec<u16> {
    let mut words: Vec<u16> = bytes
        .chunks(2)
        .map(|chunk| {
            let pair = [chunk[0], chunk.get(1).copied().unwrap_or(0)];
            if order.has_byte_swap() {
                u16::from_le_bytes(pair)
            } else {
                u16::from_be_bytes(pair)
            }
        })
        .collect();
    if order.has_word_swap() {
        words.reverse();
    }
    words
}

// ============================================================================
// Register <-> Numeric Type Conversions
// ============================================================================

macro_rules! register_conversions {
    ($ty:ty, $words:expr, $decode:ident, $encode:ident) => {
        #[doc = concat!("Decode ", stringify!($words), " register(s) into `", stringify!($ty), "`")]
        pub fn $decode(regs: &[u16], order: ByteOrder) -> Option<$ty> {
            if regs.len() != $words {
                return None;
            }
            let bytes = regs_to_bytes(regs, order);
            let mut buf = [0u8; $words * 2];
            buf.copy_from_slice(&bytes);
            Some(<$ty>::from_be_bytes(buf))
        }

        #[doc = concat!("Encode `", stringify!($ty), "` into ", stringify!($words), " register(s)")]
        pub fn $encode(value: $ty, order: ByteOrder) -> Vec<u16> {
            bytes_to_regs(&value.to_be_bytes(), order)
        }
    };
}

register_conversions!(u16, 1, regs_to_u16, u16_to_regs);
register_conversions!(i16, 1, regs_to_i16, i16_to_regs);
register_conversions!(u32, 2, regs_to_u32, u32_to_regs);
register_conversions!(i32, 2, regs_to_i32, i32_to_regs);
register_conversions!(f32, 2, regs_to_f32, f32_to_regs);
register_conversions!(u64, 4, regs_to_u64, u64_to_regs);
register_conversions!(i64, 4, regs_to_i64, i64_to_regs);
register_conversions!(f64, 4, regs_to_f64, f64_to_regs);

// ============================================================================
// String Conversions
// ============================================================================

/// Decode an ASCII block, two characters per register
///
/// Trailing NUL bytes and whitespace are trimmed; non-ASCII bytes are
/// replaced with `?`.
pub fn regs_to_string(regs: &[u16], order: ByteOrder) -> String {
    let bytes = regs_to_bytes(regs, order);
    let text: String = bytes
        .iter()
        .take_while(|b| **b != 0)
        .map(|b| if b.is_ascii() { *b as char } else { '?' })
        .collect();
    text.trim_end().to_string()
}

/// Encode a string into exactly `words` registers, NUL padded
///
/// Returns `None` if the string is not ASCII or does not fit.
pub fn string_to_regs(value: &str, words: usize, order: ByteOrder) -> Option<Vec<u16>> {
    if !value.is_ascii() || value.len() > words * 2 {
        return None;
    }
    let mut bytes = value.as_bytes().to_vec();
    bytes.resize(words * 2, 0);
    Some(bytes_to_regs(&bytes, order))
}
