//! Bit-level operations for field protocol data
//!
//! Common use cases:
//! - Status word bits fanned out to boolean channels
//! - Coil/discrete input packing (LSB-first, 8 per byte)

/// Extract single bit from u16 value
#[inline]
pub fn extract_bit_u16(value: u16, bit_index: u8) -> bool {
    debug_assert!(bit_index < 16, "Bit index out of range: {}", bit_index);
    (value >> bit_index) & 1 == 1
}

/// Return `value` with bit `bit_index` set or cleared
#[inline]
pub fn with_bit_u16(value: u16, bit_index: u8, set: bool) -> u16 {
    debug_assert!(bit_index < 16, "Bit index out of range: {}", bit_index);
    if set {
        value | (1 << bit_index)
    } else {
        value & !(1 << bit_index)
    }
}

/// Indices of all set bits, lowest first
pub fn set_bits_u16(value: u16) -> impl Iterator<Item = u8> {
    (0..16u8).filter(move |i| extract_bit_u16(value, *i))
}

/// Pack coil states into bytes, LSB of the first byte is the first coil
pub fn pack_coils(coils: &[bool]) -> Vec<u8> {
    let mut bytes = vec![0u8; coils.len().div_ceil(8)];
    for (i, coil) in coils.iter().enumerate() {
        if *coil {
            bytes[i / 8] |= 1 << (i % 8);
        }
    }
    bytes
}

/// Unpack `count` coil states from packed bytes
///
/// Returns `None` if `bytes` is too short to hold `count` coils.
pub fn unpack_coils(bytes: &[u8], count: usize) -> Option<Vec<bool>> {
    if bytes.len() < count.div_ceil(8) {
        return None;
    }
    Some(
        (0..count)
            .map(|i| (bytes[i / 8] >> (i % 8)) & 0x01 == 1)
            .collect(),
    )
}
