//! Unified byte order representation for multi-register values
//!
//! Provides a type-safe enum for the byte/word ordering patterns used by
//! field devices when a value spans more than one 16-bit register.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ComLinkError;

/// Byte/word order of a value spread over one or more 16-bit registers
///
/// # Terminology
/// - **Byte order**: Order of the two bytes inside each register
/// - **Word order**: Order of the registers when combining to form 32/64-bit values
///
/// # Naming Convention
/// Uses ABCD notation where:
/// - A = Most significant byte (MSB)
/// - B = Second byte
/// - C = Third byte
/// - D = Least significant byte (LSB)
///
/// For 32-bit value `0x12345678` the registers on the wire are:
/// - `BigEndian (ABCD)`: [0x1234, 0x5678]
/// - `LittleEndian (DCBA)`: [0x7856, 0x3412]
/// - `BigEndianSwap (CDAB)`: [0x5678, 0x1234]
/// - `LittleEndianSwap (BADC)`: [0x3412, 0x7856]
///
/// The same rules extend to any number of registers; a single register
/// is byte-swapped by `DCBA` and `BADC` only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ByteOrder {
    /// Big-endian: ABCD (most significant register and byte first)
    #[default]
    #[serde(rename = "ABCD", alias = "BE", alias = "BIG_ENDIAN")]
    BigEndian,

    /// Little-endian: DCBA (least significant byte first)
    #[serde(rename = "DCBA", alias = "LE", alias = "LITTLE_ENDIAN")]
    LittleEndian,

    /// Big-endian bytes with swapped words: CDAB
    ///
    /// Common with PLCs and inverters that store the low word first.
    #[serde(rename = "CDAB", alias = "BIG_ENDIAN_SWAP")]
    BigEndianSwap,

    /// Little-endian bytes with big-endian words: BADC
    #[serde(rename = "BADC", alias = "LITTLE_ENDIAN_SWAP")]
    LittleEndianSwap,
}

impl ByteOrder {
    /// Get descriptive name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BigEndian => "ABCD (Big-Endian)",
            Self::LittleEndian => "DCBA (Little-Endian)",
            Self::BigEndianSwap => "CDAB (Big-Endian Swap)",
            Self::LittleEndianSwap => "BADC (Little-Endian Swap)",
        }
    }

    /// Registers appear least significant first
    pub fn has_word_swap(&self) -> bool {
        matches!(self, Self::BigEndianSwap | Self::LittleEndian)
    }

    /// Bytes inside each register appear least significant first
    pub fn has_byte_swap(&self) -> bool {
        matches!(self, Self::LittleEndianSwap | Self::LittleEndian)
    }
}

impl FromStr for ByteOrder {
    type Err = ComLinkError;

    /// Accepts "ABCD", "AB-CD", "BE", "BIG_ENDIAN" and the equivalents of
    /// the other three orders, case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.to_uppercase().replace('-', "");
        match normalized.as_str() {
            "ABCD" | "BE" | "BIG_ENDIAN" | "BIGENDIAN" | "ABCDEFGH" => Ok(Self::BigEndian),
            "DCBA" | "LE" | "LITTLE_ENDIAN" | "LITTLEENDIAN" | "HGFEDCBA" => {
                Ok(Self::LittleEndian)
            },
            "CDAB" | "BIG_ENDIAN_SWAP" | "BIGENDIANSWAP" => Ok(Self::BigEndianSwap),
            "BADC" | "LITTLE_ENDIAN_SWAP" | "LITTLEENDIANSWAP" => Ok(Self::LittleEndianSwap),
            _ => Err(ComLinkError::config(format!("unknown byte order '{s}'"))),
        }
    }
}

impl std::fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str_valid() {
        assert_eq!("ABCD".parse::<ByteOrder>().unwrap(), ByteOrder::BigEndian);
        assert_eq!("AB-CD".parse::<ByteOrder>().unwrap(), ByteOrder::BigEndian);
        assert_eq!("be".parse::<ByteOrder>().unwrap(), ByteOrder::BigEndian);
        assert_eq!("DCBA".parse::<ByteOrder>().unwrap(), ByteOrder::LittleEndian);
        assert_eq!("cdab".parse::<ByteOrder>().unwrap(), ByteOrder::BigEndianSwap);
        assert_eq!(
            "BADC".parse::<ByteOrder>().unwrap(),
            ByteOrder::LittleEndianSwap
        );
    }

    #[test]
    fn test_from_str_invalid() {
        assert!("invalid".parse::<ByteOrder>().is_err());
        assert!("".parse::<ByteOrder>().is_err());
    }

    #[test]
    fn test_swap_properties() {
        assert!(ByteOrder::BigEndianSwap.has_word_swap());
        assert!(!ByteOrder::BigEndianSwap.has_byte_swap());
        assert!(ByteOrder::LittleEndian.has_word_swap());
        assert!(ByteOrder::LittleEndian.has_byte_swap());
        assert!(!ByteOrder::BigEndian.has_word_swap());
    }

    #[test]
    fn test_serde_names() {
        let order: ByteOrder = serde_json::from_str("\"CDAB\"").unwrap();
        assert_eq!(order, ByteOrder::BigEndianSwap);
        let order: ByteOrder = serde_json::from_str("\"LE\"").unwrap();
        assert_eq!(order, ByteOrder::LittleEndian);
        assert_eq!(
            serde_json::to_string(&ByteOrder::BigEndian).unwrap(),
            "\"ABCD\""
        );
    }

    #[test]
    fn test_default() {
        assert_eq!(ByteOrder::default(), ByteOrder::BigEndian);
    }
}
