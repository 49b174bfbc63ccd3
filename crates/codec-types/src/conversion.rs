//! Numeric and byte conversion helpers.
//!
//! Leaf utilities shared by the allocator and the decoder: word construction,
//! two's-complement interpretation, checksummed address formatting, keccak
//! hashing and hex parsing.

use alloy_primitives::{keccak256, Address, B256, I256, U256};
use anyhow::{anyhow, Result};

/// Number of bytes in an EVM word.
pub const WORD_SIZE: usize = 32;

// =============================================================================
// Words
// =============================================================================

/// Build a word from a `U256`.
pub fn word_from_u256(value: U256) -> B256 {
    B256::from(value.to_be_bytes::<32>())
}

/// Interpret up to 32 big-endian bytes as an unsigned integer.
///
/// Inputs longer than a word keep only their low-order 32 bytes.
pub fn u256_from_bytes(bytes: &[u8]) -> U256 {
    let tail = if bytes.len() > WORD_SIZE {
        &bytes[bytes.len() - WORD_SIZE..]
    } else {
        bytes
    };
    U256::from_be_slice(tail)
}

/// Left-pad `bytes` with zeros to a full word (right-aligned value).
pub fn left_pad(bytes: &[u8]) -> B256 {
    let mut word = [0u8; WORD_SIZE];
    let len = bytes.len().min(WORD_SIZE);
    word[WORD_SIZE - len..].copy_from_slice(&bytes[bytes.len() - len..]);
    B256::from(word)
}

/// Right-pad `bytes` with zeros to a full word (left-aligned value).
pub fn right_pad(bytes: &[u8]) -> B256 {
    let mut word = [0u8; WORD_SIZE];
    let len = bytes.len().min(WORD_SIZE);
    word[..len].copy_from_slice(&bytes[..len]);
    B256::from(word)
}

/// Convert a `U256` to `usize` if it fits.
pub fn u256_to_usize(value: U256) -> Option<usize> {
    let limbs = value.as_limbs();
    if limbs[1..].iter().any(|&l| l != 0) {
        return None;
    }
    usize::try_from(limbs[0]).ok()
}

pub fn is_zero(bytes: &[u8]) -> bool {
    bytes.iter().all(|&b| b == 0)
}

// =============================================================================
// Two's Complement
// =============================================================================

/// Sign-extend big-endian two's-complement `bytes` to a signed 256-bit value.
pub fn to_signed(bytes: &[u8]) -> I256 {
    let negative = bytes.first().map(|b| b & 0x80 != 0).unwrap_or(false);
    let mut word = if negative {
        [0xffu8; WORD_SIZE]
    } else {
        [0u8; WORD_SIZE]
    };
    let len = bytes.len().min(WORD_SIZE);
    word[WORD_SIZE - len..].copy_from_slice(&bytes[bytes.len() - len..]);
    I256::from_raw(U256::from_be_bytes(word))
}

/// Whether `padding` is a valid sign extension for a value whose most
/// significant byte is `msb`.
pub fn is_sign_extension(padding: &[u8], msb: u8) -> bool {
    let fill = if msb & 0x80 != 0 { 0xff } else { 0x00 };
    padding.iter().all(|&b| b == fill)
}

/// Two's-complement word for a negative literal of the given magnitude.
pub fn negate(magnitude: U256) -> U256 {
    U256::ZERO.wrapping_sub(magnitude)
}

// =============================================================================
// Addresses & Hashing
// =============================================================================

/// Format 20 address bytes as an EIP-55 checksummed string.
pub fn checksum_address(bytes: &[u8]) -> String {
    Address::from_slice(bytes).to_checksum(None)
}

/// Keccak-256 of `data`.
pub fn keccak(data: &[u8]) -> B256 {
    keccak256(data)
}

/// Keccak-256 of `data`, as an integer (used for slot arithmetic).
pub fn keccak_u256(data: &[u8]) -> U256 {
    U256::from_be_bytes(keccak256(data).0)
}

// =============================================================================
// Fixed Point
// =============================================================================

/// Render a fixed-point magnitude with `places` decimal places.
///
/// Trailing fractional zeros are dropped; `1500` with 3 places renders `1.5`.
pub fn format_fixed(negative: bool, magnitude: U256, places: u8) -> String {
    let digits = magnitude.to_string();
    let places = places as usize;
    let (int_part, frac_part) = if digits.len() > places {
        let split = digits.len() - places;
        (digits[..split].to_string(), digits[split..].to_string())
    } else {
        ("0".to_string(), format!("{:0>width$}", digits, width = places))
    };
    let frac = frac_part.trim_end_matches('0');
    let sign = if negative && !magnitude.is_zero() { "-" } else { "" };
    if frac.is_empty() {
        format!("{}{}", sign, int_part)
    } else {
        format!("{}{}.{}", sign, int_part, frac)
    }
}

// =============================================================================
// Hex
// =============================================================================

/// Format bytes as `0x`-prefixed lowercase hex.
pub fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Parse a hex string to raw bytes.
///
/// # Arguments
/// * `hex_str` - Hex string (with or without 0x prefix)
/// * `context` - Description for error messages
pub fn parse_hex_bytes(hex_str: &str, context: &str) -> Result<Vec<u8>> {
    let hex_str = hex_str.trim();
    let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    hex::decode(hex_str).map_err(|e| anyhow!("Invalid {} hex '{}': {}", context, hex_str, e))
}

/// Parse a hex string to an address with context-aware error message.
pub fn parse_address(hex_str: &str, context: &str) -> Result<Address> {
    let bytes = parse_hex_bytes(hex_str, context)?;
    if bytes.len() != 20 {
        return Err(anyhow!(
            "Invalid {} '{}': expected 20 bytes, got {}",
            context,
            hex_str,
            bytes.len()
        ));
    }
    Ok(Address::from_slice(&bytes))
}

/// Serde adapter encoding `Vec<u8>` as a `0x`-prefixed hex string.
pub mod serde_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::to_hex(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        let s = s.strip_prefix("0x").unwrap_or(&s);
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_signed_sign_extends() {
        assert_eq!(to_signed(&[0xff]), I256::MINUS_ONE);
        assert_eq!(to_signed(&[0x7f]), I256::try_from(127i64).unwrap());
        assert_eq!(to_signed(&[0x80, 0x00]), I256::try_from(-32768i64).unwrap());
        assert_eq!(to_signed(&[]), I256::ZERO);
    }

    #[test]
    fn test_is_sign_extension() {
        assert!(is_sign_extension(&[0xff, 0xff], 0x80));
        assert!(is_sign_extension(&[0x00, 0x00], 0x7f));
        assert!(!is_sign_extension(&[0x00, 0xff], 0x80));
        assert!(!is_sign_extension(&[0x01], 0x01));
    }

    #[test]
    fn test_padding_helpers() {
        let left = left_pad(&[0x12, 0x34]);
        assert_eq!(&left.0[30..], &[0x12, 0x34]);
        assert!(is_zero(&left.0[..30]));

        let right = right_pad(&[0x12, 0x34]);
        assert_eq!(&right.0[..2], &[0x12, 0x34]);
        assert!(is_zero(&right.0[2..]));
    }

    #[test]
    fn test_u256_to_usize() {
        assert_eq!(u256_to_usize(U256::from(42u64)), Some(42));
        assert_eq!(u256_to_usize(U256::MAX), None);
        assert_eq!(u256_to_usize(U256::from(1u64) << 64), None);
    }

    #[test]
    fn test_checksum_address() {
        let bytes = parse_hex_bytes("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed", "test").unwrap();
        assert_eq!(
            checksum_address(&bytes),
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"
        );
    }

    #[test]
    fn test_keccak_of_empty_input() {
        assert_eq!(
            to_hex(keccak(&[]).as_slice()),
            "0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_format_fixed() {
        assert_eq!(format_fixed(false, U256::from(1500u64), 3), "1.5");
        assert_eq!(format_fixed(true, U256::from(25u64), 3), "-0.025");
        assert_eq!(format_fixed(false, U256::from(2000u64), 3), "2");
        assert_eq!(format_fixed(false, U256::ZERO, 18), "0");
        assert_eq!(format_fixed(true, U256::ZERO, 2), "0");
    }

    #[test]
    fn test_parse_hex_bytes_errors_carry_context() {
        let result = parse_hex_bytes("0xzz", "deployed binary");
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("deployed binary"));
    }

    #[test]
    fn test_parse_address_rejects_wrong_length() {
        assert!(parse_address("0x1234", "sender").is_err());
        assert!(parse_address("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed", "sender").is_ok());
    }
}
