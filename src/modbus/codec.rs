//! Register value decoding and encoding.
//!
//! 32-bit values occupy two consecutive words with the low word first:
//! `raw[offset]` holds bits 0..16 and `raw[offset + 1]` holds bits 16..32.

use crate::config::RegisterType;
use crate::utils::error::DecodeError;

fn words(raw: &[u16], offset: usize, width: usize) -> Result<&[u16], DecodeError> {
    raw.get(offset..offset + width).ok_or(DecodeError::OutOfRange {
        offset,
        width,
        len: raw.len(),
    })
}

pub fn get_u16(raw: &[u16], offset: usize) -> Result<u16, DecodeError> {
    Ok(words(raw, offset, 1)?[0])
}

pub fn get_u32(raw: &[u16], offset: usize) -> Result<u32, DecodeError> {
    let pair = words(raw, offset, 2)?;
    Ok(((pair[1] as u32) << 16) | pair[0] as u32)
}

pub fn get_int32(raw: &[u16], offset: usize) -> Result<i32, DecodeError> {
    get_u32(raw, offset).map(|bits| bits as i32)
}

pub fn get_float(raw: &[u16], offset: usize) -> Result<f32, DecodeError> {
    get_u32(raw, offset).map(f32::from_bits)
}

/// Display string for the register at `offset`.
pub fn decode(raw: &[u16], offset: usize, reg_type: RegisterType) -> Result<String, DecodeError> {
    match reg_type {
        RegisterType::Int16 => get_u16(raw, offset).map(|v| v.to_string()),
        RegisterType::Hex16 => get_u16(raw, offset).map(|v| format!("{:04X}", v)),
        RegisterType::Int32 => get_int32(raw, offset).map(|v| v.to_string()),
        RegisterType::Float => get_float(raw, offset).map(|v| v.to_string()),
    }
}

pub fn encode_u32(bits: u32) -> [u16; 2] {
    [(bits & 0xFFFF) as u16, (bits >> 16) as u16]
}

pub fn encode_int32(value: i32) -> [u16; 2] {
    encode_u32(value as u32)
}

pub fn encode_float(value: f32) -> [u16; 2] {
    encode_u32(value.to_bits())
}

/// Register words as big-endian bytes, the order they travel on the wire.
pub fn words_to_bytes(raw: &[u16]) -> Vec<u8> {
    raw.iter().flat_map(|w| w.to_be_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int16_is_unsigned_decimal() {
        assert_eq!(decode(&[425, 0], 0, RegisterType::Int16).unwrap(), "425");
        assert_eq!(decode(&[0xFFFF], 0, RegisterType::Int16).unwrap(), "65535");
    }

    #[test]
    fn test_hex16_four_uppercase_digits() {
        assert_eq!(decode(&[0x00AB], 0, RegisterType::Hex16).unwrap(), "00AB");
        assert_eq!(decode(&[0, 0xBEEF], 1, RegisterType::Hex16).unwrap(), "BEEF");
    }

    #[test]
    fn test_int32_high_word_second() {
        assert_eq!(decode(&[0x0001, 0x0001], 0, RegisterType::Int32).unwrap(), "65537");
        assert_eq!(decode(&[0xFFFF, 0xFFFF], 0, RegisterType::Int32).unwrap(), "-1");
        assert_eq!(decode(&[0, 0x0000, 0x8000], 1, RegisterType::Int32).unwrap(), "-2147483648");
    }

    #[test]
    fn test_float_golden_values() {
        // 1.5f32 = 0x3FC00000
        assert_eq!(decode(&[0x0000, 0x3FC0], 0, RegisterType::Float).unwrap(), "1.5");
        // 425.0f32 = 0x43D48000
        assert_eq!(decode(&[0x8000, 0x43D4], 0, RegisterType::Float).unwrap(), "425");
        assert_eq!(decode(&[0x0000, 0xBF80], 0, RegisterType::Float).unwrap(), "-1");
    }

    #[test]
    fn test_int32_round_trip() {
        for v in [0u32, 1, 0xFFFF, 0x1_0000, 0x7FFF_FFFF, 0x8000_0000, 0xDEAD_BEEF, u32::MAX] {
            let raw = encode_u32(v);
            assert_eq!(get_u32(&raw, 0).unwrap(), v);
            assert_eq!(get_int32(&raw, 0).unwrap(), v as i32);
        }
        assert_eq!(get_int32(&encode_int32(-123456), 0).unwrap(), -123456);
    }

    #[test]
    fn test_float_round_trip_bit_exact() {
        for f in [0.0f32, -0.0, 1.5, 2.5, -273.15, f32::MIN_POSITIVE, f32::MAX, f32::INFINITY, 1e-40] {
            let raw = encode_float(f);
            assert_eq!(get_float(&raw, 0).unwrap().to_bits(), f.to_bits());
        }
    }

    #[test]
    fn test_short_raw_block_is_out_of_range() {
        assert_eq!(
            decode(&[1], 0, RegisterType::Float),
            Err(DecodeError::OutOfRange { offset: 0, width: 2, len: 1 })
        );
        assert!(decode(&[], 0, RegisterType::Int16).is_err());
    }

    #[test]
    fn test_words_to_bytes_big_endian() {
        assert_eq!(hex::encode(words_to_bytes(&[0x1234, 0x00AB])), "123400ab");
    }
}
