/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
use crate::error::{Error, Result};

/// XOR of every byte, the checksum SUOTA appends to the image.
pub fn xor_checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |crc, &byte| crc ^ byte)
}

/// Parses an integer the way users type register values:
/// `0x`/`0X`/`#` for hex, a leading `0` for octal, decimal otherwise.
/// A leading `-` is rejected.
pub fn parse_number(input: &str) -> Result<u32> {
    let s = input.trim();
    let (digits, radix) = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        (hex, 16)
    } else if let Some(hex) = s.strip_prefix('#') {
        (hex, 16)
    } else if s.len() > 1 && s.starts_with('0') {
        (&s[1..], 8)
    } else {
        (s, 10)
    };

    if digits.is_empty() || digits.starts_with('+') || digits.starts_with('-') {
        return Err(Error::Validation(format!("'{}' is not a number", input)));
    }

    u32::from_str_radix(digits, radix)
        .map_err(|_| Error::Validation(format!("'{}' is not a number", input)))
}

/// Little-endian u16 from the start of `data`, if long enough.
pub fn read_u16_le(data: &[u8]) -> Option<u16> {
    let bytes: [u8; 2] = data.get(0..2)?.try_into().ok()?;
    Some(u16::from_le_bytes(bytes))
}

pub fn read_u32_le(data: &[u8]) -> Option<u32> {
    let bytes: [u8; 4] = data.get(0..4)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xor_checksum_folds_all_bytes() {
        assert_eq!(xor_checksum(&[]), 0);
        assert_eq!(xor_checksum(&[0xAA]), 0xAA);
        assert_eq!(xor_checksum(&[0x01, 0x02, 0x04, 0x08]), 0x0F);
        assert_eq!(xor_checksum(&[0x5A, 0x5A]), 0);
    }

    #[test]
    fn parse_number_follows_prefix_rules() {
        assert_eq!(parse_number("80").unwrap(), 80);
        assert_eq!(parse_number("0x50").unwrap(), 0x50);
        assert_eq!(parse_number("0XfF").unwrap(), 0xFF);
        assert_eq!(parse_number("#10").unwrap(), 16);
        assert_eq!(parse_number("010").unwrap(), 8);
        assert_eq!(parse_number("0").unwrap(), 0);
        assert_eq!(parse_number(" 12 ").unwrap(), 12);
    }

    #[test]
    fn parse_number_rejects_garbage() {
        for bad in ["", "0x", "abc", "12z", "-5", "0x-5", "09"] {
            assert!(matches!(parse_number(bad), Err(Error::Validation(_))), "{bad}");
        }
    }

    #[test]
    fn le_readers_need_enough_bytes() {
        assert_eq!(read_u16_le(&[0xF4, 0x00]), Some(244));
        assert_eq!(read_u16_le(&[0xF4]), None);
        assert_eq!(read_u32_le(&[0x01, 0x00, 0x02, 0x00]), Some(0x0002_0001));
        assert_eq!(read_u32_le(&[0x01, 0x00, 0x02]), None);
    }
}
