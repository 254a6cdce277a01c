/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
use std::fmt;

// Values sent on the status characteristic that are not errors
pub const STATUS_SPOTA_SERVICE_STARTED: u8 = 0x01;
pub const STATUS_CMP_OK: u8 = 0x02;
pub const STATUS_SPOTA_SERVICE_EXIT: u8 = 0x03;
pub const STATUS_IMG_STARTED: u8 = 0x10;

// Local codes, kept above 0xFF so they never collide with device codes
pub const ERROR_COMMUNICATION: u16 = 0xFFFF;
pub const ERROR_SUOTA_NOT_FOUND: u16 = 0xFFFE;

pub const UNKNOWN_ERROR_MESSAGE: &str = "Unknown device error.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceError {
    pub code: u16,
    pub message: &'static str,
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {:#04x})", self.message, self.code)
    }
}

impl std::error::Error for DeviceError {}

/// Maps a device or local error code to its message.
/// Codes missing from the table get [`UNKNOWN_ERROR_MESSAGE`].
pub fn describe(code: u16) -> DeviceError {
    let message = match code {
        0x01 => "SPOTA service started instead of SUOTA.",
        0x03 => "Forced exit of SPOTA service.",
        0x04 => "Patch Data CRC mismatch.",
        0x05 => "Received patch Length not equal to PATCH_LEN characteristic value.",
        0x06 => "External Memory Error. Writing to external device failed.",
        0x07 => "Internal Memory Error. Not enough internal memory space for patch.",
        0x08 => "Invalid memory device.",
        0x09 => "Application error.",

        // SUOTA specific
        0x11 => "Invalid image bank.",
        0x12 => "Invalid image header.",
        0x13 => "Invalid image size.",
        0x14 => "Invalid product header.",
        0x15 => "Same Image Error.",
        0x16 => "Failed to read from external memory device.",

        ERROR_COMMUNICATION => "Communication error.",
        ERROR_SUOTA_NOT_FOUND => "The remote device does not support SUOTA.",
        _ => UNKNOWN_ERROR_MESSAGE,
    };
    DeviceError { code, message }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_have_their_own_message() {
        assert_eq!(describe(0x04).message, "Patch Data CRC mismatch.");
        assert_eq!(describe(0x15).message, "Same Image Error.");
        assert_eq!(
            describe(ERROR_SUOTA_NOT_FOUND).message,
            "The remote device does not support SUOTA."
        );
        for code in [0x01, 0x03, 0x05, 0x06, 0x07, 0x08, 0x09, 0x11, 0x12, 0x13, 0x14, 0x16] {
            assert_ne!(describe(code).message, UNKNOWN_ERROR_MESSAGE, "code {code:#x}");
        }
    }

    #[test]
    fn unmapped_code_falls_back() {
        let err = describe(0x42);
        assert_eq!(err.code, 0x42);
        assert_eq!(err.message, UNKNOWN_ERROR_MESSAGE);
        assert_eq!(describe(0).message, UNKNOWN_ERROR_MESSAGE);
    }

    #[test]
    fn local_codes_are_outside_device_range() {
        assert!(ERROR_COMMUNICATION > 0xFF);
        assert!(ERROR_SUOTA_NOT_FOUND > 0xFF);
    }
}
