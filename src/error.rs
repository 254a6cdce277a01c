/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::fota::status::DeviceError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// A read or write reported as failed by the link.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The remote device lacks a required characteristic or descriptor.
    #[error("Remote device does not support SUOTA (missing {0})")]
    ProtocolNotSupported(Uuid),

    #[error("Device error: {0}")]
    Device(DeviceError),

    /// Caller supplied parameters rejected before touching the link.
    #[error("Invalid parameter: {0}")]
    Validation(String),

    #[error("No response from device within {0:?}")]
    Timeout(Duration),

    #[error("Update aborted")]
    Aborted,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "ble")]
    #[error("BLE error: {0}")]
    Ble(#[from] btleplug::Error),
}

impl Error {
    /// Numeric code in the device error table, when there is one.
    pub fn code(&self) -> Option<u16> {
        match self {
            Error::Device(e) => Some(e.code),
            Error::Transport(_) | Error::Timeout(_) => {
                Some(crate::fota::status::ERROR_COMMUNICATION)
            }
            Error::ProtocolNotSupported(_) => Some(crate::fota::status::ERROR_SUOTA_NOT_FOUND),
            _ => None,
        }
    }
}
