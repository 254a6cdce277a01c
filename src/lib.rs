/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
pub mod connection;
pub mod core;
pub mod error;
pub mod fota;

pub use crate::connection::Connection;
pub use crate::core::config::UpdateConfig;
pub use crate::core::device::{AbortHandle, Device, DeviceInfo, NoHooks, PlatformHooks};
pub use crate::core::image::FirmwareImage;
pub use crate::error::{Error, Result};
pub use crate::fota::{Coordinator, LogSink, ProgressSink, Variant};
