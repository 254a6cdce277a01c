/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
#[cfg(feature = "ble")]
pub mod ble_backend;
#[cfg(feature = "ble")]
pub use ble_backend::{BlePort, find_peripheral};
