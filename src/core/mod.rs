/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
pub mod config;
pub mod device;
pub mod image;
pub mod memory;
pub mod store;
pub mod utilities;
