/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
mod coordinator;
pub mod mtu;
pub mod progress;
pub mod protocol;
pub mod session;
pub mod spota;
pub mod status;
pub mod suota;

pub use coordinator::Coordinator;
pub use progress::{LogSink, ProgressSink};
pub use protocol::{Action, Event, UpdateProtocol, Variant};
