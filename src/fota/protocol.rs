/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
use crate::connection::port::GattEvent;
use crate::core::device::DeviceInfo;
use crate::error::Error;
use crate::fota::session::UpdateSession;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

pub const SUOTA_END_SIGNAL: u32 = 0xFE00_0000;
pub const SUOTA_REBOOT_SIGNAL: u32 = 0xFD00_0000;
pub const SPOTA_END_SIGNAL: u32 = 0xFF00_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    /// Multi-bank update with MTU negotiation.
    Suota,
    /// Legacy single-bank patch.
    Spota,
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Suota => write!(f, "SUOTA"),
            Variant::Spota => write!(f, "SPOTA"),
        }
    }
}

/// Input to the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Link is up and verified. Carries the characteristics found on it.
    Start(Vec<Uuid>),
    /// Device information is in, start writing.
    BeginTransfer,
    Gatt(GattEvent),
    /// Nothing arrived from the link in time.
    Timeout(Duration),
    Abort,
}

/// Side effect requested by the coordinator. The runner executes them in
/// order; transport operations complete later as [`Event::Gatt`].
#[derive(Debug)]
pub enum Action {
    Read(Uuid),
    Write {
        uuid: Uuid,
        value: Vec<u8>,
        with_response: bool,
    },
    /// Enable notifications through the client-config descriptor.
    Subscribe(Uuid),
    RequestMtu(u16),
    Progress {
        percent: u8,
        chunk: usize,
        total: usize,
    },
    Log(String),
    KeepAwake(bool),
    InfoReady(DeviceInfo),
    Disconnect {
        refresh_cache: bool,
    },
    Finished,
    Failed(Error),
}

/// Per-variant step handling. Shared state and operations live in
/// [`UpdateSession`]; implementors decide what each event means at the
/// current step.
pub trait UpdateProtocol: Send {
    fn variant(&self) -> Variant;

    /// Characteristics read during step 0, in order, when present.
    fn info_characteristics(&self) -> Vec<Uuid>;

    fn enter_step(&mut self, session: &mut UpdateSession, step: u8);

    fn on_write_complete(&mut self, session: &mut UpdateSession, uuid: Uuid);

    /// Reads outside of step 0.
    fn on_read_complete(&mut self, session: &mut UpdateSession, uuid: Uuid, value: &[u8]);

    /// A value on the status characteristic.
    fn on_status(&mut self, session: &mut UpdateSession, status: u8);

    /// Step 0 value, after it was recorded in the session's device info.
    fn on_info_value(&mut self, _session: &mut UpdateSession, _uuid: Uuid, _value: &[u8]) {}

    /// Read queue is empty. Returns false while more step 0 work is pending.
    fn on_info_drained(&mut self, _session: &mut UpdateSession) -> bool {
        true
    }

    fn on_mtu_changed(&mut self, _session: &mut UpdateSession, mtu: u16) {
        log::debug!("MTU changed to {}, not used by {}", mtu, self.variant());
    }

    fn on_mtu_failed(&mut self, _session: &mut UpdateSession) {}
}
