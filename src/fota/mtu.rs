/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
use log::{debug, info, warn};

pub const DEFAULT_MTU: u16 = 23;
pub const DEFAULT_CHUNK_SIZE: usize = 20;
/// ATT write header: opcode plus handle.
pub const ATT_HEADER_SIZE: u16 = 3;

/// What changed after a new MTU value was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MtuUpdate {
    pub chunk_size_changed: bool,
    /// Read the MTU characteristic once more.
    pub reread: bool,
}

/// Tracks link MTU and the patch-data size advertised by the device, and
/// derives the chunk size from both.
#[derive(Debug, Clone)]
pub struct MtuNegotiator {
    mtu: u16,
    patch_data_size: u16,
    chunk_size: usize,
    request_sent: bool,
    awaiting_response: bool,
    reread_done: bool,
    reread_enabled: bool,
}

impl MtuNegotiator {
    pub fn new(reread_enabled: bool) -> Self {
        MtuNegotiator {
            mtu: DEFAULT_MTU,
            patch_data_size: DEFAULT_CHUNK_SIZE as u16,
            chunk_size: DEFAULT_CHUNK_SIZE,
            request_sent: false,
            awaiting_response: false,
            reread_done: false,
            reread_enabled,
        }
    }

    pub fn mtu(&self) -> u16 {
        self.mtu
    }

    pub fn patch_data_size(&self) -> u16 {
        self.patch_data_size
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn request_sent(&self) -> bool {
        self.request_sent
    }

    pub fn awaiting_response(&self) -> bool {
        self.awaiting_response
    }

    /// Returns true when the chunk size changed.
    pub fn set_patch_data_size(&mut self, size: u16) -> bool {
        if size == 0 {
            warn!("Device reported a patch data size of 0, keeping {}", self.patch_data_size);
            return false;
        }
        debug!("SUOTA patch data size: {}", size);
        self.patch_data_size = size;
        self.update_chunk_size()
    }

    pub fn on_mtu(&mut self, mtu: u16) -> MtuUpdate {
        let old = self.mtu;
        self.awaiting_response = false;
        if mtu <= ATT_HEADER_SIZE {
            warn!("Ignoring MTU {}", mtu);
            return MtuUpdate { chunk_size_changed: false, reread: false };
        }

        self.mtu = mtu;
        info!("MTU: {}", mtu);
        let chunk_size_changed = self.update_chunk_size();

        let mut reread = false;
        if self.request_sent && !self.reread_done && mtu != old {
            self.reread_done = true;
            reread = self.reread_enabled;
            if reread {
                debug!("Reading MTU again after the change");
            }
        }

        MtuUpdate { chunk_size_changed, reread }
    }

    pub fn on_request_failed(&mut self) {
        self.awaiting_response = false;
        warn!("MTU request failed, keeping MTU {}", self.mtu);
    }

    /// MTU to request, at most once, and only while still on the default
    /// MTU and the device could take bigger chunks.
    pub fn take_request(&mut self) -> Option<u16> {
        let wanted = self.patch_data_size.saturating_add(ATT_HEADER_SIZE);
        if self.request_sent || self.mtu != DEFAULT_MTU || self.mtu >= wanted {
            return None;
        }
        info!("Sending MTU request for {}", wanted);
        self.request_sent = true;
        self.awaiting_response = true;
        Some(wanted)
    }

    fn update_chunk_size(&mut self) -> bool {
        let chunk_size = (self.patch_data_size as usize).min((self.mtu - ATT_HEADER_SIZE) as usize);
        let changed = chunk_size != self.chunk_size;
        self.chunk_size = chunk_size;
        debug!("File chunk size set to {}", chunk_size);
        changed
    }
}
