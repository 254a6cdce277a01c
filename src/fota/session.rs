/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
use crate::connection::uuids::*;
use crate::core::config::UpdateConfig;
use crate::core::device::DeviceInfo;
use crate::core::image::FirmwareImage;
use crate::core::utilities::read_u16_le;
use crate::error::{Error, Result};
use crate::fota::mtu::{DEFAULT_CHUNK_SIZE, MtuNegotiator};
use crate::fota::protocol::{Action, SUOTA_REBOOT_SIGNAL, Variant};
use log::{debug, error, info, warn};
use std::collections::VecDeque;
use std::time::Instant;
use uuid::Uuid;

/// State of one update attempt. Only the coordinator mutates it, one event
/// at a time; every requested side effect is queued as an [`Action`].
#[derive(Debug)]
pub struct UpdateSession {
    pub variant: Variant,
    pub config: UpdateConfig,
    pub image: FirmwareImage,
    pub info: DeviceInfo,
    pub mtu: MtuNegotiator,

    /// None while idle (before step 0 and after device information).
    pub step: Option<u8>,
    pub block_counter: usize,
    /// Chunk last sent within the current block; None at a block boundary.
    pub chunk_counter: Option<usize>,
    /// Memory-device write ack and "started" status, counted at step 2.
    pub rendezvous: u8,
    /// Last value written to the patch-length register.
    pub patch_length: Option<usize>,
    /// A patch-data write is outstanding.
    pub chunk_ack_pending: bool,
    /// The chunk last sent was the final one of its block.
    pub block_final_sent: bool,
    /// Final-chunk ack and "block received" status, counted per block.
    pub block_end: u8,
    /// SUOTA completion status seen before the end-signal ack.
    pub completion_received: bool,

    pub last_block: bool,
    pub last_block_sent: bool,
    pub prepared_for_last_block: bool,
    pub end_signal_sent: bool,
    pub reboot_signal_sent: bool,
    pub finished: bool,
    pub has_error: bool,
    pub refresh_pending: bool,
    /// Disconnect was requested, nothing else will be issued.
    pub closed: bool,
    pub keep_awake: bool,

    pub read_queue: VecDeque<Uuid>,
    pub pending_read: Option<Uuid>,
    available: Vec<Uuid>,
    upload_start: Option<Instant>,
    actions: Vec<Action>,
}

impl UpdateSession {
    pub fn new(config: UpdateConfig, mut image: FirmwareImage) -> Result<Self> {
        config.validate(&image)?;

        let mtu = MtuNegotiator::new(config.mtu_reread_workaround);
        let chunk_size = match config.variant {
            Variant::Suota => mtu.chunk_size(),
            Variant::Spota => DEFAULT_CHUNK_SIZE,
        };
        image.slice(config.block_size, chunk_size)?;

        Ok(UpdateSession {
            variant: config.variant,
            config,
            image,
            info: DeviceInfo::default(),
            mtu,
            step: None,
            block_counter: 0,
            chunk_counter: None,
            rendezvous: 0,
            patch_length: None,
            chunk_ack_pending: false,
            block_final_sent: false,
            block_end: 0,
            completion_received: false,
            last_block: false,
            last_block_sent: false,
            prepared_for_last_block: false,
            end_signal_sent: false,
            reboot_signal_sent: false,
            finished: false,
            has_error: false,
            refresh_pending: false,
            closed: false,
            keep_awake: false,
            read_queue: VecDeque::new(),
            pending_read: None,
            available: Vec::new(),
            upload_start: None,
            actions: Vec::new(),
        })
    }

    pub fn push(&mut self, action: Action) {
        self.actions.push(action);
    }

    pub fn take_actions(&mut self) -> Vec<Action> {
        std::mem::take(&mut self.actions)
    }

    /// A line for the user; also goes to the debug log.
    pub fn log(&mut self, line: impl Into<String>) {
        let line = line.into();
        debug!("{}", line);
        self.actions.push(Action::Log(line));
    }

    pub fn is_terminal(&self) -> bool {
        self.closed || self.has_error
    }

    pub fn has_characteristic(&self, uuid: &Uuid) -> bool {
        self.available.contains(uuid)
    }

    /// Step 0: queue the given characteristics that exist on the link.
    pub fn start_info(&mut self, available: Vec<Uuid>, wanted: &[Uuid]) {
        self.available = available;
        self.step = Some(0);
        self.read_queue = wanted.iter().copied().filter(|u| self.available.contains(u)).collect();
        debug!("Queued {} information reads", self.read_queue.len());
    }

    /// Issues the next queued read. Returns false when the queue is empty.
    pub fn read_next(&mut self) -> bool {
        match self.read_queue.pop_front() {
            Some(uuid) => {
                self.read(uuid);
                true
            }
            None => false,
        }
    }

    pub fn read(&mut self, uuid: Uuid) {
        self.pending_read = Some(uuid);
        self.actions.push(Action::Read(uuid));
    }

    pub fn queue_read(&mut self, uuid: Uuid) {
        if self.has_characteristic(&uuid) {
            self.read_queue.push_back(uuid);
        }
    }

    /// Stores a step 0 value in the device information record.
    pub fn record_info(&mut self, uuid: Uuid, value: &[u8]) {
        let text = || Some(String::from_utf8_lossy(value).trim_end_matches('\0').to_string());
        match uuid {
            MANUFACTURER_NAME => self.info.manufacturer = text(),
            MODEL_NUMBER => self.info.model_number = text(),
            FIRMWARE_REVISION => self.info.firmware_revision = text(),
            SOFTWARE_REVISION => self.info.software_revision = text(),
            SUOTA_VERSION => {
                self.info.suota_version = value.first().copied();
                debug!("SUOTA version: {:?}", self.info.suota_version);
            }
            SUOTA_PATCH_DATA_CHAR_SIZE => self.info.patch_data_size = read_u16_le(value),
            SUOTA_MTU => self.info.mtu = read_u16_le(value),
            SUOTA_L2CAP_PSM => {
                self.info.l2cap_psm = read_u16_le(value);
                debug!("SUOTA L2CAP PSM: {:?}", self.info.l2cap_psm);
            }
            _ => warn!("Unexpected information value from {}", uuid),
        }
    }

    pub fn finish_info(&mut self) {
        self.step = None;
        info!("Device information read");
        self.actions.push(Action::InfoReady(self.info.clone()));
    }

    pub fn reset(&mut self) {
        self.block_counter = 0;
        self.chunk_counter = None;
        self.rendezvous = 0;
        self.patch_length = None;
        self.chunk_ack_pending = false;
        self.block_final_sent = false;
        self.block_end = 0;
        self.completion_received = false;
        self.last_block = false;
        self.last_block_sent = false;
        self.prepared_for_last_block = false;
        self.end_signal_sent = false;
        self.reboot_signal_sent = false;
        self.finished = false;
        self.has_error = false;
        self.refresh_pending = false;
    }

    /// Rebuilds the block table with the configured block size and the
    /// current chunk size.
    pub fn reslice(&mut self) -> Result<()> {
        let chunk_size = match self.variant {
            Variant::Suota => self.mtu.chunk_size(),
            Variant::Spota => DEFAULT_CHUNK_SIZE,
        };
        self.image.slice(self.config.block_size, chunk_size)
    }

    /// Step 1, shared by both variants.
    pub fn enable_notifications(&mut self) {
        self.reset();
        if let Err(e) = self.reslice() {
            self.on_error(e);
            return;
        }
        self.log("Enable SPOTA_SERV_STATUS notifications");
        self.actions.push(Action::Subscribe(SPOTA_SERV_STATUS));
    }

    /// True once the write ack and the start notification were both seen.
    pub fn count_rendezvous(&mut self) -> bool {
        self.rendezvous += 1;
        debug!("Step 2 rendezvous {}/2", self.rendezvous);
        self.rendezvous == 2
    }

    /// Consumes the ack of the outstanding patch-data write. False for an
    /// ack with no write pending.
    pub fn take_chunk_ack(&mut self) -> bool {
        std::mem::replace(&mut self.chunk_ack_pending, false)
    }

    /// True once the final chunk of the block was acked and the device
    /// reported the block as received, in either order.
    pub fn count_block_end(&mut self) -> bool {
        self.block_end += 1;
        debug!("Block {} end {}/2", self.block_counter, self.block_end);
        self.block_end == 2
    }

    pub fn hold_awake(&mut self) {
        if !self.keep_awake {
            self.keep_awake = true;
            self.actions.push(Action::KeepAwake(true));
        }
    }

    pub fn release_awake(&mut self) {
        if self.keep_awake {
            self.keep_awake = false;
            self.actions.push(Action::KeepAwake(false));
        }
    }

    pub fn write_u32(&mut self, uuid: Uuid, value: u32) {
        self.actions.push(Action::Write {
            uuid,
            value: value.to_le_bytes().to_vec(),
            with_response: true,
        });
    }

    pub fn set_mem_dev(&mut self) {
        self.log(format!("Firmware CRC: {:#04x}", self.image.crc()));
        self.log(format!("Upload size: {} bytes", self.image.len()));
        self.log(format!("Chunk size: {} bytes", self.image.chunk_size()));
        self.hold_awake();
        self.upload_start = Some(Instant::now());

        let value = self.config.memory.mem_dev_value(self.variant);
        self.log(format!("Set SPOTA_MEM_DEV: {:#010x}", value));
        self.write_u32(SPOTA_MEM_DEV, value);
    }

    /// Writes the GPIO map. Returns false when the memory has no pins.
    pub fn set_gpio_map(&mut self) -> bool {
        match self.config.memory.target.gpio_map_value() {
            Some(value) => {
                self.log(format!("Set SPOTA_GPIO_MAP: {:#010x}", value));
                self.write_u32(SPOTA_GPIO_MAP, value);
                true
            }
            None => {
                debug!("No GPIO map for {}", self.config.memory.target.name());
                false
            }
        }
    }

    /// Writes the size of the current block.
    pub fn set_patch_length(&mut self) {
        let length = self.image.block_len(self.block_counter).unwrap_or(0);
        if self.last_block || self.image.is_last_block(self.block_counter) {
            self.prepared_for_last_block = true;
        }
        self.patch_length = Some(length);
        debug!("setPatchLength: {} - {:#06x}", length, length);
        self.log(format!("Set SPOTA_PATCH_LENGTH: {}", length));
        self.actions.push(Action::Write {
            uuid: SPOTA_PATCH_LEN,
            value: (length as u16).to_le_bytes().to_vec(),
            with_response: true,
        });
    }

    /// True when the block about to start needs a different patch length.
    pub fn patch_length_outdated(&self) -> bool {
        self.image.block_len(self.block_counter) != self.patch_length
    }

    /// Sends the next chunk of the current block without response.
    pub fn send_block(&mut self) {
        if self.last_block_sent {
            return;
        }

        let block = self.block_counter;
        let index = self.chunk_counter.map_or(0, |c| c + 1);
        let found = (self.image.chunks_in_block(block), self.image.chunk(block, index));
        let (count, chunk) = match found {
            (Some(count), Some(chunk)) => (count, chunk.to_vec()),
            _ => {
                self.on_error(Error::Validation(format!("no chunk {} in block {}", index, block)));
                return;
            }
        };

        if index == 0 {
            self.block_end = 0;
            info!("Current block: {} of {}", block + 1, self.image.number_of_blocks());
        }

        let last_chunk = index + 1 == count;
        self.chunk_counter = if last_chunk { None } else { Some(index) };
        self.chunk_ack_pending = true;
        self.block_final_sent = last_chunk;

        let total = self.image.total_chunks();
        let chunk_number = block * self.image.chunks_per_block() + index + 1;
        if chunk_number == 1 {
            self.refresh_pending = true;
            self.log("Update procedure started");
        }
        self.actions.push(Action::Progress {
            percent: (chunk_number * 100 / total) as u8,
            chunk: chunk_number,
            total,
        });

        debug!(
            "Sending block {}, chunk {} of {}, size {}",
            block + 1,
            index + 1,
            count,
            chunk.len()
        );
        self.actions.push(Action::Write {
            uuid: SPOTA_PATCH_DATA,
            value: chunk,
            with_response: false,
        });

        if last_chunk {
            if self.image.is_last_block(block) {
                self.last_block = true;
                self.last_block_sent = true;
            } else {
                self.block_counter += 1;
                self.last_block = self.image.is_last_block(self.block_counter);
            }
        }
    }

    pub fn send_end_signal(&mut self, value: u32) {
        self.log(format!("Send {} END command", self.variant));
        debug!("sendEndSignal: {:#010x}", value);
        self.write_u32(SPOTA_MEM_DEV, value);
        self.end_signal_sent = true;
    }

    pub fn send_reboot_signal(&mut self) {
        self.log("Send SUOTA REBOOT command");
        self.write_u32(SPOTA_MEM_DEV, SUOTA_REBOOT_SIGNAL);
        self.reboot_signal_sent = true;
    }

    pub fn log_mem_info(&mut self, value: u32) {
        let patches = (value >> 16) & 0xFF;
        let bytes = value & 0xFF;
        self.log(format!(
            "Patch Memory Info: number of patches = {}, size of patches = {} words ({} bytes)",
            patches,
            bytes.div_ceil(4),
            bytes
        ));
    }

    pub fn on_success(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.refresh_pending = true;

        let elapsed = self.upload_start.map_or(0.0, |s| s.elapsed().as_secs_f64());
        self.log("Upload completed");
        self.log(format!("Elapsed time: {:.3} seconds", elapsed));
        info!("Upload completed in {:.3} seconds", elapsed);
        self.release_awake();
    }

    /// Terminal error path. Only the first error is reported.
    pub fn on_error(&mut self, err: Error) {
        if self.has_error || self.closed {
            debug!("Ignoring error after termination: {}", err);
            return;
        }
        self.has_error = true;
        error!("Update failed: {}", err);
        self.log(format!("Error: {}", err));
        self.release_awake();
        self.disconnect();
        self.actions.push(Action::Failed(err));
    }

    pub fn on_device_error(&mut self, code: u16) {
        self.on_error(Error::Device(crate::fota::status::describe(code)));
    }

    pub fn abort(&mut self) {
        if self.is_terminal() {
            return;
        }
        self.has_error = true;
        warn!("Update aborted at step {:?}", self.step);
        self.log("Update aborted");
        self.release_awake();
        self.disconnect();
        self.actions.push(Action::Failed(Error::Aborted));
    }

    /// Disconnects after success, refreshing the service cache.
    pub fn finish(&mut self) {
        if self.closed {
            return;
        }
        self.disconnect();
        self.actions.push(Action::Finished);
    }

    fn disconnect(&mut self) {
        self.closed = true;
        self.step = None;
        self.log("Disconnect from device");
        self.actions.push(Action::Disconnect { refresh_cache: self.refresh_pending });
    }
}
