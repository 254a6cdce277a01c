/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
use crate::connection::uuids::*;
use crate::core::utilities::read_u16_le;
use crate::fota::protocol::{Action, SUOTA_END_SIGNAL, UpdateProtocol, Variant};
use crate::fota::session::UpdateSession;
use crate::fota::status::{STATUS_CMP_OK, STATUS_IMG_STARTED};
use log::{debug, info, warn};
use uuid::Uuid;

/// Steps:
/// 0 device information, 1 subscribe, 2 memory device, 3 GPIO map,
/// 4 patch length, 5 transfer, 6 end signal written, 7 end signal acked.
#[derive(Debug, Default)]
pub struct Suota;

impl Suota {
    pub fn new() -> Self {
        Suota
    }

    /// The final chunk of a block was acked and the device reported it received.
    fn next_block(&mut self, session: &mut UpdateSession) {
        if session.last_block_sent {
            session.step = Some(6);
            session.send_end_signal(SUOTA_END_SIGNAL);
        } else if session.patch_length_outdated() {
            self.enter_step(session, 4);
        } else {
            session.step = Some(5);
            session.send_block();
        }
    }

    /// End signal acked and the image verified by the device.
    fn complete(&mut self, session: &mut UpdateSession) {
        session.on_success();
        if session.config.reboot_on_success {
            session.send_reboot_signal();
        } else {
            session.finish();
        }
    }

    fn apply_mtu(&mut self, session: &mut UpdateSession, mtu: u16) {
        let update = session.mtu.on_mtu(mtu);
        if update.chunk_size_changed {
            if matches!(session.step, None | Some(0) | Some(1)) {
                if let Err(e) = session.reslice() {
                    session.on_error(e);
                    return;
                }
                info!("Chunk size: {} bytes", session.image.chunk_size());
            } else {
                warn!(
                    "MTU changed to {} during transfer, keeping chunk size {}",
                    mtu,
                    session.image.chunk_size()
                );
            }
        }
        if update.reread {
            session.queue_read(SUOTA_MTU);
        }
    }
}

impl UpdateProtocol for Suota {
    fn variant(&self) -> Variant {
        Variant::Suota
    }

    fn info_characteristics(&self) -> Vec<Uuid> {
        DEVICE_INFO_CHARACTERISTICS
            .iter()
            .chain(SUOTA_INFO_CHARACTERISTICS)
            .copied()
            .collect()
    }

    fn enter_step(&mut self, session: &mut UpdateSession, step: u8) {
        debug!("SUOTA step {}", step);
        session.step = Some(step);
        match step {
            1 => session.enable_notifications(),
            2 => session.set_mem_dev(),
            3 => {
                if !session.set_gpio_map() {
                    self.enter_step(session, 4);
                }
            }
            4 => session.set_patch_length(),
            5 => session.send_block(),
            _ => warn!("SUOTA has no step {}", step),
        }
    }

    fn on_write_complete(&mut self, session: &mut UpdateSession, uuid: Uuid) {
        match (uuid, session.step) {
            (SPOTA_MEM_DEV, _) if session.reboot_signal_sent => session.finish(),
            (SPOTA_MEM_DEV, Some(2)) => {
                if session.count_rendezvous() {
                    self.enter_step(session, 3);
                }
            }
            (SPOTA_MEM_DEV, Some(6)) if session.end_signal_sent => {
                session.step = Some(7);
                if session.completion_received {
                    self.complete(session);
                }
            }
            (SPOTA_GPIO_MAP, Some(3)) => self.enter_step(session, 4),
            (SPOTA_PATCH_LEN, Some(4)) => self.enter_step(session, 5),
            (SPOTA_PATCH_DATA, Some(5)) => {
                if !session.take_chunk_ack() {
                    debug!("Patch data ack with no write outstanding");
                } else if !session.block_final_sent {
                    session.send_block();
                } else if session.count_block_end() {
                    self.next_block(session);
                }
            }
            _ => debug!("Write ack for {} at step {:?}", uuid, session.step),
        }
    }

    fn on_read_complete(&mut self, session: &mut UpdateSession, uuid: Uuid, _value: &[u8]) {
        debug!("Unexpected read of {} at step {:?}", uuid, session.step);
    }

    fn on_status(&mut self, session: &mut UpdateSession, status: u8) {
        let step = session.step;
        match status {
            STATUS_IMG_STARTED => {
                if session.step == Some(2) {
                    if session.count_rendezvous() {
                        self.enter_step(session, 3);
                    }
                } else {
                    debug!("Image started status at step {:?}", session.step);
                }
            }
            STATUS_CMP_OK => match step {
                Some(5) if session.block_final_sent => {
                    if session.count_block_end() {
                        self.next_block(session);
                    }
                }
                // Completion before the end signal ack; finish once it lands
                Some(6) if session.end_signal_sent => session.completion_received = true,
                Some(7) if !session.finished => self.complete(session),
                _ => warn!("Block status at step {:?} ignored", step),
            },
            code => session.on_device_error(code as u16),
        }
    }

    fn on_info_value(&mut self, session: &mut UpdateSession, uuid: Uuid, value: &[u8]) {
        match uuid {
            SUOTA_PATCH_DATA_CHAR_SIZE => {
                if let Some(size) = read_u16_le(value) {
                    if session.mtu.set_patch_data_size(size) {
                        if let Err(e) = session.reslice() {
                            session.on_error(e);
                        }
                    }
                }
            }
            SUOTA_MTU => {
                if let Some(mtu) = read_u16_le(value) {
                    self.apply_mtu(session, mtu);
                }
            }
            _ => {}
        }
    }

    fn on_info_drained(&mut self, session: &mut UpdateSession) -> bool {
        if session.mtu.awaiting_response() {
            return false;
        }
        match session.mtu.take_request() {
            Some(mtu) => {
                session.push(Action::RequestMtu(mtu));
                false
            }
            None => true,
        }
    }

    fn on_mtu_changed(&mut self, session: &mut UpdateSession, mtu: u16) {
        self.apply_mtu(session, mtu);
    }

    fn on_mtu_failed(&mut self, session: &mut UpdateSession) {
        session.mtu.on_request_failed();
    }
}
