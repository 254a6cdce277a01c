/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
use crate::connection::uuids::*;
use crate::core::utilities::read_u32_le;
use crate::error::Error;
use crate::fota::protocol::{SPOTA_END_SIGNAL, UpdateProtocol, Variant};
use crate::fota::session::UpdateSession;
use crate::fota::status::{
    STATUS_CMP_OK, STATUS_IMG_STARTED, STATUS_SPOTA_SERVICE_EXIT, STATUS_SPOTA_SERVICE_STARTED,
};
use log::{debug, warn};
use uuid::Uuid;

/// Steps:
/// 0 device information, 1 subscribe, 2 memory device, 3 GPIO map,
/// 4 read memory info, 5 memory info received, 6 patch length,
/// 7 transfer, 8 read memory info again, 9 end signal, 10 done.
#[derive(Debug, Default)]
pub struct Spota;

impl Spota {
    pub fn new() -> Self {
        Spota
    }
}

impl UpdateProtocol for Spota {
    fn variant(&self) -> Variant {
        Variant::Spota
    }

    fn info_characteristics(&self) -> Vec<Uuid> {
        DEVICE_INFO_CHARACTERISTICS.to_vec()
    }

    fn enter_step(&mut self, session: &mut UpdateSession, step: u8) {
        debug!("SPOTA step {}", step);
        session.step = Some(step);
        match step {
            1 => session.enable_notifications(),
            2 => session.set_mem_dev(),
            3 => {
                if !session.set_gpio_map() {
                    self.enter_step(session, 4);
                }
            }
            4 | 8 => session.read(SPOTA_MEM_INFO),
            6 => {
                if session.last_block_sent {
                    self.enter_step(session, 8);
                } else {
                    session.set_patch_length();
                }
            }
            7 => session.send_block(),
            9 => session.send_end_signal(SPOTA_END_SIGNAL),
            10 => {
                if !session.finished {
                    session.on_success();
                    session.finish();
                }
            }
            _ => warn!("SPOTA has no step {}", step),
        }
    }

    fn on_write_complete(&mut self, session: &mut UpdateSession, uuid: Uuid) {
        match (uuid, session.step) {
            (SPOTA_MEM_DEV, Some(2)) => {
                if session.count_rendezvous() {
                    self.enter_step(session, 3);
                }
            }
            (SPOTA_GPIO_MAP, Some(3)) => self.enter_step(session, 4),
            (SPOTA_PATCH_LEN, Some(6)) => self.enter_step(session, 7),
            (SPOTA_PATCH_DATA, Some(7)) => {
                if !session.take_chunk_ack() {
                    debug!("Patch data ack with no write outstanding");
                } else if !session.block_final_sent {
                    session.send_block();
                } else if session.count_block_end() {
                    self.enter_step(session, 8);
                }
            }
            _ => debug!("Write ack for {} at step {:?}", uuid, session.step),
        }
    }

    fn on_read_complete(&mut self, session: &mut UpdateSession, uuid: Uuid, value: &[u8]) {
        if uuid != SPOTA_MEM_INFO || !matches!(session.step, Some(4) | Some(8)) {
            debug!("Unexpected read of {} at step {:?}", uuid, session.step);
            return;
        }
        let Some(mem_info) = read_u32_le(value) else {
            let reason = format!("memory info is {} bytes long", value.len());
            session.on_error(Error::Transport(reason));
            return;
        };

        session.step = Some(5);
        debug!("mem info: {:#010x}", mem_info);
        if session.last_block_sent {
            session.log_mem_info(mem_info);
            self.enter_step(session, 9);
        } else {
            if mem_info != 0 {
                warn!("Memory already holds patches: {:#010x}", mem_info);
                session.log_mem_info(mem_info);
            }
            self.enter_step(session, 6);
        }
    }

    fn on_status(&mut self, session: &mut UpdateSession, status: u8) {
        let step = session.step;
        match (step, status) {
            (Some(2), STATUS_SPOTA_SERVICE_STARTED) => {
                session.log(format!("SPOTA_SERV_STATUS: {:#04x}", status));
                if session.count_rendezvous() {
                    self.enter_step(session, 3);
                }
            }
            (Some(9), STATUS_SPOTA_SERVICE_EXIT) => {
                session.log(format!("SPOTA_SERV_STATUS: {:#04x}", status));
                self.enter_step(session, 10);
            }
            // Service status at a step that expects the other one
            (Some(2) | Some(9), STATUS_SPOTA_SERVICE_STARTED | STATUS_SPOTA_SERVICE_EXIT) => {
                session.on_device_error(0)
            }
            (_, STATUS_SPOTA_SERVICE_STARTED | STATUS_SPOTA_SERVICE_EXIT) => {
                debug!("Service status {:#04x} at step {:?} ignored", status, step)
            }
            (Some(7), STATUS_CMP_OK) if session.last_block_sent && session.block_final_sent => {
                if session.count_block_end() {
                    self.enter_step(session, 8);
                }
            }
            (_, STATUS_CMP_OK) | (_, STATUS_IMG_STARTED) => {
                debug!("Status {:#04x} at step {:?} ignored", status, step)
            }
            (_, code) => session.on_device_error(code as u16),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::connection::port::GattEvent;
    use crate::connection::uuids::*;
    use crate::core::config::UpdateConfig;
    use crate::core::image::FirmwareImage;
    use crate::core::memory::{MemorySettings, MemoryTarget};
    use crate::error::Error;
    use crate::fota::protocol::{Action, Event, SPOTA_END_SIGNAL, Variant};
    use crate::fota::Coordinator;
    use uuid::Uuid;

    fn gatt(c: &mut Coordinator, event: GattEvent) -> Vec<Action> {
        c.handle(Event::Gatt(event))
    }

    fn status(c: &mut Coordinator, value: u8) -> Vec<Action> {
        gatt(c, GattEvent::Notification(SPOTA_SERV_STATUS, vec![value]))
    }

    fn writes(actions: &[Action]) -> Vec<(Uuid, Vec<u8>)> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Write { uuid, value, .. } => Some((*uuid, value.clone())),
                _ => None,
            })
            .collect()
    }

    fn reads(actions: &[Action]) -> Vec<Uuid> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Read(uuid) => Some(*uuid),
                _ => None,
            })
            .collect()
    }

    fn retention_ram() -> UpdateConfig {
        UpdateConfig {
            memory: MemorySettings {
                target: MemoryTarget::RetentionRam,
                image_bank: 0,
                patch_base_address: 0,
            },
            ..UpdateConfig::spota()
        }
    }

    fn started(config: UpdateConfig, data: Vec<u8>) -> Coordinator {
        let image = FirmwareImage::new(data, Variant::Spota).unwrap();
        let mut c = Coordinator::new(config, image).unwrap();
        c.handle(Event::Start(REQUIRED_CHARACTERISTICS.to_vec()));
        c.handle(Event::BeginTransfer);
        gatt(&mut c, GattEvent::DescriptorWritten(SPOTA_SERV_STATUS));
        c
    }

    #[test]
    fn hundred_byte_patch_end_to_end() {
        let data: Vec<u8> = (0..100).map(|i| i as u8 ^ 0x5A).collect();
        let mut c = started(retention_ram(), data.clone());
        assert_eq!(c.session().step, Some(2));

        // Status before the ack this time
        let actions = status(&mut c, 0x01);
        assert!(reads(&actions).is_empty());
        let actions = gatt(&mut c, GattEvent::WriteComplete(SPOTA_MEM_DEV));
        assert_eq!(reads(&actions), vec![SPOTA_MEM_INFO]);
        assert_eq!(c.session().step, Some(4));

        let actions = gatt(&mut c, GattEvent::ReadComplete(SPOTA_MEM_INFO, vec![0, 0, 0, 0]));
        assert_eq!(writes(&actions), vec![(SPOTA_PATCH_LEN, 100u16.to_le_bytes().to_vec())]);

        let mut sent = Vec::new();
        let mut actions = gatt(&mut c, GattEvent::WriteComplete(SPOTA_PATCH_LEN));
        while let [(uuid, chunk)] = writes(&actions).as_slice() {
            assert_eq!(*uuid, SPOTA_PATCH_DATA);
            sent.extend_from_slice(chunk);
            actions = gatt(&mut c, GattEvent::WriteComplete(SPOTA_PATCH_DATA));
        }
        assert_eq!(sent, data);
        assert!(c.session().last_block_sent);

        let actions = status(&mut c, 0x02);
        assert_eq!(reads(&actions), vec![SPOTA_MEM_INFO]);

        let actions = gatt(&mut c, GattEvent::ReadComplete(SPOTA_MEM_INFO, vec![100, 0, 1, 0]));
        let logged = |l: &String| l.contains("number of patches = 1") && l.contains("25 words");
        assert!(actions.iter().any(|a| matches!(a, Action::Log(l) if logged(l))));
        let end_signal = SPOTA_END_SIGNAL.to_le_bytes().to_vec();
        assert_eq!(writes(&actions), vec![(SPOTA_MEM_DEV, end_signal)]);

        // End signal ack changes nothing, the exit status finishes
        assert!(gatt(&mut c, GattEvent::WriteComplete(SPOTA_MEM_DEV)).is_empty());
        let actions = status(&mut c, 0x03);
        assert!(actions.iter().any(|a| matches!(a, Action::Disconnect { refresh_cache: true })));
        assert!(matches!(actions.last(), Some(Action::Finished)));
        assert!(c.session().finished);
    }

    #[test]
    fn external_memory_gets_gpio_map_and_base_address() {
        let config = UpdateConfig {
            memory: MemorySettings {
                target: MemoryTarget::DEFAULT_I2C,
                image_bank: 0,
                patch_base_address: 0x12_3456,
            },
            ..UpdateConfig::spota()
        };
        let image = FirmwareImage::new(vec![1; 40], Variant::Spota).unwrap();
        let mut c = Coordinator::new(config, image).unwrap();
        c.handle(Event::Start(Vec::new()));
        c.handle(Event::BeginTransfer);
        let actions = gatt(&mut c, GattEvent::DescriptorWritten(SPOTA_SERV_STATUS));
        assert_eq!(writes(&actions), vec![(SPOTA_MEM_DEV, 0x0212_3456u32.to_le_bytes().to_vec())]);

        gatt(&mut c, GattEvent::WriteComplete(SPOTA_MEM_DEV));
        let actions = status(&mut c, 0x01);
        assert_eq!(writes(&actions), vec![(SPOTA_GPIO_MAP, 0x0050_0203u32.to_le_bytes().to_vec())]);

        let actions = gatt(&mut c, GattEvent::WriteComplete(SPOTA_GPIO_MAP));
        assert_eq!(reads(&actions), vec![SPOTA_MEM_INFO]);
    }

    #[test]
    fn wrong_service_status_is_an_error() {
        let mut c = started(retention_ram(), vec![7; 10]);
        let actions = status(&mut c, 0x03);
        match actions.last() {
            Some(Action::Failed(Error::Device(e))) => {
                assert_eq!(e.code, 0);
                assert_eq!(e.message, crate::fota::status::UNKNOWN_ERROR_MESSAGE);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn device_error_stops_transfer() {
        let mut c = started(retention_ram(), vec![7; 100]);
        gatt(&mut c, GattEvent::WriteComplete(SPOTA_MEM_DEV));
        status(&mut c, 0x01);
        gatt(&mut c, GattEvent::ReadComplete(SPOTA_MEM_INFO, vec![0; 4]));
        gatt(&mut c, GattEvent::WriteComplete(SPOTA_PATCH_LEN));

        let actions = status(&mut c, 0x07);
        assert!(matches!(actions.last(), Some(Action::Failed(Error::Device(e))) if e.code == 0x07));
        assert!(gatt(&mut c, GattEvent::WriteComplete(SPOTA_PATCH_DATA)).is_empty());
    }

    #[test]
    fn failed_memory_info_read_is_fatal() {
        let mut c = started(retention_ram(), vec![7; 10]);
        gatt(&mut c, GattEvent::WriteComplete(SPOTA_MEM_DEV));
        status(&mut c, 0x01);
        let failed = GattEvent::ReadFailed(SPOTA_MEM_INFO, "read not permitted".into());
        let actions = gatt(&mut c, failed);
        assert!(matches!(actions.last(), Some(Action::Failed(Error::Transport(_)))));
    }

    #[test]
    fn patch_status_before_final_chunk_ack_waits_for_the_ack() {
        let mut c = started(retention_ram(), vec![7; 100]);
        gatt(&mut c, GattEvent::WriteComplete(SPOTA_MEM_DEV));
        status(&mut c, 0x01);
        gatt(&mut c, GattEvent::ReadComplete(SPOTA_MEM_INFO, vec![0; 4]));

        let mut actions = gatt(&mut c, GattEvent::WriteComplete(SPOTA_PATCH_LEN));
        while !c.session().last_block_sent {
            assert_eq!(writes(&actions).len(), 1);
            actions = gatt(&mut c, GattEvent::WriteComplete(SPOTA_PATCH_DATA));
        }
        assert_eq!(writes(&actions).len(), 1);

        let actions = status(&mut c, 0x02);
        assert!(reads(&actions).is_empty());
        assert_eq!(c.session().step, Some(7));

        let actions = gatt(&mut c, GattEvent::WriteComplete(SPOTA_PATCH_DATA));
        assert_eq!(reads(&actions), vec![SPOTA_MEM_INFO]);
        assert_eq!(c.session().step, Some(8));

        // A stray ack afterwards is ignored
        assert!(gatt(&mut c, GattEvent::WriteComplete(SPOTA_PATCH_DATA)).is_empty());
    }

    #[test]
    fn mtu_events_do_not_change_chunking() {
        let mut c = started(retention_ram(), vec![7; 100]);
        gatt(&mut c, GattEvent::MtuChanged(247));
        assert_eq!(c.session().image.chunk_size(), 20);
        assert_eq!(c.session().image.total_chunks(), 5);
    }
}
