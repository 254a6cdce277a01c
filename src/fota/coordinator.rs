/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
use crate::connection::port::GattEvent;
use crate::connection::uuids::{DEVICE_INFO_CHARACTERISTICS, SPOTA_SERV_STATUS};
use crate::core::config::UpdateConfig;
use crate::core::image::FirmwareImage;
use crate::error::{Error, Result};
use crate::fota::protocol::{Action, Event, UpdateProtocol, Variant};
use crate::fota::session::UpdateSession;
use crate::fota::spota::Spota;
use crate::fota::suota::Suota;
use log::{debug, warn};

/// Drives one update attempt. Each call to [`Coordinator::handle`] applies
/// one event and returns the side effects to carry out, in order.
pub struct Coordinator {
    session: UpdateSession,
    protocol: Box<dyn UpdateProtocol>,
    started: bool,
}

impl Coordinator {
    pub fn new(config: UpdateConfig, image: FirmwareImage) -> Result<Self> {
        let protocol: Box<dyn UpdateProtocol> = match config.variant {
            Variant::Suota => Box::new(Suota::new()),
            Variant::Spota => Box::new(Spota::new()),
        };
        let session = UpdateSession::new(config, image)?;

        Ok(Coordinator {
            session,
            protocol,
            started: false,
        })
    }

    pub fn variant(&self) -> Variant {
        self.protocol.variant()
    }

    pub fn session(&self) -> &UpdateSession {
        &self.session
    }

    pub fn is_terminal(&self) -> bool {
        self.session.is_terminal()
    }

    pub fn handle(&mut self, event: Event) -> Vec<Action> {
        if self.session.is_terminal() {
            debug!("Ignoring {:?} after termination", event);
            return Vec::new();
        }

        match event {
            Event::Start(characteristics) => {
                if self.started {
                    warn!("Update already started");
                } else {
                    self.started = true;
                    let wanted = self.protocol.info_characteristics();
                    self.session.start_info(characteristics, &wanted);
                    self.advance_info();
                }
            }
            Event::BeginTransfer => {
                if self.started && self.session.step.is_none() {
                    self.protocol.enter_step(&mut self.session, 1);
                } else {
                    warn!("Cannot begin transfer at step {:?}", self.session.step);
                }
            }
            Event::Gatt(event) => self.on_gatt(event),
            Event::Timeout(after) => {
                if self.session.reboot_signal_sent {
                    debug!("No answer to reboot signal, device is rebooting");
                    self.session.finish();
                } else {
                    self.session.on_error(Error::Timeout(after));
                }
            }
            Event::Abort => self.session.abort(),
        }

        self.session.take_actions()
    }

    fn on_gatt(&mut self, event: GattEvent) {
        let session = &mut self.session;
        match event {
            GattEvent::ConnectionState(true) => debug!("Link connected"),
            GattEvent::ConnectionState(false) => {
                if session.reboot_signal_sent || session.finished {
                    session.finish();
                } else {
                    session.on_error(Error::Transport("link lost".into()));
                }
            }
            GattEvent::MtuChanged(mtu) => {
                self.protocol.on_mtu_changed(session, mtu);
                self.resume_info();
            }
            GattEvent::MtuFailed => {
                self.protocol.on_mtu_failed(session);
                self.resume_info();
            }
            GattEvent::WriteComplete(uuid) => self.protocol.on_write_complete(session, uuid),
            GattEvent::WriteFailed(uuid, reason) => {
                // The device may reboot before acknowledging
                if session.reboot_signal_sent {
                    warn!("Reboot signal write failed: {}", reason);
                    session.finish();
                } else {
                    let reason = format!("write to {} failed: {}", uuid, reason);
                    session.on_error(Error::Transport(reason));
                }
            }
            GattEvent::ReadComplete(uuid, value) => {
                if session.pending_read != Some(uuid) {
                    warn!("Unexpected read result from {}", uuid);
                    return;
                }
                session.pending_read = None;
                if session.step == Some(0) {
                    session.record_info(uuid, &value);
                    self.protocol.on_info_value(session, uuid, &value);
                    self.advance_info();
                } else {
                    self.protocol.on_read_complete(session, uuid, &value);
                }
            }
            GattEvent::ReadFailed(uuid, reason) => {
                if session.pending_read == Some(uuid) {
                    session.pending_read = None;
                }
                if session.step == Some(0) && DEVICE_INFO_CHARACTERISTICS.contains(&uuid) {
                    warn!("Reading {} failed, skipping: {}", uuid, reason);
                    self.advance_info();
                } else {
                    let reason = format!("read of {} failed: {}", uuid, reason);
                    session.on_error(Error::Transport(reason));
                }
            }
            GattEvent::DescriptorWritten(uuid) => {
                if uuid == SPOTA_SERV_STATUS && session.step == Some(1) {
                    self.protocol.enter_step(session, 2);
                } else {
                    debug!("Descriptor of {} written at step {:?}", uuid, session.step);
                }
            }
            GattEvent::DescriptorFailed(uuid, reason) => {
                let reason = format!("enabling notifications on {} failed: {}", uuid, reason);
                session.on_error(Error::Transport(reason));
            }
            GattEvent::Notification(uuid, value) => {
                if uuid != SPOTA_SERV_STATUS {
                    debug!("Notification from {} ignored", uuid);
                    return;
                }
                match value.first() {
                    Some(&status) => {
                        debug!("SPOTA_SERV_STATUS notification: {:#04x}", status);
                        self.protocol.on_status(session, status);
                    }
                    None => warn!("Empty status notification"),
                }
            }
        }
    }

    /// Continues step 0 after an MTU event, unless a read is outstanding.
    fn resume_info(&mut self) {
        if self.session.step == Some(0) && self.session.pending_read.is_none() {
            self.advance_info();
        }
    }

    fn advance_info(&mut self) {
        if self.session.is_terminal() || self.session.step != Some(0) {
            return;
        }
        if self.session.read_next() {
            return;
        }
        if self.protocol.on_info_drained(&mut self.session) {
            self.session.finish_info();
        }
    }
}
