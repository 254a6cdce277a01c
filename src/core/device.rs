/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
use crate::connection::Connection;
use crate::connection::port::{GattEvent, GattPort};
use crate::core::config::UpdateConfig;
use crate::core::image::FirmwareImage;
use crate::error::{Error, Result};
use crate::fota::{Action, Coordinator, Event, ProgressSink};
use log::{debug, error, info, warn};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;
use uuid::Uuid;

/// What the device reports about itself before the transfer starts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    pub manufacturer: Option<String>,
    pub model_number: Option<String>,
    pub firmware_revision: Option<String>,
    pub software_revision: Option<String>,
    pub suota_version: Option<u8>,
    pub patch_data_size: Option<u16>,
    pub mtu: Option<u16>,
    pub l2cap_psm: Option<u16>,
}

/// Host platform integration.
pub trait PlatformHooks: Send {
    /// Held from the memory-device write until the update ends.
    fn keep_awake(&mut self, hold: bool) {
        debug!("Keep awake: {}", hold);
    }
}

#[derive(Debug, Default)]
pub struct NoHooks;

impl PlatformHooks for NoHooks {}

/// Cancels a running [`Device::update`] from another task.
#[derive(Clone, Debug, Default)]
pub struct AbortHandle {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl AbortHandle {
    pub fn abort(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

pub struct Device {
    connection: Connection,
    characteristics: Vec<Uuid>,
    hooks: Box<dyn PlatformHooks>,
    info: Option<DeviceInfo>,
    abort: AbortHandle,
}

impl Device {
    /// Takes over a connected link and checks it offers the update service.
    pub async fn init(port: Box<dyn GattPort>) -> Result<Self> {
        let mut connection = Connection::new(port)?;
        let characteristics = match connection.verify().await {
            Ok(found) => found,
            Err(e) => {
                connection.close().await?;
                return Err(e);
            }
        };

        Ok(Device {
            connection,
            characteristics,
            hooks: Box::new(NoHooks),
            info: None,
            abort: AbortHandle::default(),
        })
    }

    pub fn with_hooks(mut self, hooks: Box<dyn PlatformHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Information read during the last update, if it got that far.
    pub fn info(&self) -> Option<&DeviceInfo> {
        self.info.as_ref()
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Switches to another link and verifies it.
    pub async fn reconnect(&mut self, port: Box<dyn GattPort>) -> Result<()> {
        self.connection.replace(port).await?;
        self.characteristics = self.connection.verify().await?;
        Ok(())
    }

    pub async fn close(&mut self) -> Result<()> {
        self.connection.close().await
    }

    /// Runs one update to completion. The link is closed afterwards,
    /// whatever the outcome.
    pub async fn update(
        &mut self,
        image: FirmwareImage,
        config: UpdateConfig,
        sink: &mut dyn ProgressSink,
    ) -> Result<()> {
        if self.connection.is_closed() {
            return Err(Error::Transport("link already closed".into()));
        }
        self.abort.reset();
        self.connection.set_timeout(config.operation_timeout);

        let mut coordinator = Coordinator::new(config, image)?;
        info!("Starting {} update", coordinator.variant());

        let mut pending = VecDeque::from([Event::Start(self.characteristics.clone())]);
        loop {
            let event = match pending.pop_front() {
                Some(event) => event,
                None => self.next_event().await,
            };

            let mut outcome = None;
            for action in coordinator.handle(event) {
                match action {
                    Action::Read(uuid) => {
                        if let Err(e) = self.connection.read(uuid).await {
                            let failed = GattEvent::ReadFailed(uuid, e.to_string());
                            pending.push_back(Event::Gatt(failed));
                        }
                    }
                    Action::Write {
                        uuid,
                        value,
                        with_response,
                    } => {
                        if let Err(e) = self.connection.write(uuid, &value, with_response).await {
                            let failed = GattEvent::WriteFailed(uuid, e.to_string());
                            pending.push_back(Event::Gatt(failed));
                        }
                    }
                    Action::Subscribe(uuid) => {
                        if let Err(e) = self.connection.subscribe(uuid).await {
                            let failed = GattEvent::DescriptorFailed(uuid, e.to_string());
                            pending.push_back(Event::Gatt(failed));
                        }
                    }
                    Action::RequestMtu(mtu) => {
                        if let Err(e) = self.connection.request_mtu(mtu).await {
                            warn!("MTU request failed: {}", e);
                            pending.push_back(Event::Gatt(GattEvent::MtuFailed));
                        }
                    }
                    Action::Progress { percent, chunk, total } => {
                        sink.progress(percent, chunk, total)
                    }
                    Action::Log(line) => sink.log(&line),
                    Action::KeepAwake(hold) => self.hooks.keep_awake(hold),
                    Action::InfoReady(info) => {
                        sink.device_info(&info);
                        self.info = Some(info);
                        pending.push_back(Event::BeginTransfer);
                    }
                    Action::Disconnect { refresh_cache } => {
                        if let Err(e) = self.connection.disconnect(refresh_cache).await {
                            error!("Closing link failed: {}", e);
                        }
                    }
                    Action::Finished => outcome = Some(Ok(())),
                    Action::Failed(e) => outcome = Some(Err(e)),
                }
            }

            if let Some(outcome) = outcome {
                return outcome;
            }
            if coordinator.is_terminal() {
                return Err(Error::Transport("update ended without a result".into()));
            }
        }
    }

    async fn next_event(&mut self) -> Event {
        loop {
            tokio::select! {
                event = self.connection.next_event() => {
                    return match event {
                        Ok(event) => Event::Gatt(event),
                        Err(Error::Timeout(after)) => Event::Timeout(after),
                        Err(e) => {
                            warn!("Event stream failed: {}", e);
                            Event::Gatt(GattEvent::ConnectionState(false))
                        }
                    };
                }
                _ = self.abort.notify.notified() => {
                    if self.abort.is_aborted() {
                        return Event::Abort;
                    }
                }
            }
        }
    }
}
