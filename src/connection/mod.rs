/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
pub mod backend;
pub mod port;
pub mod uuids;

use crate::connection::port::{GattEvent, GattPort};
use crate::connection::uuids::{
    CLIENT_CONFIG_DESCRIPTOR, REQUIRED_CHARACTERISTICS, SPOTA_SERV_STATUS, SPOTA_SERVICE,
};
use crate::core::config::DEFAULT_OPERATION_TIMEOUT;
use crate::error::{Error, Result};
use log::{debug, error, info, warn};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

pub const MAX_REFRESH_ATTEMPTS: usize = 10;

/// Owns the one link of a session and the event stream coming out of it.
#[derive(Debug)]
pub struct Connection {
    pub port: Box<dyn GattPort>,
    events: UnboundedReceiver<GattEvent>,
    timeout: Duration,
    closed: bool,
}

impl Connection {
    pub fn new(mut port: Box<dyn GattPort>) -> Result<Self> {
        let events = port
            .take_events()
            .ok_or_else(|| Error::Transport(format!("events of {} already taken", port.id())))?;

        Ok(Connection {
            port,
            events,
            timeout: DEFAULT_OPERATION_TIMEOUT,
            closed: false,
        })
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Swaps in a new link. The previous one is closed first, unless it is
    /// the same device, in which case the new handle is dropped.
    pub async fn replace(&mut self, mut port: Box<dyn GattPort>) -> Result<()> {
        if port.id() == self.port.id() && !self.closed {
            debug!("Link to {} already held", port.id());
            return Ok(());
        }

        let events = port
            .take_events()
            .ok_or_else(|| Error::Transport(format!("events of {} already taken", port.id())))?;
        if let Err(e) = self.close().await {
            // The new link would otherwise be dropped while still open
            if let Err(close_err) = port.close().await {
                warn!("Closing {} failed: {}", port.id(), close_err);
            }
            return Err(e);
        }

        info!("Switching link from {} to {}", self.port.id(), port.id());
        self.port = port;
        self.events = events;
        self.closed = false;
        Ok(())
    }

    /// Refreshes the service cache when the platform can, then checks that
    /// everything the update needs is there. Returns the characteristics
    /// found.
    pub async fn verify(&mut self) -> Result<Vec<Uuid>> {
        for attempt in 1..=MAX_REFRESH_ATTEMPTS {
            match self.port.refresh_cache().await {
                Ok(true) => {
                    debug!("Restart discovery after refresh");
                    self.port.discover_services().await?;
                    break;
                }
                Ok(false) => {
                    debug!("Service cache refresh not supported");
                    break;
                }
                Err(e) => warn!("Service cache refresh attempt {} failed: {}", attempt, e),
            }
        }

        if !self.port.has_service(SPOTA_SERVICE) {
            error!("{} has no SUOTA service", self.port.id());
            return Err(Error::ProtocolNotSupported(SPOTA_SERVICE));
        }

        let characteristics = self.port.characteristics();
        let missing = REQUIRED_CHARACTERISTICS.iter().find(|c| !characteristics.contains(c));
        if let Some(missing) = missing {
            error!("{} lacks characteristic {}", self.port.id(), missing);
            return Err(Error::ProtocolNotSupported(*missing));
        }
        if !self.port.has_descriptor(SPOTA_SERV_STATUS, CLIENT_CONFIG_DESCRIPTOR) {
            error!("{} lacks the status client-config descriptor", self.port.id());
            return Err(Error::ProtocolNotSupported(CLIENT_CONFIG_DESCRIPTOR));
        }

        info!("{} supports SUOTA", self.port.id());
        Ok(characteristics)
    }

    /// Waits for the next event, at most the configured timeout.
    pub async fn next_event(&mut self) -> Result<GattEvent> {
        match tokio::time::timeout(self.timeout, self.events.recv()).await {
            Ok(Some(event)) => Ok(event),
            Ok(None) => Err(Error::Transport("event stream closed".into())),
            Err(_) => Err(Error::Timeout(self.timeout)),
        }
    }

    pub async fn write(&mut self, uuid: Uuid, value: &[u8], with_response: bool) -> Result<()> {
        debug!("Write {} bytes to {}", value.len(), uuid);
        self.port.write_characteristic(uuid, value, with_response).await
    }

    pub async fn read(&mut self, uuid: Uuid) -> Result<()> {
        debug!("Read {}", uuid);
        self.port.read_characteristic(uuid).await
    }

    pub async fn subscribe(&mut self, uuid: Uuid) -> Result<()> {
        self.port.subscribe(uuid).await
    }

    pub async fn request_mtu(&mut self, mtu: u16) -> Result<()> {
        self.port.request_mtu(mtu).await
    }

    /// Disconnects, refreshes the service cache if asked to, and closes.
    pub async fn disconnect(&mut self, refresh_cache: bool) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        if let Err(e) = self.port.disconnect().await {
            warn!("Disconnect from {} failed: {}", self.port.id(), e);
        }
        if refresh_cache {
            match self.port.refresh_cache().await {
                Ok(done) => debug!("Service cache refreshed: {}", done),
                Err(e) => warn!("Service cache refresh failed: {}", e),
            }
        }
        self.close().await
    }

    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        info!("Closing link to {}", self.port.id());
        self.port.close().await
    }
}
