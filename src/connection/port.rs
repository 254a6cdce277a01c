/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
use crate::error::Result;
use std::fmt::Debug;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

/// Completion or unsolicited event from the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GattEvent {
    ConnectionState(bool),
    MtuChanged(u16),
    MtuFailed,
    WriteComplete(Uuid),
    WriteFailed(Uuid, String),
    ReadComplete(Uuid, Vec<u8>),
    ReadFailed(Uuid, String),
    /// Client-config descriptor of the given characteristic written.
    DescriptorWritten(Uuid),
    DescriptorFailed(Uuid, String),
    Notification(Uuid, Vec<u8>),
}

/// A connected GATT link to the update service.
///
/// Operations only start the transfer: completion is delivered later as a
/// [`GattEvent`] on the receiver from [`GattPort::take_events`]. At most
/// one operation is outstanding at a time. An `Err` means the operation
/// could not be started at all.
#[async_trait::async_trait]
pub trait GattPort: Send + Debug {
    async fn write_characteristic(
        &mut self,
        uuid: Uuid,
        value: &[u8],
        with_response: bool,
    ) -> Result<()>;
    async fn read_characteristic(&mut self, uuid: Uuid) -> Result<()>;
    /// Enables notifications on `uuid` through its client-config descriptor.
    async fn subscribe(&mut self, uuid: Uuid) -> Result<()>;
    async fn request_mtu(&mut self, mtu: u16) -> Result<()>;

    async fn disconnect(&mut self) -> Result<()>;
    /// Releases the handle. Called once per link.
    async fn close(&mut self) -> Result<()>;

    async fn discover_services(&mut self) -> Result<()> {
        Ok(())
    }

    /// Drops the platform's cached service table.
    /// `Ok(false)` means the platform has no such capability.
    async fn refresh_cache(&mut self) -> Result<bool> {
        Ok(false)
    }

    fn has_service(&self, service: Uuid) -> bool;
    /// Characteristics of every discovered service.
    fn characteristics(&self) -> Vec<Uuid>;
    fn has_descriptor(&self, characteristic: Uuid, descriptor: Uuid) -> bool;

    /// Event receiver. Handed out once.
    fn take_events(&mut self) -> Option<UnboundedReceiver<GattEvent>>;

    /// Identifies the remote device, e.g. its address.
    fn id(&self) -> String;
}
