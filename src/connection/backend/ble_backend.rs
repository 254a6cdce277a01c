/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
use crate::connection::port::{GattEvent, GattPort};
use crate::connection::uuids::SPOTA_SERVICE;
use crate::error::{Error, Result};
use btleplug::api::{Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Manager, Peripheral};
use futures::stream::StreamExt;
use log::{debug, info, warn};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Scans on the first adapter until a device advertising `name` shows up.
pub async fn find_peripheral(name: &str, scan_time: Duration) -> Result<Peripheral> {
    let manager = Manager::new().await?;
    let central = manager
        .adapters()
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| Error::Transport("no Bluetooth adapter found".into()))?;
    info!("Using adapter {}", central.adapter_info().await?);

    central.start_scan(ScanFilter::default()).await?;
    let deadline = tokio::time::Instant::now() + scan_time;
    let found = loop {
        for peripheral in central.peripherals().await? {
            let local_name = peripheral.properties().await?.and_then(|p| p.local_name);
            if local_name.as_deref() == Some(name) {
                break Some(peripheral);
            }
        }
        if tokio::time::Instant::now() >= deadline {
            break None;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    };
    central.stop_scan().await?;

    found.ok_or_else(|| Error::Transport(format!("no device named '{}' found", name)))
}

/// [`GattPort`] over btleplug. Completions are reported on the event
/// channel as soon as btleplug returns; notifications are forwarded by a
/// background task.
#[derive(Debug)]
pub struct BlePort {
    peripheral: Peripheral,
    services: Vec<Uuid>,
    characteristics: Vec<Characteristic>,
    events_tx: UnboundedSender<GattEvent>,
    events_rx: Option<UnboundedReceiver<GattEvent>>,
    notifications: Option<JoinHandle<()>>,
}

impl BlePort {
    pub async fn connect(peripheral: Peripheral) -> Result<Self> {
        if !peripheral.is_connected().await? {
            info!("Connecting to {:?}...", peripheral.id());
            peripheral.connect().await?;
        }
        peripheral.discover_services().await?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut port = BlePort {
            peripheral,
            services: Vec::new(),
            characteristics: Vec::new(),
            events_tx,
            events_rx: Some(events_rx),
            notifications: None,
        };
        port.load_services();

        let mut stream = port.peripheral.notifications().await?;
        let tx = port.events_tx.clone();
        port.notifications = Some(tokio::spawn(async move {
            while let Some(notification) = stream.next().await {
                let event = GattEvent::Notification(notification.uuid, notification.value);
                if tx.send(event).is_err() {
                    break;
                }
            }
            debug!("Notification stream ended");
        }));

        let _ = port.events_tx.send(GattEvent::ConnectionState(true));
        Ok(port)
    }

    fn load_services(&mut self) {
        let services = self.peripheral.services();
        self.services = services.iter().map(|s| s.uuid).collect();
        self.characteristics = services.into_iter().flat_map(|s| s.characteristics).collect();
        debug!(
            "{} services, {} characteristics, SUOTA service present: {}",
            self.services.len(),
            self.characteristics.len(),
            self.services.contains(&SPOTA_SERVICE)
        );
    }

    fn characteristic(&self, uuid: Uuid) -> Result<Characteristic> {
        self.characteristics
            .iter()
            .find(|c| c.uuid == uuid)
            .cloned()
            .ok_or(Error::ProtocolNotSupported(uuid))
    }

    fn emit(&self, event: GattEvent) {
        if self.events_tx.send(event).is_err() {
            debug!("Event receiver dropped");
        }
    }
}

#[async_trait::async_trait]
impl GattPort for BlePort {
    async fn write_characteristic(
        &mut self,
        uuid: Uuid,
        value: &[u8],
        with_response: bool,
    ) -> Result<()> {
        let characteristic = self.characteristic(uuid)?;
        let write_type = if with_response {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };
        match self.peripheral.write(&characteristic, value, write_type).await {
            Ok(()) => self.emit(GattEvent::WriteComplete(uuid)),
            Err(e) => self.emit(GattEvent::WriteFailed(uuid, e.to_string())),
        }
        Ok(())
    }

    async fn read_characteristic(&mut self, uuid: Uuid) -> Result<()> {
        let characteristic = self.characteristic(uuid)?;
        match self.peripheral.read(&characteristic).await {
            Ok(value) => self.emit(GattEvent::ReadComplete(uuid, value)),
            Err(e) => self.emit(GattEvent::ReadFailed(uuid, e.to_string())),
        }
        Ok(())
    }

    async fn subscribe(&mut self, uuid: Uuid) -> Result<()> {
        let characteristic = self.characteristic(uuid)?;
        match self.peripheral.subscribe(&characteristic).await {
            Ok(()) => self.emit(GattEvent::DescriptorWritten(uuid)),
            Err(e) => self.emit(GattEvent::DescriptorFailed(uuid, e.to_string())),
        }
        Ok(())
    }

    async fn request_mtu(&mut self, mtu: u16) -> Result<()> {
        // btleplug negotiates the MTU itself and exposes no request
        warn!("MTU request for {} not supported by this backend", mtu);
        self.emit(GattEvent::MtuFailed);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if self.peripheral.is_connected().await? {
            self.peripheral.disconnect().await?;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(task) = self.notifications.take() {
            task.abort();
        }
        Ok(())
    }

    async fn discover_services(&mut self) -> Result<()> {
        self.peripheral.discover_services().await?;
        self.load_services();
        Ok(())
    }

    fn has_service(&self, service: Uuid) -> bool {
        self.services.contains(&service)
    }

    fn characteristics(&self) -> Vec<Uuid> {
        self.characteristics.iter().map(|c| c.uuid).collect()
    }

    fn has_descriptor(&self, characteristic: Uuid, descriptor: Uuid) -> bool {
        self.characteristics
            .iter()
            .filter(|c| c.uuid == characteristic)
            .any(|c| c.descriptors.iter().any(|d| d.uuid == descriptor))
    }

    fn take_events(&mut self) -> Option<UnboundedReceiver<GattEvent>> {
        self.events_rx.take()
    }

    fn id(&self) -> String {
        format!("{:?}", self.peripheral.id())
    }
}
