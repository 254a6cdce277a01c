/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
use std::sync::{Arc, Mutex};
use std::time::Duration;
use suota::connection::MAX_REFRESH_ATTEMPTS;
use suota::connection::uuids::*;
use suota::fota::status::ERROR_COMMUNICATION;
use suota::{Device, Error, FirmwareImage, PlatformHooks, UpdateConfig, Variant};

use test_helpers::{MockPort, Recorder, Script, pattern};

#[derive(Clone, Default)]
struct AwakeLog(Arc<Mutex<Vec<bool>>>);

impl PlatformHooks for AwakeLog {
    fn keep_awake(&mut self, hold: bool) {
        self.0.lock().unwrap().push(hold);
    }
}

fn suota_image(len: usize) -> FirmwareImage {
    FirmwareImage::new(pattern(len), Variant::Suota).unwrap()
}

#[tokio::test]
async fn missing_service_is_not_supported() {
    let script = Script { service: false, ..Script::suota() };
    let (port, record) = MockPort::new(script);

    let err = Device::init(port).await.err().unwrap();
    assert!(matches!(err, Error::ProtocolNotSupported(uuid) if uuid == SPOTA_SERVICE));
    assert_eq!(err.code(), Some(0xFFFE));
    assert_eq!(record.lock().unwrap().closes, 1);
}

#[tokio::test]
async fn missing_characteristic_is_not_supported() {
    let mut script = Script::suota();
    script.characteristics.retain(|c| *c != SPOTA_PATCH_LEN);
    let (port, _record) = MockPort::new(script);

    let err = Device::init(port).await.err().unwrap();
    assert!(matches!(err, Error::ProtocolNotSupported(uuid) if uuid == SPOTA_PATCH_LEN));
}

#[tokio::test]
async fn missing_status_descriptor_is_not_supported() {
    let script = Script { cccd: false, ..Script::suota() };
    let (port, _record) = MockPort::new(script);

    let err = Device::init(port).await.err().unwrap();
    assert!(matches!(err, Error::ProtocolNotSupported(uuid) if uuid == CLIENT_CONFIG_DESCRIPTOR));
}

#[tokio::test]
async fn cache_refresh_is_retried() {
    let mut script = Script::suota();
    script.refresh = vec![Err("busy".to_string()), Err("busy".to_string()), Ok(true)].into();
    let (port, record) = MockPort::new(script);

    Device::init(port).await.unwrap();
    assert_eq!(record.lock().unwrap().refresh_calls, 3);
}

#[tokio::test]
async fn cache_refresh_gives_up_after_max_attempts() {
    let mut script = Script::suota();
    script.refresh = (0..MAX_REFRESH_ATTEMPTS + 5).map(|_| Err("busy".to_string())).collect();
    let (port, record) = MockPort::new(script);

    // Discovery results are still checked afterwards
    Device::init(port).await.unwrap();
    assert_eq!(record.lock().unwrap().refresh_calls, MAX_REFRESH_ATTEMPTS);
}

#[tokio::test]
async fn unsupported_cache_refresh_is_tried_once() {
    let (port, record) = MockPort::new(Script::suota());
    Device::init(port).await.unwrap();
    assert_eq!(record.lock().unwrap().refresh_calls, 1);
}

#[tokio::test]
async fn silent_device_times_out() {
    let script = Script { silent_after_end: true, ..Script::suota() };
    let (port, record) = MockPort::new(script);
    let mut device = Device::init(port).await.unwrap();

    let config = UpdateConfig {
        operation_timeout: Duration::from_millis(200),
        ..UpdateConfig::suota()
    };
    let err = device
        .update(suota_image(100), config, &mut Recorder::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Timeout(after) if after == Duration::from_millis(200)));
    assert_eq!(err.code(), Some(ERROR_COMMUNICATION));
    assert_eq!(record.lock().unwrap().closes, 1);
}

#[tokio::test]
async fn abort_stops_a_running_update() {
    let script = Script { stall_after_block: true, ..Script::suota() };
    let (port, record) = MockPort::new(script);
    let mut device = Device::init(port).await.unwrap();
    let mut sink = Recorder::default();

    let handle = device.abort_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();
    });

    let config = UpdateConfig {
        operation_timeout: Duration::from_secs(10),
        ..UpdateConfig::suota()
    };
    let err = device.update(suota_image(1000), config, &mut sink).await.unwrap_err();

    assert!(matches!(err, Error::Aborted));
    assert!(sink.lines.iter().any(|l| l == "Update aborted"));
    let record = record.lock().unwrap();
    assert_eq!(record.received.len(), 240);
    assert_eq!(record.closes, 1);
}

#[tokio::test]
async fn keep_awake_is_held_during_transfer() {
    let hooks = AwakeLog::default();
    let (port, _record) = MockPort::new(Script::suota());
    let mut device = Device::init(port).await.unwrap().with_hooks(Box::new(hooks.clone()));

    device
        .update(suota_image(100), UpdateConfig::suota(), &mut Recorder::default())
        .await
        .unwrap();
    assert_eq!(*hooks.0.lock().unwrap(), vec![true, false]);
}

#[tokio::test]
async fn keep_awake_is_released_on_error() {
    let hooks = AwakeLog::default();
    let script = Script { end_status: Some(0x07), ..Script::suota() };
    let (port, _record) = MockPort::new(script);
    let mut device = Device::init(port).await.unwrap().with_hooks(Box::new(hooks.clone()));

    device
        .update(suota_image(100), UpdateConfig::suota(), &mut Recorder::default())
        .await
        .unwrap_err();
    assert_eq!(*hooks.0.lock().unwrap(), vec![true, false]);
}

#[tokio::test]
async fn link_is_closed_exactly_once() {
    let (port, record) = MockPort::new(Script::suota());
    let mut device = Device::init(port).await.unwrap();

    device
        .update(suota_image(100), UpdateConfig::suota(), &mut Recorder::default())
        .await
        .unwrap();
    device.close().await.unwrap();
    device.close().await.unwrap();

    assert_eq!(record.lock().unwrap().closes, 1);

    // A closed link cannot run another update
    let err = device
        .update(suota_image(100), UpdateConfig::suota(), &mut Recorder::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Transport(_)));
}

#[tokio::test]
async fn reconnect_to_another_device_closes_the_old_link() {
    let (first, first_record) = MockPort::new(Script::suota());
    let mut device = Device::init(first).await.unwrap();

    let script = Script { id: "80:EA:CA:00:00:02".into(), ..Script::suota() };
    let (second, second_record) = MockPort::new(script);
    device.reconnect(second).await.unwrap();
    assert_eq!(first_record.lock().unwrap().closes, 1);

    device
        .update(suota_image(100), UpdateConfig::suota(), &mut Recorder::default())
        .await
        .unwrap();
    assert!(first_record.lock().unwrap().writes.is_empty());
    assert!(!second_record.lock().unwrap().writes.is_empty());
}

#[tokio::test]
async fn reconnect_to_the_same_device_keeps_the_link() {
    let (first, first_record) = MockPort::new(Script::suota());
    let mut device = Device::init(first).await.unwrap();

    let (again, again_record) = MockPort::new(Script::suota());
    device.reconnect(again).await.unwrap();

    assert_eq!(first_record.lock().unwrap().closes, 0);
    assert_eq!(again_record.lock().unwrap().closes, 0);
    device
        .update(suota_image(100), UpdateConfig::suota(), &mut Recorder::default())
        .await
        .unwrap();
    assert!(!first_record.lock().unwrap().writes.is_empty());
}

#[tokio::test]
async fn failed_close_on_reconnect_closes_the_new_link() {
    let script = Script { fail_close: true, ..Script::suota() };
    let (first, first_record) = MockPort::new(script);
    let mut device = Device::init(first).await.unwrap();

    let script = Script { id: "80:EA:CA:00:00:02".into(), ..Script::suota() };
    let (second, second_record) = MockPort::new(script);
    let err = device.reconnect(second).await.unwrap_err();

    assert!(matches!(err, Error::Transport(_)));
    assert_eq!(first_record.lock().unwrap().closes, 1);
    assert_eq!(second_record.lock().unwrap().closes, 1);
    assert!(second_record.lock().unwrap().writes.is_empty());
}
