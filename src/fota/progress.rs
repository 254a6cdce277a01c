/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
use crate::core::device::DeviceInfo;
use log::info;

/// Receives progress and user-facing log lines from a running update.
pub trait ProgressSink: Send {
    fn progress(&mut self, percent: u8, chunk: usize, total: usize);

    fn log(&mut self, line: &str) {
        info!("{}", line);
    }

    fn device_info(&mut self, _info: &DeviceInfo) {}
}

/// Sink that only forwards to the `log` facade.
#[derive(Debug, Default)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn progress(&mut self, percent: u8, chunk: usize, total: usize) {
        log::debug!("Progress {}% (chunk {} of {})", percent, chunk, total);
    }
}

/// Plain closures work as sinks for progress only.
impl<F> ProgressSink for F
where
    F: FnMut(u8, usize, usize) + Send,
{
    fn progress(&mut self, percent: u8, chunk: usize, total: usize) {
        self(percent, chunk, total)
    }
}
