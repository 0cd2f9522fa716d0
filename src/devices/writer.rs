// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::devices::WriterMode;
use crate::errors::DeviceError;
use std::sync::atomic::{AtomicU64, Ordering};

/// A sink whose writes are forwarded to the host.
///
/// Random-access writers accept any offset. Stream writers only accept the
/// offset immediately after the previous write.
pub struct Writer {
    mode: WriterMode,
    end: AtomicU64,
}

impl Writer {
    pub fn new(mode: WriterMode) -> Self {
        Self {
            mode,
            end: AtomicU64::new(0),
        }
    }

    pub fn mode(&self) -> WriterMode {
        self.mode
    }

    /// Offset just past the furthest byte written so far.
    pub fn end(&self) -> u64 {
        self.end.load(Ordering::Acquire)
    }

    pub(crate) fn check_position(&self, name: &str, offset: u64) -> Result<(), DeviceError> {
        if self.mode == WriterMode::Stream && offset != self.end() {
            return Err(DeviceError::IllegalSeek {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn advance(&self, offset: u64, written: usize) {
        self.end
            .fetch_max(offset.saturating_add(written as u64), Ordering::AcqRel);
    }
}
