// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Virtual device kinds and the per-device record kept by the registry.
//!
//! A device is one of three kinds:
//! * [`SequentialReader`] - a stream the host pushes chunks into, read in order
//! * [`BlockReader`] - a random-access file served by offset/length requests
//! * [`Writer`] - a sink whose writes are forwarded to the host
//!
//! Each kind keeps its own mutable state behind its own lock. The
//! [`DeviceEntry`] wraps a device with the bookkeeping every kind shares:
//! hooks, open handles, host activity and the removal flag.

mod block;
mod chunk_buffer;
mod pattern;
mod sequential;
mod writer;
mod writer_fs;

pub use block::BlockReader;
pub use chunk_buffer::ChunkBuffer;
pub use pattern::FilenamePattern;
pub use sequential::SequentialReader;
pub use writer::Writer;
pub use writer_fs::WriterFilesystem;

use crate::bridge::pending::{Completion, Waiter};
use crate::traits::DeviceHooks;
use serde::Deserialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Which kind of device to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    SequentialReader,
    BlockReader,
    Writer,
}

impl DeviceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceKind::SequentialReader => "sequential_reader",
            DeviceKind::BlockReader => "block_reader",
            DeviceKind::Writer => "writer",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a writer accepts positions.
///
/// * `RandomAccess` - writes may land at any offset
/// * `Stream` - writes must be contiguous; seeking fails with ESPIPE
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriterMode {
    #[default]
    RandomAccess,
    Stream,
}

/// Creation-time options for a device. Fields irrelevant to a kind are ignored.
///
/// # Fields
/// * `size` - Declared size of a block reader; reads past it return end-of-file
/// * `max_outstanding` - Cap on concurrent block requests; further reads wait
/// * `writer_mode` - Positioning rule for writers
/// * `host_deadline` - Per-device override of the host inactivity deadline
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceOptions {
    pub size: Option<u64>,
    pub max_outstanding: Option<usize>,
    pub writer_mode: WriterMode,
    pub host_deadline: Option<Duration>,
}

/// What the engine may do with a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub readable: bool,
    pub writable: bool,
    pub seekable: bool,
}

/// Outcome of admitting an engine call to a device.
pub(crate) enum Admission {
    /// Answered from buffered or cached data without involving the host.
    Immediate(Completion),
    /// Registered as a pending request; the caller must notify the host and park.
    Wait(Waiter),
}

/// The device state, tagged by kind.
pub enum Device {
    Sequential(SequentialReader),
    Block(BlockReader),
    Writer(Writer),
}

impl Device {
    pub fn new(kind: DeviceKind, options: &DeviceOptions) -> Self {
        match kind {
            DeviceKind::SequentialReader => Device::Sequential(SequentialReader::new()),
            DeviceKind::BlockReader => {
                Device::Block(BlockReader::new(options.size, options.max_outstanding))
            }
            DeviceKind::Writer => Device::Writer(Writer::new(options.writer_mode)),
        }
    }

    pub fn kind(&self) -> DeviceKind {
        match self {
            Device::Sequential(_) => DeviceKind::SequentialReader,
            Device::Block(_) => DeviceKind::BlockReader,
            Device::Writer(_) => DeviceKind::Writer,
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        match self {
            Device::Sequential(_) => Capabilities {
                readable: true,
                writable: false,
                seekable: false,
            },
            Device::Block(_) => Capabilities {
                readable: true,
                writable: false,
                seekable: true,
            },
            Device::Writer(writer) => Capabilities {
                readable: false,
                writable: true,
                seekable: writer.mode() == WriterMode::RandomAccess,
            },
        }
    }

    /// Number of requests still awaiting the host.
    pub fn outstanding(&self) -> usize {
        match self {
            Device::Sequential(reader) => reader.outstanding(),
            Device::Block(reader) => reader.outstanding(),
            Device::Writer(_) => 0,
        }
    }

    /// Fail every outstanding request with "device gone" and refuse new ones.
    pub(crate) fn cancel_all(&self, name: &str) -> usize {
        match self {
            Device::Sequential(reader) => reader.cancel_all(name),
            Device::Block(reader) => reader.cancel_all(name),
            Device::Writer(_) => 0,
        }
    }

    /// Drop a request the engine gave up on.
    pub(crate) fn forget(&self, request_id: u64) {
        match self {
            Device::Sequential(reader) => reader.forget(request_id),
            Device::Block(reader) => reader.forget(request_id),
            Device::Writer(_) => {}
        }
    }
}

/// A registered device plus the bookkeeping shared by all kinds.
pub struct DeviceEntry {
    name: String,
    device: Device,
    hooks: Option<Arc<dyn DeviceHooks>>,
    host_deadline: Option<Duration>,
    mount: Option<String>,
    open_handles: AtomicUsize,
    removed: AtomicBool,
    last_activity: Mutex<Instant>,
}

impl DeviceEntry {
    pub fn new(
        name: &str,
        kind: DeviceKind,
        options: &DeviceOptions,
        hooks: Option<Arc<dyn DeviceHooks>>,
        mount: Option<&str>,
    ) -> Self {
        Self {
            name: name.to_string(),
            device: Device::new(kind, options),
            hooks,
            host_deadline: options.host_deadline,
            mount: mount.map(str::to_string),
            open_handles: AtomicUsize::new(0),
            removed: AtomicBool::new(false),
            last_activity: Mutex::new(Instant::now()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn kind(&self) -> DeviceKind {
        self.device.kind()
    }

    /// Hooks bound to this device, overriding the bridge-wide ones.
    pub fn hooks(&self) -> Option<&Arc<dyn DeviceHooks>> {
        self.hooks.as_ref()
    }

    pub fn host_deadline(&self) -> Option<Duration> {
        self.host_deadline
    }

    /// Mount point this device was generated under, if any.
    pub fn mount(&self) -> Option<&str> {
        self.mount.as_deref()
    }

    /// Record host activity; resets the inactivity deadline.
    pub fn touch(&self) {
        *self
            .last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    pub fn last_activity(&self) -> Instant {
        *self
            .last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::Acquire)
    }

    pub(crate) fn acquire_handle(&self) {
        self.open_handles.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn release_handle(&self) {
        let _ = self
            .open_handles
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }

    pub(crate) fn mark_removed(&self) {
        self.removed.store(true, Ordering::Release);
    }

    /// Mark removed and cancel everything outstanding. Returns the cancelled count.
    pub(crate) fn retire(&self) -> usize {
        self.mark_removed();
        self.device.cancel_all(&self.name)
    }
}

impl fmt::Debug for DeviceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceEntry")
            .field("name", &self.name)
            .field("kind", &self.kind())
            .field("mount", &self.mount)
            .field("open_handles", &self.open_handles())
            .field("removed", &self.is_removed())
            .finish()
    }
}
