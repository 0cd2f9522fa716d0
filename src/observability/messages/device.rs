// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for device lifecycle and protocol anomalies.
//!
//! Protocol anomalies (stale answers, duplicate resolutions, concurrent
//! sequential reads, data after end-of-stream) are recovered locally and
//! logged here at `warn!`.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};

/// A device was registered.
///
/// # Log Level
/// `info!` - Lifecycle event
///
/// # Example
/// ```
/// use vdev_bridge::observability::messages::device::DeviceCreated;
///
/// let msg = DeviceCreated {
///     name: "input.webm",
///     kind: "block_reader",
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct DeviceCreated<'a> {
    pub name: &'a str,
    pub kind: &'a str,
}

impl Display for DeviceCreated<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Created {} device '{}'", self.kind, self.name)
    }
}

impl StructuredLog for DeviceCreated<'_> {
    fn log(&self) {
        tracing::info!(device = self.name, kind = self.kind, "{}", self);
    }
}

/// A device was removed, cancelling its outstanding requests.
///
/// # Log Level
/// `info!` - Lifecycle event
pub struct DeviceRemoved<'a> {
    pub name: &'a str,
    pub kind: &'a str,
    pub cancelled: usize,
}

impl Display for DeviceRemoved<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Removed {} device '{}' ({} outstanding requests cancelled)",
            self.kind, self.name, self.cancelled
        )
    }
}

impl StructuredLog for DeviceRemoved<'_> {
    fn log(&self) {
        tracing::info!(
            device = self.name,
            kind = self.kind,
            cancelled = self.cancelled,
            "{}", self
        );
    }
}

/// A block answer matched no outstanding request and was discarded.
///
/// # Log Level
/// `warn!` - Protocol anomaly, recovered locally
///
/// # Example
/// ```
/// use vdev_bridge::observability::messages::device::StaleBlockAnswer;
///
/// let msg = StaleBlockAnswer {
///     device: "input.webm",
///     offset: 8192,
///     length: 4096,
/// };
///
/// tracing::warn!("{}", msg);
/// ```
pub struct StaleBlockAnswer<'a> {
    pub device: &'a str,
    pub offset: u64,
    pub length: usize,
}

impl Display for StaleBlockAnswer<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Discarded answer for '{}' at offset {} length {}: no outstanding request matches",
            self.device, self.offset, self.length
        )
    }
}

impl StructuredLog for StaleBlockAnswer<'_> {
    fn log(&self) {
        tracing::warn!(
            device = self.device,
            offset = self.offset,
            length = self.length,
            "{}", self
        );
    }
}

/// A request was resolved after it had already been resolved.
///
/// # Log Level
/// `warn!` - Protocol anomaly
pub struct DuplicateResolution<'a> {
    pub device: &'a str,
    pub request_id: u64,
}

impl Display for DuplicateResolution<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Rejected second resolution of request #{} on '{}'",
            self.request_id, self.device
        )
    }
}

impl StructuredLog for DuplicateResolution<'_> {
    fn log(&self) {
        tracing::warn!(
            device = self.device,
            request_id = self.request_id,
            "{}", self
        );
    }
}

/// The engine issued a read on a sequential device that already had one outstanding.
///
/// # Log Level
/// `warn!` - Protocol violation; the second read fails
pub struct ConcurrentSequentialRead<'a> {
    pub device: &'a str,
}

impl Display for ConcurrentSequentialRead<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Rejected concurrent read on sequential device '{}'",
            self.device
        )
    }
}

impl StructuredLog for ConcurrentSequentialRead<'_> {
    fn log(&self) {
        tracing::warn!(device = self.device, "{}", self);
    }
}

/// The host sent data after signalling end-of-stream.
///
/// # Log Level
/// `warn!` - Protocol anomaly; data discarded
pub struct DataAfterEof<'a> {
    pub device: &'a str,
    pub discarded: usize,
}

impl Display for DataAfterEof<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Discarded {} bytes sent to '{}' after end of stream",
            self.discarded, self.device
        )
    }
}

impl StructuredLog for DataAfterEof<'_> {
    fn log(&self) {
        tracing::warn!(
            device = self.device,
            discarded = self.discarded,
            "{}", self
        );
    }
}
