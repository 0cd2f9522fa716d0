// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for blocking calls crossing the suspend/resume bridge.
//!
//! This module contains message types for logging events related to:
//! * Parking an engine call until the host answers
//! * Resuming a parked call
//! * Liveness ticks and unresponsive hosts
//! * Hook invocation failures

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tracing::Span;

/// An engine call was parked waiting for the host.
///
/// # Log Level
/// `debug!` - Per-request detail
///
/// # Example
/// ```
/// use vdev_bridge::observability::messages::bridge::RequestParked;
///
/// let msg = RequestParked {
///     device: "input.webm",
///     request_id: 7,
///     op: "read",
///     offset: 4096,
///     length: 512,
/// };
///
/// tracing::debug!("{}", msg);
/// ```
pub struct RequestParked<'a> {
    pub device: &'a str,
    pub request_id: u64,
    pub op: &'a str,
    pub offset: u64,
    pub length: usize,
}

impl Display for RequestParked<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Parked {} request #{} on '{}' at offset {} for {} bytes",
            self.op, self.request_id, self.device, self.offset, self.length
        )
    }
}

impl StructuredLog for RequestParked<'_> {
    fn log(&self) {
        tracing::debug!(
            device = self.device,
            request_id = self.request_id,
            op = self.op,
            offset = self.offset,
            length = self.length,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "blocking_call",
            span_name = name,
            device = self.device,
            request_id = self.request_id,
            op = self.op,
            offset = self.offset,
            length = self.length,
        )
    }
}

/// A parked engine call was resumed with a result.
///
/// # Log Level
/// `debug!` - Per-request detail
pub struct RequestResumed<'a> {
    pub device: &'a str,
    pub request_id: u64,
    pub waited: Duration,
    pub ok: bool,
}

impl Display for RequestResumed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        let outcome = if self.ok { "success" } else { "failure" };
        write!(
            f,
            "Resumed request #{} on '{}' with {} after {:?}",
            self.request_id, self.device, outcome, self.waited
        )
    }
}

impl StructuredLog for RequestResumed<'_> {
    fn log(&self) {
        tracing::debug!(
            device = self.device,
            request_id = self.request_id,
            waited_ms = self.waited.as_millis() as u64,
            ok = self.ok,
            "{}", self
        );
    }
}

/// Liveness tick fired while a request was still pending.
///
/// # Log Level
/// `trace!` - Fires every tick
pub struct LivenessTick<'a> {
    pub device: &'a str,
    pub request_id: u64,
    pub waited: Duration,
}

impl Display for LivenessTick<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Request #{} on '{}' still pending after {:?}",
            self.request_id, self.device, self.waited
        )
    }
}

impl StructuredLog for LivenessTick<'_> {
    fn log(&self) {
        tracing::trace!(
            device = self.device,
            request_id = self.request_id,
            waited_ms = self.waited.as_millis() as u64,
            "{}", self
        );
    }
}

/// The host made no progress on a device within its deadline.
///
/// # Log Level
/// `error!` - Failure requiring attention
///
/// # Example
/// ```
/// use vdev_bridge::observability::messages::bridge::HostUnresponsive;
/// use std::time::Duration;
///
/// let msg = HostUnresponsive {
///     device: "live.ts",
///     request_id: 3,
///     idle: Duration::from_secs(30),
///     deadline: Duration::from_secs(30),
/// };
///
/// tracing::error!("{}", msg);
/// ```
pub struct HostUnresponsive<'a> {
    pub device: &'a str,
    pub request_id: u64,
    pub idle: Duration,
    pub deadline: Duration,
}

impl Display for HostUnresponsive<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Host unresponsive on '{}': request #{} idle for {:?} (deadline {:?})",
            self.device, self.request_id, self.idle, self.deadline
        )
    }
}

impl StructuredLog for HostUnresponsive<'_> {
    fn log(&self) {
        tracing::error!(
            device = self.device,
            request_id = self.request_id,
            idle_ms = self.idle.as_millis() as u64,
            deadline_ms = self.deadline.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "host_unresponsive",
            span_name = name,
            device = self.device,
            request_id = self.request_id,
        )
    }
}

/// A host hook failed synchronously while being notified of a request.
///
/// # Log Level
/// `warn!` - The triggering engine call fails
pub struct HookFailed<'a> {
    pub device: &'a str,
    pub hook: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for HookFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Hook {} failed for '{}': {}",
            self.hook, self.device, self.error
        )
    }
}

impl StructuredLog for HookFailed<'_> {
    fn log(&self) {
        tracing::warn!(
            device = self.device,
            hook = self.hook,
            error = %self.error,
            "{}", self
        );
    }
}

/// The host side of the bridge was shut down.
///
/// # Log Level
/// `info!` - Lifecycle event
pub struct BridgeShutdown {
    pub devices: usize,
}

impl Display for BridgeShutdown {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Device bridge shut down with {} devices registered",
            self.devices
        )
    }
}

impl StructuredLog for BridgeShutdown {
    fn log(&self) {
        tracing::info!(devices = self.devices, "{}", self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parked_message_mentions_device_and_range() {
        let msg = RequestParked {
            device: "g",
            request_id: 1,
            op: "read",
            offset: 100,
            length: 50,
        };
        let text = msg.to_string();
        assert!(text.contains("'g'"));
        assert!(text.contains("offset 100"));
        assert!(text.contains("50 bytes"));
    }

    #[test]
    fn resumed_message_reports_outcome() {
        let msg = RequestResumed {
            device: "f",
            request_id: 2,
            waited: Duration::from_millis(5),
            ok: false,
        };
        assert!(msg.to_string().contains("failure"));
    }
}
