// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging.
//!
//! Each message type implements `Display` for human-readable output and
//! [`StructuredLog`] to emit the event with structured fields at its
//! documented level.
//!
//! # Organization
//!
//! * `bridge` - blocking calls, parking, resumption and liveness
//! * `device` - device lifecycle and protocol anomalies
//! * `registry` - writer filesystem mounts and name resolution
//!
//! # Usage Pattern
//!
//! ```rust
//! use vdev_bridge::observability::messages::device::DeviceCreated;
//! use vdev_bridge::observability::messages::StructuredLog;
//!
//! let msg = DeviceCreated {
//!     name: "input.webm",
//!     kind: "block_reader",
//! };
//!
//! msg.log();
//! ```

use std::fmt::Display;
use tracing::Span;

pub mod bridge;
pub mod device;
pub mod registry;

/// A log message that knows its own level and structured fields.
pub trait StructuredLog: Display {
    /// Emit the event.
    fn log(&self);

    /// Create a span carrying the same fields.
    fn span(&self, name: &str) -> Span {
        let _ = name;
        Span::none()
    }
}
