// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for writer filesystem mounts and registry lookups.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};

/// A writer filesystem was mounted.
///
/// # Log Level
/// `info!` - Lifecycle event
///
/// # Example
/// ```
/// use vdev_bridge::observability::messages::registry::WriterFsMounted;
///
/// let msg = WriterFsMounted {
///     mount_point: "/frames",
///     pattern: Some("%06d.png"),
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct WriterFsMounted<'a> {
    pub mount_point: &'a str,
    pub pattern: Option<&'a str>,
}

impl Display for WriterFsMounted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self.pattern {
            Some(pattern) => write!(
                f,
                "Mounted writer filesystem at '{}' with pattern '{}'",
                self.mount_point, pattern
            ),
            None => write!(f, "Mounted writer filesystem at '{}'", self.mount_point),
        }
    }
}

impl StructuredLog for WriterFsMounted<'_> {
    fn log(&self) {
        tracing::info!(
            mount_point = self.mount_point,
            pattern = self.pattern.unwrap_or("*"),
            "{}", self
        );
    }
}

/// A writer filesystem was unmounted along with its devices.
///
/// # Log Level
/// `info!` - Lifecycle event
pub struct WriterFsUnmounted<'a> {
    pub mount_point: &'a str,
    pub removed: usize,
}

impl Display for WriterFsUnmounted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Unmounted writer filesystem at '{}' ({} files removed)",
            self.mount_point, self.removed
        )
    }
}

impl StructuredLog for WriterFsUnmounted<'_> {
    fn log(&self) {
        tracing::info!(
            mount_point = self.mount_point,
            removed = self.removed,
            "{}", self
        );
    }
}

/// A writer device was created lazily under a mount.
///
/// # Log Level
/// `debug!` - One per generated file
pub struct WriterFileCreated<'a> {
    pub mount_point: &'a str,
    pub name: &'a str,
    pub index: Option<u64>,
}

impl Display for WriterFileCreated<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self.index {
            Some(index) => write!(
                f,
                "Created writer '{}' (index {}) under '{}'",
                self.name, index, self.mount_point
            ),
            None => write!(f, "Created writer '{}' under '{}'", self.name, self.mount_point),
        }
    }
}

impl StructuredLog for WriterFileCreated<'_> {
    fn log(&self) {
        tracing::debug!(
            mount_point = self.mount_point,
            device = self.name,
            "{}", self
        );
    }
}

/// An engine call named a file with no device.
///
/// # Log Level
/// `debug!` - The call fails with ENOENT
pub struct UnknownDevice<'a> {
    pub name: &'a str,
}

impl Display for UnknownDevice<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "No device registered for '{}'", self.name)
    }
}

impl StructuredLog for UnknownDevice<'_> {
    fn log(&self) {
        tracing::debug!(device = self.name, "{}", self);
    }
}
