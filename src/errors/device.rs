// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Errors raised by devices, the registry and the suspend/resume bridge.

use crate::errors::{Errno, HostError};
use std::time::Duration;
use thiserror::Error;

/// Failure of a device operation, carrying enough context to log usefully.
///
/// Every variant reduces to an [`Errno`] through [`DeviceError::errno`]; that
/// is what the engine sees. The host-facing API returns the full value.
#[derive(Debug, Clone, Error)]
pub enum DeviceError {
    /// No device or mount is registered under this name.
    #[error("{name}: no such file")]
    NoSuchFile { name: String },

    /// A device with this name already exists.
    #[error("{name}: device already exists")]
    AlreadyExists { name: String },

    /// The device still has open handles.
    #[error("{name}: device is busy ({open_handles} open handles)")]
    Busy { name: String, open_handles: usize },

    /// The device was removed while the request was outstanding.
    #[error("{name}: device was removed")]
    DeviceGone { name: String },

    /// A second read was issued on a sequential reader while one was pending.
    #[error("{name}: a read is already outstanding on this sequential device")]
    ConcurrentRead { name: String },

    /// The device kind does not support the requested operation.
    #[error("{name}: operation not permitted on a {kind} device")]
    NotPermitted { name: String, kind: &'static str },

    /// The device cannot seek, or a stream write was out of position.
    #[error("{name}: illegal seek")]
    IllegalSeek { name: String },

    /// The device is known but has no host hook able to service it.
    #[error("{name}: no host hook registered for {hook}")]
    NoHook { name: String, hook: &'static str },

    /// The name does not fit the mounted pattern.
    #[error("{name}: does not match pattern '{pattern}'")]
    PatternMismatch { name: String, pattern: String },

    /// Invalid argument passed by a caller.
    #[error("{name}: invalid argument: {reason}")]
    InvalidArgument { name: String, reason: String },

    /// The host stopped responding within the configured deadline.
    #[error("{name}: host unresponsive for {elapsed:?}")]
    Unresponsive { name: String, elapsed: Duration },

    /// The host side of the bridge was shut down.
    #[error("{name}: host is unreachable")]
    HostUnreachable { name: String },

    /// A request was resolved twice.
    #[error("request {request_id} was already resolved")]
    AlreadyResolved { request_id: u64 },

    /// Error supplied by the host, either thrown from a hook or passed into a resolution.
    #[error("{name}: {source}")]
    Host {
        name: String,
        #[source]
        source: HostError,
    },
}

impl DeviceError {
    pub fn host(name: impl Into<String>, source: HostError) -> Self {
        DeviceError::Host {
            name: name.into(),
            source,
        }
    }

    /// Errno handed to the engine for this failure.
    pub fn errno(&self) -> Errno {
        match self {
            DeviceError::NoSuchFile { .. } => Errno::ENOENT,
            DeviceError::AlreadyExists { .. } => Errno::EBUSY,
            DeviceError::Busy { .. } => Errno::EBUSY,
            DeviceError::DeviceGone { .. } => Errno::ENODEV,
            DeviceError::ConcurrentRead { .. } => Errno::EBUSY,
            DeviceError::NotPermitted { .. } => Errno::EPERM,
            DeviceError::IllegalSeek { .. } => Errno::ESPIPE,
            DeviceError::NoHook { .. } => Errno::EIO,
            DeviceError::PatternMismatch { .. } => Errno::ENOENT,
            DeviceError::InvalidArgument { .. } => Errno::EINVAL,
            DeviceError::Unresponsive { .. } => Errno::ETIMEDOUT,
            DeviceError::HostUnreachable { .. } => Errno::ETIMEDOUT,
            DeviceError::AlreadyResolved { .. } => Errno::EINVAL,
            DeviceError::Host { source, .. } => source.errno(),
        }
    }

    /// The host error that must reach the external caller verbatim, if any.
    pub fn passthrough(&self) -> Option<&HostError> {
        match self {
            DeviceError::Host { source, .. } if source.as_application().is_some() => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCategory;

    #[test]
    fn lifecycle_errors_map_to_expected_errnos() {
        let gone = DeviceError::DeviceGone { name: "f".into() };
        assert_eq!(gone.errno(), Errno::ENODEV);

        let missing = DeviceError::NoSuchFile { name: "f".into() };
        assert_eq!(missing.errno(), Errno::ENOENT);

        let busy = DeviceError::Busy {
            name: "f".into(),
            open_handles: 1,
        };
        assert_eq!(busy.errno(), Errno::EBUSY);
    }

    #[test]
    fn liveness_failures_are_distinct_from_io_errors() {
        let err = DeviceError::Unresponsive {
            name: "f".into(),
            elapsed: Duration::from_secs(3),
        };
        assert_eq!(err.errno(), Errno::ETIMEDOUT);
        assert_ne!(err.errno(), Errno::EIO);
    }

    #[test]
    fn host_errors_use_their_own_translation() {
        let categorized = DeviceError::host("f", ErrorCategory::BadDescriptor.into());
        assert_eq!(categorized.errno(), Errno::EBADF);
        assert!(categorized.passthrough().is_none());

        let app = DeviceError::host("f", HostError::message("boom"));
        assert_eq!(app.errno(), Errno::ECANCELED);
        assert_eq!(app.passthrough().map(|e| e.to_string()), Some("boom".into()));
    }
}
