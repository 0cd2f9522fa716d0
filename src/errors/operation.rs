// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Outcome of a high-level operation that ran the engine against the bridge.

use crate::errors::{Errno, HostError};
use thiserror::Error;

/// Error returned to the async caller of [`crate::bridge::DeviceBridge::run_engine`].
///
/// An application error raised by host code while the engine was blocked is
/// re-raised here unchanged, in preference to the errno the engine saw.
#[derive(Debug, Error)]
pub enum OperationError {
    /// Error thrown by host code, passed through verbatim.
    #[error(transparent)]
    Host(HostError),

    /// The engine gave up with an error number.
    #[error("engine failed: {0}")]
    Errno(Errno),

    /// The engine thread panicked or was cancelled.
    #[error("engine task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl OperationError {
    /// The errno behind this failure, if the engine reported one.
    pub fn errno(&self) -> Option<Errno> {
        match self {
            OperationError::Errno(errno) => Some(*errno),
            OperationError::Host(host) => Some(host.errno()),
            OperationError::Join(_) => None,
        }
    }
}
