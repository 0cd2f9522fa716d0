// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::errors::{ErrorCategory, HostError};

/// Notifications from the bridge to the host.
///
/// Hooks are called synchronously on the engine thread right after a
/// request has been registered, so a hook may answer inline or hand the
/// work to an async task and answer later through the bridge. Returning an
/// error fails only the request that triggered the call.
///
/// Hooks must not block waiting for the answer they are about to provide.
pub trait DeviceHooks: Send + Sync {
    /// The engine wants `length` bytes from a sequential reader at `position`.
    ///
    /// Purely advisory; a host that streams unprompted can ignore it.
    fn on_read(&self, name: &str, position: u64, length: usize) -> Result<(), HostError> {
        let _ = (name, position, length);
        Ok(())
    }

    /// The engine wants `length` bytes from a block reader at `offset`.
    ///
    /// The host must eventually answer with exactly this `(offset, length)`.
    fn on_block_read(&self, name: &str, offset: u64, length: usize) -> Result<(), HostError> {
        let _ = (name, offset, length);
        Err(ErrorCategory::Io.into())
    }

    /// The engine wrote `data` to a writer at `offset`.
    ///
    /// The write is acknowledged as soon as this returns `Ok`.
    fn on_write(&self, name: &str, offset: u64, data: &[u8]) -> Result<(), HostError> {
        let _ = (name, offset, data);
        Err(ErrorCategory::Io.into())
    }
}
