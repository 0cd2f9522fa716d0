// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::bridge::DeviceBridge;
use crate::errors::{ErrorCategory, HostError};
use async_trait::async_trait;
use bytes::Bytes;

/// Asynchronous host hooks.
///
/// Wrap an implementation in [`crate::host::SpawnedHooks`] to use it as
/// [`crate::traits::DeviceHooks`]: every notification becomes a task on the
/// host runtime. An error returned from a read hook is delivered to the
/// matching request as if the host had failed it explicitly.
#[async_trait]
pub trait AsyncDeviceHooks: Send + Sync {
    async fn on_read(
        &self,
        bridge: DeviceBridge,
        name: String,
        position: u64,
        length: usize,
    ) -> Result<(), HostError> {
        let _ = (bridge, name, position, length);
        Ok(())
    }

    async fn on_block_read(
        &self,
        bridge: DeviceBridge,
        name: String,
        offset: u64,
        length: usize,
    ) -> Result<(), HostError> {
        let _ = (bridge, name, offset, length);
        Err(ErrorCategory::Io.into())
    }

    /// Writes are already acknowledged by the time this runs; failures are only logged.
    async fn on_write(
        &self,
        bridge: DeviceBridge,
        name: String,
        offset: u64,
        data: Bytes,
    ) -> Result<(), HostError> {
        let _ = (bridge, name, offset, data);
        Err(ErrorCategory::Io.into())
    }
}
