// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::bridge::{DeviceBridge, WeakBridge};
use crate::errors::{DeviceError, ErrorCategory, HostError};
use crate::observability::messages::bridge::HookFailed;
use crate::observability::messages::StructuredLog;
use crate::traits::{AsyncDeviceHooks, DeviceHooks};
use bytes::Bytes;
use std::sync::Arc;
use tokio::runtime::Handle;

/// Adapts [`AsyncDeviceHooks`] to the synchronous [`DeviceHooks`] seam.
///
/// Each notification is spawned as a task on the host runtime and returns
/// immediately, so the engine parks while the host works. A read hook that
/// fails asynchronously fails its request through the bridge. The bridge
/// is held weakly; once it is gone every notification fails with EIO.
pub struct SpawnedHooks<H> {
    inner: Arc<H>,
    bridge: WeakBridge,
    runtime: Handle,
}

impl<H> SpawnedHooks<H>
where
    H: AsyncDeviceHooks + 'static,
{
    pub fn new(bridge: &DeviceBridge, inner: Arc<H>) -> Self {
        Self {
            inner,
            bridge: bridge.downgrade(),
            runtime: bridge.runtime().clone(),
        }
    }

    pub fn inner(&self) -> &Arc<H> {
        &self.inner
    }

    fn bridge(&self) -> Result<DeviceBridge, HostError> {
        self.bridge
            .upgrade()
            .ok_or(HostError::Category(ErrorCategory::Io))
    }
}

impl<H> DeviceHooks for SpawnedHooks<H>
where
    H: AsyncDeviceHooks + 'static,
{
    fn on_read(&self, name: &str, position: u64, length: usize) -> Result<(), HostError> {
        let bridge = self.bridge()?;
        let inner = Arc::clone(&self.inner);
        let name = name.to_string();
        self.runtime.spawn(async move {
            let result = inner
                .on_read(bridge.clone(), name.clone(), position, length)
                .await;
            if let Err(error) = result {
                report(&name, "on_read", &error, bridge.fail(&name, error.clone()));
            }
        });
        Ok(())
    }

    fn on_block_read(&self, name: &str, offset: u64, length: usize) -> Result<(), HostError> {
        let bridge = self.bridge()?;
        let inner = Arc::clone(&self.inner);
        let name = name.to_string();
        self.runtime.spawn(async move {
            if let Err(error) = inner
                .on_block_read(bridge.clone(), name.clone(), offset, length)
                .await
            {
                let delivered = bridge
                    .fail_block(&name, offset, length, error.clone())
                    .map(|_| ());
                report(&name, "on_block_read", &error, delivered);
            }
        });
        Ok(())
    }

    fn on_write(&self, name: &str, offset: u64, data: &[u8]) -> Result<(), HostError> {
        let bridge = self.bridge()?;
        let inner = Arc::clone(&self.inner);
        let name = name.to_string();
        let data = Bytes::copy_from_slice(data);
        self.runtime.spawn(async move {
            if let Err(error) = inner.on_write(bridge, name.clone(), offset, data).await {
                report(&name, "on_write", &error, Ok(()));
            }
        });
        Ok(())
    }
}

fn report(name: &str, hook: &str, error: &HostError, delivered: Result<(), DeviceError>) {
    HookFailed {
        device: name,
        hook,
        error,
    }
    .log();
    if let Err(undelivered) = delivered {
        tracing::debug!(device = name, error = %undelivered, "Hook failure had no request to fail");
    }
}
