// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The suspend/resume bridge between a synchronous engine and an async host.
//!
//! [`DeviceBridge`] is the host's handle: it creates and removes devices,
//! mounts writer filesystems and answers outstanding requests. [`Engine`]
//! is the engine's handle: plain blocking `read`/`write`/`open` calls that
//! park until the host answers and report failures as [`Errno`] values.
//!
//! Both handles share one registry, one set of hooks and one parker. The
//! host side is cheap to clone and safe to use from any task; the engine
//! side must only be used from blocking contexts.
//!
//! # Example
//!
//! ```no_run
//! use bytes::Bytes;
//! use vdev_bridge::bridge::DeviceBridge;
//! use vdev_bridge::config::LivenessConfig;
//! use vdev_bridge::devices::{DeviceKind, DeviceOptions};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let bridge = DeviceBridge::current(&LivenessConfig::default());
//! bridge.make_device("input", DeviceKind::SequentialReader, DeviceOptions::default())?;
//!
//! let read = bridge.run_engine(|engine| engine.read("input", 5));
//! bridge.send("input", Some(Bytes::from_static(b"hello")))?;
//! assert_eq!(&read.await?[..], b"hello");
//! # Ok(())
//! # }
//! ```

mod engine;
pub mod pending;
mod suspend;

#[cfg(test)]
mod integration_tests;

pub use engine::{Engine, FileStat, OpenFile, OpenMode};

use crate::config::LivenessConfig;
use crate::devices::{Device, DeviceEntry, DeviceKind, DeviceOptions, WriterFilesystem, WriterMode};
use crate::errors::{DeviceError, Errno, HostError, OperationError};
use crate::observability::messages::bridge::BridgeShutdown;
use crate::observability::messages::StructuredLog;
use crate::registry::DeviceRegistry;
use crate::traits::DeviceHooks;
use bytes::Bytes;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use suspend::Parker;
use tokio::runtime::Handle;

pub(crate) struct BridgeShared {
    registry: DeviceRegistry,
    hooks: RwLock<Option<Arc<dyn DeviceHooks>>>,
    parker: Parker,
    thrown: Mutex<Option<HostError>>,
    serial: tokio::sync::Mutex<()>,
}

impl BridgeShared {
    /// Per-device hooks win over the bridge-wide ones.
    fn hooks_for(&self, entry: &DeviceEntry) -> Option<Arc<dyn DeviceHooks>> {
        entry.hooks().cloned().or_else(|| {
            self.hooks
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        })
    }

    /// Keep the first application error until it is taken.
    fn stash_thrown(&self, error: &HostError) {
        let mut slot = self.thrown.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(error.clone());
        }
    }

    fn take_thrown(&self) -> Option<HostError> {
        self.thrown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Host-side handle to the bridge.
#[derive(Clone)]
pub struct DeviceBridge {
    shared: Arc<BridgeShared>,
}

/// Non-owning handle, for host helpers that must not keep the bridge alive.
#[derive(Clone)]
pub struct WeakBridge {
    shared: Weak<BridgeShared>,
}

impl WeakBridge {
    pub fn upgrade(&self) -> Option<DeviceBridge> {
        self.shared.upgrade().map(|shared| DeviceBridge { shared })
    }
}

impl DeviceBridge {
    /// Create a bridge whose host side runs on `runtime`.
    pub fn new(liveness: &LivenessConfig, runtime: Handle) -> Self {
        let parker = Parker::new(runtime, liveness.get_tick(), liveness.get_host_deadline());
        tracing::debug!(
            tick_ms = parker.tick().as_millis() as u64,
            host_deadline_ms = liveness.host_deadline_ms,
            "Created device bridge"
        );
        Self {
            shared: Arc::new(BridgeShared {
                registry: DeviceRegistry::new(),
                hooks: RwLock::new(None),
                parker,
                thrown: Mutex::new(None),
                serial: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Create a bridge on the current Tokio runtime.
    ///
    /// # Panics
    /// Panics when called outside a Tokio runtime, like [`Handle::current`].
    pub fn current(liveness: &LivenessConfig) -> Self {
        Self::new(liveness, Handle::current())
    }

    /// The engine-side handle.
    pub fn engine(&self) -> Engine {
        Engine::new(Arc::clone(&self.shared))
    }

    pub fn downgrade(&self) -> WeakBridge {
        WeakBridge {
            shared: Arc::downgrade(&self.shared),
        }
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.shared.registry
    }

    pub(crate) fn runtime(&self) -> &Handle {
        self.shared.parker.runtime()
    }

    /// Install the bridge-wide hooks, replacing any previous ones.
    pub fn set_hooks(&self, hooks: Arc<dyn DeviceHooks>) {
        *self
            .shared
            .hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(hooks);
    }

    pub fn clear_hooks(&self) {
        *self
            .shared
            .hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn make_device(
        &self,
        name: &str,
        kind: DeviceKind,
        options: DeviceOptions,
    ) -> Result<(), DeviceError> {
        self.shared.registry.create(name, kind, &options, None)?;
        Ok(())
    }

    /// Create a device with its own hooks, used instead of the bridge-wide ones.
    pub fn make_device_with_hooks(
        &self,
        name: &str,
        kind: DeviceKind,
        options: DeviceOptions,
        hooks: Arc<dyn DeviceHooks>,
    ) -> Result<(), DeviceError> {
        self.shared
            .registry
            .create(name, kind, &options, Some(hooks))?;
        Ok(())
    }

    /// Remove a device. Parked calls on it fail with ENODEV.
    pub fn remove_device(&self, name: &str) -> Result<(), DeviceError> {
        self.shared.registry.remove(name)?;
        Ok(())
    }

    /// Mount a random-access writer filesystem.
    pub fn mount_writer_fs(
        &self,
        mount_point: &str,
        pattern: Option<&str>,
    ) -> Result<(), DeviceError> {
        self.mount_writer_fs_with_mode(mount_point, pattern, WriterMode::RandomAccess)
    }

    pub fn mount_writer_fs_with_mode(
        &self,
        mount_point: &str,
        pattern: Option<&str>,
        mode: WriterMode,
    ) -> Result<(), DeviceError> {
        let fs = WriterFilesystem::new(mount_point, pattern, mode)?;
        self.shared.registry.mount(fs)?;
        Ok(())
    }

    /// Unmount a writer filesystem, returning the names of the removed files.
    pub fn unmount_writer_fs(&self, mount_point: &str) -> Result<Vec<String>, DeviceError> {
        let removed = self.shared.registry.unmount(mount_point)?;
        let mut names: Vec<String> = removed.iter().map(|e| e.name().to_string()).collect();
        names.sort();
        Ok(names)
    }

    /// Files created so far under a writer filesystem.
    pub fn writer_fs_files(&self, mount_point: &str) -> Result<Vec<String>, DeviceError> {
        self.shared
            .registry
            .mount_for(mount_point)
            .map(|fs| fs.file_names())
            .ok_or_else(|| DeviceError::NoSuchFile {
                name: mount_point.to_string(),
            })
    }

    /// Push a chunk to a sequential reader, or end the stream with `None`.
    pub fn send(&self, name: &str, chunk: Option<Bytes>) -> Result<(), DeviceError> {
        let entry = self.shared.registry.get(name)?;
        entry.touch();
        match entry.device() {
            Device::Sequential(reader) => {
                reader.send(name, chunk);
                Ok(())
            }
            _ => Err(DeviceError::NotPermitted {
                name: name.to_string(),
                kind: entry.kind().as_str(),
            }),
        }
    }

    /// Fail a sequential reader's pending read and all reads until the next chunk.
    pub fn fail(&self, name: &str, error: HostError) -> Result<(), DeviceError> {
        let entry = self.shared.registry.get(name)?;
        entry.touch();
        match entry.device() {
            Device::Sequential(reader) => {
                reader.fail(name, error);
                Ok(())
            }
            _ => Err(DeviceError::NotPermitted {
                name: name.to_string(),
                kind: entry.kind().as_str(),
            }),
        }
    }

    /// Answer a block read. `None` data means end of file.
    ///
    /// Returns `false` if no outstanding request matched; the answer is dropped.
    pub fn send_block(
        &self,
        name: &str,
        offset: u64,
        length: usize,
        data: Option<Bytes>,
    ) -> Result<bool, DeviceError> {
        let entry = self.shared.registry.get(name)?;
        entry.touch();
        match entry.device() {
            Device::Block(reader) => Ok(reader.answer(name, offset, length, data)),
            _ => Err(DeviceError::NotPermitted {
                name: name.to_string(),
                kind: entry.kind().as_str(),
            }),
        }
    }

    /// Fail one block read.
    pub fn fail_block(
        &self,
        name: &str,
        offset: u64,
        length: usize,
        error: HostError,
    ) -> Result<bool, DeviceError> {
        let entry = self.shared.registry.get(name)?;
        entry.touch();
        match entry.device() {
            Device::Block(reader) => Ok(reader.fail(name, offset, length, error)),
            _ => Err(DeviceError::NotPermitted {
                name: name.to_string(),
                kind: entry.kind().as_str(),
            }),
        }
    }

    /// Tell the bridge the host is still working on this device.
    pub fn keepalive(&self, name: &str) -> Result<(), DeviceError> {
        self.shared.registry.get(name)?.touch();
        Ok(())
    }

    /// Requests on `name` still awaiting the host.
    pub fn outstanding(&self, name: &str) -> Result<usize, DeviceError> {
        Ok(self.shared.registry.get(name)?.device().outstanding())
    }

    /// Whether any device has a request awaiting the host.
    pub fn is_waiting(&self) -> bool {
        self.shared
            .registry
            .entries()
            .iter()
            .any(|entry| entry.device().outstanding() > 0)
    }

    /// Stop serving. Parked and future engine calls fail with ETIMEDOUT.
    pub fn shutdown(&self) {
        if self.shared.parker.is_shut_down() {
            return;
        }
        self.shared.parker.shutdown();
        BridgeShutdown {
            devices: self.shared.registry.len(),
        }
        .log();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.parker.is_shut_down()
    }

    /// Take the application error a hook raised during the last engine run.
    pub fn take_thrown_error(&self) -> Option<HostError> {
        self.shared.take_thrown()
    }

    /// Run engine work on a blocking thread and await its result.
    ///
    /// Runs are serialized: a second call waits for the first to finish.
    /// If a hook raised an application error during the run, that error
    /// is returned verbatim instead of the errno the engine saw.
    pub async fn run_engine<F, T>(&self, job: F) -> Result<T, OperationError>
    where
        F: FnOnce(Engine) -> Result<T, Errno> + Send + 'static,
        T: Send + 'static,
    {
        let _serial = self.shared.serial.lock().await;
        self.shared.take_thrown();

        let engine = self.engine();
        let outcome = self
            .runtime()
            .spawn_blocking(move || job(engine))
            .await?;

        match (outcome, self.shared.take_thrown()) {
            (_, Some(thrown)) => Err(OperationError::Host(thrown)),
            (Ok(value), None) => Ok(value),
            (Err(errno), None) => Err(OperationError::Errno(errno)),
        }
    }
}

impl fmt::Debug for DeviceBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceBridge")
            .field("devices", &self.shared.registry.names())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
