// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Name-keyed registry of devices and writer filesystem mounts.
//!
//! Creation, removal, mounting and lazy writer creation all take the write
//! lock, so they are serialized against each other and against lookups.
//! Cancelling a removed device's requests happens after the lock is
//! released; the device's own closed flag keeps late callers out.

use crate::devices::{DeviceEntry, DeviceKind, DeviceOptions, WriterFilesystem};
use crate::errors::DeviceError;
use crate::observability::messages::device::{DeviceCreated, DeviceRemoved};
use crate::observability::messages::registry::{
    UnknownDevice, WriterFileCreated, WriterFsMounted, WriterFsUnmounted,
};
use crate::observability::messages::StructuredLog;
use crate::traits::DeviceHooks;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct RegistryInner {
    devices: HashMap<String, Arc<DeviceEntry>>,
    mounts: BTreeMap<String, Arc<WriterFilesystem>>,
}

/// All devices known to one bridge.
#[derive(Default)]
pub struct DeviceRegistry {
    inner: RwLock<RegistryInner>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new device. Fails if the name is taken.
    pub fn create(
        &self,
        name: &str,
        kind: DeviceKind,
        options: &DeviceOptions,
        hooks: Option<Arc<dyn DeviceHooks>>,
    ) -> Result<Arc<DeviceEntry>, DeviceError> {
        if name.is_empty() {
            return Err(DeviceError::InvalidArgument {
                name: String::new(),
                reason: "device name must not be empty".to_string(),
            });
        }
        let mut inner = self.write();
        if inner.devices.contains_key(name) {
            return Err(DeviceError::AlreadyExists {
                name: name.to_string(),
            });
        }
        let entry = Arc::new(DeviceEntry::new(name, kind, options, hooks, None));
        inner.devices.insert(name.to_string(), Arc::clone(&entry));
        drop(inner);

        DeviceCreated {
            name,
            kind: kind.as_str(),
        }
        .log();
        Ok(entry)
    }

    pub fn get(&self, name: &str) -> Result<Arc<DeviceEntry>, DeviceError> {
        match self.read().devices.get(name) {
            Some(entry) => Ok(Arc::clone(entry)),
            None => {
                UnknownDevice { name }.log();
                Err(DeviceError::NoSuchFile {
                    name: name.to_string(),
                })
            }
        }
    }

    /// Look up a device for writing, creating it under a matching mount if needed.
    pub fn get_or_create_writer(&self, name: &str) -> Result<Arc<DeviceEntry>, DeviceError> {
        if let Some(entry) = self.read().devices.get(name) {
            return Ok(Arc::clone(entry));
        }

        let mut inner = self.write();
        if let Some(entry) = inner.devices.get(name) {
            return Ok(Arc::clone(entry));
        }
        let mount = inner
            .mounts
            .values()
            .find(|fs| fs.relative(name).is_some())
            .cloned();
        let Some(fs) = mount else {
            drop(inner);
            UnknownDevice { name }.log();
            return Err(DeviceError::NoSuchFile {
                name: name.to_string(),
            });
        };

        let index = fs.admit(name)?;
        let options = DeviceOptions {
            writer_mode: fs.mode(),
            ..DeviceOptions::default()
        };
        let entry = Arc::new(DeviceEntry::new(
            name,
            DeviceKind::Writer,
            &options,
            None,
            Some(fs.mount_point()),
        ));
        inner.devices.insert(name.to_string(), Arc::clone(&entry));
        fs.record(name);
        drop(inner);

        WriterFileCreated {
            mount_point: fs.mount_point(),
            name,
            index,
        }
        .log();
        Ok(entry)
    }

    /// Remove a device and fail its outstanding requests with "device gone".
    ///
    /// Refused while the device has open handles.
    pub fn remove(&self, name: &str) -> Result<Arc<DeviceEntry>, DeviceError> {
        let mut inner = self.write();
        let entry = inner
            .devices
            .get(name)
            .cloned()
            .ok_or_else(|| DeviceError::NoSuchFile {
                name: name.to_string(),
            })?;
        let open_handles = entry.open_handles();
        if open_handles > 0 {
            return Err(DeviceError::Busy {
                name: name.to_string(),
                open_handles,
            });
        }
        inner.devices.remove(name);
        let fs = entry.mount().and_then(|m| inner.mounts.get(m).cloned());
        drop(inner);

        if let Some(fs) = fs {
            fs.forget(name);
        }
        let cancelled = entry.retire();
        DeviceRemoved {
            name,
            kind: entry.kind().as_str(),
            cancelled,
        }
        .log();
        Ok(entry)
    }

    /// Take an open handle on `entry` unless it was removed meanwhile.
    ///
    /// Holds the read lock, so it cannot interleave with the open-handle
    /// check in [`remove`](Self::remove) or [`unmount`](Self::unmount).
    pub(crate) fn pin(&self, entry: &Arc<DeviceEntry>) -> Result<(), DeviceError> {
        let inner = self.read();
        let registered = inner
            .devices
            .get(entry.name())
            .is_some_and(|current| Arc::ptr_eq(current, entry));
        if !registered || entry.is_removed() {
            return Err(DeviceError::DeviceGone {
                name: entry.name().to_string(),
            });
        }
        entry.acquire_handle();
        Ok(())
    }

    pub fn mount(&self, fs: WriterFilesystem) -> Result<Arc<WriterFilesystem>, DeviceError> {
        let mut inner = self.write();
        if inner.mounts.contains_key(fs.mount_point()) {
            return Err(DeviceError::AlreadyExists {
                name: fs.mount_point().to_string(),
            });
        }
        let fs = Arc::new(fs);
        inner
            .mounts
            .insert(fs.mount_point().to_string(), Arc::clone(&fs));
        drop(inner);

        WriterFsMounted {
            mount_point: fs.mount_point(),
            pattern: fs.pattern().map(|p| p.as_str()),
        }
        .log();
        Ok(fs)
    }

    /// Unmount and remove every device created under the mount.
    ///
    /// Refused, with nothing removed, if any of those devices is open.
    pub fn unmount(&self, mount_point: &str) -> Result<Vec<Arc<DeviceEntry>>, DeviceError> {
        let key = mount_point.trim_end_matches('/');
        let mut inner = self.write();
        if !inner.mounts.contains_key(key) {
            return Err(DeviceError::NoSuchFile {
                name: mount_point.to_string(),
            });
        }

        let owned: Vec<Arc<DeviceEntry>> = inner
            .devices
            .values()
            .filter(|entry| entry.mount() == Some(key))
            .cloned()
            .collect();
        if let Some(busy) = owned.iter().find(|entry| entry.open_handles() > 0) {
            return Err(DeviceError::Busy {
                name: busy.name().to_string(),
                open_handles: busy.open_handles(),
            });
        }
        for entry in &owned {
            inner.devices.remove(entry.name());
        }
        inner.mounts.remove(key);
        drop(inner);

        for entry in &owned {
            let cancelled = entry.retire();
            DeviceRemoved {
                name: entry.name(),
                kind: entry.kind().as_str(),
                cancelled,
            }
            .log();
        }
        WriterFsUnmounted {
            mount_point: key,
            removed: owned.len(),
        }
        .log();
        Ok(owned)
    }

    pub fn mount_for(&self, mount_point: &str) -> Option<Arc<WriterFilesystem>> {
        self.read()
            .mounts
            .get(mount_point.trim_end_matches('/'))
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().devices.contains_key(name)
    }

    /// Registered device names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().devices.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.read().devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().devices.is_empty()
    }

    pub(crate) fn entries(&self) -> Vec<Arc<DeviceEntry>> {
        self.read().devices.values().cloned().collect()
    }
}
