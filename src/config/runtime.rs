// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::bridge::DeviceBridge;
use crate::config::BridgeConfig;
use crate::errors::DeviceError;
use tokio::runtime::Handle;

/// Bridge runtime builder - creates a bridge and its configured devices.
///
/// The `RuntimeBuilder` turns a [`BridgeConfig`] into a ready [`DeviceBridge`]:
/// the liveness policy is applied, every configured device is registered and
/// every writer filesystem is mounted. Hooks are left to the caller.
///
/// # Examples
///
/// ```
/// use vdev_bridge::config::{BridgeConfig, RuntimeBuilder};
///
/// # #[tokio::main]
/// # async fn main() {
/// let config: BridgeConfig = serde_yaml::from_str(r#"
/// devices:
///   - name: live.ts
///     kind: sequential_reader
/// "#).unwrap();
///
/// let bridge = RuntimeBuilder::from_config(&config, tokio::runtime::Handle::current()).unwrap();
/// assert!(bridge.registry().contains("live.ts"));
/// # }
/// ```
pub struct RuntimeBuilder;

impl RuntimeBuilder {
    /// Build a bridge from configuration.
    ///
    /// # Arguments
    /// * `cfg` - Liveness policy, devices and mounts
    /// * `runtime` - Runtime the host side of the bridge lives on
    ///
    /// # Returns
    /// The bridge, or the first device or mount that could not be created
    pub fn from_config(cfg: &BridgeConfig, runtime: Handle) -> Result<DeviceBridge, DeviceError> {
        let bridge = DeviceBridge::new(&cfg.liveness, runtime);
        for device in &cfg.devices {
            bridge.make_device(&device.name, device.kind, device.options())?;
        }
        for mount in &cfg.mounts {
            bridge.mount_writer_fs_with_mode(
                &mount.mount_point,
                mount.pattern.as_deref(),
                mount.mode,
            )?;
        }
        Ok(bridge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::DeviceKind;
    use crate::errors::Errno;

    #[tokio::test]
    async fn builds_devices_and_mounts() {
        let cfg: BridgeConfig = serde_yaml::from_str(
            r#"
devices:
  - name: input.bin
    kind: block_reader
    size: 10
mounts:
  - mount_point: /out
    pattern: "%02d.bin"
"#,
        )
        .unwrap();

        let bridge = RuntimeBuilder::from_config(&cfg, Handle::current()).unwrap();
        let stat = bridge.engine().stat("input.bin").unwrap();
        assert_eq!(stat.kind, DeviceKind::BlockReader);
        assert_eq!(stat.size, Some(10));
        assert!(bridge.writer_fs_files("/out").unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_device_stops_the_build() {
        let cfg: BridgeConfig = serde_yaml::from_str(
            r#"
devices:
  - name: a
    kind: writer
  - name: a
    kind: writer
"#,
        )
        .unwrap();

        let err = RuntimeBuilder::from_config(&cfg, Handle::current()).unwrap_err();
        assert_eq!(err.errno(), Errno::EBUSY);
    }
}
