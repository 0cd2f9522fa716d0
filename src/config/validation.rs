// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Configuration validation for bridge startup.
//!
//! Validation runs every check and reports all problems at once, so a
//! broken configuration can be fixed in one pass. The checks are:
//!
//! 1. **Device names**: non-empty and unique
//! 2. **Limits**: block readers must allow at least one outstanding request
//! 3. **Mounts**: absolute, unique, with a parseable pattern
//! 4. **Shadowing**: no configured device may live directly under a mount
//!
//! # Examples
//!
//! ```rust
//! use vdev_bridge::config::{validate_config, BridgeConfig};
//!
//! let config: BridgeConfig = serde_yaml::from_str(r#"
//! devices:
//!   - name: input.webm
//!     kind: block_reader
//! mounts:
//!   - mount_point: /out
//!     pattern: "%03d.bin"
//! "#).unwrap();
//!
//! assert!(validate_config(&config).is_ok());
//! ```

use crate::config::BridgeConfig;
use crate::devices::{DeviceKind, FilenamePattern, WriterFilesystem, WriterMode};
use crate::errors::ValidationError;
use std::collections::HashSet;

/// Validate a bridge configuration, collecting every problem found.
pub fn validate_config(config: &BridgeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    validate_devices(config, &mut errors);
    validate_mounts(config, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_devices(config: &BridgeConfig, errors: &mut Vec<ValidationError>) {
    let mut seen = HashSet::new();
    for (index, device) in config.devices.iter().enumerate() {
        if device.name.is_empty() {
            errors.push(ValidationError::EmptyDeviceName { index });
            continue;
        }
        if !seen.insert(device.name.as_str()) {
            errors.push(ValidationError::DuplicateDeviceName {
                name: device.name.clone(),
            });
        }
        if device.kind == DeviceKind::BlockReader && device.max_outstanding == Some(0) {
            errors.push(ValidationError::ZeroOutstandingLimit {
                name: device.name.clone(),
            });
        }
    }
}

fn validate_mounts(config: &BridgeConfig, errors: &mut Vec<ValidationError>) {
    let mut seen = HashSet::new();
    for mount in &config.mounts {
        let key = mount.mount_point.trim_end_matches('/');
        if !mount.mount_point.starts_with('/') || key.is_empty() {
            errors.push(ValidationError::RelativeMountPoint {
                mount_point: mount.mount_point.clone(),
            });
            continue;
        }
        if !seen.insert(key) {
            errors.push(ValidationError::DuplicateMountPoint {
                mount_point: mount.mount_point.clone(),
            });
        }
        if let Some(pattern) = &mount.pattern {
            if let Err(reason) = FilenamePattern::parse(pattern) {
                errors.push(ValidationError::InvalidPattern {
                    mount_point: mount.mount_point.clone(),
                    pattern: pattern.clone(),
                    reason,
                });
                continue;
            }
        }

        // Only the path shape matters here; the pattern was checked above.
        let Ok(fs) = WriterFilesystem::new(&mount.mount_point, None, WriterMode::RandomAccess)
        else {
            continue;
        };
        for device in &config.devices {
            if fs.relative(&device.name).is_some() {
                errors.push(ValidationError::ShadowedDevice {
                    name: device.name.clone(),
                    mount_point: mount.mount_point.clone(),
                });
            }
        }
    }
}
