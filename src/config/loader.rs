// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::config::consts::{DEFAULT_LIVENESS_TICK_MS, MAX_LIVENESS_TICK_MS, MIN_LIVENESS_TICK_MS};
use crate::devices::{DeviceKind, DeviceOptions, WriterMode};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure for a device bridge.
///
/// Describes the liveness policy for parked engine calls, the devices to
/// create up front and the writer filesystems to mount. It is typically
/// loaded from a YAML, JSON or TOML file.
///
/// # Fields
/// * `liveness` - Tick interval and host deadline (optional, defaults apply)
/// * `devices` - Devices to register at startup
/// * `mounts` - Writer filesystems to mount at startup
///
/// # Example
/// ```yaml
/// liveness:
///   tick_ms: 50
///   host_deadline_ms: 30000
/// devices:
///   - name: input.webm
///     kind: block_reader
///     size: 1048576
///     max_outstanding: 8
///   - name: live.ts
///     kind: sequential_reader
/// mounts:
///   - mount_point: /frames
///     pattern: "%06d.png"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub liveness: LivenessConfig,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
    #[serde(default)]
    pub mounts: Vec<MountConfig>,
}

/// Liveness policy for parked engine calls.
///
/// A parked call wakes once per tick to check that its device still exists
/// and, when a deadline is set, that the host has done something for the
/// device recently. Sends, failures and keepalives all count as activity.
///
/// # Fields
/// * `tick_ms` - Wake-up interval (defaults to 100 ms, clamped to [1, 10000])
/// * `host_deadline_ms` - Inactivity limit; absent means wait forever
///
/// # Example
/// ```
/// use vdev_bridge::config::LivenessConfig;
///
/// let config = LivenessConfig { tick_ms: Some(0), host_deadline_ms: None };
/// assert_eq!(config.get_tick().as_millis(), 1); // Clamped to minimum
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LivenessConfig {
    pub tick_ms: Option<u64>,
    pub host_deadline_ms: Option<u64>,
}

impl LivenessConfig {
    /// Tick interval, clamped to the allowed bounds.
    pub fn get_tick(&self) -> Duration {
        let ms = self
            .tick_ms
            .unwrap_or(DEFAULT_LIVENESS_TICK_MS)
            .clamp(MIN_LIVENESS_TICK_MS, MAX_LIVENESS_TICK_MS);
        Duration::from_millis(ms)
    }

    /// Host inactivity deadline, if one is configured.
    pub fn get_host_deadline(&self) -> Option<Duration> {
        self.host_deadline_ms.map(Duration::from_millis)
    }
}

/// Configuration for a single device.
///
/// # Fields
/// * `name` - Unique file name the engine will use
/// * `kind` - `sequential_reader`, `block_reader` or `writer`
/// * `size` - Declared size (block readers)
/// * `max_outstanding` - Concurrent request cap (block readers)
/// * `mode` - `random_access` or `stream` (writers)
/// * `host_deadline_ms` - Overrides the bridge-wide deadline for this device
///
/// # Example
/// ```yaml
/// name: out.mkv
/// kind: writer
/// mode: stream
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    pub name: String,
    pub kind: DeviceKind,
    pub size: Option<u64>,
    pub max_outstanding: Option<usize>,
    #[serde(default)]
    pub mode: WriterMode,
    pub host_deadline_ms: Option<u64>,
}

impl DeviceConfig {
    pub fn options(&self) -> DeviceOptions {
        DeviceOptions {
            size: self.size,
            max_outstanding: self.max_outstanding,
            writer_mode: self.mode,
            host_deadline: self.host_deadline_ms.map(Duration::from_millis),
        }
    }
}

/// Configuration for a writer filesystem mount.
///
/// # Fields
/// * `mount_point` - Absolute directory path
/// * `pattern` - Optional file name pattern such as `%03d.bin`
/// * `mode` - Positioning rule for generated writers
#[derive(Debug, Clone, Deserialize)]
pub struct MountConfig {
    pub mount_point: String,
    pub pattern: Option<String>,
    #[serde(default)]
    pub mode: WriterMode,
}

/// Load a config file, choosing the format from its extension.
///
/// `.json` and `.toml` are parsed as such; anything else is read as YAML.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<BridgeConfig, Box<dyn std::error::Error>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    let cfg = match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => serde_json::from_str(&content)?,
        Some("toml") => toml::from_str(&content)?,
        _ => serde_yaml::from_str(&content)?,
    };
    Ok(cfg)
}

/// Load and validate a config file
///
/// This function loads the configuration and checks device names, limits
/// and mount points before anything is created.
pub fn load_and_validate_config<P: AsRef<Path>>(
    path: P,
) -> Result<BridgeConfig, Box<dyn std::error::Error>> {
    let cfg = load_config(path)?;

    if let Err(validation_errors) = crate::config::validate_config(&cfg) {
        let error_messages: Vec<String> = validation_errors.iter().map(|e| e.to_string()).collect();
        let combined_error = format!(
            "Configuration validation failed:\n{}",
            error_messages.join("\n")
        );
        return Err(combined_error.into());
    }

    Ok(cfg)
}
