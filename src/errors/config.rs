// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt;

/// Errors that can occur during bridge configuration validation
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A device name is empty
    EmptyDeviceName {
        /// Position of the device in the configuration list
        index: usize,
    },
    /// Two devices share the same name
    DuplicateDeviceName {
        /// The duplicated device name
        name: String,
    },
    /// A block reader declares a zero outstanding-request limit
    ZeroOutstandingLimit {
        /// The block reader device name
        name: String,
    },
    /// A mount point is not an absolute path
    RelativeMountPoint {
        /// The offending mount point
        mount_point: String,
    },
    /// Two mounts share the same mount point
    DuplicateMountPoint {
        /// The duplicated mount point
        mount_point: String,
    },
    /// A writer filesystem pattern cannot be parsed
    InvalidPattern {
        /// The mount point owning the pattern
        mount_point: String,
        /// The pattern as written
        pattern: String,
        /// Why parsing failed
        reason: String,
    },
    /// A device lives underneath a mount point and would be shadowed by it
    ShadowedDevice {
        /// The device name
        name: String,
        /// The mount point that covers it
        mount_point: String,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyDeviceName { index } => {
                write!(f, "Device #{} has an empty name", index)
            }
            ValidationError::DuplicateDeviceName { name } => {
                write!(f, "Duplicate device name: '{}'", name)
            }
            ValidationError::ZeroOutstandingLimit { name } => {
                write!(
                    f,
                    "Block reader '{}' sets max_outstanding to 0; at least one is required",
                    name
                )
            }
            ValidationError::RelativeMountPoint { mount_point } => {
                write!(f, "Mount point '{}' must be an absolute path", mount_point)
            }
            ValidationError::DuplicateMountPoint { mount_point } => {
                write!(f, "Duplicate mount point: '{}'", mount_point)
            }
            ValidationError::InvalidPattern {
                mount_point,
                pattern,
                reason,
            } => {
                write!(
                    f,
                    "Invalid pattern '{}' for mount '{}': {}",
                    pattern, mount_point, reason
                )
            }
            ValidationError::ShadowedDevice { name, mount_point } => {
                write!(
                    f,
                    "Device '{}' is inside mount point '{}' and would never be reached",
                    name, mount_point
                )
            }
        }
    }
}

impl std::error::Error for ValidationError {}
