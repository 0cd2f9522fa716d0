// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod config;
mod device;
mod errno;
mod host;
mod operation;

pub use config::ValidationError;
pub use device::DeviceError;
pub use errno::Errno;
pub use host::{ApplicationMessage, ErrorCategory, HostError};
pub use operation::OperationError;
