// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod bridge;     // suspend/resume bridge: host and engine handles
pub mod config;     // config + runtime builder
pub mod devices;    // device kinds and per-device state
pub mod errors;     // error handling
pub mod host;       // ready-made host implementations
pub mod observability;
pub mod registry;   // name-keyed devices and writer mounts
pub mod traits;     // host hook abstractions
