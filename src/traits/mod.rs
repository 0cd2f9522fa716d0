// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod async_hooks;
pub mod hooks;

pub use async_hooks::AsyncDeviceHooks;
pub use hooks::DeviceHooks;
