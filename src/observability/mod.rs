// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Observability module for structured logging and tracing.
//!
//! This module provides centralized message types for all diagnostic and
//! operational logging in the bridge. Message types follow a struct-based
//! pattern with a `Display` implementation so that log text lives in one
//! place instead of being scattered through the device code.
//!
//! # Architecture
//!
//! Messages are organized by subsystem:
//! * `messages::bridge` - blocking calls, parking and liveness
//! * `messages::device` - device lifecycle and protocol anomalies
//! * `messages::registry` - writer filesystem mounts and lookups
//!
//! # Usage
//!
//! ```rust
//! use vdev_bridge::observability::messages::device::StaleBlockAnswer;
//!
//! let msg = StaleBlockAnswer {
//!     device: "input.webm",
//!     offset: 0,
//!     length: 4096,
//! };
//!
//! tracing::warn!("{}", msg);
//! ```

pub mod messages;
