// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Ready-made host implementations.
//!
//! * [`CaptureSink`] - collects writer output in memory
//! * [`FileWriter`] - writes a writer device's output to a local file, in order
//! * [`ReadaheadFile`] - serves a local file as a block reader with prefetch
//! * [`SpawnedHooks`] - runs [`crate::traits::AsyncDeviceHooks`] as spawned tasks

mod capture;
mod file_writer;
mod readahead;
mod spawned;

pub use capture::CaptureSink;
pub use file_writer::FileWriter;
pub use readahead::ReadaheadFile;
pub use spawned::SpawnedHooks;
