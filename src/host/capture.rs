// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::errors::HostError;
use crate::traits::DeviceHooks;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Host hooks that keep everything written to writer devices in memory.
///
/// Writes land at their offset; gaps are zero-filled. Useful for tests and
/// for collecting small outputs such as generated frames.
#[derive(Debug, Default)]
pub struct CaptureSink {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn files(&self) -> MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn contents(&self, name: &str) -> Option<Vec<u8>> {
        self.files().get(name).cloned()
    }

    /// Remove and return what was captured for `name`.
    pub fn take(&self, name: &str) -> Option<Vec<u8>> {
        self.files().remove(name)
    }

    pub fn file_names(&self) -> Vec<String> {
        self.files().keys().cloned().collect()
    }
}

impl DeviceHooks for CaptureSink {
    fn on_write(&self, name: &str, offset: u64, data: &[u8]) -> Result<(), HostError> {
        let (start, end) = usize::try_from(offset)
            .ok()
            .and_then(|start| Some((start, start.checked_add(data.len())?)))
            .ok_or_else(|| HostError::message("write offset out of range"))?;
        let mut files = self.files();
        let file = files.entry(name.to_string()).or_default();
        if file.len() < end {
            file.resize(end, 0);
        }
        file[start..end].copy_from_slice(data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_land_at_their_offset() {
        let sink = CaptureSink::new();
        sink.on_write("w", 0, b"hello").unwrap();
        sink.on_write("w", 7, b"!!").unwrap();
        sink.on_write("w", 1, b"E").unwrap();

        assert_eq!(sink.contents("w").unwrap(), b"hEllo\0\0!!".to_vec());
        assert_eq!(sink.file_names(), vec!["w".to_string()]);
        assert!(sink.take("w").is_some());
        assert!(sink.contents("w").is_none());
    }

    #[test]
    fn reads_are_not_served() {
        let sink = CaptureSink::new();
        assert!(sink.on_block_read("w", 0, 4).is_err());
    }
}
