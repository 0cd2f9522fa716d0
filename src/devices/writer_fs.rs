// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::devices::{FilenamePattern, WriterMode};
use crate::errors::DeviceError;
use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A mount point under which writer devices appear on first write.
///
/// With a pattern, only names that fit it may be created; without one, any
/// direct child name is accepted. Nested paths are never created.
#[derive(Debug)]
pub struct WriterFilesystem {
    mount_point: String,
    pattern: Option<FilenamePattern>,
    mode: WriterMode,
    files: Mutex<BTreeSet<String>>,
}

impl WriterFilesystem {
    pub fn new(
        mount_point: &str,
        pattern: Option<&str>,
        mode: WriterMode,
    ) -> Result<Self, DeviceError> {
        let trimmed = mount_point.trim_end_matches('/');
        if !mount_point.starts_with('/') || trimmed.is_empty() {
            return Err(DeviceError::InvalidArgument {
                name: mount_point.to_string(),
                reason: "mount point must be an absolute path below '/'".to_string(),
            });
        }
        let pattern = pattern
            .map(FilenamePattern::parse)
            .transpose()
            .map_err(|reason| DeviceError::InvalidArgument {
                name: mount_point.to_string(),
                reason,
            })?;
        Ok(Self {
            mount_point: trimmed.to_string(),
            pattern,
            mode,
            files: Mutex::new(BTreeSet::new()),
        })
    }

    fn files(&self) -> MutexGuard<'_, BTreeSet<String>> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn mount_point(&self) -> &str {
        &self.mount_point
    }

    pub fn pattern(&self) -> Option<&FilenamePattern> {
        self.pattern.as_ref()
    }

    pub fn mode(&self) -> WriterMode {
        self.mode
    }

    /// The file name relative to this mount, if `name` is a direct child of it.
    pub fn relative<'a>(&self, name: &'a str) -> Option<&'a str> {
        let rest = name.strip_prefix(self.mount_point.as_str())?.strip_prefix('/')?;
        (!rest.is_empty() && !rest.contains('/')).then_some(rest)
    }

    /// Check that `name` may be created here, returning its pattern index.
    pub(crate) fn admit(&self, name: &str) -> Result<Option<u64>, DeviceError> {
        let relative = self.relative(name).ok_or_else(|| DeviceError::NoSuchFile {
            name: name.to_string(),
        })?;
        match &self.pattern {
            None => Ok(None),
            Some(pattern) => pattern
                .index_of(relative)
                .map(Some)
                .ok_or_else(|| DeviceError::PatternMismatch {
                    name: name.to_string(),
                    pattern: pattern.to_string(),
                }),
        }
    }

    pub(crate) fn record(&self, name: &str) {
        self.files().insert(name.to_string());
    }

    pub(crate) fn forget(&self, name: &str) {
        self.files().remove(name);
    }

    /// Full names of the files created under this mount, sorted.
    pub fn file_names(&self) -> Vec<String> {
        self.files().iter().cloned().collect()
    }
}
