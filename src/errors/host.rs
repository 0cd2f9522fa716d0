// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Failures reported by the host and their translation onto errno values.

use crate::errors::Errno;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// The fixed set of failure categories a host may report.
///
/// Each category has a well-defined errno. Anything the host reports outside
/// this set travels as [`HostError::Application`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    NoSuchFile,
    PermissionDenied,
    Io,
    BadDescriptor,
    NotSupported,
}

impl ErrorCategory {
    pub fn errno(self) -> Errno {
        match self {
            ErrorCategory::NoSuchFile => Errno::ENOENT,
            ErrorCategory::PermissionDenied => Errno::EACCES,
            ErrorCategory::Io => Errno::EIO,
            ErrorCategory::BadDescriptor => Errno::EBADF,
            ErrorCategory::NotSupported => Errno::ENOTSUP,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ErrorCategory::NoSuchFile => "no such file",
            ErrorCategory::PermissionDenied => "permission denied",
            ErrorCategory::Io => "I/O error",
            ErrorCategory::BadDescriptor => "bad file descriptor",
            ErrorCategory::NotSupported => "not supported",
        };
        f.write_str(text)
    }
}

/// An error raised by host code, either from a hook or passed into a resolution.
#[derive(Debug, Clone, Error)]
pub enum HostError {
    /// One of the known categories.
    #[error("host reported {0}")]
    Category(ErrorCategory),

    /// An explicit error number chosen by the host.
    #[error("host reported {0}")]
    Errno(Errno),

    /// Anything else. Kept verbatim so the async caller sees it unchanged.
    #[error(transparent)]
    Application(Arc<dyn std::error::Error + Send + Sync>),
}

impl HostError {
    /// Wrap an arbitrary application error.
    pub fn application<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        HostError::Application(Arc::new(error))
    }

    /// Wrap a plain message as an application error.
    pub fn message(message: impl Into<String>) -> Self {
        HostError::Application(Arc::new(ApplicationMessage(message.into())))
    }

    /// Errno the engine sees for this error.
    ///
    /// Application errors have no meaningful errno; the engine gets
    /// `ECANCELED` and the error itself is re-raised to the async caller.
    pub fn errno(&self) -> Errno {
        match self {
            HostError::Category(category) => category.errno(),
            HostError::Errno(errno) => *errno,
            HostError::Application(_) => Errno::ECANCELED,
        }
    }

    /// The verbatim application error, when there is one.
    pub fn as_application(&self) -> Option<&Arc<dyn std::error::Error + Send + Sync>> {
        match self {
            HostError::Application(inner) => Some(inner),
            _ => None,
        }
    }
}

impl From<ErrorCategory> for HostError {
    fn from(category: ErrorCategory) -> Self {
        HostError::Category(category)
    }
}

impl From<Errno> for HostError {
    fn from(errno: Errno) -> Self {
        HostError::Errno(errno)
    }
}

impl From<std::io::Error> for HostError {
    fn from(error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::NotFound => HostError::Category(ErrorCategory::NoSuchFile),
            std::io::ErrorKind::PermissionDenied => {
                HostError::Category(ErrorCategory::PermissionDenied)
            }
            std::io::ErrorKind::Unsupported => HostError::Category(ErrorCategory::NotSupported),
            _ => HostError::application(error),
        }
    }
}

/// Plain-text application error created by [`HostError::message`].
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ApplicationMessage(pub String);
