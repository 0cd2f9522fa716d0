// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! POSIX-style error numbers handed to the engine.
//!
//! The engine's syscall emulation only understands numeric codes, so every
//! failure that crosses the engine boundary is reduced to one of these. The
//! numbering follows Linux.

use std::fmt;

/// Error numbers understood by the engine's syscall layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Errno {
    /// Operation not permitted (wrong open mode for the device kind).
    EPERM = 1,
    /// No such file or directory.
    ENOENT = 2,
    /// Input/output error.
    EIO = 5,
    /// Bad file descriptor.
    EBADF = 9,
    /// Resource temporarily unavailable.
    EAGAIN = 11,
    /// Permission denied.
    EACCES = 13,
    /// Device or resource busy.
    EBUSY = 16,
    /// No such device. Used when a device disappears under a pending request.
    ENODEV = 19,
    /// Invalid argument.
    EINVAL = 22,
    /// Illegal seek.
    ESPIPE = 29,
    /// Operation not supported.
    ENOTSUP = 95,
    /// Timed out. Used when the host stops responding.
    ETIMEDOUT = 110,
    /// Operation canceled. Used when an application error is passed through.
    ECANCELED = 125,
}

impl Errno {
    const ALL: [Errno; 13] = [
        Errno::EPERM,
        Errno::ENOENT,
        Errno::EIO,
        Errno::EBADF,
        Errno::EAGAIN,
        Errno::EACCES,
        Errno::EBUSY,
        Errno::ENODEV,
        Errno::EINVAL,
        Errno::ESPIPE,
        Errno::ENOTSUP,
        Errno::ETIMEDOUT,
        Errno::ECANCELED,
    ];

    /// Numeric value as seen by the engine.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// The negated code, as returned by syscalls that report `-errno`.
    pub fn as_negative(self) -> i32 {
        -(self as i32)
    }

    /// Look up an errno by its numeric value. Negative values are accepted.
    pub fn from_code(code: i32) -> Option<Self> {
        let code = code.unsigned_abs();
        Self::ALL
            .iter()
            .copied()
            .find(|e| e.code().unsigned_abs() == code)
    }

    /// Human readable description, in the style of `strerror(3)`.
    pub fn describe(self) -> &'static str {
        match self {
            Errno::EPERM => "Operation not permitted",
            Errno::ENOENT => "No such file or directory",
            Errno::EIO => "Input/output error",
            Errno::EBADF => "Bad file descriptor",
            Errno::EAGAIN => "Resource temporarily unavailable",
            Errno::EACCES => "Permission denied",
            Errno::EBUSY => "Device or resource busy",
            Errno::ENODEV => "No such device",
            Errno::EINVAL => "Invalid argument",
            Errno::ESPIPE => "Illegal seek",
            Errno::ENOTSUP => "Operation not supported",
            Errno::ETIMEDOUT => "Connection timed out",
            Errno::ECANCELED => "Operation canceled",
        }
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (errno {})", self.describe(), self.code())
    }
}

impl std::error::Error for Errno {}
