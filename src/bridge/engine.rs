// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::bridge::pending::{Completion, PendingRequest, RequestOp, Resolution, Waiter};
use crate::bridge::BridgeShared;
use crate::devices::{
    Admission, BlockReader, Capabilities, Device, DeviceEntry, DeviceKind, SequentialReader,
    Writer,
};
use crate::errors::{DeviceError, Errno, ErrorCategory, HostError};
use crate::observability::messages::bridge::HookFailed;
use crate::observability::messages::StructuredLog;
use bytes::Bytes;
use std::fmt;
use std::io::SeekFrom;
use std::sync::Arc;

/// Engine-side handle to the bridge.
///
/// Every call blocks the current thread until the host answers, so it must
/// run on a blocking thread such as one from
/// [`DeviceBridge::run_engine`](crate::bridge::DeviceBridge::run_engine).
/// Failures are reported as [`Errno`] values; richer context goes to the log.
#[derive(Clone)]
pub struct Engine {
    shared: Arc<BridgeShared>,
}

/// How a file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
}

/// What the engine can learn about a file without reading it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub kind: DeviceKind,
    /// Declared size for block readers, bytes written so far for writers.
    pub size: Option<u64>,
    pub capabilities: Capabilities,
}

enum Call<'a> {
    Read { length: usize },
    ReadAt { offset: u64, length: usize },
    Write { offset: u64, data: &'a [u8] },
}

impl Engine {
    pub(crate) fn new(shared: Arc<BridgeShared>) -> Self {
        Self { shared }
    }

    /// Read the next `length` bytes from a sequential reader.
    ///
    /// Returns fewer bytes only at end of stream, and an empty buffer after it.
    pub fn read(&self, name: &str, length: usize) -> Result<Bytes, Errno> {
        let entry = self.lookup(name)?;
        self.call(&entry, Call::Read { length })
            .map(Completion::into_bytes)
            .map_err(|err| self.translate(err))
    }

    /// Read `length` bytes at `offset`.
    ///
    /// Sequential readers only accept their current position.
    pub fn read_at(&self, name: &str, offset: u64, length: usize) -> Result<Bytes, Errno> {
        let entry = self.lookup(name)?;
        self.call(&entry, Call::ReadAt { offset, length })
            .map(Completion::into_bytes)
            .map_err(|err| self.translate(err))
    }

    /// Write `data` at `offset`, creating the file under a writer mount if needed.
    pub fn write(&self, name: &str, offset: u64, data: &[u8]) -> Result<usize, Errno> {
        let entry = self
            .shared
            .registry
            .get_or_create_writer(name)
            .map_err(|err| self.translate(err))?;
        self.call(&entry, Call::Write { offset, data })
            .map(|done| done.written())
            .map_err(|err| self.translate(err))
    }

    /// Open a file. The device cannot be removed while the handle is alive.
    pub fn open(&self, name: &str, mode: OpenMode) -> Result<OpenFile, Errno> {
        let entry = match mode {
            OpenMode::Read => self.lookup(name)?,
            OpenMode::Write => self
                .shared
                .registry
                .get_or_create_writer(name)
                .map_err(|err| self.translate(err))?,
        };

        let capabilities = entry.device().capabilities();
        let allowed = match mode {
            OpenMode::Read => capabilities.readable,
            OpenMode::Write => capabilities.writable,
        };
        if !allowed {
            return Err(self.translate(DeviceError::NotPermitted {
                name: name.to_string(),
                kind: entry.kind().as_str(),
            }));
        }
        self.shared
            .registry
            .pin(&entry)
            .map_err(|err| self.translate(err))?;
        let position = match entry.device() {
            Device::Sequential(reader) => reader.position(),
            _ => 0,
        };
        Ok(OpenFile {
            engine: self.clone(),
            entry,
            mode,
            position,
        })
    }

    pub fn stat(&self, name: &str) -> Result<FileStat, Errno> {
        let entry = self.lookup(name)?;
        let size = match entry.device() {
            Device::Sequential(_) => None,
            Device::Block(reader) => reader.size(),
            Device::Writer(writer) => Some(writer.end()),
        };
        Ok(FileStat {
            kind: entry.kind(),
            size,
            capabilities: entry.device().capabilities(),
        })
    }

    fn lookup(&self, name: &str) -> Result<Arc<DeviceEntry>, Errno> {
        self.shared
            .registry
            .get(name)
            .map_err(|err| self.translate(err))
    }

    /// Reduce a failure to its errno, keeping any application error for the caller.
    fn translate(&self, err: DeviceError) -> Errno {
        if let Some(thrown) = err.passthrough() {
            self.shared.stash_thrown(thrown);
        }
        let errno = err.errno();
        tracing::debug!(error = %err, errno = errno.code(), "Engine call failed");
        errno
    }

    fn call(&self, entry: &DeviceEntry, call: Call<'_>) -> Result<Completion, DeviceError> {
        if self.shared.parker.is_shut_down() {
            return Err(DeviceError::HostUnreachable {
                name: entry.name().to_string(),
            });
        }

        match (entry.device(), call) {
            (Device::Sequential(reader), Call::Read { length }) => {
                self.read_sequential(entry, reader, length)
            }
            (Device::Sequential(reader), Call::ReadAt { offset, length }) => {
                if offset != reader.position() {
                    return Err(DeviceError::IllegalSeek {
                        name: entry.name().to_string(),
                    });
                }
                self.read_sequential(entry, reader, length)
            }
            (Device::Block(reader), Call::ReadAt { offset, length }) => {
                self.read_block(entry, reader, offset, length)
            }
            (Device::Block(_), Call::Read { .. }) => Err(DeviceError::InvalidArgument {
                name: entry.name().to_string(),
                reason: "block devices are read at an explicit offset".to_string(),
            }),
            (Device::Writer(writer), Call::Write { offset, data }) => {
                self.write_through(entry, writer, offset, data)
            }
            (Device::Writer(_), _) | (_, Call::Write { .. }) => Err(DeviceError::NotPermitted {
                name: entry.name().to_string(),
                kind: entry.kind().as_str(),
            }),
        }
    }

    fn read_sequential(
        &self,
        entry: &DeviceEntry,
        reader: &SequentialReader,
        length: usize,
    ) -> Resolution {
        let name = entry.name();
        let waiter = match reader.admit_read(name, length)? {
            Admission::Immediate(done) => return Ok(done),
            Admission::Wait(waiter) => waiter,
        };

        if let Some(hooks) = self.shared.hooks_for(entry) {
            let position = waiter.request().offset();
            if let Err(error) = hooks.on_read(name, position, length) {
                reader.forget(waiter.request().id());
                return Err(hook_failed(name, "on_read", error));
            }
        }
        self.park(entry, waiter)
    }

    fn read_block(
        &self,
        entry: &DeviceEntry,
        reader: &BlockReader,
        offset: u64,
        length: usize,
    ) -> Resolution {
        let name = entry.name();
        let _permit = match reader.permits() {
            Some(permits) => Some(self.shared.parker.acquire(permits, entry)?),
            None => None,
        };
        let waiter = match reader.admit_read(name, offset, length)? {
            Admission::Immediate(done) => return Ok(done),
            Admission::Wait(waiter) => waiter,
        };

        let request = Arc::clone(waiter.request());
        let Some(hooks) = self.shared.hooks_for(entry) else {
            reader.forget(request.id());
            return Err(DeviceError::NoHook {
                name: name.to_string(),
                hook: "on_block_read",
            });
        };
        if let Err(error) = hooks.on_block_read(name, request.offset(), request.length()) {
            reader.forget(request.id());
            return Err(hook_failed(name, "on_block_read", error));
        }
        self.park(entry, waiter)
    }

    fn write_through(
        &self,
        entry: &DeviceEntry,
        writer: &Writer,
        offset: u64,
        data: &[u8],
    ) -> Resolution {
        let name = entry.name();
        writer.check_position(name, offset)?;
        let hooks = self
            .shared
            .hooks_for(entry)
            .ok_or_else(|| DeviceError::NoHook {
                name: name.to_string(),
                hook: "on_write",
            })?;

        let (request, waiter) = PendingRequest::new(name, RequestOp::Write, offset, data.len());
        if let Err(error) = hooks.on_write(name, offset, data) {
            return Err(hook_failed(name, "on_write", error));
        }
        request.resolve(Ok(Completion::Ack(data.len())))?;

        let done = self.park(entry, waiter)?;
        writer.advance(offset, done.written());
        Ok(done)
    }

    fn park(&self, entry: &DeviceEntry, waiter: Waiter) -> Resolution {
        let request_id = waiter.request().id();
        let outcome = self.shared.parker.park(waiter, entry);
        if outcome.is_err() {
            entry.device().forget(request_id);
        }
        outcome
    }
}

fn hook_failed(name: &str, hook: &'static str, error: HostError) -> DeviceError {
    HookFailed {
        device: name,
        hook,
        error: &error,
    }
    .log();
    DeviceError::host(name, error)
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}

/// An open file on a device.
///
/// Tracks its own position. Dropping it releases the device for removal.
pub struct OpenFile {
    engine: Engine,
    entry: Arc<DeviceEntry>,
    mode: OpenMode,
    position: u64,
}

impl OpenFile {
    pub fn name(&self) -> &str {
        self.entry.name()
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Read at the current position and advance past the returned bytes.
    pub fn read(&mut self, length: usize) -> Result<Bytes, Errno> {
        if self.mode != OpenMode::Read {
            return Err(Errno::EBADF);
        }
        let call = match self.entry.device() {
            Device::Sequential(_) => Call::Read { length },
            _ => Call::ReadAt {
                offset: self.position,
                length,
            },
        };
        let data = self
            .engine
            .call(&self.entry, call)
            .map(Completion::into_bytes)
            .map_err(|err| self.engine.translate(err))?;
        self.position += data.len() as u64;
        Ok(data)
    }

    /// Read at `offset` without moving the position.
    pub fn read_at(&self, offset: u64, length: usize) -> Result<Bytes, Errno> {
        if self.mode != OpenMode::Read {
            return Err(Errno::EBADF);
        }
        self.engine
            .call(&self.entry, Call::ReadAt { offset, length })
            .map(Completion::into_bytes)
            .map_err(|err| self.engine.translate(err))
    }

    /// Write at the current position and advance past the written bytes.
    pub fn write(&mut self, data: &[u8]) -> Result<usize, Errno> {
        if self.mode != OpenMode::Write {
            return Err(Errno::EBADF);
        }
        let written = self
            .engine
            .call(
                &self.entry,
                Call::Write {
                    offset: self.position,
                    data,
                },
            )
            .map(|done| done.written())
            .map_err(|err| self.engine.translate(err))?;
        self.position += written as u64;
        Ok(written)
    }

    /// Move the position. Fails with ESPIPE on devices that cannot seek.
    pub fn seek(&mut self, target: SeekFrom) -> Result<u64, Errno> {
        let name = self.entry.name().to_string();
        if !self.entry.device().capabilities().seekable {
            return Err(self.engine.translate(DeviceError::IllegalSeek { name }));
        }
        let (base, delta) = match target {
            SeekFrom::Start(offset) => (0, i128::from(offset)),
            SeekFrom::Current(delta) => (self.position, i128::from(delta)),
            SeekFrom::End(delta) => {
                // The host owns a writer's size.
                if let Device::Writer(_) = self.entry.device() {
                    return Err(self
                        .engine
                        .translate(DeviceError::host(name, ErrorCategory::Io.into())));
                }
                let end = match self.entry.device() {
                    Device::Block(reader) => reader.size(),
                    _ => None,
                };
                let Some(end) = end else {
                    return Err(self.engine.translate(DeviceError::InvalidArgument {
                        name,
                        reason: "size is unknown".to_string(),
                    }));
                };
                (end, i128::from(delta))
            }
        };
        let target = i128::from(base) + delta;
        let position = u64::try_from(target).map_err(|_| {
            self.engine.translate(DeviceError::InvalidArgument {
                name: self.entry.name().to_string(),
                reason: format!("seek to {} is out of range", target),
            })
        })?;
        self.position = position;
        Ok(position)
    }
}

impl fmt::Debug for OpenFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenFile")
            .field("name", &self.entry.name())
            .field("mode", &self.mode)
            .field("position", &self.position)
            .finish()
    }
}

impl Drop for OpenFile {
    fn drop(&mut self) {
        self.entry.release_handle();
    }
}
