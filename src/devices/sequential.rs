// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::bridge::pending::{Completion, Delivery, PendingRequest, RequestOp, Resolution};
use crate::devices::{Admission, ChunkBuffer};
use crate::errors::{DeviceError, HostError};
use crate::observability::messages::device::{
    ConcurrentSequentialRead, DataAfterEof, DuplicateResolution,
};
use crate::observability::messages::StructuredLog;
use bytes::Bytes;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A stream device fed by host pushes.
///
/// At most one read may be outstanding. A read completes once enough bytes
/// are buffered, or with whatever is left once the host signals end of
/// stream. A host error is sticky: it fails the outstanding read and every
/// later one until the host sends data again.
pub struct SequentialReader {
    state: Mutex<SequentialState>,
}

#[derive(Default)]
struct SequentialState {
    buffer: ChunkBuffer,
    eof: bool,
    error: Option<HostError>,
    pending: Option<Arc<PendingRequest>>,
    closed: bool,
}

impl SequentialReader {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SequentialState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SequentialState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Offset of the next byte the engine will read.
    pub fn position(&self) -> u64 {
        self.lock().buffer.position()
    }

    pub fn buffered(&self) -> usize {
        self.lock().buffer.len()
    }

    pub fn is_eof(&self) -> bool {
        self.lock().eof
    }

    pub fn outstanding(&self) -> usize {
        usize::from(self.lock().pending.is_some())
    }

    pub(crate) fn admit_read(&self, name: &str, length: usize) -> Result<Admission, DeviceError> {
        let mut state = self.lock();
        if state.closed {
            return Err(DeviceError::DeviceGone {
                name: name.to_string(),
            });
        }
        if state.pending.is_some() {
            ConcurrentSequentialRead { device: name }.log();
            return Err(DeviceError::ConcurrentRead {
                name: name.to_string(),
            });
        }
        if let Some(error) = &state.error {
            return Err(DeviceError::host(name, error.clone()));
        }
        if length == 0 || state.buffer.len() >= length || state.eof {
            let data = state.buffer.take(length);
            return Ok(Admission::Immediate(Completion::Data(data)));
        }

        let position = state.buffer.position();
        let (request, waiter) = PendingRequest::new(name, RequestOp::Read, position, length);
        state.pending = Some(request);
        Ok(Admission::Wait(waiter))
    }

    /// Append a chunk, or signal end of stream with `None`.
    pub(crate) fn send(&self, name: &str, chunk: Option<Bytes>) {
        let mut state = self.lock();
        match chunk {
            None => state.eof = true,
            Some(data) if state.eof => {
                DataAfterEof {
                    device: name,
                    discarded: data.len(),
                }
                .log();
                return;
            }
            Some(data) => {
                state.error = None;
                state.buffer.push(data);
            }
        }

        let ready = state
            .pending
            .as_ref()
            .is_some_and(|p| state.eof || state.buffer.len() >= p.length());
        if !ready {
            return;
        }
        if let Some(request) = state.pending.take() {
            let data = state.buffer.take(request.length());
            match request.deliver(Ok(Completion::Data(data))) {
                Ok(Delivery::Delivered) => {}
                // The reader gave up; keep the bytes for the next read.
                Ok(Delivery::Abandoned(Ok(Completion::Data(data)))) => state.buffer.unread(data),
                Ok(Delivery::Abandoned(_)) => {}
                Err(_) => DuplicateResolution {
                    device: name,
                    request_id: request.id(),
                }
                .log(),
            }
        }
    }

    pub(crate) fn fail(&self, name: &str, error: HostError) {
        let mut state = self.lock();
        state.error = Some(error.clone());
        if let Some(request) = state.pending.take() {
            settle(name, &request, Err(DeviceError::host(name, error)));
        }
    }

    pub(crate) fn forget(&self, request_id: u64) {
        let mut state = self.lock();
        if state.pending.as_ref().is_some_and(|p| p.id() == request_id) {
            state.pending = None;
        }
    }

    pub(crate) fn cancel_all(&self, name: &str) -> usize {
        let mut state = self.lock();
        state.closed = true;
        match state.pending.take() {
            Some(request) => {
                settle(
                    name,
                    &request,
                    Err(DeviceError::DeviceGone {
                        name: name.to_string(),
                    }),
                );
                1
            }
            None => 0,
        }
    }
}

impl Default for SequentialReader {
    fn default() -> Self {
        Self::new()
    }
}

fn settle(name: &str, request: &PendingRequest, resolution: Resolution) {
    if request.resolve(resolution).is_err() {
        DuplicateResolution {
            device: name,
            request_id: request.id(),
        }
        .log();
    }
}
