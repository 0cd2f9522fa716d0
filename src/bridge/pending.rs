// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! One blocking engine call awaiting a host answer.
//!
//! A [`PendingRequest`] owns the sending half of a one-shot channel; the
//! blocked engine context holds the receiving half inside a [`Waiter`].
//! Taking the sender out of its slot is what makes resolution exactly-once:
//! a second attempt finds the slot empty and is rejected.

use crate::errors::DeviceError;
use bytes::Bytes;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::oneshot;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Kind of blocking call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOp {
    Read,
    Write,
}

impl fmt::Display for RequestOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestOp::Read => f.write_str("read"),
            RequestOp::Write => f.write_str("write"),
        }
    }
}

/// Successful result of a blocking call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Bytes read. Shorter than requested only at end of file.
    Data(Bytes),
    /// Number of bytes accepted by a write.
    Ack(usize),
}

impl Completion {
    pub fn into_bytes(self) -> Bytes {
        match self {
            Completion::Data(bytes) => bytes,
            Completion::Ack(_) => Bytes::new(),
        }
    }

    pub fn written(&self) -> usize {
        match self {
            Completion::Data(_) => 0,
            Completion::Ack(n) => *n,
        }
    }
}

/// What a pending request is resolved with.
pub type Resolution = Result<Completion, DeviceError>;

/// A blocking engine call registered with a device, awaiting resolution.
pub struct PendingRequest {
    id: u64,
    device: String,
    op: RequestOp,
    offset: u64,
    length: usize,
    created: Instant,
    slot: Mutex<Option<oneshot::Sender<Resolution>>>,
}

impl PendingRequest {
    /// Allocate a request and the waiter the engine context will park on.
    pub fn new(device: &str, op: RequestOp, offset: u64, length: usize) -> (Arc<Self>, Waiter) {
        let (tx, rx) = oneshot::channel();
        let request = Arc::new(Self {
            id: NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed),
            device: device.to_string(),
            op,
            offset,
            length,
            created: Instant::now(),
            slot: Mutex::new(Some(tx)),
        });
        let waiter = Waiter {
            request: Arc::clone(&request),
            rx,
        };
        (request, waiter)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn op(&self) -> RequestOp {
        self.op
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn created(&self) -> Instant {
        self.created
    }

    pub fn is_resolved(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Resolve the request. Fails if it was already resolved.
    ///
    /// A waiter that has already given up (deadline, shutdown) no longer
    /// receives anything; the resolution is then discarded but still counts.
    pub fn resolve(&self, resolution: Resolution) -> Result<(), DeviceError> {
        self.deliver(resolution).map(|_| ())
    }

    /// Like [`resolve`](Self::resolve), but hands the resolution back when
    /// the waiter has given up, so the resolver can restore what it consumed.
    pub(crate) fn deliver(&self, resolution: Resolution) -> Result<Delivery, DeviceError> {
        let sender = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match sender {
            Some(tx) => Ok(match tx.send(resolution) {
                Ok(()) => Delivery::Delivered,
                Err(resolution) => Delivery::Abandoned(resolution),
            }),
            None => Err(DeviceError::AlreadyResolved {
                request_id: self.id,
            }),
        }
    }
}

impl fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequest")
            .field("id", &self.id)
            .field("device", &self.device)
            .field("op", &self.op)
            .field("offset", &self.offset)
            .field("length", &self.length)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

/// What happened to a resolution handed to [`PendingRequest::deliver`].
#[derive(Debug)]
pub(crate) enum Delivery {
    Delivered,
    Abandoned(Resolution),
}

/// The engine-side half of a pending request.
pub struct Waiter {
    pub(crate) request: Arc<PendingRequest>,
    pub(crate) rx: oneshot::Receiver<Resolution>,
}

impl Waiter {
    pub fn request(&self) -> &Arc<PendingRequest> {
        &self.request
    }

    /// Take the resolution if it is already available, without blocking.
    ///
    /// Returns `None` while the request is still pending. A request whose
    /// sender vanished without resolving counts as a removed device.
    pub fn try_take(&mut self) -> Option<Resolution> {
        match self.rx.try_recv() {
            Ok(resolution) => Some(resolution),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(DeviceError::DeviceGone {
                name: self.request.device.clone(),
            })),
        }
    }
}
