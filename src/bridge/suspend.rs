// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Parking a synchronous engine context until the host answers.
//!
//! The engine runs on a blocking thread. A [`Parker`] turns a [`Waiter`] into
//! a plain blocking call by driving the answer future on the host runtime
//! through [`Handle::block_on`]. While parked it wakes up once per liveness
//! tick to confirm that the device is still registered and, when a deadline
//! is configured, that the host has shown some activity recently.
//!
//! Parking must never happen on a runtime worker thread: [`Handle::block_on`]
//! panics there. Engine calls are expected to run under
//! [`tokio::task::spawn_blocking`] or on a dedicated thread.

use crate::bridge::pending::{Resolution, Waiter};
use crate::devices::DeviceEntry;
use crate::errors::DeviceError;
use crate::observability::messages::bridge::{
    HostUnresponsive, LivenessTick, RequestParked, RequestResumed,
};
use crate::observability::messages::StructuredLog;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::{oneshot, OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Blocks engine contexts on pending requests.
#[derive(Clone)]
pub(crate) struct Parker {
    runtime: Handle,
    tick: Duration,
    host_deadline: Option<Duration>,
    shutdown: CancellationToken,
}

impl Parker {
    pub(crate) fn new(runtime: Handle, tick: Duration, host_deadline: Option<Duration>) -> Self {
        Self {
            runtime,
            tick,
            host_deadline,
            shutdown: CancellationToken::new(),
        }
    }

    pub(crate) fn runtime(&self) -> &Handle {
        &self.runtime
    }

    pub(crate) fn tick(&self) -> Duration {
        self.tick
    }

    pub(crate) fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Block until the request is resolved, the device goes away, the host
    /// misses its deadline or the bridge shuts down.
    pub(crate) fn park(&self, mut waiter: Waiter, entry: &DeviceEntry) -> Resolution {
        if let Some(resolution) = waiter.try_take() {
            return resolution;
        }
        if self.is_shut_down() {
            return give_up(
                &mut waiter.rx,
                DeviceError::HostUnreachable {
                    name: entry.name().to_string(),
                },
            );
        }

        let request = Arc::clone(waiter.request());
        let op = request.op().to_string();
        let parked = RequestParked {
            device: entry.name(),
            request_id: request.id(),
            op: &op,
            offset: request.offset(),
            length: request.length(),
        };
        parked.log();
        let span = parked.span("park");
        let _guard = span.enter();

        let started = Instant::now();
        let rx = &mut waiter.rx;
        let outcome = self.runtime.block_on(async {
            let mut ticker = tokio::time::interval_at(
                tokio::time::Instant::now() + self.tick,
                self.tick,
            );
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    resolution = &mut *rx => {
                        return resolution.unwrap_or_else(|_| Err(DeviceError::DeviceGone {
                            name: entry.name().to_string(),
                        }));
                    }
                    _ = self.shutdown.cancelled() => {
                        return give_up(rx, DeviceError::HostUnreachable {
                            name: entry.name().to_string(),
                        });
                    }
                    _ = ticker.tick() => {
                        if let Err(error) =
                            self.check_liveness(entry, request.id(), request.created())
                        {
                            return give_up(rx, error);
                        }
                    }
                }
            }
        });

        RequestResumed {
            device: entry.name(),
            request_id: request.id(),
            waited: started.elapsed(),
            ok: outcome.is_ok(),
        }
        .log();
        outcome
    }

    /// Acquire a backpressure permit, parking if none is available.
    ///
    /// A closed semaphore means the device was removed.
    pub(crate) fn acquire(
        &self,
        permits: &Arc<Semaphore>,
        entry: &DeviceEntry,
    ) -> Result<OwnedSemaphorePermit, DeviceError> {
        let gone = || DeviceError::DeviceGone {
            name: entry.name().to_string(),
        };
        match Arc::clone(permits).try_acquire_owned() {
            Ok(permit) => return Ok(permit),
            Err(TryAcquireError::Closed) => return Err(gone()),
            Err(TryAcquireError::NoPermits) => {}
        }
        if self.is_shut_down() {
            return Err(DeviceError::HostUnreachable {
                name: entry.name().to_string(),
            });
        }

        tracing::debug!(
            device = entry.name(),
            "Waiting for an outstanding request slot"
        );
        self.runtime.block_on(async {
            tokio::select! {
                permit = Arc::clone(permits).acquire_owned() => permit.map_err(|_| gone()),
                _ = self.shutdown.cancelled() => Err(DeviceError::HostUnreachable {
                    name: entry.name().to_string(),
                }),
            }
        })
    }

    fn check_liveness(
        &self,
        entry: &DeviceEntry,
        request_id: u64,
        created: Instant,
    ) -> Result<(), DeviceError> {
        if entry.is_removed() {
            return Err(DeviceError::DeviceGone {
                name: entry.name().to_string(),
            });
        }

        LivenessTick {
            device: entry.name(),
            request_id,
            waited: created.elapsed(),
        }
        .log();

        let Some(deadline) = entry.host_deadline().or(self.host_deadline) else {
            return Ok(());
        };
        let idle = entry.last_activity().max(created).elapsed();
        if idle >= deadline {
            let msg = HostUnresponsive {
                device: entry.name(),
                request_id,
                idle,
                deadline,
            };
            let _span = msg.span("liveness").entered();
            msg.log();
            return Err(DeviceError::Unresponsive {
                name: entry.name().to_string(),
                elapsed: idle,
            });
        }
        Ok(())
    }
}

/// Stop waiting. A resolution that raced in before the receiver closed
/// still wins; anything sent later is handed back to the resolver.
fn give_up(rx: &mut oneshot::Receiver<Resolution>, error: DeviceError) -> Resolution {
    rx.close();
    rx.try_recv().unwrap_or(Err(error))
}
