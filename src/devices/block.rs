// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::bridge::pending::{Completion, PendingRequest, RequestOp, Resolution};
use crate::devices::Admission;
use crate::errors::{DeviceError, HostError};
use crate::observability::messages::device::{DuplicateResolution, StaleBlockAnswer};
use crate::observability::messages::StructuredLog;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Semaphore;

type BlockKey = (u64, usize);

/// A random-access device answered block by block.
///
/// Any number of reads may be outstanding. Each is keyed by its exact
/// `(offset, length)`; answers may arrive in any order and are matched by
/// key, first come first served among identical keys. The most recent
/// answer is cached so that small reads inside it skip the host.
pub struct BlockReader {
    size: Option<u64>,
    permits: Option<Arc<Semaphore>>,
    state: Mutex<BlockState>,
}

#[derive(Default)]
struct BlockState {
    outstanding: HashMap<BlockKey, VecDeque<Arc<PendingRequest>>>,
    cache: Option<(u64, Bytes)>,
    closed: bool,
}

impl BlockReader {
    pub fn new(size: Option<u64>, max_outstanding: Option<usize>) -> Self {
        Self {
            size,
            permits: max_outstanding.map(|n| Arc::new(Semaphore::new(n.max(1)))),
            state: Mutex::new(BlockState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BlockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Declared size, if the host gave one.
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    pub(crate) fn permits(&self) -> Option<&Arc<Semaphore>> {
        self.permits.as_ref()
    }

    pub fn outstanding(&self) -> usize {
        self.lock().outstanding.values().map(VecDeque::len).sum()
    }

    /// Clamp a request against the declared size. `None` means end of file.
    fn clamp(&self, offset: u64, length: usize) -> Option<usize> {
        match self.size {
            Some(size) if offset >= size => None,
            Some(size) => Some(length.min((size - offset).min(usize::MAX as u64) as usize)),
            None => Some(length),
        }
    }

    pub(crate) fn admit_read(
        &self,
        name: &str,
        offset: u64,
        length: usize,
    ) -> Result<Admission, DeviceError> {
        let mut state = self.lock();
        if state.closed {
            return Err(DeviceError::DeviceGone {
                name: name.to_string(),
            });
        }
        let length = match self.clamp(offset, length) {
            Some(0) | None => return Ok(Admission::Immediate(Completion::Data(Bytes::new()))),
            Some(length) => length,
        };

        if let Some((start, cached)) = &state.cache {
            let end = start.saturating_add(cached.len() as u64);
            let covered = offset
                .checked_add(length as u64)
                .is_some_and(|wanted| offset >= *start && wanted <= end);
            if covered {
                let from = (offset - *start) as usize;
                let data = cached.slice(from..from + length);
                return Ok(Admission::Immediate(Completion::Data(data)));
            }
        }

        let (request, waiter) = PendingRequest::new(name, RequestOp::Read, offset, length);
        state
            .outstanding
            .entry((offset, length))
            .or_default()
            .push_back(request);
        Ok(Admission::Wait(waiter))
    }

    /// Answer the oldest outstanding request for `(offset, length)`.
    ///
    /// `None` data means end of file. Returns `false` when nothing matched;
    /// the answer is then discarded.
    pub(crate) fn answer(
        &self,
        name: &str,
        offset: u64,
        length: usize,
        data: Option<Bytes>,
    ) -> bool {
        let mut state = self.lock();
        let Some(request) = pop(&mut state.outstanding, (offset, length)) else {
            StaleBlockAnswer {
                device: name,
                offset,
                length,
            }
            .log();
            return false;
        };

        let mut data = data.unwrap_or_default();
        if !data.is_empty() {
            state.cache = Some((offset, data.clone()));
        }
        data.truncate(length);
        settle(name, &request, Ok(Completion::Data(data)));
        true
    }

    /// Fail the oldest outstanding request for `(offset, length)`.
    pub(crate) fn fail(&self, name: &str, offset: u64, length: usize, error: HostError) -> bool {
        let mut state = self.lock();
        match pop(&mut state.outstanding, (offset, length)) {
            Some(request) => {
                settle(name, &request, Err(DeviceError::host(name, error)));
                true
            }
            None => {
                StaleBlockAnswer {
                    device: name,
                    offset,
                    length,
                }
                .log();
                false
            }
        }
    }

    pub(crate) fn forget(&self, request_id: u64) {
        let mut state = self.lock();
        state.outstanding.retain(|_, queue| {
            queue.retain(|r| r.id() != request_id);
            !queue.is_empty()
        });
    }

    pub(crate) fn cancel_all(&self, name: &str) -> usize {
        let mut state = self.lock();
        state.closed = true;
        state.cache = None;
        let mut cancelled = 0;
        for (_, queue) in state.outstanding.drain() {
            for request in queue {
                settle(
                    name,
                    &request,
                    Err(DeviceError::DeviceGone {
                        name: name.to_string(),
                    }),
                );
                cancelled += 1;
            }
        }
        if let Some(permits) = &self.permits {
            permits.close();
        }
        cancelled
    }
}

fn pop(
    outstanding: &mut HashMap<BlockKey, VecDeque<Arc<PendingRequest>>>,
    key: BlockKey,
) -> Option<Arc<PendingRequest>> {
    let queue = outstanding.get_mut(&key)?;
    let request = queue.pop_front();
    if queue.is_empty() {
        outstanding.remove(&key);
    }
    request
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::pending::Waiter;
    use crate::errors::{ErrorCategory, Errno};

    fn wait(admission: Admission) -> Waiter {
        match admission {
            Admission::Wait(waiter) => waiter,
            Admission::Immediate(c) => panic!("expected a pending request, got {:?}", c),
        }
    }

    fn immediate(admission: Admission) -> Bytes {
        match admission {
            Admission::Immediate(c) => c.into_bytes(),
            Admission::Wait(_) => panic!("expected an immediate answer"),
        }
    }

    #[test]
    fn answers_are_matched_by_range_not_arrival_order() {
        let reader = BlockReader::new(None, None);
        let mut high = wait(reader.admit_read("g", 100, 50).unwrap());
        let mut low = wait(reader.admit_read("g", 0, 50).unwrap());
        assert_eq!(reader.outstanding(), 2);

        assert!(reader.answer("g", 0, 50, Some(Bytes::from(vec![1u8; 50]))));
        assert!(high.try_take().is_none());
        assert_eq!(low.try_take().unwrap().unwrap().into_bytes()[0], 1);

        assert!(reader.answer("g", 100, 50, Some(Bytes::from(vec![2u8; 50]))));
        assert_eq!(high.try_take().unwrap().unwrap().into_bytes()[0], 2);
        assert_eq!(reader.outstanding(), 0);
    }

    #[test]
    fn identical_ranges_resolve_first_come_first_served() {
        let reader = BlockReader::new(None, None);
        let mut first = wait(reader.admit_read("g", 0, 4).unwrap());
        let mut second = wait(reader.admit_read("g", 0, 4).unwrap());

        reader.answer("g", 0, 4, Some(Bytes::from_static(b"one!")));
        assert!(first.try_take().is_some());
        assert!(second.try_take().is_none());
    }

    #[test]
    fn unmatched_answer_is_discarded() {
        let reader = BlockReader::new(None, None);
        assert!(!reader.answer("g", 7, 7, Some(Bytes::from_static(b"nothing"))));
        assert!(!reader.fail("g", 7, 7, ErrorCategory::Io.into()));
    }

    #[test]
    fn reads_past_declared_size_are_end_of_file() {
        let reader = BlockReader::new(Some(100), None);
        assert!(immediate(reader.admit_read("g", 100, 10).unwrap()).is_empty());

        let waiter = wait(reader.admit_read("g", 90, 50).unwrap());
        assert_eq!(waiter.request().length(), 10);
    }

    #[test]
    fn last_answer_serves_reads_inside_it() {
        let reader = BlockReader::new(None, None);
        let _waiter = wait(reader.admit_read("g", 0, 8).unwrap());
        reader.answer("g", 0, 8, Some(Bytes::from_static(b"abcdefgh")));

        let data = immediate(reader.admit_read("g", 2, 3).unwrap());
        assert_eq!(data, Bytes::from_static(b"cde"));
    }

    #[test]
    fn oversized_answer_is_truncated_to_request() {
        let reader = BlockReader::new(None, None);
        let mut waiter = wait(reader.admit_read("g", 0, 2).unwrap());
        reader.answer("g", 0, 2, Some(Bytes::from_static(b"abcdef")));
        assert_eq!(
            waiter.try_take().unwrap().unwrap().into_bytes(),
            Bytes::from_static(b"ab")
        );
    }

    #[test]
    fn failure_targets_one_request_only() {
        let reader = BlockReader::new(None, None);
        let mut bad = wait(reader.admit_read("g", 0, 4).unwrap());
        let mut good = wait(reader.admit_read("g", 4, 4).unwrap());

        reader.fail("g", 0, 4, ErrorCategory::NoSuchFile.into());
        assert_eq!(bad.try_take().unwrap().unwrap_err().errno(), Errno::ENOENT);
        assert!(good.try_take().is_none());
    }

    #[test]
    fn cancel_fails_everything_and_closes_permits() {
        let reader = BlockReader::new(None, Some(2));
        let mut a = wait(reader.admit_read("g", 0, 4).unwrap());
        let mut b = wait(reader.admit_read("g", 8, 4).unwrap());

        assert_eq!(reader.cancel_all("g"), 2);
        assert_eq!(a.try_take().unwrap().unwrap_err().errno(), Errno::ENODEV);
        assert_eq!(b.try_take().unwrap().unwrap_err().errno(), Errno::ENODEV);
        assert!(reader.permits().unwrap().is_closed());
    }

    fn permutations(n: usize) -> Vec<Vec<usize>> {
        if n == 0 {
            return vec![Vec::new()];
        }
        let mut out = Vec::new();
        for rest in permutations(n - 1) {
            for slot in 0..=rest.len() {
                let mut order = rest.clone();
                order.insert(slot, n - 1);
                out.push(order);
            }
        }
        out
    }

    #[test]
    fn every_answer_order_delivers_each_range_its_own_bytes() {
        const REQUESTS: usize = 4;
        let orders = permutations(REQUESTS);
        assert_eq!(orders.len(), 24);

        for order in orders {
            let reader = BlockReader::new(None, None);
            let mut waiters: Vec<Waiter> = (0..REQUESTS)
                .map(|i| wait(reader.admit_read("g", i as u64 * 16, 16).unwrap()))
                .collect();
            assert_eq!(reader.outstanding(), REQUESTS);

            for (answered, &i) in order.iter().enumerate() {
                let payload = Bytes::from(vec![i as u8 + 1; 16]);
                assert!(reader.answer("g", i as u64 * 16, 16, Some(payload)));
                assert_eq!(reader.outstanding(), REQUESTS - answered - 1);
            }
            for (i, waiter) in waiters.iter_mut().enumerate() {
                let data = waiter.try_take().unwrap().unwrap().into_bytes();
                assert_eq!(data, Bytes::from(vec![i as u8 + 1; 16]), "order {:?}", order);
            }
        }
    }

    #[test]
    fn reads_near_the_end_of_the_address_space_skip_the_cache() {
        let reader = BlockReader::new(None, None);
        let _waiter = wait(reader.admit_read("g", 0, 8).unwrap());
        reader.answer("g", 0, 8, Some(Bytes::from_static(b"abcdefgh")));

        let waiter = wait(reader.admit_read("g", u64::MAX - 2, 10).unwrap());
        assert_eq!(waiter.request().offset(), u64::MAX - 2);
        assert_eq!(reader.outstanding(), 1);
    }

    #[test]
    fn forgotten_request_no_longer_matches() {
        let reader = BlockReader::new(None, None);
        let waiter = wait(reader.admit_read("g", 0, 4).unwrap());
        reader.forget(waiter.request().id());
        assert_eq!(reader.outstanding(), 0);
        assert!(!reader.answer("g", 0, 4, Some(Bytes::from_static(b"late"))));
    }
}
