// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use bytes::{Buf, Bytes, BytesMut};
use std::collections::VecDeque;

/// FIFO of host-supplied chunks for a sequential reader.
///
/// Chunks are kept as received and only copied when a read spans more than
/// one of them. `position` counts the bytes already handed to the engine.
#[derive(Debug, Default)]
pub struct ChunkBuffer {
    chunks: VecDeque<Bytes>,
    len: usize,
    position: u64,
}

impl ChunkBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffered bytes not yet consumed.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Stream offset of the next byte the engine will receive.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn push(&mut self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }
        self.len += chunk.len();
        self.chunks.push_back(chunk);
    }

    /// Put bytes returned by [`take`](Self::take) back at the front.
    pub fn unread(&mut self, data: Bytes) {
        if data.is_empty() {
            return;
        }
        self.len += data.len();
        self.position = self.position.saturating_sub(data.len() as u64);
        self.chunks.push_front(data);
    }

    /// Remove up to `max` bytes from the front, in order.
    pub fn take(&mut self, max: usize) -> Bytes {
        let wanted = max.min(self.len);
        if wanted == 0 {
            return Bytes::new();
        }

        let out = match self.chunks.front_mut() {
            Some(front) if front.len() >= wanted => {
                let out = front.split_to(wanted);
                if front.is_empty() {
                    self.chunks.pop_front();
                }
                out
            }
            _ => {
                let mut out = BytesMut::with_capacity(wanted);
                while out.len() < wanted {
                    let Some(front) = self.chunks.front_mut() else {
                        break;
                    };
                    let n = front.len().min(wanted - out.len());
                    out.extend_from_slice(&front[..n]);
                    front.advance(n);
                    if front.is_empty() {
                        self.chunks.pop_front();
                    }
                }
                out.freeze()
            }
        };

        self.len -= out.len();
        self.position += out.len() as u64;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_spanning_chunks_preserves_order() {
        let mut buffer = ChunkBuffer::new();
        buffer.push(Bytes::from_static(b"abcdef"));
        buffer.push(Bytes::from_static(b"ghij"));

        assert_eq!(buffer.len(), 10);
        assert_eq!(buffer.take(10), Bytes::from_static(b"abcdefghij"));
        assert!(buffer.is_empty());
        assert_eq!(buffer.position(), 10);
    }

    #[test]
    fn partial_take_leaves_remainder() {
        let mut buffer = ChunkBuffer::new();
        buffer.push(Bytes::from_static(b"hello"));

        assert_eq!(buffer.take(2), Bytes::from_static(b"he"));
        assert_eq!(buffer.take(100), Bytes::from_static(b"llo"));
        assert_eq!(buffer.take(1), Bytes::new());
        assert_eq!(buffer.position(), 5);
    }

    #[test]
    fn empty_chunks_are_ignored() {
        let mut buffer = ChunkBuffer::new();
        buffer.push(Bytes::new());
        buffer.push(Bytes::from_static(b"x"));
        buffer.push(Bytes::new());

        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.take(4), Bytes::from_static(b"x"));
    }
}
