//! Bounded byte FIFO between the host transport and the dispatcher.

use std::collections::VecDeque;

use crate::error::ProtocolFault;

#[derive(Debug, Clone)]
pub struct CommandQueue {
    bytes: VecDeque<u8>,
    capacity: usize,
}

impl CommandQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append `data`, all or nothing.
    pub fn extend(&mut self, data: &[u8]) -> Result<(), ProtocolFault> {
        let attempted = self.bytes.len() + data.len();
        if attempted > self.capacity {
            return Err(ProtocolFault::QueueOverflow {
                capacity: self.capacity,
                attempted,
            });
        }
        self.bytes.extend(data.iter().copied());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Free space left.
    pub fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.bytes.len())
    }

    pub fn peek(&self, index: usize) -> Option<u8> {
        self.bytes.get(index).copied()
    }

    /// Copy the first `out.len()` bytes without consuming them.
    /// Returns false when fewer bytes are queued.
    pub fn copy_prefix(&self, out: &mut [u8]) -> bool {
        if self.bytes.len() < out.len() {
            return false;
        }
        for (dst, src) in out.iter_mut().zip(self.bytes.iter()) {
            *dst = *src;
        }
        true
    }

    pub fn pop(&mut self) -> Option<u8> {
        self.bytes.pop_front()
    }

    /// Drop up to `n` bytes from the front.
    pub fn discard(&mut self, n: usize) {
        let n = n.min(self.bytes.len());
        self.bytes.drain(..n);
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new(256)
    }
}
