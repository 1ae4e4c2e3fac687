//! Bounded FIFO of length-prefixed frame bytes.
//!
//! One ring per slot/channel (§3 "Ring buffers"). Frames are stored as
//! `[len: u8][bytes: len]`; single producer (the owning `Control`), single
//! consumer (the `Host` drain loop), never touched from another thread
//! (§5 "Shared resources").

use thiserror::Error;

/// Errors from pushing a frame onto a [`RingBuffer`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RingBufferError {
    #[error("frame of {0} bytes exceeds the 255-byte length-prefix limit")]
    FrameTooLarge(usize),
    #[error("ring buffer has no space for {needed} bytes ({free} free)")]
    Full { needed: usize, free: usize },
}

/// A bounded FIFO of `[len][bytes]`-framed byte frames.
pub struct RingBuffer {
    buf: Vec<u8>,
    capacity: usize,
    head: usize,
    len: usize,
}

impl RingBuffer {
    /// Create a ring sized to hold `capacity` bytes of framed data.
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity],
            capacity,
            head: 0,
            len: 0,
        }
    }

    /// Bytes currently free (including bytes that will be consumed by the
    /// next frame's length prefix).
    pub fn free_space(&self) -> usize {
        self.capacity - self.len
    }

    /// Bytes currently queued (raw byte count of the backing store, not a
    /// frame count).
    pub fn used_space(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether a frame of `payload_len` bytes would currently fit.
    pub fn has_space(&self, payload_len: usize) -> bool {
        payload_len <= u8::MAX as usize && self.free_space() >= payload_len + 1
    }

    /// Push one length-prefixed frame.
    pub fn add(&mut self, frame: &[u8]) -> Result<(), RingBufferError> {
        if frame.len() > u8::MAX as usize {
            return Err(RingBufferError::FrameTooLarge(frame.len()));
        }
        let needed = frame.len() + 1;
        if self.free_space() < needed {
            return Err(RingBufferError::Full {
                needed,
                free: self.free_space(),
            });
        }

        self.push_byte(frame.len() as u8);
        for &b in frame {
            self.push_byte(b);
        }
        Ok(())
    }

    /// Pop the next frame into `out`, returning its length, or `0` if the
    /// ring is empty.
    pub fn get(&mut self, out: &mut [u8]) -> usize {
        if self.is_empty() {
            return 0;
        }

        let frame_len = self.pop_byte() as usize;
        let n = frame_len.min(out.len());
        for slot in out.iter_mut().take(n) {
            *slot = self.pop_byte();
        }
        // Drain any remaining bytes of an over-long frame so the ring
        // stays consistent even if the caller's buffer was too small.
        for _ in n..frame_len {
            self.pop_byte();
        }
        n
    }

    fn push_byte(&mut self, b: u8) {
        let tail = (self.head + self.len) % self.capacity;
        self.buf[tail] = b;
        self.len += 1;
    }

    fn pop_byte(&mut self) -> u8 {
        let b = self.buf[self.head];
        self.head = (self.head + 1) % self.capacity;
        self.len -= 1;
        b
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_single_frame() {
        let mut ring = RingBuffer::new(64);
        ring.add(&[1, 2, 3, 4]).unwrap();
        let mut out = [0u8; 16];
        let n = ring.get(&mut out);
        assert_eq!(&out[..n], &[1, 2, 3, 4]);
        assert!(ring.is_empty());
    }

    #[test]
    fn fifo_order_preserved() {
        let mut ring = RingBuffer::new(64);
        ring.add(&[1]).unwrap();
        ring.add(&[2, 2]).unwrap();
        let mut out = [0u8; 16];
        assert_eq!(ring.get(&mut out), 1);
        assert_eq!(out[0], 1);
        assert_eq!(ring.get(&mut out), 2);
        assert_eq!(&out[..2], &[2, 2]);
    }

    #[test]
    fn empty_ring_returns_zero() {
        let mut ring = RingBuffer::new(64);
        let mut out = [0u8; 16];
        assert_eq!(ring.get(&mut out), 0);
    }

    #[test]
    fn full_ring_rejects_frame() {
        let mut ring = RingBuffer::new(4);
        assert!(ring.add(&[1, 2, 3]).is_err());
    }

    #[test]
    fn wraps_around_backing_store() {
        let mut ring = RingBuffer::new(8);
        let mut out = [0u8; 16];
        for i in 0..10u8 {
            ring.add(&[i]).unwrap();
            assert_eq!(ring.get(&mut out), 1);
            assert_eq!(out[0], i);
        }
    }

    #[test]
    fn oversized_frame_rejected() {
        let mut ring = RingBuffer::new(1024);
        let huge = vec![0u8; 300];
        assert_eq!(
            ring.add(&huge),
            Err(RingBufferError::FrameTooLarge(300))
        );
    }
}
