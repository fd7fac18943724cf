//! Buffer Pool
//!
//! Reusable per-connection scratch buffers for the RESP front-end. A
//! connection takes buffers on accept and MUST give them back on every exit
//! path, including errors; otherwise the pool drains and every new
//! connection falls back to fresh allocations.

use bytes::BytesMut;
use crossbeam::queue::ArrayQueue;
use std::sync::Arc;

use crate::config::PerformanceSection;

#[derive(Clone)]
pub struct BufferPool {
    pool: Arc<ArrayQueue<BytesMut>>,
    buffer_size: usize,
}

impl BufferPool {
    /// Pre-allocate `capacity` buffers of `buffer_size` bytes each.
    pub fn new(capacity: usize, buffer_size: usize) -> Self {
        let pool = ArrayQueue::new(capacity.max(1));
        for _ in 0..capacity {
            let _ = pool.push(BytesMut::with_capacity(buffer_size));
        }
        Self {
            pool: Arc::new(pool),
            buffer_size,
        }
    }

    /// Size the pool from the performance config section.
    pub fn from_config(perf: &PerformanceSection) -> Self {
        Self::new(perf.buffer_pool_capacity, perf.read_buffer_size)
    }

    /// Take a buffer, allocating a fresh one when the pool is dry.
    #[inline]
    pub fn acquire(&self) -> BytesMut {
        self.pool
            .pop()
            .unwrap_or_else(|| BytesMut::with_capacity(self.buffer_size))
    }

    /// Return a buffer. Cleared before reuse; silently dropped when the
    /// pool is already full.
    #[inline]
    pub fn release(&self, mut buf: BytesMut) {
        buf.clear();
        let _ = self.pool.push(buf);
    }

    pub fn available(&self) -> usize {
        self.pool.len()
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }
}
