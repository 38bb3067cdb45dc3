// Copyright 2025-2026 CEMAXECUTER LLC

//! Fixed-capacity circular sample store.
//!
//! One slot is always kept free so that a full buffer and an empty buffer
//! have different cursor positions:
//!
//! ```text
//! data_available() + space_available() == capacity() - 1
//! ```
//!
//! The buffer is single-producer, single-consumer. The producer only moves
//! the write cursor and the consumer only moves the read cursor, but every
//! mutating method takes `&mut self`, so the two sides can never run at the
//! same time. Sharing one buffer between threads means wrapping it in a lock.

/// Circular buffer with power-of-two capacity.
pub struct RingBuffer<T> {
    buf: Box<[T]>,
    mask: usize,
    read: usize,
    write: usize,
}

impl<T: Copy + Default> RingBuffer<T> {
    /// Create a buffer holding `capacity - 1` samples.
    ///
    /// Capacity is rounded up to the next power of two, minimum 2.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2).next_power_of_two();
        Self {
            buf: vec![T::default(); capacity].into_boxed_slice(),
            mask: capacity - 1,
            read: 0,
            write: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Samples written and not yet read.
    #[inline]
    pub fn data_available(&self) -> usize {
        self.write.wrapping_sub(self.read) & self.mask
    }

    /// Samples that can be written before the buffer is full.
    #[inline]
    pub fn space_available(&self) -> usize {
        self.mask - self.data_available()
    }

    /// Copy as many of `samples` as fit. Returns the number written.
    ///
    /// Never blocks and never allocates; samples that do not fit are dropped.
    pub fn write(&mut self, samples: &[T]) -> usize {
        let n = samples.len().min(self.space_available());
        let first = n.min(self.capacity() - self.write);

        self.buf[self.write..self.write + first].copy_from_slice(&samples[..first]);
        self.buf[..n - first].copy_from_slice(&samples[first..n]);

        self.write = (self.write + n) & self.mask;
        n
    }

    /// Copy up to `out.len()` samples into `out`. Returns the number read.
    pub fn read(&mut self, out: &mut [T]) -> usize {
        let n = out.len().min(self.data_available());
        let first = n.min(self.capacity() - self.read);

        out[..first].copy_from_slice(&self.buf[self.read..self.read + first]);
        out[first..n].copy_from_slice(&self.buf[..n - first]);

        self.read = (self.read + n) & self.mask;
        n
    }

    /// Contiguous free region starting at the write cursor.
    ///
    /// The region stops at whichever comes first: the end of storage or the
    /// reserved slot before the read cursor. Writes into it become visible
    /// only after [`commit`](Self::commit).
    pub fn write_region(&mut self) -> &mut [T] {
        let len = self.space_available().min(self.capacity() - self.write);
        &mut self.buf[self.write..self.write + len]
    }

    /// Advance the write cursor over `n` samples placed via
    /// [`write_region`](Self::write_region).
    ///
    /// `n` is clamped to the length of the current write region.
    pub fn commit(&mut self, n: usize) {
        let max = self.space_available().min(self.capacity() - self.write);
        debug_assert!(n <= max, "commit({}) past write region of {}", n, max);
        self.write = (self.write + n.min(max)) & self.mask;
    }

    /// Drop everything and reset both cursors.
    pub fn flush(&mut self) {
        self.read = 0;
        self.write = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_invariant(rb: &RingBuffer<u32>) {
        assert_eq!(
            rb.data_available() + rb.space_available(),
            rb.capacity() - 1,
            "data {} + space {} != capacity - 1",
            rb.data_available(),
            rb.space_available()
        );
    }

    #[test]
    fn test_capacity_rounds_to_power_of_two() {
        let rb: RingBuffer<u32> = RingBuffer::new(1000);
        assert_eq!(rb.capacity(), 1024);
        assert_eq!(rb.space_available(), 1023);
        assert_eq!(rb.data_available(), 0);

        let rb: RingBuffer<u32> = RingBuffer::new(0);
        assert_eq!(rb.capacity(), 2);
    }

    #[test]
    fn test_invariant_over_mixed_traffic() {
        let mut rb: RingBuffer<u32> = RingBuffer::new(64);
        let mut next_in = 0u32;
        let mut next_out = 0u32;
        let mut out = vec![0u32; 64];

        // Pseudo-random chunk sizes, deterministic
        let mut seed = 12345u32;
        for _ in 0..2000 {
            seed = seed.wrapping_mul(1103515245).wrapping_add(12345);
            let w = (seed >> 16) as usize % 40;
            seed = seed.wrapping_mul(1103515245).wrapping_add(12345);
            let r = (seed >> 16) as usize % 40;

            let before = rb.data_available();
            let chunk: Vec<u32> = (0..w as u32).map(|i| next_in + i).collect();
            let written = rb.write(&chunk);
            assert!(written <= w);
            assert_eq!(rb.data_available(), before + written);
            next_in += written as u32;
            check_invariant(&rb);

            let unread = rb.data_available();
            let n = rb.read(&mut out[..r]);
            assert!(n <= unread, "read {} with only {} unread", n, unread);
            for &v in &out[..n] {
                assert_eq!(v, next_out);
                next_out += 1;
            }
            check_invariant(&rb);
        }
    }

    #[test]
    fn test_write_when_full_drops_and_keeps_cursors() {
        let mut rb: RingBuffer<u32> = RingBuffer::new(8);
        assert_eq!(rb.write(&[1, 2, 3, 4, 5, 6, 7, 8, 9]), 7);
        assert_eq!(rb.space_available(), 0);

        assert_eq!(rb.write(&[42]), 0);
        assert_eq!(rb.data_available(), 7);

        let mut out = [0u32; 8];
        assert_eq!(rb.read(&mut out), 7);
        assert_eq!(&out[..7], &[1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_read_underrun_returns_what_exists() {
        let mut rb: RingBuffer<u32> = RingBuffer::new(16);
        rb.write(&[10, 20, 30]);
        let mut out = [0u32; 10];
        assert_eq!(rb.read(&mut out), 3);
        assert_eq!(&out[..3], &[10, 20, 30]);
        assert_eq!(rb.read(&mut out), 0);
        check_invariant(&rb);
    }

    #[test]
    fn test_single_sample_order_across_wrap() {
        let mut rb: RingBuffer<u32> = RingBuffer::new(16);

        // Move both cursors near the end of storage first
        rb.write(&[0; 11]);
        let mut sink = [0u32; 11];
        rb.read(&mut sink);

        for i in 0..15u32 {
            assert_eq!(rb.write(&[i]), 1);
            check_invariant(&rb);
        }
        assert_eq!(rb.write(&[99]), 0);

        let mut one = [0u32; 1];
        for i in 0..15u32 {
            assert_eq!(rb.read(&mut one), 1);
            assert_eq!(one[0], i);
        }
        assert_eq!(rb.data_available(), 0);
    }

    #[test]
    fn test_flush_empties() {
        let mut rb: RingBuffer<u32> = RingBuffer::new(32);
        rb.write(&[1; 20]);
        rb.flush();
        assert_eq!(rb.data_available(), 0);
        assert_eq!(rb.space_available(), 31);
        check_invariant(&rb);
    }

    #[test]
    fn test_write_region_stops_at_storage_end() {
        let mut rb: RingBuffer<u32> = RingBuffer::new(16);
        rb.write(&[0; 12]);
        let mut sink = [0u32; 12];
        rb.read(&mut sink);

        // Write cursor at 12: only 4 contiguous slots before the wrap
        let region = rb.write_region();
        assert_eq!(region.len(), 4);
        region.copy_from_slice(&[1, 2, 3, 4]);
        rb.commit(4);

        // Next region starts at 0 and ends before the reserved slot
        let region = rb.write_region();
        assert_eq!(region.len(), 11);
        region[0] = 5;
        rb.commit(1);

        let mut out = [0u32; 5];
        assert_eq!(rb.read(&mut out), 5);
        assert_eq!(out, [1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_write_region_empty_when_full() {
        let mut rb: RingBuffer<u32> = RingBuffer::new(8);
        rb.write(&[7; 7]);
        assert!(rb.write_region().is_empty());
        check_invariant(&rb);
    }

    #[test]
    fn test_chunked_producer_without_consumer() {
        let mut rb: RingBuffer<u32> = RingBuffer::new(1024);
        let chunk = vec![1u32; 300];
        let mut total = 0;
        let mut remaining = 2000;
        while remaining > 0 {
            let n = remaining.min(300);
            total += rb.write(&chunk[..n]);
            remaining -= n;
            check_invariant(&rb);
        }
        assert_eq!(total, 1023);
        assert_eq!(rb.data_available(), 1023);
        assert_eq!(rb.space_available(), 0);
    }
}
