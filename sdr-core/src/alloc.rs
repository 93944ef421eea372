// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fixed-size frame allocator backing the sample-buffer pool.
//!
//! Grounded on the original's `frame_alloc.c`, which implements a lock-free LIFO stack of frames
//! via a tagged-counter double-wide CAS to dodge ABA. That primitive needs a 128-bit CAS and is
//! awkward to express soundly in safe Rust; `crossbeam_queue::ArrayQueue` gives the same
//! alloc/free semantics (bounded capacity, lock-free, no ABA hazard since slots are indexed, not
//! pointer-chained) without `unsafe`. See DESIGN.md for the full rationale.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_queue::ArrayQueue;

/// A single fixed-size frame handed out by the allocator. Not returned to the pool on `Drop`;
/// the caller is responsible for routing it back to [`FrameAllocator::free`] (e.g. via a
/// [`crate::buffer::SampleBuffer`] release callback) once it is done with the backing storage.
pub struct Frame {
    data: Vec<u8>,
}

impl Frame {
    /// Wrap an existing buffer as a frame, e.g. to hand storage reclaimed from a
    /// [`crate::buffer::SampleBuffer`] back to [`FrameAllocator::free`].
    pub fn from_vec(data: Vec<u8>) -> Frame {
        Frame { data }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Consume the frame, handing its backing storage to the caller (e.g. for installation into
    /// a [`crate::buffer::SampleBuffer`]). The frame is *not* returned to the pool; the caller is
    /// responsible for routing it back via the buffer's release callback.
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

/// Lock-free pool of fixed-size byte frames.
///
/// `alloc()` returns `None` when the pool is exhausted; callers treat this as backpressure
/// (drop the incoming data, bump a counter) rather than an error, matching §4.1 of the spec.
pub struct FrameAllocator {
    free: ArrayQueue<Vec<u8>>,
    frame_size: usize,
    allocs: AtomicU64,
    frees: AtomicU64,
}

impl FrameAllocator {
    /// Build a pool of `nr_frames` frames, each `frame_size` bytes, pre-filled and ready to hand
    /// out.
    pub fn new(nr_frames: usize, frame_size: usize) -> FrameAllocator {
        let free = ArrayQueue::new(nr_frames.max(1));
        for _ in 0..nr_frames {
            let _ = free.push(vec![0u8; frame_size]);
        }
        FrameAllocator { free, frame_size, allocs: AtomicU64::new(0), frees: AtomicU64::new(0) }
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn capacity(&self) -> usize {
        self.free.capacity()
    }

    /// Pop a free frame, or `None` if the pool is exhausted.
    pub fn alloc(&self) -> Option<Frame> {
        let data = self.free.pop();
        if data.is_some() {
            self.allocs.fetch_add(1, Ordering::Relaxed);
        }
        data.map(Frame::from_vec)
    }

    /// Return a frame to the pool. Frames of the wrong size are still accepted (the allocator
    /// does not re-validate length on free) but a caller that round-trips through `alloc`/`free`
    /// correctly will always hand back a frame of `frame_size` bytes.
    pub fn free(&self, frame: Frame) {
        let mut data = frame.into_vec();
        data.clear();
        data.resize(self.frame_size, 0);
        // Pool is bounded to its original capacity; a push that would exceed it indicates a
        // caller freed more frames than were ever allocated, which we treat as a silent drop
        // rather than a panic, since frame accounting is advisory, not safety-critical.
        let _ = self.free.push(data);
        self.frees.fetch_add(1, Ordering::Relaxed);
    }

    /// Total number of successful `alloc` calls since construction.
    pub fn nr_allocs(&self) -> u64 {
        self.allocs.load(Ordering::Relaxed)
    }

    /// Total number of `free` calls since construction.
    pub fn nr_frees(&self) -> u64 {
        self.frees.load(Ordering::Relaxed)
    }

    /// Outstanding frame count: allocs minus frees. Zero when every frame has been returned.
    pub fn outstanding(&self) -> u64 {
        self.nr_allocs().saturating_sub(self.nr_frees())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn alloc_exhaustion_returns_none() {
        let pool = FrameAllocator::new(2, 16);
        let a = pool.alloc();
        let b = pool.alloc();
        assert!(a.is_some() && b.is_some());
        assert!(pool.alloc().is_none());
    }

    #[test]
    fn free_then_alloc_reuses_frame() {
        let pool = FrameAllocator::new(1, 16);
        let frame = pool.alloc().unwrap();
        assert!(pool.alloc().is_none());
        pool.free(frame);
        assert!(pool.alloc().is_some());
        assert_eq!(pool.outstanding(), 1);
    }

    #[test]
    fn concurrent_alloc_free_converges_to_zero_outstanding() {
        let pool = Arc::new(FrameAllocator::new(64, 64));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..5000 {
                    if let Some(f) = pool.alloc() {
                        pool.free(f);
                    }
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(pool.outstanding(), 0);
        assert_eq!(pool.nr_allocs(), pool.nr_frees());
    }
}
