// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Zero-copy, reference-counted sample buffers.
//!
//! A [`SampleBuffer`] is published once by a producer with its refcount set to the number of
//! consumers that will see it, then treated as immutable: every consumer only reads. The last
//! `Drop` invokes the buffer's release callback, which in the normal case returns the backing
//! frame to a [`crate::alloc::FrameAllocator`].

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// The wire sample format carried by a buffer's payload bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    /// Interleaved complex `i16` (I, Q, I, Q, ...).
    Cs16,
    /// Real `i16`.
    S16,
    /// Interleaved complex `i8`, zero-centered in Q.7.
    Cs8,
}

impl SampleKind {
    /// Bytes occupied by one sample of this kind.
    pub const fn sample_bytes(self) -> usize {
        match self {
            SampleKind::Cs16 => 4,
            SampleKind::S16 => 2,
            SampleKind::Cs8 => 2,
        }
    }
}

/// A boxed release callback, invoked exactly once when the last reference is dropped.
pub type ReleaseFn = Box<dyn FnMut(&mut Vec<u8>) + Send>;

struct Inner {
    kind: SampleKind,
    nr_samples: usize,
    data: Vec<u8>,
    refcount: AtomicUsize,
    release: Option<ReleaseFn>,
}

/// A fixed-capacity, reference-counted block of samples.
///
/// Cloning a `SampleBuffer` increments the refcount and hands out a new handle to the same
/// backing storage; it does not copy the payload. This is the "consumer" side of the zero-copy
/// contract described in the data model: the producer calls [`SampleBuffer::new`] once with the
/// number of subscribing consumers, then clones it into each consumer's queue.
pub struct SampleBuffer {
    inner: *mut Inner,
}

// SAFETY: `Inner` is only mutated through atomic refcount ops and the release callback, which
// runs exactly once after the last reference is dropped; the payload itself is never mutated
// once published, so shared read access from multiple threads is sound.
unsafe impl Send for SampleBuffer {}
unsafe impl Sync for SampleBuffer {}

impl SampleBuffer {
    /// Construct a new buffer with `nr_consumers` initial references.
    ///
    /// Panics if `nr_consumers` is zero: a buffer with no consumers can never be released.
    pub fn new(kind: SampleKind, nr_samples: usize, data: Vec<u8>, nr_consumers: usize, release: Option<ReleaseFn>) -> SampleBuffer {
        assert!(nr_consumers > 0, "sample buffer must have at least one consumer");
        let inner = Box::into_raw(Box::new(Inner {
            kind,
            nr_samples,
            data,
            refcount: AtomicUsize::new(nr_consumers),
            release,
        }));
        SampleBuffer { inner }
    }

    fn inner(&self) -> &Inner {
        // SAFETY: `inner` is valid until the refcount reaches zero, which only happens in
        // `drop`, after which no `SampleBuffer` handle referencing it remains.
        unsafe { &*self.inner }
    }

    pub fn kind(&self) -> SampleKind {
        self.inner().kind
    }

    pub fn nr_samples(&self) -> usize {
        self.inner().nr_samples
    }

    pub fn bytes(&self) -> &[u8] {
        &self.inner().data
    }

    /// Current outstanding reference count. Racy by construction; intended for diagnostics.
    pub fn refcount(&self) -> usize {
        self.inner().refcount.load(Ordering::Acquire)
    }

    /// Reinterpret the payload as interleaved `i16` samples (valid for `Cs16` and `S16`).
    pub fn as_i16(&self) -> &[i16] {
        let bytes = self.bytes();
        // SAFETY: the allocator always sizes frames to an even number of bytes and `i16`'s
        // alignment is 2; buffers are never mutated after publication.
        unsafe { std::slice::from_raw_parts(bytes.as_ptr() as *const i16, bytes.len() / 2) }
    }
}

impl Clone for SampleBuffer {
    fn clone(&self) -> SampleBuffer {
        self.inner().refcount.fetch_add(1, Ordering::AcqRel);
        SampleBuffer { inner: self.inner }
    }
}

impl Drop for SampleBuffer {
    fn drop(&mut self) {
        let prev = self.inner().refcount.fetch_sub(1, Ordering::AcqRel);
        if prev == 1 {
            // SAFETY: we just observed the last reference; no other handle can be alive to race
            // with this reclaim.
            let mut boxed = unsafe { Box::from_raw(self.inner) };
            if let Some(mut release) = boxed.release.take() {
                release(&mut boxed.data);
            }
        }
    }
}

impl fmt::Debug for SampleBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleBuffer")
            .field("kind", &self.kind())
            .field("nr_samples", &self.nr_samples())
            .field("refcount", &self.refcount())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    #[test]
    fn release_fires_exactly_once_after_last_drop() {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_cb = fired.clone();
        let release: ReleaseFn = Box::new(move |_| {
            fired_cb.fetch_add(1, Ordering::SeqCst);
        });
        let buf = SampleBuffer::new(SampleKind::Cs16, 4, vec![0u8; 16], 3, Some(release));
        let b2 = buf.clone();
        let b3 = buf.clone();
        assert_eq!(buf.refcount(), 3);
        drop(buf);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        drop(b2);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        drop(b3);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn as_i16_reads_interleaved_samples() {
        let bytes = 1i16.to_ne_bytes().iter().chain(2i16.to_ne_bytes().iter()).copied().collect::<Vec<u8>>();
        let buf = SampleBuffer::new(SampleKind::Cs16, 1, bytes, 1, None);
        assert_eq!(buf.as_i16(), &[1, 2]);
        let _ = AtomicBool::new(false);
    }

    #[test]
    #[should_panic]
    fn zero_consumers_panics() {
        let _ = SampleBuffer::new(SampleKind::S16, 0, Vec::new(), 0, None);
    }
}
