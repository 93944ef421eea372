// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bounded single-producer/single-consumer handoff queue used between the acquisition thread and
//! each channel worker.
//!
//! The original hands buffers to workers through an intrusive linked list guarded by a mutex and
//! condition variable. The target keeps the same wait-on-empty shape but backs the queue itself
//! with `crossbeam_queue::ArrayQueue`, which is wait-free for the single-producer/single-consumer
//! case this crate restricts itself to (see DESIGN.md).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crossbeam_queue::ArrayQueue;

use crate::buffer::SampleBuffer;
use crate::error::{self, Result};

/// A bounded SPSC queue of published sample buffers, with a condition variable so the consumer
/// can block (with a timeout) instead of busy-polling.
pub struct SpscQueue {
    ring: ArrayQueue<SampleBuffer>,
    lock: Mutex<()>,
    not_empty: Condvar,
    closed: AtomicBool,
}

impl SpscQueue {
    /// `capacity` should be a power of two per the spec's data model, though any positive value
    /// works.
    pub fn new(capacity: usize) -> SpscQueue {
        SpscQueue {
            ring: ArrayQueue::new(capacity.max(1)),
            lock: Mutex::new(()),
            not_empty: Condvar::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Push a buffer, waking one waiting consumer. Returns `Error::Busy` if the ring is full.
    pub fn push(&self, buf: SampleBuffer) -> Result<()> {
        let _guard = self.lock.lock().unwrap();
        self.ring.push(buf).map_err(|_| error::Error::Busy)?;
        self.not_empty.notify_one();
        Ok(())
    }

    /// Pop a buffer if one is ready, without blocking.
    pub fn try_pop(&self) -> Option<SampleBuffer> {
        self.ring.pop()
    }

    /// Block up to `timeout` waiting for a buffer. Returns `None` on timeout or if the queue was
    /// closed with nothing left to drain.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<SampleBuffer> {
        if let Some(buf) = self.ring.pop() {
            return Some(buf);
        }
        let guard = self.lock.lock().unwrap();
        let (_guard, _timed_out) = self
            .not_empty
            .wait_timeout_while(guard, timeout, |_| self.ring.is_empty() && !self.closed.load(Ordering::Acquire))
            .unwrap();
        self.ring.pop()
    }

    /// Mark the queue closed and wake any waiting consumer; used during cooperative shutdown.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let _guard = self.lock.lock().unwrap();
        self.not_empty.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::SampleKind;
    use std::sync::Arc;
    use std::thread;

    fn mk_buf() -> SampleBuffer {
        SampleBuffer::new(SampleKind::S16, 1, vec![0u8; 2], 1, None)
    }

    #[test]
    fn fifo_order_preserved() {
        let q = SpscQueue::new(4);
        q.push(mk_buf()).unwrap();
        q.push(mk_buf()).unwrap();
        assert_eq!(q.len(), 2);
        assert!(q.try_pop().is_some());
        assert!(q.try_pop().is_some());
        assert!(q.try_pop().is_none());
    }

    #[test]
    fn full_queue_reports_busy() {
        let q = SpscQueue::new(1);
        q.push(mk_buf()).unwrap();
        assert!(matches!(q.push(mk_buf()), Err(error::Error::Busy)));
    }

    #[test]
    fn consumer_wakes_on_producer_push() {
        let q = Arc::new(SpscQueue::new(4));
        let q2 = q.clone();
        let handle = thread::spawn(move || q2.pop_timeout(Duration::from_secs(2)));
        thread::sleep(Duration::from_millis(20));
        q.push(mk_buf()).unwrap();
        assert!(handle.join().unwrap().is_some());
    }

    #[test]
    fn close_wakes_blocked_consumer_with_none() {
        let q = Arc::new(SpscQueue::new(4));
        let q2 = q.clone();
        let handle = thread::spawn(move || q2.pop_timeout(Duration::from_secs(5)));
        thread::sleep(Duration::from_millis(20));
        q.close();
        assert!(handle.join().unwrap().is_none());
    }
}
