// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The acquisition thread and per-channel demodulation workers.
//!
//! Grounded on `multifm/receiver.c`'s `receiver_sample_buf_alloc`/`receiver_sample_buf_deliver`
//! (frame-pool allocation with a one-shot exhaustion log, refcount set to the consumer count,
//! fan-out into each channel's work queue) and `multifm/demod.c`'s per-channel pipeline shape
//! (channelizer FIR, optional DC blocker, optional rational resampler, FM demodulator, protocol
//! decoder). Shutdown is cooperative: each worker polls a shared `running` flag between blocks
//! instead of being killed outright, so an in-flight protocol decode is never torn down mid-page.

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sdr_core::alloc::{Frame, FrameAllocator};
use sdr_core::buffer::{SampleBuffer, SampleKind};
use sdr_core::dsp::dc_blocker::DcBlocker;
use sdr_core::dsp::direct_fir::DirectFir;
use sdr_core::dsp::fm_demod::FmDemod;
use sdr_core::dsp::polyphase_fir::PolyphaseFirReal;
use sdr_core::dsp::q15::ComplexQ15;
use sdr_core::error::Error;
use sdr_core::queue::SpscQueue;

use crate::decoder::ChannelDecoder;
use crate::sink::PcmSink;
use crate::source::SampleSource;

/// How long a channel worker blocks on its queue before re-checking `running`. Bounds shutdown
/// latency without busy-polling.
const WORKER_POLL: Duration = Duration::from_millis(200);

/// Lifecycle of a single worker thread, exposed so `sdr-play` can report status without reaching
/// into thread-local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Starting = 0,
    Running = 1,
    ShutdownRequested = 2,
    Shutdown = 3,
}

impl WorkerState {
    fn from_u8(v: u8) -> WorkerState {
        match v {
            0 => WorkerState::Starting,
            1 => WorkerState::Running,
            2 => WorkerState::ShutdownRequested,
            _ => WorkerState::Shutdown,
        }
    }
}

/// An atomic cell holding a [`WorkerState`], shared between a worker and whoever is supervising
/// it (e.g. the `ctrlc` handler or a status endpoint).
#[derive(Default)]
pub struct WorkerStateCell(AtomicU8);

impl WorkerStateCell {
    pub fn new() -> WorkerStateCell {
        WorkerStateCell(AtomicU8::new(WorkerState::Starting as u8))
    }

    pub fn set(&self, state: WorkerState) {
        self.0.store(state as u8, Ordering::Release);
    }

    pub fn get(&self) -> WorkerState {
        WorkerState::from_u8(self.0.load(Ordering::Acquire))
    }
}

/// Pulls raw samples from a [`SampleSource`], widens `Cs8` to `Cs16` if needed, and fans out
/// frame-pool-backed [`SampleBuffer`]s to every channel's queue.
pub struct Acquisition {
    source: Box<dyn SampleSource>,
    allocator: Arc<FrameAllocator>,
    queues: Vec<Arc<SpscQueue>>,
    samples_per_buf: usize,
    nr_samp_buf_alloc_fails: AtomicU64,
    nr_queue_drops: AtomicU64,
    logged_alloc_fail: AtomicBool,
    logged_queue_full: AtomicBool,
}

impl Acquisition {
    pub fn new(source: Box<dyn SampleSource>, allocator: Arc<FrameAllocator>, queues: Vec<Arc<SpscQueue>>, samples_per_buf: usize) -> Acquisition {
        Acquisition {
            source,
            allocator,
            queues,
            samples_per_buf,
            nr_samp_buf_alloc_fails: AtomicU64::new(0),
            nr_queue_drops: AtomicU64::new(0),
            logged_alloc_fail: AtomicBool::new(false),
            logged_queue_full: AtomicBool::new(false),
        }
    }

    /// Count of incoming buffers dropped because the frame pool was exhausted (§4.1/§5
    /// backpressure).
    pub fn nr_samp_buf_alloc_fails(&self) -> u64 {
        self.nr_samp_buf_alloc_fails.load(Ordering::Relaxed)
    }

    /// Count of per-channel queue pushes dropped because a channel's work queue was full. A
    /// different condition from frame-pool exhaustion: the buffer was allocated fine, but a slow
    /// consumer couldn't keep up.
    pub fn nr_queue_drops(&self) -> u64 {
        self.nr_queue_drops.load(Ordering::Relaxed)
    }

    /// Runs the acquisition loop until the source is exhausted or `running` is cleared.
    pub fn run(&mut self, running: &AtomicBool) {
        let source_kind = self.source.kind();
        let raw_sample_bytes = source_kind.sample_bytes();
        let raw_len = self.samples_per_buf * raw_sample_bytes;
        let mut raw_buf = vec![0u8; raw_len];

        while running.load(Ordering::Relaxed) {
            let n = match self.source.read_samples(&mut raw_buf) {
                Ok(n) => n,
                Err(Error::EndOfFile) => {
                    log::info!("acquisition: source exhausted");
                    break;
                }
                Err(e) => {
                    log::warn!("acquisition: read failed: {e}");
                    break;
                }
            };
            if n == 0 {
                continue;
            }
            let nr_samples = n / raw_sample_bytes;
            self.deliver(source_kind, &raw_buf[..n], nr_samples);
        }
    }

    fn deliver(&self, kind: SampleKind, raw: &[u8], nr_samples: usize) {
        let (out_kind, bytes) = match kind {
            SampleKind::Cs8 => {
                // Widen zero-centered Q.7 complex samples to Q.15 so every downstream stage
                // only ever has to handle one interleaved complex format.
                let mut widened = Vec::with_capacity(raw.len() * 2);
                for &byte in raw {
                    let q7 = byte as i8 as i32;
                    let q15 = (q7 * 256).clamp(i16::MIN as i32, i16::MAX as i32) as i16;
                    widened.extend_from_slice(&q15.to_ne_bytes());
                }
                (SampleKind::Cs16, widened)
            }
            other => (other, raw.to_vec()),
        };

        // Draw the buffer's backing storage from the frame pool; an exhausted pool is
        // backpressure, not an error, so the incoming buffer is dropped and counted.
        let frame = match self.allocator.alloc() {
            Some(frame) => frame,
            None => {
                if !self.logged_alloc_fail.swap(true, Ordering::Relaxed) {
                    log::warn!("acquisition: frame pool exhausted, dropping a sample buffer");
                }
                self.nr_samp_buf_alloc_fails.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };
        let mut data = frame.into_vec();
        data.clear();
        data.extend_from_slice(&bytes);

        let allocator = self.allocator.clone();
        let release = Box::new(move |data: &mut Vec<u8>| {
            allocator.free(Frame::from_vec(std::mem::take(data)));
        });

        // Initial refcount is the number of active consumers (one per channel queue the buffer
        // fans out to); the buffer returns to the pool once every consumer has dropped its
        // clone. See §4.10.
        let nr_consumers = self.queues.len().max(1);
        let buf = SampleBuffer::new(out_kind, nr_samples, data, nr_consumers, Some(release));

        if self.queues.is_empty() {
            return;
        }
        for queue in &self.queues {
            if queue.push(buf.clone()).is_err() {
                if !self.logged_queue_full.swap(true, Ordering::Relaxed) {
                    log::warn!("acquisition: channel queue full, dropping a sample buffer");
                }
                self.nr_queue_drops.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Where a channel's demodulated PCM goes once it leaves the FM demodulator.
enum ChannelOutput<W: Write> {
    Decoder(ChannelDecoder<W>),
    Pcm(PcmSink<W>),
}

/// The full per-channel DSP chain: channelizer FIR, optional DC blocker, optional resampler, FM
/// demodulator, and a protocol decoder or raw PCM sink.
pub struct ChannelWorker<W: Write> {
    freq_hz: u32,
    direct_fir: DirectFir,
    dc_blocker: Option<DcBlocker>,
    resampler: Option<PolyphaseFirReal>,
    fm_demod: FmDemod,
    squelch_dbfs: i32,
    output: ChannelOutput<W>,
}

impl<W: Write> ChannelWorker<W> {
    pub fn new(
        freq_hz: u32,
        direct_fir: DirectFir,
        dc_blocker: Option<DcBlocker>,
        resampler: Option<PolyphaseFirReal>,
        squelch_dbfs: i32,
        decoder: ChannelDecoder<W>,
    ) -> ChannelWorker<W> {
        ChannelWorker {
            freq_hz,
            direct_fir,
            dc_blocker,
            resampler,
            fm_demod: FmDemod::new(),
            squelch_dbfs,
            output: ChannelOutput::Decoder(decoder),
        }
    }

    pub fn new_pcm(
        freq_hz: u32,
        direct_fir: DirectFir,
        dc_blocker: Option<DcBlocker>,
        resampler: Option<PolyphaseFirReal>,
        squelch_dbfs: i32,
        sink: PcmSink<W>,
    ) -> ChannelWorker<W> {
        ChannelWorker {
            freq_hz,
            direct_fir,
            dc_blocker,
            resampler,
            fm_demod: FmDemod::new(),
            squelch_dbfs,
            output: ChannelOutput::Pcm(sink),
        }
    }

    pub fn freq_hz(&self) -> u32 {
        self.freq_hz
    }

    /// Blocks on `queue` until a buffer arrives, `running` is cleared, or the queue is closed.
    pub fn run(&mut self, queue: &SpscQueue, running: &AtomicBool, state: &WorkerStateCell) {
        state.set(WorkerState::Running);
        loop {
            if !running.load(Ordering::Relaxed) {
                break;
            }
            match queue.pop_timeout(WORKER_POLL) {
                Some(buf) => self.process_buffer(buf),
                None => {
                    if queue.is_closed() {
                        break;
                    }
                }
            }
        }
        state.set(WorkerState::ShutdownRequested);
        self.drain(queue);
        state.set(WorkerState::Shutdown);
    }

    /// Pops whatever is left in the queue once shutdown has been requested, so buffers already
    /// in flight aren't silently discarded.
    fn drain(&mut self, queue: &SpscQueue) {
        while let Some(buf) = queue.try_pop() {
            self.process_buffer(buf);
        }
    }

    fn process_buffer(&mut self, buf: SampleBuffer) {
        if self.direct_fir.push_buffer(buf).is_err() {
            log::warn!("channel {}: both FIR slots full, dropping buffer", self.freq_hz);
            return;
        }

        let mut complex_out = vec![ComplexQ15::ZERO; self.direct_fir.est_out_count().max(256)];
        while self.direct_fir.can_process() {
            let n = self.direct_fir.process(&mut complex_out);
            if n == 0 {
                break;
            }
            self.demodulate(&complex_out[..n]);
        }
    }

    fn demodulate(&mut self, complex: &[ComplexQ15]) {
        let mut pcm = vec![0i16; complex.len()];
        let n = self.fm_demod.process(complex, self.squelch_dbfs, &mut pcm);
        let pcm = &mut pcm[..n];

        if let Some(blocker) = self.dc_blocker.as_mut() {
            blocker.process(pcm);
        }

        match self.resampler.as_mut() {
            Some(resampler) => {
                if resampler.push_buffer(pcm.to_vec()).is_err() {
                    log::warn!("channel {}: resampler slots full, dropping block", self.freq_hz);
                    return;
                }
                let mut out = vec![0i16; n.max(256)];
                while resampler.can_process() {
                    let produced = resampler.process(&mut out);
                    if produced == 0 {
                        break;
                    }
                    self.deliver(&out[..produced]);
                }
            }
            None => self.deliver(pcm),
        }
    }

    fn deliver(&mut self, pcm: &[i16]) {
        match &mut self.output {
            ChannelOutput::Decoder(decoder) => decoder.process(pcm),
            ChannelOutput::Pcm(sink) => {
                if let Err(e) = sink.write_samples(pcm) {
                    log::warn!("channel {}: failed to write PCM: {e}", self.freq_hz);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdr_core::dsp::q15::f32_to_q15;
    use std::sync::atomic::AtomicBool;

    fn unity_fir() -> DirectFir {
        DirectFir::new(vec![i16::MAX], vec![0], 1, None)
    }

    #[test]
    fn pcm_channel_worker_passes_samples_through_to_its_sink() {
        let mut worker = ChannelWorker::new_pcm(915_000_000, unity_fir(), None, None, 0, PcmSink::new(Vec::new()));

        let mut bytes = Vec::new();
        for v in [1000i16, -1000, 2000, -2000] {
            bytes.extend_from_slice(&v.to_ne_bytes());
            bytes.extend_from_slice(&0i16.to_ne_bytes());
        }
        let buf = SampleBuffer::new(SampleKind::Cs16, 4, bytes, 1, None);
        worker.process_buffer(buf);
        let ChannelOutput::Pcm(sink) = &worker.output else { panic!("expected a PCM sink") };
        assert_eq!(sink.nr_dropped(), 0);
    }

    #[test]
    fn acquisition_delivers_to_every_channel_queue() {
        let allocator = Arc::new(FrameAllocator::new(4, 64));
        let q1 = Arc::new(SpscQueue::new(4));
        let q2 = Arc::new(SpscQueue::new(4));

        struct Fixed(Vec<u8>, bool);
        impl SampleSource for Fixed {
            fn kind(&self) -> SampleKind {
                SampleKind::S16
            }
            fn read_samples(&mut self, buf: &mut [u8]) -> sdr_core::error::Result<usize> {
                if self.1 {
                    return Err(Error::EndOfFile);
                }
                self.1 = true;
                let n = self.0.len().min(buf.len());
                buf[..n].copy_from_slice(&self.0[..n]);
                Ok(n)
            }
        }

        let samples: Vec<u8> = (0..16i16).flat_map(|v| v.to_ne_bytes()).collect();
        let mut acq = Acquisition::new(Box::new(Fixed(samples, false)), allocator, vec![q1.clone(), q2.clone()], 16);
        let running = AtomicBool::new(true);
        acq.run(&running);

        assert_eq!(q1.len(), 1);
        assert_eq!(q2.len(), 1);
    }

    #[test]
    fn acquisition_drops_and_counts_when_the_frame_pool_is_exhausted() {
        let allocator = Arc::new(FrameAllocator::new(1, 64));
        let held = allocator.alloc().unwrap();
        let q1 = Arc::new(SpscQueue::new(4));

        struct Fixed(Vec<u8>, bool);
        impl SampleSource for Fixed {
            fn kind(&self) -> SampleKind {
                SampleKind::S16
            }
            fn read_samples(&mut self, buf: &mut [u8]) -> sdr_core::error::Result<usize> {
                if self.1 {
                    return Err(Error::EndOfFile);
                }
                self.1 = true;
                let n = self.0.len().min(buf.len());
                buf[..n].copy_from_slice(&self.0[..n]);
                Ok(n)
            }
        }

        let samples: Vec<u8> = (0..16i16).flat_map(|v| v.to_ne_bytes()).collect();
        let mut acq = Acquisition::new(Box::new(Fixed(samples, false)), allocator, vec![q1.clone()], 16);
        let running = AtomicBool::new(true);
        acq.run(&running);

        assert_eq!(q1.len(), 0);
        assert_eq!(acq.nr_samp_buf_alloc_fails(), 1);
        assert_eq!(acq.nr_queue_drops(), 0);
        drop(held);
    }

    #[test]
    fn q15_conversion_helper_is_exercised_by_squelch_threshold() {
        assert_eq!(f32_to_q15(0.0), 0);
    }
}
