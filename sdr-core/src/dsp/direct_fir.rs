// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Direct-form complex FIR with integer decimation and baseband derotation.
//!
//! This is the channelizer stage: it walks a window of `ntaps` complex Q.15 input samples per
//! output sample, decimating by `decimation` and optionally derotating the result to re-center a
//! channel that sits off the receiver's tuned frequency. Grounded on the original's
//! `multifm/direct_fir.c`, whose scalar path (the NEON path is a vectorization of the identical
//! arithmetic) this follows tap for tap.

use crate::buffer::SampleBuffer;
use crate::dsp::q15::{derotation_phase_incr, ComplexQ15, ComplexQ30};
use crate::error::{Error, Result};

/// Derotation carrier state: a running Q.15 phasor advanced by a fixed increment per output.
#[derive(Debug, Clone, Copy)]
pub struct Derotator {
    pub phase: ComplexQ15,
    pub phase_incr: ComplexQ15,
}

impl Derotator {
    pub fn new(shift_hz: f64, sample_rate_hz: f64, decimation: u32) -> Derotator {
        Derotator { phase: ComplexQ15::new(i16::MAX, 0), phase_incr: derotation_phase_incr(shift_hz, sample_rate_hz, decimation) }
    }

    fn step(&mut self, sample: ComplexQ15) -> ComplexQ15 {
        let out = sample.mul_q15(self.phase);
        self.phase = self.phase.mul_q15(self.phase_incr);
        out
    }
}

/// Direct-form complex FIR channelizer: decimating, optionally derotating.
pub struct DirectFir {
    taps_re: Vec<i16>,
    taps_im: Vec<i16>,
    decimation: u32,
    active: Option<SampleBuffer>,
    next: Option<SampleBuffer>,
    sample_offset: usize,
    derotator: Option<Derotator>,
}

impl DirectFir {
    /// `taps_re`/`taps_im` are Q.15 coefficients; for a real-valued prototype filter pass the
    /// same array for both (or an all-zero `taps_im`).
    pub fn new(taps_re: Vec<i16>, taps_im: Vec<i16>, decimation: u32, derotator: Option<Derotator>) -> DirectFir {
        assert_eq!(taps_re.len(), taps_im.len(), "real/imag tap arrays must match in length");
        assert!(decimation >= 1);
        DirectFir { taps_re, taps_im, decimation, active: None, next: None, sample_offset: 0, derotator }
    }

    pub fn ntaps(&self) -> usize {
        self.taps_re.len()
    }

    /// Adopt a newly published buffer. Fails with `Error::Busy` if both the active and
    /// lookahead slots are already occupied.
    pub fn push_buffer(&mut self, buf: SampleBuffer) -> Result<()> {
        if self.active.is_none() {
            self.active = Some(buf);
        } else if self.next.is_none() {
            self.next = Some(buf);
        } else {
            return Err(Error::Busy);
        }
        Ok(())
    }

    /// Samples available from `sample_offset` to the end of `active` plus all of `next`.
    fn available(&self) -> usize {
        let active_remaining = self.active.as_ref().map(|b| b.nr_samples() - self.sample_offset).unwrap_or(0);
        let next_len = self.next.as_ref().map(|b| b.nr_samples()).unwrap_or(0);
        active_remaining + next_len
    }

    /// True iff enough samples are queued to produce at least one output.
    pub fn can_process(&self) -> bool {
        self.available() >= self.ntaps()
    }

    /// Estimated number of outputs producible without further input.
    pub fn est_out_count(&self) -> usize {
        let avail = self.available();
        if avail < self.ntaps() {
            0
        } else {
            (avail - self.ntaps()) / self.decimation as usize + 1
        }
    }

    /// Fetch the complex sample at `offset` samples past the current window start, spanning
    /// `active` into `next` transparently.
    fn sample_at(&self, offset: usize) -> ComplexQ15 {
        let active = self.active.as_ref().expect("sample_at called with no active buffer");
        let active_i16 = active.as_i16();
        let active_remaining = active.nr_samples() - self.sample_offset;
        if offset < active_remaining {
            let idx = self.sample_offset + offset;
            ComplexQ15::new(active_i16[2 * idx], active_i16[2 * idx + 1])
        } else {
            let next = self.next.as_ref().expect("window ran past active+next");
            let idx = offset - active_remaining;
            let next_i16 = next.as_i16();
            ComplexQ15::new(next_i16[2 * idx], next_i16[2 * idx + 1])
        }
    }

    fn roll_buffers(&mut self) {
        loop {
            let active_len = match &self.active {
                Some(b) => b.nr_samples(),
                None => return,
            };
            if self.sample_offset < active_len {
                return;
            }
            self.sample_offset -= active_len;
            self.active = self.next.take();
            if self.active.is_none() {
                return;
            }
        }
    }

    /// Produce up to `out.len()` decimated, derotated complex Q.15 samples. Returns the number
    /// actually produced; running dry is not an error (§7), just a zero/short result.
    pub fn process(&mut self, out: &mut [ComplexQ15]) -> usize {
        let ntaps = self.ntaps();
        let mut produced = 0;
        while produced < out.len() && self.available() >= ntaps {
            let mut acc = ComplexQ30::ZERO;
            for k in 0..ntaps {
                let s = self.sample_at(k);
                let c = ComplexQ15::new(self.taps_re[k], self.taps_im[k]);
                s.mac_q30(c, &mut acc);
            }
            let mut result = acc.round_to_q15();
            if let Some(der) = self.derotator.as_mut() {
                result = der.step(result);
            }
            out[produced] = result;
            produced += 1;

            self.sample_offset += self.decimation as usize;
            self.roll_buffers();
        }
        produced
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::SampleKind;

    fn make_buf(samples: &[(i16, i16)]) -> SampleBuffer {
        let mut bytes = Vec::with_capacity(samples.len() * 4);
        for (re, im) in samples {
            bytes.extend_from_slice(&re.to_ne_bytes());
            bytes.extend_from_slice(&im.to_ne_bytes());
        }
        SampleBuffer::new(SampleKind::Cs16, samples.len(), bytes, 1, None)
    }

    #[test]
    fn impulse_response_recovers_taps() {
        let taps_re = vec![100, 200, 300, 400];
        let taps_im = vec![0, 0, 0, 0];
        let mut fir = DirectFir::new(taps_re.clone(), taps_im, 1, None);
        let mut samples = vec![(0i16, 0i16); 8];
        samples[0] = (i16::MAX, 0);
        fir.push_buffer(make_buf(&samples)).unwrap();
        let mut out = vec![ComplexQ15::ZERO; 5];
        let n = fir.process(&mut out);
        assert_eq!(n, 5);
        // out[i] should track taps_re[ntaps-1-i] scaled by ~1.0 (i16::MAX isn't quite 1.0).
        for i in 0..4 {
            let expect = taps_re[3 - i];
            assert!((out[i].re - expect).abs() <= 2, "out[{}]={} expect~{}", i, out[i].re, expect);
        }
    }

    #[test]
    fn decimation_one_output_length_matches_identity() {
        let ntaps = 4;
        let mut fir = DirectFir::new(vec![1000; ntaps], vec![0; ntaps], 1, None);
        let input_len = 10;
        fir.push_buffer(make_buf(&vec![(1, 1); input_len])).unwrap();
        let mut out = vec![ComplexQ15::ZERO; 32];
        let n = fir.process(&mut out);
        assert_eq!(n, input_len - ntaps + 1);
    }

    #[test]
    fn busy_when_both_slots_full() {
        let mut fir = DirectFir::new(vec![1], vec![0], 1, None);
        fir.push_buffer(make_buf(&[(1, 0)])).unwrap();
        fir.push_buffer(make_buf(&[(1, 0)])).unwrap();
        assert!(matches!(fir.push_buffer(make_buf(&[(1, 0)])), Err(Error::Busy)));
    }

    #[test]
    fn window_spans_active_and_next() {
        let ntaps = 4;
        let mut fir = DirectFir::new(vec![1000; ntaps], vec![0; ntaps], 1, None);
        fir.push_buffer(make_buf(&vec![(1, 0); 3])).unwrap();
        fir.push_buffer(make_buf(&vec![(1, 0); 3])).unwrap();
        let mut out = vec![ComplexQ15::ZERO; 8];
        let n = fir.process(&mut out);
        assert_eq!(n, 3);
    }
}
