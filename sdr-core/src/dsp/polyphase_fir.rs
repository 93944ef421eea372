// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Polyphase FIR for rational-factor resampling, real or complex.
//!
//! Grounded on `filter/polyphase_cfir.c`: coefficients are repacked once at construction into
//! `interp` phase sub-filters (sub-filter `i` holds taps `i, interp+i, 2*interp+i, ...`,
//! zero-padded to a multiple of four), then each output sample dot-products one sub-filter
//! against the input window and advances the fractional phase accumulator by `decim`.

use crate::buffer::SampleBuffer;
use crate::dsp::direct_fir::Derotator;
use crate::dsp::q15::{ComplexQ15, ComplexQ30};
use crate::error::{Error, Result};

fn pack_phases(taps: &[i16], interp: usize) -> Vec<Vec<i16>> {
    let per_phase = (taps.len() + interp - 1) / interp;
    let padded_len = ((per_phase + 3) / 4) * 4;
    let mut phases = vec![vec![0i16; padded_len]; interp];
    for (k, &tap) in taps.iter().enumerate() {
        let phase = k % interp;
        let slot = k / interp;
        phases[phase][slot] = tap;
    }
    phases
}

/// Real-valued polyphase resampler (e.g. the audio-rate output stage).
pub struct PolyphaseFirReal {
    phases: Vec<Vec<i16>>,
    interp: u32,
    decim: u32,
    active: Option<Vec<i16>>,
    next: Option<Vec<i16>>,
    sample_offset: usize,
    last_phase: u32,
}

impl PolyphaseFirReal {
    pub fn new(taps: &[i16], interp: u32, decim: u32) -> PolyphaseFirReal {
        assert!(interp >= 1 && decim >= 1);
        PolyphaseFirReal {
            phases: pack_phases(taps, interp as usize),
            interp,
            decim,
            active: None,
            next: None,
            sample_offset: 0,
            last_phase: 0,
        }
    }

    pub fn push_buffer(&mut self, samples: Vec<i16>) -> Result<()> {
        if self.active.is_none() {
            self.active = Some(samples);
        } else if self.next.is_none() {
            self.next = Some(samples);
        } else {
            return Err(Error::Busy);
        }
        Ok(())
    }

    fn available(&self) -> usize {
        let active_remaining = self.active.as_ref().map(|b| b.len() - self.sample_offset).unwrap_or(0);
        let next_len = self.next.as_ref().map(|b| b.len()).unwrap_or(0);
        active_remaining + next_len
    }

    fn phase_len(&self) -> usize {
        self.phases[0].len()
    }

    pub fn can_process(&self) -> bool {
        self.available() >= self.phase_len()
    }

    fn sample_at(&self, offset: usize) -> i16 {
        let active = self.active.as_ref().expect("sample_at with no active buffer");
        let active_remaining = active.len() - self.sample_offset;
        if offset < active_remaining {
            active[self.sample_offset + offset]
        } else {
            self.next.as_ref().expect("window ran past active+next")[offset - active_remaining]
        }
    }

    fn roll_buffers(&mut self) {
        loop {
            let active_len = match &self.active {
                Some(b) => b.len(),
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

    pub fn process(&mut self, out: &mut [i16]) -> usize {
        let phase_len = self.phase_len();
        let mut produced = 0;
        while produced < out.len() && self.available() >= phase_len {
            let sub = &self.phases[self.last_phase as usize];
            let mut acc: i32 = 0;
            for k in 0..phase_len {
                acc += (sub[k] as i32) * (self.sample_at(k) as i32);
            }
            out[produced] = crate::dsp::q15::round_q30_to_q15(acc);
            produced += 1;

            let mut p = self.last_phase + self.decim;
            self.sample_offset += (p / self.interp) as usize;
            p %= self.interp;
            self.last_phase = p;
            self.roll_buffers();
        }
        produced
    }
}

/// Complex-valued polyphase resampler, optionally derotating like the direct FIR.
pub struct PolyphaseFirComplex {
    phases: Vec<Vec<i16>>,
    interp: u32,
    decim: u32,
    active: Option<SampleBuffer>,
    next: Option<SampleBuffer>,
    sample_offset: usize,
    last_phase: u32,
    derotator: Option<Derotator>,
}

impl PolyphaseFirComplex {
    pub fn new(taps: &[i16], interp: u32, decim: u32, derotator: Option<Derotator>) -> PolyphaseFirComplex {
        assert!(interp >= 1 && decim >= 1);
        PolyphaseFirComplex {
            phases: pack_phases(taps, interp as usize),
            interp,
            decim,
            active: None,
            next: None,
            sample_offset: 0,
            last_phase: 0,
            derotator,
        }
    }

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

    fn available(&self) -> usize {
        let active_remaining = self.active.as_ref().map(|b| b.nr_samples() - self.sample_offset).unwrap_or(0);
        let next_len = self.next.as_ref().map(|b| b.nr_samples()).unwrap_or(0);
        active_remaining + next_len
    }

    fn phase_len(&self) -> usize {
        self.phases[0].len()
    }

    pub fn can_process(&self) -> bool {
        self.available() >= self.phase_len()
    }

    fn sample_at(&self, offset: usize) -> ComplexQ15 {
        let active = self.active.as_ref().expect("sample_at with no active buffer");
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

    pub fn process(&mut self, out: &mut [ComplexQ15]) -> usize {
        let phase_len = self.phase_len();
        let mut produced = 0;
        while produced < out.len() && self.available() >= phase_len {
            let sub = &self.phases[self.last_phase as usize];
            let mut acc = ComplexQ30::ZERO;
            for k in 0..phase_len {
                let s = self.sample_at(k);
                let c = ComplexQ15::new(sub[k], 0);
                s.mac_q30(c, &mut acc);
            }
            let mut result = acc.round_to_q15();
            if let Some(der) = self.derotator.as_mut() {
                result = der.phase.mul_q15(result);
                der.phase = der.phase.mul_q15(der.phase_incr);
            }
            out[produced] = result;
            produced += 1;

            let mut p = self.last_phase + self.decim;
            self.sample_offset += (p / self.interp) as usize;
            p %= self.interp;
            self.last_phase = p;
            self.roll_buffers();
        }
        produced
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{SampleBuffer, SampleKind};

    #[test]
    fn real_rate_change_identity_unity_interp() {
        let taps = vec![i16::MAX / 4; 8];
        let mut pf = PolyphaseFirReal::new(&taps, 1, 3);
        let input: Vec<i16> = (0..300).map(|i| ((i % 50) * 600) as i16).collect();
        let input_len = input.len();
        pf.push_buffer(input).unwrap();
        let mut out = vec![0i16; 200];
        let n = pf.process(&mut out);
        let expect = input_len / 3;
        assert!((n as i64 - expect as i64).abs() <= 1, "n={} expect~{}", n, expect);
    }

    #[test]
    fn complex_rate_change_within_tolerance() {
        let taps = vec![i16::MAX / 4; 8];
        let mut pf = PolyphaseFirComplex::new(&taps, 1, 3, None);
        let samples: Vec<(i16, i16)> = (0..300).map(|i| (((i % 50) * 600) as i16, 0)).collect();
        let mut bytes = Vec::with_capacity(samples.len() * 4);
        for (re, im) in &samples {
            bytes.extend_from_slice(&re.to_ne_bytes());
            bytes.extend_from_slice(&im.to_ne_bytes());
        }
        let buf = SampleBuffer::new(SampleKind::Cs16, samples.len(), bytes, 1, None);
        pf.push_buffer(buf).unwrap();
        let mut out = vec![ComplexQ15::ZERO; 200];
        let n = pf.process(&mut out);
        let expect = samples.len() / 3;
        assert!((n as i64 - expect as i64).abs() <= 1);
    }

    #[test]
    fn busy_when_both_slots_occupied() {
        let taps = vec![100i16; 4];
        let mut pf = PolyphaseFirReal::new(&taps, 1, 1);
        pf.push_buffer(vec![1, 2, 3, 4]).unwrap();
        pf.push_buffer(vec![5, 6, 7, 8]).unwrap();
        assert!(matches!(pf.push_buffer(vec![9, 10]), Err(Error::Busy)));
    }
}
