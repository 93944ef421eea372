// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! FM quadrature demodulator with carrier squelch.
//!
//! Grounded on `multifm/fm_demod.c`: the instantaneous frequency is the angle of the current
//! sample times the conjugate of the previous one, scaled from `(-pi, pi]` back into Q.15. A
//! block-level RMS power estimate gates the whole block to silence when the estimated signal
//! level falls below the configured squelch threshold; `0` disables squelch (always demodulate).
//!
//! The squelch threshold here is phrased, per the spec, as a proxy dBFS derived from
//! `sqrt(mean(|I| + |Q|))` rather than the original's `sqrt((I^2+Q^2)/2)` RMS-power formula —
//! see DESIGN.md for why the simpler proxy was chosen (the original's `SMP_OFFSET`/`SMP_SCALE`
//! calibration constants were not present in the retrieved source).

use num_complex::Complex;

use crate::dsp::q15::ComplexQ15;

pub struct FmDemod {
    last: ComplexQ15,
}

impl FmDemod {
    pub fn new() -> FmDemod {
        FmDemod { last: ComplexQ15::ZERO }
    }

    /// A proxy dBFS estimate of the block's average power, per the formula described above.
    fn block_dbfs(samples: &[ComplexQ15]) -> f32 {
        if samples.is_empty() {
            return f32::NEG_INFINITY;
        }
        let sum: f64 = samples.iter().map(|s| (s.re as f64).abs() + (s.im as f64).abs()).sum();
        let mean = sum / samples.len() as f64;
        let rms = mean.sqrt();
        20.0 * (rms.max(1.0) / i16::MAX as f64).log10() as f32
    }

    /// Demodulate one block. `csq_threshold_dbfs == 0` means "squelch open" (always demodulate).
    /// Writes one real Q.15 sample per input sample into `out` (must be at least `samples.len()`
    /// long) and returns the number of samples written.
    pub fn process(&mut self, samples: &[ComplexQ15], csq_threshold_dbfs: i32, out: &mut [i16]) -> usize {
        let dbfs = Self::block_dbfs(samples);
        let squelch_open = csq_threshold_dbfs == 0 || dbfs >= csq_threshold_dbfs as f32;

        let n = samples.len().min(out.len());
        for i in 0..n {
            let a = samples[i];
            if squelch_open {
                let ca = Complex::new(a.re as f64, a.im as f64);
                let cb_conj = Complex::new(self.last.re as f64, self.last.im as f64).conj();
                let s = ca * cb_conj;
                let phi = s.im.atan2(s.re) as f32;
                let phi_scaled = (phi / std::f32::consts::PI) * (i16::MAX as f32);
                out[i] = phi_scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            } else {
                out[i] = 0;
            }
            self.last = a;
        }
        n
    }
}

impl Default for FmDemod {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn squelch_closed_emits_silence() {
        let mut demod = FmDemod::new();
        let samples = vec![ComplexQ15::new(10, 5); 16];
        let mut out = vec![0i16; 16];
        demod.process(&samples, 1000, &mut out);
        assert!(out.iter().all(|&s| s == 0));
    }

    #[test]
    fn squelch_open_demodulates_constant_phase_to_zero() {
        let mut demod = FmDemod::new();
        let samples = vec![ComplexQ15::new(20000, 0); 8];
        let mut out = vec![1234i16; 8];
        demod.process(&samples, 0, &mut out);
        // Same phase every sample after the first transition -> zero instantaneous frequency.
        assert_eq!(out[7], 0);
    }

    #[test]
    fn rotating_phase_produces_nonzero_output() {
        let mut demod = FmDemod::new();
        let mut samples = Vec::new();
        for i in 0..16 {
            let theta = i as f64 * 0.2;
            samples.push(ComplexQ15::new((theta.cos() * 20000.0) as i16, (theta.sin() * 20000.0) as i16));
        }
        let mut out = vec![0i16; 16];
        demod.process(&samples, 0, &mut out);
        assert!(out[5..].iter().any(|&s| s != 0));
    }
}
