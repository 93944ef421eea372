// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Costas-loop carrier recovery for narrowband BPSK-like signals.
//!
//! An alternative to [`crate::dsp::fm_demod::FmDemod`] for signals whose information is carried
//! in phase rather than frequency. Maintains an NCO phase/frequency pair tuned by `(alpha, beta)`
//! loop gains, with the phase error clamped to `[-e_max, e_max]` each step to keep the loop
//! stable in the presence of noise spikes.

use num_complex::Complex;

use crate::dsp::q15::ComplexQ15;

pub struct CostasLoop {
    alpha: f32,
    beta: f32,
    e_max: f32,
    phase: f32,
    freq: f32,
}

impl CostasLoop {
    pub fn new(alpha: f32, beta: f32, e_max: f32) -> CostasLoop {
        CostasLoop { alpha, beta, e_max, phase: 0.0, freq: 0.0 }
    }

    /// Derotate one sample by the current NCO phase, update the loop from the BPSK phase-error
    /// discriminant (`re * im`, the small-angle approximation of `sin(2*phase_error)`), and
    /// return the derotated sample.
    pub fn step(&mut self, sample: ComplexQ15) -> ComplexQ15 {
        let nco = Complex::new(self.phase.cos(), self.phase.sin());
        let input = Complex::new(sample.re as f32, sample.im as f32);
        let out = input * nco;

        let error = (out.re * out.im).clamp(-self.e_max, self.e_max);
        self.freq += self.beta * error;
        self.phase += self.freq + self.alpha * error;
        if self.phase > std::f32::consts::PI {
            self.phase -= 2.0 * std::f32::consts::PI;
        } else if self.phase < -std::f32::consts::PI {
            self.phase += 2.0 * std::f32::consts::PI;
        }

        ComplexQ15::new(
            out.re.clamp(i16::MIN as f32, i16::MAX as f32) as i16,
            out.im.clamp(i16::MIN as f32, i16::MAX as f32) as i16,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locked_loop_tracks_constant_carrier() {
        let mut loop_ = CostasLoop::new(0.05, 0.001, 1.0e9);
        let sample = ComplexQ15::new(20000, 0);
        let mut last = ComplexQ15::ZERO;
        for _ in 0..200 {
            last = loop_.step(sample);
        }
        assert!(last.re.unsigned_abs() > 10_000, "re={}", last.re);
    }
}
