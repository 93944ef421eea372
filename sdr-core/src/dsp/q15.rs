// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Q.15 / Q.30 fixed-point primitives shared by every DSP stage.
//!
//! A Q.15 value is a signed 16-bit integer with 15 fractional bits; multiplying two Q.15 values
//! produces a Q.30 value in a 32-bit accumulator. All hot-path arithmetic in this crate stays in
//! these two representations; there is no floating-point reference path.

/// Number of fractional bits in a Q.15 value.
pub const Q15_FRAC_BITS: u32 = 15;

/// Multiply two Q.15 operands, producing a Q.30 result.
#[inline]
pub fn q15_mul(a: i16, b: i16) -> i32 {
    (a as i32) * (b as i32)
}

/// Round a Q.30 accumulator back down to Q.15 using round-half-up, saturating to `i16` range.
#[inline]
pub fn round_q30_to_q15(x: i32) -> i16 {
    let rounded = x.wrapping_add(1 << (Q15_FRAC_BITS - 1)) >> Q15_FRAC_BITS;
    rounded.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// A complex sample in Q.15 (both components 15 fractional bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ComplexQ15 {
    pub re: i16,
    pub im: i16,
}

impl ComplexQ15 {
    pub const fn new(re: i16, im: i16) -> Self {
        ComplexQ15 { re, im }
    }

    pub const ZERO: ComplexQ15 = ComplexQ15 { re: 0, im: 0 };
    /// Unity phasor: `1 + 0j` in Q.15.
    pub const ONE: ComplexQ15 = ComplexQ15 { re: i16::MAX, im: 0 };

    pub const fn conj(self) -> ComplexQ15 {
        ComplexQ15 { re: self.re, im: self.im.wrapping_neg() }
    }

    /// Complex multiply with a Q.30 accumulator, rounded back to Q.15.
    pub fn mul_q15(self, rhs: ComplexQ15) -> ComplexQ15 {
        let re = q15_mul(self.re, rhs.re) - q15_mul(self.im, rhs.im);
        let im = q15_mul(self.re, rhs.im) + q15_mul(self.im, rhs.re);
        ComplexQ15 { re: round_q30_to_q15(re), im: round_q30_to_q15(im) }
    }

    /// Accumulate `self * rhs` into a Q.30 complex accumulator without rounding.
    pub fn mac_q30(self, rhs: ComplexQ15, acc: &mut ComplexQ30) {
        acc.re += q15_mul(self.re, rhs.re) - q15_mul(self.im, rhs.im);
        acc.im += q15_mul(self.re, rhs.im) + q15_mul(self.im, rhs.re);
    }
}

/// A complex accumulator in Q.30, used while summing FIR taps before a single final rounding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ComplexQ30 {
    pub re: i32,
    pub im: i32,
}

impl ComplexQ30 {
    pub const ZERO: ComplexQ30 = ComplexQ30 { re: 0, im: 0 };

    pub fn round_to_q15(self) -> ComplexQ15 {
        ComplexQ15 { re: round_q30_to_q15(self.re), im: round_q30_to_q15(self.im) }
    }
}

/// Converts a floating-point coefficient in `[-1.0, 1.0]` to Q.15, saturating at the boundary.
pub fn f32_to_q15(x: f32) -> i16 {
    let scaled = (x * (1i32 << Q15_FRAC_BITS) as f32).round();
    scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Build a Q.15 phase increment `exp(-j*2*pi*shift_hz/sample_rate_hz * decim)`.
pub fn derotation_phase_incr(shift_hz: f64, sample_rate_hz: f64, decim: u32) -> ComplexQ15 {
    let theta = -2.0 * std::f64::consts::PI * shift_hz / sample_rate_hz * decim as f64;
    ComplexQ15::new(f32_to_q15(theta.cos() as f32), f32_to_q15(theta.sin() as f32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_half_up_saturates() {
        assert_eq!(round_q30_to_q15(0), 0);
        assert_eq!(round_q30_to_q15(1 << 14), 1);
        assert_eq!(round_q30_to_q15(((i16::MAX as i32) << 15) + (1 << 20)), i16::MAX);
        assert_eq!(round_q30_to_q15((i32::MIN) << 0), i16::MIN);
    }

    #[test]
    fn conj_negates_imaginary() {
        let c = ComplexQ15::new(100, 200);
        assert_eq!(c.conj(), ComplexQ15::new(100, -200));
    }

    #[test]
    fn mul_identity() {
        let c = ComplexQ15::new(1000, -500);
        let one = ComplexQ15::ONE;
        let got = c.mul_q15(one);
        // i16::MAX is not exactly 1.0 in Q.15, so allow +-1 LSB of rounding slack.
        assert!((got.re - c.re).abs() <= 1);
        assert!((got.im - c.im).abs() <= 1);
    }

    #[test]
    fn f32_round_trip_is_lossless_at_lsb_granularity() {
        let q = f32_to_q15(0.5);
        assert_eq!(q, 1 << 14);
    }
}
