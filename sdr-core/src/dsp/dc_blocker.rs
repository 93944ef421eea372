// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Single-pole DC blocking IIR filter, `y[n] = x[n] - x[n-1] + p*y[n-1]`.

use crate::dsp::q15::{f32_to_q15, q15_mul, round_q30_to_q15};

/// Operates in place on a real Q.15 stream, default pole `0.9999`.
pub struct DcBlocker {
    pole: i16,
    prev_x: i16,
    prev_y: i16,
}

impl DcBlocker {
    pub fn new(pole: f32) -> DcBlocker {
        DcBlocker { pole: f32_to_q15(pole), prev_x: 0, prev_y: 0 }
    }

    pub fn process(&mut self, samples: &mut [i16]) {
        for x in samples.iter_mut() {
            let xn = *x;
            let py_q30 = q15_mul(self.pole, self.prev_y);
            let py = round_q30_to_q15(py_q30);
            let y = xn.saturating_sub(self.prev_x).saturating_add(py);
            self.prev_x = xn;
            self.prev_y = y;
            *x = y;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_input_converges_to_near_zero() {
        let mut blk = DcBlocker::new(0.9999);
        let mut buf = vec![10_000i16; 2000];
        blk.process(&mut buf);
        assert!(buf[1999].abs() < 500, "tail={}", buf[1999]);
    }

    #[test]
    fn impulse_passes_through_first_sample() {
        let mut blk = DcBlocker::new(0.9999);
        let mut buf = vec![0i16; 4];
        buf[0] = 1000;
        blk.process(&mut buf);
        assert_eq!(buf[0], 1000);
    }
}
