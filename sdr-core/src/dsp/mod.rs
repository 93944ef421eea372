// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fixed-point math primitives shared by the FIR, resampler, and demodulator stages.

pub mod costas;
pub mod dc_blocker;
pub mod direct_fir;
pub mod fm_demod;
pub mod polyphase_fir;
pub mod q15;

pub use q15::{ComplexQ15, ComplexQ30};
