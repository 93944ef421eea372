// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Zero-copy sample buffers and fixed-point DSP primitives for the sdr multi-channel pipeline.
//!
//! This crate is the leaf of the workspace: it knows nothing about protocols, configuration, or
//! threading policy, only about moving and transforming streams of Q.15 samples cheaply. See the
//! `sdr-pagers`, `sdr-ais`, `sdr-pipeline`, and `sdr-play` crates for everything built on top.

pub mod alloc;
pub mod buffer;
pub mod dsp;
pub mod error;
pub mod queue;

pub use buffer::{SampleBuffer, SampleKind};
pub use error::{Error, Result};
