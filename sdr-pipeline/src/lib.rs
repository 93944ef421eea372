// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Configuration loading, sample sources/sinks, and the acquisition/channel-worker scaffolding
//! that ties `sdr-core`'s DSP primitives and `sdr-pagers`/`sdr-ais`'s protocol decoders together
//! into a runnable pipeline.

pub mod config;
pub mod decoder;
pub mod sink;
pub mod source;
pub mod worker;

pub use config::{ChannelConfig, PipelineConfig, Protocol, RationalResamplerConfig};
pub use decoder::ChannelDecoder;
pub use sink::{JsonLineSink, PcmSink};
pub use source::{FileReplaySource, SampleSource};
pub use worker::{Acquisition, ChannelWorker, WorkerState, WorkerStateCell};
