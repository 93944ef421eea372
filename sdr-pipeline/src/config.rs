// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! JSON pipeline configuration.
//!
//! The document shape mirrors the front-end's own configuration file: one top-level object with
//! the acquisition parameters, the channelizer and resampler filter taps (as floating point,
//! converted to Q.15 at load time), and a list of per-channel settings. Unknown top-level keys are
//! rejected rather than silently ignored.

use serde::Deserialize;

use sdr_core::dsp::q15::f32_to_q15;
use sdr_core::error::{Error, Result};

/// Top-level pipeline configuration, as loaded from a JSON document.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PipelineConfig {
    pub sample_rate_hz: u32,
    pub center_freq_hz: u32,
    #[serde(default = "default_nr_samp_bufs")]
    pub nr_samp_bufs: usize,
    pub decimation_factor: u32,
    pub lpf_taps: Vec<f32>,
    #[serde(default)]
    pub rational_resampler: Option<RationalResamplerConfig>,
    #[serde(default)]
    pub enable_dc_blocker: bool,
    #[serde(default)]
    pub dc_blocker_pole: f32,
    pub channels: Vec<ChannelConfig>,
    #[serde(default)]
    pub device_index: u32,
    #[serde(default)]
    pub gain_db: f32,
    #[serde(default)]
    pub ppm_correction: i32,
    #[serde(default)]
    pub iq_dump_file: Option<String>,
    #[serde(default)]
    pub sdr_test_mode: bool,
}

fn default_nr_samp_bufs() -> usize {
    64
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RationalResamplerConfig {
    pub decimate: u32,
    pub interpolate: u32,
    pub lpf_coeffs: Vec<f32>,
}

/// Which protocol decoder, if any, consumes a channel's demodulated PCM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    None,
    Flex,
    Pocsag,
    Ais,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ChannelConfig {
    pub out_fifo: String,
    pub chan_center_freq: u32,
    #[serde(default)]
    pub d_b_gain: f32,
    #[serde(default)]
    pub signal_debug_file: Option<String>,
    #[serde(default = "default_protocol")]
    pub protocol: Protocol,
}

fn default_protocol() -> Protocol {
    Protocol::None
}

fn missing_field(field: &'static str) -> Error {
    Error::BadArgs(field)
}

impl PipelineConfig {
    /// Parses and validates a JSON configuration document.
    ///
    /// `serde_json`'s own errors (malformed JSON, an unknown top-level key via
    /// `deny_unknown_fields`, a missing required key) are all folded into `Error::BadArgs`; the
    /// original `serde_json::Error`'s message is logged at `warn` level before being discarded,
    /// since the caller-facing error taxonomy doesn't carry arbitrary parser messages.
    pub fn from_json(text: &str) -> Result<PipelineConfig> {
        serde_json::from_str(text).map_err(|e| {
            log::warn!("config: {e}");
            missing_field("configuration document")
        })
    }

    /// Converts the channelizer prototype taps to Q.15, in the order given.
    pub fn lpf_taps_q15(&self) -> Vec<i16> {
        self.lpf_taps.iter().map(|&t| f32_to_q15(t)).collect()
    }
}

impl RationalResamplerConfig {
    pub fn lpf_coeffs_q15(&self) -> Vec<i16> {
        self.lpf_coeffs.iter().map(|&t| f32_to_q15(t)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "sampleRateHz": 2048000,
        "centerFreqHz": 929000000,
        "decimationFactor": 10,
        "lpfTaps": [0.1, 0.2, 0.1],
        "channels": [
            { "outFifo": "/tmp/chan0.json", "chanCenterFreq": 929000000, "protocol": "pocsag" }
        ]
    }"#;

    #[test]
    fn minimal_document_round_trips() {
        let cfg = PipelineConfig::from_json(MINIMAL).unwrap();
        assert_eq!(cfg.sample_rate_hz, 2_048_000);
        assert_eq!(cfg.nr_samp_bufs, 64);
        assert_eq!(cfg.channels.len(), 1);
        assert_eq!(cfg.channels[0].protocol, Protocol::Pocsag);
    }

    #[test]
    fn unknown_top_level_key_is_rejected() {
        let with_unknown = MINIMAL.replacen('{', "{\"notAKey\": 1, ", 1);
        assert!(matches!(PipelineConfig::from_json(&with_unknown), Err(Error::BadArgs(_))));
    }

    #[test]
    fn missing_required_key_is_rejected() {
        let missing_rate = MINIMAL.replace("\"sampleRateHz\": 2048000,", "");
        assert!(matches!(PipelineConfig::from_json(&missing_rate), Err(Error::BadArgs(_))));
    }

    #[test]
    fn lpf_taps_convert_to_q15() {
        let cfg = PipelineConfig::from_json(MINIMAL).unwrap();
        let q15 = cfg.lpf_taps_q15();
        assert_eq!(q15.len(), 3);
    }
}
