// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bridges the three protocol decoders (FLEX, POCSAG, AIS) to the line-delimited JSON sink.
//!
//! Each decoder owns a small `*Sink` adapter that formats its messages as one JSON object per
//! line and hands them to a [`JsonLineSink`]; a channel with no protocol configured bypasses this
//! module entirely and writes demodulated PCM straight through [`crate::sink::PcmSink`] instead.

use std::io::Write;

use chrono::Utc;
use serde_json::json;

use sdr_ais::{Ais, AisSink, Packet};
use sdr_pagers::flex::{AlnumMsg as FlexAlnumMsg, Flex, FlexSink, NumMsg as FlexNumMsg, SivMsg};
use sdr_pagers::pocsag::{AlphaMsg as PocsagAlphaMsg, NumMsg as PocsagNumMsg, Pocsag, PocsagSink};

use crate::sink::{escape_json_message, JsonLineSink};

/// UTC timestamp in the sink contract's `"YYYY-MM-DD HH:MM:SS UTC"` shape.
fn timestamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

struct FlexJsonSink<W: Write> {
    json: JsonLineSink<W>,
}

impl<W: Write> FlexSink for FlexJsonSink<W> {
    fn on_alnum_msg(&mut self, msg: FlexAlnumMsg<'_>) {
        let value = json!({
            "proto": "flex",
            "type": "alphanumeric",
            "timestamp": timestamp(),
            "baud": msg.baud,
            "cycleNo": msg.cycle_id,
            "frameNo": msg.frame_id,
            "phaseNo": msg.phase.to_string(),
            "capCode": msg.capcode,
            "fragment": msg.fragment,
            "maildrop": msg.maildrop,
            "fragSeq": msg.seq_num,
            "freq_hz": msg.freq_hz,
            "message": escape_json_message(msg.message),
        });
        if let Err(e) = self.json.write_value(&value) {
            log::warn!("flex: failed to deliver alnum message: {e}");
        }
    }

    fn on_num_msg(&mut self, msg: FlexNumMsg<'_>) {
        let value = json!({
            "proto": "flex",
            "type": "numeric",
            "timestamp": timestamp(),
            "baud": msg.baud,
            "cycleNo": msg.cycle_id,
            "frameNo": msg.frame_id,
            "phaseNo": msg.phase.to_string(),
            "capCode": msg.capcode,
            "freq_hz": msg.freq_hz,
            "message": escape_json_message(msg.digits),
        });
        if let Err(e) = self.json.write_value(&value) {
            log::warn!("flex: failed to deliver num message: {e}");
        }
    }

    fn on_siv_msg(&mut self, msg: SivMsg) {
        let value = json!({
            "proto": "flex",
            "type": "tempAddrActivation",
            "timestamp": timestamp(),
            "baud": msg.baud,
            "cycleNo": msg.cycle_id,
            "frameNo": msg.frame_id,
            "phaseNo": msg.phase.to_string(),
            "capCode": msg.capcode,
            "sivType": msg.siv_type,
            "sivData": msg.siv_data,
            "freq_hz": msg.freq_hz,
        });
        if let Err(e) = self.json.write_value(&value) {
            log::warn!("flex: failed to deliver siv message: {e}");
        }
    }
}

struct PocsagJsonSink<W: Write> {
    json: JsonLineSink<W>,
}

impl<W: Write> PocsagSink for PocsagJsonSink<W> {
    fn on_alpha_msg(&mut self, msg: PocsagAlphaMsg<'_>) {
        let value = json!({
            "proto": "pocsag",
            "timestamp": timestamp(),
            "baud": msg.baud,
            "capCode": msg.capcode,
            "function": msg.function,
            "freq_hz": msg.freq_hz,
            "message": escape_json_message(msg.message),
        });
        if let Err(e) = self.json.write_value(&value) {
            log::warn!("pocsag: failed to deliver alpha message: {e}");
        }
    }

    fn on_num_msg(&mut self, msg: PocsagNumMsg<'_>) {
        let value = json!({
            "proto": "pocsag",
            "timestamp": timestamp(),
            "baud": msg.baud,
            "capCode": msg.capcode,
            "function": msg.function,
            "freq_hz": msg.freq_hz,
            "message": escape_json_message(msg.digits),
        });
        if let Err(e) = self.json.write_value(&value) {
            log::warn!("pocsag: failed to deliver num message: {e}");
        }
    }
}

struct AisJsonSink<W: Write> {
    json: JsonLineSink<W>,
}

impl<W: Write> AisSink for AisJsonSink<W> {
    fn on_packet(&mut self, packet: Packet<'_>) {
        let mut value = json!({
            "proto": "ais",
            "timestamp": timestamp(),
            "freq_hz": packet.freq_hz,
            "mmsi": packet.header.mmsi,
            "fcsValid": packet.fcs_valid,
        });
        let obj = value.as_object_mut().expect("constructed as an object");
        match packet.message {
            sdr_ais::AisMessage::PositionReport(pr) => {
                obj.insert("navStatus".into(), json!(pr.nav_status));
                obj.insert("rateOfTurn".into(), json!(pr.rate_of_turn));
                obj.insert("speedOverGround".into(), json!(pr.speed_over_ground));
                obj.insert("lat".into(), json!(pr.latitude));
                obj.insert("lon".into(), json!(pr.longitude));
                obj.insert("course".into(), json!(pr.course_over_ground));
                obj.insert("heading".into(), json!(pr.true_heading));
            }
            sdr_ais::AisMessage::Other { raw_ascii } => {
                obj.insert("rawAscii".into(), json!(escape_json_message(raw_ascii)));
            }
        }
        if let Err(e) = self.json.write_value(&value) {
            log::warn!("ais: failed to deliver packet: {e}");
        }
    }
}

/// The protocol decoder attached to a single channel, or none for a raw PCM pass-through channel.
pub enum ChannelDecoder<W: Write> {
    None,
    Flex(Flex<FlexJsonSink<W>>),
    Pocsag(Pocsag<PocsagJsonSink<W>>),
    Ais(Ais<AisJsonSink<W>>),
}

impl<W: Write> ChannelDecoder<W> {
    pub fn flex(freq_hz: u32, out: W) -> ChannelDecoder<W> {
        ChannelDecoder::Flex(Flex::new(freq_hz, FlexJsonSink { json: JsonLineSink::new(out) }))
    }

    pub fn pocsag(freq_hz: u32, out: W) -> ChannelDecoder<W> {
        ChannelDecoder::Pocsag(Pocsag::new(freq_hz, PocsagJsonSink { json: JsonLineSink::new(out) }))
    }

    pub fn ais(freq_hz: u32, out: W) -> ChannelDecoder<W> {
        ChannelDecoder::Ais(Ais::new(freq_hz, AisJsonSink { json: JsonLineSink::new(out) }))
    }

    /// Feeds one block of demodulated real PCM through the attached decoder. A no-op for
    /// [`ChannelDecoder::None`]; callers route PCM to [`crate::sink::PcmSink`] themselves in
    /// that case instead.
    pub fn process(&mut self, pcm: &[i16]) {
        match self {
            ChannelDecoder::None => {}
            ChannelDecoder::Flex(flex) => flex.process(pcm),
            ChannelDecoder::Pocsag(pocsag) => pocsag.process(pcm),
            ChannelDecoder::Ais(ais) => ais.process(pcm),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_decoder_process_is_a_harmless_no_op() {
        let mut decoder: ChannelDecoder<Vec<u8>> = ChannelDecoder::None;
        decoder.process(&[1, 2, 3, -1, -2]);
    }

    #[test]
    fn flex_decoder_accepts_a_block_without_panicking() {
        let mut decoder = ChannelDecoder::flex(929_612_500, Vec::new());
        let samples = vec![0i16; 64];
        decoder.process(&samples);
    }

    #[test]
    fn flex_alnum_json_uses_the_sink_contracts_field_names() {
        let mut sink = FlexJsonSink { json: JsonLineSink::new(Vec::new()) };
        sink.on_alnum_msg(FlexAlnumMsg {
            baud: 1600,
            phase: 'A',
            cycle_id: 3,
            frame_id: 42,
            capcode: 1_715_004,
            fragment: false,
            maildrop: false,
            seq_num: 0,
            message: "HELLO",
            freq_hz: 929_612_500,
        });
        let line = String::from_utf8(sink.json.into_inner()).unwrap();
        let value: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(value["proto"], "flex");
        assert_eq!(value["type"], "alphanumeric");
        assert_eq!(value["baud"], 1600);
        assert_eq!(value["phaseNo"], "A");
        assert_eq!(value["capCode"], 1_715_004);
        assert_eq!(value["message"], "HELLO");
        assert!(value["timestamp"].as_str().unwrap().ends_with(" UTC"));
    }

    #[test]
    fn flex_alnum_json_collapses_control_bytes_per_sink_contract() {
        let mut sink = FlexJsonSink { json: JsonLineSink::new(Vec::new()) };
        let message = String::from_utf8(vec![b'H', b'I', 0x03]).unwrap();
        sink.on_alnum_msg(FlexAlnumMsg {
            baud: 1600,
            phase: 'A',
            cycle_id: 3,
            frame_id: 42,
            capcode: 1_715_004,
            fragment: false,
            maildrop: false,
            seq_num: 0,
            message: &message,
            freq_hz: 929_612_500,
        });
        let line = String::from_utf8(sink.json.into_inner()).unwrap();
        let value: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(value["message"], "HI ");
    }
}
