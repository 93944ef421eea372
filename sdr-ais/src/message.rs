// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bitfield extraction and message decoding over a de-stuffed AIS HDLC payload.
//!
//! Grounded on `ais/ais_decode.c`. Bitfields are addressed as if the packet were a single
//! big-endian bit stream, independent of how individual bits were packed into bytes during
//! framing.

/// Extracts an unsigned bitfield of `len` bits (`len <= 32`) starting at bit offset `offset`,
/// reading `packet` as a single big-endian bit stream.
pub fn get_bitfield(packet: &[u8], offset: usize, len: usize) -> u32 {
    let start_byte = offset / 8;
    let end_byte = (offset + len + 7) / 8;
    let nr_bytes = end_byte - start_byte;

    let mut acc: u64 = 0;
    for i in 0..nr_bytes {
        acc <<= 8;
        acc |= packet[start_byte + i] as u64;
    }

    let end_rem_bits = (offset + len) % 8;
    let shift = if end_rem_bits == 0 { 0 } else { 8 - end_rem_bits };
    acc >>= shift;
    acc &= (1u64 << len) - 1;

    acc as u32
}

/// Extracts a two's-complement signed bitfield of `len` bits (`len <= 32`).
pub fn get_bitfield_signed(packet: &[u8], offset: usize, len: usize) -> i32 {
    let t = get_bitfield(packet, offset, len);
    let v = (t as i32).wrapping_shl(32 - len as u32);
    v >> (32 - len)
}

/// Unpacks a six-bit-ASCII-armored run of `nr_chars` characters starting at bit offset `offset`.
pub fn unpack_six_bit_ascii(packet: &[u8], offset: usize, nr_chars: usize) -> String {
    let mut s = String::with_capacity(nr_chars);
    for i in 0..nr_chars {
        let c = get_bitfield(packet, offset + i * 6, 6) as u8;
        let ascii = if c < 40 { c + 48 } else { c - 40 + 96 };
        s.push(ascii as char);
    }
    s
}

/// AIS message type 1/2/3: class A/B position report (SOTDMA or ITDMA).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionReport {
    pub nav_status: u8,
    /// Rate of turn, raw encoded units (see ITU-R M.1371 ROT~AIS conversion for degrees/min).
    pub rate_of_turn: i32,
    /// Speed over ground, tenths of a knot.
    pub speed_over_ground: u32,
    pub position_accuracy: bool,
    /// Longitude in 1/600000 minute.
    pub longitude: i32,
    /// Latitude in 1/600000 minute.
    pub latitude: i32,
    /// Course over ground, tenths of a degree.
    pub course_over_ground: u32,
    /// True heading, degrees (511 = not available).
    pub true_heading: u16,
}

/// A decoded AIS message, common header plus type-specific payload.
#[derive(Debug, Clone, PartialEq)]
pub enum AisMessage {
    PositionReport(PositionReport),
    /// Any other message type: only the common header was interpreted, the rest is reported as
    /// six-bit-ASCII armored text.
    Other { raw_ascii: String },
}

/// The header fields present in every AIS message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Header {
    pub msg_id: u8,
    pub repeat: u8,
    pub mmsi: u32,
}

fn decode_position_report(packet: &[u8]) -> PositionReport {
    PositionReport {
        nav_status: get_bitfield(packet, 38, 4) as u8,
        rate_of_turn: get_bitfield_signed(packet, 42, 8),
        speed_over_ground: get_bitfield(packet, 50, 10),
        position_accuracy: get_bitfield(packet, 60, 1) != 0,
        longitude: get_bitfield_signed(packet, 61, 28),
        latitude: get_bitfield_signed(packet, 89, 27),
        course_over_ground: get_bitfield(packet, 116, 12),
        true_heading: get_bitfield(packet, 128, 9) as u16,
    }
}

/// Decodes the common header and, for message types 1-3, the position report body. Every other
/// message type is reported as raw six-bit-ASCII armored text over the whole payload.
pub fn decode(packet: &[u8]) -> (Header, AisMessage) {
    let msg_id = get_bitfield(packet, 0, 6) as u8;
    let repeat = get_bitfield(packet, 6, 2) as u8;
    let mmsi = get_bitfield(packet, 8, 30);

    let header = Header { msg_id, repeat, mmsi };

    let body = match msg_id {
        1 | 2 | 3 => AisMessage::PositionReport(decode_position_report(packet)),
        _ => AisMessage::Other { raw_ascii: unpack_six_bit_ascii(packet, 0, packet.len() * 8 / 6) },
    };

    (header, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitfield_extracts_byte_aligned_span() {
        let packet = [0b1010_1100, 0x00, 0x00];
        assert_eq!(get_bitfield(&packet, 0, 8), 0b1010_1100);
    }

    #[test]
    fn bitfield_extracts_unaligned_span_across_bytes() {
        // bits 4..12 straddle byte 0 and byte 1.
        let packet = [0b0000_1111, 0b1111_0000, 0x00];
        assert_eq!(get_bitfield(&packet, 4, 8), 0xff);
    }

    #[test]
    fn signed_bitfield_sign_extends_negative_values() {
        // 4-bit field 0b1111 == -1.
        let packet = [0b1111_0000];
        assert_eq!(get_bitfield_signed(&packet, 0, 4), -1);
    }

    #[test]
    fn signed_bitfield_keeps_positive_values_positive() {
        let packet = [0b0111_0000];
        assert_eq!(get_bitfield_signed(&packet, 0, 4), 7);
    }

    #[test]
    fn six_bit_ascii_maps_low_and_high_ranges() {
        // 0 -> '@' (48 in ascii is '0'... wait: 0 + 48 = 48 = '0'; 39 + 48 = 87 = 'W'
        let packet = [0b0000_0000];
        let s = unpack_six_bit_ascii(&packet, 0, 1);
        assert_eq!(s, "0");
    }

    fn set_bitfield(packet: &mut [u8], offset: usize, len: usize, value: u32) {
        for i in 0..len {
            let bit = (value >> (len - 1 - i)) & 1;
            let pos = offset + i;
            if bit != 0 {
                packet[pos / 8] |= 1 << (7 - pos % 8);
            }
        }
    }

    #[test]
    fn position_report_fields_land_at_documented_offsets() {
        let mut packet = [0u8; 32];
        set_bitfield(&mut packet, 0, 6, 1); // msg_id = 1
        set_bitfield(&mut packet, 6, 2, 2); // repeat = 2
        set_bitfield(&mut packet, 8, 30, 123456789); // mmsi
        set_bitfield(&mut packet, 38, 4, 5); // nav_stat
        set_bitfield(&mut packet, 60, 1, 1); // position_accuracy

        let (header, body) = decode(&packet);
        assert_eq!(header.msg_id, 1);
        assert_eq!(header.repeat, 2);
        assert_eq!(header.mmsi, 123456789);

        let AisMessage::PositionReport(report) = body else { panic!("expected position report") };
        assert_eq!(report.nav_status, 5);
        assert!(report.position_accuracy);
    }

    #[test]
    fn other_message_types_report_raw_ascii_only() {
        let mut packet = [0u8; 32];
        set_bitfield(&mut packet, 0, 6, 5); // msg_id = 5 (static info), not specially decoded
        let (header, body) = decode(&packet);
        assert_eq!(header.msg_id, 5);
        assert!(matches!(body, AisMessage::Other { .. }));
    }
}
