// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! AIS (Automatic Identification System) HDLC framer and message decoder.
//!
//! [`framer::Ais`] consumes real Q.15 samples one block at a time, locks onto the GMSK preamble
//! and HDLC flag, de-stuffs and frames one packet at a time, and reports decoded messages through
//! a capability object supplied by the caller (see [`framer::AisSink`]). Bitfield extraction and
//! message-type decoding live in [`message`] and operate on plain byte slices, independent of the
//! framer's sample-level state machine.

pub mod framer;
pub mod message;

pub use framer::{Ais, AisSink, Packet};
pub use message::{decode, AisMessage, Header, PositionReport};
