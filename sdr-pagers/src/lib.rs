// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! FLEX and POCSAG pager protocol decoders, sharing a common BCH(31,21) codec.
//!
//! Each decoder consumes real Q.15 samples one block at a time and drives a small state machine
//! that demodulates symbols, accumulates codewords, and reports decoded messages through a
//! capability object supplied by the caller (see [`flex::FlexSink`] and [`pocsag::PocsagSink`]).

pub mod bch;
pub mod coding;
pub mod flex;
pub mod pocsag;

pub use bch::{pager_bch, Bch};
pub use flex::{Flex, FlexSink};
pub use pocsag::{Pocsag, PocsagSink};
