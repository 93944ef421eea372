// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! FLEX coding descriptors.
//!
//! Grounded on `pager/pager_flex.c`'s `_pager_codings` table. Each entry describes one of the
//! four baud/FSK-level combinations FLEX can run Sync 2 and the data block at; the `a` word found
//! during Sync 1 selects which entry governs the rest of the frame.

/// One FLEX baud-rate/FSK-level combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coding {
    /// The 16-bit magic compared (within Hamming distance 4) against the Sync 1 `a` word.
    pub seq_a: u16,
    /// Symbol rate in bits (2-FSK) or dibits (4-FSK) per second.
    pub baud: u16,
    /// Number of amplitude levels the slicer distinguishes: 2 or 4.
    pub fsk_levels: u8,
    /// Input samples consumed per symbol once Sync 2 begins.
    pub sample_skip: u8,
    /// Number of alternating "dot" samples expected at the start of Sync 2.
    pub sync_2_samples: u8,
    /// Bits contributed to a phase word per symbol: 1 for 2-FSK, 2 for 4-FSK.
    pub sym_bits: u8,
    /// Extra samples added to the first post-sync skip to land on the symbol midpoint.
    pub sample_fudge: u8,
    /// Total symbols in one data block.
    pub symbols_per_block: u16,
    /// Number of interleaved phases the block's symbols are demultiplexed across.
    pub nr_phases: u8,
}

/// The four FLEX coding descriptors, in the order Sync 1 checks them.
pub const CODINGS: [Coding; 4] = [
    Coding {
        seq_a: 0x78f3,
        baud: 1600,
        fsk_levels: 2,
        sample_skip: 9,
        sync_2_samples: 4,
        sym_bits: 1,
        sample_fudge: 0,
        symbols_per_block: 2816,
        nr_phases: 1,
    },
    Coding {
        seq_a: 0x84e7,
        baud: 3200,
        fsk_levels: 2,
        sample_skip: 4,
        sync_2_samples: 24,
        sym_bits: 1,
        sample_fudge: 2,
        symbols_per_block: 5632,
        nr_phases: 2,
    },
    Coding {
        seq_a: 0x4f97,
        baud: 3200,
        fsk_levels: 4,
        sample_skip: 9,
        sync_2_samples: 12,
        sym_bits: 2,
        sample_fudge: 0,
        symbols_per_block: 2816,
        nr_phases: 2,
    },
    Coding {
        seq_a: 0x215f,
        baud: 6400,
        fsk_levels: 4,
        sample_skip: 4,
        sync_2_samples: 32,
        sym_bits: 2,
        sample_fudge: 2,
        symbols_per_block: 5632,
        nr_phases: 4,
    },
];

/// Finds the coding whose `seq_a` matches `a` (or whose complement matches `inv_a`) within a
/// Hamming distance of 4, allowing noisy sync words through.
pub fn match_coding(a: u16, inv_a: u16) -> Option<&'static Coding> {
    CODINGS.iter().find(|c| {
        hamming_distance_u16(c.seq_a, a) < 4 || hamming_distance_u16(!c.seq_a, inv_a) < 4
    })
}

fn hamming_distance_u16(a: u16, b: u16) -> u32 {
    (a ^ b).count_ones()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_seq_a_matches_each_coding() {
        for c in CODINGS.iter() {
            assert_eq!(match_coding(c.seq_a, !c.seq_a).unwrap().seq_a, c.seq_a);
        }
    }

    #[test]
    fn noisy_seq_a_still_matches_within_tolerance() {
        let c = &CODINGS[0];
        let noisy = c.seq_a ^ 0b111; // 3 bit errors
        assert_eq!(match_coding(noisy, 0).unwrap().seq_a, c.seq_a);
    }

    #[test]
    fn unrelated_pattern_does_not_match() {
        assert!(match_coding(0x0000, 0xffff).is_none());
    }
}
