// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! BCH(31,21,t=2) codec over GF(2^5).
//!
//! Grounded on `pager/bch_code.c`: the Galois field log/antilog tables are generated at
//! construction from a primitive polynomial of degree `m`, and syndrome decoding corrects up to
//! `t=2` bit errors in a 31-bit codeword using the classic Peterson-Gorenstein-Zierler approach
//! (single error resolved directly from `S1`, double error solved as a quadratic error-locator
//! polynomial found by Chien search). Both FLEX and POCSAG construct their BCH codec with the
//! identical primitive polynomial `{1,0,1,0,0,1}` (i.e. `x^5 + x^2 + 1`).

use sdr_core::error::{Error, Result};

const N: usize = 31;
const K: usize = 21;
const M: usize = 5;
/// Number of redundancy bits, `n - k`.
const GENERATOR_DEGREE: usize = N - K;

/// A BCH(31,21,t=2) codec: GF(2^5) log/antilog tables plus the generator polynomial used for
/// encoding test vectors.
pub struct Bch {
    alpha_to: [u8; N + 1],
    index_of: [i8; N + 1],
    generator: [u8; GENERATOR_DEGREE + 1],
}

impl Bch {
    /// `poly` is the primitive polynomial's coefficients, low degree first, length `m + 1`
    /// (e.g. `[1, 0, 1, 0, 0, 1]` for `x^5 + x^2 + 1`).
    pub fn new(poly: &[u8]) -> Bch {
        assert_eq!(poly.len(), M + 1);
        let (alpha_to, index_of) = build_gf_tables(poly);
        let generator = POCSAG_FLEX_GENERATOR;
        Bch { alpha_to, index_of, generator }
    }

    fn gf_mul(&self, a: u8, b: u8) -> u8 {
        if a == 0 || b == 0 {
            0
        } else {
            let ia = self.index_of[a as usize] as i32;
            let ib = self.index_of[b as usize] as i32;
            self.alpha_to[((ia + ib).rem_euclid(N as i32)) as usize]
        }
    }

    fn gf_div(&self, a: u8, b: u8) -> u8 {
        assert_ne!(b, 0);
        if a == 0 {
            0
        } else {
            let ia = self.index_of[a as usize] as i32;
            let ib = self.index_of[b as usize] as i32;
            self.alpha_to[((ia - ib).rem_euclid(N as i32)) as usize]
        }
    }

    /// Evaluate the received word at `alpha^power`: `sum_j r_j * alpha^(power*j)` over the set
    /// bits `j` of `word`.
    fn syndrome(&self, word: u32, power: u32) -> u8 {
        let mut acc = 0u8;
        for j in 0..N as u32 {
            if (word >> j) & 1 == 1 {
                let exp = ((power * j) % N as u32) as usize;
                acc ^= self.alpha_to[exp];
            }
        }
        acc
    }

    /// Decode a 31-bit codeword (bit 31 and above are ignored / must be zero), correcting up to
    /// two bit errors. Returns the corrected codeword, or `Error::Uncorrectable` if more than two
    /// errors are detected.
    pub fn decode(&self, word: u32) -> Result<u32> {
        let word = word & 0x7fff_ffff;
        let s1 = self.syndrome(word, 1);
        let s3 = self.syndrome(word, 3);

        if s1 == 0 && s3 == 0 {
            return Ok(word);
        }
        if s1 == 0 {
            // s3 != 0 with s1 == 0 cannot arise from <= 2 errors under this code.
            return Err(Error::Uncorrectable);
        }

        let s1_log = self.index_of[s1 as usize] as u32;
        let s1_cubed = self.gf_mul(self.gf_mul(s1, s1), s1);

        if s3 == s1_cubed {
            // Single-bit error at the position given directly by log(S1).
            return Ok(word ^ (1 << s1_log));
        }

        // Two-bit error: solve x^2 + sigma1*x + sigma2 = 0 for the error-location numbers.
        let sigma1 = s1;
        let sigma2 = self.gf_div(s3 ^ s1_cubed, s1);

        let mut positions = smallvec::SmallVec::<[u32; 2]>::new();
        for i in 0..N as u32 {
            let beta = self.alpha_to[i as usize];
            let f = self.gf_mul(beta, beta) ^ self.gf_mul(sigma1, beta) ^ sigma2;
            if f == 0 {
                positions.push(i);
            }
        }

        if positions.len() == 2 {
            let mut corrected = word;
            for p in positions {
                corrected ^= 1 << p;
            }
            Ok(corrected)
        } else {
            Err(Error::Uncorrectable)
        }
    }

    /// Systematic encode: `r(x) = (x^10 * i(x)) mod g(x)`, returning the full 31-bit codeword
    /// (21 data bits in the high positions, 10 parity bits in the low positions). Used by test
    /// vectors and by the FLEX/POCSAG encoders that build them.
    pub fn encode(&self, data21: u32) -> u32 {
        let data21 = data21 & 0x1f_ffff;
        let mut reg = [0u8; GENERATOR_DEGREE];
        for i in (0..K).rev() {
            let data_bit = ((data21 >> i) & 1) as u8;
            let feedback = data_bit ^ reg[GENERATOR_DEGREE - 1];
            for j in (1..GENERATOR_DEGREE).rev() {
                reg[j] = reg[j - 1] ^ (feedback & self.generator[j]);
            }
            reg[0] = feedback & self.generator[0];
        }
        let mut parity = 0u32;
        for (j, bit) in reg.iter().enumerate() {
            parity |= (*bit as u32) << j;
        }
        (data21 << GENERATOR_DEGREE) | parity
    }
}

/// Generator polynomial for BCH(31,21,t=2), `g(x) = 1 + x^3 + x^5 + x^6 + x^8 + x^9 + x^10`
/// (the standard POCSAG/FLEX code), coefficients low-degree first, length 11.
const POCSAG_FLEX_GENERATOR: [u8; GENERATOR_DEGREE + 1] = [1, 0, 0, 1, 0, 1, 1, 0, 1, 1, 1];

fn build_gf_tables(poly: &[u8]) -> ([u8; N + 1], [i8; N + 1]) {
    let mut alpha_to = [0u8; N + 1];
    let mut index_of = [0i8; N + 1];
    let mut mask = 1u8;

    alpha_to[M] = 0;
    for i in 0..M {
        alpha_to[i] = mask;
        index_of[alpha_to[i] as usize] = i as i8;
        if poly[i] != 0 {
            alpha_to[M] ^= mask;
        }
        mask <<= 1;
    }
    index_of[alpha_to[M] as usize] = M as i8;
    mask >>= 1;

    for i in (M + 1)..N {
        if alpha_to[i - 1] >= mask {
            alpha_to[i] = alpha_to[M] ^ ((alpha_to[i - 1] ^ mask) << 1);
        } else {
            alpha_to[i] = alpha_to[i - 1] << 1;
        }
        index_of[alpha_to[i] as usize] = i as i8;
    }
    index_of[0] = -1;

    (alpha_to, index_of)
}

/// The canonical BCH(31,21,t=2) construction shared by FLEX and POCSAG.
pub fn pager_bch() -> Bch {
    Bch::new(&[1, 0, 1, 0, 0, 1])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn clean_codeword_roundtrips() {
        let bch = pager_bch();
        let data = 0x0abcde & 0x1f_ffff;
        let cw = bch.encode(data);
        let corrected = bch.decode(cw).unwrap();
        assert_eq!(corrected, cw);
        assert_eq!(corrected >> GENERATOR_DEGREE, data);
    }

    #[test]
    fn single_bit_error_is_corrected() {
        let bch = pager_bch();
        let cw = bch.encode(0x155555);
        for bit in 0..31 {
            let corrupted = cw ^ (1 << bit);
            let corrected = bch.decode(corrupted).unwrap();
            assert_eq!(corrected, cw, "failed to correct bit {}", bit);
        }
    }

    #[test]
    fn two_bit_errors_are_corrected() {
        let bch = pager_bch();
        let cw = bch.encode(0x0f0f0f);
        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            let b1 = rng.gen_range(0..31);
            let mut b2 = rng.gen_range(0..31);
            while b2 == b1 {
                b2 = rng.gen_range(0..31);
            }
            let corrupted = cw ^ (1 << b1) ^ (1 << b2);
            let corrected = bch.decode(corrupted).unwrap();
            assert_eq!(corrected, cw);
        }
    }

    #[test]
    fn three_bit_errors_either_uncorrectable_or_a_valid_codeword() {
        let bch = pager_bch();
        let cw = bch.encode(0x123456 & 0x1f_ffff);
        let corrupted = cw ^ (1 << 0) ^ (1 << 7) ^ (1 << 19);
        match bch.decode(corrupted) {
            Ok(word) => {
                // Must at least decode to *some* word whose own syndrome is clean.
                assert_eq!(bch.syndrome(word, 1), 0);
                assert_eq!(bch.syndrome(word, 3), 0);
            }
            Err(Error::Uncorrectable) => {}
            Err(e) => panic!("unexpected error {:?}", e),
        }
    }
}
