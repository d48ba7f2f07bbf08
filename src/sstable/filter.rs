// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Partition-key bloom filter.
//!
//! Sized from the expected key count and the configured false positive
//! chance: optimal bits per key is `-log₂(p) / ln 2` with
//! `k = bits_per_key × ln 2` hash functions. The filter is write-only
//! during a flush; a rolled-back partition leaves its key behind as a
//! harmless false positive.
//!
//! ## Wire format (`Filter.db`)
//!
//! ```text
//! num_hashes (u32) | num_bits (u64) | bit words (u64 × ceil(bits / 64))
//! ```

use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::CodecError;

/// Blocked double-hashing bloom filter over raw partition-key bytes.
#[derive(Debug, Clone)]
pub struct BloomFilter {
    bits: Vec<u64>,
    num_bits: u64,
    num_hashes: u32,
}

impl BloomFilter {
    /// Sizes a filter for `expected_keys` at the target false positive
    /// chance.
    pub fn with_fp_chance(expected_keys: u64, fp_chance: f64) -> Self {
        let fp_chance = fp_chance.clamp(1e-8, 0.999_999);
        let bits_per_key = -fp_chance.log2() / std::f64::consts::LN_2;
        let num_hashes = ((bits_per_key * std::f64::consts::LN_2).round() as u32).clamp(1, 30);
        let num_bits = ((expected_keys.max(1) as f64 * bits_per_key).ceil() as u64).max(64);
        Self {
            bits: vec![0; num_bits.div_ceil(64) as usize],
            num_bits,
            num_hashes,
        }
    }

    pub fn add(&mut self, key: &[u8]) {
        let (h1, h2) = hash_pair(key);
        for i in 0..self.num_hashes {
            let bit = h1.wrapping_add((i as u64).wrapping_mul(h2)) % self.num_bits;
            self.bits[(bit / 64) as usize] |= 1u64 << (bit % 64);
        }
    }

    /// `false` means the key is definitely absent; `true` means it may be
    /// present.
    pub fn may_contain(&self, key: &[u8]) -> bool {
        let (h1, h2) = hash_pair(key);
        for i in 0..self.num_hashes {
            let bit = h1.wrapping_add((i as u64).wrapping_mul(h2)) % self.num_bits;
            if self.bits[(bit / 64) as usize] & (1u64 << (bit % 64)) == 0 {
                return false;
            }
        }
        true
    }

    pub fn size_bytes(&self) -> usize {
        self.bits.len() * 8
    }

    pub fn serialize<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        out.write_u32::<BigEndian>(self.num_hashes)?;
        out.write_u64::<BigEndian>(self.num_bits)?;
        for &word in &self.bits {
            out.write_u64::<BigEndian>(word)?;
        }
        Ok(())
    }

    pub fn deserialize<R: Read>(src: &mut R) -> Result<Self, CodecError> {
        let num_hashes = src.read_u32::<BigEndian>().map_err(CodecError::from_eof)?;
        let num_bits = src.read_u64::<BigEndian>().map_err(CodecError::from_eof)?;
        if num_hashes == 0 || num_hashes > 30 || num_bits == 0 {
            return Err(CodecError::Malformed(format!(
                "implausible filter geometry: {num_hashes} hashes over {num_bits} bits"
            )));
        }
        let words = num_bits.div_ceil(64) as usize;
        let mut bits = Vec::with_capacity(words);
        for _ in 0..words {
            bits.push(src.read_u64::<BigEndian>().map_err(CodecError::from_eof)?);
        }
        Ok(Self {
            bits,
            num_bits,
            num_hashes,
        })
    }
}

/// Two independent byte-fold hashes driving the double-hashing scheme.
fn hash_pair(key: &[u8]) -> (u64, u64) {
    let mut h1 = 0xcbf2_9ce4_8422_2325u64;
    let mut h2 = 0x9e37_79b9_7f4a_7c15u64;
    for (i, &b) in key.iter().enumerate() {
        h1 = h1.wrapping_mul(31).wrapping_add(b as u64);
        h2 = h2
            .wrapping_mul(37)
            .wrapping_add(b as u64)
            .wrapping_add(i as u64);
    }
    (h1, h2 | 1)
}

// =============================================================================
// Tests
// =============================================================================
