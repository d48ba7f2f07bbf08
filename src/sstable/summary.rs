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

//! Index summary: a sparse sample of the primary index.
//!
//! One record out of every `interval` is sampled with its index-file
//! offset; a key lookup binary-searches the sample and then scans at most
//! `interval` index records from the sampled offset.
//!
//! ## Wire format (`Summary.db`)
//!
//! ```text
//! interval (u32) | count (u32)
//! count × ( key_len (u16) | key | index_offset (u64) )
//! ```

use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::CodecError;

/// Collects summary samples while the primary index is written.
pub struct IndexSummaryBuilder {
    interval: u32,
    keys_seen: u64,
    samples: Vec<(Vec<u8>, u64)>,
}

impl IndexSummaryBuilder {
    pub fn new(expected_keys: u64, interval: u32) -> Self {
        let interval = interval.max(1);
        Self {
            interval,
            keys_seen: 0,
            samples: Vec::with_capacity((expected_keys / interval as u64 + 1) as usize),
        }
    }

    /// Called once per appended partition, in key order.
    pub fn maybe_add_entry(&mut self, key: &[u8], index_offset: u64) {
        if self.keys_seen % self.interval as u64 == 0 {
            self.samples.push((key.to_vec(), index_offset));
        }
        self.keys_seen += 1;
    }

    pub fn build(self) -> IndexSummary {
        IndexSummary {
            interval: self.interval,
            samples: self.samples,
        }
    }
}

/// The completed sample list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSummary {
    interval: u32,
    samples: Vec<(Vec<u8>, u64)>,
}

impl IndexSummary {
    pub fn interval(&self) -> u32 {
        self.interval
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Index-file offset of the greatest sampled key `<= key`, or `None`
    /// when `key` precedes the first sample.
    pub fn floor_offset(&self, key: &[u8]) -> Option<u64> {
        let pp = self.samples.partition_point(|(k, _)| k.as_slice() <= key);
        if pp == 0 {
            return None;
        }
        Some(self.samples[pp - 1].1)
    }

    pub fn serialize<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        out.write_u32::<BigEndian>(self.interval)?;
        out.write_u32::<BigEndian>(self.samples.len() as u32)?;
        for (key, offset) in &self.samples {
            out.write_u16::<BigEndian>(key.len() as u16)?;
            out.write_all(key)?;
            out.write_u64::<BigEndian>(*offset)?;
        }
        Ok(())
    }

    pub fn deserialize<R: Read>(src: &mut R) -> Result<Self, CodecError> {
        let interval = src.read_u32::<BigEndian>().map_err(CodecError::from_eof)?;
        if interval == 0 {
            return Err(CodecError::Malformed("zero summary interval".into()));
        }
        let count = src.read_u32::<BigEndian>().map_err(CodecError::from_eof)?;
        let mut samples = Vec::with_capacity(count.min(1 << 20) as usize);
        for _ in 0..count {
            let len = src.read_u16::<BigEndian>().map_err(CodecError::from_eof)? as usize;
            let mut key = vec![0u8; len];
            src.read_exact(&mut key).map_err(CodecError::from_eof)?;
            let offset = src.read_u64::<BigEndian>().map_err(CodecError::from_eof)?;
            samples.push((key, offset));
        }
        Ok(Self { interval, samples })
    }
}

// =============================================================================
// Tests
// =============================================================================
