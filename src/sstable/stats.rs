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

//! Per-SSTable statistics.
//!
//! Collected incrementally while partitions are appended and serialized to
//! the `Statistics.db` component on close. Compaction uses the deletion
//! bounds to decide when an SSTable can drop tombstones; the key range
//! bounds interval queries.

use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use super::deletion::DeletionTime;
use crate::error::CodecError;

/// Accumulates statistics during a write.
#[derive(Debug, Default)]
pub struct StatsCollector {
    partition_count: u64,
    atom_count: u64,
    max_partition_size: u64,
    min_timestamp: Option<i64>,
    max_local_deletion_time: Option<i32>,
    min_key: Option<Vec<u8>>,
    max_key: Option<Vec<u8>>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one appended partition. Keys arrive in order, so the key
    /// range is just first-and-last.
    pub fn update_partition(&mut self, key: &[u8], size_bytes: u64, atoms: u64) {
        self.partition_count += 1;
        self.atom_count += atoms;
        self.max_partition_size = self.max_partition_size.max(size_bytes);
        if self.min_key.is_none() {
            self.min_key = Some(key.to_vec());
        }
        self.max_key = Some(key.to_vec());
    }

    /// Records a deletion observed in the stream (partition-level or a
    /// range-tombstone marker). Live sentinels are ignored.
    pub fn update_deletion(&mut self, deletion: DeletionTime) {
        if deletion.is_live() {
            return;
        }
        self.min_timestamp = Some(match self.min_timestamp {
            Some(ts) => ts.min(deletion.marked_for_delete_at),
            None => deletion.marked_for_delete_at,
        });
        self.max_local_deletion_time = Some(match self.max_local_deletion_time {
            Some(ldt) => ldt.max(deletion.local_deletion_time),
            None => deletion.local_deletion_time,
        });
    }

    pub fn finalize(self) -> SSTableStats {
        SSTableStats {
            partition_count: self.partition_count,
            atom_count: self.atom_count,
            max_partition_size: self.max_partition_size,
            min_timestamp: self.min_timestamp.unwrap_or(i64::MAX),
            max_local_deletion_time: self.max_local_deletion_time.unwrap_or(i32::MIN),
            min_key: self.min_key.unwrap_or_default(),
            max_key: self.max_key.unwrap_or_default(),
        }
    }
}

/// Finalized statistics as stored in `Statistics.db`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SSTableStats {
    pub partition_count: u64,
    pub atom_count: u64,
    pub max_partition_size: u64,
    /// Smallest deletion timestamp, `i64::MAX` when nothing is deleted.
    pub min_timestamp: i64,
    /// Largest tombstone expiry second, `i32::MIN` when nothing is deleted.
    pub max_local_deletion_time: i32,
    pub min_key: Vec<u8>,
    pub max_key: Vec<u8>,
}

impl SSTableStats {
    pub fn serialize<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        out.write_u64::<BigEndian>(self.partition_count)?;
        out.write_u64::<BigEndian>(self.atom_count)?;
        out.write_u64::<BigEndian>(self.max_partition_size)?;
        out.write_i64::<BigEndian>(self.min_timestamp)?;
        out.write_i32::<BigEndian>(self.max_local_deletion_time)?;
        out.write_u16::<BigEndian>(self.min_key.len() as u16)?;
        out.write_all(&self.min_key)?;
        out.write_u16::<BigEndian>(self.max_key.len() as u16)?;
        out.write_all(&self.max_key)?;
        Ok(())
    }

    pub fn deserialize<R: Read>(src: &mut R) -> Result<Self, CodecError> {
        let partition_count = src.read_u64::<BigEndian>().map_err(CodecError::from_eof)?;
        let atom_count = src.read_u64::<BigEndian>().map_err(CodecError::from_eof)?;
        let max_partition_size = src.read_u64::<BigEndian>().map_err(CodecError::from_eof)?;
        let min_timestamp = src.read_i64::<BigEndian>().map_err(CodecError::from_eof)?;
        let max_local_deletion_time =
            src.read_i32::<BigEndian>().map_err(CodecError::from_eof)?;
        let mut read_key = |src: &mut R| -> Result<Vec<u8>, CodecError> {
            let len = src.read_u16::<BigEndian>().map_err(CodecError::from_eof)? as usize;
            let mut key = vec![0u8; len];
            src.read_exact(&mut key).map_err(CodecError::from_eof)?;
            Ok(key)
        };
        let min_key = read_key(src)?;
        let max_key = read_key(src)?;
        Ok(Self {
            partition_count,
            atom_count,
            max_partition_size,
            min_timestamp,
            max_local_deletion_time,
            min_key,
            max_key,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collects_bounds() {
        let mut collector = StatsCollector::new();
        collector.update_partition(b"aaa", 100, 3);
        collector.update_deletion(DeletionTime::new(50, 5_000));
        collector.update_partition(b"zzz", 900, 7);
        collector.update_deletion(DeletionTime::new(80, 2_000));
        collector.update_deletion(DeletionTime::LIVE);

        let stats = collector.finalize();
        assert_eq!(stats.partition_count, 2);
        assert_eq!(stats.atom_count, 10);
        assert_eq!(stats.max_partition_size, 900);
        assert_eq!(stats.min_timestamp, 2_000);
        assert_eq!(stats.max_local_deletion_time, 80);
        assert_eq!(stats.min_key, b"aaa");
        assert_eq!(stats.max_key, b"zzz");
    }

    #[test]
    fn test_empty_sstable_sentinels() {
        let stats = StatsCollector::new().finalize();
        assert_eq!(stats.min_timestamp, i64::MAX);
        assert_eq!(stats.max_local_deletion_time, i32::MIN);
    }

    #[test]
    fn test_roundtrip() {
        let mut collector = StatsCollector::new();
        collector.update_partition(b"k1", 64, 2);
        collector.update_deletion(DeletionTime::new(1, 10));
        let stats = collector.finalize();

        let mut buf = Vec::new();
        stats.serialize(&mut buf).unwrap();
        let decoded = SSTableStats::deserialize(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, stats);
    }
}
