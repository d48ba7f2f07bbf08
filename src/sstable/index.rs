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

//! The row index entry and its read path.
//!
//! Each partition is indexed by one `RowIndexEntry` in the primary index
//! file. Small partitions get a *bare* entry carrying only the data-file
//! position; partitions that span two or more index blocks get an *indexed*
//! entry whose payload carries the partition-level deletion and one
//! [`IndexInfo`] descriptor per block.
//!
//! ## Wire format
//!
//! ```text
//! position      (u64)
//! payload_size  (u32)            -- 0 for a bare entry
//! payload:
//!   partition deletion  (12B)
//!   columns_count       (u32)    -- always >= 2
//!   IndexInfo x columns_count
//! ```
//!
//! One `IndexInfo` record:
//!
//! ```text
//! first_name | last_name         -- clustering prefixes, variable
//! offset (u64) | width (u64)     -- block byte range in the atoms region
//! has_open_marker (u8)
//! [open marker deletion (12B)]
//! ```
//!
//! The indexed variant decodes its payload lazily: block descriptors are
//! only materialized on access, with decoded record offsets memoized so the
//! nearly-in-order access pattern of the read path stays O(1) per call. The
//! memoization (an offsets array plus a single-slot cache) is the only
//! mutable state and sits behind a mutex; the payload itself is an immutable
//! shared buffer, so double-computation under contention is harmless.

use std::io::{Read, Write};
use std::sync::Arc;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use parking_lot::Mutex;

use super::clustering::{ClusteringCodec, ClusteringComparator, ClusteringPrefix, ClusteringSchema};
use super::deletion::DeletionTime;
use super::version::{Version, MESSAGING_CURRENT};
use crate::error::{CodecError, Result, StorageError};

/// Payload bytes before the first `IndexInfo` record: the partition
/// deletion plus the record count.
const PAYLOAD_HEADER: usize = DeletionTime::SERIALIZED_SIZE + 4;

/// Descriptor of one index block: a contiguous byte range of a partition's
/// atoms region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexInfo {
    /// Clustering of the first atom in the block.
    pub first_name: ClusteringPrefix,
    /// Clustering of the last atom in the block.
    pub last_name: ClusteringPrefix,
    /// Offset of the block's first atom from the start of the partition's
    /// atoms region.
    pub offset: u64,
    /// Byte length of the block.
    pub width: u64,
    /// The range tombstone still open at the end of this block, if one
    /// straddles the boundary.
    pub end_open_marker: Option<DeletionTime>,
}

/// Codec for [`IndexInfo`] records under a given clustering dialect.
#[derive(Debug, Clone)]
pub struct IndexInfoCodec {
    clustering: ClusteringCodec,
}

impl IndexInfoCodec {
    pub fn new(clustering: ClusteringCodec) -> Self {
        Self { clustering }
    }

    pub fn latest(schema: &ClusteringSchema) -> Self {
        Self::new(ClusteringCodec::new(MESSAGING_CURRENT, schema))
    }

    pub fn clustering_codec(&self) -> &ClusteringCodec {
        &self.clustering
    }

    pub fn encode<W: Write>(&self, info: &IndexInfo, out: &mut W) -> std::io::Result<()> {
        self.clustering.encode(&info.first_name, out)?;
        self.clustering.encode(&info.last_name, out)?;
        out.write_u64::<BigEndian>(info.offset)?;
        out.write_u64::<BigEndian>(info.width)?;
        match info.end_open_marker {
            Some(marker) => {
                out.write_u8(1)?;
                marker.serialize(out)?;
            }
            None => out.write_u8(0)?,
        }
        Ok(())
    }

    pub fn decode<R: Read>(&self, src: &mut R) -> std::result::Result<IndexInfo, CodecError> {
        let first_name = self.clustering.decode(src)?;
        let last_name = self.clustering.decode(src)?;
        let offset = src.read_u64::<BigEndian>().map_err(CodecError::from_eof)?;
        let width = src.read_u64::<BigEndian>().map_err(CodecError::from_eof)?;
        let end_open_marker = match src.read_u8().map_err(CodecError::from_eof)? {
            0 => None,
            1 => Some(DeletionTime::deserialize(src)?),
            t => {
                return Err(CodecError::Malformed(format!(
                    "invalid open marker flag {t}"
                )))
            }
        };
        Ok(IndexInfo {
            first_name,
            last_name,
            offset,
            width,
            end_open_marker,
        })
    }

    /// Advances past one record without materializing either clustering
    /// prefix.
    pub fn skip<R: Read>(&self, src: &mut R) -> std::result::Result<(), CodecError> {
        self.clustering.skip(src)?;
        self.clustering.skip(src)?;
        let _offset = src.read_u64::<BigEndian>().map_err(CodecError::from_eof)?;
        let _width = src.read_u64::<BigEndian>().map_err(CodecError::from_eof)?;
        match src.read_u8().map_err(CodecError::from_eof)? {
            0 => Ok(()),
            1 => {
                DeletionTime::deserialize(src)?;
                Ok(())
            }
            t => Err(CodecError::Malformed(format!(
                "invalid open marker flag {t}"
            ))),
        }
    }

    pub fn serialized_size(&self, info: &IndexInfo) -> usize {
        self.clustering.serialized_size(&info.first_name)
            + self.clustering.serialized_size(&info.last_name)
            + 8
            + 8
            + 1
            + info
                .end_open_marker
                .map_or(0, |_| DeletionTime::SERIALIZED_SIZE)
    }
}

/// Per-partition entry of the primary index.
#[derive(Debug)]
pub enum RowIndexEntry {
    /// Just the partition's data-file position. Readers seek there and
    /// stream the partition from its header.
    Bare { position: u64 },
    /// Position plus a buffered block list for seeking inside the
    /// partition.
    Indexed(IndexedEntry),
}

impl RowIndexEntry {
    pub fn bare(position: u64) -> Self {
        RowIndexEntry::Bare { position }
    }

    pub fn position(&self) -> u64 {
        match self {
            RowIndexEntry::Bare { position } => *position,
            RowIndexEntry::Indexed(e) => e.position(),
        }
    }

    /// True when this entry carries the partition deletion and block list;
    /// otherwise callers fetch those from the partition header in the data
    /// file.
    pub fn is_indexed(&self) -> bool {
        self.columns_count() > 0
    }

    pub fn columns_count(&self) -> u32 {
        match self {
            RowIndexEntry::Bare { .. } => 0,
            RowIndexEntry::Indexed(e) => e.columns_count(),
        }
    }

    pub fn deletion_time(&self) -> Option<DeletionTime> {
        match self {
            RowIndexEntry::Bare { .. } => None,
            RowIndexEntry::Indexed(e) => Some(e.deletion_time()),
        }
    }

    /// Wire size of this entry.
    pub fn serialized_size(&self) -> usize {
        match self {
            RowIndexEntry::Bare { .. } => 12,
            RowIndexEntry::Indexed(e) => 12 + e.payload().len(),
        }
    }

    pub fn serialize<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        match self {
            RowIndexEntry::Bare { position } => {
                out.write_u64::<BigEndian>(*position)?;
                out.write_u32::<BigEndian>(0)?;
            }
            RowIndexEntry::Indexed(e) => {
                out.write_u64::<BigEndian>(e.position())?;
                out.write_u32::<BigEndian>(e.payload().len() as u32)?;
                out.write_all(e.payload())?;
            }
        }
        Ok(())
    }

    /// Reconstructs an entry from the primary index file.
    ///
    /// A payload written by a native-compatible version is wrapped as-is; a
    /// payload from the supported legacy dialect is transcoded record by
    /// record into the current dialect. Anything else fails with
    /// [`StorageError::VersionMismatch`].
    pub fn deserialize<R: Read>(
        src: &mut R,
        version: Version,
        schema: &ClusteringSchema,
    ) -> Result<Self> {
        version.check_readable()?;
        let position = src.read_u64::<BigEndian>().map_err(CodecError::from_eof)?;
        let size = src.read_u32::<BigEndian>().map_err(CodecError::from_eof)? as usize;
        if size == 0 {
            return Ok(RowIndexEntry::Bare { position });
        }

        let mut payload = vec![0u8; size];
        src.read_exact(&mut payload).map_err(CodecError::from_eof)?;

        let payload = if version.is_native_compatible() {
            payload
        } else {
            let from = IndexInfoCodec::new(ClusteringCodec::new(version.messaging_version, schema));
            let to = IndexInfoCodec::latest(schema);
            transcode_payload(&payload, &from, &to)?
        };

        let entry = IndexedEntry::from_payload(position, payload, IndexInfoCodec::latest(schema))?;
        Ok(RowIndexEntry::Indexed(entry))
    }

    /// Advances past one serialized entry, reading only the fixed header.
    pub fn skip<R: Read>(src: &mut R) -> std::result::Result<(), CodecError> {
        let _position = src.read_u64::<BigEndian>().map_err(CodecError::from_eof)?;
        let size = src.read_u32::<BigEndian>().map_err(CodecError::from_eof)? as u64;
        let copied = std::io::copy(&mut src.take(size), &mut std::io::sink())
            .map_err(CodecError::from_eof)?;
        if copied != size {
            return Err(CodecError::Truncated);
        }
        Ok(())
    }
}

impl PartialEq for RowIndexEntry {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RowIndexEntry::Bare { position: a }, RowIndexEntry::Bare { position: b }) => a == b,
            (RowIndexEntry::Indexed(a), RowIndexEntry::Indexed(b)) => {
                a.position() == b.position() && a.payload() == b.payload()
            }
            _ => false,
        }
    }
}

/// Re-encodes a legacy payload against the current clustering dialect.
fn transcode_payload(
    payload: &[u8],
    from: &IndexInfoCodec,
    to: &IndexInfoCodec,
) -> Result<Vec<u8>> {
    let mut src = payload;
    let deletion = DeletionTime::deserialize(&mut src)?;
    let entries = src.read_u32::<BigEndian>().map_err(CodecError::from_eof)?;

    let mut out = Vec::with_capacity(payload.len());
    deletion.serialize(&mut out)?;
    out.write_u32::<BigEndian>(entries)?;
    for _ in 0..entries {
        let info = from.decode(&mut src)?;
        to.encode(&info, &mut out)?;
    }
    if !src.is_empty() {
        return Err(StorageError::Corruption(format!(
            "{} trailing bytes after {entries} index records",
            src.len()
        )));
    }
    Ok(out)
}

/// The indexed variant: position plus the buffered block list.
///
/// The payload is immutable after construction and safe to share across
/// readers; the decode memoization behind the mutex only ever moves an
/// offset from unset to its final value.
#[derive(Debug)]
pub struct IndexedEntry {
    position: u64,
    payload: Arc<[u8]>,
    codec: IndexInfoCodec,
    columns: u32,
    decode: Mutex<DecodeState>,
}

#[derive(Debug)]
struct DecodeState {
    /// Byte offset of each record inside the payload, 0 while unknown.
    offsets: Box<[u32]>,
    /// The most recently decoded record; the read path hits the same index
    /// repeatedly while it streams a block.
    current: Option<(u32, IndexInfo)>,
}

impl IndexedEntry {
    /// Wraps a serialized payload. Validates the fixed header; the records
    /// themselves are only validated when touched.
    pub fn from_payload(
        position: u64,
        payload: Vec<u8>,
        codec: IndexInfoCodec,
    ) -> std::result::Result<Self, CodecError> {
        if payload.len() < PAYLOAD_HEADER {
            return Err(CodecError::Truncated);
        }
        let b = &payload;
        let columns = u32::from_be_bytes([b[12], b[13], b[14], b[15]]);
        if columns < 2 {
            return Err(CodecError::Malformed(format!(
                "indexed entry with {columns} blocks"
            )));
        }
        // A record is at least two empty prefixes, the block range and the
        // marker flag; a count the payload cannot hold is corruption, not a
        // reason to allocate.
        const MIN_RECORD_SIZE: usize = 3 + 3 + 8 + 8 + 1;
        if columns as usize > (payload.len() - PAYLOAD_HEADER) / MIN_RECORD_SIZE {
            return Err(CodecError::Malformed(format!(
                "block count {columns} exceeds payload capacity"
            )));
        }
        Ok(Self {
            position,
            payload: payload.into(),
            codec,
            columns,
            decode: Mutex::new(DecodeState {
                offsets: vec![0u32; columns as usize].into_boxed_slice(),
                current: None,
            }),
        })
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn columns_count(&self) -> u32 {
        self.columns
    }

    /// Partition-level deletion, stored at the head of the payload.
    pub fn deletion_time(&self) -> DeletionTime {
        let b = &self.payload;
        DeletionTime {
            local_deletion_time: i32::from_be_bytes([b[0], b[1], b[2], b[3]]),
            marked_for_delete_at: i64::from_be_bytes([
                b[4], b[5], b[6], b[7], b[8], b[9], b[10], b[11],
            ]),
        }
    }

    /// Returns the `i`-th block descriptor, decoding it from the payload on
    /// first access.
    ///
    /// Records before `i` that have never been touched are skipped (not
    /// materialized) and their offsets memoized along the way, so a cold
    /// random access costs one forward walk from the nearest known record
    /// and every later access is a single decode.
    ///
    /// # Panics
    ///
    /// If `i >= columns_count()`.
    pub fn index_info(&self, i: u32) -> std::result::Result<IndexInfo, CodecError> {
        let mut state = self.decode.lock();
        if let Some((idx, info)) = &state.current {
            if *idx == i {
                return Ok(info.clone());
            }
        }

        let mut pos;
        if state.offsets[i as usize] > 0 {
            pos = state.offsets[i as usize] as usize;
        } else {
            // Walk forward from the last record whose offset is known,
            // memoizing every offset on the way.
            let mut j = 0usize;
            while j < i as usize && state.offsets[j] != 0 {
                j += 1;
            }
            if j == 0 {
                pos = PAYLOAD_HEADER;
            } else {
                j -= 1;
                pos = state.offsets[j] as usize;
            }
            loop {
                state.offsets[j] = pos as u32;
                if j == i as usize {
                    break;
                }
                let mut cursor = &self.payload[pos..];
                self.codec.skip(&mut cursor)?;
                pos = self.payload.len() - cursor.len();
                j += 1;
            }
        }

        let mut cursor = &self.payload[pos..];
        let info = self.codec.decode(&mut cursor)?;
        if i + 1 < self.columns {
            state.offsets[(i + 1) as usize] = (self.payload.len() - cursor.len()) as u32;
        }
        state.current = Some((i, info.clone()));
        Ok(info)
    }

    /// Index of the block where a scan for `name` should begin.
    ///
    /// Forward scans search by block `last_name` ("first block that may
    /// still contain `name`"); reversed scans search by `first_name` ("last
    /// block at or before `name`"). `last_index` is a monotonically
    /// advancing hint from the caller narrowing the window to
    /// `[last_index, n)` forward and `[0, last_index + 1)` reversed.
    ///
    /// A forward probe past the last indexed name clamps to the last block;
    /// a reversed probe before the first indexed name returns `-1`,
    /// signaling "outside the indexed range".
    pub fn index_of(
        &self,
        name: &ClusteringPrefix,
        comparator: &ClusteringComparator,
        reversed: bool,
        last_index: i64,
    ) -> std::result::Result<i64, CodecError> {
        let size = self.columns as i64;
        let mut start = 0i64;
        let mut end = size;
        if reversed {
            if last_index < size - 1 {
                end = last_index + 1;
            }
        } else if last_index > 0 {
            start = last_index;
        }

        let mut low = start;
        let mut high = end - 1;
        let mut found = None;
        while low <= high {
            let mid = (low + high) >> 1;
            let info = self.index_info(mid as u32)?;
            let probe = if reversed {
                &info.first_name
            } else {
                &info.last_name
            };
            match comparator.compare(probe, name) {
                std::cmp::Ordering::Less => low = mid + 1,
                std::cmp::Ordering::Greater => high = mid - 1,
                std::cmp::Ordering::Equal => {
                    found = Some(mid);
                    break;
                }
            }
        }

        let idx = match found {
            Some(mid) => mid,
            None if reversed => low - 1,
            None => low.min(size - 1),
        };
        Ok(idx)
    }
}

// =============================================================================
// Tests
// =============================================================================
