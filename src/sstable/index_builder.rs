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

//! Builds the row index for one partition while its atoms stream to disk.
//!
//! The builder writes the partition frame (key, partition deletion, static
//! row, atoms, end-of-partition sentinel) through an [`AtomWriter`] and
//! partitions the atoms region into blocks of at least `column_index_size`
//! bytes. Each sealed block becomes one [`IndexInfo`]. A partition that
//! ends up with a single block yields a bare entry: a read will seek to the
//! partition start and stream it anyway, so a one-entry index would only
//! waste index-file bytes and heap.
//!
//! The first sealed block is parked in a single slot; the payload buffer is
//! allocated only when a second block seals, so single-block partitions
//! (the overwhelmingly common case) never allocate a payload at all. The
//! block count at payload offset 12 is back-patched on close.
//!
//! The builder is single-use: any write error aborts the partition and the
//! caller rolls the files back to its pre-partition marks.

use std::io::Write;

use byteorder::{BigEndian, WriteBytesExt};

use super::atoms::{self, Atom, StaticRow};
use super::clustering::{ClusteringPrefix, ClusteringSchema};
use super::deletion::DeletionTime;
use super::index::{IndexInfo, IndexInfoCodec, IndexedEntry, RowIndexEntry};
use super::seq_writer::AtomWriter;
use crate::error::Result;

pub struct RowIndexBuilder {
    /// Partition start in the data file; becomes the entry's position.
    position: u64,
    partition_deletion: DeletionTime,
    codec: IndexInfoCodec,
    has_static_row: bool,
    column_index_size: u64,

    /// File pointer at the start of the atoms region; block offsets are
    /// relative to it.
    initial_position: u64,
    written: u64,

    first_clustering: Option<ClusteringPrefix>,
    last_clustering: Option<ClusteringPrefix>,
    start_offset: u64,
    /// Deletion of the range tombstone open at the current write point.
    open_marker: Option<DeletionTime>,

    /// Parked first block; only a second seal allocates `buffer`.
    first_block: Option<IndexInfo>,
    buffer: Option<Vec<u8>>,
    block_count: u32,
}

impl RowIndexBuilder {
    pub fn new(
        position: u64,
        partition_deletion: DeletionTime,
        schema: &ClusteringSchema,
        column_index_size: u64,
    ) -> Self {
        Self {
            position,
            partition_deletion,
            codec: IndexInfoCodec::latest(schema),
            has_static_row: schema.has_static_row(),
            column_index_size,
            initial_position: 0,
            written: 0,
            first_clustering: None,
            last_clustering: None,
            start_offset: 0,
            open_marker: None,
            first_block: None,
            buffer: None,
            block_count: 0,
        }
    }

    /// Writes the whole partition frame and returns its index entry.
    ///
    /// `key` must already be validated against the 16-bit length prefix.
    /// Atoms must arrive in clustering order; the builder does not check.
    pub fn build<W, I>(
        mut self,
        writer: &mut W,
        key: &[u8],
        static_row: Option<&StaticRow>,
        atoms: I,
    ) -> Result<RowIndexEntry>
    where
        W: AtomWriter,
        I: IntoIterator<Item = Atom>,
    {
        self.write_partition_header(writer, key, static_row)?;
        self.initial_position = writer.pointer();
        for atom in atoms {
            self.add(writer, &atom)?;
        }
        self.close(writer)
    }

    fn write_partition_header<W: AtomWriter>(
        &self,
        writer: &mut W,
        key: &[u8],
        static_row: Option<&StaticRow>,
    ) -> Result<()> {
        writer.write_u16::<BigEndian>(key.len() as u16)?;
        writer.write_all(key)?;
        self.partition_deletion.serialize(writer)?;
        if self.has_static_row {
            let empty = StaticRow::default();
            atoms::serialize_static_row(static_row.unwrap_or(&empty), writer)?;
        }
        Ok(())
    }

    fn current_offset<W: AtomWriter>(&self, writer: &W) -> u64 {
        writer.pointer() - self.initial_position
    }

    fn add<W: AtomWriter>(&mut self, writer: &mut W, atom: &Atom) -> Result<()> {
        if self.first_clustering.is_none() {
            // Beginning of an index block.
            self.first_clustering = Some(atom.clustering().clone());
            self.start_offset = self.current_offset(writer);
        }

        atoms::serialize_atom(atom, self.codec.clustering_codec(), writer)?;
        self.last_clustering = Some(atom.clustering().clone());
        self.written += 1;

        if let Atom::Marker(marker) = atom {
            self.open_marker = if marker.is_open() {
                Some(marker.open_deletion_time())
            } else {
                None
            };
        }

        let current = self.current_offset(writer);
        if current - self.start_offset >= self.column_index_size {
            self.seal_block(current)?;
        }
        Ok(())
    }

    /// Turns the accumulated block state into one [`IndexInfo`].
    fn seal_block(&mut self, current_offset: u64) -> Result<()> {
        let (first, last) = match (self.first_clustering.take(), self.last_clustering.clone()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Ok(()),
        };
        let info = IndexInfo {
            first_name: first,
            last_name: last,
            offset: self.start_offset,
            width: current_offset - self.start_offset,
            end_open_marker: self.open_marker,
        };

        match &mut self.buffer {
            None => match self.first_block.take() {
                None => self.first_block = Some(info),
                Some(parked) => {
                    let mut buf = Vec::with_capacity(4096);
                    self.partition_deletion.serialize(&mut buf)?;
                    buf.write_u32::<BigEndian>(0)?; // count, patched on close
                    self.codec.encode(&parked, &mut buf)?;
                    self.codec.encode(&info, &mut buf)?;
                    self.buffer = Some(buf);
                }
            },
            Some(buf) => self.codec.encode(&info, buf)?,
        }
        self.block_count += 1;
        Ok(())
    }

    fn close<W: AtomWriter>(mut self, writer: &mut W) -> Result<RowIndexEntry> {
        // The last atom may have landed exactly on a boundary; if not, the
        // tail becomes the final (possibly undersized) block. Sealed before
        // the sentinel so widths cover exactly the atoms region.
        if self.first_clustering.is_some() {
            let current = self.current_offset(writer);
            self.seal_block(current)?;
        }

        atoms::write_end_of_partition(writer)?;

        // A partition can be nothing but a top-level deletion.
        if self.written == 0 {
            return Ok(RowIndexEntry::bare(self.position));
        }

        if self.block_count > 1 {
            if let Some(mut buf) = self.buffer.take() {
                buf[12..16].copy_from_slice(&self.block_count.to_be_bytes());
                let entry = IndexedEntry::from_payload(self.position, buf, self.codec.clone())?;
                return Ok(RowIndexEntry::Indexed(entry));
            }
        }
        Ok(RowIndexEntry::bare(self.position))
    }
}

// =============================================================================
// Tests
// =============================================================================
