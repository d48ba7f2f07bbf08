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

//! The SSTable writer pipeline.
//!
//! One writer owns the whole component set for one SSTable being flushed or
//! compacted. Partitions are appended in strictly increasing key order;
//! each append frames the partition in the data file through a
//! [`RowIndexBuilder`], records the resulting [`RowIndexEntry`] in the
//! primary index, feeds the bloom filter and the summary, and reports
//! segment boundaries for both files.
//!
//! A failed partition rolls both files back to their pre-partition marks;
//! the bloom filter cannot be rolled back, and the stranded key stays
//! behind as a harmless false positive. `close` writes the side components
//! and renames everything into place with the data file last; `abort`
//! deletes every temporary component.
//!
//! The writer is single-owner: no internal locking, cross-partition
//! ordering is the caller's contract.

use std::fs::File;
use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use tracing::{trace, warn};

use super::atoms::{Atom, StaticRow};
use super::checksum;
use super::clustering::ClusteringSchema;
use super::components::{Component, Descriptor};
use super::deletion::DeletionTime;
use super::filter::BloomFilter;
use super::index::RowIndexEntry;
use super::index_builder::RowIndexBuilder;
use super::segment::{SegmentedFile, SegmentedFileBuilder};
use super::seq_writer::{AtomWriter, FileMark, SequentialWriter};
use super::stats::{SSTableStats, StatsCollector};
use super::summary::{IndexSummary, IndexSummaryBuilder};
use super::version::LATEST;
use crate::error::{CodecError, Result, StorageError};
use crate::options::StorageOptions;

/// Largest key the 16-bit length prefix can frame.
const MAX_KEY_SIZE: usize = u16::MAX as usize;

/// A partition key decorated with its token.
///
/// The byte-ordered partitioner is the only one here: the token is the
/// key's first eight bytes, so token order agrees with key byte order and
/// ties on the token fall through to the full key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DecoratedKey {
    token: u64,
    key: Vec<u8>,
}

impl DecoratedKey {
    pub fn new(key: Vec<u8>) -> Self {
        let mut prefix = [0u8; 8];
        let take = key.len().min(8);
        prefix[..take].copy_from_slice(&key[..take]);
        Self {
            token: u64::from_be_bytes(prefix),
            key,
        }
    }

    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }
}

/// Writes one SSTable.
pub struct SSTableWriter {
    descriptor: Descriptor,
    components: Vec<Component>,
    schema: ClusteringSchema,
    options: StorageOptions,
    data_file: SequentialWriter,
    dbuilder: SegmentedFileBuilder,
    iwriter: IndexWriter,
    stats: StatsCollector,
    last_key: Option<DecoratedKey>,
    marks: Option<(FileMark, FileMark)>,
}

impl SSTableWriter {
    pub fn new(
        directory: &std::path::Path,
        table: &str,
        generation: u64,
        estimated_keys: u64,
        schema: ClusteringSchema,
        options: StorageOptions,
    ) -> Result<Self> {
        let descriptor = Descriptor::temporary(directory, table, generation);

        let mut components = vec![
            Component::Data,
            Component::PrimaryIndex,
            Component::Stats,
            Component::Summary,
            Component::Toc,
        ];
        if options.bloom_fp_chance < 1.0 {
            components.push(Component::Filter);
        }
        // Data files are written uncompressed, so integrity metadata is
        // always produced.
        components.push(Component::Digest);
        components.push(Component::Crc);

        let trickle = !options.populate_io_cache_on_flush;
        let data_file =
            SequentialWriter::open(descriptor.filename_for(Component::Data), trickle)?;
        let iwriter = IndexWriter::new(&descriptor, estimated_keys, &options)?;
        let dbuilder = SegmentedFileBuilder::new(options.disk_access_mode);

        Ok(Self {
            descriptor,
            components,
            schema,
            options,
            data_file,
            dbuilder,
            iwriter,
            stats: StatsCollector::new(),
            last_key: None,
            marks: None,
        })
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    /// Current data-file position; the next partition will start here.
    pub fn file_pointer(&self) -> u64 {
        self.data_file.pointer()
    }

    /// Appends one partition and returns its index entry, or `None` when
    /// the partition was skipped for an oversized key.
    ///
    /// `atoms` must be in clustering order; partition keys must arrive in
    /// strictly increasing order or the append fails with
    /// [`StorageError::OrderViolation`] without touching either file.
    pub fn append<I>(
        &mut self,
        key: &DecoratedKey,
        partition_deletion: DeletionTime,
        static_row: Option<&StaticRow>,
        atoms: I,
    ) -> Result<Option<RowIndexEntry>>
    where
        I: IntoIterator<Item = Atom>,
    {
        if key.key().len() > MAX_KEY_SIZE {
            warn!(
                key_len = key.key().len(),
                max = MAX_KEY_SIZE,
                "key exceeds maximum size, skipping partition"
            );
            return Ok(None);
        }
        if let Some(last) = &self.last_key {
            if last >= key {
                return Err(StorageError::OrderViolation {
                    last: hex(last.key()),
                    new: hex(key.key()),
                });
            }
        }

        let position = self.data_file.pointer();
        let data_mark = self.data_file.mark();
        let index_mark = self.iwriter.mark();

        let mut atom_count = 0u64;
        let mut marker_deletions: Vec<DeletionTime> = Vec::new();
        let builder = RowIndexBuilder::new(
            position,
            partition_deletion,
            &self.schema,
            self.options.column_index_size,
        );
        let result = {
            let counted = atoms.into_iter().inspect(|atom| {
                atom_count += 1;
                if let Atom::Marker(marker) = atom {
                    marker_deletions.push(marker.deletion);
                }
            });
            builder.build(&mut self.data_file, key.key(), static_row, counted)
        };
        let entry = match result {
            Ok(entry) => entry,
            Err(e) => {
                self.rollback(data_mark, index_mark);
                return Err(e);
            }
        };

        self.stats.update_deletion(partition_deletion);
        for deletion in marker_deletions {
            self.stats.update_deletion(deletion);
        }
        self.stats
            .update_partition(key.key(), self.data_file.pointer() - position, atom_count);

        self.iwriter.append(key, &entry)?;
        self.dbuilder.add_potential_boundary(position);
        trace!(key = %hex(key.key()), position, "appended partition");
        self.last_key = Some(key.clone());
        Ok(Some(entry))
    }

    fn rollback(&mut self, data_mark: FileMark, index_mark: FileMark) {
        if let Err(e) = self.data_file.reset_and_truncate(data_mark) {
            warn!(error = %e, "failed to roll back data file");
        }
        if let Err(e) = self.iwriter.reset_and_truncate(index_mark) {
            warn!(error = %e, "failed to roll back index file");
        }
    }

    /// Snapshots both file positions for a caller-driven rollback window.
    pub fn mark(&mut self) {
        self.marks = Some((self.data_file.mark(), self.iwriter.mark()));
    }

    /// Truncates both files back to the last [`SSTableWriter::mark`].
    pub fn reset_and_truncate(&mut self) -> Result<()> {
        if let Some((data_mark, index_mark)) = self.marks {
            self.data_file.reset_and_truncate(data_mark)?;
            self.iwriter.reset_and_truncate(index_mark)?;
        }
        Ok(())
    }

    /// Finishes the SSTable: closes both files, writes filter, summary,
    /// statistics, integrity metadata and the TOC, then renames the set
    /// into place and opens it for reading.
    pub fn close(self) -> Result<SSTableHandle> {
        let (summary, filter, ibuilder) = self.iwriter.close(&self.descriptor)?;
        self.data_file.close()?;

        checksum::write_integrity(
            &self.descriptor.filename_for(Component::Data),
            &self.descriptor.filename_for(Component::Digest),
            &self.descriptor.filename_for(Component::Crc),
            self.options.crc_chunk_size,
        )?;

        let stats = self.stats.finalize();
        let mut encoded = Vec::new();
        stats.serialize(&mut encoded)?;
        let mut stats_file = File::create(self.descriptor.filename_for(Component::Stats))?;
        stats_file.write_all(&encoded)?;
        stats_file.sync_all()?;

        self.descriptor.write_toc(&self.components)?;
        let descriptor = self.descriptor.commit(&self.components)?;

        let data = self
            .dbuilder
            .complete(descriptor.filename_for(Component::Data))?;
        let index = ibuilder.complete(descriptor.filename_for(Component::PrimaryIndex))?;

        Ok(SSTableHandle {
            descriptor,
            stats,
            data,
            index,
            summary,
            filter,
            schema: self.schema,
        })
    }

    /// Abandons the SSTable, deleting every temporary component.
    pub fn abort(self) {
        self.iwriter.abort();
        self.data_file.abort();
        self.descriptor.delete_components(&self.components);
    }
}

/// Writes the primary index and feeds the filter and summary.
struct IndexWriter {
    file: SequentialWriter,
    builder: SegmentedFileBuilder,
    summary: IndexSummaryBuilder,
    filter: Option<BloomFilter>,
}

impl IndexWriter {
    fn new(descriptor: &Descriptor, estimated_keys: u64, options: &StorageOptions) -> Result<Self> {
        let file = SequentialWriter::open(
            descriptor.filename_for(Component::PrimaryIndex),
            !options.populate_io_cache_on_flush,
        )?;
        let filter = (options.bloom_fp_chance < 1.0)
            .then(|| BloomFilter::with_fp_chance(estimated_keys, options.bloom_fp_chance));
        Ok(Self {
            file,
            builder: SegmentedFileBuilder::new(options.index_access_mode),
            summary: IndexSummaryBuilder::new(estimated_keys, options.summary_interval),
            filter,
        })
    }

    fn append(&mut self, key: &DecoratedKey, entry: &RowIndexEntry) -> Result<()> {
        if let Some(filter) = &mut self.filter {
            filter.add(key.key());
        }
        let index_position = self.file.pointer();
        self.file.write_u16::<BigEndian>(key.key().len() as u16)?;
        self.file.write_all(key.key())?;
        entry.serialize(&mut self.file)?;
        trace!(position = index_position, "wrote index entry");
        self.summary.maybe_add_entry(key.key(), index_position);
        self.builder.add_potential_boundary(index_position);
        Ok(())
    }

    fn mark(&self) -> FileMark {
        self.file.mark()
    }

    /// The bloom filter and summary additions cannot be rolled back; a
    /// stranded filter key is a false positive, a stranded summary sample
    /// still points at a valid record boundary of the truncated file only
    /// if the sample came before the mark, which holds because samples are
    /// taken before the record is written.
    fn reset_and_truncate(&mut self, mark: FileMark) -> Result<()> {
        self.file.reset_and_truncate(mark)?;
        Ok(())
    }

    fn close(self, descriptor: &Descriptor) -> Result<(IndexSummary, Option<BloomFilter>, SegmentedFileBuilder)> {
        if let Some(filter) = &self.filter {
            let mut file = File::create(descriptor.filename_for(Component::Filter))?;
            let mut encoded = Vec::new();
            filter.serialize(&mut encoded)?;
            file.write_all(&encoded)?;
            file.sync_all()?;
        }

        let summary = self.summary.build();
        let mut encoded = Vec::new();
        summary.serialize(&mut encoded)?;
        let mut file = File::create(descriptor.filename_for(Component::Summary))?;
        file.write_all(&encoded)?;
        file.sync_all()?;

        self.file.close()?;
        Ok((summary, self.filter, self.builder))
    }

    fn abort(self) {
        self.file.abort();
    }
}

/// A finished, committed SSTable opened for reading.
pub struct SSTableHandle {
    pub descriptor: Descriptor,
    pub stats: SSTableStats,
    pub data: SegmentedFile,
    pub index: SegmentedFile,
    pub summary: IndexSummary,
    pub filter: Option<BloomFilter>,
    schema: ClusteringSchema,
}

impl SSTableHandle {
    pub fn schema(&self) -> &ClusteringSchema {
        &self.schema
    }

    /// `false` means the key is definitely not in this SSTable.
    pub fn may_contain(&self, key: &[u8]) -> bool {
        self.filter.as_ref().map_or(true, |f| f.may_contain(key))
    }

    /// Decodes the whole primary index back into `(key, entry)` records.
    pub fn read_primary_index(&self) -> Result<Vec<(Vec<u8>, RowIndexEntry)>> {
        let bytes = self.index.read_from(0)?;
        let mut src = bytes.as_slice();
        let mut records = Vec::new();
        while !src.is_empty() {
            let len = src.read_u16::<BigEndian>().map_err(CodecError::from_eof)? as usize;
            let mut key = vec![0u8; len];
            src.read_exact(&mut key).map_err(CodecError::from_eof)?;
            let entry = RowIndexEntry::deserialize(&mut src, LATEST, &self.schema)?;
            records.push((key, entry));
        }
        Ok(records)
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::sstable::clustering::{ClusteringPrefix, ClusteringType};

    fn schema() -> ClusteringSchema {
        ClusteringSchema::new(vec![ClusteringType::Int64], false)
    }

    fn row(n: i64, body_len: usize) -> Atom {
        Atom::row(
            ClusteringPrefix::row(vec![n.to_be_bytes().to_vec()]),
            vec![0xEE; body_len],
        )
    }

    fn writer(dir: &std::path::Path, options: StorageOptions) -> SSTableWriter {
        SSTableWriter::new(dir, "t", 1, 16, schema(), options).unwrap()
    }

    #[test]
    fn test_write_close_read_back() {
        let dir = tempdir().unwrap();
        let mut w = writer(dir.path(), StorageOptions::default());

        for key in [b"aa".to_vec(), b"bb".to_vec(), b"cc".to_vec()] {
            let entry = w
                .append(
                    &DecoratedKey::new(key),
                    DeletionTime::LIVE,
                    None,
                    vec![row(1, 16), row(2, 16)],
                )
                .unwrap();
            assert!(entry.is_some());
        }

        let handle = w.close().unwrap();
        assert!(!handle.descriptor.is_temporary());
        assert_eq!(handle.stats.partition_count, 3);
        assert_eq!(handle.stats.atom_count, 6);
        assert_eq!(handle.stats.min_key, b"aa");
        assert_eq!(handle.stats.max_key, b"cc");

        let records = handle.read_primary_index().unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].0, b"aa");
        assert_eq!(records[0].1.position(), 0);
        assert!(records[1].1.position() > 0);

        assert!(handle.may_contain(b"bb"));

        let toc = handle.descriptor.read_toc().unwrap();
        assert!(toc.contains(&Component::Data));
        assert!(toc.contains(&Component::PrimaryIndex));
        assert!(toc.contains(&Component::Filter));
        assert!(toc.contains(&Component::Digest));
    }

    #[test]
    fn test_order_violation_leaves_files_untouched() {
        let dir = tempdir().unwrap();
        let mut w = writer(dir.path(), StorageOptions::default());
        w.append(
            &DecoratedKey::new(b"b".to_vec()),
            DeletionTime::LIVE,
            None,
            vec![row(1, 8)],
        )
        .unwrap();
        let pointer = w.file_pointer();

        let err = w
            .append(
                &DecoratedKey::new(b"a".to_vec()),
                DeletionTime::LIVE,
                None,
                vec![row(1, 8)],
            )
            .unwrap_err();
        assert!(matches!(err, StorageError::OrderViolation { .. }));
        assert_eq!(w.file_pointer(), pointer);

        // equal keys violate too
        let err = w
            .append(
                &DecoratedKey::new(b"b".to_vec()),
                DeletionTime::LIVE,
                None,
                vec![row(1, 8)],
            )
            .unwrap_err();
        assert!(matches!(err, StorageError::OrderViolation { .. }));
    }

    #[test]
    fn test_oversized_key_is_skipped() {
        let dir = tempdir().unwrap();
        let mut w = writer(dir.path(), StorageOptions::default());
        let entry = w
            .append(
                &DecoratedKey::new(vec![b'k'; 70_000]),
                DeletionTime::LIVE,
                None,
                vec![row(1, 8)],
            )
            .unwrap();
        assert!(entry.is_none());
        assert_eq!(w.file_pointer(), 0);

        // the sstable keeps going
        w.append(
            &DecoratedKey::new(b"ok".to_vec()),
            DeletionTime::LIVE,
            None,
            vec![row(1, 8)],
        )
        .unwrap();
        let handle = w.close().unwrap();
        assert_eq!(handle.stats.partition_count, 1);
    }

    #[test]
    fn test_mark_and_reset_roll_both_files_back() {
        let dir = tempdir().unwrap();
        let mut w = writer(dir.path(), StorageOptions::default());
        w.append(
            &DecoratedKey::new(b"a".to_vec()),
            DeletionTime::LIVE,
            None,
            vec![row(1, 8)],
        )
        .unwrap();
        let pointer = w.file_pointer();

        w.mark();
        w.append(
            &DecoratedKey::new(b"b".to_vec()),
            DeletionTime::LIVE,
            None,
            vec![row(1, 64)],
        )
        .unwrap();
        assert!(w.file_pointer() > pointer);

        w.reset_and_truncate().unwrap();
        assert_eq!(w.file_pointer(), pointer);
    }

    #[test]
    fn test_abort_deletes_temp_components() {
        let dir = tempdir().unwrap();
        let mut w = writer(dir.path(), StorageOptions::default());
        w.append(
            &DecoratedKey::new(b"a".to_vec()),
            DeletionTime::LIVE,
            None,
            vec![row(1, 8)],
        )
        .unwrap();
        w.abort();

        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert!(leftovers.is_empty(), "leftover files: {leftovers:?}");
    }

    #[test]
    fn test_filter_disabled_by_fp_chance() {
        let dir = tempdir().unwrap();
        let options = StorageOptions {
            bloom_fp_chance: 1.0,
            ..StorageOptions::default()
        };
        let mut w = writer(dir.path(), options);
        w.append(
            &DecoratedKey::new(b"a".to_vec()),
            DeletionTime::LIVE,
            None,
            vec![row(1, 8)],
        )
        .unwrap();
        let handle = w.close().unwrap();

        assert!(handle.filter.is_none());
        assert!(!handle
            .descriptor
            .filename_for(Component::Filter)
            .exists());
        // absent filter means "maybe" for everything
        assert!(handle.may_contain(b"whatever"));
    }
}
