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

//! Wide-Column SSTable Format
//!
//! An SSTable stores a key-sorted run of partitions. Each partition is a
//! contiguous frame in the data file:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ key_len (u16) | key | partition deletion (12B)               │
//! │ [static row]                                                 │
//! │ atom | atom | ... | atom                                     │
//! │ end-of-partition (0x01)                                      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The primary index file carries one `(key, RowIndexEntry)` record per
//! partition. Small partitions get a *bare* entry (just the data-file
//! offset); partitions whose atoms span at least two index blocks get an
//! *indexed* entry carrying one `IndexInfo` descriptor per block, so a read
//! can jump straight to the sub-range covering a requested clustering range.
//!
//! ## Module Structure
//!
//! - `clustering.rs`: clustering types, prefixes, comparator and wire codec
//! - `deletion.rs`: deletion-time pair with its fixed 12-byte codec
//! - `atoms.rs`: rows, range-tombstone markers and partition framing
//! - `index.rs`: `IndexInfo` codec, `RowIndexEntry`, lazy index reader
//! - `index_builder.rs`: streaming partitioner of atoms into index blocks
//! - `seq_writer.rs`: append-only file writer with mark/rollback
//! - `writer.rs`: the SSTable writer pipeline (appender + primary index)
//! - `filter.rs`: partition-key bloom filter
//! - `summary.rs`: sampled index summary
//! - `stats.rs`: per-table statistics
//! - `checksum.rs`: data-file digest and chunked CRCs
//! - `segment.rs`: segment boundary recording and completed-file access
//! - `components.rs`: component set, descriptors, TOC, commit rename
//! - `version.rs`: on-disk format versioning

pub mod atoms;
pub mod checksum;
pub mod clustering;
pub mod components;
pub mod deletion;
pub mod filter;
pub mod index;
pub mod index_builder;
pub mod segment;
pub mod seq_writer;
pub mod stats;
pub mod summary;
pub mod version;
pub mod writer;

pub use atoms::{Atom, MarkerKind, RangeTombstoneMarker, Row, StaticRow};
pub use clustering::{
    ClusteringCodec, ClusteringComparator, ClusteringPrefix, ClusteringSchema, ClusteringType,
    PrefixKind,
};
pub use components::{Component, Descriptor};
pub use deletion::DeletionTime;
pub use filter::BloomFilter;
pub use index::{IndexInfo, IndexInfoCodec, IndexedEntry, RowIndexEntry};
pub use index_builder::RowIndexBuilder;
pub use segment::{SegmentedFile, SegmentedFileBuilder};
pub use seq_writer::{AtomWriter, FileMark, SequentialWriter};
pub use stats::{SSTableStats, StatsCollector};
pub use summary::{IndexSummary, IndexSummaryBuilder};
pub use version::{Version, LATEST, MESSAGING_CURRENT, MESSAGING_LEGACY};
pub use writer::{DecoratedKey, SSTableHandle, SSTableWriter};
