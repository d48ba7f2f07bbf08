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

//! CairnDB Storage Layer
//!
//! SSTable storage for the CairnDB wide-column store. A flush or compaction
//! hands this crate a key-sorted stream of partitions, each a sorted run of
//! *atoms* (rows and range-tombstone markers), and gets back an immutable
//! component set on disk:
//!
//! - `Data.db`: partition frames (key, partition deletion, atoms)
//! - `Index.db`: per-partition `(key, RowIndexEntry)` records
//! - `Filter.db`: partition-key bloom filter (optional)
//! - `Summary.db`: sampled index entries for fast key location
//! - `Statistics.db`: per-table statistics
//! - `Digest.crc32` / `CRC.db`: data-file integrity metadata
//! - `TOC.txt`: the component manifest
//!
//! The distinguishing piece is the **row index**: partitions larger than a
//! configurable threshold carry a compact clustering index so reads can seek
//! into the middle of a partition instead of scanning it from the start.
//!
//! ## Module Structure
//!
//! - `sstable`: the writer pipeline, row index builder and lazy index reader
//! - `options`: engine configuration
//! - `error`: crate-wide error types

pub mod error;
pub mod options;
pub mod sstable;

pub use error::{CodecError, Result, StorageError};
pub use options::{AccessMode, StorageOptions};
