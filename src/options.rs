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

//! Storage engine configuration.

/// How a finished component file is accessed by readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Positioned reads through a shared file handle.
    Standard,
    /// Memory-mapped access.
    Mmap,
}

/// Options for the SSTable writer.
#[derive(Debug, Clone)]
pub struct StorageOptions {
    /// Minimum accumulated atom bytes that seal one row-index block.
    ///
    /// Partitions whose atoms fit in a single block do not get a clustering
    /// index at all; their index entry is just the partition's data-file
    /// offset.
    pub column_index_size: u64,
    /// Target false positive chance for the partition-key bloom filter.
    /// `>= 1.0` disables the filter component entirely.
    pub bloom_fp_chance: f64,
    /// One primary-index record out of every `summary_interval` is sampled
    /// into the summary component.
    pub summary_interval: u32,
    /// Access mode hint forwarded to the data-file segment builder.
    pub disk_access_mode: AccessMode,
    /// Access mode hint forwarded to the index-file segment builder.
    pub index_access_mode: AccessMode,
    /// When false (the flush default), the sequential writers trickle-sync
    /// periodically so a flush does not evict the whole page cache at once.
    pub populate_io_cache_on_flush: bool,
    /// Chunk granularity of the per-chunk CRC component.
    pub crc_chunk_size: u32,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            column_index_size: 64 * 1024,
            bloom_fp_chance: 0.01,
            summary_interval: 128,
            disk_access_mode: AccessMode::Mmap,
            index_access_mode: AccessMode::Mmap,
            populate_io_cache_on_flush: false,
            crc_chunk_size: 32 * 1024,
        }
    }
}
