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

//! Error types for the storage layer.

use std::io;

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors surfaced by the SSTable writer and the index read path.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// New partition key is not strictly greater than the last written one.
    /// Fatal for the SSTable being written.
    #[error("out of order partition key: last written {last} >= appended {new}")]
    OrderViolation { last: String, new: String },

    /// Partition key does not fit the 16-bit length prefix.
    #[error("partition key of {0} bytes exceeds maximum of 65535")]
    KeyTooLarge(usize),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// On-disk format is neither native-compatible nor transcodable.
    #[error("incompatible sstable version: {0}")]
    VersionMismatch(String),

    #[error("corrupt sstable: {0}")]
    Corruption(String),
}

/// Wire decode failures. Callers treat these as a corrupt SSTable and refuse
/// to open it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Decode ran past the end of the source.
    #[error("truncated input")]
    Truncated,

    /// Length tags or type tags are inconsistent with the schema.
    #[error("malformed encoding: {0}")]
    Malformed(String),
}

impl CodecError {
    /// Maps a short read on an in-memory source to `Truncated`.
    pub(crate) fn from_eof(_: io::Error) -> Self {
        CodecError::Truncated
    }
}
