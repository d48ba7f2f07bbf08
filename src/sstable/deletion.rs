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

//! Deletion timestamps.
//!
//! A `DeletionTime` marks data as deleted at `marked_for_delete_at`
//! (microseconds, the write timestamp granularity) and records
//! `local_deletion_time` (seconds) for tombstone expiry. The wire form is a
//! fixed 12 bytes; the `LIVE` sentinel serializes like any other value.

use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::CodecError;

/// A deletion timestamp pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeletionTime {
    /// Server time in seconds when the deletion happened. Used for purging
    /// expired tombstones.
    pub local_deletion_time: i32,
    /// Timestamp before which data is considered deleted.
    pub marked_for_delete_at: i64,
}

impl DeletionTime {
    /// Fixed wire size.
    pub const SERIALIZED_SIZE: usize = 12;

    /// The "no deletion" sentinel.
    pub const LIVE: DeletionTime = DeletionTime {
        local_deletion_time: i32::MAX,
        marked_for_delete_at: i64::MIN,
    };

    pub fn new(local_deletion_time: i32, marked_for_delete_at: i64) -> Self {
        Self {
            local_deletion_time,
            marked_for_delete_at,
        }
    }

    pub fn is_live(&self) -> bool {
        *self == Self::LIVE
    }

    pub fn serialize<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        out.write_i32::<BigEndian>(self.local_deletion_time)?;
        out.write_i64::<BigEndian>(self.marked_for_delete_at)?;
        Ok(())
    }

    pub fn deserialize<R: Read>(src: &mut R) -> Result<Self, CodecError> {
        let local_deletion_time = src.read_i32::<BigEndian>().map_err(CodecError::from_eof)?;
        let marked_for_delete_at = src.read_i64::<BigEndian>().map_err(CodecError::from_eof)?;
        Ok(Self {
            local_deletion_time,
            marked_for_delete_at,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
