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

//! Clustering prefixes and their wire codec.
//!
//! Within a partition every atom is positioned by a *clustering prefix*: an
//! ordered tuple of column values interpreted under the table's clustering
//! column types. Rows carry a full prefix; range-tombstone markers carry
//! bound prefixes that may be shorter than the full clustering and that sort
//! just before or just after the rows sharing their values.
//!
//! ## Wire format
//!
//! ```text
//! kind  (u8)
//! size  (u16)          -- number of components, <= schema clustering columns
//! components:
//!   fixed-width type   -> raw value bytes (4 or 8)
//!   variable type      -> len (u16, or u32 in the legacy dialect) | bytes
//! ```
//!
//! The encoding is self-delimiting and bit-identical between writer and
//! reader for a given messaging dialect.

use std::cmp::Ordering;
use std::io::{Read, Write};
use std::sync::Arc;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use super::version::MESSAGING_LEGACY;
use crate::error::CodecError;

/// Type of one clustering column. Decides the component wire layout and the
/// comparison rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusteringType {
    Int32,
    Int64,
    Blob,
    Text,
}

impl ClusteringType {
    /// Wire width for fixed-width types, `None` for length-prefixed ones.
    pub fn fixed_len(&self) -> Option<usize> {
        match self {
            ClusteringType::Int32 => Some(4),
            ClusteringType::Int64 => Some(8),
            ClusteringType::Blob | ClusteringType::Text => None,
        }
    }

    /// Compares two encoded values of this type.
    pub fn compare_values(&self, a: &[u8], b: &[u8]) -> Ordering {
        match self {
            ClusteringType::Int32 if a.len() == 4 && b.len() == 4 => {
                let ia = i32::from_be_bytes([a[0], a[1], a[2], a[3]]);
                let ib = i32::from_be_bytes([b[0], b[1], b[2], b[3]]);
                ia.cmp(&ib)
            }
            ClusteringType::Int64 if a.len() == 8 && b.len() == 8 => {
                let ia = i64::from_be_bytes(a.try_into().unwrap_or([0; 8]));
                let ib = i64::from_be_bytes(b.try_into().unwrap_or([0; 8]));
                ia.cmp(&ib)
            }
            _ => a.cmp(b),
        }
    }
}

/// Kind of a clustering prefix. The wire tag doubles as the storage order of
/// the kinds; comparison uses [`PrefixKind::compared_to_clustering`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PrefixKind {
    /// End bound excluding the rows sharing its values.
    ExclusiveEnd = 0,
    /// Start bound including the rows sharing its values.
    InclusiveStart = 1,
    /// A row's full clustering.
    Clustering = 2,
    /// End bound including the rows sharing its values.
    InclusiveEnd = 3,
    /// Start bound excluding the rows sharing its values.
    ExclusiveStart = 4,
}

impl PrefixKind {
    /// Where this kind sorts relative to a row with equal component values:
    /// `-1` before, `0` equal, `1` after.
    pub fn compared_to_clustering(&self) -> i32 {
        match self {
            PrefixKind::ExclusiveEnd | PrefixKind::InclusiveStart => -1,
            PrefixKind::Clustering => 0,
            PrefixKind::InclusiveEnd | PrefixKind::ExclusiveStart => 1,
        }
    }

    fn from_wire(tag: u8) -> Result<Self, CodecError> {
        match tag {
            0 => Ok(PrefixKind::ExclusiveEnd),
            1 => Ok(PrefixKind::InclusiveStart),
            2 => Ok(PrefixKind::Clustering),
            3 => Ok(PrefixKind::InclusiveEnd),
            4 => Ok(PrefixKind::ExclusiveStart),
            t => Err(CodecError::Malformed(format!("unknown prefix kind {t}"))),
        }
    }
}

/// An ordered tuple of clustering column values plus the prefix kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusteringPrefix {
    kind: PrefixKind,
    values: Vec<Vec<u8>>,
}

impl ClusteringPrefix {
    pub fn new(kind: PrefixKind, values: Vec<Vec<u8>>) -> Self {
        Self { kind, values }
    }

    /// A row's clustering.
    pub fn row(values: Vec<Vec<u8>>) -> Self {
        Self::new(PrefixKind::Clustering, values)
    }

    pub fn inclusive_start(values: Vec<Vec<u8>>) -> Self {
        Self::new(PrefixKind::InclusiveStart, values)
    }

    pub fn exclusive_start(values: Vec<Vec<u8>>) -> Self {
        Self::new(PrefixKind::ExclusiveStart, values)
    }

    pub fn inclusive_end(values: Vec<Vec<u8>>) -> Self {
        Self::new(PrefixKind::InclusiveEnd, values)
    }

    pub fn exclusive_end(values: Vec<Vec<u8>>) -> Self {
        Self::new(PrefixKind::ExclusiveEnd, values)
    }

    pub fn kind(&self) -> PrefixKind {
        self.kind
    }

    pub fn size(&self) -> usize {
        self.values.len()
    }

    pub fn get(&self, i: usize) -> &[u8] {
        &self.values[i]
    }

    pub fn values(&self) -> &[Vec<u8>] {
        &self.values
    }
}

/// The clustering column layout of a table, shared by writer and reader.
#[derive(Debug, Clone)]
pub struct ClusteringSchema {
    types: Arc<[ClusteringType]>,
    has_static_row: bool,
}

impl ClusteringSchema {
    pub fn new(types: Vec<ClusteringType>, has_static_row: bool) -> Self {
        Self {
            types: types.into(),
            has_static_row,
        }
    }

    pub fn types(&self) -> &[ClusteringType] {
        &self.types
    }

    pub fn has_static_row(&self) -> bool {
        self.has_static_row
    }

    pub fn comparator(&self) -> ClusteringComparator {
        ClusteringComparator {
            types: self.types.clone(),
        }
    }
}

/// Total order over clustering prefixes under a schema's column types.
#[derive(Debug, Clone)]
pub struct ClusteringComparator {
    types: Arc<[ClusteringType]>,
}

impl ClusteringComparator {
    /// Compares component-wise over the shared length; ties between prefixes
    /// of equal length break on kind, and a shorter prefix sorts by its own
    /// kind relative to the rows it bounds.
    pub fn compare(&self, a: &ClusteringPrefix, b: &ClusteringPrefix) -> Ordering {
        let common = a.size().min(b.size());
        for i in 0..common {
            let cmp = self.types[i].compare_values(a.get(i), b.get(i));
            if cmp != Ordering::Equal {
                return cmp;
            }
        }
        if a.size() == b.size() {
            return a
                .kind()
                .compared_to_clustering()
                .cmp(&b.kind().compared_to_clustering());
        }
        if a.size() < b.size() {
            match a.kind().compared_to_clustering() {
                n if n < 0 => Ordering::Less,
                0 => Ordering::Less, // full row cannot be shorter; treat as bound-before
                _ => Ordering::Greater,
            }
        } else {
            match b.kind().compared_to_clustering() {
                n if n < 0 => Ordering::Greater,
                0 => Ordering::Greater,
                _ => Ordering::Less,
            }
        }
    }
}

/// Clustering prefix codec, parameterized by the messaging dialect and the
/// schema's ordered column types.
#[derive(Debug, Clone)]
pub struct ClusteringCodec {
    messaging_version: u32,
    types: Arc<[ClusteringType]>,
}

impl ClusteringCodec {
    pub fn new(messaging_version: u32, schema: &ClusteringSchema) -> Self {
        Self {
            messaging_version,
            types: schema.types.clone(),
        }
    }

    pub fn messaging_version(&self) -> u32 {
        self.messaging_version
    }

    fn legacy(&self) -> bool {
        self.messaging_version == MESSAGING_LEGACY
    }

    pub fn encode<W: Write>(&self, prefix: &ClusteringPrefix, out: &mut W) -> std::io::Result<()> {
        debug_assert!(prefix.size() <= self.types.len());
        out.write_u8(prefix.kind() as u8)?;
        out.write_u16::<BigEndian>(prefix.size() as u16)?;
        for (i, value) in prefix.values().iter().enumerate() {
            match self.types[i].fixed_len() {
                Some(len) => {
                    debug_assert_eq!(value.len(), len);
                    out.write_all(value)?;
                }
                None if self.legacy() => {
                    out.write_u32::<BigEndian>(value.len() as u32)?;
                    out.write_all(value)?;
                }
                None => {
                    out.write_u16::<BigEndian>(value.len() as u16)?;
                    out.write_all(value)?;
                }
            }
        }
        Ok(())
    }

    pub fn decode<R: Read>(&self, src: &mut R) -> Result<ClusteringPrefix, CodecError> {
        let kind = PrefixKind::from_wire(src.read_u8().map_err(CodecError::from_eof)?)?;
        let size = src.read_u16::<BigEndian>().map_err(CodecError::from_eof)? as usize;
        if size > self.types.len() {
            return Err(CodecError::Malformed(format!(
                "clustering size {size} exceeds {} schema columns",
                self.types.len()
            )));
        }
        let mut values = Vec::with_capacity(size);
        for i in 0..size {
            values.push(self.read_value(src, i)?);
        }
        Ok(ClusteringPrefix::new(kind, values))
    }

    /// Advances past one encoded prefix without materializing it.
    pub fn skip<R: Read>(&self, src: &mut R) -> Result<(), CodecError> {
        let _kind = PrefixKind::from_wire(src.read_u8().map_err(CodecError::from_eof)?)?;
        let size = src.read_u16::<BigEndian>().map_err(CodecError::from_eof)? as usize;
        if size > self.types.len() {
            return Err(CodecError::Malformed(format!(
                "clustering size {size} exceeds {} schema columns",
                self.types.len()
            )));
        }
        for i in 0..size {
            let len = self.read_value_len(src, i)?;
            skip_bytes(src, len)?;
        }
        Ok(())
    }

    /// Must agree with what [`ClusteringCodec::encode`] writes.
    pub fn serialized_size(&self, prefix: &ClusteringPrefix) -> usize {
        let mut size = 1 + 2;
        for (i, value) in prefix.values().iter().enumerate() {
            size += match self.types[i].fixed_len() {
                Some(len) => len,
                None if self.legacy() => 4 + value.len(),
                None => 2 + value.len(),
            };
        }
        size
    }

    fn read_value<R: Read>(&self, src: &mut R, i: usize) -> Result<Vec<u8>, CodecError> {
        let len = self.read_value_len(src, i)?;
        let mut value = vec![0u8; len];
        src.read_exact(&mut value).map_err(CodecError::from_eof)?;
        Ok(value)
    }

    fn read_value_len<R: Read>(&self, src: &mut R, i: usize) -> Result<usize, CodecError> {
        match self.types[i].fixed_len() {
            Some(len) => Ok(len),
            None if self.legacy() => {
                let len = src.read_u32::<BigEndian>().map_err(CodecError::from_eof)?;
                if len > u16::MAX as u32 {
                    return Err(CodecError::Malformed(format!(
                        "legacy component length {len} out of range"
                    )));
                }
                Ok(len as usize)
            }
            None => Ok(src.read_u16::<BigEndian>().map_err(CodecError::from_eof)? as usize),
        }
    }
}

fn skip_bytes<R: Read>(src: &mut R, len: usize) -> Result<(), CodecError> {
    let copied = std::io::copy(&mut src.take(len as u64), &mut std::io::sink())
        .map_err(CodecError::from_eof)?;
    if copied as usize != len {
        return Err(CodecError::Truncated);
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
