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

//! Atoms: the items of a partition's data stream.
//!
//! An atom is either a row or a range-tombstone marker. Upstream merge
//! logic decides *which* atoms to emit and in what order; this layer only
//! frames them on disk. Row bodies (the cell encoding) are opaque bytes
//! here.
//!
//! ## Wire format
//!
//! Every atom starts with a flags byte:
//!
//! ```text
//! 0x01  end-of-partition sentinel (no further fields)
//! 0x02  range-tombstone marker
//! 0x04  static row
//! 0x00  regular row
//! ```
//!
//! Rows: `flags | clustering | body_len (u32) | body`.
//! Markers: `flags | bound | marker kind (u8) | deletion (12B)`.
//! Static rows: `flags | body_len (u32) | body` (no clustering).

use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use super::clustering::{ClusteringCodec, ClusteringPrefix};
use super::deletion::DeletionTime;
use crate::error::CodecError;

const FLAG_END_OF_PARTITION: u8 = 0x01;
const FLAG_MARKER: u8 = 0x02;
const FLAG_STATIC: u8 = 0x04;

/// A row positioned by its clustering. The body is the cell payload,
/// already encoded by the layer above.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub clustering: ClusteringPrefix,
    pub body: Vec<u8>,
}

/// The per-partition static row. Serialized once, right after the partition
/// deletion, for schemas that declare static columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticRow {
    pub body: Vec<u8>,
}

/// Whether a marker opens or closes a range tombstone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    Open = 0,
    Close = 1,
}

/// A range-tombstone bound in the atom stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeTombstoneMarker {
    pub bound: ClusteringPrefix,
    pub kind: MarkerKind,
    pub deletion: DeletionTime,
}

impl RangeTombstoneMarker {
    pub fn open(bound: ClusteringPrefix, deletion: DeletionTime) -> Self {
        Self {
            bound,
            kind: MarkerKind::Open,
            deletion,
        }
    }

    pub fn close(bound: ClusteringPrefix, deletion: DeletionTime) -> Self {
        Self {
            bound,
            kind: MarkerKind::Close,
            deletion,
        }
    }

    pub fn is_open(&self) -> bool {
        self.kind == MarkerKind::Open
    }

    /// Deletion time that stays in effect past this marker, for open
    /// markers.
    pub fn open_deletion_time(&self) -> DeletionTime {
        self.deletion
    }
}

/// One item of the unfiltered partition stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Atom {
    Row(Row),
    Marker(RangeTombstoneMarker),
}

impl Atom {
    pub fn row(clustering: ClusteringPrefix, body: Vec<u8>) -> Self {
        Atom::Row(Row { clustering, body })
    }

    pub fn clustering(&self) -> &ClusteringPrefix {
        match self {
            Atom::Row(r) => &r.clustering,
            Atom::Marker(m) => &m.bound,
        }
    }

    pub fn is_marker(&self) -> bool {
        matches!(self, Atom::Marker(_))
    }
}

/// Serializes one atom.
pub fn serialize_atom<W: Write>(
    atom: &Atom,
    codec: &ClusteringCodec,
    out: &mut W,
) -> std::io::Result<()> {
    match atom {
        Atom::Row(row) => {
            out.write_u8(0)?;
            codec.encode(&row.clustering, out)?;
            out.write_u32::<BigEndian>(row.body.len() as u32)?;
            out.write_all(&row.body)?;
        }
        Atom::Marker(marker) => {
            out.write_u8(FLAG_MARKER)?;
            codec.encode(&marker.bound, out)?;
            out.write_u8(marker.kind as u8)?;
            marker.deletion.serialize(out)?;
        }
    }
    Ok(())
}

/// Serializes the static row.
pub fn serialize_static_row<W: Write>(row: &StaticRow, out: &mut W) -> std::io::Result<()> {
    out.write_u8(FLAG_STATIC)?;
    out.write_u32::<BigEndian>(row.body.len() as u32)?;
    out.write_all(&row.body)?;
    Ok(())
}

/// Writes the end-of-partition sentinel.
pub fn write_end_of_partition<W: Write>(out: &mut W) -> std::io::Result<()> {
    out.write_u8(FLAG_END_OF_PARTITION)
}

/// Reads the next atom, or `None` at the end-of-partition sentinel.
pub fn read_atom<R: Read>(
    src: &mut R,
    codec: &ClusteringCodec,
) -> Result<Option<Atom>, CodecError> {
    let flags = src.read_u8().map_err(CodecError::from_eof)?;
    if flags & FLAG_END_OF_PARTITION != 0 {
        return Ok(None);
    }
    if flags & FLAG_STATIC != 0 {
        return Err(CodecError::Malformed(
            "static row inside the atom stream".into(),
        ));
    }
    if flags & FLAG_MARKER != 0 {
        let bound = codec.decode(src)?;
        let kind = match src.read_u8().map_err(CodecError::from_eof)? {
            0 => MarkerKind::Open,
            1 => MarkerKind::Close,
            k => return Err(CodecError::Malformed(format!("unknown marker kind {k}"))),
        };
        let deletion = DeletionTime::deserialize(src)?;
        return Ok(Some(Atom::Marker(RangeTombstoneMarker {
            bound,
            kind,
            deletion,
        })));
    }
    let clustering = codec.decode(src)?;
    let len = src.read_u32::<BigEndian>().map_err(CodecError::from_eof)? as usize;
    let mut body = vec![0u8; len];
    src.read_exact(&mut body).map_err(CodecError::from_eof)?;
    Ok(Some(Atom::Row(Row { clustering, body })))
}

/// Reads the static row written by [`serialize_static_row`].
pub fn read_static_row<R: Read>(src: &mut R) -> Result<StaticRow, CodecError> {
    let flags = src.read_u8().map_err(CodecError::from_eof)?;
    if flags & FLAG_STATIC == 0 {
        return Err(CodecError::Malformed("expected a static row".into()));
    }
    let len = src.read_u32::<BigEndian>().map_err(CodecError::from_eof)? as usize;
    let mut body = vec![0u8; len];
    src.read_exact(&mut body).map_err(CodecError::from_eof)?;
    Ok(StaticRow { body })
}

// =============================================================================
// Tests
// =============================================================================
