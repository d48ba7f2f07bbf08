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

//! Segmented access to finished component files.
//!
//! While a file is written, the writer reports *potential segment
//! boundaries* (record starts) to a builder; readers must never be handed a
//! segment that splits a record. On `complete` the builder resolves to
//! either a memory mapping or positioned reads through a shared handle,
//! per the configured access mode.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use memmap2::Mmap;
use parking_lot::Mutex;

use crate::error::Result;
use crate::options::AccessMode;

/// Records record-aligned boundaries while a component file is written.
#[derive(Debug)]
pub struct SegmentedFileBuilder {
    mode: AccessMode,
    boundaries: Vec<u64>,
}

impl SegmentedFileBuilder {
    pub fn new(mode: AccessMode) -> Self {
        Self {
            mode,
            boundaries: Vec::new(),
        }
    }

    /// Offsets arrive in ascending order; duplicates are dropped.
    pub fn add_potential_boundary(&mut self, offset: u64) {
        if self.boundaries.last() != Some(&offset) {
            self.boundaries.push(offset);
        }
    }

    /// Opens the finished file for reading.
    pub fn complete<P: AsRef<Path>>(&self, path: P) -> Result<SegmentedFile> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let length = file.metadata()?.len();
        let access = match self.mode {
            AccessMode::Mmap => {
                // Safety: component files are immutable once renamed into
                // place; nothing truncates or rewrites them while mapped.
                let mmap = unsafe { Mmap::map(&file)? };
                Access::Mapped(mmap)
            }
            AccessMode::Standard => Access::Positioned(Mutex::new(file)),
        };
        Ok(SegmentedFile {
            path,
            length,
            boundaries: self.boundaries.clone().into(),
            access,
        })
    }
}

enum Access {
    Mapped(Mmap),
    Positioned(Mutex<File>),
}

/// Read access to one finished component file.
pub struct SegmentedFile {
    path: PathBuf,
    length: u64,
    boundaries: Arc<[u64]>,
    access: Access,
}

impl SegmentedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// The record boundaries reported during the write.
    pub fn boundaries(&self) -> &[u64] {
        &self.boundaries
    }

    /// Reads `len` bytes at `offset`.
    pub fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let end = offset.checked_add(len as u64);
        if end.is_none() || end > Some(self.length) {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "read of {len} bytes at {offset} beyond file length {}",
                    self.length
                ),
            )
            .into());
        }
        match &self.access {
            Access::Mapped(mmap) => {
                Ok(mmap[offset as usize..offset as usize + len].to_vec())
            }
            Access::Positioned(file) => {
                let mut buf = vec![0u8; len];
                let mut file = file.lock();
                file.seek(SeekFrom::Start(offset))?;
                file.read_exact(&mut buf)?;
                Ok(buf)
            }
        }
    }

    /// Reads from `offset` to the end of the file.
    pub fn read_from(&self, offset: u64) -> Result<Vec<u8>> {
        self.read_at(offset, (self.length - offset.min(self.length)) as usize)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn fixture(mode: AccessMode) -> (tempfile::TempDir, SegmentedFile) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("component");
        std::fs::write(&path, b"0123456789abcdef").unwrap();

        let mut builder = SegmentedFileBuilder::new(mode);
        builder.add_potential_boundary(0);
        builder.add_potential_boundary(8);
        builder.add_potential_boundary(8);
        builder.add_potential_boundary(12);
        let file = builder.complete(&path).unwrap();
        (dir, file)
    }

    #[test]
    fn test_read_at_both_modes() {
        for mode in [AccessMode::Standard, AccessMode::Mmap] {
            let (_dir, file) = fixture(mode);
            assert_eq!(file.len(), 16);
            assert_eq!(file.read_at(0, 4).unwrap(), b"0123");
            assert_eq!(file.read_at(8, 4).unwrap(), b"89ab");
            assert_eq!(file.read_from(12).unwrap(), b"cdef");
            assert!(file.read_at(10, 10).is_err());
        }
    }

    #[test]
    fn test_boundaries_deduplicated() {
        let (_dir, file) = fixture(AccessMode::Standard);
        assert_eq!(file.boundaries(), &[0, 8, 12]);
    }
}
