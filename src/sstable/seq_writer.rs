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

//! Append-only sequential file writer.
//!
//! All component files are written strictly forward. The writer tracks its
//! own logical position (`pointer`), supports snapshotting via
//! [`SequentialWriter::mark`] and rolling a failed partition back via
//! [`SequentialWriter::reset_and_truncate`], and optionally trickle-syncs
//! during long flushes so closing does not dump the entire page cache at
//! once.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::error;

/// Sink for serialized atom bytes: sequential writes plus the current
/// logical file pointer.
pub trait AtomWriter: Write {
    fn pointer(&self) -> u64;
}

/// In-memory sink, used when a partition frame is staged off-disk.
impl AtomWriter for Vec<u8> {
    fn pointer(&self) -> u64 {
        self.len() as u64
    }
}

/// A snapshot of a writer position, for rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMark(pub(crate) u64);

/// Bytes written between trickle syncs.
const TRICKLE_SYNC_INTERVAL: u64 = 10 * 1024 * 1024;

/// Buffered append-only writer over one component file.
pub struct SequentialWriter {
    path: PathBuf,
    file: BufWriter<File>,
    position: u64,
    trickle_sync: bool,
    since_sync: u64,
}

impl SequentialWriter {
    /// Creates the file, truncating anything already there.
    ///
    /// With `trickle_sync` the writer issues a data sync every
    /// [`TRICKLE_SYNC_INTERVAL`] written bytes; flushes use this so dirty
    /// pages drain as the flush proceeds.
    pub fn open<P: AsRef<Path>>(path: P, trickle_sync: bool) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        Ok(Self {
            path,
            file: BufWriter::new(file),
            position: 0,
            trickle_sync,
            since_sync: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the current position.
    pub fn mark(&self) -> FileMark {
        FileMark(self.position)
    }

    /// Discards everything written after `mark` and resumes there.
    pub fn reset_and_truncate(&mut self, mark: FileMark) -> io::Result<()> {
        self.file.flush()?;
        let file = self.file.get_mut();
        file.set_len(mark.0)?;
        file.seek(SeekFrom::Start(mark.0))?;
        self.position = mark.0;
        Ok(())
    }

    pub fn sync(&mut self) -> io::Result<()> {
        self.file.flush()?;
        self.file.get_ref().sync_data()
    }

    /// Flushes, syncs and closes the file.
    pub fn close(mut self) -> io::Result<()> {
        self.file.flush()?;
        self.file.get_ref().sync_all()
    }

    /// Closes and deletes the file. Used on abort; removal failures are
    /// logged, not surfaced, since abort itself must not fail.
    pub fn abort(self) {
        let path = self.path.clone();
        drop(self);
        if let Err(e) = std::fs::remove_file(&path) {
            if e.kind() != io::ErrorKind::NotFound {
                error!(path = %path.display(), error = %e, "failed to delete aborted file");
            }
        }
    }
}

impl Write for SequentialWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.file.write(buf)?;
        self.position += written as u64;
        if self.trickle_sync {
            self.since_sync += written as u64;
            if self.since_sync >= TRICKLE_SYNC_INTERVAL {
                self.since_sync = 0;
                self.file.flush()?;
                self.file.get_ref().sync_data()?;
            }
        }
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl AtomWriter for SequentialWriter {
    fn pointer(&self) -> u64 {
        self.position
    }
}

// =============================================================================
// Tests
// =============================================================================
