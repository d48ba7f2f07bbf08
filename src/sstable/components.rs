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

//! SSTable components and on-disk naming.
//!
//! An SSTable is a set of sibling files distinguished by component suffix:
//! `<table>-<generation>[-tmp]-<Component>`. Everything is written under
//! temporary names; `commit` renames the set with `Data.db` last, so the
//! presence of a final data file marks a completely renamed SSTable after a
//! crash.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::error;

/// One file of an SSTable's component set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Data,
    PrimaryIndex,
    Filter,
    Stats,
    Summary,
    Toc,
    Digest,
    Crc,
    CompressionInfo,
}

impl Component {
    pub const fn file_suffix(&self) -> &'static str {
        match self {
            Component::Data => "Data.db",
            Component::PrimaryIndex => "Index.db",
            Component::Filter => "Filter.db",
            Component::Stats => "Statistics.db",
            Component::Summary => "Summary.db",
            Component::Toc => "TOC.txt",
            Component::Digest => "Digest.crc32",
            Component::Crc => "CRC.db",
            Component::CompressionInfo => "CompressionInfo.db",
        }
    }

    fn from_suffix(suffix: &str) -> Option<Self> {
        [
            Component::Data,
            Component::PrimaryIndex,
            Component::Filter,
            Component::Stats,
            Component::Summary,
            Component::Toc,
            Component::Digest,
            Component::Crc,
            Component::CompressionInfo,
        ]
        .into_iter()
        .find(|c| c.file_suffix() == suffix)
    }
}

/// Identifies one SSTable on disk and names its component files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    directory: PathBuf,
    table: String,
    generation: u64,
    temporary: bool,
}

impl Descriptor {
    /// Descriptor for an SSTable being written.
    pub fn temporary<P: AsRef<Path>>(directory: P, table: &str, generation: u64) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            table: table.to_string(),
            generation,
            temporary: true,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_temporary(&self) -> bool {
        self.temporary
    }

    pub fn as_final(&self) -> Descriptor {
        Descriptor {
            temporary: false,
            ..self.clone()
        }
    }

    pub fn filename_for(&self, component: Component) -> PathBuf {
        let marker = if self.temporary { "-tmp" } else { "" };
        self.directory.join(format!(
            "{}-{}{}-{}",
            self.table,
            self.generation,
            marker,
            component.file_suffix()
        ))
    }

    /// Writes the component manifest.
    pub fn write_toc(&self, components: &[Component]) -> io::Result<()> {
        let mut file = fs::File::create(self.filename_for(Component::Toc))?;
        for component in components {
            writeln!(file, "{}", component.file_suffix())?;
        }
        file.sync_all()
    }

    /// Reads the manifest back. Unknown lines are ignored so newer writers
    /// stay readable.
    pub fn read_toc(&self) -> io::Result<Vec<Component>> {
        let text = fs::read_to_string(self.filename_for(Component::Toc))?;
        Ok(text
            .lines()
            .filter_map(|line| Component::from_suffix(line.trim()))
            .collect())
    }

    /// Deletes every component file that exists. Failures are logged, not
    /// surfaced; abort must run to completion.
    pub fn delete_components(&self, components: &[Component]) {
        for component in components {
            let path = self.filename_for(*component);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    error!(path = %path.display(), error = %e, "failed to delete component");
                }
            }
        }
    }

    /// Renames the whole temporary set to its final names and returns the
    /// final descriptor.
    ///
    /// `Data.db` is renamed last: after a crash, a final data file means
    /// every other component was already in place. The summary rename is
    /// best-effort since the summary can be rebuilt from the index.
    pub fn commit(&self, components: &[Component]) -> io::Result<Descriptor> {
        let target = self.as_final();
        for component in components {
            if matches!(component, Component::Data | Component::Summary) {
                continue;
            }
            fs::rename(self.filename_for(*component), target.filename_for(*component))?;
        }
        fs::rename(
            self.filename_for(Component::Data),
            target.filename_for(Component::Data),
        )?;
        if components.contains(&Component::Summary) {
            if let Err(e) = fs::rename(
                self.filename_for(Component::Summary),
                target.filename_for(Component::Summary),
            ) {
                error!(error = %e, "failed to rename summary component");
            }
        }
        Ok(target)
    }
}

// =============================================================================
// Tests
// =============================================================================
