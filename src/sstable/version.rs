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

//! On-disk format versioning.
//!
//! A `Version` tags an SSTable with the wire dialect its row index was
//! written under. Entries from a *native-compatible* version can be wrapped
//! without re-encoding; entries from the one supported legacy dialect are
//! transcoded on deserialize; anything else is rejected.

use crate::error::{Result, StorageError};

/// Messaging dialect of the current format: variable-width clustering
/// components carry a `u16` length prefix.
pub const MESSAGING_CURRENT: u32 = 10;

/// Legacy messaging dialect: variable-width clustering components carry a
/// `u32` length prefix. Readable via transcode only.
pub const MESSAGING_LEGACY: u32 = 9;

/// On-disk format version of an SSTable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    /// Whether the format stores full rows (all supported formats do; the
    /// ancient cell-name layout did not and is unreadable here).
    pub store_rows: bool,
    /// Clustering wire dialect.
    pub messaging_version: u32,
}

/// The version every new SSTable is written with.
pub const LATEST: Version = Version {
    store_rows: true,
    messaging_version: MESSAGING_CURRENT,
};

impl Version {
    /// True when entry payloads written under `self` are byte-identical to
    /// payloads written under [`LATEST`] and can be wrapped untranscoded.
    pub fn is_native_compatible(&self) -> bool {
        self.store_rows == LATEST.store_rows
            && self.messaging_version == LATEST.messaging_version
    }

    /// Validates that `self` is readable at all, returning
    /// [`StorageError::VersionMismatch`] otherwise.
    pub fn check_readable(&self) -> Result<()> {
        if !self.store_rows {
            return Err(StorageError::VersionMismatch(
                "format does not store rows".into(),
            ));
        }
        match self.messaging_version {
            MESSAGING_CURRENT | MESSAGING_LEGACY => Ok(()),
            v => Err(StorageError::VersionMismatch(format!(
                "unknown messaging version {v}"
            ))),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_compatibility() {
        assert!(LATEST.is_native_compatible());
        let legacy = Version {
            store_rows: true,
            messaging_version: MESSAGING_LEGACY,
        };
        assert!(!legacy.is_native_compatible());
        assert!(legacy.check_readable().is_ok());
    }

    #[test]
    fn test_unreadable_versions() {
        let no_rows = Version {
            store_rows: false,
            messaging_version: MESSAGING_CURRENT,
        };
        assert!(no_rows.check_readable().is_err());

        let unknown = Version {
            store_rows: true,
            messaging_version: 3,
        };
        assert!(unknown.check_readable().is_err());
    }
}
