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

//! Data-file integrity metadata.
//!
//! Uncompressed SSTables carry two integrity components, produced by one
//! streaming pass over the finished data file:
//!
//! - `Digest.crc32`: the CRC-32 of the whole file, as decimal ASCII, for
//!   cheap whole-file verification during streaming and scrub.
//! - `CRC.db`: `chunk_size (u32)` followed by one CRC-32 (u32) per
//!   `chunk_size` chunk, so scrub can localize corruption.

use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{CodecError, Result, StorageError};

/// Streams `data_path` once, writing both integrity components. Returns the
/// full-file digest.
pub fn write_integrity(
    data_path: &Path,
    digest_path: &Path,
    crc_path: &Path,
    chunk_size: u32,
) -> Result<u32> {
    let chunk_size = chunk_size.max(1024);
    let mut reader = BufReader::new(File::open(data_path)?);

    let mut full = crc32fast::Hasher::new();
    let mut chunk_crcs = Vec::new();
    let mut chunk = vec![0u8; chunk_size as usize];
    loop {
        let read = read_up_to(&mut reader, &mut chunk)?;
        if read == 0 {
            break;
        }
        full.update(&chunk[..read]);
        chunk_crcs.push(crc32fast::hash(&chunk[..read]));
    }
    let digest = full.finalize();

    let mut digest_file = File::create(digest_path)?;
    digest_file.write_all(digest.to_string().as_bytes())?;
    digest_file.sync_all()?;

    let mut crc_file = File::create(crc_path)?;
    crc_file.write_u32::<BigEndian>(chunk_size)?;
    for crc in &chunk_crcs {
        crc_file.write_u32::<BigEndian>(*crc)?;
    }
    crc_file.sync_all()?;

    Ok(digest)
}

/// Re-checks a data file against both components. Used by scrub and tests.
pub fn verify_integrity(data_path: &Path, digest_path: &Path, crc_path: &Path) -> Result<()> {
    let expected: u32 = std::fs::read_to_string(digest_path)?
        .trim()
        .parse()
        .map_err(|_| StorageError::Corruption("unparseable digest component".into()))?;

    let mut crc_reader = BufReader::new(File::open(crc_path)?);
    let chunk_size = crc_reader
        .read_u32::<BigEndian>()
        .map_err(CodecError::from_eof)?;
    if chunk_size == 0 {
        return Err(StorageError::Corruption("zero crc chunk size".into()));
    }

    let mut reader = BufReader::new(File::open(data_path)?);
    let mut full = crc32fast::Hasher::new();
    let mut chunk = vec![0u8; chunk_size as usize];
    let mut index = 0u64;
    loop {
        let read = read_up_to(&mut reader, &mut chunk)?;
        if read == 0 {
            break;
        }
        full.update(&chunk[..read]);
        let stored = crc_reader
            .read_u32::<BigEndian>()
            .map_err(CodecError::from_eof)?;
        let actual = crc32fast::hash(&chunk[..read]);
        if stored != actual {
            return Err(StorageError::Corruption(format!(
                "crc mismatch in chunk {index}"
            )));
        }
        index += 1;
    }
    if full.finalize() != expected {
        return Err(StorageError::Corruption("digest mismatch".into()));
    }
    Ok(())
}

/// Fills as much of `buf` as the source allows; 0 only at EOF.
fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

// =============================================================================
// Tests
// =============================================================================
