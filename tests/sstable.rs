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

//! End-to-end write/read scenarios over real component files.

use cairndb_storage::error::StorageError;
use cairndb_storage::options::StorageOptions;
use cairndb_storage::sstable::{
    atoms, checksum, Atom, ClusteringCodec, ClusteringPrefix, ClusteringSchema, ClusteringType,
    Component, DecoratedKey, DeletionTime, IndexedEntry, RangeTombstoneMarker, RowIndexEntry,
    SSTableHandle, SSTableWriter, MESSAGING_CURRENT,
};
use tempfile::tempdir;

fn schema() -> ClusteringSchema {
    ClusteringSchema::new(vec![ClusteringType::Int64], false)
}

fn codec() -> ClusteringCodec {
    ClusteringCodec::new(MESSAGING_CURRENT, &schema())
}

fn row(n: i64, body_len: usize) -> Atom {
    Atom::row(
        ClusteringPrefix::row(vec![n.to_be_bytes().to_vec()]),
        vec![n as u8; body_len],
    )
}

fn writer(dir: &std::path::Path, options: StorageOptions) -> SSTableWriter {
    SSTableWriter::new(dir, "events", 1, 32, schema(), options).unwrap()
}

fn indexed(entry: &RowIndexEntry) -> &IndexedEntry {
    match entry {
        RowIndexEntry::Indexed(e) => e,
        RowIndexEntry::Bare { .. } => panic!("expected an indexed entry"),
    }
}

/// Parses one partition frame starting at `position`, returning the key,
/// the partition deletion, the decoded atoms and the byte length of the
/// atoms region.
fn parse_partition(handle: &SSTableHandle, position: u64) -> (Vec<u8>, DeletionTime, Vec<Atom>, u64) {
    let bytes = handle.data.read_from(position).unwrap();
    let mut src = bytes.as_slice();

    let key_len = u16::from_be_bytes([src[0], src[1]]) as usize;
    let key = src[2..2 + key_len].to_vec();
    src = &src[2 + key_len..];
    let deletion = DeletionTime::deserialize(&mut src).unwrap();

    let atoms_start = bytes.len() - src.len();
    let codec = codec();
    let mut parsed = Vec::new();
    while let Some(atom) = atoms::read_atom(&mut src, &codec).unwrap() {
        parsed.push(atom);
    }
    // the sentinel byte is not part of the atoms region
    let atoms_region = (bytes.len() - src.len() - atoms_start - 1) as u64;
    (key, deletion, parsed, atoms_region)
}

#[test]
fn empty_partition_writes_frame_and_bare_entry() {
    let dir = tempdir().unwrap();
    let mut w = writer(dir.path(), StorageOptions::default());

    let entry = w
        .append(
            &DecoratedKey::new(b"k".to_vec()),
            DeletionTime::new(0, 0),
            None,
            std::iter::empty(),
        )
        .unwrap()
        .unwrap();
    assert_eq!(entry, RowIndexEntry::bare(0));

    let handle = w.close().unwrap();
    let frame = handle.data.read_from(0).unwrap();
    let mut expected = vec![0x00, 0x01, b'k'];
    expected.extend_from_slice(&[0u8; 12]);
    expected.push(0x01);
    assert_eq!(frame, expected);

    let (key, deletion, parsed, region) = parse_partition(&handle, 0);
    assert_eq!(key, b"k");
    assert_eq!(deletion, DeletionTime::new(0, 0));
    assert!(parsed.is_empty());
    assert_eq!(region, 0);
}

#[test]
fn single_small_row_elides_the_index() {
    let dir = tempdir().unwrap();
    let options = StorageOptions {
        column_index_size: 65_536,
        ..StorageOptions::default()
    };
    let mut w = writer(dir.path(), options);

    let entry = w
        .append(
            &DecoratedKey::new(b"k".to_vec()),
            DeletionTime::LIVE,
            None,
            vec![row(1, 30)],
        )
        .unwrap()
        .unwrap();
    assert!(!entry.is_indexed());
    assert_eq!(entry.columns_count(), 0);

    let handle = w.close().unwrap();
    let records = handle.read_primary_index().unwrap();
    assert_eq!(records.len(), 1);
    assert!(!records[0].1.is_indexed());
}

#[test]
fn multi_block_partition_covers_the_atoms_region() {
    let dir = tempdir().unwrap();
    let options = StorageOptions {
        column_index_size: 64,
        ..StorageOptions::default()
    };
    let mut w = writer(dir.path(), options);

    let atoms: Vec<Atom> = (0..10).map(|i| row(i, 20)).collect();
    w.append(
        &DecoratedKey::new(b"p".to_vec()),
        DeletionTime::LIVE,
        None,
        atoms.clone(),
    )
    .unwrap()
    .unwrap();
    let handle = w.close().unwrap();

    let records = handle.read_primary_index().unwrap();
    let entry = indexed(&records[0].1);
    assert!(entry.columns_count() >= 2);

    let (_, _, parsed, atoms_region) = parse_partition(&handle, entry.position());
    assert_eq!(parsed, atoms);

    let n = entry.columns_count();
    let mut expected_offset = 0;
    for i in 0..n {
        let info = entry.index_info(i).unwrap();
        assert_eq!(info.offset, expected_offset);
        if i + 1 < n {
            assert!(info.width >= 64);
        }
        expected_offset += info.width;
    }
    assert_eq!(expected_offset, atoms_region);
}

#[test]
fn open_marker_is_carried_across_block_boundaries() {
    let dir = tempdir().unwrap();
    let options = StorageOptions {
        column_index_size: 1, // one block per atom
        ..StorageOptions::default()
    };
    let mut w = writer(dir.path(), options);

    let deletion = DeletionTime::new(44, 4_400);
    let start = ClusteringPrefix::inclusive_start(vec![10i64.to_be_bytes().to_vec()]);
    let end = ClusteringPrefix::inclusive_end(vec![30i64.to_be_bytes().to_vec()]);
    let atoms = vec![
        Atom::Marker(RangeTombstoneMarker::open(start, deletion)), // block 0
        row(20, 8),                                                // block 1
        Atom::Marker(RangeTombstoneMarker::close(end, deletion)),  // block 2
        row(40, 8),                                                // block 3
    ];
    w.append(&DecoratedKey::new(b"p".to_vec()), DeletionTime::LIVE, None, atoms)
        .unwrap()
        .unwrap();
    let handle = w.close().unwrap();

    let records = handle.read_primary_index().unwrap();
    let entry = indexed(&records[0].1);
    assert_eq!(entry.columns_count(), 4);
    let markers: Vec<Option<DeletionTime>> = (0..4)
        .map(|i| entry.index_info(i).unwrap().end_open_marker)
        .collect();
    assert_eq!(markers, vec![Some(deletion), Some(deletion), None, None]);

    // the marker deletions surface in the statistics
    assert_eq!(handle.stats.min_timestamp, 4_400);
    assert_eq!(handle.stats.max_local_deletion_time, 44);
}

#[test]
fn out_of_order_append_fails_and_leaves_files_at_their_marks() {
    let dir = tempdir().unwrap();
    let mut w = writer(dir.path(), StorageOptions::default());
    w.append(
        &DecoratedKey::new(b"b".to_vec()),
        DeletionTime::LIVE,
        None,
        vec![row(1, 8)],
    )
    .unwrap();
    let pointer = w.file_pointer();

    let err = w
        .append(
            &DecoratedKey::new(b"a".to_vec()),
            DeletionTime::LIVE,
            None,
            vec![row(1, 8)],
        )
        .unwrap_err();
    assert!(matches!(err, StorageError::OrderViolation { .. }));
    assert_eq!(w.file_pointer(), pointer);

    // the writer is still usable for keys in order
    w.append(
        &DecoratedKey::new(b"c".to_vec()),
        DeletionTime::LIVE,
        None,
        vec![row(1, 8)],
    )
    .unwrap();
    let handle = w.close().unwrap();
    let keys: Vec<Vec<u8>> = handle
        .read_primary_index()
        .unwrap()
        .into_iter()
        .map(|(k, _)| k)
        .collect();
    assert_eq!(keys, vec![b"b".to_vec(), b"c".to_vec()]);
}

#[test]
fn reverse_seek_lands_in_the_last_block() {
    let dir = tempdir().unwrap();
    let options = StorageOptions {
        column_index_size: 1,
        ..StorageOptions::default()
    };
    let mut w = writer(dir.path(), options);

    // three single-atom blocks bounded at 0, 10, 20
    let atoms = vec![row(0, 8), row(10, 8), row(20, 8)];
    w.append(&DecoratedKey::new(b"p".to_vec()), DeletionTime::LIVE, None, atoms)
        .unwrap()
        .unwrap();
    let handle = w.close().unwrap();

    let records = handle.read_primary_index().unwrap();
    let entry = indexed(&records[0].1);
    let cmp = schema().comparator();
    let name = |n: i64| ClusteringPrefix::row(vec![n.to_be_bytes().to_vec()]);

    assert_eq!(entry.index_of(&name(22), &cmp, true, 2).unwrap(), 2);
    assert_eq!(entry.index_of(&name(15), &cmp, true, 2).unwrap(), 1);
    assert_eq!(entry.index_of(&name(-5), &cmp, true, 2).unwrap(), -1);
    assert_eq!(entry.index_of(&name(15), &cmp, false, 0).unwrap(), 2);
    assert_eq!(entry.index_of(&name(999), &cmp, false, 0).unwrap(), 2);
}

#[test]
fn committed_components_pass_integrity_checks() {
    let dir = tempdir().unwrap();
    let mut w = writer(dir.path(), StorageOptions::default());
    for i in 0..50u8 {
        w.append(
            &DecoratedKey::new(vec![b'k', i]),
            DeletionTime::LIVE,
            None,
            vec![row(i as i64, 40), row(i as i64 + 1, 40)],
        )
        .unwrap();
    }
    let handle = w.close().unwrap();

    checksum::verify_integrity(
        &handle.descriptor.filename_for(Component::Data),
        &handle.descriptor.filename_for(Component::Digest),
        &handle.descriptor.filename_for(Component::Crc),
    )
    .unwrap();

    // every appended key is claimed by the filter and indexed
    let records = handle.read_primary_index().unwrap();
    assert_eq!(records.len(), 50);
    for (key, entry) in &records {
        assert!(handle.may_contain(key));
        let (frame_key, _, _, _) = parse_partition(&handle, entry.position());
        assert_eq!(&frame_key, key);
    }

    // summary samples resolve to real index offsets
    assert!(!handle.summary.is_empty());
    let offset = handle.summary.floor_offset(&records[0].0).unwrap();
    assert_eq!(offset, 0);

    assert_eq!(handle.stats.partition_count, 50);
    assert_eq!(handle.stats.atom_count, 100);
}

#[test]
fn static_rows_are_framed_between_deletion_and_atoms() {
    let dir = tempdir().unwrap();
    let schema = ClusteringSchema::new(vec![ClusteringType::Int64], true);
    let mut w = SSTableWriter::new(dir.path(), "events", 2, 8, schema, StorageOptions::default())
        .unwrap();

    let static_row = cairndb_storage::sstable::StaticRow {
        body: b"static-cells".to_vec(),
    };
    w.append(
        &DecoratedKey::new(b"k".to_vec()),
        DeletionTime::LIVE,
        Some(&static_row),
        vec![row(1, 8)],
    )
    .unwrap()
    .unwrap();
    let handle = w.close().unwrap();

    let bytes = handle.data.read_from(0).unwrap();
    // key_len(2) + key(1) + deletion(12), then the static row
    let mut src = &bytes[15..];
    let decoded = atoms::read_static_row(&mut src).unwrap();
    assert_eq!(decoded, static_row);
    // the atom stream follows
    let atom = atoms::read_atom(&mut src, &codec()).unwrap();
    assert!(atom.is_some());
}
