//! Truncated, torn and tampered stores must surface as `Corrupt` or be repaired on append.

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use parampack::{
    Pack, PackConfig, PackError, Parameter, ParameterCollection, PopulateOptions, SaveOptions,
    Shape,
};
use tempfile::TempDir;

fn model(namespace: &str, len: usize) -> ParameterCollection {
    let mut model = ParameterCollection::new(namespace);
    model
        .insert(Parameter::from_values("w", &[len], (0..len).map(|v| v as f32).collect()).unwrap())
        .unwrap();
    model
        .insert(Parameter::from_values("b", &[2], vec![0.5, -0.5]).unwrap())
        .unwrap();
    model
}

fn chop(path: &Path, bytes: u64) {
    let file = OpenOptions::new().write(true).open(path).expect("open data");
    let len = file.metadata().expect("stat").len();
    file.set_len(len - bytes).expect("truncate");
}

#[test]
fn truncated_data_file_is_corrupt_not_partial() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.pack");
    let mut pack = Pack::new(&path).unwrap();
    pack.save(&model("/m", 64), &SaveOptions::default()).unwrap();

    chop(&path, 7);

    let mut target = ParameterCollection::new("/m");
    target
        .insert(Parameter::zeros("w", Shape::new(vec![64]).unwrap()))
        .unwrap();
    let err = pack
        .populate(&mut target, &PopulateOptions::default())
        .unwrap_err();
    assert!(matches!(err, PackError::Corrupt { .. }), "unexpected error: {err}");
    assert!(
        target.parameter("w").unwrap().values().iter().all(|v| *v == 0.0),
        "no values may be applied from a corrupt block"
    );
    assert!(target.parameter("b").is_none());
    assert!(matches!(pack.verify(), Err(PackError::Corrupt { .. })));
}

#[test]
fn appending_to_a_truncated_store_is_refused() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.pack");
    let mut pack = Pack::new(&path).unwrap();
    pack.save(&model("/m", 8), &SaveOptions::default()).unwrap();
    chop(&path, 1);

    let err = pack
        .save(&model("/n", 8), &SaveOptions::default())
        .unwrap_err();
    assert!(matches!(err, PackError::Corrupt { .. }));
    assert_eq!(pack.keys().unwrap().len(), 1);
}

#[test]
fn flipped_byte_fails_the_checksum() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.pack");
    let mut pack = Pack::new(&path).unwrap();
    pack.save(&model("/m", 16), &SaveOptions::default()).unwrap();

    {
        let mut file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
        file.seek(SeekFrom::Start(40)).unwrap();
        file.write_all(&[0xFF]).unwrap();
        file.sync_all().unwrap();
    }

    let mut target = ParameterCollection::new("/m");
    let err = pack
        .populate(&mut target, &PopulateOptions::default())
        .unwrap_err();
    assert!(matches!(err, PackError::Corrupt { .. }));
}

#[test]
fn checksum_failures_can_be_downgraded_to_warnings() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.pack");
    let config = PackConfig {
        verify_checksums: false,
        ..PackConfig::default()
    };
    let mut pack = Pack::with_config(&path, config).unwrap();
    pack.save(&model("/m", 16), &SaveOptions::default()).unwrap();

    // The last byte of the block is the tail of the final record's digest.
    {
        let mut file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
        file.seek(SeekFrom::End(-1)).unwrap();
        file.write_all(&[0x00]).unwrap();
    }
    let mut target = ParameterCollection::new("/m");
    pack.populate(&mut target, &PopulateOptions::default())
        .unwrap();
    assert_eq!(target, model("/m", 16));
}

#[test]
fn orphaned_record_is_unreachable_and_dropped_on_append() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.pack");
    let mut pack = Pack::new(&path).unwrap();
    let first = pack.save(&model("/m", 4), &SaveOptions::default()).unwrap();

    // A save that wrote its records but died before the index line.
    {
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[0xAB; 57]).unwrap();
    }
    let report = pack.verify().unwrap();
    assert_eq!(report.orphaned_bytes, 57);
    assert!(!report.is_clean());

    let mut reopened = Pack::new(&path).unwrap();
    assert_eq!(reopened.offset(), first.end());
    let second = reopened
        .save(&model("/n", 4), &SaveOptions::default())
        .unwrap();
    assert_eq!(second.offset, first.end());

    let report = reopened.verify().unwrap();
    assert!(report.is_clean());
    assert_eq!(report.keys.len(), 2);

    let mut target = ParameterCollection::new("/n");
    reopened
        .populate(&mut target, &PopulateOptions::default())
        .unwrap();
    assert_eq!(target, model("/n", 4));
}

#[test]
fn torn_index_line_is_ignored_then_replaced() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.pack");
    let index_path = dir.path().join("store.pack.meta");
    let mut pack = Pack::new(&path).unwrap();
    let first = pack.save(&model("/m", 4), &SaveOptions::default()).unwrap();

    {
        let mut index = OpenOptions::new().append(true).open(&index_path).unwrap();
        index.write_all(b"/half 999").unwrap();
    }

    let mut reopened = Pack::new(&path).unwrap();
    assert_eq!(reopened.offset(), first.end());
    let keys = reopened.keys().unwrap();
    assert_eq!(keys, vec![first.clone()]);

    reopened
        .save(&model("/half", 4), &SaveOptions::default())
        .unwrap();
    let text = std::fs::read_to_string(&index_path).unwrap();
    assert_eq!(text.lines().count(), 2);
    assert!(text.ends_with('\n'));
    assert!(!text.contains("999"));
}

#[test]
fn missing_data_file_is_corrupt() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.pack");
    let mut pack = Pack::new(&path).unwrap();
    pack.save(&model("/m", 4), &SaveOptions::default()).unwrap();
    std::fs::remove_file(&path).unwrap();

    let mut target = ParameterCollection::new("/m");
    let err = pack
        .populate(&mut target, &PopulateOptions::default())
        .unwrap_err();
    assert!(matches!(err, PackError::Corrupt { .. }));
}

#[test]
fn malformed_index_is_corrupt() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.pack");
    std::fs::write(dir.path().join("store.pack.meta"), "/m not-a-number 10\n").unwrap();
    let err = Pack::new(&path).unwrap_err();
    assert!(matches!(err, PackError::Corrupt { .. }));
}

fn long_named_model(namespace: &str) -> ParameterCollection {
    let mut model = ParameterCollection::new(namespace);
    model
        .insert(Parameter::from_values("ok", &[3], vec![1.0, 2.0, 3.0]).unwrap())
        .unwrap();
    model
        .insert(Parameter::zeros("x".repeat(70_000), Shape::new(vec![2]).unwrap()))
        .unwrap();
    model
}

#[test]
fn failed_block_is_cut_back_and_leaves_the_index_alone() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.pack");
    let mut pack = Pack::new(&path).unwrap();
    let first = pack.save(&model("/m", 8), &SaveOptions::default()).unwrap();
    let start = pack.offset();
    let index_before = std::fs::read(dir.path().join("store.pack.meta")).unwrap();

    let err = pack
        .save(&long_named_model("/n"), &SaveOptions::default())
        .unwrap_err();
    assert!(matches!(err, PackError::InvalidShape { .. }), "unexpected error: {err}");

    assert_eq!(pack.offset(), start);
    assert_eq!(std::fs::metadata(&path).unwrap().len(), start);
    assert_eq!(
        std::fs::read(dir.path().join("store.pack.meta")).unwrap(),
        index_before
    );
    assert_eq!(pack.keys().unwrap(), vec![first]);

    let next = pack.save(&model("/n", 8), &SaveOptions::default()).unwrap();
    assert_eq!(next.offset, start);
    assert!(pack.verify().unwrap().is_clean());
}

#[test]
fn failed_replacement_keeps_the_old_store() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.pack");
    let mut pack = Pack::new(&path).unwrap();
    let old = pack.save(&model("/old", 8), &SaveOptions::default()).unwrap();
    let data_len = std::fs::metadata(&path).unwrap().len();

    let err = pack
        .save(&long_named_model("/new"), &SaveOptions::default().append(false))
        .unwrap_err();
    assert!(matches!(err, PackError::InvalidShape { .. }), "unexpected error: {err}");

    assert_eq!(pack.keys().unwrap(), vec![old.clone()]);
    assert_eq!(pack.offset(), old.end());
    assert_eq!(std::fs::metadata(&path).unwrap().len(), data_len);
    assert!(!dir.path().join("store.pack.tmp").exists());
    assert!(!dir.path().join("store.pack.meta.tmp").exists());

    let mut restored = ParameterCollection::new("/old");
    pack.populate(&mut restored, &PopulateOptions::default())
        .unwrap();
    assert_eq!(restored, model("/old", 8));
}

#[test]
fn records_over_the_size_limit_are_never_written() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.pack");
    let config = PackConfig {
        max_record_bytes: 128,
        ..PackConfig::default()
    };
    let mut pack = Pack::with_config(&path, config).unwrap();

    let big = Parameter::zeros("big", Shape::new(vec![64]).unwrap());
    let err = pack.save(&big, &SaveOptions::default()).unwrap_err();
    assert!(matches!(err, PackError::RecordTooLarge { limit: 128, .. }));
    assert!(pack.keys().unwrap().is_empty());
    assert_eq!(pack.offset(), 0);

    let small = Parameter::from_values("small", &[8], vec![0.25; 8]).unwrap();
    pack.save(&small, &SaveOptions::default()).unwrap();
    let mut loaded = Parameter::zeros("small", Shape::new(vec![8]).unwrap());
    pack.populate(&mut loaded, &PopulateOptions::default())
        .unwrap();
    assert_eq!(loaded, small);
}
