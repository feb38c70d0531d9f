use super::*;

use crate::qexpr::CompOp;

use std::fs;

fn tmpdir(name: &str) -> ffi::OsString {
    let dir = std::env::temp_dir().join(name);
    fs::remove_dir_all(&dir).ok();
    fs::create_dir_all(&dir).unwrap();
    dir.into_os_string()
}

#[test]
fn test_key_index_build() {
    let index = KeyIndex::build(&[1, 1, 2, 0, 2, 1]);
    assert_eq!(index.len(), 6);

    assert_eq!(index.get_bitvector(1).unwrap().to_rows(), vec![0, 1, 5]);
    assert_eq!(index.get_bitvector(2).unwrap().to_rows(), vec![2, 4]);
    assert_eq!(index.get_bitvector(0).unwrap().to_rows(), vec![3]);
    assert!(index.get_bitvector(9).is_none());
}

#[test]
fn test_key_index_single_key() {
    // one distinct key degenerates to one bit per row
    let index = KeyIndex::build(&[1, 1, 1, 1]);
    let bv = index.get_bitvector(1).unwrap();
    assert_eq!(bv.cnt(), 4);
    assert_eq!(bv.size(), 4);
}

#[test]
fn test_key_index_evaluate() {
    let index = KeyIndex::build(&[1, 1, 2, 0, 2, 1]);

    let range = ContinuousRange::one_sided("c", CompOp::Ge, 2.0);
    assert_eq!(index.evaluate(&range).unwrap().to_rows(), vec![2, 4]);
    assert_eq!(index.estimate(&range), 2.0);

    let range = DiscreteRange::new("c", vec![0.0, 1.0]);
    assert_eq!(
        index.evaluate_discrete(&range).unwrap().to_rows(),
        vec![0, 1, 3, 5]
    );
}

#[test]
fn test_key_index_append() {
    let mut index = KeyIndex::build(&[1, 2]);
    index.append(&Values::UInt(vec![2, 3])).unwrap();
    assert_eq!(index.len(), 4);
    assert_eq!(index.get_bitvector(2).unwrap().to_rows(), vec![1, 2]);
    assert_eq!(index.get_bitvector(3).unwrap().to_rows(), vec![3]);
}

#[test]
fn test_index_file_roundtrip() {
    let dir = tmpdir("test_index_file_roundtrip");
    let loc = util::file_path(&dir, "cat.idx");

    let index = KeyIndex::build(&[1, 2, 1, 3]);
    write_index(&loc, &index).unwrap();

    let val = KeyIndex::read_file(&loc).unwrap();
    assert_eq!(val.len(), 4);
    assert_eq!(val.get_bitvector(1).unwrap().to_rows(), vec![0, 2]);
    assert_eq!(val.get_bitvector(3).unwrap().to_rows(), vec![3]);
}

#[test]
fn test_index_file_corrupt() {
    let dir = tmpdir("test_index_file_corrupt");
    let loc = util::file_path(&dir, "cat.idx");

    let index = KeyIndex::build(&[1, 2]);
    write_index(&loc, &index).unwrap();

    // flip some payload bytes
    let mut data = fs::read(&loc).unwrap();
    let n = data.len();
    data[n - 1] ^= 0xFF;
    data[n - 2] ^= 0xFF;
    fs::write(&loc, &data).unwrap();

    assert!(KeyIndex::read_file(&loc).is_err());
}

#[test]
fn test_no_index() {
    let mut index = NoIndex::new(10);
    assert_eq!(index.len(), 10);
    let range = ContinuousRange::one_sided("c", CompOp::Lt, 5.0);
    assert_eq!(index.estimate(&range), 10.0);
    assert!(index.evaluate(&range).is_err());
    index.append(&Values::Int(vec![1, 2])).unwrap();
    assert_eq!(index.len(), 12);
}
