use super::*;

use std::fs;

use crate::{
    column::Values,
    part::{Config, META_FILE},
};

fn tmpdir(name: &str) -> String {
    let dir = std::env::temp_dir().join(name);
    fs::remove_dir_all(&dir).ok();
    fs::create_dir_all(&dir).unwrap();
    dir.to_string_lossy().to_string()
}

// lay out a directory holding one INT column `a` with the given values
fn write_slice(dir: &str, vals: Vec<i32>) {
    let dir = ffi::OsString::from(dir);
    let col = Column::new("a", ColumnType::Int);
    let md = MetaData {
        name: "slice".to_string(),
        n_rows: vals.len(),
        columns: vec![col.clone()],
        ..MetaData::default()
    };
    Values::Int(vals).write_file(&col.data_file(&dir)).unwrap();
    md.write(&dir).unwrap();
}

fn read_column(part: &Partition, name: &str) -> Vec<f64> {
    let col = part.to_column(name).unwrap();
    let vals = col.read_values(&part.to_active_dir()).unwrap();
    (0..vals.len()).map(|i| vals.get(i).unwrap()).collect()
}

#[test]
fn test_append_two_dirs() {
    let active = tmpdir("test_append_two_active");
    let backup = tmpdir("test_append_two_backup");
    let src = tmpdir("test_append_two_src");

    write_slice(&active, (0..100).collect());
    write_slice(&src, (0..10).collect());

    let mut config = Config::new(&active, "p");
    config.set_backup_dir(&backup);
    let part = Partition::open(config).unwrap();
    assert_eq!(part.len(), 100);
    assert_eq!(part.to_state(), TableState::Stable);

    let n = part.append(&ffi::OsString::from(src)).unwrap();
    assert_eq!(n, 10);
    assert_eq!(part.len(), 110);
    assert_eq!(part.to_state(), TableState::Transition);
    assert_eq!(part.to_mask().size(), 110);
    assert_eq!(part.to_mask().cnt(), 110);

    let vals = read_column(&part, "a");
    assert_eq!(vals.len(), 110);
    assert_eq!(vals[99], 99.0);
    assert_eq!(vals[100], 0.0);
    assert_eq!(vals[109], 9.0);
}

#[test]
fn test_append_rollback() {
    let active = tmpdir("test_rollback_active");
    let backup = tmpdir("test_rollback_backup");
    let src = tmpdir("test_rollback_src");

    write_slice(&active, (0..100).collect());
    write_slice(&src, (0..10).collect());

    let mut config = Config::new(&active, "p");
    config.set_backup_dir(&backup);
    let part = Partition::open(config).unwrap();

    part.append(&ffi::OsString::from(src)).unwrap();
    assert_eq!(part.len(), 110);

    part.rollback().unwrap();
    assert_eq!(part.len(), 100);
    assert_eq!(part.to_state(), TableState::Stable);
    assert_eq!(part.to_mask().size(), 100);

    let vals = read_column(&part, "a");
    assert_eq!(vals.len(), 100);
    assert_eq!(vals[99], 99.0);

    // both directories hold the same image again
    let a = part.to_active_dir();
    let b = part.to_backup_dir().unwrap();
    assert!(util::dirs_identical(&a, &b, &[]).unwrap());
}

#[test]
fn test_append_commit() {
    let active = tmpdir("test_commit_active");
    let backup = tmpdir("test_commit_backup");
    let src = tmpdir("test_commit_src");

    write_slice(&active, (0..50).collect());
    write_slice(&src, (100..120).collect());

    let mut config = Config::new(&active, "p");
    config.set_backup_dir(&backup);
    let part = Partition::open(config).unwrap();

    part.append(&ffi::OsString::from(src.clone())).unwrap();
    let n = part.commit(&ffi::OsString::from(src)).unwrap();
    assert_eq!(n, 20);
    assert_eq!(part.len(), 70);
    assert_eq!(part.to_state(), TableState::Stable);

    // column files in both directories are byte identical
    let a = part.to_active_dir();
    let b = part.to_backup_dir().unwrap();
    assert!(util::dirs_identical(&a, &b, &[META_FILE]).unwrap());

    let vals = read_column(&part, "a");
    assert_eq!(vals[49], 49.0);
    assert_eq!(vals[50], 100.0);
    assert_eq!(vals[69], 119.0);
}

#[test]
fn test_commit_from_receiving() {
    let active = tmpdir("test_commit_recv_active");
    let backup = tmpdir("test_commit_recv_backup");
    let src = tmpdir("test_commit_recv_src");

    write_slice(&active, (0..5).collect());
    write_slice(&src, (5..8).collect());

    let mut config = Config::new(&active, "p");
    config.set_backup_dir(&backup);
    let part = Partition::open(config).unwrap();

    // commit straight from stable performs nothing
    assert_eq!(part.commit(&ffi::OsString::from(src.clone())).unwrap(), 0);

    part.append(&ffi::OsString::from(src.clone())).unwrap();
    part.commit(&ffi::OsString::from(src)).unwrap();
    assert_eq!(part.len(), 8);
}

#[test]
fn test_append_empty_partition() {
    let active = tmpdir("test_append_zero_active");
    let backup = tmpdir("test_append_zero_backup");
    let src = tmpdir("test_append_zero_src");

    write_slice(&src, vec![1, 2, 3]);

    let mut config = Config::new(&active, "p");
    config.set_backup_dir(&backup);
    let part = Partition::open(config).unwrap();
    assert_eq!(part.len(), 0);

    // appending to an empty partition behaves as the initial load
    let n = part.append(&ffi::OsString::from(src)).unwrap();
    assert_eq!(n, 3);
    assert_eq!(part.len(), 3);
    assert_eq!(read_column(&part, "a"), vec![1.0, 2.0, 3.0]);
}

#[test]
fn test_append_single_dir() {
    let active = tmpdir("test_append_single_active");
    let src = tmpdir("test_append_single_src");

    write_slice(&active, vec![1, 2]);
    write_slice(&src, vec![3]);

    let part = Partition::open(Config::new(&active, "p")).unwrap();
    let n = part.append(&ffi::OsString::from(src)).unwrap();
    assert_eq!(n, 1);
    assert_eq!(part.len(), 3);
    assert_eq!(part.to_state(), TableState::Stable);
    assert_eq!(read_column(&part, "a"), vec![1.0, 2.0, 3.0]);
}

#[test]
fn test_append_wrong_state_is_noop() {
    let active = tmpdir("test_append_state_active");
    let backup = tmpdir("test_append_state_backup");
    let src = tmpdir("test_append_state_src");

    write_slice(&active, vec![1, 2]);
    write_slice(&src, vec![3]);

    let mut config = Config::new(&active, "p");
    config.set_backup_dir(&backup);
    let part = Partition::open(config).unwrap();

    part.append(&ffi::OsString::from(src.clone())).unwrap();
    assert_eq!(part.to_state(), TableState::Transition);

    // a second append without commit or rollback is refused
    assert_eq!(part.append(&ffi::OsString::from(src)).unwrap(), 0);
    assert_eq!(part.len(), 3);
}

#[test]
fn test_append_read_only() {
    let active = tmpdir("test_append_ro_active");
    write_slice(&active, vec![1]);

    let mut config = Config::new(&active, "p");
    config.set_read_only(true);
    let part = Partition::open(config).unwrap();
    assert!(part.append(&ffi::OsString::from(active)).is_err());
}
