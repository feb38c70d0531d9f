use super::*;

use std::fs;

use crate::column::Values;

fn tmpdir(name: &str) -> String {
    let dir = std::env::temp_dir().join(name);
    fs::remove_dir_all(&dir).ok();
    fs::create_dir_all(&dir).unwrap();
    dir.to_string_lossy().to_string()
}

fn setup(name: &str, x: Vec<i32>) -> Partition {
    let dir = tmpdir(name);
    let os_dir = ffi::OsString::from(dir.clone());
    let cx = Column::new("x", ColumnType::Int);
    let md = MetaData {
        name: "p".to_string(),
        n_rows: x.len(),
        columns: vec![cx.clone()],
        ..MetaData::default()
    };
    Values::Int(x).write_file(&cx.data_file(&os_dir)).unwrap();
    md.write(&os_dir).unwrap();
    Partition::open(Config::new(&dir, "p")).unwrap()
}

#[test]
fn test_config() {
    let mut config = Config::new("/data/p", "p");
    assert!(config.backup_dir.is_none());
    assert!(!config.read_only);
    config.set_backup_dir("/data/p.bak").set_read_only(true).set_buffer_size(4096);
    assert_eq!(config.backup_dir.as_deref(), Some("/data/p.bak"));
    assert!(config.read_only);
    assert_eq!(config.buffer_size, 4096);

    // configurations load from toml
    let dir = tmpdir("test_part_config");
    let loc = std::path::Path::new(&dir).join("part.toml");
    fs::write(&loc, "name = \"p\"\ndir = \"/data/p\"\nread_only = true\n").unwrap();
    let config = Config::from_file(&loc).unwrap();
    assert_eq!(config.name, "p");
    assert!(config.read_only);
    assert_eq!(config.buffer_size, BUFFER_SIZE);
}

#[test]
fn test_open_partition() {
    let part = setup("test_part_open", vec![1, 2, 3]);
    assert_eq!(part.to_name(), "p");
    assert_eq!(part.len(), 3);
    assert!(!part.is_empty());
    assert_eq!(part.n_columns(), 1);
    assert_eq!(part.to_state(), TableState::Stable);
    assert_eq!(part.to_mask().cnt(), 3);
    assert!(part.to_rids().is_none());
    assert!(part.to_column("X").is_some());
    assert!(part.to_column("zz").is_none());

    // scanning an empty directory yields an empty partition
    let dir = tmpdir("test_part_open_empty");
    let part = Partition::open(Config::new(&dir, "empty")).unwrap();
    assert!(part.is_empty());
    assert_eq!(part.n_columns(), 0);
}

#[test]
fn test_deactivate_reactivate() {
    let part = setup("test_part_masks", vec![1, 2, 3, 4, 5]);

    let inactive = part.deactivate_rows(&[1, 3]).unwrap();
    assert_eq!(inactive, 2);
    assert_eq!(part.to_mask().to_rows(), vec![0, 2, 4]);

    // the mask persists
    let loc = util::file_path(&part.to_active_dir(), MASK_FILE);
    assert!(util::file_size(&loc).unwrap() > 0);

    // deactivate followed by reactivate restores the original mask
    let active = part.reactivate_rows(&[1, 3]).unwrap();
    assert_eq!(active, 5);
    assert_eq!(part.to_mask().cnt(), 5);
    // and a full mask removes the file
    assert_eq!(util::file_size(&loc).unwrap(), 0);
}

#[test]
fn test_deactivate_where() {
    let part = setup("test_part_masks_where", vec![1, 2, 3, 4, 5]);

    part.deactivate_where("x > 3").unwrap();
    assert_eq!(part.to_mask().to_rows(), vec![0, 1, 2]);
    part.reactivate_where("x > 3").unwrap();
    assert_eq!(part.to_mask().cnt(), 5);
}

#[test]
fn test_purge_inactive() {
    let part = setup("test_part_purge", vec![10, 20, 30, 40, 50]);

    part.deactivate_rows(&[0, 2]).unwrap();
    let n = part.purge_inactive().unwrap();
    assert_eq!(n, 3);
    assert_eq!(part.len(), 3);
    assert_eq!(part.to_mask().cnt(), 3);

    let col = part.to_column("x").unwrap();
    let vals = col.read_values(&part.to_active_dir()).unwrap();
    assert_eq!(
        (0..3).map(|i| vals.get(i).unwrap()).collect::<Vec<f64>>(),
        vec![20.0, 40.0, 50.0]
    );

    // purging with a full mask is a no-op
    assert_eq!(part.purge_inactive().unwrap(), 3);
}

#[test]
fn test_add_column() {
    use crate::qexpr::{MathOp, MathTerm};

    let part = setup("test_part_add_column", vec![1, 2, 3]);

    let term = MathTerm::Op(
        MathOp::Mul,
        Box::new(MathTerm::var("x")),
        Box::new(MathTerm::num(10.0)),
    );
    let n = part.add_column(&term, "x10", ColumnType::Long).unwrap();
    assert_eq!(n, 3);
    assert_eq!(part.n_columns(), 2);

    let col = part.to_column("x10").unwrap();
    assert_eq!(col.to_type(), ColumnType::Long);
    let vals = col.read_values(&part.to_active_dir()).unwrap();
    assert_eq!(
        (0..3).map(|i| vals.get(i).unwrap()).collect::<Vec<f64>>(),
        vec![10.0, 20.0, 30.0]
    );

    // the new column takes part in queries
    assert_eq!(part.count_hits("x10 >= 20").unwrap(), 2);

    // duplicate names are rejected
    assert!(part.add_column(&term, "x10", ColumnType::Long).is_err());

    // the column survives a reload of the metadata
    let back = Partition::open(part.as_config().clone()).unwrap();
    assert_eq!(back.n_columns(), 2);
}

#[test]
fn test_fill_rids() {
    let part = setup("test_part_fill_rids", vec![1, 2]);
    assert!(part.to_rids().is_none());
    part.fill_rids(3).unwrap();
    let rids = part.to_rids().unwrap();
    assert_eq!(rids.len(), 2);
    assert_eq!(rids.as_rids()[1], crate::Rid::new(3, 1));
}

#[test]
fn test_shape() {
    let dir = tmpdir("test_part_shape");
    let os_dir = ffi::OsString::from(dir.clone());
    let md = MetaData {
        name: "p".to_string(),
        n_rows: 0,
        metatags: Some("owner = hep, shape = 2x3x4".to_string()),
        ..MetaData::default()
    };
    md.write(&os_dir).unwrap();

    let part = Partition::open(Config::new(&dir, "p")).unwrap();
    assert_eq!(part.to_shape(), Some(vec![2, 3, 4]));
}

#[test]
fn test_schema_view() {
    use crate::query::Schema;

    let part = setup("test_part_schema", vec![5, 1, 9]);
    assert_eq!(part.column_type("x"), Some(ColumnType::Int));
    assert_eq!(part.column_type("zz"), None);
    // bounds computed on demand from the data
    assert_eq!(part.column_bounds("x"), Some((1.0, 9.0)));
    assert_eq!(part.column_names(), vec!["x".to_string()]);
}

#[test]
fn test_lock_stats() {
    let part = setup("test_part_lock_stats", vec![1]);
    let stats = part.to_lock_stats().unwrap();
    println!("lock stats {}", stats);
}
