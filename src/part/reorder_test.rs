use super::*;

use std::fs;

use crate::{
    column::Values,
    part::{Config, MetaData},
};

fn tmpdir(name: &str) -> String {
    let dir = std::env::temp_dir().join(name);
    fs::remove_dir_all(&dir).ok();
    fs::create_dir_all(&dir).unwrap();
    dir.to_string_lossy().to_string()
}

fn setup(dir: &str, x: Vec<i32>, y: Vec<i32>) -> Partition {
    let os_dir = ffi::OsString::from(dir);
    let cx = Column::new("x", ColumnType::Int);
    let cy = Column::new("y", ColumnType::Int);
    let md = MetaData {
        name: "p".to_string(),
        n_rows: x.len(),
        columns: vec![cx.clone(), cy.clone()],
        ..MetaData::default()
    };
    Values::Int(x).write_file(&cx.data_file(&os_dir)).unwrap();
    Values::Int(y).write_file(&cy.data_file(&os_dir)).unwrap();
    md.write(&os_dir).unwrap();
    Partition::open(Config::new(dir, "p")).unwrap()
}

fn column_values(part: &Partition, name: &str) -> Vec<f64> {
    let col = part.to_column(name).unwrap();
    let vals = col.read_values(&part.to_active_dir()).unwrap();
    (0..vals.len()).map(|i| vals.get(i).unwrap()).collect()
}

#[test]
fn test_reorder_two_keys() {
    let dir = tmpdir("test_reorder_two_keys");
    let part = setup(&dir, vec![3, 1, 2, 1, 3], vec![10, 30, 20, 40, 50]);

    let n = part.reorder(&["x", "y"], &[true, false]).unwrap();
    assert_eq!(n, 5);

    assert_eq!(column_values(&part, "x"), vec![1.0, 1.0, 2.0, 3.0, 3.0]);
    assert_eq!(column_values(&part, "y"), vec![40.0, 30.0, 20.0, 50.0, 10.0]);

    // the first sort key is flagged sorted
    assert!(part.to_column("x").unwrap().is_sorted());
    assert!(!part.to_column("y").unwrap().is_sorted());

    // the reorder leaves a note in the description
    assert!(part.to_description().contains("reorder(x, y)"));
}

#[test]
fn test_reorder_lexicographic() {
    let dir = tmpdir("test_reorder_lexico");
    let part = setup(&dir, vec![2, 1, 2, 1], vec![9, 8, 3, 7]);

    part.reorder(&["x", "y"], &[true, true]).unwrap();
    let xs = column_values(&part, "x");
    let ys = column_values(&part, "y");

    // rows are in non-decreasing lexicographic (x, y) order
    for i in 1..xs.len() {
        assert!(
            (xs[i - 1], ys[i - 1]) <= (xs[i], ys[i]),
            "row {} out of order",
            i
        );
    }
    assert_eq!(xs, vec![1.0, 1.0, 2.0, 2.0]);
    assert_eq!(ys, vec![7.0, 8.0, 3.0, 9.0]);
}

#[test]
fn test_reorder_purges_inactive() {
    let dir = tmpdir("test_reorder_purge");
    let part = setup(&dir, vec![5, 4, 3, 2, 1], vec![1, 2, 3, 4, 5]);

    part.deactivate_rows(&[0, 4]).unwrap();
    part.reorder(&["x"], &[true]).unwrap();

    // inactive rows are gone before sorting
    assert_eq!(part.len(), 3);
    assert_eq!(column_values(&part, "x"), vec![2.0, 3.0, 4.0]);
    assert_eq!(column_values(&part, "y"), vec![4.0, 3.0, 2.0]);
}

#[test]
fn test_reorder_bad_keys() {
    let dir = tmpdir("test_reorder_bad_keys");
    let part = setup(&dir, vec![1, 2], vec![3, 4]);

    // no usable keys leaves the data untouched
    assert_eq!(part.reorder(&["nosuch"], &[true]).unwrap(), 0);
    assert_eq!(column_values(&part, "x"), vec![1.0, 2.0]);
}

#[test]
fn test_reorder_rids_follow() {
    let dir = tmpdir("test_reorder_rids");
    let part = setup(&dir, vec![2, 1], vec![7, 8]);
    part.fill_rids(9).unwrap();

    part.reorder(&["x"], &[true]).unwrap();
    let rids = part.to_rids().unwrap();
    assert_eq!(rids.as_rids(), &[crate::Rid::new(9, 1), crate::Rid::new(9, 0)]);
}
