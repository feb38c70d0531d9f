use super::*;

use std::{ffi, fs};

use crate::{
    column::{text, Values},
    part::{Config, MetaData},
    qexpr::MathTerm,
    query::SelectClause,
    Column,
};

fn tmpdir(name: &str) -> String {
    let dir = std::env::temp_dir().join(name);
    fs::remove_dir_all(&dir).ok();
    fs::create_dir_all(&dir).unwrap();
    dir.to_string_lossy().to_string()
}

// partition with x, y numeric columns and s category
fn setup(name: &str) -> Partition {
    let dir = tmpdir(name);
    let os_dir = ffi::OsString::from(dir.clone());

    let cx = Column::new("x", ColumnType::Int);
    let cy = Column::new("y", ColumnType::Double);
    let cs = Column::new("s", ColumnType::Category);
    let ct = Column::new("t", ColumnType::Text);
    let md = MetaData {
        name: "p".to_string(),
        n_rows: 5,
        columns: vec![cx.clone(), cy.clone(), cs.clone(), ct.clone()],
        ..MetaData::default()
    };
    Values::Int(vec![3, 1, 2, 1, 3]).write_file(&cx.data_file(&os_dir)).unwrap();
    Values::Double(vec![10.0, 30.0, 20.0, 40.0, 50.0])
        .write_file(&cy.data_file(&os_dir))
        .unwrap();
    let mut fd = crate::util::create_file_a(&cs.data_file(&os_dir)).unwrap();
    crate::util::sync_write(&mut fd, b"red\0green\0red\0blue\0green\0").unwrap();
    let mut fd = crate::util::create_file_a(&ct.data_file(&os_dir)).unwrap();
    crate::util::sync_write(&mut fd, b"aa\0bb\0cc\0dd\0ee\0").unwrap();
    let mut buf = vec![];
    text::start_positions(&ct, &os_dir, 5, &mut buf).unwrap();
    md.write(&os_dir).unwrap();

    Partition::open(Config::new(&dir, "p")).unwrap()
}

#[test]
fn test_count_hits_ranges() {
    let part = setup("test_eval_ranges");

    assert_eq!(part.count_hits("x == 1").unwrap(), 2);
    assert_eq!(part.count_hits("x > 1").unwrap(), 3);
    assert_eq!(part.count_hits("x > 1 and y < 25").unwrap(), 2);
    assert_eq!(part.count_hits("1 < x <= 3").unwrap(), 3);
    assert_eq!(part.count_hits("x in (2, 3)").unwrap(), 3);
    assert_eq!(part.count_hits("x > 5").unwrap(), 0);
}

#[test]
fn test_count_hits_logical() {
    let part = setup("test_eval_logical");

    assert_eq!(part.count_hits("x == 1 or y > 45").unwrap(), 3);
    assert_eq!(part.count_hits("not x == 1").unwrap(), 3);
    assert_eq!(part.count_hits("(x > 1) - (y < 25)").unwrap(), 1);
    assert_eq!(part.count_hits("x == 1 xor y == 30").unwrap(), 1);
}

#[test]
fn test_count_hits_strings() {
    let part = setup("test_eval_strings");

    assert_eq!(part.count_hits("s = 'red'").unwrap(), 2);
    assert_eq!(part.count_hits("s = 'RED'").unwrap(), 2);
    assert_eq!(part.count_hits("s in ('red', 'blue')").unwrap(), 3);
    assert_eq!(part.count_hits("s like 'g%'").unwrap(), 2);
    assert_eq!(part.count_hits("t = 'bb'").unwrap(), 1);
    assert_eq!(part.count_hits("t like '%c'").unwrap(), 1);

    // unquoted literal against a string column
    assert_eq!(part.count_hits("s = red").unwrap(), 2);
}

#[test]
fn test_count_hits_arithmetic() {
    let part = setup("test_eval_arith");

    // x + y: 13, 31, 22, 41, 53
    assert_eq!(part.count_hits("x + y > 30").unwrap(), 3);
    assert_eq!(part.count_hits("sqrt(y) > 6").unwrap(), 2);
    assert_eq!(part.count_hits("x * 10 == y").unwrap(), 1);
}

#[test]
fn test_eval_respects_amask() {
    let part = setup("test_eval_amask");

    assert_eq!(part.count_hits("x == 1").unwrap(), 2);
    part.deactivate_rows(&[1]).unwrap();
    assert_eq!(part.count_hits("x == 1").unwrap(), 1);
    part.reactivate_rows(&[1]).unwrap();
    assert_eq!(part.count_hits("x == 1").unwrap(), 2);
}

#[test]
fn test_eval_missing_column_is_empty() {
    let part = setup("test_eval_missing");

    // a name failing verification rejects the query
    assert!(part.count_hits("nosuch > 1").is_err());

    // a hand-built tree with a missing column degrades to zero hits
    let expr = QExpr::Range(crate::qexpr::ContinuousRange::one_sided(
        "nosuch",
        crate::qexpr::CompOp::Lt,
        5.0,
    ));
    assert_eq!(part.evaluate(&expr).unwrap().cnt(), 0);
}

#[test]
fn test_eval_type_errors() {
    let part = setup("test_eval_types");

    // range conditions on raw text are rejected
    assert!(part.count_hits("t > 5").is_err());
    // string equality on numeric columns is rejected
    let expr = QExpr::StringEq(crate::qexpr::StringEq::new("x", "red"));
    assert!(part.evaluate(&expr).is_err());
}

#[test]
fn test_category_index_cached() {
    let part = setup("test_eval_category_index");

    assert_eq!(part.count_hits("s = 'green'").unwrap(), 2);
    // the first evaluation leaves a cached index file behind
    let col = part.to_column("s").unwrap();
    let loc = col.index_file(&part.to_active_dir());
    assert!(crate::util::file_size(&loc).unwrap() > 0);

    // and the in-memory handle is reused
    assert!(part.to_column("s").unwrap().as_index().is_some());
    assert_eq!(part.count_hits("s = 'green'").unwrap(), 2);
}

#[test]
fn test_project_aggregate() {
    let part = setup("test_eval_aggregate");

    let sel = SelectClause::parse("y, count(*), avg(y), sum(x), max(y), min(x)").unwrap();
    let hits = part.select_mask(&sel).unwrap();
    assert_eq!(hits.cnt(), 5);

    let vals = part.aggregate(&sel, &hits).unwrap();
    assert!(vals[0].is_nan()); // plain terms project, not aggregate
    assert_eq!(vals[1], 5.0);
    assert_eq!(vals[2], 30.0);
    assert_eq!(vals[3], 10.0);
    assert_eq!(vals[4], 50.0);
    assert_eq!(vals[5], 1.0);

    let projected = part
        .project(&MathTerm::var("y"), &hits)
        .unwrap();
    assert_eq!(projected, vec![10.0, 30.0, 20.0, 40.0, 50.0]);

    let sel = SelectClause::parse("median(y), countdistinct(x), stdpop(x)").unwrap();
    let vals = part.aggregate(&sel, &hits).unwrap();
    assert_eq!(vals[0], 30.0);
    assert_eq!(vals[1], 3.0);
    assert!((vals[2] - 0.8944271909999159).abs() < 1e-9);
}

#[test]
fn test_calculate_add_column_path() {
    let part = setup("test_eval_calculate");

    let term = MathTerm::Op(
        crate::qexpr::MathOp::Add,
        Box::new(MathTerm::var("x")),
        Box::new(MathTerm::var("y")),
    );
    let mask = term_mask(&part, &term).unwrap();
    assert_eq!(mask.cnt(), 5);
    let vals = calculate(&part, &term, &mask).unwrap();
    assert_eq!(vals, vec![13.0, 31.0, 22.0, 41.0, 53.0]);
}

#[test]
fn test_estimate_cost() {
    let part = setup("test_eval_estimate");
    let expr = QExpr::Range(crate::qexpr::ContinuousRange::one_sided(
        "x",
        crate::qexpr::CompOp::Lt,
        2.0,
    ));
    // without an index the cost is a full scan
    assert_eq!(part.estimate_cost(&expr), 5.0);
}
