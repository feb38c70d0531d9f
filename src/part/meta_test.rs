use super::*;

use std::fs;

fn tmpdir(name: &str) -> ffi::OsString {
    let dir = std::env::temp_dir().join(name);
    fs::remove_dir_all(&dir).ok();
    fs::create_dir_all(&dir).unwrap();
    dir.into_os_string()
}

#[test]
fn test_meta_roundtrip() {
    let dir = tmpdir("test_meta_roundtrip");

    let mut c1 = Column::new("a", ColumnType::Int);
    c1.set_bounds(-3.0, 99.0);
    let mut c2 = Column::new("s", ColumnType::Category);
    c2.set_description("status flag").set_index_spec("keyindex");
    let mut c3 = Column::new("x", ColumnType::Double);
    c3.set_sorted(true);

    let md = MetaData {
        name: "demo".to_string(),
        description: "sample partition".to_string(),
        n_rows: 42,
        index: Some("default".to_string()),
        metatags: Some("shape = 6x7".to_string()),
        timestamp: 0,
        columns: vec![c1, c2, c3],
    };
    md.write(&dir).unwrap();

    let back = MetaData::read(&dir).unwrap().unwrap();
    assert_eq!(back.name, "demo");
    assert_eq!(back.description, "sample partition");
    assert_eq!(back.n_rows, 42);
    assert_eq!(back.index.as_deref(), Some("default"));
    assert_eq!(back.metatags.as_deref(), Some("shape = 6x7"));
    assert!(back.timestamp > 0);
    assert_eq!(back.columns.len(), 3);

    assert_eq!(back.columns[0].to_name(), "a");
    assert_eq!(back.columns[0].to_type(), ColumnType::Int);
    assert_eq!(back.columns[0].to_bounds(), Some((-3.0, 99.0)));

    assert_eq!(back.columns[1].to_type(), ColumnType::Category);
    assert_eq!(back.columns[1].to_description(), "status flag");
    assert_eq!(back.columns[1].to_index_spec().as_deref(), Some("keyindex"));

    assert!(back.columns[2].is_sorted());
}

#[test]
fn test_meta_missing() {
    let dir = tmpdir("test_meta_missing");
    assert!(MetaData::read(&dir).unwrap().is_none());
}

#[test]
fn test_meta_parse_errors() {
    let dir = tmpdir("test_meta_parse_errors");
    let loc = util::file_path(&dir, META_FILE);

    // a column without a type is rejected
    let text = "name = bad\nnumber_of_rows = 1\nBegin Column\nname = a\nEnd Column\n";
    fs::write(&loc, text).unwrap();
    assert!(MetaData::read(&dir).is_err());

    // missing End Column is rejected
    let text = "name = bad\nBegin Column\nname = a\ndata_type = INT\n";
    fs::write(&loc, text).unwrap();
    assert!(MetaData::read(&dir).is_err());

    // comments and unknown keys are tolerated
    let text = "# header\nname = ok\nnumber_of_rows = 2\nmystery = 1\n\
                Begin Column\nname = a\ndata_type = INT\nEnd Column\n";
    fs::write(&loc, text).unwrap();
    let md = MetaData::read(&dir).unwrap().unwrap();
    assert_eq!(md.name, "ok");
    assert_eq!(md.n_rows, 2);
    assert_eq!(md.columns.len(), 1);
}
