use super::*;

use std::io::Write;

fn tmpdir(name: &str) -> ffi::OsString {
    let dir = std::env::temp_dir().join(name);
    fs::remove_dir_all(&dir).ok();
    fs::create_dir_all(&dir).unwrap();
    dir.into_os_string()
}

#[test]
fn test_file_helpers() {
    let dir = tmpdir("test_util_file_helpers");
    let loc = file_path(&dir, "data.bin");

    let mut fd = create_file_a(&loc).unwrap();
    sync_write(&mut fd, b"hello").unwrap();
    assert_eq!(file_size(&loc).unwrap(), 5);

    // append mode continues at the end
    let mut fd = open_file_a(&loc).unwrap();
    sync_write(&mut fd, b" world").unwrap();
    assert_eq!(file_size(&loc).unwrap(), 11);

    let mut fd = open_file_r(&loc).unwrap();
    let mut buf = vec![];
    fd.read_to_end(&mut buf).unwrap();
    assert_eq!(&buf, b"hello world");

    // create_file_a truncates an existing file
    let mut fd = create_file_a(&loc).unwrap();
    sync_write(&mut fd, b"x").unwrap();
    assert_eq!(file_size(&loc).unwrap(), 1);

    // missing files size to ZERO
    assert_eq!(file_size(&file_path(&dir, "missing")).unwrap(), 0);
}

#[test]
fn test_copy_dir_identical() {
    let a = tmpdir("test_util_copy_a");
    let b = tmpdir("test_util_copy_b");

    for (name, data) in [("f1", b"aaaa".to_vec()), ("f2", b"bb".to_vec())].iter() {
        let mut fd = create_file_a(&file_path(&a, name)).unwrap();
        sync_write(&mut fd, data).unwrap();
    }

    assert_eq!(copy_dir(&a, &b).unwrap(), 2);
    assert!(dirs_identical(&a, &b, &[]).unwrap());

    // diverge one file
    let mut fd = create_file_a(&file_path(&b, "f2")).unwrap();
    sync_write(&mut fd, b"cc").unwrap();
    assert!(!dirs_identical(&a, &b, &[]).unwrap());
    // unless it is ignored
    assert!(dirs_identical(&a, &b, &["f2"]).unwrap());

    // different file sets
    let mut fd = create_file_a(&file_path(&b, "f3")).unwrap();
    sync_write(&mut fd, b"z").unwrap();
    assert!(!dirs_identical(&a, &b, &[]).unwrap());

    clean_dir(&b).unwrap();
    assert_eq!(fs::read_dir(&b).unwrap().count(), 0);
}

#[test]
fn test_load_toml() {
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct T {
        name: String,
        count: usize,
    }

    let dir = tmpdir("test_util_load_toml");
    let loc = std::path::Path::new(&dir).join("t.toml");
    let mut fd = fs::File::create(&loc).unwrap();
    write!(fd, "name = \"ibis\"\ncount = 3\n").unwrap();

    let t: T = load_toml(&loc).unwrap();
    assert_eq!(t.name, "ibis");
    assert_eq!(t.count, 3);
}

#[test]
fn test_to_usize() {
    assert_eq!(to_usize(42).unwrap(), 42);
}
