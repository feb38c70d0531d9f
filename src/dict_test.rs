use super::*;

#[test]
fn test_dict_insert_lookup() {
    let mut dic = Dictionary::new();
    assert_eq!(dic.insert("red"), 1);
    assert_eq!(dic.insert("green"), 2);
    assert_eq!(dic.insert("blue"), 3);
    assert_eq!(dic.len(), 3);

    // duplicate insert, case-insensitive
    assert_eq!(dic.insert("RED"), 1);
    assert_eq!(dic.len(), 3);

    // empty string is the NULL identifier
    assert_eq!(dic.insert(""), 0);

    assert_eq!(dic.to_id("Green"), Some(2));
    assert_eq!(dic.to_id("black"), None);
    assert_eq!(dic.to_id(""), Some(0));

    // stored spelling is the first inserted one
    assert_eq!(dic.to_str(1), Some("red"));
    assert_eq!(dic.to_str(0), None);
    assert_eq!(dic.to_str(4), None);
}

#[test]
fn test_dict_iter_order() {
    let mut dic = Dictionary::new();
    for s in ["w", "a", "m", "z"].iter() {
        dic.insert(s);
    }
    let entries: Vec<(u32, &str)> = dic.iter().collect();
    assert_eq!(entries, vec![(1, "w"), (2, "a"), (3, "m"), (4, "z")]);
}

#[test]
fn test_dict_bytes() {
    let mut dic = Dictionary::new();
    dic.insert("alpha");
    dic.insert("beta");
    dic.insert("gamma");

    let data = dic.to_bytes().unwrap();
    let val = Dictionary::from_bytes(&data).unwrap();
    assert_eq!(val.len(), 3);
    assert_eq!(val.to_id("beta"), Some(2));
    assert_eq!(val.to_str(3), Some("gamma"));
}

#[test]
fn test_dict_file() {
    let dir = std::env::temp_dir().join("test_dict_file");
    std::fs::create_dir_all(&dir).unwrap();
    let loc = dir.join("col.dic").into_os_string();

    let mut dic = Dictionary::new();
    dic.insert("x");
    dic.insert("y");
    dic.write_file(&loc).unwrap();

    let val = Dictionary::read_file(&loc).unwrap();
    assert_eq!(val.to_id("x"), Some(1));
    assert_eq!(val.to_id("y"), Some(2));

    // missing file reads back empty
    let missing = dir.join("missing.dic").into_os_string();
    assert_eq!(Dictionary::read_file(&missing).unwrap().len(), 0);
}
