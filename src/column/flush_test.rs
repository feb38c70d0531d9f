use super::*;

#[test]
fn test_flusher_batches() {
    let dir = std::env::temp_dir().join("test_flusher_batches");
    std::fs::create_dir_all(&dir).unwrap();
    let loc = dir.join("data").into_os_string();

    let mut flusher = Flusher::new(&loc, true).unwrap();
    assert_eq!(flusher.to_location(), Some(loc.clone()));

    flusher.flush(b"abc".to_vec()).unwrap();
    flusher.flush(b"defg".to_vec()).unwrap();
    assert_eq!(flusher.to_fpos(), Some(7));
    assert_eq!(flusher.close().unwrap(), 7);

    let data = std::fs::read(&loc).unwrap();
    assert_eq!(data, b"abcdefg".to_vec());
}

#[test]
fn test_flusher_append_mode() {
    let dir = std::env::temp_dir().join("test_flusher_append");
    std::fs::create_dir_all(&dir).unwrap();
    let loc = dir.join("data").into_os_string();

    let mut flusher = Flusher::new(&loc, true).unwrap();
    flusher.flush(b"head".to_vec()).unwrap();
    flusher.close().unwrap();

    // reopening without create continues at the end
    let mut flusher = Flusher::new(&loc, false).unwrap();
    assert_eq!(flusher.to_fpos(), Some(4));
    flusher.flush(b"tail".to_vec()).unwrap();
    flusher.close().unwrap();

    assert_eq!(std::fs::read(&loc).unwrap(), b"headtail".to_vec());
}

#[test]
fn test_flusher_empty() {
    let mut flusher = Flusher::empty();
    assert_eq!(flusher.to_location(), None);
    assert_eq!(flusher.to_fpos(), None);
    flusher.flush(b"ignored".to_vec()).unwrap();
    assert_eq!(flusher.close().unwrap(), 0);
}
