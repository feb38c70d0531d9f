use super::*;

#[test]
fn test_scalar_roundtrip() {
    let mut out = vec![];
    0x1234_i32.to_le(&mut out);
    assert_eq!(out.len(), 4);
    assert_eq!(i32::from_le(&out), 0x1234);

    let mut out = vec![];
    1.5_f64.to_le(&mut out);
    assert_eq!(f64::from_le(&out), 1.5);

    assert_eq!(u32::null_value(), 0xFFFF_FFFF);
    assert!(f64::null_value().is_nan());
}

#[test]
fn test_values_bytes() {
    let vals = Values::Int(vec![1, -2, 3]);
    assert_eq!(vals.len(), 3);
    let data = vals.to_bytes();
    assert_eq!(data.len(), 12);

    let back = Values::from_bytes(&data, ColumnType::Int).unwrap();
    assert_eq!(back.get(0), Some(1.0));
    assert_eq!(back.get(1), Some(-2.0));
    assert_eq!(back.get(2), Some(3.0));
    assert_eq!(back.get(3), None);

    // short buffers are rejected
    assert!(Values::from_bytes(&data[..10], ColumnType::Int).is_err());
    // no fixed-width values for text
    assert!(Values::from_bytes(&data, ColumnType::Text).is_err());
}

#[test]
fn test_values_filter_permute() {
    let vals = Values::UShort(vec![10, 20, 30, 40]);
    let mask = crate::BitVector::from_rows(&[1, 3], 4);
    let picked = vals.filter(&mask);
    assert_eq!(picked.len(), 2);
    assert_eq!(picked.get(0), Some(20.0));
    assert_eq!(picked.get(1), Some(40.0));

    let perm = vals.permute(&[3, 0, 2, 1]);
    assert_eq!(perm.get(0), Some(40.0));
    assert_eq!(perm.get(1), Some(10.0));
    assert_eq!(perm.get(2), Some(30.0));
    assert_eq!(perm.get(3), Some(20.0));
}

#[test]
fn test_values_min_max() {
    let vals = Values::Double(vec![3.0, -1.5, 9.25]);
    assert_eq!(vals.min_max(), Some((-1.5, 9.25)));
    assert_eq!(Values::Int(vec![]).min_max(), None);
}

#[test]
fn test_values_cast_from() {
    let mask = crate::BitVector::from_rows(&[0, 2], 3);
    let vals = Values::cast_from(&[1.9, 2.9, 3.9], &mask, ColumnType::Int).unwrap();
    assert_eq!(vals.get(0), Some(1.0));
    // row outside the mask receives the null sentinel
    assert_eq!(vals.get(1), Some(0x7FFF_FFFF as f64));
    assert_eq!(vals.get(2), Some(3.0));
}

#[test]
fn test_sort_segments_single_key() {
    let vals = Values::Int(vec![3, 1, 2, 1, 3]);
    let mut starts: Vec<u32> = vec![0, 5];
    let ind: Vec<u32> = (0..5).collect();

    let ind1 = vals.sort_segments(&mut starts, &ind, true);
    assert_eq!(ind1, vec![1, 3, 2, 0, 4]);
    assert_eq!(starts, vec![0, 2, 3, 5]);

    let sorted = vals.permute(&ind1);
    assert_eq!(sorted.get(0), Some(1.0));
    assert_eq!(sorted.get(4), Some(3.0));
}

#[test]
fn test_sort_segments_two_keys() {
    // x ascending then y descending, the documented two-key case
    let x = Values::Int(vec![3, 1, 2, 1, 3]);
    let y = Values::Int(vec![10, 30, 20, 40, 50]);

    let mut starts: Vec<u32> = vec![0, 5];
    let ind: Vec<u32> = (0..5).collect();
    let ind = x.sort_segments(&mut starts, &ind, true);
    let ind = y.sort_segments(&mut starts, &ind, false);
    assert_eq!(ind, vec![3, 1, 2, 4, 0]);

    let xs = x.permute(&ind);
    let ys = y.permute(&ind);
    assert_eq!(
        (0..5).map(|i| xs.get(i).unwrap()).collect::<Vec<f64>>(),
        vec![1.0, 1.0, 2.0, 3.0, 3.0]
    );
    assert_eq!(
        (0..5).map(|i| ys.get(i).unwrap()).collect::<Vec<f64>>(),
        vec![40.0, 30.0, 20.0, 50.0, 10.0]
    );
}

#[test]
fn test_values_file() {
    let dir = std::env::temp_dir().join("test_values_file");
    std::fs::create_dir_all(&dir).unwrap();
    let loc = dir.join("col").into_os_string();

    let vals = Values::Long(vec![-1, 0, 1 << 40]);
    vals.write_file(&loc).unwrap();
    let back = Values::read_file(&loc, ColumnType::Long).unwrap();
    assert_eq!(back.get(2), Some((1_i64 << 40) as f64));
    assert_eq!(back.len(), 3);
}
