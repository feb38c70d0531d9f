use rand::{prelude::random, rngs::SmallRng, Rng, SeedableRng};

use super::*;

#[test]
fn test_rid_order() {
    let a = Rid::new(1, 10);
    let b = Rid::new(1, 20);
    let c = Rid::new(2, 0);
    assert!(a < b);
    assert!(b < c);
    assert_eq!(format!("{}", a), "(1,10)");
}

#[test]
fn test_ridset_sort() {
    let seed: u128 = random();
    println!("test_ridset_sort {}", seed);
    let mut rng = SmallRng::from_seed(seed.to_le_bytes());

    // both below and above the insertion-sort cutoff
    for n in [0, 1, 10, 32, 33, 1000].iter() {
        let mut rids = RidSet::default();
        for _ in 0..*n {
            rids.push(Rid::new(rng.gen(), rng.gen()));
        }
        rids.sort();
        let sorted = rids.as_rids();
        for w in sorted.windows(2) {
            assert!(w[0] <= w[1], "{} {}", w[0], w[1]);
        }
        assert_eq!(sorted.len(), *n);
    }
}

#[test]
fn test_ridset_file() {
    let dir = std::env::temp_dir().join("test_ridset_file");
    std::fs::create_dir_all(&dir).unwrap();
    let loc = dir.join("-rids").into_os_string();

    let rids = RidSet::from(vec![Rid::new(1, 0), Rid::new(1, 1), Rid::new(2, 7)]);
    rids.write_file(&loc).unwrap();

    let val = RidSet::read_file(&loc).unwrap().unwrap();
    assert_eq!(val, rids);

    let missing = dir.join("-missing").into_os_string();
    assert!(RidSet::read_file(&missing).unwrap().is_none());
}

#[test]
fn test_ridset_fill() {
    let rids = RidSet::fill(7, 4);
    assert_eq!(rids.len(), 4);
    assert_eq!(rids.as_rids()[0], Rid::new(7, 0));
    assert_eq!(rids.as_rids()[3], Rid::new(7, 3));
}
