use std::{sync::Arc, thread};

use super::*;

#[test]
fn test_spinlock_exclusion() {
    let lock = Arc::new(Spinlock::new(0_u64));
    let mut handles = vec![];

    for _ in 0..8 {
        let lock = Arc::clone(&lock);
        handles.push(thread::spawn(move || {
            for _ in 0..1000 {
                let mut w = lock.write();
                *w += 1;
            }
        }));
    }
    for _ in 0..4 {
        let lock = Arc::clone(&lock);
        handles.push(thread::spawn(move || {
            let mut last = 0;
            for _ in 0..1000 {
                let r = lock.read();
                // the counter never goes backwards
                assert!(*r >= last);
                last = *r;
            }
        }));
    }

    for handle in handles.into_iter() {
        handle.join().unwrap();
    }
    assert_eq!(*lock.read(), 8000);
}

#[test]
fn test_spinlock_guards() {
    let lock = Spinlock::new(vec![1, 2, 3]);
    {
        let r1 = lock.read();
        let r2 = lock.read();
        assert_eq!(r1.len(), 3);
        assert_eq!(r2.len(), 3);
    }
    {
        let mut w = lock.write();
        w.push(4);
    }
    assert_eq!(lock.read().len(), 4);

    let stats = lock.to_stats().unwrap();
    println!("spinlock stats {}", stats);
}
