//! Fuzz target for checkpoint position ordering.
//!
//! Checkpoint rows are read back from slaves, so file names can be anything.
//! Ordering must stay total and antisymmetric.

#![no_main]

use binlog_replicator::checkpoint::LogPosition;
use libfuzzer_sys::fuzz_target;
use std::cmp::Ordering;

fuzz_target!(|data: (&str, u64, &str, u64)| {
    let (f1, p1, f2, p2) = data;
    let a = LogPosition::new(f1, p1);
    let b = LogPosition::new(f2, p2);

    assert_eq!(a.cmp(&b).reverse(), b.cmp(&a));
    assert_eq!(a.cmp(&a), Ordering::Equal);
    assert_eq!(a.cmp(&b) == Ordering::Equal, a == b);

    let _ = a.file_ordinal();
    let _ = a.to_string();
});
