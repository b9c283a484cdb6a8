//! Fuzz target for column type classification.
//!
//! `DESCRIBE` output is whatever the master says; classification must never
//! panic and must ignore case.

#![no_main]

use binlog_replicator::schema::SemanticType;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|declared: &str| {
    let lower = SemanticType::classify(&declared.to_ascii_lowercase());
    let upper = SemanticType::classify(&declared.to_ascii_uppercase());
    assert_eq!(lower, upper);
});
