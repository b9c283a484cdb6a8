//! Fuzz target for binding raw binlog bytes to typed parameters.
//!
//! Malformed values must come back as bind errors, never panics.

#![no_main]

use binlog_replicator::event::ColumnValue;
use binlog_replicator::schema::{ColumnSpec, SemanticType};
use binlog_replicator::statement::bind_value;
use libfuzzer_sys::fuzz_target;

const TYPES: [SemanticType; 7] = [
    SemanticType::Integer,
    SemanticType::FloatingPoint,
    SemanticType::FixedPoint,
    SemanticType::FixedString,
    SemanticType::VariableString,
    SemanticType::BinaryBlob,
    SemanticType::Text,
];

fuzz_target!(|data: (u8, &[u8])| {
    let (ty, bytes) = data;
    let column = ColumnSpec::new("c", TYPES[ty as usize % TYPES.len()]);

    let _ = bind_value(&column, &ColumnValue::Bytes(bytes.to_vec()));
    let _ = bind_value(&column, &ColumnValue::Decimal(String::from_utf8_lossy(bytes).into_owned()));
});
