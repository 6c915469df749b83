//! Fuzz target for persisted key-store records
//!
//! A corrupted or hand-edited database must fail to load with an error, not
//! crash the node during warm-load.
//!
//! # Invariants
//!
//! - CBOR decoding of a StoredGroup NEVER panics
//! - into_info() NEVER panics and accepts only 32-byte keys
//! - Accepted records round-trip through from_info()

#![no_main]

use libfuzzer_sys::fuzz_target;
use tribes_node::StoredGroup;

fuzz_target!(|data: &[u8]| {
    let Ok(record) = ciborium::from_reader::<StoredGroup, _>(data) else {
        return;
    };

    let Ok(info) = record.clone().into_info() else {
        return;
    };

    assert_eq!(info.key.as_bytes().len(), 32);
    let again = StoredGroup::from_info(&info);
    assert_eq!(again.root, record.root);
    assert_eq!(again.scheme, record.scheme);
});
