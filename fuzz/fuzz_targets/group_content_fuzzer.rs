//! Fuzz target for group lifecycle content parsing
//!
//! Decrypted content is JSON written by whoever holds a key, including
//! former members and invitees.
//!
//! # Invariants
//!
//! - GroupContent::parse and FeedGroupLink::parse NEVER panic
//! - Content that parses re-encodes and parses to the same value
//! - A parsed add-member always has a 32-byte key and 1..=16 recipients
//! - A parsed link is addressed to exactly the group it names

#![no_main]

use libfuzzer_sys::fuzz_target;
use serde_json::Value;
use tribes_core::{FeedGroupLink, GroupContent, Recipient, content};

fuzz_target!(|data: &[u8]| {
    let Ok(value) = serde_json::from_slice::<Value>(data) else {
        return;
    };

    let _ = content::recipients(&value);
    let _ = content::tangle(&value, "group");

    if let Ok(Some(link)) = FeedGroupLink::parse(&value) {
        assert_eq!(link.recps, vec![Recipient::Group(link.child)]);
        let encoded = link.to_content().expect("parsed link must re-encode");
        assert_eq!(FeedGroupLink::parse(&encoded).expect("re-encoded link must parse"), Some(link));
    }

    let Ok(Some(parsed)) = GroupContent::parse(&value) else {
        return;
    };

    let encoded = parsed.to_content().expect("parsed content must re-encode");
    let reparsed = GroupContent::parse(&encoded).expect("re-encoded content must parse");
    assert_eq!(reparsed, Some(parsed.clone()));

    if let GroupContent::AddMember(add) = parsed {
        assert!(add.group_key().is_ok());
        assert!((1..=16).contains(&add.recps.len()));
    }
});
