//! Fuzz target for SealedEnvelope::from_bytes and open_envelope
//!
//! Envelopes arrive from peers as base64 inside message content, so every
//! byte is attacker controlled.
//!
//! # Invariants
//!
//! - Decoding NEVER panics; bad input is an error
//! - A decoded envelope re-encodes to the exact input bytes
//! - Opening with keys the envelope was not sealed for yields None

#![no_main]

use libfuzzer_sys::fuzz_target;
use tribes_core::{FeedId, MsgId};
use tribes_crypto::{EnvelopeContext, SealedEnvelope, SymmetricKey, open_envelope};

fuzz_target!(|data: &[u8]| {
    let Ok(envelope) = SealedEnvelope::from_bytes(data) else {
        return;
    };

    assert_eq!(envelope.to_bytes(), data, "decode/encode must be lossless");

    let author = FeedId::from_public_key([7; 32]).to_tfk();
    let previous = MsgId::previous_tfk(None);
    let context = EnvelopeContext { author: &author, previous: &previous };
    let candidates = [SymmetricKey::from_bytes([0; 32]), SymmetricKey::from_bytes([1; 32])];

    // Forging a slot for a fixed key would need a Poly1305 tag collision
    assert!(open_envelope(&envelope, &candidates, context).is_none());
});
