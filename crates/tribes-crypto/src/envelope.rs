//! Multi-key envelopes using `XChaCha20-Poly1305`
//!
//! All functions are pure - random bytes must be provided by the caller.
//!
//! # Layout
//!
//! ```text
//! [nonce: 24][slot count: 1][slot: 48] * count [body: plaintext + 16]
//! ```
//!
//! Every slot is the random message key sealed under a slot key derived from
//! one recipient key. The body is the plaintext sealed under the message key.

use chacha20poly1305::{
    Key, XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit, Payload},
};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::{CryptoError, KEY_SIZE, SymmetricKey};

/// Maximum number of recipient keys per envelope.
pub const MAX_RECIPIENTS: usize = 16;

/// Size of the `XChaCha20` nonce.
pub const NONCE_SIZE: usize = 24;

/// Size of the per-message content key.
pub const MSG_KEY_SIZE: usize = 32;

/// Poly1305 tag size (16 bytes)
const POLY1305_TAG_SIZE: usize = 16;

/// Sealed message key plus tag.
const SLOT_SIZE: usize = MSG_KEY_SIZE + POLY1305_TAG_SIZE;

/// Label used for slot key derivation
const SLOT_KEY_LABEL: &[u8] = b"envelope_key_slot";

/// Who sealed the message and where it sits in their feed.
///
/// Bound into every slot key and into the body's associated data.
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeContext<'a> {
    /// Author feed id (TFK)
    pub author: &'a [u8],
    /// Author's previous message id (TFK), or the null message id
    pub previous: &'a [u8],
}

impl EnvelopeContext<'_> {
    fn to_bytes(self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.author.len() + self.previous.len());
        bytes.extend_from_slice(self.author);
        bytes.extend_from_slice(self.previous);
        bytes
    }
}

/// Ciphertext decryptable by any one of the keys it was sealed for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedEnvelope {
    nonce: [u8; NONCE_SIZE],
    slots: Vec<[u8; SLOT_SIZE]>,
    body: Vec<u8>,
}

/// Result of successfully opening an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opened {
    /// Index of the candidate key that fit.
    pub key_index: usize,
    /// Recovered plaintext.
    pub plaintext: Vec<u8>,
}

impl SealedEnvelope {
    /// Number of key slots.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Plaintext length (body length minus authentication tag).
    pub fn plaintext_len(&self) -> usize {
        self.body.len().saturating_sub(POLY1305_TAG_SIZE)
    }

    /// Serialize to the envelope byte layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes =
            Vec::with_capacity(NONCE_SIZE + 1 + self.slots.len() * SLOT_SIZE + self.body.len());
        bytes.extend_from_slice(&self.nonce);
        bytes.push(self.slots.len() as u8);
        for slot in &self.slots {
            bytes.extend_from_slice(slot);
        }
        bytes.extend_from_slice(&self.body);
        bytes
    }

    /// Parse the envelope byte layout.
    ///
    /// # Errors
    ///
    /// - `MalformedEnvelope` if the header is truncated, the slot count is
    ///   zero or above [`MAX_RECIPIENTS`], or the body is shorter than a tag
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let header_len = NONCE_SIZE + 1;
        if bytes.len() < header_len {
            return Err(malformed(format!("{} bytes is shorter than header", bytes.len())));
        }

        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&bytes[..NONCE_SIZE]);

        let count = bytes[NONCE_SIZE] as usize;
        if count == 0 || count > MAX_RECIPIENTS {
            return Err(malformed(format!("slot count {count} out of range")));
        }

        let slots_end = header_len + count * SLOT_SIZE;
        if bytes.len() < slots_end + POLY1305_TAG_SIZE {
            return Err(malformed(format!("{} bytes cannot hold {count} slots", bytes.len())));
        }

        let slots = bytes[header_len..slots_end]
            .chunks_exact(SLOT_SIZE)
            .map(|chunk| {
                let mut slot = [0u8; SLOT_SIZE];
                slot.copy_from_slice(chunk);
                slot
            })
            .collect();

        Ok(Self { nonce, slots, body: bytes[slots_end..].to_vec() })
    }
}

fn malformed(reason: String) -> CryptoError {
    CryptoError::MalformedEnvelope { reason }
}

/// Seal `plaintext` so that any one of `recipient_keys` can open it.
///
/// Duplicate keys collapse into a single slot.
///
/// # Errors
///
/// - `NoRecipients` if `recipient_keys` is empty
/// - `TooManyRecipients` if more than [`MAX_RECIPIENTS`] distinct keys
///
/// # Security
///
/// - `msg_key` and `nonce` MUST come from a cryptographically secure RNG
/// - Slot order follows `recipient_keys`; slots carry no key identifiers
pub fn seal_envelope(
    plaintext: &[u8],
    recipient_keys: &[&SymmetricKey],
    context: EnvelopeContext<'_>,
    msg_key: [u8; MSG_KEY_SIZE],
    nonce: [u8; NONCE_SIZE],
) -> Result<SealedEnvelope, CryptoError> {
    let mut distinct: Vec<&SymmetricKey> = Vec::with_capacity(recipient_keys.len());
    for key in recipient_keys {
        if !distinct.contains(key) {
            distinct.push(*key);
        }
    }

    if distinct.is_empty() {
        return Err(CryptoError::NoRecipients);
    }
    if distinct.len() > MAX_RECIPIENTS {
        return Err(CryptoError::TooManyRecipients {
            max: MAX_RECIPIENTS,
            actual: distinct.len(),
        });
    }

    let msg_key = Zeroizing::new(msg_key);
    let context_bytes = context.to_bytes();
    let xnonce = XNonce::from_slice(&nonce);

    let slots = distinct
        .iter()
        .map(|recipient| {
            let slot_key = derive_slot_key(recipient, &context_bytes);
            let cipher = XChaCha20Poly1305::new(Key::from_slice(slot_key.as_slice()));
            let Ok(sealed) = cipher.encrypt(xnonce, msg_key.as_slice()) else {
                unreachable!("XChaCha20-Poly1305 encryption cannot fail with valid inputs");
            };
            let mut slot = [0u8; SLOT_SIZE];
            slot.copy_from_slice(&sealed);
            slot
        })
        .collect();

    let cipher = XChaCha20Poly1305::new(Key::from_slice(msg_key.as_slice()));
    let Ok(body) = cipher.encrypt(xnonce, Payload { msg: plaintext, aad: &context_bytes }) else {
        unreachable!("XChaCha20-Poly1305 encryption cannot fail with valid inputs");
    };

    Ok(SealedEnvelope { nonce, slots, body })
}

/// Try every candidate key against every slot.
///
/// Returns `None` when no candidate opens the envelope. A wrong key fails the
/// authentication tag; it never yields a plausible plaintext.
pub fn open_envelope<'k>(
    envelope: &SealedEnvelope,
    candidates: impl IntoIterator<Item = &'k SymmetricKey>,
    context: EnvelopeContext<'_>,
) -> Option<Opened> {
    let context_bytes = context.to_bytes();
    let xnonce = XNonce::from_slice(&envelope.nonce);

    for (key_index, candidate) in candidates.into_iter().enumerate() {
        let slot_key = derive_slot_key(candidate, &context_bytes);
        let slot_cipher = XChaCha20Poly1305::new(Key::from_slice(slot_key.as_slice()));

        for slot in &envelope.slots {
            let Ok(msg_key) = slot_cipher.decrypt(xnonce, slot.as_slice()) else {
                continue;
            };
            let msg_key = Zeroizing::new(msg_key);

            let body_cipher = XChaCha20Poly1305::new(Key::from_slice(msg_key.as_slice()));
            let payload = Payload { msg: envelope.body.as_slice(), aad: &context_bytes };
            if let Ok(plaintext) = body_cipher.decrypt(xnonce, payload) {
                return Some(Opened { key_index, plaintext });
            }
        }
    }

    None
}

fn derive_slot_key(recipient: &SymmetricKey, context: &[u8]) -> Zeroizing<[u8; KEY_SIZE]> {
    let hkdf = Hkdf::<Sha256>::new(None, recipient.as_bytes());

    let mut info = Vec::with_capacity(SLOT_KEY_LABEL.len() + context.len());
    info.extend_from_slice(SLOT_KEY_LABEL);
    info.extend_from_slice(context);

    let mut slot_key = Zeroizing::new([0u8; KEY_SIZE]);
    let Ok(()) = hkdf.expand(&info, slot_key.as_mut_slice()) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };
    slot_key
}

#[cfg(test)]
mod tests {
    use super::*;

    const AUTHOR: &[u8] = &[0u8; 34];
    const PREVIOUS: &[u8] = &[1u8; 34];

    fn context() -> EnvelopeContext<'static> {
        EnvelopeContext { author: AUTHOR, previous: PREVIOUS }
    }

    fn key(byte: u8) -> SymmetricKey {
        SymmetricKey::from_bytes([byte; KEY_SIZE])
    }

    #[test]
    fn seal_open_roundtrip() {
        let group = key(1);
        let sealed =
            seal_envelope(b"hello group", &[&group], context(), [9; 32], [3; 24]).unwrap();

        let opened = open_envelope(&sealed, [&group], context()).unwrap();
        assert_eq!(opened.plaintext, b"hello group");
        assert_eq!(opened.key_index, 0);
    }

    #[test]
    fn any_recipient_key_opens() {
        let keys = [key(1), key(2), key(3)];
        let refs: Vec<&SymmetricKey> = keys.iter().collect();
        let sealed = seal_envelope(b"to all", &refs, context(), [9; 32], [3; 24]).unwrap();

        for k in &keys {
            let opened = open_envelope(&sealed, [k], context()).unwrap();
            assert_eq!(opened.plaintext, b"to all");
        }
    }

    #[test]
    fn key_index_reports_matching_candidate() {
        let recipient = key(2);
        let sealed = seal_envelope(b"x", &[&recipient], context(), [9; 32], [3; 24]).unwrap();

        let candidates = [key(7), key(8), key(2)];
        let opened = open_envelope(&sealed, candidates.iter(), context()).unwrap();
        assert_eq!(opened.key_index, 2);
    }

    #[test]
    fn wrong_key_does_not_open() {
        let sealed = seal_envelope(b"secret", &[&key(1)], context(), [9; 32], [3; 24]).unwrap();
        assert_eq!(open_envelope(&sealed, [&key(2)], context()), None);
    }

    #[test]
    fn different_context_does_not_open() {
        let group = key(1);
        let sealed = seal_envelope(b"secret", &[&group], context(), [9; 32], [3; 24]).unwrap();

        let other = EnvelopeContext { author: AUTHOR, previous: &[2u8; 34] };
        assert_eq!(open_envelope(&sealed, [&group], other), None);
    }

    #[test]
    fn tampered_body_does_not_open() {
        let group = key(1);
        let sealed = seal_envelope(b"original", &[&group], context(), [9; 32], [3; 24]).unwrap();

        let mut bytes = sealed.to_bytes();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let tampered = SealedEnvelope::from_bytes(&bytes).unwrap();

        assert_eq!(open_envelope(&tampered, [&group], context()), None);
    }

    #[test]
    fn no_recipients_is_rejected() {
        let result = seal_envelope(b"x", &[], context(), [9; 32], [3; 24]);
        assert_eq!(result, Err(CryptoError::NoRecipients));
    }

    #[test]
    fn too_many_recipients_is_rejected() {
        let keys: Vec<SymmetricKey> = (0..=MAX_RECIPIENTS as u8).map(key).collect();
        let refs: Vec<&SymmetricKey> = keys.iter().collect();

        let result = seal_envelope(b"x", &refs, context(), [9; 32], [3; 24]);
        assert_eq!(
            result,
            Err(CryptoError::TooManyRecipients { max: MAX_RECIPIENTS, actual: MAX_RECIPIENTS + 1 })
        );
    }

    #[test]
    fn duplicate_keys_share_a_slot() {
        let group = key(1);
        let sealed =
            seal_envelope(b"x", &[&group, &group, &key(2)], context(), [9; 32], [3; 24]).unwrap();
        assert_eq!(sealed.slot_count(), 2);
    }

    #[test]
    fn bytes_roundtrip() {
        let sealed =
            seal_envelope(b"payload", &[&key(1), &key(2)], context(), [9; 32], [3; 24]).unwrap();
        let parsed = SealedEnvelope::from_bytes(&sealed.to_bytes()).unwrap();
        assert_eq!(parsed, sealed);
        assert_eq!(parsed.plaintext_len(), b"payload".len());
    }

    #[test]
    fn truncated_bytes_are_rejected() {
        let sealed = seal_envelope(b"payload", &[&key(1)], context(), [9; 32], [3; 24]).unwrap();
        let bytes = sealed.to_bytes();

        for len in [0, 10, NONCE_SIZE, NONCE_SIZE + 1 + SLOT_SIZE] {
            assert!(matches!(
                SealedEnvelope::from_bytes(&bytes[..len]),
                Err(CryptoError::MalformedEnvelope { .. })
            ));
        }
    }

    #[test]
    fn zero_slot_count_is_rejected() {
        let mut bytes = vec![0u8; NONCE_SIZE + 1 + POLY1305_TAG_SIZE];
        bytes[NONCE_SIZE] = 0;
        assert!(matches!(
            SealedEnvelope::from_bytes(&bytes),
            Err(CryptoError::MalformedEnvelope { .. })
        ));
    }

    #[test]
    fn empty_plaintext_roundtrip() {
        let group = key(4);
        let sealed = seal_envelope(b"", &[&group], context(), [0; 32], [0; 24]).unwrap();
        assert_eq!(open_envelope(&sealed, [&group], context()).unwrap().plaintext, b"");
    }
}
