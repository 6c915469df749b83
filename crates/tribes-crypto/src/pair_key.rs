//! Pairwise key agreement between two feed identities.
//!
//! Lets a sender address a peer who holds no group key yet (the invite that
//! introduces a group). Both sides convert their Ed25519 identity to X25519,
//! run Diffie-Hellman, and feed the shared secret through HKDF.

use ed25519_dalek::{SigningKey, VerifyingKey};
use hkdf::Hkdf;
use sha2::Sha256;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::{CryptoError, KEY_SIZE, SymmetricKey};

/// Size of a classic feed id in type-format-key encoding.
pub const FEED_ID_SIZE: usize = 34;

/// TFK type byte for feeds.
const FEED_TYPE: u8 = 0;

/// TFK format byte for classic Ed25519 feeds.
const CLASSIC_FORMAT: u8 = 0;

/// Extract salt for pairwise keys
const PAIR_KEY_SALT: &[u8] = b"envelope-dm-v1-extract-salt";

/// Label used for pairwise key expansion
const PAIR_KEY_LABEL: &[u8] = b"envelope-dm-v1-shared-key";

/// Derive the symmetric key shared by `my_secret` and the owner of
/// `their_public`.
///
/// `my_id` and `their_id` are the parties' 34-byte feed ids. Each side
/// contributes a block `dh_public || feed_id`; the two blocks are sorted
/// before derivation so `derive(A, B) == derive(B, A)`.
///
/// # Errors
///
/// - `InvalidIdentity` if either feed id is not a 34-byte classic feed id, or
///   does not embed the matching public key
/// - `InvalidPublicKey` if `their_public` is not an Ed25519 point
/// - `WeakSharedSecret` if the peer key is of low order
///
/// Identity checks run before any curve arithmetic.
pub fn derive_pair_key(
    my_secret: &SigningKey,
    my_id: &[u8],
    their_public: &[u8; 32],
    their_id: &[u8],
) -> Result<SymmetricKey, CryptoError> {
    check_feed_id(my_id, my_secret.verifying_key().as_bytes())?;
    check_feed_id(their_id, their_public)?;

    let their_verifying =
        VerifyingKey::from_bytes(their_public).map_err(|_| CryptoError::InvalidPublicKey)?;

    let my_dh_secret = StaticSecret::from(my_secret.to_scalar_bytes());
    let my_dh_public = PublicKey::from(&my_dh_secret);
    let their_dh_public = PublicKey::from(their_verifying.to_montgomery().to_bytes());

    let shared = my_dh_secret.diffie_hellman(&their_dh_public);
    if !shared.was_contributory() {
        return Err(CryptoError::WeakSharedSecret);
    }

    let mine = context_block(my_dh_public.as_bytes(), my_id);
    let theirs = context_block(their_dh_public.as_bytes(), their_id);
    let (first, second) = if mine <= theirs { (mine, theirs) } else { (theirs, mine) };

    let mut info = Vec::with_capacity(PAIR_KEY_LABEL.len() + first.len() + second.len());
    info.extend_from_slice(PAIR_KEY_LABEL);
    info.extend_from_slice(&first);
    info.extend_from_slice(&second);

    let hkdf = Hkdf::<Sha256>::new(Some(PAIR_KEY_SALT), shared.as_bytes());
    let mut key = [0u8; KEY_SIZE];
    let Ok(()) = hkdf.expand(&info, &mut key) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };

    Ok(SymmetricKey::from_bytes(key))
}

/// `dh_public || feed_id`
fn context_block(dh_public: &[u8; 32], feed_id: &[u8]) -> Vec<u8> {
    let mut block = Vec::with_capacity(32 + feed_id.len());
    block.extend_from_slice(dh_public);
    block.extend_from_slice(feed_id);
    block
}

fn check_feed_id(feed_id: &[u8], public_key: &[u8; 32]) -> Result<(), CryptoError> {
    if feed_id.len() != FEED_ID_SIZE {
        return Err(CryptoError::InvalidIdentity {
            reason: format!("expected {FEED_ID_SIZE} bytes, got {}", feed_id.len()),
        });
    }
    if feed_id[0] != FEED_TYPE || feed_id[1] != CLASSIC_FORMAT {
        return Err(CryptoError::InvalidIdentity {
            reason: format!("unsupported type/format {}/{}", feed_id[0], feed_id[1]),
        });
    }
    if &feed_id[2..] != public_key.as_slice() {
        return Err(CryptoError::InvalidIdentity {
            reason: "feed id does not match public key".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(seed: u8) -> (SigningKey, Vec<u8>) {
        let signing = SigningKey::from_bytes(&[seed; 32]);
        let mut id = vec![FEED_TYPE, CLASSIC_FORMAT];
        id.extend_from_slice(signing.verifying_key().as_bytes());
        (signing, id)
    }

    #[test]
    fn agreement_is_symmetric() {
        let (alice, alice_id) = identity(1);
        let (bob, bob_id) = identity(2);

        let from_alice =
            derive_pair_key(&alice, &alice_id, bob.verifying_key().as_bytes(), &bob_id).unwrap();
        let from_bob =
            derive_pair_key(&bob, &bob_id, alice.verifying_key().as_bytes(), &alice_id).unwrap();

        assert_eq!(from_alice, from_bob);
    }

    #[test]
    fn agreement_is_deterministic() {
        let (alice, alice_id) = identity(1);
        let (bob, bob_id) = identity(2);
        let bob_public = bob.verifying_key().to_bytes();

        let first = derive_pair_key(&alice, &alice_id, &bob_public, &bob_id).unwrap();
        let second = derive_pair_key(&alice, &alice_id, &bob_public, &bob_id).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn different_peers_produce_different_keys() {
        let (alice, alice_id) = identity(1);
        let (bob, bob_id) = identity(2);
        let (carol, carol_id) = identity(3);

        let with_bob =
            derive_pair_key(&alice, &alice_id, bob.verifying_key().as_bytes(), &bob_id).unwrap();
        let with_carol =
            derive_pair_key(&alice, &alice_id, carol.verifying_key().as_bytes(), &carol_id)
                .unwrap();

        assert_ne!(with_bob, with_carol);
    }

    #[test]
    fn self_agreement_works() {
        let (alice, alice_id) = identity(9);
        let key =
            derive_pair_key(&alice, &alice_id, alice.verifying_key().as_bytes(), &alice_id);
        assert!(key.is_ok());
    }

    #[test]
    fn short_feed_id_is_rejected() {
        let (alice, alice_id) = identity(1);
        let (bob, bob_id) = identity(2);

        let result =
            derive_pair_key(&alice, &alice_id, bob.verifying_key().as_bytes(), &bob_id[..33]);
        assert!(matches!(result, Err(CryptoError::InvalidIdentity { .. })));
    }

    #[test]
    fn wrong_format_is_rejected() {
        let (alice, alice_id) = identity(1);
        let (bob, mut bob_id) = identity(2);
        bob_id[1] = 2;

        let result = derive_pair_key(&alice, &alice_id, bob.verifying_key().as_bytes(), &bob_id);
        assert!(matches!(result, Err(CryptoError::InvalidIdentity { .. })));
    }

    #[test]
    fn mismatched_public_key_is_rejected() {
        let (alice, alice_id) = identity(1);
        let (_, bob_id) = identity(2);
        let (carol, _) = identity(3);

        let result =
            derive_pair_key(&alice, &alice_id, carol.verifying_key().as_bytes(), &bob_id);
        assert!(matches!(result, Err(CryptoError::InvalidIdentity { .. })));
    }

    #[test]
    fn context_blocks_order_lexicographically() {
        let low = context_block(&[0u8; 32], &[0u8; FEED_ID_SIZE]);
        let high = context_block(&[1u8; 32], &[0u8; FEED_ID_SIZE]);
        assert!(low < high);
    }
}
