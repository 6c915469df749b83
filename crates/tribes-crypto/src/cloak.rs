//! Cloaked group identifiers

use hkdf::Hkdf;
use sha2::Sha256;

use crate::SymmetricKey;

/// Label used for cloaked id derivation
const CLOAKED_ID_LABEL: &[u8] = b"cloaked_msg_id";

/// Derive the public identifier of a group from its root message id (TFK)
/// and group key.
///
/// Reveals neither input: without the key, the root cannot be linked to the
/// id, and the id leaks nothing about the key.
pub fn cloak_group_id(root: &[u8], group_key: &SymmetricKey) -> [u8; 32] {
    let hkdf = Hkdf::<Sha256>::new(None, group_key.as_bytes());

    let mut info = Vec::with_capacity(CLOAKED_ID_LABEL.len() + root.len());
    info.extend_from_slice(CLOAKED_ID_LABEL);
    info.extend_from_slice(root);

    let mut id = [0u8; 32];
    let Ok(()) = hkdf.expand(&info, &mut id) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cloak_is_deterministic() {
        let key = SymmetricKey::from_bytes([5; 32]);
        assert_eq!(cloak_group_id(&[1; 34], &key), cloak_group_id(&[1; 34], &key));
    }

    #[test]
    fn different_roots_produce_different_ids() {
        let key = SymmetricKey::from_bytes([5; 32]);
        assert_ne!(cloak_group_id(&[1; 34], &key), cloak_group_id(&[2; 34], &key));
    }

    #[test]
    fn different_keys_produce_different_ids() {
        let root = [1u8; 34];
        assert_ne!(
            cloak_group_id(&root, &SymmetricKey::from_bytes([5; 32])),
            cloak_group_id(&root, &SymmetricKey::from_bytes([6; 32]))
        );
    }

    #[test]
    fn id_does_not_contain_root_or_key() {
        let key = SymmetricKey::from_bytes([5; 32]);
        let id = cloak_group_id(&[5; 34], &key);
        assert_ne!(&id, key.as_bytes());
    }
}
