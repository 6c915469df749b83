//! Symmetric key material

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::CryptoError;

/// Size of every symmetric key in bytes.
pub const KEY_SIZE: usize = 32;

/// A 32-byte symmetric key: a group key or a derived pair key.
///
/// Zeroized on drop. `Debug` never prints key bytes.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; KEY_SIZE]);

impl SymmetricKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Build a key from a slice, rejecting anything that is not 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let array: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKeyLength { expected: KEY_SIZE, actual: bytes.len() }
        })?;
        Ok(Self(array))
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SymmetricKey(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_slice_accepts_32_bytes() {
        let key = SymmetricKey::from_slice(&[7u8; 32]).unwrap();
        assert_eq!(key.as_bytes(), &[7u8; 32]);
    }

    #[test]
    fn from_slice_rejects_other_lengths() {
        for len in [0usize, 16, 31, 33, 64] {
            let result = SymmetricKey::from_slice(&vec![0u8; len]);
            assert_eq!(result, Err(CryptoError::InvalidKeyLength { expected: 32, actual: len }));
        }
    }

    #[test]
    fn debug_hides_key_bytes() {
        let key = SymmetricKey::from_bytes([0xAB; 32]);
        assert_eq!(format!("{key:?}"), "SymmetricKey(..)");
    }
}
