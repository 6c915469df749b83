//! Error types for cryptographic operations

use thiserror::Error;

/// Errors from key handling, pairwise agreement and envelope sealing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Invalid key material length
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected key length
        expected: usize,
        /// Actual key length
        actual: usize,
    },

    /// Identity encoding is not a classic feed id
    #[error("invalid identity: {reason}")]
    InvalidIdentity {
        /// What was wrong with the encoding
        reason: String,
    },

    /// Public key bytes are not a valid Ed25519 point
    #[error("invalid public key")]
    InvalidPublicKey,

    /// Diffie-Hellman produced an all-zero secret (low-order point)
    #[error("non-contributory shared secret")]
    WeakSharedSecret,

    /// Sealing was attempted without a single recipient key
    #[error("no recipient keys to seal for")]
    NoRecipients,

    /// More recipient keys than the envelope has slots for
    #[error("too many recipients: at most {max}, got {actual}")]
    TooManyRecipients {
        /// Slot limit
        max: usize,
        /// Requested recipient count
        actual: usize,
    },

    /// Envelope bytes could not be parsed
    #[error("malformed envelope: {reason}")]
    MalformedEnvelope {
        /// Parse failure detail
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CryptoError::InvalidKeyLength { expected: 32, actual: 31 };
        assert_eq!(err.to_string(), "invalid key length: expected 32, got 31");
    }
}
