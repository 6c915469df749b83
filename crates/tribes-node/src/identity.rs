//! The local author's signing identity.

use std::fmt;

use ed25519_dalek::SigningKey;
use tribes_core::{Environment, FeedId};
use tribes_crypto::{CryptoError, SymmetricKey, derive_pair_key};

/// Ed25519 keypair of the local feed.
pub struct Identity {
    signing: SigningKey,
    feed: FeedId,
}

impl Identity {
    /// Identity from a 32-byte Ed25519 seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let signing = SigningKey::from_bytes(&seed);
        let feed = FeedId::from_public_key(signing.verifying_key().to_bytes());
        Self { signing, feed }
    }

    /// Fresh identity from the environment's RNG.
    pub fn generate<E: Environment>(env: &E) -> Self {
        Self::from_seed(env.random_array())
    }

    /// Feed id of this identity.
    pub fn feed_id(&self) -> FeedId {
        self.feed
    }

    /// Key shared with `peer`, identical to the one `peer` derives for us.
    pub fn pair_key(&self, peer: &FeedId) -> Result<SymmetricKey, CryptoError> {
        derive_pair_key(&self.signing, &self.feed.to_tfk(), peer.public_key(), &peer.to_tfk())
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity").field("feed", &self.feed).finish_non_exhaustive()
    }
}
