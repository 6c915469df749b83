//! Tribes Cryptographic Primitives
//!
//! Cryptographic building blocks for private groups on an append-only log.
//! Pure functions with deterministic outputs. Callers provide random bytes for
//! deterministic testing.
//!
//! # Key Sources
//!
//! A sealed message can be opened with one of two kinds of symmetric key:
//!
//! ```text
//! Group Key (32 random bytes, shared via add-member)
//!        │
//!        ├──────────────┐
//!        ▼              ▼
//! Cloaked Group Id   Key Slot ◄── Pair Key (X25519 over converted Ed25519)
//!                       │
//!                       ▼
//!                Message Key (random, per message)
//!                       │
//!                       ▼
//!                AEAD Encryption → Body
//! ```
//!
//! Each recipient key wraps the same random message key in its own slot. A
//! reader tries every key it holds against every slot; nothing in the
//! envelope says which key fits.
//!
//! # Security
//!
//! Key Hiding:
//! - Slots carry no key identifiers, only AEAD ciphertext
//! - Wrong keys fail the Poly1305 tag check, never yield plaintext
//!
//! Context Binding:
//! - Slot keys are derived from (recipient key, author, author's previous
//!   message), so a slot cannot be replayed on another message
//!
//! Pairwise Symmetry:
//! - Pair keys sort both parties' context blocks before derivation, so the
//!   initiator and the responder compute the same key
//!
//! Non-goals: forward secrecy and key revocation. A group key stays valid for
//! the lifetime of the group.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod cloak;
mod envelope;
mod error;
mod key;
mod pair_key;

pub use cloak::cloak_group_id;
pub use envelope::{
    EnvelopeContext, MAX_RECIPIENTS, MSG_KEY_SIZE, NONCE_SIZE, Opened, SealedEnvelope,
    open_envelope, seal_envelope,
};
pub use error::CryptoError;
pub use key::{KEY_SIZE, SymmetricKey};
pub use pair_key::{FEED_ID_SIZE, derive_pair_key};
