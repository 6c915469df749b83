//! Tribes node runtime.
//!
//! Stateful pieces of private groups: the persistent key store, envelope
//! sealing with group and pair keys, tangle resolution against a host log,
//! and the orchestration that keeps them consistent as membership messages
//! replicate.
//!
//! # Components
//!
//! - [`KeyStore`]: group keys and memberships, cached over a [`Storage`] backend
//! - [`EnvelopeCodec`]: seals content for recipients, opens it with held keys
//! - [`GroupTangle`]: frontier of a group's tangles for new messages
//! - [`Tribes`]: create, invite, publish and the listen loop
//! - [`HostLog`]: what the node needs from the log it runs on ([`MemoryLog`]
//!   implements it in memory)
//! - [`SystemEnv`]: production environment (system clock, OS RNG)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;
pub mod config;
pub mod error;
mod identity;
pub mod key_store;
mod lifecycle;
pub mod log;
pub mod storage;
mod system_env;
mod tangle;

pub use codec::{EnvelopeCodec, Unsealed};
pub use config::NodeConfig;
pub use error::{CodecError, KeyStoreError, LogError, TangleError, TribesError};
pub use identity::Identity;
pub use key_store::{KeyStore, Readiness};
pub use lifecycle::{CreatedGroup, GroupLink, ProcessOutcome, Tribes};
pub use log::{HostLog, MemoryLog, Unboxer};
pub use storage::{ChaoticStorage, MemoryStorage, RedbStorage, Storage, StorageError, StoredGroup};
pub use system_env::SystemEnv;
pub use tangle::GroupTangle;
