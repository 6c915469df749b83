//! Deterministic simulation harness for private groups.
//!
//! [`SimEnv`] replaces the system clock and RNG with a seeded stream.
//! [`TestNetwork`] runs several nodes on in-memory logs and leaves
//! replication and message handling to the test, so scenarios like "the
//! invite arrives before the group root" are written out step by step.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod network;
pub mod sim_env;

pub use network::{SimNode, TestNetwork};
pub use sim_env::SimEnv;
