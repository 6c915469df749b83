//! Tribes protocol core.
//!
//! Types and pure logic for private groups on an append-only log. Nothing
//! here performs I/O: storage, the host log and the async runtime live in
//! `tribes-node`.
//!
//! # Components
//!
//! - [`refs`]: feed, message and cloaked group references in sigil and TFK form
//! - [`group`]: key material a member holds for a group
//! - [`tangle`]: causal DAG fields and frontier computation
//! - [`content`]: `group/init`, `group/add-member` and `link/feed-group` content
//! - [`msg`]: messages as the host log stores them
//! - [`env`]: clock and randomness seam

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod content;
pub mod env;
pub mod group;
pub mod msg;
pub mod refs;
pub mod tangle;

pub use content::{
    AddMember, AddMemberTangles, ContentError, FeedGroupLink, GroupContent, GroupInit, LinkTangles,
};
pub use env::Environment;
pub use group::{GroupKeyInfo, Scheme};
pub use msg::{Msg, MsgContent, MsgValue};
pub use refs::{FeedId, GroupId, MsgId, Recipient, RefError};
pub use tangle::{GROUP_TANGLE, MEMBERS_TANGLE, TangleEntry, TangleUpdate, heads};
