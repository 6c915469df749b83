//! The host log: append-only, content-addressed storage of signed messages.
//!
//! Private groups sit on top of a log they do not own. This module names the
//! capabilities they need from it:
//!
//! - append a message to the local feed
//! - accept messages replicated from peers
//! - look up messages by id
//! - query readable content by tangle root or by `type`
//! - notify on new readable messages
//! - run registered unboxers on encrypted content, and re-run them on demand
//!
//! [`MemoryLog`] is a complete in-process implementation.

mod memory;

use std::sync::Arc;

use async_trait::async_trait;
pub use memory::{MemoryLog, message_id};
use serde_json::Value;
use tokio::sync::mpsc;
use tribes_core::{FeedId, Msg, MsgContent, MsgId, TangleEntry};

use crate::error::LogError;

/// Decrypts message content for the log's indexes.
#[async_trait]
pub trait Unboxer: Send + Sync + 'static {
    /// Plain content of `msg`, or `None` if it cannot be read.
    async fn unbox(&self, msg: &Msg) -> Option<Value>;
}

/// Capabilities the group layer consumes from the host log.
#[async_trait]
pub trait HostLog: Send + Sync + 'static {
    /// Feed this log appends to.
    fn local_feed(&self) -> FeedId;

    /// Latest message of the local feed.
    async fn latest(&self) -> Result<Option<MsgId>, LogError>;

    /// Append to the local feed.
    ///
    /// `previous` must equal [`HostLog::latest`]; encrypted content is bound
    /// to it, so a stale value is rejected with `Conflict`.
    async fn append(&self, content: MsgContent, previous: Option<MsgId>) -> Result<Msg, LogError>;

    /// Store a message replicated from another feed. Idempotent.
    async fn add(&self, msg: Msg) -> Result<(), LogError>;

    /// Stored message, with content as written.
    async fn get(&self, id: &MsgId) -> Result<Option<Msg>, LogError>;

    /// Readable messages whose `tangles.<tangle>.root` is `root`.
    async fn query_tangle(&self, root: &MsgId, tangle: &str) -> Result<Vec<TangleEntry>, LogError>;

    /// Readable messages whose content `type` is `content_type`, with that
    /// content, in arrival order.
    async fn query_type(&self, content_type: &str) -> Result<Vec<(Msg, Value)>, LogError>;

    /// Stream of messages as they become readable, content decrypted.
    ///
    /// Messages re-read by a rebuild are delivered again.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<Msg>;

    /// Register an unboxer for encrypted content.
    fn add_unboxer(&self, unboxer: Arc<dyn Unboxer>);

    /// Re-run unboxers over every stored message.
    async fn rebuild(&self) -> Result<(), LogError>;
}
