#![allow(clippy::disallowed_types, reason = "Locks are never held across await")]

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError, RwLock,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tracing::{debug, info};
use tribes_core::{
    Environment, FeedId, Msg, MsgContent, MsgId, MsgValue, TangleEntry, content,
};

use super::{HostLog, Unboxer};
use crate::error::LogError;

#[derive(Default)]
struct LogState {
    /// Every stored message, in arrival order
    messages: Vec<Msg>,
    index: HashMap<MsgId, usize>,
    /// Plain or decrypted content, keyed by message id
    readable: HashMap<MsgId, Value>,
    /// Latest (sequence, id) per feed
    feeds: HashMap<FeedId, (u64, MsgId)>,
}

/// In-memory host log for tests, simulation and the demo binary.
///
/// Message ids are the SHA-256 of the JSON-encoded message value. Content is
/// indexed once readable: plain content immediately, encrypted content when
/// an unboxer opens it, either on arrival or during a rebuild.
pub struct MemoryLog<E> {
    feed: FeedId,
    env: E,
    state: Mutex<LogState>,
    unboxers: RwLock<Vec<Arc<dyn Unboxer>>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Msg>>>,
    rebuilds: AtomicUsize,
}

impl<E: Environment> MemoryLog<E> {
    /// Empty log whose local feed is `feed`.
    pub fn new(feed: FeedId, env: E) -> Self {
        Self {
            feed,
            env,
            state: Mutex::new(LogState::default()),
            unboxers: RwLock::new(Vec::new()),
            subscribers: Mutex::new(Vec::new()),
            rebuilds: AtomicUsize::new(0),
        }
    }

    /// Number of completed rebuilds.
    pub fn rebuild_count(&self) -> usize {
        self.rebuilds.load(Ordering::SeqCst)
    }

    /// Every stored message in arrival order, content as written.
    pub fn messages(&self) -> Vec<Msg> {
        self.state().messages.clone()
    }

    /// Indexed content of a message, if readable.
    pub fn readable_content(&self, id: &MsgId) -> Option<Value> {
        self.state().readable.get(id).cloned()
    }

    fn state(&self) -> MutexGuard<'_, LogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `msg` if it extends its feed. Returns `false` for duplicates.
    fn insert(&self, msg: &Msg) -> Result<bool, LogError> {
        let mut state = self.state();
        if state.index.contains_key(&msg.key) {
            return Ok(false);
        }

        let author = msg.value.author;
        let (expected_sequence, expected_previous) = match state.feeds.get(&author) {
            Some((sequence, id)) => (sequence + 1, Some(*id)),
            None => (1, None),
        };
        if msg.value.previous != expected_previous {
            return Err(LogError::Conflict {
                feed: author,
                expected: expected_previous,
                got: msg.value.previous,
            });
        }
        if msg.value.sequence != expected_sequence {
            return Err(LogError::InvalidMessage {
                id: msg.key,
                reason: format!(
                    "sequence {} does not follow {}",
                    msg.value.sequence,
                    expected_sequence - 1
                ),
            });
        }

        let position = state.messages.len();
        state.messages.push(msg.clone());
        state.index.insert(msg.key, position);
        state.feeds.insert(author, (msg.value.sequence, msg.key));
        Ok(true)
    }

    async fn read(&self, msg: &Msg) -> Option<Value> {
        if let MsgContent::Plain(value) = &msg.value.content {
            return Some(value.clone());
        }

        let unboxers: Vec<Arc<dyn Unboxer>> =
            self.unboxers.read().unwrap_or_else(PoisonError::into_inner).clone();
        for unboxer in unboxers {
            if let Some(value) = unboxer.unbox(msg).await {
                return Some(value);
            }
        }
        None
    }

    async fn ingest(&self, msg: &Msg) -> Result<(), LogError> {
        if !self.insert(msg)? {
            return Ok(());
        }

        match self.read(msg).await {
            Some(value) => {
                self.state().readable.insert(msg.key, value.clone());
                debug!(id = %msg.key, author = %msg.value.author, "message indexed");
                self.notify(&[with_content(msg, value)]);
            },
            None => debug!(id = %msg.key, "message stored unreadable"),
        }
        Ok(())
    }

    fn notify(&self, msgs: &[Msg]) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| msgs.iter().all(|msg| tx.send(msg.clone()).is_ok()));
    }
}

#[async_trait]
impl<E: Environment> HostLog for MemoryLog<E> {
    fn local_feed(&self) -> FeedId {
        self.feed
    }

    async fn latest(&self) -> Result<Option<MsgId>, LogError> {
        Ok(self.state().feeds.get(&self.feed).map(|(_, id)| *id))
    }

    async fn append(&self, content: MsgContent, previous: Option<MsgId>) -> Result<Msg, LogError> {
        let sequence = {
            let state = self.state();
            let latest = state.feeds.get(&self.feed).copied();
            if latest.map(|(_, id)| id) != previous {
                return Err(LogError::Conflict {
                    feed: self.feed,
                    expected: latest.map(|(_, id)| id),
                    got: previous,
                });
            }
            latest.map_or(1, |(sequence, _)| sequence + 1)
        };

        let value = MsgValue {
            previous,
            sequence,
            author: self.feed,
            timestamp: self.env.wall_clock_millis(),
            content,
        };
        let msg = Msg { key: message_id(&value)?, value };

        self.ingest(&msg).await?;
        Ok(msg)
    }

    async fn add(&self, msg: Msg) -> Result<(), LogError> {
        let id = message_id(&msg.value)?;
        if id != msg.key {
            return Err(LogError::InvalidMessage {
                id: msg.key,
                reason: "id does not match content hash".to_string(),
            });
        }
        self.ingest(&msg).await
    }

    async fn get(&self, id: &MsgId) -> Result<Option<Msg>, LogError> {
        let state = self.state();
        Ok(state.index.get(id).map(|&position| state.messages[position].clone()))
    }

    async fn query_tangle(&self, root: &MsgId, tangle: &str) -> Result<Vec<TangleEntry>, LogError> {
        let state = self.state();
        let entries = state
            .messages
            .iter()
            .filter_map(|msg| {
                let update = content::tangle(state.readable.get(&msg.key)?, tangle)?;
                if update.root.as_ref() != Some(root) {
                    return None;
                }
                TangleEntry::from_update(msg.key, &update)
            })
            .collect();
        Ok(entries)
    }

    async fn query_type(&self, content_type: &str) -> Result<Vec<(Msg, Value)>, LogError> {
        let state = self.state();
        let matches = state
            .messages
            .iter()
            .filter_map(|msg| {
                let value = state.readable.get(&msg.key)?;
                (content::content_type(value) == Some(content_type))
                    .then(|| (msg.clone(), value.clone()))
            })
            .collect();
        Ok(matches)
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<Msg> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner).push(tx);
        rx
    }

    fn add_unboxer(&self, unboxer: Arc<dyn Unboxer>) {
        self.unboxers.write().unwrap_or_else(PoisonError::into_inner).push(unboxer);
    }

    async fn rebuild(&self) -> Result<(), LogError> {
        let messages = self.messages();
        let mut replay = Vec::new();

        for msg in &messages {
            if let Some(value) = self.read(msg).await {
                replay.push(with_content(msg, value));
            }
        }

        {
            let mut state = self.state();
            for msg in &replay {
                if let Some(value) = msg.value.content.plain() {
                    state.readable.insert(msg.key, value.clone());
                }
            }
        }

        let count = self.rebuilds.fetch_add(1, Ordering::SeqCst) + 1;
        info!(readable = replay.len(), total = messages.len(), rebuild = count, "log rebuilt");

        self.notify(&replay);
        Ok(())
    }
}

/// Content-addressed id of a message value.
pub fn message_id(value: &MsgValue) -> Result<MsgId, LogError> {
    let bytes = serde_json::to_vec(value).map_err(|e| LogError::Encode(e.to_string()))?;
    Ok(MsgId::from_hash(Sha256::digest(&bytes).into()))
}

fn with_content(msg: &Msg, value: Value) -> Msg {
    let mut readable = msg.clone();
    readable.value.content = MsgContent::Plain(value);
    readable
}
