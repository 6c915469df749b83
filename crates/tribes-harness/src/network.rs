//! A handful of nodes sharing messages by explicit replication.
//!
//! Each node has its own identity, in-memory log and key store. Nothing moves
//! between nodes until a test calls [`TestNetwork::replicate`], and nothing
//! is processed until it calls [`TestNetwork::process`], so every
//! interleaving is chosen by the test.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::warn;
use tribes_core::{Environment, FeedId, Msg};
use tribes_node::{
    HostLog, Identity, MemoryLog, MemoryStorage, NodeConfig, ProcessOutcome, Tribes, TribesError,
};

use crate::SimEnv;

/// One simulated participant.
pub struct SimNode {
    /// Group API of the node
    pub tribes: Arc<Tribes<MemoryStorage, SimEnv>>,
    /// Host log of the node
    pub log: Arc<MemoryLog<SimEnv>>,
    /// Key store backend, for inspecting persisted records
    pub storage: MemoryStorage,
    inbox: mpsc::UnboundedReceiver<Msg>,
}

impl SimNode {
    /// Node with a fresh identity drawn from `env`.
    pub fn new(env: &SimEnv, config: NodeConfig) -> Self {
        let identity = Identity::from_seed(env.random_array());
        let log = Arc::new(MemoryLog::new(identity.feed_id(), env.clone()));
        let inbox = log.subscribe();
        let storage = MemoryStorage::new();
        let tribes = Arc::new(Tribes::start(
            identity,
            storage.clone(),
            log.clone(),
            env.clone(),
            config,
        ));
        Self { tribes, log, storage, inbox }
    }

    /// Feed id of the node's identity.
    pub fn feed(&self) -> FeedId {
        self.tribes.feed_id()
    }

    /// Handle every message delivered so far, including replays from
    /// rebuilds triggered along the way.
    pub async fn process(&mut self) -> Vec<Result<ProcessOutcome, TribesError>> {
        let mut results = Vec::new();
        while let Ok(msg) = self.inbox.try_recv() {
            let result = self.tribes.handle_message(&msg).await;
            if let Err(e) = &result {
                warn!(id = %msg.key, error = %e, "simulated node rejected message");
            }
            results.push(result);
        }
        results
    }
}

/// Nodes plus the replication operations between them.
pub struct TestNetwork {
    /// Environment shared by all nodes
    pub env: SimEnv,
    /// Participants, addressed by index
    pub nodes: Vec<SimNode>,
}

impl TestNetwork {
    /// `count` nodes with the default configuration.
    pub fn new(seed: u64, count: usize) -> Self {
        Self::with_config(seed, count, &NodeConfig::default())
    }

    /// `count` nodes sharing `config`.
    pub fn with_config(seed: u64, count: usize, config: &NodeConfig) -> Self {
        let env = SimEnv::with_seed(seed);
        let nodes = (0..count).map(|_| SimNode::new(&env, config.clone())).collect();
        Self { env, nodes }
    }

    /// Node at `index`.
    pub fn node(&self, index: usize) -> &SimNode {
        &self.nodes[index]
    }

    /// Copy every message `from` holds into the log of `to`.
    ///
    /// Messages keep their original order, so feeds stay contiguous.
    pub async fn replicate(&self, from: usize, to: usize) -> Result<usize, TribesError> {
        let messages = self.nodes[from].log.messages();
        let count = messages.len();
        for msg in messages {
            self.nodes[to].log.add(msg).await?;
        }
        Ok(count)
    }

    /// Copy only the messages `from` authored into the log of `to`.
    pub async fn replicate_feed(&self, from: usize, to: usize) -> Result<usize, TribesError> {
        let feed = self.nodes[from].feed();
        let messages: Vec<Msg> =
            self.nodes[from].log.messages().into_iter().filter(|m| m.value.author == feed).collect();
        let count = messages.len();
        for msg in messages {
            self.nodes[to].log.add(msg).await?;
        }
        Ok(count)
    }

    /// Replicate between every ordered pair of nodes.
    pub async fn sync_all(&self) -> Result<(), TribesError> {
        for from in 0..self.nodes.len() {
            for to in 0..self.nodes.len() {
                if from != to {
                    self.replicate(from, to).await?;
                }
            }
        }
        Ok(())
    }

    /// Let node `index` handle everything delivered to it.
    pub async fn process(&mut self, index: usize) -> Vec<Result<ProcessOutcome, TribesError>> {
        self.nodes[index].process().await
    }

    /// Let every node handle everything delivered to it.
    pub async fn process_all(&mut self) -> Vec<Result<ProcessOutcome, TribesError>> {
        let mut results = Vec::new();
        for node in &mut self.nodes {
            results.extend(node.process().await);
        }
        results
    }
}
