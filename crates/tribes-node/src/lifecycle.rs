//! Group lifecycle: creating groups, inviting members and reacting to
//! membership changes seen on the log.
//!
//! [`Tribes`] ties the pieces together for one local identity:
//!
//! ```text
//!   create ──► group/init (sealed to new key) ──► KeyStore: group + self
//!   invite ──► group/add-member (group key + pair keys of invitees)
//!   create_link ──► link/feed-group (sealed to the group)
//!
//!   HostLog ──subscribe──► listen ──► handle_message
//!                                       │
//!                                       └─ add-member ──► KeyStore ──► rebuild?
//! ```
//!
//! Replicated content is untrusted. A malformed add-member comes back as a
//! [`TribesError`]; the listen loop logs it and moves on.

use std::{iter, sync::Arc};

use serde_json::Value;
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};
use tribes_core::{
    AddMember, AddMemberTangles, ContentError, Environment, FeedGroupLink, FeedId, GROUP_TANGLE,
    GroupContent, GroupId, GroupInit, GroupKeyInfo, MEMBERS_TANGLE, Msg, MsgContent, MsgId,
    Recipient,
    content::{self, ADD_MEMBER_TYPE, FEED_GROUP_LINK_TYPE},
};
use tribes_crypto::SymmetricKey;

use crate::{
    codec::EnvelopeCodec,
    config::NodeConfig,
    error::{KeyStoreError, TribesError},
    identity::Identity,
    key_store::KeyStore,
    log::HostLog,
    storage::Storage,
    tangle::GroupTangle,
};

/// A group this node just founded.
#[derive(Debug, Clone)]
pub struct CreatedGroup {
    /// Cloaked id of the group
    pub group_id: GroupId,
    /// Group key; hand it out only through invites
    pub group_key: SymmetricKey,
    /// The `group/init` message as appended
    pub root: Msg,
}

/// A group a feed linked itself to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupLink {
    /// Linked group
    pub group_id: GroupId,
    /// Name given in the link, if any
    pub name: Option<String>,
    /// The `link/feed-group` message
    pub link: MsgId,
}

/// What handling one log message did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Content could not be decrypted with any held key
    NotForUs,
    /// Readable, but not a membership change
    Ignored,
    /// An add-member was applied to the key store
    Applied {
        /// Group the members were added to
        group_id: GroupId,
        /// Authors recorded as members for the first time
        new_authors: Vec<FeedId>,
        /// Whether the host log was asked to rebuild
        rebuild_triggered: bool,
    },
}

/// Private groups for one local identity on top of a host log.
pub struct Tribes<S, E> {
    identity: Arc<Identity>,
    keys: KeyStore<S, E>,
    codec: Arc<EnvelopeCodec<S, E>>,
    tangle: GroupTangle<S, E>,
    log: Arc<dyn HostLog>,
    env: E,
    config: NodeConfig,
    /// Serializes read-latest then append on the local feed
    append_lock: Mutex<()>,
}

impl<S: Storage, E: Environment> Tribes<S, E> {
    /// Open the key store and hook the envelope codec into `log`.
    ///
    /// Must be called inside a Tokio runtime. Does not start listening; see
    /// [`Tribes::spawn_listener`].
    pub fn start(
        identity: Identity,
        storage: S,
        log: Arc<dyn HostLog>,
        env: E,
        config: NodeConfig,
    ) -> Self {
        if log.local_feed() != identity.feed_id() {
            warn!(
                identity = %identity.feed_id(),
                log = %log.local_feed(),
                "host log appends to a different feed than the local identity"
            );
        }

        let identity = Arc::new(identity);
        let keys = KeyStore::open(storage, env.clone());
        let codec = Arc::new(EnvelopeCodec::new(
            Arc::clone(&identity),
            keys.clone(),
            env.clone(),
            config.effective_max_recipients(),
        ));
        log.add_unboxer(codec.clone());
        let tangle = GroupTangle::new(keys.clone(), Arc::clone(&log));

        info!(feed = %identity.feed_id(), "tribes started");
        Self { identity, keys, codec, tangle, log, env, config, append_lock: Mutex::new(()) }
    }

    /// Feed id of the local identity.
    pub fn feed_id(&self) -> FeedId {
        self.identity.feed_id()
    }

    /// Underlying key store.
    pub fn keys(&self) -> &KeyStore<S, E> {
        &self.keys
    }

    /// Envelope codec registered with the host log.
    pub fn codec(&self) -> &EnvelopeCodec<S, E> {
        &self.codec
    }

    /// Register a group key learned out of band.
    pub async fn register(
        &self,
        group_id: GroupId,
        key: &[u8],
        root: MsgId,
    ) -> Result<(), TribesError> {
        Ok(self.keys.add_group(group_id, key, root).await?)
    }

    /// Record `authors` as members of a known group.
    ///
    /// Returns the authors that were not members before.
    pub async fn register_authors(
        &self,
        group_id: GroupId,
        authors: &[FeedId],
    ) -> Result<Vec<FeedId>, TribesError> {
        self.known_group(&group_id).await?;

        let mut added = Vec::new();
        for author in authors {
            if self.keys.add_membership(group_id, *author).await? {
                added.push(*author);
            }
        }
        Ok(added)
    }

    /// Found a new group with the local identity as its only member.
    ///
    /// Appends a `group/init` sealed to a fresh key. The group id is the
    /// cloak of that message's id under the key.
    pub async fn create(&self) -> Result<CreatedGroup, TribesError> {
        self.keys.ready().await?;

        let group_key = self.env.random_key();
        let init = GroupInit::new().to_content()?;
        let plaintext =
            serde_json::to_vec(&init).map_err(|e| ContentError::Encode(e.to_string()))?;

        let root = {
            let _guard = self.append_lock.lock().await;
            let previous = self.log.latest().await?;
            let sealed =
                self.codec.seal_with_keys(&plaintext, &[&group_key], previous.as_ref()).await?;
            self.log.append(MsgContent::boxed(&sealed.to_bytes()), previous).await?
        };

        let group_id = GroupId::cloak(&root.key, &group_key);
        let registered = self.register_created(group_id, &group_key, root.key).await;
        if let Err(source) = registered {
            warn!(%group_id, root = %root.key, error = %source, "group published but not registered");
            return Err(TribesError::Unregistered { group_id, group_key, root: root.key, source });
        }

        info!(%group_id, root = %root.key, "group created");
        Ok(CreatedGroup { group_id, group_key, root })
    }

    /// Store the key of a group this node founded and record the local
    /// identity as its member.
    ///
    /// [`Tribes::create`] calls this after appending the root. After a
    /// [`TribesError::Unregistered`], call it again with the returned key
    /// material; records already committed are not written twice.
    pub async fn register_created(
        &self,
        group_id: GroupId,
        group_key: &SymmetricKey,
        root: MsgId,
    ) -> Result<(), KeyStoreError> {
        self.keys.add_group_info(group_id, GroupKeyInfo::new(group_key.clone(), root)).await?;
        self.keys.add_membership(group_id, self.feed_id()).await?;
        Ok(())
    }

    /// Add `feeds` to a group by publishing a `group/add-member`.
    ///
    /// The message is readable by current members through the group key and
    /// by each invitee through its pair key with the local identity.
    pub async fn invite(
        &self,
        group_id: GroupId,
        feeds: &[FeedId],
        text: Option<String>,
    ) -> Result<Msg, TribesError> {
        let info = self.known_group(&group_id).await?;

        let tangles = AddMemberTangles {
            group: self.tangle.resolve(&group_id, GROUP_TANGLE).await?,
            members: self.tangle.resolve(&group_id, MEMBERS_TANGLE).await?,
        };
        let recps = iter::once(Recipient::Group(group_id))
            .chain(feeds.iter().copied().map(Recipient::Feed))
            .collect();

        let add = AddMember::new(&info.key, info.root, recps, text, tangles);
        add.validate()?;

        let msg = self.append_private(&add.to_content()?).await?;
        info!(%group_id, invited = feeds.len(), id = %msg.key, "members invited");
        Ok(msg)
    }

    /// Append content to the local feed.
    ///
    /// Content with `recps` is sealed. If the first recipient is a group,
    /// `tangles.group` is set to the group's current frontier first; when the
    /// frontier cannot be computed nothing is appended.
    pub async fn publish(&self, mut content: Value) -> Result<Msg, TribesError> {
        let Some(recps) = content::recipients(&content)? else {
            let _guard = self.append_lock.lock().await;
            let previous = self.log.latest().await?;
            return Ok(self.log.append(MsgContent::Plain(content), previous).await?);
        };

        if let Some(group_id) = recps.first().and_then(Recipient::as_group) {
            let update = self.tangle.resolve(group_id, GROUP_TANGLE).await?;
            content::set_tangle(&mut content, GROUP_TANGLE, &update)?;
        }

        self.append_private(&content).await
    }

    async fn append_private(&self, content: &Value) -> Result<Msg, TribesError> {
        let _guard = self.append_lock.lock().await;
        let previous = self.log.latest().await?;
        let boxed = self.codec.box_content(content, previous.as_ref()).await?;
        Ok(self.log.append(boxed, previous).await?)
    }

    async fn known_group(&self, group_id: &GroupId) -> Result<GroupKeyInfo, TribesError> {
        self.keys.ready().await?;
        self.keys.get_group(group_id).ok_or(TribesError::UnknownGroup(*group_id))
    }

    /// Declare to the other members that the local feed is in `group_id`.
    ///
    /// Publishes a `link/feed-group` sealed to the group, so only members
    /// can read it.
    pub async fn create_link(
        &self,
        group_id: GroupId,
        name: Option<String>,
    ) -> Result<Msg, TribesError> {
        self.known_group(&group_id).await?;

        let link = FeedGroupLink::new(self.feed_id(), group_id, name);
        let msg = self.publish(link.to_content()?).await?;
        info!(%group_id, id = %msg.key, "feed linked to group");
        Ok(msg)
    }

    /// Groups `feed` linked itself to, in log order.
    ///
    /// Only links authored by `feed` itself count, and only those this node
    /// can read, which limits the answer to groups both share.
    pub async fn find_by_feed_id(&self, feed: &FeedId) -> Result<Vec<GroupLink>, TribesError> {
        let mut links = Vec::new();
        for (msg, content) in self.log.query_type(FEED_GROUP_LINK_TYPE).await? {
            if msg.value.author != *feed {
                continue;
            }
            match FeedGroupLink::parse(&content) {
                Ok(Some(link)) if link.parent == *feed => links.push(GroupLink {
                    group_id: link.child,
                    name: link.name,
                    link: msg.key,
                }),
                Ok(_) => debug!(id = %msg.key, "link parent is not its author"),
                Err(e) => debug!(id = %msg.key, error = %e, "skipping malformed link"),
            }
        }
        Ok(links)
    }

    /// Groups `feed` is recorded as a member of in the key store.
    pub fn member_groups(&self, feed: &FeedId) -> Vec<GroupId> {
        self.keys.author_groups(feed)
    }

    /// Group whose root message is `root`.
    pub fn group_by_root(&self, root: &MsgId) -> Option<GroupId> {
        self.keys.group_by_root(root)
    }

    /// React to one message from the log.
    ///
    /// Accepts messages with decrypted content, as delivered by
    /// [`HostLog::subscribe`], or still sealed.
    pub async fn handle_message(&self, msg: &Msg) -> Result<ProcessOutcome, TribesError> {
        let content = match &msg.value.content {
            MsgContent::Plain(value) => value.clone(),
            MsgContent::Boxed(_) => match self.codec.unbox_message(msg).await? {
                Some(value) => value,
                None => return Ok(ProcessOutcome::NotForUs),
            },
        };

        match GroupContent::parse(&content)? {
            Some(GroupContent::AddMember(add)) => self.process_add_member(msg, &add).await,
            Some(GroupContent::Init(_)) | None => Ok(ProcessOutcome::Ignored),
        }
    }

    /// Apply a decrypted add-member authored by `msg`'s author.
    ///
    /// Registers the group if it is new, then every author not yet recorded
    /// as a member: the message author and each feed in `recps`. New members
    /// trigger a host log rebuild when configured; a failed rebuild is logged
    /// and does not fail the call.
    ///
    /// # Errors
    ///
    /// - `UnknownRoot` if the log does not hold `initialMsg`
    /// - `GroupIdMismatch` if the first recipient is not the cloak of
    ///   `initialMsg` under `groupKey`
    /// - `KeyStore(Conflict)` if the group is known with another key
    pub async fn process_add_member(
        &self,
        msg: &Msg,
        add: &AddMember,
    ) -> Result<ProcessOutcome, TribesError> {
        self.keys.ready().await?;
        add.validate()?;

        let key = add.group_key()?;
        let claimed = add.recps.first().and_then(Recipient::as_group).copied().ok_or_else(|| {
            ContentError::Malformed {
                kind: ADD_MEMBER_TYPE,
                reason: "first recipient must be the group".to_string(),
            }
        })?;

        if self.log.get(&add.initial_msg).await?.is_none() {
            return Err(TribesError::UnknownRoot(add.initial_msg));
        }

        let derived = GroupId::cloak(&add.initial_msg, &key);
        if derived != claimed {
            return Err(TribesError::GroupIdMismatch { claimed, derived });
        }

        self.keys.add_group_info(claimed, GroupKeyInfo::new(key, add.initial_msg)).await?;

        let mut new_authors = Vec::new();
        for author in iter::once(msg.value.author).chain(add.feed_recipients().copied()) {
            if self.keys.add_membership(claimed, author).await? {
                new_authors.push(author);
            }
        }

        let rebuild_triggered = !new_authors.is_empty() && self.config.rebuild_on_new_members;
        if rebuild_triggered {
            info!(group_id = %claimed, new_authors = new_authors.len(), "new members, rebuilding");
            if let Err(e) = self.log.rebuild().await {
                warn!(group_id = %claimed, error = %e, "rebuild failed");
            }
        } else {
            debug!(group_id = %claimed, id = %msg.key, "add-member already applied");
        }

        Ok(ProcessOutcome::Applied { group_id: claimed, new_authors, rebuild_triggered })
    }

    /// Handle messages from `rx` until the channel closes.
    ///
    /// Errors never stop the loop. Protocol violations from peers are logged
    /// at `warn`, local faults at `error`.
    pub async fn listen(&self, mut rx: mpsc::UnboundedReceiver<Msg>) {
        while let Some(msg) = rx.recv().await {
            match self.handle_message(&msg).await {
                Ok(ProcessOutcome::Applied { group_id, new_authors, .. }) => {
                    debug!(%group_id, id = %msg.key, new = new_authors.len(), "add-member applied");
                },
                Ok(_) => {},
                Err(e) if e.is_protocol_violation() => {
                    warn!(id = %msg.key, author = %msg.value.author, error = %e, "skipping message");
                },
                Err(e) => {
                    error!(id = %msg.key, error = %e, "failed to handle message");
                },
            }
        }
        debug!("listener stopped");
    }

    /// Subscribe to the host log and run [`Tribes::listen`] on a task.
    pub fn spawn_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let rx = self.log.subscribe();
        let tribes = Arc::clone(self);
        tokio::spawn(async move { tribes.listen(rx).await })
    }

    /// Close the key store. Cached lookups keep answering.
    pub async fn close(&self) -> Result<(), TribesError> {
        self.keys.close().await?;
        info!(feed = %self.feed_id(), "tribes closed");
        Ok(())
    }
}
