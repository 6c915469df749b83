//! Sealing and opening message content with the keys this node holds.
//!
//! Recipients resolve to keys in two ways:
//!
//! - a group id resolves to the group key from the [`KeyStore`]
//! - a feed id resolves to the pair key between the local identity and that feed
//!
//! Opening tries group keys first (groups of the local feed and of the
//! author), then the pair key with the author. Running out of keys is the
//! normal outcome for messages addressed to someone else.

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, trace};
use tribes_core::{
    ContentError, Environment, FeedId, GroupId, Msg, MsgContent, MsgId, Recipient, content,
};
use tribes_crypto::{
    EnvelopeContext, SealedEnvelope, SymmetricKey, open_envelope, seal_envelope,
};

use crate::{
    error::CodecError, identity::Identity, key_store::KeyStore, log::Unboxer, storage::Storage,
};

/// Outcome of trying to open an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unsealed {
    /// One of the candidate keys fit
    Plaintext(Vec<u8>),
    /// No candidate key fit
    NotDecryptable,
}

/// Seals and opens content for the local identity.
pub struct EnvelopeCodec<S, E> {
    identity: Arc<Identity>,
    keys: KeyStore<S, E>,
    env: E,
    max_recipients: usize,
}

impl<S: Storage, E: Environment> EnvelopeCodec<S, E> {
    /// Codec for `identity`, resolving group keys through `keys`.
    pub fn new(identity: Arc<Identity>, keys: KeyStore<S, E>, env: E, max_recipients: usize) -> Self {
        Self { identity, keys, env, max_recipients }
    }

    /// Seal `plaintext` so any one of `recipients` can open it.
    ///
    /// `previous` is the local feed's latest message; the envelope is bound to
    /// it and to the local feed id. Waits for the key store to finish loading.
    ///
    /// # Errors
    ///
    /// - `NoRecipients` for an empty list
    /// - `TooManyRecipients` above the configured limit
    /// - `UnknownGroup` if a group recipient has no key
    /// - `Crypto` if a pair key cannot be derived
    pub async fn seal(
        &self,
        plaintext: &[u8],
        recipients: &[Recipient],
        previous: Option<&MsgId>,
    ) -> Result<SealedEnvelope, CodecError> {
        self.keys.ready().await?;

        if recipients.is_empty() {
            return Err(CodecError::NoRecipients);
        }
        if recipients.len() > self.max_recipients {
            return Err(CodecError::TooManyRecipients {
                max: self.max_recipients,
                actual: recipients.len(),
            });
        }

        let keys = recipients
            .iter()
            .map(|recipient| self.resolve(recipient))
            .collect::<Result<Vec<_>, _>>()?;
        let key_refs: Vec<&SymmetricKey> = keys.iter().collect();

        self.seal_for_keys(plaintext, &key_refs, previous)
    }

    /// Seal for explicit keys, bypassing recipient resolution.
    ///
    /// Used for the root message of a group, which is sealed before the group
    /// has an id to be addressed by.
    pub async fn seal_with_keys(
        &self,
        plaintext: &[u8],
        keys: &[&SymmetricKey],
        previous: Option<&MsgId>,
    ) -> Result<SealedEnvelope, CodecError> {
        self.keys.ready().await?;
        self.seal_for_keys(plaintext, keys, previous)
    }

    fn seal_for_keys(
        &self,
        plaintext: &[u8],
        keys: &[&SymmetricKey],
        previous: Option<&MsgId>,
    ) -> Result<SealedEnvelope, CodecError> {
        let author = self.identity.feed_id().to_tfk();
        let previous = MsgId::previous_tfk(previous);
        let context = EnvelopeContext { author: &author, previous: &previous };

        let sealed =
            seal_envelope(plaintext, keys, context, self.env.random_array(), self.env.random_array())?;
        trace!(slots = sealed.slot_count(), "sealed envelope");
        Ok(sealed)
    }

    fn resolve(&self, recipient: &Recipient) -> Result<SymmetricKey, CodecError> {
        match recipient {
            Recipient::Group(group_id) => self
                .keys
                .get_group(group_id)
                .map(|info| info.key)
                .ok_or(CodecError::UnknownGroup(*group_id)),
            Recipient::Feed(feed) => Ok(self.identity.pair_key(feed)?),
        }
    }

    /// Try every key that could open a message from `author`.
    ///
    /// Waits for the key store so a message is never reported undecryptable
    /// only because keys were still loading.
    pub async fn unseal(
        &self,
        envelope: &SealedEnvelope,
        author: &FeedId,
        previous: Option<&MsgId>,
    ) -> Result<Unsealed, CodecError> {
        self.keys.ready().await?;

        let mut group_keys: BTreeMap<GroupId, SymmetricKey> = BTreeMap::new();
        for member in [self.identity.feed_id(), *author] {
            for group_id in self.keys.author_groups(&member) {
                if let Some(info) = self.keys.get_group(&group_id) {
                    group_keys.insert(group_id, info.key);
                }
            }
        }

        let mut candidates: Vec<SymmetricKey> = group_keys.into_values().collect();
        match self.identity.pair_key(author) {
            Ok(key) => candidates.push(key),
            Err(e) => debug!(%author, error = %e, "no pair key for author"),
        }

        let author_tfk = author.to_tfk();
        let previous = MsgId::previous_tfk(previous);
        let context = EnvelopeContext { author: &author_tfk, previous: &previous };

        Ok(match open_envelope(envelope, &candidates, context) {
            Some(opened) => Unsealed::Plaintext(opened.plaintext),
            None => Unsealed::NotDecryptable,
        })
    }

    /// Seal JSON content for its own `recps`, giving the `<base64>.box2` form.
    ///
    /// # Errors
    ///
    /// `NotPrivate` if the content has no `recps`, plus any error of
    /// [`EnvelopeCodec::seal`].
    pub async fn box_content(
        &self,
        content: &Value,
        previous: Option<&MsgId>,
    ) -> Result<MsgContent, CodecError> {
        let recipients = content::recipients(content)?.ok_or(CodecError::NotPrivate)?;
        let plaintext = serde_json::to_vec(content)
            .map_err(|e| ContentError::Encode(e.to_string()))?;

        let sealed = self.seal(&plaintext, &recipients, previous).await?;
        Ok(MsgContent::boxed(&sealed.to_bytes()))
    }

    /// Open the content of a stored message.
    ///
    /// `Ok(None)` for plain messages, malformed envelopes, and envelopes no
    /// held key opens.
    pub async fn unbox_message(&self, msg: &Msg) -> Result<Option<Value>, CodecError> {
        let Some(ciphertext) = msg.value.content.ciphertext() else {
            return Ok(None);
        };
        let envelope = match SealedEnvelope::from_bytes(&ciphertext) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(id = %msg.key, error = %e, "malformed envelope");
                return Ok(None);
            },
        };

        match self.unseal(&envelope, &msg.value.author, msg.value.previous.as_ref()).await? {
            Unsealed::Plaintext(plaintext) => match serde_json::from_slice(&plaintext) {
                Ok(value) => Ok(Some(value)),
                Err(e) => {
                    debug!(id = %msg.key, error = %e, "decrypted content is not JSON");
                    Ok(None)
                },
            },
            Unsealed::NotDecryptable => {
                trace!(id = %msg.key, "not decryptable");
                Ok(None)
            },
        }
    }
}

#[async_trait]
impl<S: Storage, E: Environment> Unboxer for EnvelopeCodec<S, E> {
    async fn unbox(&self, msg: &Msg) -> Option<Value> {
        match self.unbox_message(msg).await {
            Ok(value) => value,
            Err(e) => {
                debug!(id = %msg.key, error = %e, "unbox failed");
                None
            },
        }
    }
}
