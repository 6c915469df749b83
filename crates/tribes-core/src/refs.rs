//! Reference types for feeds, messages and groups.
//!
//! Each reference has two encodings:
//!
//! - Sigil string: `@<base64>.ed25519`, `%<base64>.sha256`, `%<base64>.cloaked`
//! - TFK bytes: `[type: 1][format: 1][key: 32]`, used inside cryptographic
//!   contexts where a canonical binary form is needed

use std::{fmt, str::FromStr};

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Size of a TFK-encoded reference.
pub const TFK_SIZE: usize = 34;

const TYPE_FEED: u8 = 0;
const TYPE_MSG: u8 = 1;
const FORMAT_CLASSIC: u8 = 0;
const FORMAT_CLOAKED: u8 = 2;

/// Errors from parsing references.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RefError {
    /// Sigil string does not have the expected shape
    #[error("malformed {kind} reference: {value}")]
    Malformed {
        /// Reference kind that was expected
        kind: &'static str,
        /// Offending input
        value: String,
    },

    /// TFK bytes do not have the expected shape
    #[error("invalid {kind} TFK: {reason}")]
    InvalidTfk {
        /// Reference kind that was expected
        kind: &'static str,
        /// What was wrong
        reason: String,
    },
}

fn encode_sigil(sigil: char, bytes: &[u8; 32], suffix: &str) -> String {
    format!("{sigil}{}{suffix}", STANDARD.encode(bytes))
}

fn decode_sigil(
    input: &str,
    sigil: char,
    suffix: &str,
    kind: &'static str,
) -> Result<[u8; 32], RefError> {
    let malformed = || RefError::Malformed { kind, value: input.to_string() };

    let body = input
        .strip_prefix(sigil)
        .and_then(|rest| rest.strip_suffix(suffix))
        .ok_or_else(malformed)?;
    let decoded = STANDARD.decode(body).map_err(|_| malformed())?;
    decoded.try_into().map_err(|_| malformed())
}

fn encode_tfk(type_byte: u8, format: u8, bytes: &[u8; 32]) -> [u8; TFK_SIZE] {
    let mut tfk = [0u8; TFK_SIZE];
    tfk[0] = type_byte;
    tfk[1] = format;
    tfk[2..].copy_from_slice(bytes);
    tfk
}

fn decode_tfk(
    input: &[u8],
    type_byte: u8,
    format: u8,
    kind: &'static str,
) -> Result<[u8; 32], RefError> {
    if input.len() != TFK_SIZE {
        return Err(RefError::InvalidTfk {
            kind,
            reason: format!("expected {TFK_SIZE} bytes, got {}", input.len()),
        });
    }
    if input[0] != type_byte || input[1] != format {
        return Err(RefError::InvalidTfk {
            kind,
            reason: format!("unexpected type/format {}/{}", input[0], input[1]),
        });
    }
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&input[2..]);
    Ok(bytes)
}

/// Identity of an author: the Ed25519 public key of their feed.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FeedId([u8; 32]);

impl FeedId {
    /// Wrap an Ed25519 public key.
    pub fn from_public_key(public_key: [u8; 32]) -> Self {
        Self(public_key)
    }

    /// Raw Ed25519 public key.
    pub fn public_key(&self) -> &[u8; 32] {
        &self.0
    }

    /// TFK encoding.
    pub fn to_tfk(&self) -> [u8; TFK_SIZE] {
        encode_tfk(TYPE_FEED, FORMAT_CLASSIC, &self.0)
    }

    /// Parse a TFK encoding.
    pub fn from_tfk(bytes: &[u8]) -> Result<Self, RefError> {
        decode_tfk(bytes, TYPE_FEED, FORMAT_CLASSIC, "feed").map(Self)
    }
}

impl fmt::Display for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode_sigil('@', &self.0, ".ed25519"))
    }
}

impl fmt::Debug for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FeedId({self})")
    }
}

impl FromStr for FeedId {
    type Err = RefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_sigil(s, '@', ".ed25519", "feed").map(Self)
    }
}

impl TryFrom<String> for FeedId {
    type Error = RefError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FeedId> for String {
    fn from(id: FeedId) -> Self {
        id.to_string()
    }
}

/// Content-addressed id of a message on the log.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MsgId([u8; 32]);

impl MsgId {
    /// TFK of the "no previous message" placeholder.
    pub const NULL_TFK: [u8; TFK_SIZE] = {
        let mut tfk = [0u8; TFK_SIZE];
        tfk[0] = TYPE_MSG;
        tfk
    };

    /// Wrap a message hash.
    pub fn from_hash(hash: [u8; 32]) -> Self {
        Self(hash)
    }

    /// Raw message hash.
    pub fn hash(&self) -> &[u8; 32] {
        &self.0
    }

    /// TFK encoding.
    pub fn to_tfk(&self) -> [u8; TFK_SIZE] {
        encode_tfk(TYPE_MSG, FORMAT_CLASSIC, &self.0)
    }

    /// Parse a TFK encoding.
    pub fn from_tfk(bytes: &[u8]) -> Result<Self, RefError> {
        decode_tfk(bytes, TYPE_MSG, FORMAT_CLASSIC, "message").map(Self)
    }

    /// TFK of an optional previous message, using [`Self::NULL_TFK`] for the
    /// first message of a feed.
    pub fn previous_tfk(previous: Option<&Self>) -> [u8; TFK_SIZE] {
        previous.map_or(Self::NULL_TFK, Self::to_tfk)
    }
}

impl fmt::Display for MsgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode_sigil('%', &self.0, ".sha256"))
    }
}

impl fmt::Debug for MsgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MsgId({self})")
    }
}

impl FromStr for MsgId {
    type Err = RefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_sigil(s, '%', ".sha256", "message").map(Self)
    }
}

impl TryFrom<String> for MsgId {
    type Error = RefError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MsgId> for String {
    fn from(id: MsgId) -> Self {
        id.to_string()
    }
}

/// Cloaked group identifier.
///
/// Derived from the group's root message and key; see
/// [`tribes_crypto::cloak_group_id`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GroupId([u8; 32]);

impl GroupId {
    /// Wrap cloaked id bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Compute the cloaked id for a root message and key.
    pub fn cloak(root: &MsgId, key: &tribes_crypto::SymmetricKey) -> Self {
        Self(tribes_crypto::cloak_group_id(&root.to_tfk(), key))
    }

    /// Raw id bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// TFK encoding.
    pub fn to_tfk(&self) -> [u8; TFK_SIZE] {
        encode_tfk(TYPE_MSG, FORMAT_CLOAKED, &self.0)
    }

    /// Parse a TFK encoding.
    pub fn from_tfk(bytes: &[u8]) -> Result<Self, RefError> {
        decode_tfk(bytes, TYPE_MSG, FORMAT_CLOAKED, "group").map(Self)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode_sigil('%', &self.0, ".cloaked"))
    }
}

impl fmt::Debug for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GroupId({self})")
    }
}

impl FromStr for GroupId {
    type Err = RefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_sigil(s, '%', ".cloaked", "group").map(Self)
    }
}

impl TryFrom<String> for GroupId {
    type Error = RefError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<GroupId> for String {
    fn from(id: GroupId) -> Self {
        id.to_string()
    }
}

/// Entry of a message's `recps` list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Recipient {
    /// Everyone holding the group key
    Group(GroupId),
    /// A single feed, reached through a pair key
    Feed(FeedId),
}

impl Recipient {
    /// The group, if this recipient is one.
    pub fn as_group(&self) -> Option<&GroupId> {
        match self {
            Self::Group(id) => Some(id),
            Self::Feed(_) => None,
        }
    }

    /// The feed, if this recipient is one.
    pub fn as_feed(&self) -> Option<&FeedId> {
        match self {
            Self::Feed(id) => Some(id),
            Self::Group(_) => None,
        }
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Group(id) => id.fmt(f),
            Self::Feed(id) => id.fmt(f),
        }
    }
}

impl FromStr for Recipient {
    type Err = RefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with('@') {
            s.parse().map(Self::Feed)
        } else if s.ends_with(".cloaked") {
            s.parse().map(Self::Group)
        } else {
            Err(RefError::Malformed { kind: "recipient", value: s.to_string() })
        }
    }
}

impl TryFrom<String> for Recipient {
    type Error = RefError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Recipient> for String {
    fn from(recipient: Recipient) -> Self {
        recipient.to_string()
    }
}

impl From<GroupId> for Recipient {
    fn from(id: GroupId) -> Self {
        Self::Group(id)
    }
}

impl From<FeedId> for Recipient {
    fn from(id: FeedId) -> Self {
        Self::Feed(id)
    }
}
