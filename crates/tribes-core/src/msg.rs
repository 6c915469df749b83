//! Messages as they appear on the host log.

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::refs::{FeedId, MsgId};

/// Suffix marking encrypted content strings.
pub const BOX_SUFFIX: &str = ".box2";

/// Content field of a message: readable JSON or an encrypted string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MsgContent {
    /// `<base64>.box2`
    Boxed(String),
    /// Public JSON content
    Plain(Value),
}

impl MsgContent {
    /// Wrap envelope bytes in the boxed string form.
    pub fn boxed(ciphertext: &[u8]) -> Self {
        Self::Boxed(format!("{}{BOX_SUFFIX}", STANDARD.encode(ciphertext)))
    }

    /// Envelope bytes, if this is well-formed boxed content.
    pub fn ciphertext(&self) -> Option<Vec<u8>> {
        match self {
            Self::Boxed(text) => STANDARD.decode(text.strip_suffix(BOX_SUFFIX)?).ok(),
            Self::Plain(_) => None,
        }
    }

    /// Plain content, if not encrypted.
    pub fn plain(&self) -> Option<&Value> {
        match self {
            Self::Plain(value) => Some(value),
            Self::Boxed(_) => None,
        }
    }

    /// Whether this is encrypted content.
    pub fn is_boxed(&self) -> bool {
        matches!(self, Self::Boxed(_))
    }
}

/// Signed part of a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsgValue {
    /// Preceding message in the author's feed
    pub previous: Option<MsgId>,
    /// Position in the author's feed, starting at 1
    pub sequence: u64,
    /// Feed that wrote the message
    pub author: FeedId,
    /// Claimed write time, milliseconds since the epoch
    pub timestamp: u64,
    /// Content
    pub content: MsgContent,
}

/// A message together with its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Msg {
    /// Content-addressed id
    pub key: MsgId,
    /// Signed body
    pub value: MsgValue,
}

impl Msg {
    /// Author of the message.
    pub fn author(&self) -> &FeedId {
        &self.value.author
    }

    /// `type` of plain content.
    pub fn content_type(&self) -> Option<&str> {
        self.value.content.plain()?.get("type")?.as_str()
    }
}
