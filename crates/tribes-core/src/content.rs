//! Message content for group lifecycle events.
//!
//! Content is JSON, tagged by its `type` field. Only `group/init`,
//! `group/add-member` and `link/feed-group` are interpreted here; anything
//! else passes through as opaque application content.

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tribes_crypto::{MAX_RECIPIENTS, SymmetricKey};

use crate::{
    refs::{FeedId, GroupId, MsgId, Recipient},
    tangle::{GROUP_TANGLE, MEMBERS_TANGLE, TangleUpdate},
};

/// `type` of the message founding a group.
pub const GROUP_INIT_TYPE: &str = "group/init";

/// `type` of the message adding members to a group.
pub const ADD_MEMBER_TYPE: &str = "group/add-member";

/// Only supported add-member version.
pub const ADD_MEMBER_VERSION: &str = "v1";

/// `type` of the message linking a feed to a group it belongs to.
pub const FEED_GROUP_LINK_TYPE: &str = "link/feed-group";

/// Tangle tracking the history of one link.
pub const LINK_TANGLE: &str = "link";

/// Errors from decoding or validating content.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContentError {
    /// Content does not match the shape of its `type`
    #[error("malformed {kind} content: {reason}")]
    Malformed {
        /// Content type being decoded
        kind: &'static str,
        /// Decoder message
        reason: String,
    },

    /// Add-member version is not `v1`
    #[error("unsupported add-member version {0:?}")]
    UnsupportedVersion(String),

    /// `groupKey` is not base64 of exactly 32 bytes
    #[error("invalid group key: {reason}")]
    InvalidGroupKey {
        /// What was wrong
        reason: String,
    },

    /// `recps` is present but empty
    #[error("recipient list is empty")]
    EmptyRecipients,

    /// `recps` exceeds the envelope slot limit
    #[error("too many recipients: {actual} (max {max})")]
    TooManyRecipients {
        /// Slot limit
        max: usize,
        /// Number given
        actual: usize,
    },

    /// A required tangle is absent or lacks `root`/`previous`
    #[error("missing or incomplete {name} tangle")]
    MissingTangle {
        /// Tangle name
        name: &'static str,
    },

    /// Content could not be encoded
    #[error("failed to encode content: {0}")]
    Encode(String),
}

/// Tangles carried by `group/init`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitTangles {
    /// Group tangle, always the origin value
    pub group: TangleUpdate,
}

/// Content of the root message of a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInit {
    /// Tangle fields
    pub tangles: InitTangles,
}

impl GroupInit {
    /// Content for a new group.
    pub fn new() -> Self {
        Self { tangles: InitTangles { group: TangleUpdate::origin() } }
    }

    /// Encode as JSON content including the `type` tag.
    pub fn to_content(&self) -> Result<Value, ContentError> {
        GroupContent::Init(self.clone()).to_content()
    }

    fn validate(&self) -> Result<(), ContentError> {
        if self.tangles.group != TangleUpdate::origin() {
            return Err(ContentError::Malformed {
                kind: GROUP_INIT_TYPE,
                reason: "group tangle of a root message must be null".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for GroupInit {
    fn default() -> Self {
        Self::new()
    }
}

/// Tangles carried by `group/add-member`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddMemberTangles {
    /// All group activity
    pub group: TangleUpdate,
    /// Membership changes only
    pub members: TangleUpdate,
}

/// Content entrusting the group key to new members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMember {
    /// Content version, always `v1`
    pub version: String,
    /// Base64 group key
    pub group_key: String,
    /// Root message of the group
    pub initial_msg: MsgId,
    /// Optional greeting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Group id first, then the feeds being added
    pub recps: Vec<Recipient>,
    /// Tangle fields
    pub tangles: AddMemberTangles,
}

impl AddMember {
    /// Content adding `recps` to the group rooted at `root`.
    pub fn new(
        group_key: &SymmetricKey,
        root: MsgId,
        recps: Vec<Recipient>,
        text: Option<String>,
        tangles: AddMemberTangles,
    ) -> Self {
        Self {
            version: ADD_MEMBER_VERSION.to_string(),
            group_key: STANDARD.encode(group_key.as_bytes()),
            initial_msg: root,
            text,
            recps,
            tangles,
        }
    }

    /// Decoded group key.
    pub fn group_key(&self) -> Result<SymmetricKey, ContentError> {
        let bytes = STANDARD
            .decode(&self.group_key)
            .map_err(|e| ContentError::InvalidGroupKey { reason: e.to_string() })?;
        SymmetricKey::from_slice(&bytes)
            .map_err(|e| ContentError::InvalidGroupKey { reason: e.to_string() })
    }

    /// Feeds named in `recps`.
    pub fn feed_recipients(&self) -> impl Iterator<Item = &FeedId> {
        self.recps.iter().filter_map(Recipient::as_feed)
    }

    /// Encode as JSON content including the `type` tag.
    pub fn to_content(&self) -> Result<Value, ContentError> {
        GroupContent::AddMember(self.clone()).to_content()
    }

    /// Check everything serde cannot express.
    pub fn validate(&self) -> Result<(), ContentError> {
        if self.version != ADD_MEMBER_VERSION {
            return Err(ContentError::UnsupportedVersion(self.version.clone()));
        }
        self.group_key()?;
        check_recipient_count(self.recps.len())?;
        if !self.tangles.group.is_complete() {
            return Err(ContentError::MissingTangle { name: GROUP_TANGLE });
        }
        if !self.tangles.members.is_complete() {
            return Err(ContentError::MissingTangle { name: MEMBERS_TANGLE });
        }
        Ok(())
    }
}

/// Group lifecycle content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GroupContent {
    /// Root of a new group
    #[serde(rename = "group/init")]
    Init(GroupInit),
    /// Key handed to new members
    #[serde(rename = "group/add-member")]
    AddMember(AddMember),
}

impl GroupContent {
    /// Interpret JSON content.
    ///
    /// Returns `Ok(None)` for content of any other type, and an error for
    /// content claiming a group type but failing to decode or validate.
    pub fn parse(content: &Value) -> Result<Option<Self>, ContentError> {
        let kind = match content_type(content) {
            Some(GROUP_INIT_TYPE) => GROUP_INIT_TYPE,
            Some(ADD_MEMBER_TYPE) => ADD_MEMBER_TYPE,
            _ => return Ok(None),
        };

        let parsed: Self = serde_json::from_value(content.clone())
            .map_err(|e| ContentError::Malformed { kind, reason: e.to_string() })?;

        match &parsed {
            Self::Init(init) => init.validate()?,
            Self::AddMember(add) => add.validate()?,
        }
        Ok(Some(parsed))
    }

    /// Encode as JSON content.
    pub fn to_content(&self) -> Result<Value, ContentError> {
        serde_json::to_value(self).map_err(|e| ContentError::Encode(e.to_string()))
    }
}

/// Tangles carried by `link/feed-group`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkTangles {
    /// Link tangle; every link starts its own
    pub link: TangleUpdate,
}

/// A feed declaring membership of a group to the other members.
///
/// Sealed to the group, so only members can see who linked themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedGroupLink {
    /// Feed being linked, always the author
    pub parent: FeedId,
    /// Group the feed belongs to
    pub child: GroupId,
    /// Optional display name for the group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Exactly the group
    pub recps: Vec<Recipient>,
    /// Tangle fields
    pub tangles: LinkTangles,
}

impl FeedGroupLink {
    /// Link from `parent` to `child`.
    pub fn new(parent: FeedId, child: GroupId, name: Option<String>) -> Self {
        Self {
            parent,
            child,
            name,
            recps: vec![Recipient::Group(child)],
            tangles: LinkTangles { link: TangleUpdate::origin() },
        }
    }

    /// Encode as JSON content including the `type` tag.
    pub fn to_content(&self) -> Result<Value, ContentError> {
        let mut content =
            serde_json::to_value(self).map_err(|e| ContentError::Encode(e.to_string()))?;
        if let Some(object) = content.as_object_mut() {
            object.insert("type".to_string(), Value::from(FEED_GROUP_LINK_TYPE));
        }
        Ok(content)
    }

    /// Interpret JSON content.
    ///
    /// `Ok(None)` for content of any other type.
    pub fn parse(content: &Value) -> Result<Option<Self>, ContentError> {
        if content_type(content) != Some(FEED_GROUP_LINK_TYPE) {
            return Ok(None);
        }

        let link: Self = serde_json::from_value(content.clone()).map_err(|e| {
            ContentError::Malformed { kind: FEED_GROUP_LINK_TYPE, reason: e.to_string() }
        })?;
        if link.recps != [Recipient::Group(link.child)] {
            return Err(ContentError::Malformed {
                kind: FEED_GROUP_LINK_TYPE,
                reason: "a link is addressed to its group only".to_string(),
            });
        }
        Ok(Some(link))
    }
}

/// Parse the `recps` field of arbitrary content.
///
/// `Ok(None)` when the field is absent, meaning the content is public.
pub fn recipients(content: &Value) -> Result<Option<Vec<Recipient>>, ContentError> {
    let Some(raw) = content.get("recps") else {
        return Ok(None);
    };
    let recps: Vec<Recipient> = serde_json::from_value(raw.clone())
        .map_err(|e| ContentError::Malformed { kind: "recps", reason: e.to_string() })?;
    check_recipient_count(recps.len())?;
    Ok(Some(recps))
}

/// The `type` field of arbitrary content.
pub fn content_type(content: &Value) -> Option<&str> {
    content.get("type").and_then(Value::as_str)
}

/// Read `tangles.<name>` from arbitrary content.
pub fn tangle(content: &Value, name: &str) -> Option<TangleUpdate> {
    let raw = content.get("tangles")?.get(name)?;
    serde_json::from_value(raw.clone()).ok()
}

/// Write `tangles.<name>`, creating the `tangles` object if needed.
///
/// Fails if the content is not a JSON object or `tangles` is not one.
pub fn set_tangle(content: &mut Value, name: &str, update: &TangleUpdate) -> Result<(), ContentError> {
    let malformed = |reason: &str| ContentError::Malformed { kind: "tangles", reason: reason.to_string() };

    let object = content.as_object_mut().ok_or_else(|| malformed("content is not an object"))?;
    let tangles = object
        .entry("tangles")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| malformed("tangles is not an object"))?;

    let value = serde_json::to_value(update).map_err(|e| ContentError::Encode(e.to_string()))?;
    tangles.insert(name.to_string(), value);
    Ok(())
}

fn check_recipient_count(count: usize) -> Result<(), ContentError> {
    if count == 0 {
        return Err(ContentError::EmptyRecipients);
    }
    if count > MAX_RECIPIENTS {
        return Err(ContentError::TooManyRecipients { max: MAX_RECIPIENTS, actual: count });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn root() -> MsgId {
        MsgId::from_hash([1; 32])
    }

    fn add_member() -> AddMember {
        AddMember::new(
            &SymmetricKey::from_bytes([7; 32]),
            root(),
            vec![
                Recipient::Group(GroupId::from_bytes([2; 32])),
                Recipient::Feed(FeedId::from_public_key([3; 32])),
            ],
            Some("welcome".to_string()),
            AddMemberTangles {
                group: TangleUpdate::extending(root(), vec![root()]),
                members: TangleUpdate::extending(root(), vec![root()]),
            },
        )
    }

    #[test]
    fn add_member_wire_shape() {
        let content = add_member().to_content().unwrap();

        assert_eq!(content["type"], "group/add-member");
        assert_eq!(content["version"], "v1");
        assert_eq!(content["groupKey"], STANDARD.encode([7u8; 32]));
        assert_eq!(content["initialMsg"], root().to_string());
        assert_eq!(content["text"], "welcome");
        assert_eq!(content["recps"].as_array().unwrap().len(), 2);
        assert_eq!(content["tangles"]["group"]["root"], root().to_string());
        assert_eq!(content["tangles"]["members"]["previous"][0], root().to_string());
    }

    #[test]
    fn add_member_parses_back() {
        let original = add_member();
        let parsed = GroupContent::parse(&original.to_content().unwrap()).unwrap();

        assert_eq!(parsed, Some(GroupContent::AddMember(original)));
    }

    #[test]
    fn text_is_optional() {
        let mut add = add_member();
        add.text = None;
        let content = add.to_content().unwrap();

        assert!(content.get("text").is_none());
        assert!(GroupContent::parse(&content).unwrap().is_some());
    }

    #[test]
    fn other_types_are_not_group_content() {
        assert_eq!(GroupContent::parse(&json!({ "type": "post", "text": "hi" })).unwrap(), None);
        assert_eq!(GroupContent::parse(&json!({ "text": "untyped" })).unwrap(), None);
    }

    #[test]
    fn wrong_version_is_rejected() {
        let mut content = add_member().to_content().unwrap();
        content["version"] = json!("v2");

        assert_eq!(
            GroupContent::parse(&content),
            Err(ContentError::UnsupportedVersion("v2".to_string()))
        );
    }

    #[test]
    fn short_group_key_is_rejected() {
        let mut content = add_member().to_content().unwrap();
        content["groupKey"] = json!(STANDARD.encode([7u8; 16]));

        assert!(matches!(GroupContent::parse(&content), Err(ContentError::InvalidGroupKey { .. })));
    }

    #[test]
    fn empty_recps_are_rejected() {
        let mut content = add_member().to_content().unwrap();
        content["recps"] = json!([]);

        assert_eq!(GroupContent::parse(&content), Err(ContentError::EmptyRecipients));
    }

    #[test]
    fn seventeen_recps_are_rejected() {
        let mut add = add_member();
        add.recps = (0..17).map(|i| Recipient::Feed(FeedId::from_public_key([i; 32]))).collect();

        assert!(matches!(add.validate(), Err(ContentError::TooManyRecipients { actual: 17, .. })));
    }

    #[test]
    fn missing_members_tangle_is_rejected() {
        let mut content = add_member().to_content().unwrap();
        content["tangles"]["members"] = json!({ "root": null, "previous": null });

        assert_eq!(
            GroupContent::parse(&content),
            Err(ContentError::MissingTangle { name: MEMBERS_TANGLE })
        );
    }

    #[test]
    fn malformed_recipient_is_rejected() {
        let mut content = add_member().to_content().unwrap();
        content["recps"] = json!(["%notacloakedid.sha256"]);

        assert!(matches!(GroupContent::parse(&content), Err(ContentError::Malformed { .. })));
    }

    #[test]
    fn group_init_carries_null_tangle() {
        let content = GroupInit::new().to_content().unwrap();

        assert_eq!(
            content,
            json!({ "type": "group/init", "tangles": { "group": { "root": null, "previous": null } } })
        );
        assert_eq!(GroupContent::parse(&content).unwrap(), Some(GroupContent::Init(GroupInit::new())));
    }

    #[test]
    fn recipients_of_public_content_is_none() {
        assert_eq!(recipients(&json!({ "type": "post" })).unwrap(), None);
    }

    #[test]
    fn recipients_are_parsed() {
        let group = GroupId::from_bytes([2; 32]);
        let content = json!({ "type": "post", "recps": [group.to_string()] });

        assert_eq!(recipients(&content).unwrap(), Some(vec![Recipient::Group(group)]));
    }

    #[test]
    fn set_tangle_creates_and_overwrites() {
        let mut content = json!({ "type": "post" });
        let update = TangleUpdate::extending(root(), vec![root()]);

        set_tangle(&mut content, GROUP_TANGLE, &update).unwrap();
        assert_eq!(tangle(&content, GROUP_TANGLE), Some(update));

        let newer = TangleUpdate::extending(root(), vec![MsgId::from_hash([5; 32])]);
        set_tangle(&mut content, GROUP_TANGLE, &newer).unwrap();
        assert_eq!(tangle(&content, GROUP_TANGLE), Some(newer));
    }

    #[test]
    fn link_wire_shape() {
        let feed = FeedId::from_public_key([3; 32]);
        let group = GroupId::from_bytes([2; 32]);
        let content = FeedGroupLink::new(feed, group, Some("book club".to_string()))
            .to_content()
            .unwrap();

        assert_eq!(content["type"], "link/feed-group");
        assert_eq!(content["parent"], feed.to_string());
        assert_eq!(content["child"], group.to_string());
        assert_eq!(content["name"], "book club");
        assert_eq!(content["recps"], json!([group.to_string()]));
        assert_eq!(content["tangles"]["link"], json!({ "root": null, "previous": null }));
    }

    #[test]
    fn link_parses_back() {
        let link = FeedGroupLink::new(
            FeedId::from_public_key([3; 32]),
            GroupId::from_bytes([2; 32]),
            None,
        );
        let content = link.to_content().unwrap();

        assert!(content.get("name").is_none());
        assert_eq!(FeedGroupLink::parse(&content).unwrap(), Some(link));
        assert_eq!(FeedGroupLink::parse(&json!({ "type": "post" })).unwrap(), None);
    }

    #[test]
    fn link_to_other_recipients_is_rejected() {
        let mut content = FeedGroupLink::new(
            FeedId::from_public_key([3; 32]),
            GroupId::from_bytes([2; 32]),
            None,
        )
        .to_content()
        .unwrap();
        content["recps"] = json!([GroupId::from_bytes([9; 32]).to_string()]);

        assert!(matches!(FeedGroupLink::parse(&content), Err(ContentError::Malformed { .. })));
    }

    #[test]
    fn set_tangle_rejects_non_objects() {
        let mut content = json!("just a string");
        let result = set_tangle(&mut content, GROUP_TANGLE, &TangleUpdate::origin());
        assert!(matches!(result, Err(ContentError::Malformed { .. })));
    }
}
