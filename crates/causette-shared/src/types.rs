use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// User identity = opaque server-assigned id string
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of payload a [`Message`] carries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Emoji,
    Gif,
    Sticker,
    File,
    Location,
    Webview,
}

/// A participant as delivered by the server roster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: UserId,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default)]
    pub online: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// A single chat message.
///
/// Identity is the server-assigned `id`; payload fields are conditional on
/// `kind` and stay `None` otherwise.  `deleted_by` records participants who
/// soft-deleted the message; it is only ever extended, and whether the
/// message is shown is a view decision (see [`Message::visible_to`]).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(rename = "_id")]
    pub id: MessageId,
    pub from: UserId,
    pub to: UserId,
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_live: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub delivered: bool,
    #[serde(default)]
    pub seen: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deleted_by: Vec<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_id: Option<MessageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_text: Option<String>,
}

impl Message {
    /// Minimal text message, used by tests and fixtures.
    pub fn new_text(
        id: impl Into<MessageId>,
        from: impl Into<UserId>,
        to: impl Into<UserId>,
        text: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            from: from.into(),
            to: to.into(),
            kind: MessageType::Text,
            text: Some(text.into()),
            file_url: None,
            file_name: None,
            file_size: None,
            file_type: None,
            latitude: None,
            longitude: None,
            is_live: None,
            web_url: None,
            web_title: None,
            web_description: None,
            web_image_url: None,
            created_at,
            delivered: false,
            seen: false,
            deleted_by: Vec::new(),
            reply_id: None,
            reply_text: None,
        }
    }

    /// Soft-delete view filter.
    ///
    /// A message deleted by its sender is hidden from both participants; one
    /// deleted only by the receiving participant is hidden from that
    /// participant alone.
    pub fn visible_to(&self, viewer: &UserId) -> bool {
        if self.deleted_by.is_empty() {
            return true;
        }
        if self.deleted_by.contains(&self.from) {
            return false;
        }
        if self.from != *viewer && self.deleted_by.contains(viewer) {
            return false;
        }
        true
    }
}

/// Payload of a live typing signal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub from: UserId,
    pub username: String,
}

/// Descriptor of an uploaded attachment, as returned by the upload endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileDescriptor {
    pub file_url: String,
    pub file_name: String,
    pub file_size: u64,
    pub file_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn message_wire_field_names() {
        let m = Message::new_text("m1", "alice", "bob", "salut", ts());
        let json = serde_json::to_value(&m).unwrap();

        assert_eq!(json["_id"], "m1");
        assert_eq!(json["type"], "text");
        assert_eq!(json["createdAt"], "2025-06-01T12:00:00Z");
        // conditional payload fields are omitted entirely
        assert!(json.get("fileUrl").is_none());
        assert!(json.get("deletedBy").is_none());
    }

    #[test]
    fn message_tolerates_missing_optional_fields() {
        let raw = r#"{
            "_id": "abc",
            "from": "u1",
            "to": "u2",
            "type": "file",
            "fileUrl": "https://files.example/abc",
            "fileName": "photo.png",
            "fileSize": 1024,
            "fileType": "image/png",
            "createdAt": "2025-06-01T12:00:00Z"
        }"#;
        let m: Message = serde_json::from_str(raw).unwrap();
        assert_eq!(m.kind, MessageType::File);
        assert_eq!(m.file_size, Some(1024));
        assert!(m.deleted_by.is_empty());
        assert!(!m.delivered);
    }

    #[test]
    fn visible_when_nobody_deleted() {
        let m = Message::new_text("m1", "alice", "bob", "salut", ts());
        assert!(m.visible_to(&"alice".into()));
        assert!(m.visible_to(&"bob".into()));
    }

    #[test]
    fn sender_delete_hides_for_both() {
        let mut m = Message::new_text("m1", "alice", "bob", "salut", ts());
        m.deleted_by.push("alice".into());
        assert!(!m.visible_to(&"alice".into()));
        assert!(!m.visible_to(&"bob".into()));
    }

    #[test]
    fn receiver_delete_hides_for_receiver_only() {
        let mut m = Message::new_text("m1", "alice", "bob", "salut", ts());
        m.deleted_by.push("bob".into());
        assert!(m.visible_to(&"alice".into()));
        assert!(!m.visible_to(&"bob".into()));
    }

    #[test]
    fn message_type_is_lowercase_on_the_wire() {
        assert_eq!(
            serde_json::to_string(&MessageType::Webview).unwrap(),
            "\"webview\""
        );
        let kind: MessageType = serde_json::from_str("\"sticker\"").unwrap();
        assert_eq!(kind, MessageType::Sticker);
    }
}
