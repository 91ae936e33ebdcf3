use serde::{Deserialize, Serialize};

use crate::types::{FileDescriptor, Message, MessageId, MessageType, TypingPayload, User, UserId};

/// Events pushed by the server over the event stream.
///
/// Each frame is one JSON object tagged with the event name, e.g.
/// `{"event": "message", "data": {...}}`.  Frames that do not deserialize
/// into one of these variants are dropped by the transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Full contact roster, replaces any previous list.
    #[serde(rename = "users:updated")]
    UsersUpdated(Vec<User>),

    /// A single live message (fresh send echo or peer message).
    #[serde(rename = "message")]
    Message(Message),

    /// Conversation snapshot in chronological order, oldest first.
    #[serde(rename = "conversation")]
    Conversation(Vec<Message>),

    /// Messages queued server-side while this client was offline.
    #[serde(rename = "messages:pending")]
    MessagesPending(Vec<Message>),

    /// Server-confirmed message deletion.
    #[serde(rename = "message:deleted")]
    MessageDeleted(MessageDeleted),

    /// A peer started typing.
    #[serde(rename = "typing")]
    Typing(TypingPayload),

    /// Non-fatal server-side error.
    #[serde(rename = "error")]
    Error(ErrorPayload),
}

/// Events emitted by the client over the event stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "message")]
    SendMessage(OutgoingMessage),

    #[serde(rename = "typing")]
    SendTyping(TypingState),

    #[serde(rename = "get:conversation")]
    GetConversation(ConversationRequest),

    #[serde(rename = "delete:message")]
    DeleteMessage(DeleteRequest),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageDeleted {
    pub id: MessageId,
    pub deleted_by: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorPayload {
    pub message: String,
}

/// Outbound send request.  The server assigns the id and echoes the full
/// message back through the `message` event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
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
}

impl OutgoingMessage {
    pub fn text(to: UserId, text: impl Into<String>) -> Self {
        Self {
            to,
            kind: MessageType::Text,
            text: Some(text.into()),
            file_url: None,
            file_name: None,
            file_size: None,
            file_type: None,
        }
    }

    pub fn file(to: UserId, descriptor: FileDescriptor) -> Self {
        Self {
            to,
            kind: MessageType::File,
            text: None,
            file_url: Some(descriptor.file_url),
            file_name: Some(descriptor.file_name),
            file_size: Some(descriptor.file_size),
            file_type: Some(descriptor.file_type),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TypingState {
    pub to: UserId,
    pub typing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRequest {
    pub with_user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRequest {
    pub id: MessageId,
}

impl ServerEvent {
    /// Deserialize one text frame.
    pub fn from_frame(frame: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(frame)
    }
}

impl ClientEvent {
    /// Serialize to one text frame.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
