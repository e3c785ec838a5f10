//! Message Types
//!
//! Data exchanged between callers and the transport client:
//! - [`ChatMessage`]: one entry of the conversation sent to the backend
//! - [`StreamChunk`]: one event delivered to the caller's sink
//!
//! Conversation order matters. A `Vec<ChatMessage>` is forwarded to the
//! backend in exactly the order the caller built it.

use serde::{Deserialize, Serialize};

/// Who authored a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Human input
    User,
    /// Model output
    Assistant,
    /// Instructions framing the conversation
    System,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::System => write!(f, "system"),
        }
    }
}

/// A message in the conversation
///
/// Fields are private so a message cannot change after construction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    role: Role,
    content: String,
}

impl ChatMessage {
    /// Create a message with the given role
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: None,
            role,
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Attach a caller-side identifier
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Caller-side identifier, if any
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Author of the message
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Message text
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }
}

/// One event delivered to a sink during a session
///
/// A session emits zero or more `Text` chunks followed by at most one
/// terminal chunk (`Done` or `Error`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamChunk {
    /// A piece of response text
    Text {
        /// The payload of one frame
        data: String,
    },
    /// The response completed
    Done,
    /// The stream failed after it had started
    Error {
        /// Human-readable description
        message: String,
    },
}

impl StreamChunk {
    /// Create a text chunk
    pub fn text(data: impl Into<String>) -> Self {
        Self::Text { data: data.into() }
    }

    /// Create an error chunk
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Whether this chunk ends the session
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error { .. })
    }

    /// Text payload, if this is a text chunk
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { data } => Some(data),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_message_serializes_lowercase_role_without_id() {
        let msg = ChatMessage::system("be brief");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "role": "system", "content": "be brief" })
        );
    }

    #[test]
    fn test_message_serializes_id_when_present() {
        let msg = ChatMessage::user("hi").with_id("m-1");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["id"], "m-1");
        assert_eq!(json["role"], "user");
    }

    #[test]
    fn test_message_list_keeps_order() {
        let messages = vec![
            ChatMessage::system("s"),
            ChatMessage::user("u1"),
            ChatMessage::assistant("a1"),
            ChatMessage::user("u2"),
        ];
        let json = serde_json::to_value(&messages).unwrap();
        let contents: Vec<&str> = json
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["content"].as_str().unwrap())
            .collect();
        assert_eq!(contents, vec!["s", "u1", "a1", "u2"]);
    }

    #[test]
    fn test_role_deserializes() {
        let msg: ChatMessage =
            serde_json::from_str(r#"{"role":"assistant","content":"ok"}"#).unwrap();
        assert_eq!(msg.role(), Role::Assistant);
        assert_eq!(msg.id(), None);
        assert_eq!(msg.content(), "ok");
    }

    #[test]
    fn test_chunk_helpers() {
        let text = StreamChunk::text("hi");
        assert!(!text.is_terminal());
        assert_eq!(text.as_text(), Some("hi"));

        assert!(StreamChunk::Done.is_terminal());
        assert!(StreamChunk::error("boom").is_terminal());
        assert_eq!(StreamChunk::Done.as_text(), None);
    }
}
