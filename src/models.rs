use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::schemas::StructuredResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Structured,
}

/// One message of the conversation, in the exact shape sent to the browser.
///
/// `content` is always a readable line of text, even for structured replies.
/// `structured_data` is present exactly when `message_type` is `structured`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub timestamp: DateTime<Utc>,
    pub content: String,
    pub message_type: MessageType,
    pub structured_data: Option<serde_json::Value>,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            timestamp: Utc::now(),
            content: content.into(),
            message_type: MessageType::Text,
            structured_data: None,
        }
    }

    /// Model reply wrapping a validated generator result.
    pub fn model_reply(result: &StructuredResult) -> Result<Self, serde_json::Error> {
        let structured_data = result.payload()?;
        let message_type = if structured_data.is_some() {
            MessageType::Structured
        } else {
            MessageType::Text
        };
        Ok(Self {
            role: Role::Model,
            timestamp: Utc::now(),
            content: result.summary(),
            message_type,
            structured_data,
        })
    }

    /// In-band failure reply. Never persisted.
    pub fn model_error(message: impl std::fmt::Display) -> Self {
        Self {
            role: Role::Model,
            timestamp: Utc::now(),
            content: format!("Sorry, I encountered an error: {message}"),
            message_type: MessageType::Text,
            structured_data: None,
        }
    }

    /// Checks the turn invariants, returning a reason on violation.
    pub fn check(&self) -> Result<(), String> {
        if self.content.trim().is_empty() {
            return Err(format!("{} turn has empty content", self.role));
        }
        match (self.message_type, &self.structured_data) {
            (MessageType::Structured, None) => {
                Err("structured turn is missing structured_data".to_string())
            }
            (MessageType::Text, Some(_)) => {
                Err("text turn carries structured_data".to_string())
            }
            _ => Ok(()),
        }
    }

    /// Serializes the turn as one newline-terminated JSON line.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// The turns produced by one successful request, appended as a single row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoredExchange {
    pub turns: Vec<ChatTurn>,
}

impl StoredExchange {
    pub fn new(user: ChatTurn, reply: ChatTurn) -> Self {
        Self { turns: vec![user, reply] }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatForm {
    pub prompt: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::{ProductReview, StructuredResult};

    #[test]
    fn user_turn_serializes_with_wire_field_names() {
        let turn = ChatTurn::user("hello");
        let value = serde_json::to_value(&turn).unwrap();
        assert_eq!(value["role"], "user");
        assert_eq!(value["content"], "hello");
        assert_eq!(value["message_type"], "text");
        assert!(value["structured_data"].is_null());
        assert!(value["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn structured_reply_carries_payload() {
        let result = StructuredResult::ProductReview(ProductReview {
            product_name: "Blendo 3000".into(),
            rating: 4,
            pros: vec!["quiet".into()],
            cons: vec![],
            summary: "Solid".into(),
            recommendation: true,
        });
        let turn = ChatTurn::model_reply(&result).unwrap();
        assert_eq!(turn.role, Role::Model);
        assert_eq!(turn.message_type, MessageType::Structured);
        assert_eq!(turn.content, "Here's a structured review for Blendo 3000 (4/5 stars).");
        assert_eq!(turn.structured_data.as_ref().unwrap()["rating"], 4);
        assert_eq!(turn.structured_data.as_ref().unwrap()["recommendation"], true);
        assert!(turn.check().is_ok());
    }

    #[test]
    fn plain_reply_is_text() {
        let turn = ChatTurn::model_reply(&StructuredResult::PlainText("hi there".into())).unwrap();
        assert_eq!(turn.message_type, MessageType::Text);
        assert_eq!(turn.content, "hi there");
        assert!(turn.structured_data.is_none());
    }

    #[test]
    fn error_turn_prefix() {
        let turn = ChatTurn::model_error("connection reset");
        assert_eq!(turn.content, "Sorry, I encountered an error: connection reset");
        assert_eq!(turn.message_type, MessageType::Text);
    }

    #[test]
    fn check_rejects_mismatched_payload() {
        let mut turn = ChatTurn::user("hi");
        turn.structured_data = Some(serde_json::json!({}));
        assert!(turn.check().is_err());

        let mut turn = ChatTurn::user("hi");
        turn.message_type = MessageType::Structured;
        assert!(turn.check().is_err());

        assert!(ChatTurn::user("  ").check().is_err());
    }

    #[test]
    fn line_is_newline_terminated() {
        let line = ChatTurn::user("x").to_line().unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
    }
}
