//! Message types for agent communication

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::ToolResult;

/// Message role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A block of content inside a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },

    /// Request from the model to run a tool. Only in assistant messages.
    #[serde(rename = "tool_use")]
    ToolInvocation {
        id: String,
        name: String,
        #[serde(rename = "input")]
        arguments: Value,
    },

    /// Result of a tool run. Only in user messages.
    #[serde(rename = "tool_result")]
    ToolOutcome {
        #[serde(rename = "tool_use_id")]
        invocation_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        /// Base64 PNG data.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        system: Option<String>,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    pub fn invocation(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        ContentBlock::ToolInvocation {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Build the outcome block for `invocation_id` from a tool result.
    pub fn outcome(invocation_id: impl Into<String>, result: ToolResult) -> Self {
        ContentBlock::ToolOutcome {
            invocation_id: invocation_id.into(),
            output: result.output,
            error: result.error,
            image: result.image,
            system: result.system,
        }
    }

    /// Id of the invocation this block opens, if it is one.
    pub fn invocation_id(&self) -> Option<&str> {
        match self {
            ContentBlock::ToolInvocation { id, .. } => Some(id),
            _ => None,
        }
    }

    /// Id of the invocation this block answers, if it is an outcome.
    pub fn outcome_id(&self) -> Option<&str> {
        match self {
            ContentBlock::ToolOutcome { invocation_id, .. } => Some(invocation_id),
            _ => None,
        }
    }

    #[inline]
    pub fn is_outcome(&self) -> bool {
        matches!(self, ContentBlock::ToolOutcome { .. })
    }
}

/// Message body: a plain string or an ordered list of blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        MessageContent::Text(text.to_string())
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        MessageContent::Text(text)
    }
}

impl From<Vec<ContentBlock>> for MessageContent {
    fn from(blocks: Vec<ContentBlock>) -> Self {
        MessageContent::Blocks(blocks)
    }
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

impl Message {
    pub fn new(role: Role, content: impl Into<MessageContent>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a user message carrying tool outcomes
    pub fn tool_outcomes(outcomes: Vec<ContentBlock>) -> Self {
        Self::new(Role::User, MessageContent::Blocks(outcomes))
    }

    /// Blocks of this message, empty for string content.
    pub fn blocks(&self) -> &[ContentBlock] {
        match &self.content {
            MessageContent::Blocks(blocks) => blocks,
            MessageContent::Text(_) => &[],
        }
    }

    /// True for user messages with at least one tool outcome.
    pub fn has_outcomes(&self) -> bool {
        self.role == Role::User && self.blocks().iter().any(ContentBlock::is_outcome)
    }

    /// A user message typed by a person rather than produced by tool dispatch.
    pub fn is_pure_user(&self) -> bool {
        self.role == Role::User && !self.has_outcomes()
    }

    /// A user message made of tool outcomes and nothing else.
    pub fn is_outcome_only(&self) -> bool {
        let blocks = self.blocks();
        self.role == Role::User && !blocks.is_empty() && blocks.iter().all(ContentBlock::is_outcome)
    }

    /// A user message that can open an exchange: anything but outcomes alone.
    pub fn starts_exchange(&self) -> bool {
        self.role == Role::User && !self.is_outcome_only()
    }

    /// Concatenated text of all text blocks (or the string content).
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// A tool call made during a turn, with its result
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    pub arguments: Value,
    pub result: ToolResult,
    pub success: bool,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    /// Set when the id was already executed and the stored outcome was reused.
    pub cached: bool,
    /// Where a side-channel artifact (screenshot) was written, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
}

/// Result of one user turn
#[derive(Debug, Clone, Default)]
pub struct TurnOutput {
    pub text: String,
    pub tool_calls: Vec<ToolCallRecord>,
    /// The exchange produced no model response; `text` explains why.
    pub failed: bool,
}

impl TurnOutput {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            failed: true,
            ..Self::new(message)
        }
    }

    /// Tool calls that ended in an error outcome.
    pub fn failed_tool_calls(&self) -> impl Iterator<Item = &ToolCallRecord> {
        self.tool_calls.iter().filter(|c| !c.success)
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_creation() {
        let msg = Message::user("Hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.text(), "Hello");
        assert!(msg.is_pure_user());
    }

    #[test]
    fn test_block_wire_names() {
        let block = ContentBlock::invocation("t1", "bash", json!({"command": "ls"}));
        let value = serde_json::to_value(&block).unwrap();
        assert_eq!(value["type"], "tool_use");
        assert_eq!(value["input"]["command"], "ls");

        let outcome = ContentBlock::outcome("t1", ToolResult::output("ok"));
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["type"], "tool_result");
        assert_eq!(value["tool_use_id"], "t1");
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_content_accepts_string_and_blocks() {
        let plain: Message = serde_json::from_value(json!({"role": "user", "content": "hi"})).unwrap();
        assert_eq!(plain.content, MessageContent::Text("hi".into()));

        let blocks: Message = serde_json::from_value(json!({
            "role": "assistant",
            "content": [{"type": "text", "text": "hi"}]
        }))
        .unwrap();
        assert_eq!(blocks.blocks().len(), 1);
    }

    #[test]
    fn test_outcome_message_is_not_pure_user() {
        let msg = Message::tool_outcomes(vec![ContentBlock::outcome("t1", ToolResult::output("x"))]);
        assert!(msg.has_outcomes());
        assert!(!msg.is_pure_user());
        assert!(msg.is_outcome_only());
        assert!(!msg.starts_exchange());
    }

    #[test]
    fn test_text_with_outcome_starts_exchange() {
        let msg = Message::new(
            Role::User,
            MessageContent::Blocks(vec![
                ContentBlock::outcome("t1", ToolResult::output("x")),
                ContentBlock::text("now summarize"),
            ]),
        );
        assert!(msg.has_outcomes());
        assert!(!msg.is_outcome_only());
        assert!(msg.starts_exchange());
        assert!(!Message::assistant("hi").starts_exchange());
    }
}
