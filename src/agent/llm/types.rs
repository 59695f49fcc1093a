//! Wire types for Messages API responses.
//!
//! The provider has returned `content` both as a list of typed blocks and,
//! in older payloads, as a flat string. Both shapes are decoded here and
//! normalized into [`LlmResponse`] so format drift stays in this file.

use serde::Deserialize;
use serde_json::Value;

use super::{LlmResponse, Usage};
use crate::agent::message::ContentBlock;

/// Top-level Messages API response.
#[derive(Debug, Deserialize)]
pub struct ApiResponse {
    #[serde(default)]
    pub content: RawContent,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub usage: Option<ApiUsage>,
}

/// `content` in either historical shape.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RawContent {
    Blocks(Vec<RawBlock>),
    Flat(String),
}

impl Default for RawContent {
    fn default() -> Self {
        RawContent::Blocks(Vec::new())
    }
}

/// A single typed content block.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        #[serde(default)]
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    /// Thinking and other block kinds the loop doesn't act on.
    #[serde(other)]
    Unsupported,
}

/// Token usage counters.
#[derive(Debug, Default, Deserialize)]
pub struct ApiUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

/// Which response shape a payload used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    /// `content: [{"type": "text", ...}, {"type": "tool_use", ...}]`
    Blocks,
    /// `content: "plain text"`
    FlatText,
}

impl ApiResponse {
    pub fn format(&self) -> ResponseFormat {
        match self.content {
            RawContent::Blocks(_) => ResponseFormat::Blocks,
            RawContent::Flat(_) => ResponseFormat::FlatText,
        }
    }

    /// Convert into the loop's text/tool-invocation model.
    pub fn normalize(self) -> LlmResponse {
        let content = match self.content {
            RawContent::Flat(text) => {
                if text.is_empty() {
                    vec![]
                } else {
                    vec![ContentBlock::text(text)]
                }
            }
            RawContent::Blocks(blocks) => blocks
                .into_iter()
                .filter_map(|block| match block {
                    RawBlock::Text { text } if !text.is_empty() => Some(ContentBlock::text(text)),
                    RawBlock::ToolUse { id, name, input } => {
                        let id = if id.is_empty() {
                            format!("toolu_{}", uuid::Uuid::new_v4().simple())
                        } else {
                            id
                        };
                        let input = if input.is_null() { Value::Object(Default::default()) } else { input };
                        Some(ContentBlock::invocation(id, name, input))
                    }
                    _ => None,
                })
                .collect(),
        };

        let usage = self
            .usage
            .map(|u| Usage {
                input_tokens: u.input_tokens,
                output_tokens: u.output_tokens,
            })
            .unwrap_or_default();

        LlmResponse {
            content,
            stop_reason: self.stop_reason.unwrap_or_else(|| "end_turn".to_string()),
            usage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> ApiResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_block_response() {
        let raw = parse(json!({
            "content": [
                {"type": "text", "text": "Let me look."},
                {"type": "tool_use", "id": "toolu_1", "name": "bash", "input": {"command": "ls"}},
                {"type": "thinking", "thinking": "..."}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 10, "output_tokens": 5}
        }));
        assert_eq!(raw.format(), ResponseFormat::Blocks);

        let response = raw.normalize();
        assert_eq!(response.content.len(), 2);
        assert_eq!(response.text(), "Let me look.");
        assert_eq!(response.content[1].invocation_id(), Some("toolu_1"));
        assert_eq!(response.stop_reason, "tool_use");
        assert_eq!(response.usage.total(), 15);
    }

    #[test]
    fn test_flat_string_response() {
        let raw = parse(json!({"content": "Just text"}));
        assert_eq!(raw.format(), ResponseFormat::FlatText);

        let response = raw.normalize();
        assert_eq!(response.text(), "Just text");
        assert!(!response.has_tool_calls());
        assert_eq!(response.usage.total(), 0);
    }

    #[test]
    fn test_tool_use_without_id_gets_one() {
        let response = parse(json!({
            "content": [{"type": "tool_use", "name": "bash"}]
        }))
        .normalize();

        match &response.content[0] {
            ContentBlock::ToolInvocation { id, arguments, .. } => {
                assert!(id.starts_with("toolu_"));
                assert!(arguments.is_object());
            }
            other => panic!("unexpected block {:?}", other),
        }
    }

    #[test]
    fn test_empty_text_blocks_dropped() {
        let response = parse(json!({"content": [{"type": "text", "text": ""}]})).normalize();
        assert!(response.content.is_empty());
    }
}
