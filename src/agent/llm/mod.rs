//! LLM client abstraction layer.
//!
//! This module provides:
//! - [`LlmClient`] trait for swappable providers
//! - [`AnthropicClient`] for the Messages API
//! - Versioned response parsers in [`types`]

pub mod anthropic;
pub mod types;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::tools::ToolDefinition;
use crate::Result;

pub use anthropic::AnthropicClient;

use super::message::{ContentBlock, Message};

/// Response from an LLM provider, already normalized.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// Text and tool invocation blocks, in the order the model emitted them.
    pub content: Vec<ContentBlock>,

    /// Reason the response finished.
    pub stop_reason: String,

    /// Token usage statistics.
    pub usage: Usage,
}

impl LlmResponse {
    /// Create a simple text response.
    pub fn text_only(content: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(content)],
            stop_reason: "end_turn".to_string(),
            usage: Usage::default(),
        }
    }

    /// Text of all text blocks, joined by newlines.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Tool invocation blocks, in emission order.
    pub fn invocations(&self) -> impl Iterator<Item = &ContentBlock> {
        self.content.iter().filter(|b| b.invocation_id().is_some())
    }

    /// Check if response has tool calls.
    #[inline]
    pub fn has_tool_calls(&self) -> bool {
        self.invocations().next().is_some()
    }
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Usage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// LLM client trait: swappable provider abstraction.
///
/// Model, token limit and beta flags are properties of the client; each call
/// only carries the sanitized messages and the tool schemas.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send messages and get response.
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<LlmResponse>;
}

/// Fake LLM client for testing.
#[cfg(test)]
pub struct FakeLlmClient {
    responses: std::sync::Mutex<std::collections::VecDeque<Result<LlmResponse>>>,
    requests: std::sync::Mutex<Vec<Vec<Message>>>,
}

#[cfg(test)]
impl FakeLlmClient {
    /// Create with predefined text responses.
    pub fn new(responses: Vec<&str>) -> Self {
        Self::scripted(responses.iter().map(|s| Ok(LlmResponse::text_only(*s))).collect())
    }

    /// Create with an explicit sequence of results, errors included.
    pub fn scripted(responses: Vec<Result<LlmResponse>>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses.into()),
            requests: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// A response carrying the given tool calls.
    pub fn tool_calls(text: &str, calls: Vec<(&str, &str, serde_json::Value)>) -> LlmResponse {
        let mut content = Vec::new();
        if !text.is_empty() {
            content.push(ContentBlock::text(text));
        }
        for (id, name, args) in calls {
            content.push(ContentBlock::invocation(id, name, args));
        }
        LlmResponse {
            content,
            stop_reason: "tool_use".to_string(),
            usage: Usage { input_tokens: 10, output_tokens: 5 },
        }
    }

    /// Message lists received so far, one per call.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[cfg(test)]
#[async_trait]
impl LlmClient for FakeLlmClient {
    async fn chat(
        &self,
        messages: &[Message],
        _tools: &[ToolDefinition],
    ) -> Result<LlmResponse> {
        self.requests.lock().unwrap().push(messages.to_vec());
        let mut responses = self.responses.lock().unwrap();
        responses
            .pop_front()
            .unwrap_or_else(|| Err(crate::Error::Other("No more fake responses".to_string())))
    }
}
