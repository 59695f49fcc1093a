//! Anthropic Messages API client

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, error};

use super::types::ApiResponse;
use super::{LlmClient, LlmResponse};
use crate::agent::message::{ContentBlock, Message, MessageContent};
use crate::error::Error;
use crate::tools::ToolDefinition;
use crate::Result;

pub const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

/// Client for the Anthropic Messages API with beta tool use.
pub struct AnthropicClient {
    client: Client,
    api_key: String,
    api_url: String,
    model: String,
    max_tokens: u32,
    betas: Vec<String>,
    system: Option<String>,
}

impl AnthropicClient {
    /// Create a new client with the given API key and model.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            api_url: DEFAULT_API_URL.to_string(),
            model: model.into(),
            max_tokens: 4096,
            betas: Vec::new(),
            system: None,
        }
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_betas(mut self, betas: Vec<String>) -> Self {
        self.betas = betas;
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// JSON body for one request.
    pub(crate) fn build_request_body(&self, messages: &[Message], tools: &[ToolDefinition]) -> Value {
        let mut body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": messages.iter().map(to_wire_message).collect::<Vec<_>>(),
        });

        if !tools.is_empty() {
            body["tools"] = Value::Array(
                tools
                    .iter()
                    .map(|t| {
                        json!({
                            "name": t.name,
                            "description": t.description,
                            "input_schema": t.input_schema,
                        })
                    })
                    .collect(),
            );
        }

        if let Some(system) = &self.system {
            body["system"] = json!(system);
        }

        body
    }
}

fn to_wire_message(message: &Message) -> Value {
    let content = match &message.content {
        MessageContent::Text(text) => json!(text),
        MessageContent::Blocks(blocks) => Value::Array(blocks.iter().map(to_wire_block).collect()),
    };
    json!({ "role": message.role, "content": content })
}

fn to_wire_block(block: &ContentBlock) -> Value {
    match block {
        ContentBlock::Text { text } => json!({"type": "text", "text": text}),
        ContentBlock::ToolInvocation { id, name, arguments } => json!({
            "type": "tool_use",
            "id": id,
            "name": name,
            "input": arguments,
        }),
        ContentBlock::ToolOutcome {
            invocation_id,
            output,
            error,
            image,
            system,
        } => {
            let with_system = |text: &str| match system {
                Some(s) => format!("<system>{}</system>\n{}", s, text),
                None => text.to_string(),
            };

            if let Some(error) = error.as_deref().filter(|e| !e.is_empty()) {
                return json!({
                    "type": "tool_result",
                    "tool_use_id": invocation_id,
                    "content": with_system(error),
                    "is_error": true,
                });
            }

            let mut content = Vec::new();
            match output {
                Some(output) => content.push(json!({"type": "text", "text": with_system(output)})),
                None if system.is_some() => content.push(json!({"type": "text", "text": with_system("")})),
                None => {}
            }
            if let Some(image) = image {
                content.push(json!({
                    "type": "image",
                    "source": {"type": "base64", "media_type": "image/png", "data": image},
                }));
            }

            json!({
                "type": "tool_result",
                "tool_use_id": invocation_id,
                "content": content,
                "is_error": false,
            })
        }
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<LlmResponse> {
        let body = self.build_request_body(messages, tools);
        debug!(
            "Anthropic request: model={}, messages={}, tools={}",
            self.model,
            messages.len(),
            tools.len()
        );

        let mut request = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json");
        if !self.betas.is_empty() {
            request = request.header("anthropic-beta", self.betas.join(","));
        }

        let response = request.json(&body).send().await?;
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            // Prefer the provider's error message over the raw body.
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(String::from))
                .unwrap_or(text);
            error!("Anthropic API error {}: {}", status, message);
            return Err(Error::from_api_response(status.as_u16(), message));
        }

        let raw: ApiResponse = response.json().await?;
        debug!("Anthropic response format: {:?}", raw.format());
        Ok(raw.normalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolResult;

    fn client() -> AnthropicClient {
        AnthropicClient::new("key", "claude-test").with_max_tokens(128)
    }

    #[test]
    fn test_body_shape() {
        let tools = vec![ToolDefinition {
            name: "bash".into(),
            description: "Run a command".into(),
            input_schema: json!({"type": "object"}),
        }];
        let body = client()
            .with_system("be brief")
            .build_request_body(&[Message::user("hi")], &tools);

        assert_eq!(body["model"], "claude-test");
        assert_eq!(body["max_tokens"], 128);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "hi");
        assert_eq!(body["tools"][0]["name"], "bash");
        assert_eq!(body["system"], "be brief");
    }

    #[test]
    fn test_no_tools_key_without_tools() {
        let body = client().build_request_body(&[Message::user("hi")], &[]);
        assert!(body.get("tools").is_none());
        assert!(body.get("system").is_none());
    }

    #[test]
    fn test_error_outcome_wire_format() {
        let block = ContentBlock::outcome(
            "t1",
            ToolResult::failure("exit 1").with_system("ran in /tmp"),
        );
        let wire = to_wire_block(&block);
        assert_eq!(wire["is_error"], true);
        assert_eq!(wire["content"], "<system>ran in /tmp</system>\nexit 1");
        assert_eq!(wire["tool_use_id"], "t1");
    }

    #[test]
    fn test_empty_error_is_not_an_error_outcome() {
        let result = ToolResult {
            output: Some("done".into()),
            error: Some(String::new()),
            ..ToolResult::default()
        };
        assert!(!result.is_error());

        let wire = to_wire_block(&ContentBlock::outcome("t3", result));
        assert_eq!(wire["is_error"], false);
        assert_eq!(wire["content"][0]["text"], "done");
    }

    #[test]
    fn test_image_outcome_wire_format() {
        let result = ToolResult::output("shot").combine(ToolResult::image("AAAA")).unwrap();
        let wire = to_wire_block(&ContentBlock::outcome("t2", result));
        assert_eq!(wire["is_error"], false);
        let content = wire["content"].as_array().unwrap();
        assert_eq!(content[0]["text"], "shot");
        assert_eq!(content[1]["type"], "image");
        assert_eq!(content[1]["source"]["data"], "AAAA");
    }

    #[test]
    fn test_invocation_wire_format() {
        let msg = Message::assistant(vec![
            ContentBlock::text("running"),
            ContentBlock::invocation("t1", "bash", json!({"command": "ls"})),
        ]);
        let wire = to_wire_message(&msg);
        assert_eq!(wire["role"], "assistant");
        assert_eq!(wire["content"][1]["type"], "tool_use");
        assert_eq!(wire["content"][1]["input"]["command"], "ls");
    }
}
