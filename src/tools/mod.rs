//! Tools module - agent capabilities
//!
//! Tools are external collaborators the agent loop drives on the model's
//! behalf. The loop only relies on the [`Tool`] contract: a schema
//! description and an `execute` operation returning a [`ToolResult`].

mod edit;
mod registry;
mod shell;

pub use edit::EditTool;
pub use registry::{ToolDefinition, ToolRegistry};
pub use shell::BashTool;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;
use crate::Result;

/// Tool trait - interface for all agent tools
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name used in function calls
    fn name(&self) -> &str;

    /// Description of what the tool does
    fn description(&self) -> &str;

    /// JSON Schema for parameters
    fn parameters(&self) -> Value;

    /// Execute the tool with given parameters
    async fn execute(&self, params: Value) -> Result<ToolResult>;

    /// Schema sent to the model
    fn describe(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.parameters(),
        }
    }
}

/// Receives side-channel artifacts (screenshots) produced by tools.
///
/// Returns the storage location, or an empty string when nothing was stored.
pub trait ArtifactSink: Send + Sync {
    fn store(&self, payload: &[u8], source: &str, context: Option<&Value>) -> String;
}

/// Result returned by a tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Base64 PNG data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
}

impl ToolResult {
    pub fn output(output: impl Into<String>) -> Self {
        Self {
            output: Some(output.into()),
            ..Self::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn image(image: impl Into<String>) -> Self {
        Self {
            image: Some(image.into()),
            ..Self::default()
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// True when no field carries a value.
    pub fn is_empty(&self) -> bool {
        [&self.output, &self.error, &self.image, &self.system]
            .iter()
            .all(|f| f.as_deref().map_or(true, str::is_empty))
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        self.error.as_deref().map_or(false, |e| !e.is_empty())
    }

    /// Merge two results: text fields are concatenated, images can't be merged.
    pub fn combine(self, other: ToolResult) -> Result<ToolResult> {
        fn concat(a: Option<String>, b: Option<String>) -> Option<String> {
            match (a, b) {
                (Some(a), Some(b)) => Some(a + &b),
                (a, b) => a.or(b),
            }
        }

        let image = match (self.image, other.image) {
            (Some(a), Some(b)) if !a.is_empty() && !b.is_empty() => {
                return Err(Error::Tool("Cannot combine two tool results that both carry an image".into()));
            }
            (a, b) => a.filter(|s| !s.is_empty()).or(b),
        };

        Ok(ToolResult {
            output: concat(self.output, other.output),
            error: concat(self.error, other.error),
            image,
            system: concat(self.system, other.system),
        })
    }
}

/// Dummy tool for testing
#[cfg(test)]
pub struct DummyTool {
    pub name: String,
    pub result: String,
}

#[cfg(test)]
#[async_trait]
impl Tool for DummyTool {
    fn name(&self) -> &str { &self.name }
    fn description(&self) -> &str { "Dummy tool for testing" }
    fn parameters(&self) -> Value { serde_json::json!({"type": "object"}) }

    async fn execute(&self, _params: Value) -> Result<ToolResult> {
        Ok(ToolResult::output(self.result.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_result() {
        assert!(ToolResult::default().is_empty());
        assert!(!ToolResult::output("x").is_empty());
        assert!(!ToolResult::default().with_system("note").is_empty());
    }

    #[test]
    fn test_combine_concatenates_text() {
        let merged = ToolResult::output("a")
            .combine(ToolResult::output("b").with_system("s"))
            .unwrap();
        assert_eq!(merged.output.as_deref(), Some("ab"));
        assert_eq!(merged.system.as_deref(), Some("s"));
        assert!(merged.error.is_none());
    }

    #[test]
    fn test_combine_two_images_fails() {
        let err = ToolResult::image("AAAA").combine(ToolResult::image("BBBB"));
        assert!(err.is_err());

        let ok = ToolResult::image("AAAA").combine(ToolResult::output("caption")).unwrap();
        assert_eq!(ok.image.as_deref(), Some("AAAA"));
    }

    #[test]
    fn test_describe_uses_parameters() {
        let tool = DummyTool { name: "dummy".into(), result: "ok".into() };
        let def = tool.describe();
        assert_eq!(def.name, "dummy");
        assert_eq!(def.input_schema["type"], "object");
    }
}
