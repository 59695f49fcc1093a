//! Edit tool - view, create and patch files

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{Tool, ToolResult};
use crate::error::Error;
use crate::Result;

/// File editor with `view`, `create` and `str_replace` commands
pub struct EditTool {
    workspace: PathBuf,
}

impl EditTool {
    pub fn new(workspace: PathBuf) -> Self {
        Self { workspace }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace.join(path)
        }
    }
}

fn str_param<'a>(params: &'a Value, key: &str) -> Result<&'a str> {
    params.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::Tool(format!("Missing '{}' parameter", key)))
}

#[async_trait]
impl Tool for EditTool {
    fn name(&self) -> &str { "str_replace_editor" }
    fn description(&self) -> &str { "View, create or edit text files" }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "enum": ["view", "create", "str_replace"],
                    "description": "Operation to perform"
                },
                "path": {
                    "type": "string",
                    "description": "Path to the file"
                },
                "file_text": {
                    "type": "string",
                    "description": "Content for `create`"
                },
                "old_str": {
                    "type": "string",
                    "description": "Exact text to replace for `str_replace`"
                },
                "new_str": {
                    "type": "string",
                    "description": "Replacement text for `str_replace`"
                }
            },
            "required": ["command", "path"]
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolResult> {
        let command = str_param(&params, "command")?;
        let raw_path = str_param(&params, "path")?;
        let path = self.resolve(raw_path);

        match command {
            "view" => {
                let content = tokio::fs::read_to_string(&path).await
                    .map_err(|e| Error::Tool(format!("Failed to read {}: {}", raw_path, e)))?;
                let numbered: Vec<String> = content
                    .lines()
                    .enumerate()
                    .map(|(i, line)| format!("{:6}\t{}", i + 1, line))
                    .collect();
                Ok(ToolResult::output(numbered.join("\n")))
            }
            "create" => {
                let text = str_param(&params, "file_text")?;
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&path, text).await
                    .map_err(|e| Error::Tool(format!("Failed to write {}: {}", raw_path, e)))?;
                Ok(ToolResult::output(format!("File created at {}", raw_path)))
            }
            "str_replace" => {
                let old = str_param(&params, "old_str")?;
                let new = params.get("new_str").and_then(|v| v.as_str()).unwrap_or("");

                let content = tokio::fs::read_to_string(&path).await
                    .map_err(|e| Error::Tool(format!("Failed to read {}: {}", raw_path, e)))?;

                match content.matches(old).count() {
                    0 => Ok(ToolResult::failure(format!(
                        "No replacement performed: '{}' not found in {}", old, raw_path
                    ))),
                    1 => {
                        tokio::fs::write(&path, content.replacen(old, new, 1)).await
                            .map_err(|e| Error::Tool(format!("Failed to write {}: {}", raw_path, e)))?;
                        Ok(ToolResult::output(format!("Edited {}", raw_path)))
                    }
                    n => Ok(ToolResult::failure(format!(
                        "No replacement performed: '{}' occurs {} times in {}; make it unique", old, n, raw_path
                    ))),
                }
            }
            other => Err(Error::Tool(format!("Unknown command: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_create_then_replace() {
        let tmp = TempDir::new().unwrap();
        let tool = EditTool::new(tmp.path().to_path_buf());

        tool.execute(json!({"command": "create", "path": "a.txt", "file_text": "hello world"}))
            .await
            .unwrap();
        let result = tool
            .execute(json!({"command": "str_replace", "path": "a.txt", "old_str": "world", "new_str": "there"}))
            .await
            .unwrap();
        assert!(!result.is_error());

        let content = std::fs::read_to_string(tmp.path().join("a.txt")).unwrap();
        assert_eq!(content, "hello there");
    }

    #[tokio::test]
    async fn test_ambiguous_replace_is_error_outcome() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("b.txt"), "x x").unwrap();
        let tool = EditTool::new(tmp.path().to_path_buf());

        let result = tool
            .execute(json!({"command": "str_replace", "path": "b.txt", "old_str": "x", "new_str": "y"}))
            .await
            .unwrap();
        assert!(result.is_error());
    }

    #[tokio::test]
    async fn test_view_numbers_lines() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("c.txt"), "one\ntwo").unwrap();
        let tool = EditTool::new(tmp.path().to_path_buf());

        let result = tool.execute(json!({"command": "view", "path": "c.txt"})).await.unwrap();
        let output = result.output.unwrap();
        assert!(output.contains("     1\tone"));
        assert!(output.contains("     2\ttwo"));
    }
}
