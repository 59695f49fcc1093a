//! Tool dispatch for one assistant response.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::FutureExt;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::message::{ContentBlock, Role, ToolCallRecord};
use super::stats::StatsCollector;
use super::store::ConversationStore;
use crate::error::Error;
use crate::session::{best_effort, SessionRecorder, ToolUsageEntry};
use crate::tools::{ToolRegistry, ToolResult};

/// Runs the tool invocations of a model response, one after another.
pub struct ToolDispatcher {
    recorder: Arc<dyn SessionRecorder>,
}

impl ToolDispatcher {
    pub fn new(recorder: Arc<dyn SessionRecorder>) -> Self {
        Self { recorder }
    }

    /// Execute `invocations` in order and append the fresh outcomes as one
    /// user message.
    ///
    /// Ids already in the store's processed ledger are not run again; their
    /// stored outcome is returned with `cached` set. Non-invocation blocks
    /// are ignored. Never fails: tool errors, panics and unknown names all
    /// become error outcomes.
    pub async fn dispatch(
        &self,
        invocations: &[ContentBlock],
        registry: &ToolRegistry,
        store: &mut ConversationStore,
        stats: &mut StatsCollector,
    ) -> Vec<ToolCallRecord> {
        let mut records = Vec::new();
        let mut fresh = Vec::new();

        for block in invocations {
            let ContentBlock::ToolInvocation { id, name, arguments } = block else {
                continue;
            };

            if let Some(cached) = store.cached_outcome(id) {
                info!("Skipping already processed tool call: {}", id);
                let result = result_from_outcome(cached);
                records.push(ToolCallRecord {
                    id: id.clone(),
                    name: name.clone(),
                    arguments: arguments.clone(),
                    success: !result.is_error(),
                    result,
                    duration: Duration::ZERO,
                    cached: true,
                    artifact: None,
                });
                continue;
            }

            info!("Executing tool: {}", name);
            debug!("Tool arguments: {}", arguments);

            let start = Instant::now();
            let result = self.run_tool(registry, name, arguments).await;
            let duration = start.elapsed();
            let success = !result.is_error();

            if success {
                debug!("Tool {} completed in {:.2}s", name, duration.as_secs_f64());
            } else {
                warn!(
                    "Tool {} failed: {}",
                    name,
                    result.error.as_deref().unwrap_or_default()
                );
            }
            stats.record_tool(name, success, duration);

            let artifact = result.image.as_ref().and_then(|image| {
                let context = json!({"tool_use_id": id, "tool": name, "arguments": arguments});
                let location = self.recorder.store(image.as_bytes(), name, Some(&context));
                (!location.is_empty()).then_some(location)
            });

            best_effort(
                "tool usage",
                self.recorder.append_tool_usage(&ToolUsageEntry {
                    timestamp: Utc::now(),
                    tool: name.clone(),
                    arguments: arguments.clone(),
                    success,
                    duration: duration.as_secs_f64(),
                    error: result.error.clone(),
                }),
            );

            let outcome = ContentBlock::outcome(id.clone(), result.clone());
            store.mark_processed(id.clone(), outcome.clone());
            fresh.push(outcome);

            records.push(ToolCallRecord {
                id: id.clone(),
                name: name.clone(),
                arguments: arguments.clone(),
                result,
                success,
                duration,
                cached: false,
                artifact,
            });
        }

        if !fresh.is_empty() {
            store.append(Role::User, fresh);
        }

        records
    }

    async fn run_tool(&self, registry: &ToolRegistry, name: &str, arguments: &Value) -> ToolResult {
        let Some(tool) = registry.get(name) else {
            warn!("Model requested unknown tool: {}", name);
            return ToolResult::failure(Error::UnknownTool(name.to_string()).to_string());
        };

        match AssertUnwindSafe(tool.execute(arguments.clone()))
            .catch_unwind()
            .await
        {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => ToolResult::failure(e.to_string()),
            Err(panic) => ToolResult::failure(format!("Tool panicked: {}", panic_message(&*panic))),
        }
    }
}

fn result_from_outcome(block: &ContentBlock) -> ToolResult {
    match block {
        ContentBlock::ToolOutcome {
            output,
            error,
            image,
            system,
            ..
        } => ToolResult {
            output: output.clone(),
            error: error.clone(),
            image: image.clone(),
            system: system.clone(),
        },
        _ => ToolResult::default(),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
