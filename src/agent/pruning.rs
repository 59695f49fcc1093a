//! History pruning under a token budget.
//!
//! Pruning is staged and increasingly aggressive; it stops as soon as the
//! estimated size fits the budget. Messages are edited in place and never
//! reordered.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::message::{ContentBlock, Message, MessageContent, Role};
use super::tokens::{estimate_messages, looks_like_image, truncate_with_marker};

/// Replaces tool outputs that carried an embedded image.
pub const IMAGE_PLACEHOLDER: &str = "[Screenshot removed to reduce token count]";

/// Pruning thresholds. Sizes are in characters, the budget in tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PruningConfig {
    /// Approximate token budget for the stored history.
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,

    /// Tool outputs longer than this are truncated in stage 1.
    #[serde(default = "default_output_limit")]
    pub output_limit: usize,

    /// Text contents longer than this are truncated in stage 2.
    #[serde(default = "default_text_limit")]
    pub text_limit: usize,

    /// Messages kept by the window stage.
    #[serde(default = "default_window")]
    pub window: usize,

    /// Tool outputs longer than this are truncated when first stored.
    #[serde(default = "default_text_limit")]
    pub insert_output_limit: usize,
}

fn default_token_budget() -> usize {
    150_000
}

fn default_output_limit() -> usize {
    1_000
}

fn default_text_limit() -> usize {
    5_000
}

fn default_window() -> usize {
    10
}

impl Default for PruningConfig {
    fn default() -> Self {
        Self {
            token_budget: default_token_budget(),
            output_limit: default_output_limit(),
            text_limit: default_text_limit(),
            window: default_window(),
            insert_output_limit: default_text_limit(),
        }
    }
}

impl PruningConfig {
    /// Defaults with a different budget.
    pub fn with_budget(token_budget: usize) -> Self {
        Self {
            token_budget,
            ..Self::default()
        }
    }
}

/// Pruning stages, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneStage {
    RedactPayloads,
    RedactText,
    Window,
    CollapseToLastExchange,
}

impl PruneStage {
    pub const ALL: [PruneStage; 4] = [
        PruneStage::RedactPayloads,
        PruneStage::RedactText,
        PruneStage::Window,
        PruneStage::CollapseToLastExchange,
    ];
}

/// What a pruning pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub before: usize,
    pub after: usize,
    pub stages: Vec<PruneStage>,
}

impl PruneReport {
    pub fn did_prune(&self) -> bool {
        !self.stages.is_empty()
    }
}

/// Staged pruning policy.
#[derive(Debug, Clone, Default)]
pub struct PruningPolicy {
    config: PruningConfig,
}

impl PruningPolicy {
    pub fn new(config: PruningConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PruningConfig {
        &self.config
    }

    #[inline]
    pub fn budget(&self) -> usize {
        self.config.token_budget
    }

    pub fn is_over_budget(&self, messages: &[Message]) -> bool {
        estimate_messages(messages) > self.config.token_budget
    }

    /// Shrink `messages` until they fit the budget or every stage has run.
    pub fn prune(&self, messages: &mut Vec<Message>) -> PruneReport {
        let before = estimate_messages(messages);
        let mut report = PruneReport {
            before,
            after: before,
            stages: Vec::new(),
        };

        if before <= self.config.token_budget {
            return report;
        }

        warn!(
            "Conversation history too large (~{} tokens, budget {}), pruning",
            before, self.config.token_budget
        );

        for stage in PruneStage::ALL {
            if !self.is_over_budget(messages) {
                break;
            }
            self.apply_stage(stage, messages);
            report.stages.push(stage);
        }

        report.after = estimate_messages(messages);
        debug!(
            "After pruning: {} messages, ~{} tokens (stages: {:?})",
            messages.len(),
            report.after,
            report.stages
        );
        report
    }

    /// Run a single stage unconditionally.
    pub fn apply_stage(&self, stage: PruneStage, messages: &mut Vec<Message>) {
        match stage {
            PruneStage::RedactPayloads => {
                for message in messages.iter_mut() {
                    if let MessageContent::Blocks(blocks) = &mut message.content {
                        for block in blocks.iter_mut() {
                            self.redact_outcome(block, self.config.output_limit, true);
                        }
                    }
                }
            }
            PruneStage::RedactText => {
                let limit = self.config.text_limit;
                for message in messages.iter_mut() {
                    match &mut message.content {
                        MessageContent::Text(text) => truncate_in_place(text, limit),
                        MessageContent::Blocks(blocks) => {
                            for block in blocks.iter_mut() {
                                if let ContentBlock::Text { text } = block {
                                    truncate_in_place(text, limit);
                                }
                            }
                        }
                    }
                }
            }
            PruneStage::Window => {
                let window = self.config.window;
                if messages.len() > window {
                    messages.drain(..messages.len() - window);
                    warn!("Pruned to last {} messages", window);
                }
            }
            PruneStage::CollapseToLastExchange => {
                match messages.iter().rposition(Message::starts_exchange) {
                    Some(idx) => {
                        messages.drain(..idx);
                        warn!("Pruned to last exchange (from message {})", idx);
                    }
                    None => keep_last(messages),
                }
                if self.is_over_budget(messages) && messages.len() > 1 {
                    keep_last(messages);
                    warn!("Pruned to last message only");
                }
            }
        }
    }

    /// Bound tool outputs in a user message before it enters the store.
    ///
    /// Image data in the `image` field is kept so the model can see it;
    /// images pasted into text output are not.
    pub fn limit_incoming(&self, role: Role, content: &mut MessageContent) {
        if role != Role::User {
            return;
        }
        if let MessageContent::Blocks(blocks) = content {
            for block in blocks.iter_mut() {
                self.redact_outcome(block, self.config.insert_output_limit, false);
            }
        }
    }

    fn redact_outcome(&self, block: &mut ContentBlock, limit: usize, drop_images: bool) {
        let ContentBlock::ToolOutcome { output, image, .. } = block else {
            return;
        };

        if drop_images {
            if let Some(data) = image.take() {
                if output.is_none() && data.len() > IMAGE_PLACEHOLDER.len() {
                    *output = Some(IMAGE_PLACEHOLDER.to_string());
                }
            }
        }

        if let Some(text) = output {
            if looks_like_image(text) && text.len() > IMAGE_PLACEHOLDER.len() {
                *text = IMAGE_PLACEHOLDER.to_string();
            } else {
                truncate_in_place(text, limit);
            }
        }
    }
}

fn truncate_in_place(text: &mut String, limit: usize) {
    if let Some(truncated) = truncate_with_marker(text, limit) {
        *text = truncated;
    }
}

fn keep_last(messages: &mut Vec<Message>) {
    if messages.len() > 1 {
        messages.drain(..messages.len() - 1);
    }
}
