//! API-safe view of the conversation.
//!
//! The provider rejects any request where a `tool_use` block is not answered
//! by a `tool_result` in the very next user message, or where a
//! `tool_result` has no matching `tool_use`. Pruning and resets can leave
//! such orphans in the store, so every request goes through [`HistorySanitizer`].

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use super::message::{ContentBlock, Message, MessageContent, Role};
use super::tokens::estimate_messages;

/// Derives a request-ready message list from the stored history.
#[derive(Debug, Clone)]
pub struct HistorySanitizer {
    budget: usize,
}

impl HistorySanitizer {
    pub fn new(budget: usize) -> Self {
        Self { budget }
    }

    /// Build the sanitized view. The input is not modified.
    ///
    /// Every kept invocation is followed by exactly one outcome, in the user
    /// message right after it. Running this on its own output is a no-op.
    pub fn sanitize(&self, history: &[Message]) -> Vec<Message> {
        let mut invocation_ids = HashSet::new();
        let mut outcomes: HashMap<&str, &ContentBlock> = HashMap::new();

        for message in history {
            for block in message.blocks() {
                match (message.role, block) {
                    (Role::Assistant, ContentBlock::ToolInvocation { id, .. }) => {
                        invocation_ids.insert(id.as_str());
                    }
                    (Role::User, ContentBlock::ToolOutcome { invocation_id, .. }) => {
                        outcomes.entry(invocation_id.as_str()).or_insert(block);
                    }
                    _ => {}
                }
            }
        }

        let valid: HashSet<&str> = invocation_ids
            .into_iter()
            .filter(|id| outcomes.contains_key(id))
            .collect();

        let mut emitted: HashSet<&str> = HashSet::new();
        let mut sanitized = Vec::with_capacity(history.len());

        for message in history {
            let blocks = match &message.content {
                MessageContent::Text(_) => {
                    sanitized.push(message.clone());
                    continue;
                }
                MessageContent::Blocks(blocks) => blocks,
            };

            match message.role {
                Role::Assistant => {
                    let mut kept = Vec::with_capacity(blocks.len());
                    let mut paired = Vec::new();

                    for block in blocks {
                        match block {
                            ContentBlock::ToolInvocation { id, .. } => {
                                let id = id.as_str();
                                if valid.contains(id) && emitted.insert(id) {
                                    kept.push(block.clone());
                                    paired.push(id);
                                }
                            }
                            ContentBlock::ToolOutcome { .. } => {}
                            _ => kept.push(block.clone()),
                        }
                    }

                    if kept.is_empty() {
                        continue;
                    }
                    sanitized.push(Message::assistant(kept));

                    if !paired.is_empty() {
                        let results = paired
                            .iter()
                            .filter_map(|id| outcomes.get(id).map(|b| (*b).clone()))
                            .collect();
                        sanitized.push(Message::tool_outcomes(results));
                    }
                }
                Role::User => {
                    if !blocks.iter().any(ContentBlock::is_outcome) {
                        if !blocks.is_empty() {
                            sanitized.push(message.clone());
                        }
                        continue;
                    }

                    // Outcomes were already placed after their invocation.
                    let rest: Vec<ContentBlock> = blocks
                        .iter()
                        .filter(|b| !b.is_outcome() && b.invocation_id().is_none())
                        .cloned()
                        .collect();
                    if !rest.is_empty() {
                        sanitized.push(Message::user(rest));
                    }
                }
            }
        }

        let size = estimate_messages(&sanitized);
        debug!("Sanitized history size: ~{} tokens", size);

        if size > self.budget && sanitized.len() > 2 {
            truncate_to_last_exchange(&mut sanitized);
        }

        sanitized
    }
}

/// Keep from the last pure user message onward, or the shortest tail that
/// still pairs every invocation.
fn truncate_to_last_exchange(sanitized: &mut Vec<Message>) {
    if let Some(idx) = sanitized.iter().rposition(Message::is_pure_user) {
        sanitized.drain(..idx);
        warn!("History still too large, truncated to last exchange (from position {})", idx);
        return;
    }

    let keep = match sanitized.last() {
        Some(last) if last.has_outcomes() => 2,
        _ => 1,
    };
    let start = sanitized.len().saturating_sub(keep);
    sanitized.drain(..start);
    warn!("History still too large, truncated to last {} message(s)", keep);
}
