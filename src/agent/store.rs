//! Conversation store - ordered history for one session

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use super::message::{ContentBlock, Message, MessageContent, Role};
use super::pruning::{PruneReport, PruningPolicy};
use super::tokens::estimate_messages;
use crate::session::{best_effort, NullRecorder, SessionRecorder};

/// Ordered messages of one session plus the ledger of executed tool ids.
///
/// Not shared between turns in flight; the agent loop owns it mutably.
pub struct ConversationStore {
    messages: Vec<Message>,
    /// Invocation id → outcome produced when it ran.
    processed: HashMap<String, ContentBlock>,
    policy: PruningPolicy,
    recorder: Arc<dyn SessionRecorder>,
}

impl ConversationStore {
    pub fn new(policy: PruningPolicy, recorder: Arc<dyn SessionRecorder>) -> Self {
        Self {
            messages: Vec::new(),
            processed: HashMap::new(),
            policy,
            recorder,
        }
    }

    /// Store without persistence.
    pub fn in_memory(policy: PruningPolicy) -> Self {
        Self::new(policy, Arc::new(NullRecorder))
    }

    /// Append a message, pruning the existing history first.
    pub fn append(&mut self, role: Role, content: impl Into<MessageContent>) -> PruneReport {
        let report = self.policy.prune(&mut self.messages);

        let mut content = content.into();
        self.policy.limit_incoming(role, &mut content);
        self.messages.push(Message { role, content });
        debug!("Added {:?} message to conversation history", role);

        self.persist();
        report
    }

    /// Estimated size in tokens.
    pub fn estimate_size(&self) -> usize {
        estimate_messages(&self.messages)
    }

    pub fn snapshot(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn policy(&self) -> &PruningPolicy {
        &self.policy
    }

    /// Drop all messages and forget which tool ids ran.
    pub fn clear(&mut self) {
        info!("Clearing conversation history");
        self.messages.clear();
        self.processed.clear();
        self.persist();
    }

    pub fn is_processed(&self, id: &str) -> bool {
        self.processed.contains_key(id)
    }

    pub fn cached_outcome(&self, id: &str) -> Option<&ContentBlock> {
        self.processed.get(id)
    }

    pub fn mark_processed(&mut self, id: impl Into<String>, outcome: ContentBlock) {
        self.processed.insert(id.into(), outcome);
    }

    fn persist(&self) {
        best_effort("chat history", self.recorder.save_history(&self.messages));
    }
}
