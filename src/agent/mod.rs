//! Agent module: core agent logic.
//!
//! This module contains:
//! - Message types (Message, ContentBlock, TurnOutput)
//! - LLM client trait and the Anthropic implementation
//! - Conversation store, pruning and sanitizing of history
//! - Retry executor and tool dispatcher
//! - Agent loop tying them together

mod dispatcher;
mod loop_impl;
mod message;
pub mod pruning;
pub mod retry;
mod sanitizer;
mod stats;
mod store;
pub mod tokens;

// LLM providers in submodule
pub mod llm;

// Re-exports for convenience
pub use dispatcher::ToolDispatcher;
pub use llm::{AnthropicClient, LlmClient, LlmResponse, Usage};
pub use loop_impl::{AgentLoop, EMPTY_RESPONSE};
pub use message::{ContentBlock, Message, MessageContent, Role, ToolCallRecord, TurnOutput};
pub use pruning::{PruneReport, PruneStage, PruningConfig, PruningPolicy};
pub use retry::{RetryExecutor, RetryOutcome, RetryPolicy, Sleeper, TokioSleeper};
pub use sanitizer::HistorySanitizer;
pub use stats::{ErrorCounts, StatsCollector, ToolUsage};
pub use store::ConversationStore;
