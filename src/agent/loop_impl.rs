//! Agent loop - one user turn at a time

use std::sync::Arc;

use tracing::{error, info};

use super::dispatcher::ToolDispatcher;
use super::llm::LlmClient;
use super::message::{ContentBlock, Message, Role, TurnOutput};
use super::pruning::{PruningConfig, PruningPolicy};
use super::retry::{RetryExecutor, RetryOutcome, RetryPolicy, Sleeper};
use super::sanitizer::HistorySanitizer;
use super::stats::StatsCollector;
use super::store::ConversationStore;
use crate::session::{best_effort, NullRecorder, SessionRecorder};
use crate::tools::ToolRegistry;

/// Reply when the provider answered with no content at all.
pub const EMPTY_RESPONSE: &str = "I did not receive a response from the API. Please try again.";

/// Owns the conversation state of one session and drives the model.
///
/// `run` takes `&mut self`, so a session never has two turns in flight.
pub struct AgentLoop<C: LlmClient> {
    client: C,
    registry: ToolRegistry,
    store: ConversationStore,
    sanitizer: HistorySanitizer,
    retry: RetryExecutor,
    dispatcher: ToolDispatcher,
    stats: StatsCollector,
    recorder: Arc<dyn SessionRecorder>,
    /// Input that opened the current turn, re-sent after a history reset.
    last_input: String,
}

impl<C: LlmClient> AgentLoop<C> {
    /// Create an agent loop without persistence.
    pub fn new(client: C, registry: ToolRegistry, pruning: PruningConfig, retry: RetryPolicy) -> Self {
        let recorder: Arc<dyn SessionRecorder> = Arc::new(NullRecorder);
        let budget = pruning.token_budget;
        Self {
            client,
            registry,
            store: ConversationStore::new(PruningPolicy::new(pruning), recorder.clone()),
            sanitizer: HistorySanitizer::new(budget),
            retry: RetryExecutor::new(retry),
            dispatcher: ToolDispatcher::new(recorder.clone()),
            stats: StatsCollector::new(),
            recorder,
            last_input: String::new(),
        }
    }

    /// Persist history, tool usage, screenshots and stats through `recorder`.
    ///
    /// Call before the first turn; existing history is not carried over.
    pub fn with_recorder(mut self, recorder: Arc<dyn SessionRecorder>) -> Self {
        let policy = self.store.policy().clone();
        self.store = ConversationStore::new(policy, recorder.clone());
        self.dispatcher = ToolDispatcher::new(recorder.clone());
        self.recorder = recorder;
        self
    }

    /// Replace the backoff sleeper.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.retry = RetryExecutor::with_sleeper(self.retry.policy(), sleeper);
        self
    }

    /// Process one user input: a single model exchange plus tool dispatch.
    ///
    /// Never fails. API errors surface as a readable message in the text.
    pub async fn run(&mut self, input: &str) -> TurnOutput {
        info!("Processing user input ({} chars)", input.len());
        self.last_input = input.to_string();
        self.store.append(Role::User, input);

        let output = self.exchange().await;
        self.persist_stats();
        output
    }

    /// Let the model react to the tool outcomes of the previous turn.
    pub async fn resume(&mut self) -> TurnOutput {
        info!("Continuing after tool results");
        let output = self.exchange().await;
        self.persist_stats();
        output
    }

    async fn exchange(&mut self) -> TurnOutput {
        let tools = self.registry.definitions();
        let outcome = self
            .retry
            .execute(
                &self.client,
                &mut self.store,
                &self.sanitizer,
                &tools,
                &self.last_input,
                &mut self.stats,
            )
            .await;

        let response = match outcome {
            RetryOutcome::Succeeded(response) => response,
            RetryOutcome::Failed(message) => return TurnOutput::failure(message),
        };

        if response.content.is_empty() {
            error!("No response received from API");
            self.stats.record_other_error();
            return TurnOutput::failure(EMPTY_RESPONSE);
        }

        let text = response.text();
        let has_tool_calls = response.has_tool_calls();
        let invocations: Vec<ContentBlock> = response.invocations().cloned().collect();
        self.store.append(Role::Assistant, response.content);

        let tool_calls = if !has_tool_calls {
            vec![]
        } else {
            self.dispatcher
                .dispatch(&invocations, &self.registry, &mut self.store, &mut self.stats)
                .await
        };

        info!(
            "Turn complete: {} chars, {} tool calls, history {} messages (~{} tokens)",
            text.len(),
            tool_calls.len(),
            self.store.len(),
            self.store.estimate_size()
        );

        TurnOutput {
            text,
            tool_calls,
            failed: false,
        }
    }

    /// Forget the conversation and reset statistics.
    pub fn clear_history(&mut self) {
        self.store.clear();
        self.stats.reset();
        self.last_input.clear();
        self.persist_stats();
    }

    pub fn stats(&self) -> &StatsCollector {
        &self.stats
    }

    pub fn history(&self) -> &[Message] {
        self.store.snapshot()
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    fn persist_stats(&self) {
        best_effort("stats", self.recorder.save_stats(&self.stats));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::json;

    use crate::agent::llm::{FakeLlmClient, LlmResponse, Usage};
    use crate::agent::retry::RecordingSleeper;
    use crate::error::Error;
    use crate::session::{FileSessionRecorder, SessionDirs};
    use crate::tools::DummyTool;

    fn agent(client: FakeLlmClient) -> AgentLoop<FakeLlmClient> {
        let mut registry = ToolRegistry::new();
        registry.register(DummyTool { name: "echo".into(), result: "echoed".into() });
        AgentLoop::new(
            client,
            registry,
            PruningConfig::default(),
            RetryPolicy { max_retries: 3, base_delay: Duration::from_millis(10) },
        )
        .with_sleeper(Arc::new(RecordingSleeper::new()))
    }

    #[tokio::test]
    async fn test_agent_loop_simple() {
        let mut agent = agent(FakeLlmClient::new(vec!["Hello, human!"]));

        let output = agent.run("Hi there").await;

        assert_eq!(output.text, "Hello, human!");
        assert!(!output.failed);
        assert!(output.tool_calls.is_empty());
        assert_eq!(agent.history(), &[Message::user("Hi there"), Message::assistant(vec![ContentBlock::text("Hello, human!")])]);
        assert_eq!(agent.stats().total_requests, 1);
    }

    #[tokio::test]
    async fn test_agent_loop_with_tool() {
        let response = FakeLlmClient::tool_calls(
            "Let me check",
            vec![("t1", "echo", json!({})), ("t2", "echo", json!({}))],
        );
        let mut agent = agent(FakeLlmClient::scripted(vec![
            Ok(response),
            Ok(LlmResponse::text_only("Both echoed")),
        ]));

        let output = agent.run("echo twice").await;
        assert_eq!(output.text, "Let me check");
        assert_eq!(output.tool_calls.len(), 2);
        assert!(output.tool_calls.iter().all(|c| c.success));
        assert_eq!(agent.history().len(), 3);
        assert!(agent.history()[2].has_outcomes());
        assert_eq!(agent.stats().total_tokens, 15);

        let follow_up = agent.resume().await;
        assert_eq!(follow_up.text, "Both echoed");
        // The second request ends with the outcomes of the first.
        let second = &agent.client().requests()[1];
        assert!(second.last().unwrap().has_outcomes());
    }

    #[tokio::test]
    async fn test_size_limit_keeps_single_user_message() {
        let mut agent = agent(FakeLlmClient::scripted(vec![
            Ok(LlmResponse::text_only("first answer")),
            Err(Error::SizeLimit("prompt is too long".into())),
            Ok(LlmResponse::text_only("recovered")),
        ]));
        agent.run("first question").await;

        let output = agent.run("second question").await;

        assert_eq!(output.text, "recovered");
        let inputs: Vec<&Message> = agent
            .history()
            .iter()
            .filter(|m| m.role == Role::User)
            .collect();
        assert_eq!(inputs, vec![&Message::user("second question")]);
        assert_eq!(agent.history().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_tool_completes_turn() {
        let response = FakeLlmClient::tool_calls("", vec![("t1", "teleport", json!({"to": "mars"}))]);
        let mut agent = agent(FakeLlmClient::scripted(vec![Ok(response)]));

        let output = agent.run("go to mars").await;

        assert_eq!(output.tool_calls.len(), 1);
        assert!(!output.failed);
        assert_eq!(output.failed_tool_calls().count(), 1);
        let error = output.tool_calls[0].result.error.as_deref().unwrap();
        assert!(!error.is_empty());
        assert!(agent.history().last().unwrap().has_outcomes());
    }

    #[tokio::test]
    async fn test_exhausted_retries_return_message() {
        let errors = (0..3)
            .map(|_| Err(Error::Api { status: 500, message: "boom".into() }))
            .collect();
        let mut agent = agent(FakeLlmClient::scripted(errors));

        let output = agent.run("hello").await;

        assert!(output.text.starts_with("I encountered an error communicating with the API after 3 attempts"));
        assert!(output.failed);
        assert!(output.tool_calls.is_empty());
        assert_eq!(agent.stats().errors.api, 3);
    }

    #[tokio::test]
    async fn test_empty_response() {
        let empty = LlmResponse {
            content: vec![],
            stop_reason: "end_turn".into(),
            usage: Usage::default(),
        };
        let mut agent = agent(FakeLlmClient::scripted(vec![Ok(empty)]));

        let output = agent.run("anyone there?").await;

        assert_eq!(output.text, EMPTY_RESPONSE);
        assert!(output.failed);
        assert_eq!(agent.stats().errors.other, 1);
        assert_eq!(agent.history().len(), 1);
    }

    #[tokio::test]
    async fn test_clear_history_resets_everything() {
        let mut agent = agent(FakeLlmClient::new(vec!["hi"]));
        agent.run("hello").await;

        agent.clear_history();

        assert!(agent.history().is_empty());
        assert_eq!(agent.stats(), &StatsCollector::default());
    }

    #[tokio::test]
    async fn test_session_files_written() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dirs = SessionDirs::create_with_id(tmp.path(), "s1").unwrap();
        let stats_path = dirs.stats_path();
        let history_path = dirs.chat_history_path();

        let mut agent = agent(FakeLlmClient::new(vec!["saved"]))
            .with_recorder(Arc::new(FileSessionRecorder::new(dirs)));
        agent.run("persist this").await;

        let stats: StatsCollector =
            serde_json::from_str(&std::fs::read_to_string(stats_path).unwrap()).unwrap();
        assert_eq!(stats.total_requests, 1);
        let history: Vec<Message> =
            serde_json::from_str(&std::fs::read_to_string(history_path).unwrap()).unwrap();
        assert_eq!(history.len(), 2);
    }
}
