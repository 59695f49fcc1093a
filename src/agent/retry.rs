//! Retry executor for remote model calls.
//!
//! Every attempt re-sanitizes the store, so a reset made after a size-limit
//! or pairing rejection is reflected in the next request.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{error, info, warn};

use super::llm::{LlmClient, LlmResponse};
use super::message::Role;
use super::sanitizer::HistorySanitizer;
use super::stats::StatsCollector;
use super::store::ConversationStore;
use crate::error::Error;
use crate::tools::ToolDefinition;

/// Attempt budget and backoff base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of calls, the first one included.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Linear backoff: the wait after attempt `n` is `base * n`.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base * attempt
}

/// Where the executor is in its attempt sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Attempting(u32),
    Succeeded,
    Failed,
}

/// How a failed call is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Request too large: reset history, then retry.
    SizeLimit,
    /// Orphaned tool blocks rejected: reset history, then retry.
    Pairing,
    /// Network, overload or decode failure: retry as is.
    Transient,
    /// Retrying can't help.
    Fatal,
}

pub fn classify(err: &Error) -> ErrorClass {
    match err {
        Error::SizeLimit(_) => ErrorClass::SizeLimit,
        Error::Pairing(_) => ErrorClass::Pairing,
        Error::Api { status: 401 | 403, .. } | Error::Config(_) => ErrorClass::Fatal,
        _ => ErrorClass::Transient,
    }
}

/// Waits between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real sleeper backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Sleeper that returns immediately and remembers every requested delay.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: std::sync::Mutex<Vec<Duration>>,
}

#[cfg(test)]
impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut delays) = self.delays.lock() {
            delays.push(duration);
        }
    }
}

/// Final result of [`RetryExecutor::execute`].
#[derive(Debug)]
pub enum RetryOutcome {
    Succeeded(LlmResponse),
    /// Retries exhausted or fatal error; carries the message shown to the user.
    Failed(String),
}

/// Calls the model with bounded, classified retries.
pub struct RetryExecutor {
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_sleeper(policy, Arc::new(TokioSleeper))
    }

    pub fn with_sleeper(policy: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { policy, sleeper }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Run attempts until one succeeds or the budget is spent.
    ///
    /// `user_input` is the message that opened this turn; it is re-appended
    /// after a history reset so the model still sees the request.
    pub async fn execute<C: LlmClient + ?Sized>(
        &self,
        client: &C,
        store: &mut ConversationStore,
        sanitizer: &HistorySanitizer,
        tools: &[ToolDefinition],
        user_input: &str,
        stats: &mut StatsCollector,
    ) -> RetryOutcome {
        let max = self.policy.max_retries.max(1);
        let mut state = AttemptState::Attempting(1);
        let mut last_error = String::new();
        let mut attempts = 0;
        let mut response = None;

        while let AttemptState::Attempting(attempt) = state {
            attempts = attempt;
            let messages = sanitizer.sanitize(store.snapshot());
            info!(attempt, max_retries = max, messages = messages.len(), "Calling model");

            let start = Instant::now();
            let err = match client.chat(&messages, tools).await {
                Ok(resp) => {
                    stats.record_api_success(start.elapsed(), resp.usage.total());
                    response = Some(resp);
                    state = AttemptState::Succeeded;
                    continue;
                }
                Err(e) => e,
            };

            stats.record_api_failure();
            last_error = err.to_string();
            let class = classify(&err);

            match class {
                ErrorClass::Fatal => {
                    error!(attempt, error = %err, "Model call failed with unrecoverable error");
                    state = AttemptState::Failed;
                    continue;
                }
                ErrorClass::SizeLimit => {
                    warn!(attempt, error = %err, "Request exceeded size limit, resetting history");
                    self.reset(store, user_input);
                }
                ErrorClass::Pairing => {
                    warn!(
                        attempt,
                        error = %err,
                        "Provider rejected tool_use/tool_result pairing, resetting history"
                    );
                    self.reset(store, user_input);
                }
                ErrorClass::Transient => {
                    warn!(attempt, error = %err, "Model call failed");
                }
            }

            if attempt >= max {
                error!(attempts = attempt, error = %last_error, "Retries exhausted");
                state = AttemptState::Failed;
            } else {
                let delay = backoff_delay(self.policy.base_delay, attempt);
                info!(delay_ms = delay.as_millis() as u64, "Backing off before retry");
                self.sleeper.sleep(delay).await;
                state = AttemptState::Attempting(attempt + 1);
            }
        }

        match (state, response) {
            (AttemptState::Succeeded, Some(resp)) => RetryOutcome::Succeeded(resp),
            _ => RetryOutcome::Failed(format!(
                "I encountered an error communicating with the API after {} attempts: {}",
                attempts, last_error
            )),
        }
    }

    fn reset(&self, store: &mut ConversationStore, user_input: &str) {
        store.clear();
        store.append(Role::User, user_input);
    }
}
