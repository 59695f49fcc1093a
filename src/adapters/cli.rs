//! CLI adapter: interactive and single-message command line interface.

use std::io::{self, BufRead, Write};

use crate::agent::{AgentLoop, LlmClient, TurnOutput};
use crate::ui;
use crate::Result;

/// A line typed at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Exit,
    Clear,
    Stats,
    Empty,
    Message(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let input = line.trim();
        match input.to_lowercase().as_str() {
            "" => Command::Empty,
            "exit" | "quit" | "q" => Command::Exit,
            "/clear" => Command::Clear,
            "/stats" => Command::Stats,
            _ => Command::Message(input.to_string()),
        }
    }
}

/// CLI channel for interactive agent sessions.
pub struct CliChannel<C: LlmClient> {
    agent: AgentLoop<C>,
    max_steps: usize,
}

impl<C: LlmClient> CliChannel<C> {
    /// Create a new CLI channel.
    ///
    /// `max_steps` bounds the follow-up exchanges run after tool calls.
    pub fn new(agent: AgentLoop<C>, max_steps: usize) -> Self {
        Self { agent, max_steps }
    }

    /// Send one message and keep going while the model is using tools.
    ///
    /// Returns every exchange in order, the first one answering `message`.
    pub async fn run_once(&mut self, message: &str) -> Vec<TurnOutput> {
        let mut outputs = vec![self.agent.run(message).await];

        while outputs.len() <= self.max_steps {
            let ran_tools = outputs
                .last()
                .map(|o| o.tool_calls.iter().any(|c| !c.cached))
                .unwrap_or(false);
            if !ran_tools {
                break;
            }
            outputs.push(self.agent.resume().await);
        }

        outputs
    }

    /// Run interactive REPL loop.
    pub async fn run_interactive(&mut self) -> Result<()> {
        let stdin = io::stdin();
        let mut stdout = io::stdout();

        loop {
            print!("\n> ");
            stdout.flush()?;

            let mut line = String::new();
            if stdin.lock().read_line(&mut line)? == 0 {
                // EOF
                break;
            }

            match Command::parse(&line) {
                Command::Empty => continue,
                Command::Exit => {
                    println!("Goodbye!");
                    break;
                }
                Command::Clear => {
                    self.agent.clear_history();
                    ui::print_success("Conversation cleared");
                }
                Command::Stats => ui::print_stats(self.agent.stats()),
                Command::Message(text) => {
                    for output in self.run_once(&text).await {
                        print_output(&output);
                    }
                }
            }
        }

        Ok(())
    }

    pub fn agent(&self) -> &AgentLoop<C> {
        &self.agent
    }

    /// Clear conversation history.
    pub fn clear_history(&mut self) {
        self.agent.clear_history();
    }

    /// Get current history length.
    pub fn history_len(&self) -> usize {
        self.agent.history().len()
    }
}

/// Print one exchange: the model's text, then its tool calls.
pub fn print_output(output: &TurnOutput) {
    if output.failed {
        ui::print_error(&output.text);
        return;
    }
    if !output.text.is_empty() {
        println!("\n{}", output.text);
    }
    for call in &output.tool_calls {
        ui::print_tool_call(call);
    }
    let failed = output.failed_tool_calls().count();
    if failed > 0 {
        ui::print_warning(&format!("{} of {} tool calls failed", failed, output.tool_calls.len()));
    }
}
