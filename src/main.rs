//! Pilot CLI entry point

use std::fs::File;
use std::sync::{Arc, Mutex};

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pilot::adapters::cli::{print_output, CliChannel};
use pilot::agent::{AgentLoop, AnthropicClient};
use pilot::config::{self, Config};
use pilot::session::{FileSessionRecorder, SessionDirs};
use pilot::tools::ToolRegistry;
use pilot::ui;

#[derive(Parser)]
#[command(name = "pilot")]
#[command(about = "Pilot - tool-using agent for the Anthropic Messages API")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration and create directories
    Init,

    /// Chat with the agent
    Chat {
        /// Message to send to the agent
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Show configuration status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup Global Ctrl+C handler
    let exit_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let r = exit_flag.clone();

    ctrlc::set_handler(move || {
        if r.load(std::sync::atomic::Ordering::SeqCst) {
            println!("\nBye!");
            std::process::exit(0);
        } else {
            println!("\nPress Ctrl+C again to exit");
            r.store(true, std::sync::atomic::Ordering::SeqCst);

            // Reset flag after 3 seconds
            let r2 = r.clone();
            std::thread::spawn(move || {
                std::thread::sleep(std::time::Duration::from_secs(3));
                r2.store(false, std::sync::atomic::Ordering::SeqCst);
            });
        }
    })
    .ok();

    match cli.command {
        Commands::Init => {
            init_logging(None);
            ui::print_thinking("Initializing Pilot");
            let config = config::init()?;
            ui::print_success(&format!("Config written to {:?}", config::config_path()));
            ui::print_step(&format!("Workspace: {:?}", config.workspace));
            ui::print_step(&format!("Output: {:?}", config.output_dir));
            println!("\nNext steps:");
            println!("  1. Set {} or add api_key to the config", config::API_KEY_ENV);
            println!("  2. Chat: pilot chat -m \"Hello!\"");
        }

        Commands::Chat { message } => {
            let config = config::load()?;
            config.validate()?;
            run_chat(&config, message).await?;
        }

        Commands::Status => {
            init_logging(None);
            let config = config::load_or_default()?;
            println!("Pilot Status\n");
            println!("Config: {:?}", config::config_path());
            println!("Workspace: {:?}", config.workspace);
            println!("Output: {:?}", config.output_dir);
            println!("Model: {}", config.model);
            println!("Tool version: {}", config.tool_version.beta_flag());
            println!("API key: {}", if config.api_key.is_empty() { "not set" } else { "✓" });

            let registry = ToolRegistry::with_defaults(&config.workspace, config.tool_timeout());
            println!("Tools: {}", registry.names().join(", "));
        }
    }

    Ok(())
}

/// Log to `file` when given, stderr otherwise.
fn init_logging(file: Option<File>) {
    let builder = tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env());
    match file {
        Some(file) => builder.with_writer(Mutex::new(file)).with_ansi(false).init(),
        None => builder.init(),
    }
}

async fn run_chat(config: &Config, message: Option<String>) -> Result<()> {
    let dirs = SessionDirs::create(&config.output_dir)?;
    let log_file = File::create(dirs.log.join("agent.log"))
        .with_context(|| format!("creating log file in {:?}", dirs.log))?;
    init_logging(Some(log_file));

    std::fs::create_dir_all(&config.workspace)?;
    tracing::info!("Starting session {} in {:?}", dirs.session_id, config.workspace);

    let client = AnthropicClient::new(&config.api_key, &config.model)
        .with_api_url(&config.api_url)
        .with_max_tokens(config.max_tokens)
        .with_betas(vec![config.tool_version.beta_flag().to_string()]);
    let registry = ToolRegistry::with_defaults(&config.workspace, config.tool_timeout());
    let session_id = dirs.session_id.clone();

    let agent = AgentLoop::new(client, registry, config.pruning.clone(), config.retry_policy())
        .with_recorder(Arc::new(FileSessionRecorder::new(dirs)));
    let mut channel = CliChannel::new(agent, config.max_steps);

    match message {
        Some(msg) => {
            for output in channel.run_once(&msg).await {
                print_output(&output);
            }
        }
        None => {
            ui::print_header(&config.model, &session_id);
            println!("Interactive mode. /clear resets, /stats shows usage, exit quits.");
            channel.run_interactive().await?;
        }
    }

    Ok(())
}
