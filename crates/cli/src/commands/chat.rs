use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use quill_agent::{AgentRuntime, ConversationContext, SchedulerSet};
use quill_core::config::{AppConfig, LoadOptions, LogFormat};
use quill_core::domain::conversation::ChatTurn;
use quill_providers::{CoreApiClient, GeminiClient};

use super::CommandResult;

/// Turns of history forwarded to prompts; older turns age out.
const HISTORY_WINDOW: usize = 10;

pub fn run(config_path: Option<PathBuf>) -> CommandResult {
    let options = LoadOptions { config_path, ..LoadOptions::default() };
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => return CommandResult::failure("chat", "config", error.to_string(), 2),
    };
    init_logging(&config);

    match start_session(&config) {
        Ok(()) => CommandResult::success("chat", "session finished"),
        Err(error) => CommandResult::failure("chat", "startup", format!("{error:#}"), 1),
    }
}

fn start_session(config: &AppConfig) -> anyhow::Result<()> {
    let generation =
        Arc::new(GeminiClient::new(&config.generation).context("generation client setup failed")?);
    let papers =
        Arc::new(CoreApiClient::new(&config.search).context("search client setup failed")?);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to initialize async runtime")?;

    let schedulers = SchedulerSet::from_config(&config.scheduler);
    let agent = AgentRuntime::new(generation, papers, &schedulers);

    tracing::info!(
        event_name = "cli.chat.started",
        model = %config.generation.model,
        daily_limit = config.scheduler.daily_limit,
        "chat session started"
    );
    runtime.block_on(chat_loop(&agent));
    Ok(())
}

async fn chat_loop<G, P>(agent: &AgentRuntime<G, P>)
where
    G: quill_agent::GenerationClient,
    P: quill_agent::PaperSource,
{
    println!("quill: ask about research papers. /quit to exit.");

    let stdin = io::stdin();
    let mut history: Vec<ChatTurn> = Vec::new();
    let mut ctx = ConversationContext::new();

    loop {
        print!("> ");
        if io::stdout().flush().is_err() {
            break;
        }

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if message == "/quit" || message == "/exit" {
            break;
        }

        // Messages are handled one at a time; the loop is the serializer.
        match agent.handle_message(message, &history, &mut ctx).await {
            Ok(result) => {
                println!("{}\n", result.text);
                if !result.cited_papers.is_empty() {
                    println!("cited:");
                    for paper in &result.cited_papers {
                        println!("  [{}] {}", paper.id, paper.title);
                    }
                    println!();
                }
                history.push(ChatTurn::user(message));
                history.push(ChatTurn::assistant(&result.text));
                if history.len() > HISTORY_WINDOW {
                    let drop = history.len() - HISTORY_WINDOW;
                    history.drain(..drop);
                }
            }
            Err(error) => {
                tracing::error!(
                    event_name = "cli.chat.turn_failed",
                    error = %error,
                    "turn failed"
                );
                println!("error: {error}\n");
            }
        }
    }
}

fn init_logging(config: &AppConfig) {
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        LogFormat::Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        LogFormat::Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}
