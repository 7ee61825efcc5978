//! palaver - run a scripted multi-agent conversation from the command line

mod agents;
mod config;

use anyhow::Context;
use clap::Parser;
use palaver_agent::{
    CompactionStrategy, Compactor, ConstrainedSelector, ConversationEvent, ConversationResult,
    Orchestrator, SelectionStrategy, SharedSelector, StopReason, estimate_tokens,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::config::PalaverConfig;

/// palaver - multi-agent conversation runner
#[derive(Parser, Debug)]
#[command(name = "palaver")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Opening prompt (default: a demo question)
    prompt: Option<String>,

    /// Config file (default: $PALAVER_CONFIG_PATH or ~/.config/palaver/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Maximum number of rounds
    #[arg(short, long)]
    max_rounds: Option<u32>,

    /// Speaker selection (round-robin, random)
    #[arg(short, long)]
    strategy: Option<SelectionStrategy>,

    /// Only let these agents speak (repeatable)
    #[arg(short, long = "allow")]
    allow: Vec<String>,

    /// Hand agents a compacted view of the transcript
    #[arg(long)]
    compact_context: bool,

    /// Compaction strategy (truncate-oldest, selective, bookend, summarize)
    #[arg(long)]
    compaction: Option<CompactionStrategy>,

    /// Print the transcript as JSON instead of text
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,
}

const DEFAULT_PROMPT: &str = "Should we ship the 1.0 release this week?";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Setup tracing; RUST_LOG overrides the default filter
    let default_filter = if args.verbose {
        "palaver=debug,palaver_agent=debug"
    } else {
        "palaver=info,palaver_agent=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .init();

    let path = PalaverConfig::config_path(args.config.as_deref());

    // Initialize config and exit
    if args.init_config {
        let path = PalaverConfig::init(&path)
            .with_context(|| format!("Error creating config at {}", path.display()))?;
        println!("Config file created at: {}", path.display());
        println!("\nExample config:\n{}", config::example_config());
        return Ok(());
    }

    let mut cfg = PalaverConfig::load(&path)?;

    // Merge config with CLI args (CLI takes precedence)
    if let Some(max_rounds) = args.max_rounds {
        cfg.conversation.max_rounds = max_rounds;
    }
    if let Some(strategy) = args.strategy {
        cfg.conversation.strategy = strategy;
    }
    if !args.allow.is_empty() {
        cfg.conversation.allowed = args.allow.clone();
    }
    if args.compact_context {
        cfg.conversation.compact_context = true;
    }
    if let Some(strategy) = args.compaction {
        cfg.compaction.strategy = strategy;
    }

    let roster = agents::build_roster(&cfg.agents);
    let mut orchestrator =
        Orchestrator::with_config(roster, cfg.conversation.orchestrator_config())
            .context("Invalid conversation setup")?
            .with_selector(build_selector(&cfg)?);

    let compactor = Arc::new(Compactor::new(cfg.compaction.clone()));
    if cfg.conversation.compact_context {
        orchestrator = orchestrator.with_context_compactor(Arc::clone(&compactor));
    }

    // Abort the conversation on Ctrl-C
    let handle = orchestrator.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n[Interrupted]");
            handle.abort();
        }
    });

    let prompt = args.prompt.as_deref().unwrap_or(DEFAULT_PROMPT);
    let printer = if args.json {
        None
    } else {
        Some(spawn_printer(&orchestrator))
    };

    let result = orchestrator.run(prompt).await;

    // Dropping the orchestrator closes the event channel so the printer exits
    drop(orchestrator);
    if let Some(printer) = printer {
        let _ = printer.await;
    }

    let result = result.context("Conversation failed")?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_summary(&result, &compactor).await;
    }

    Ok(())
}

/// Selector from config, restricted to the allow-list when one is set.
///
/// Manual selection is refused: nothing in a scripted run sets the override,
/// so the first agent would speak every round.
fn build_selector(cfg: &PalaverConfig) -> anyhow::Result<SharedSelector> {
    if cfg.conversation.strategy == SelectionStrategy::Manual {
        anyhow::bail!(
            "manual speaker selection needs a caller that picks each speaker; \
             use round_robin or random"
        );
    }

    let base = cfg.conversation.strategy.build();
    if cfg.conversation.allowed.is_empty() {
        return Ok(base);
    }
    Ok(Arc::new(ConstrainedSelector::with_delegate(
        cfg.conversation.allowed.iter().cloned(),
        base,
    )))
}

/// Print each appended message as it arrives
fn spawn_printer(orchestrator: &Orchestrator) -> tokio::task::JoinHandle<()> {
    let mut receiver = orchestrator.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = receiver.recv().await {
            match event {
                ConversationEvent::RoundStart { round, speaker } => {
                    println!("\n--- round {} ({}) ---", round, speaker);
                }
                ConversationEvent::MessageAppended { message } => {
                    let who = message.name.as_deref().unwrap_or(message.role.as_str());
                    println!("{}: {}", who, message.content);
                }
                ConversationEvent::Error { message } => {
                    eprintln!("Error: {}", message);
                }
                _ => {}
            }
        }
    })
}

async fn print_summary(result: &ConversationResult, compactor: &Compactor) {
    println!();
    match &result.stop_reason {
        StopReason::Terminated { speaker } => {
            println!("[Terminated by {} after {} rounds]", speaker, result.rounds + 1)
        }
        StopReason::RoundLimitReached => {
            println!("[Round limit reached after {} rounds]", result.rounds)
        }
    }

    let tokens = estimate_tokens(&result.messages);
    println!(
        "[{} messages, ~{} tokens]",
        result.messages.len(),
        tokens
    );

    if compactor.needs_compaction(&result.messages) {
        let compacted = compactor.compact(&result.messages).await;
        println!(
            "[Compaction would remove {} messages, saving ~{} tokens]",
            compacted.removed_messages, compacted.tokens_saved
        );
        if compacted.tool_messages_relocated {
            println!("[Warning: compaction moved tool messages out of order]");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(strategy: SelectionStrategy, allowed: &[&str]) -> PalaverConfig {
        let mut cfg = PalaverConfig::demo();
        cfg.conversation.strategy = strategy;
        cfg.conversation.allowed = allowed.iter().map(|s| s.to_string()).collect();
        cfg
    }

    #[test]
    fn test_manual_strategy_rejected() {
        let err = build_selector(&config_with(SelectionStrategy::Manual, &[])).err().expect("manual strategy should be rejected");
        assert!(err.to_string().contains("manual"));
    }

    #[test]
    fn test_allow_list_wraps_selector() {
        let selector = build_selector(&config_with(SelectionStrategy::Random, &["Skeptic"])).unwrap();
        assert!(selector.describe().starts_with("Constrained to [Skeptic] via Random"));

        let selector = build_selector(&config_with(SelectionStrategy::RoundRobin, &[])).unwrap();
        assert!(selector.describe().starts_with("Round-robin"));
    }

    #[test]
    fn test_args_parse() {
        let args = Args::parse_from(["palaver", "--strategy", "random", "-a", "A", "-a", "B", "hello"]);
        assert_eq!(args.strategy, Some(SelectionStrategy::Random));
        assert_eq!(args.allow, vec!["A", "B"]);
        assert_eq!(args.prompt.as_deref(), Some("hello"));
    }
}
