//! Context compaction for long conversations
//!
//! A [`Compactor`] keeps a transcript within a message-count budget and an
//! approximate token budget. Compaction never mutates the caller's
//! transcript: it reads a slice and returns a new `Vec`.
//!
//! Strategies:
//! - **Truncate-oldest**: keep preserved system and function messages plus
//!   the most recent remainder that fits. Function/tool messages are moved
//!   to the end of the result, which can separate a tool call from its
//!   result; [`CompactionResult::tool_messages_relocated`] reports when that
//!   happened so callers talking to strict backends can react.
//! - **Selective**: keep system, function, long and recent messages.
//! - **Bookend**: keep the head and tail, replace the middle with a note.
//! - **Summarize**: like truncate-oldest, but the dropped messages are
//!   condensed by an injected [`Summarizer`]. Without one, or when it fails,
//!   truncate-oldest is used instead.

use parking_lot::RwLock;
use palaver_ai::{Message, Role};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::summarizer::Summarizer;

/// Characters per estimated token
const CHARS_PER_TOKEN: usize = 4;
/// Selective compaction keeps messages longer than this many characters
const SELECTIVE_MIN_CHARS: usize = 100;
/// Selective compaction always keeps this many trailing messages
const SELECTIVE_KEEP_RECENT: usize = 10;

/// Compaction algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompactionStrategy {
    #[default]
    TruncateOldest,
    Selective,
    Bookend,
    Summarize,
}

impl std::str::FromStr for CompactionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "truncate_oldest" | "truncate" => Ok(CompactionStrategy::TruncateOldest),
            "selective" => Ok(CompactionStrategy::Selective),
            "bookend" => Ok(CompactionStrategy::Bookend),
            "summarize" => Ok(CompactionStrategy::Summarize),
            other => Err(format!("unknown compaction strategy: {}", other)),
        }
    }
}

/// Configuration for context compaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionConfig {
    /// Compact when the transcript has more messages than this
    pub max_messages: Option<usize>,
    /// Compact when the estimated token count exceeds this
    pub max_tokens: Option<usize>,
    pub strategy: CompactionStrategy,
    /// Never drop system messages (truncate-oldest and summarize)
    pub preserve_system: bool,
    /// Never drop tool results or messages carrying tool calls
    /// (truncate-oldest and summarize)
    pub preserve_functions: bool,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            max_messages: Some(50),
            max_tokens: Some(8000),
            strategy: CompactionStrategy::TruncateOldest,
            preserve_system: true,
            preserve_functions: true,
        }
    }
}

impl CompactionConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the message-count budget.
    pub fn with_max_messages(mut self, max: usize) -> Self {
        self.max_messages = Some(max);
        self
    }

    /// Set the token budget.
    pub fn with_max_tokens(mut self, max: usize) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Remove both budgets, making compaction a no-op.
    pub fn unlimited(mut self) -> Self {
        self.max_messages = None;
        self.max_tokens = None;
        self
    }

    pub fn with_strategy(mut self, strategy: CompactionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_preserve_system(mut self, preserve: bool) -> Self {
        self.preserve_system = preserve;
        self
    }

    pub fn with_preserve_functions(mut self, preserve: bool) -> Self {
        self.preserve_functions = preserve;
        self
    }
}

/// Outcome of a compaction call
#[derive(Debug, Clone)]
pub struct CompactionResult {
    /// The compacted transcript
    pub messages: Vec<Message>,
    /// Original messages that did not survive
    pub removed_messages: usize,
    /// Estimated tokens before minus after, floored at zero
    pub tokens_saved: usize,
    /// `None` when the transcript was within budget
    pub strategy_applied: Option<CompactionStrategy>,
    /// A function/tool message was moved after messages it used to precede
    pub tool_messages_relocated: bool,
}

impl CompactionResult {
    fn unchanged(messages: &[Message]) -> Self {
        Self {
            messages: messages.to_vec(),
            removed_messages: 0,
            tokens_saved: 0,
            strategy_applied: None,
            tool_messages_relocated: false,
        }
    }

    /// Whether a strategy ran
    pub fn is_compacted(&self) -> bool {
        self.strategy_applied.is_some()
    }
}

// --- Token Estimation ---

/// Estimate tokens for a message set: total characters of content and
/// names, divided by four, rounded up. A crude order-of-magnitude signal.
pub fn estimate_tokens(messages: &[Message]) -> usize {
    messages
        .iter()
        .map(Message::char_count)
        .sum::<usize>()
        .div_ceil(CHARS_PER_TOKEN)
}

/// Whether a transcript exceeds either budget in `config`
pub fn needs_compaction(messages: &[Message], config: &CompactionConfig) -> bool {
    let over_count = config.max_messages.is_some_and(|max| messages.len() > max);
    let over_tokens = config
        .max_tokens
        .is_some_and(|max| estimate_tokens(messages) > max);
    over_count || over_tokens
}

// --- Strategies ---

/// Output of a single strategy, before token accounting
struct Compacted {
    messages: Vec<Message>,
    removed: usize,
    relocated: bool,
    strategy: CompactionStrategy,
}

/// Messages split into the buckets truncate-oldest and summarize work on.
/// Each entry keeps its original index.
struct Partition<'a> {
    system: Vec<(usize, &'a Message)>,
    functions: Vec<(usize, &'a Message)>,
    rest: Vec<(usize, &'a Message)>,
}

impl<'a> Partition<'a> {
    fn new(messages: &'a [Message], config: &CompactionConfig) -> Self {
        let mut partition = Partition {
            system: vec![],
            functions: vec![],
            rest: vec![],
        };
        for (idx, msg) in messages.iter().enumerate() {
            if config.preserve_system && msg.role == Role::System {
                partition.system.push((idx, msg));
            } else if config.preserve_functions && msg.is_function_related() {
                partition.functions.push((idx, msg));
            } else {
                partition.rest.push((idx, msg));
            }
        }
        partition
    }

    fn preserved(&self) -> usize {
        self.system.len() + self.functions.len()
    }

    /// Slots left for the remainder under `max_messages`, after `reserved`
    fn available_slots(&self, config: &CompactionConfig, reserved: usize) -> usize {
        config.max_messages.map_or(self.rest.len(), |max| {
            max.saturating_sub(self.preserved()).saturating_sub(reserved)
        })
    }

    /// Whether placing function messages last moves any of them past a kept
    /// remainder message that originally came after it
    fn relocates_functions(&self, kept: &[(usize, &Message)]) -> bool {
        match (self.functions.first(), kept.last()) {
            (Some((first_fn, _)), Some((last_kept, _))) => first_fn < last_kept,
            _ => false,
        }
    }

    /// system, then `inserted`, then kept remainder, then functions
    fn assemble(&self, inserted: Option<Message>, kept: &[(usize, &Message)]) -> Vec<Message> {
        self.system
            .iter()
            .map(|(_, m)| (*m).clone())
            .chain(inserted)
            .chain(kept.iter().map(|(_, m)| (*m).clone()))
            .chain(self.functions.iter().map(|(_, m)| (*m).clone()))
            .collect()
    }
}

fn truncate_oldest(messages: &[Message], config: &CompactionConfig) -> Compacted {
    let partition = Partition::new(messages, config);
    let slots = partition.available_slots(config, 0);
    let keep_from = partition.rest.len().saturating_sub(slots);
    let kept = &partition.rest[keep_from..];

    Compacted {
        messages: partition.assemble(None, kept),
        removed: keep_from,
        relocated: partition.relocates_functions(kept),
        strategy: CompactionStrategy::TruncateOldest,
    }
}

fn selective(messages: &[Message]) -> Compacted {
    let recent_start = messages.len().saturating_sub(SELECTIVE_KEEP_RECENT);
    let kept: Vec<Message> = messages
        .iter()
        .enumerate()
        .filter(|(idx, msg)| {
            msg.role == Role::System
                || msg.is_function_related()
                || msg.content.chars().count() > SELECTIVE_MIN_CHARS
                || *idx >= recent_start
        })
        .map(|(_, msg)| msg.clone())
        .collect();

    Compacted {
        removed: messages.len() - kept.len(),
        messages: kept,
        relocated: false,
        strategy: CompactionStrategy::Selective,
    }
}

fn bookend(messages: &[Message], config: &CompactionConfig) -> Compacted {
    let len = messages.len();
    let max = config.max_messages.unwrap_or(usize::MAX);
    if len <= max {
        return Compacted {
            messages: messages.to_vec(),
            removed: 0,
            relocated: false,
            strategy: CompactionStrategy::Bookend,
        };
    }

    let half = max / 2;
    let head_end = half.min(len);
    let tail_start = len.saturating_sub(half).max(head_end);
    let compressed = tail_start - head_end;

    let mut out = Vec::with_capacity(head_end + 1 + (len - tail_start));
    out.extend_from_slice(&messages[..head_end]);
    if compressed > 0 {
        out.push(Message::system(format!(
            "[{} earlier messages were compressed to save context]",
            compressed
        )));
    }
    out.extend_from_slice(&messages[tail_start..]);

    Compacted {
        messages: out,
        removed: compressed,
        relocated: false,
        strategy: CompactionStrategy::Bookend,
    }
}

// --- Compactor ---

/// Keeps transcripts within configured budgets.
///
/// The configuration is held as an `Arc` snapshot: every call reads it once
/// at the start, so [`Compactor::update_config`] never affects a call that
/// is already running.
pub struct Compactor {
    config: RwLock<Arc<CompactionConfig>>,
    summarizer: Option<Arc<dyn Summarizer>>,
}

impl Default for Compactor {
    fn default() -> Self {
        Self::new(CompactionConfig::default())
    }
}

impl Compactor {
    pub fn new(config: CompactionConfig) -> Self {
        Self {
            config: RwLock::new(Arc::new(config)),
            summarizer: None,
        }
    }

    /// Inject the capability used by the summarize strategy
    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Current configuration snapshot
    pub fn config(&self) -> Arc<CompactionConfig> {
        Arc::clone(&self.config.read())
    }

    /// Replace the configuration wholesale
    pub fn update_config(&self, config: CompactionConfig) {
        *self.config.write() = Arc::new(config);
    }

    /// Whether `messages` exceeds the current budgets
    pub fn needs_compaction(&self, messages: &[Message]) -> bool {
        needs_compaction(messages, &self.config())
    }

    /// Compact `messages` with the configured strategy.
    ///
    /// Returns the input unchanged when it is within budget. Never fails.
    pub async fn compact(&self, messages: &[Message]) -> CompactionResult {
        self.compact_with_cancel(messages, CancellationToken::new())
            .await
    }

    /// Like [`Compactor::compact`], forwarding `cancel` to the summarizer.
    /// A cancelled summary falls back to truncate-oldest.
    pub async fn compact_with_cancel(
        &self,
        messages: &[Message],
        cancel: CancellationToken,
    ) -> CompactionResult {
        let config = self.config();
        if !needs_compaction(messages, &config) {
            return CompactionResult::unchanged(messages);
        }

        let compacted = match config.strategy {
            CompactionStrategy::TruncateOldest => truncate_oldest(messages, &config),
            CompactionStrategy::Selective => selective(messages),
            CompactionStrategy::Bookend => bookend(messages, &config),
            CompactionStrategy::Summarize => self.summarize(messages, &config, cancel).await,
        };

        if compacted.relocated {
            tracing::warn!(
                "Compaction moved tool messages after later conversation turns; \
                 tool calls may no longer sit next to their results"
            );
        }

        let tokens_before = estimate_tokens(messages);
        let tokens_after = estimate_tokens(&compacted.messages);
        tracing::debug!(
            strategy = ?compacted.strategy,
            before = messages.len(),
            after = compacted.messages.len(),
            tokens_before,
            tokens_after,
            "Compacted transcript"
        );

        CompactionResult {
            messages: compacted.messages,
            removed_messages: compacted.removed,
            tokens_saved: tokens_before.saturating_sub(tokens_after),
            strategy_applied: Some(compacted.strategy),
            tool_messages_relocated: compacted.relocated,
        }
    }

    async fn summarize(
        &self,
        messages: &[Message],
        config: &CompactionConfig,
        cancel: CancellationToken,
    ) -> Compacted {
        let Some(summarizer) = &self.summarizer else {
            tracing::warn!("No summarizer configured, falling back to truncate-oldest");
            return truncate_oldest(messages, config);
        };

        let partition = Partition::new(messages, config);
        // One slot goes to the summary itself
        let slots = partition.available_slots(config, 1);
        let keep_from = partition.rest.len().saturating_sub(slots);
        if keep_from == 0 {
            return truncate_oldest(messages, config);
        }

        let dropped: Vec<Message> = partition.rest[..keep_from]
            .iter()
            .map(|(_, m)| (*m).clone())
            .collect();

        match summarizer.summarize(&dropped, cancel).await {
            Ok(summary) => {
                let kept = &partition.rest[keep_from..];
                let note = Message::system(format!(
                    "<conversation-summary messages=\"{}\">\n{}\n</conversation-summary>",
                    keep_from, summary
                ));
                Compacted {
                    messages: partition.assemble(Some(note), kept),
                    removed: keep_from,
                    relocated: partition.relocates_functions(kept),
                    strategy: CompactionStrategy::Summarize,
                }
            }
            Err(e) => {
                tracing::warn!("Summarization failed, falling back to truncate-oldest: {}", e);
                truncate_oldest(messages, config)
            }
        }
    }
}
