//! The turn scheduler that drives a multi-agent conversation

use palaver_ai::Message;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    agent::{BoxedAgent, roster_names},
    compaction::Compactor,
    conversation::{Conversation, RunState},
    error::{Error, Result},
    events::ConversationEvent,
    handle::RunHandle,
    selection::{RoundRobinSelector, SharedSelector},
    util::truncate_chars,
};

/// Characters of each reply shown in the per-round progress line
const PROGRESS_PREVIEW_CHARS: usize = 80;

/// Plain orchestrator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Rounds before the run stops with [`StopReason::RoundLimitReached`]
    pub max_rounds: u32,
    /// Display name on the seed message
    pub admin_name: String,
    /// Case-insensitive substring that ends the run when a reply contains it
    pub termination_marker: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_rounds: 10,
            admin_name: "Admin".to_string(),
            termination_marker: "terminate".to_string(),
        }
    }
}

/// Why a run ended without error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StopReason {
    /// `speaker` replied with the termination marker
    Terminated { speaker: String },
    /// The round cap was reached
    RoundLimitReached,
}

/// Outcome of [`Orchestrator::run`]
#[derive(Debug, Clone, Serialize)]
pub struct ConversationResult {
    pub run_id: Uuid,
    /// Copy of the final transcript, seed message first
    pub messages: Vec<Message>,
    /// Completed non-terminating rounds
    pub rounds: u32,
    pub stop_reason: StopReason,
}

impl ConversationResult {
    pub fn is_terminated(&self) -> bool {
        matches!(self.stop_reason, StopReason::Terminated { .. })
    }
}

fn termination_pattern(marker: &str) -> Result<Regex> {
    if marker.is_empty() {
        return Err(Error::InvalidConfig(
            "termination marker must not be empty".to_string(),
        ));
    }
    RegexBuilder::new(&regex::escape(marker))
        .case_insensitive(true)
        .build()
        .map_err(|e| Error::InvalidConfig(format!("bad termination marker: {}", e)))
}

/// Marks the handle idle when a run ends, including when its future is dropped
struct RunningGuard(RunHandle);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.finish();
    }
}

/// Runs rounds of speaker selection and reply generation over a roster.
///
/// Each round asks the selector for a speaker, requests a reply with the
/// whole transcript, appends the reply verbatim and stops early if it
/// contains the termination marker. Any failure aborts the run.
pub struct Orchestrator {
    roster: Vec<BoxedAgent>,
    config: OrchestratorConfig,
    termination: Regex,
    selector: SharedSelector,
    compactor: Option<Arc<Compactor>>,
    conversation: Conversation,
    event_tx: broadcast::Sender<ConversationEvent>,
    handle: RunHandle,
}

impl Orchestrator {
    /// Create an orchestrator with default settings and round-robin selection.
    ///
    /// Fails with [`Error::InsufficientAgents`] for fewer than two agents.
    pub fn new(roster: Vec<BoxedAgent>) -> Result<Self> {
        Self::with_config(roster, OrchestratorConfig::default())
    }

    pub fn with_config(roster: Vec<BoxedAgent>, config: OrchestratorConfig) -> Result<Self> {
        if roster.len() < 2 {
            return Err(Error::InsufficientAgents {
                count: roster.len(),
            });
        }

        let mut seen = HashSet::new();
        for name in roster_names(&roster) {
            if !seen.insert(name) {
                tracing::warn!(
                    "Duplicate agent name '{}' in roster; selectors cannot tell these agents apart",
                    name
                );
            }
        }

        let termination = termination_pattern(&config.termination_marker)?;
        let (event_tx, _) = broadcast::channel(256);

        Ok(Self {
            roster,
            config,
            termination,
            selector: Arc::new(RoundRobinSelector::new()),
            compactor: None,
            conversation: Conversation::default(),
            event_tx,
            handle: RunHandle::new(),
        })
    }

    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.config.max_rounds = max_rounds;
        self
    }

    pub fn with_admin_name(mut self, name: impl Into<String>) -> Self {
        self.config.admin_name = name.into();
        self
    }

    pub fn with_selector(mut self, selector: SharedSelector) -> Self {
        self.selector = selector;
        self
    }

    /// Replace the termination marker. Fails on an empty marker.
    pub fn with_termination_marker(mut self, marker: impl Into<String>) -> Result<Self> {
        let marker = marker.into();
        self.termination = termination_pattern(&marker)?;
        self.config.termination_marker = marker;
        Ok(self)
    }

    /// Hand each agent a compacted view of the transcript.
    /// The stored transcript is never altered.
    pub fn with_context_compactor(mut self, compactor: Arc<Compactor>) -> Self {
        self.compactor = Some(compactor);
        self
    }

    /// Subscribe to conversation events
    pub fn subscribe(&self) -> broadcast::Receiver<ConversationEvent> {
        self.event_tx.subscribe()
    }

    /// Get a cloneable handle for cancelling a run from other tasks
    pub fn handle(&self) -> RunHandle {
        self.handle.clone()
    }

    /// Current transcript
    pub fn messages(&self) -> &[Message] {
        &self.conversation.messages
    }

    /// Completed non-terminating rounds of the current or last run
    pub fn round(&self) -> u32 {
        self.conversation.round
    }

    /// Phase of the current or last run. A run whose future was dropped
    /// mid-round reports [`RunState::Aborted`].
    pub fn state(&self) -> RunState {
        match self.conversation.state {
            RunState::AwaitingSpeakerSelection | RunState::AwaitingReply
                if !self.handle.is_running() =>
            {
                RunState::Aborted
            }
            state => state,
        }
    }

    pub fn roster(&self) -> &[BoxedAgent] {
        &self.roster
    }

    pub fn max_rounds(&self) -> u32 {
        self.config.max_rounds
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn selector(&self) -> SharedSelector {
        Arc::clone(&self.selector)
    }

    /// Swap the selection policy. Takes effect from the next selection.
    pub fn set_selector(&mut self, selector: SharedSelector) {
        tracing::debug!("Speaker selection set to {}", selector.describe());
        self.selector = selector;
    }

    /// Clear the transcript and round counter. Roster and selector are kept.
    pub fn reset(&mut self) {
        self.conversation.clear();
    }

    fn emit(&self, event: ConversationEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Run a conversation seeded with `prompt`.
    ///
    /// Returns when a reply contains the termination marker or after
    /// `max_rounds` rounds. Selection errors, provider errors and
    /// cancellation abort the run; the partial transcript stays available
    /// through [`Orchestrator::messages`].
    pub async fn run(&mut self, prompt: &str) -> Result<ConversationResult> {
        let run_id = Uuid::new_v4();
        let cancel = self.handle.begin();
        let _running = RunningGuard(self.handle.clone());
        let span = tracing::info_span!("conversation", %run_id);

        let result = self.run_rounds(run_id, prompt, cancel).instrument(span).await;

        if let Err(e) = &result {
            self.conversation.state = RunState::Aborted;
            tracing::warn!(%run_id, "Conversation aborted: {}", e);
            self.emit(ConversationEvent::Error {
                message: e.to_string(),
            });
        }

        result
    }

    async fn run_rounds(
        &mut self,
        run_id: Uuid,
        prompt: &str,
        cancel: CancellationToken,
    ) -> Result<ConversationResult> {
        self.conversation.clear();
        let seed = Message::user(prompt).with_name(self.config.admin_name.clone());
        self.conversation.messages.push(seed.clone());
        self.emit(ConversationEvent::RunStart {
            run_id,
            prompt: prompt.to_string(),
        });
        self.emit(ConversationEvent::MessageAppended { message: seed });

        tracing::info!(
            agents = ?roster_names(&self.roster),
            selector = %self.selector.describe(),
            max_rounds = self.config.max_rounds,
            "Starting conversation"
        );

        while self.conversation.round < self.config.max_rounds {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            self.conversation.state = RunState::AwaitingSpeakerSelection;
            let speaker = self.selector.select_speaker(
                &self.roster,
                &self.conversation.messages,
                self.conversation.last_speaker.as_ref(),
            )?;
            let round = self.conversation.round + 1;
            tracing::debug!(round, speaker = speaker.name(), "Selected speaker");
            self.emit(ConversationEvent::RoundStart {
                round,
                speaker: speaker.name().to_string(),
            });

            self.conversation.state = RunState::AwaitingReply;
            let reply = self.request_reply(&speaker, &cancel).await?;
            reply.validate()?;

            tracing::info!(
                "[round {}] {}: {}",
                round,
                speaker.name(),
                truncate_chars(&reply.content, PROGRESS_PREVIEW_CHARS)
            );

            let terminated = self.termination.is_match(&reply.content);
            self.conversation.messages.push(reply.clone());
            self.emit(ConversationEvent::MessageAppended { message: reply });

            if terminated {
                self.conversation.state = RunState::Terminated;
                tracing::info!(round, speaker = speaker.name(), "Conversation terminated");
                self.emit(ConversationEvent::Terminated {
                    round,
                    speaker: speaker.name().to_string(),
                });
                return Ok(self.result(
                    run_id,
                    StopReason::Terminated {
                        speaker: speaker.name().to_string(),
                    },
                ));
            }

            self.conversation.last_speaker = Some(speaker);
            self.conversation.round += 1;
        }

        self.conversation.state = RunState::RoundLimitReached;
        tracing::info!(rounds = self.conversation.round, "Round limit reached");
        self.emit(ConversationEvent::RoundLimitReached {
            rounds: self.conversation.round,
        });
        Ok(self.result(run_id, StopReason::RoundLimitReached))
    }

    /// Ask `speaker` for a reply, racing compaction and the reply against
    /// cancellation.
    async fn request_reply(
        &self,
        speaker: &BoxedAgent,
        cancel: &CancellationToken,
    ) -> Result<Message> {
        let reply = async {
            let compacted;
            let view: &[Message] = match &self.compactor {
                Some(compactor) => {
                    let result = compactor
                        .compact_with_cancel(&self.conversation.messages, cancel.clone())
                        .await;
                    if result.is_compacted() {
                        tracing::debug!(
                            removed = result.removed_messages,
                            tokens_saved = result.tokens_saved,
                            "Compacted transcript for {}",
                            speaker.name()
                        );
                    }
                    compacted = result.messages;
                    &compacted
                }
                None => &self.conversation.messages,
            };
            speaker.produce_reply(view, cancel.clone()).await
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            reply = reply => match reply {
                Ok(message) => Ok(message),
                Err(_) if cancel.is_cancelled() => Err(Error::Cancelled),
                Err(e) => Err(e.into()),
            },
        }
    }

    fn result(&self, run_id: Uuid, stop_reason: StopReason) -> ConversationResult {
        ConversationResult {
            run_id,
            messages: self.conversation.messages.clone(),
            rounds: self.conversation.round,
            stop_reason,
        }
    }
}
