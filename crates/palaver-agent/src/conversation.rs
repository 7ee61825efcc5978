//! Conversation run state: transcript, round counter, phase and last speaker.

use palaver_ai::Message;
use serde::{Deserialize, Serialize};

use crate::agent::BoxedAgent;

/// Phase of the orchestrator's round loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// No run in progress
    #[default]
    Idle,
    AwaitingSpeakerSelection,
    AwaitingReply,
    /// A reply contained the termination marker
    Terminated,
    /// The round cap was reached without termination
    RoundLimitReached,
    /// The last run ended with an error or was cancelled
    Aborted,
}

impl RunState {
    /// Whether the run has ended, successfully or not
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            RunState::Terminated | RunState::RoundLimitReached | RunState::Aborted
        )
    }
}

/// State owned by one orchestrator for the duration of a run.
#[derive(Default)]
pub struct Conversation {
    /// Append-only transcript
    pub messages: Vec<Message>,
    /// Completed non-terminating rounds
    pub round: u32,
    pub state: RunState,
    /// Speaker of the previous round
    pub last_speaker: Option<BoxedAgent>,
}

impl Conversation {
    /// Forget the transcript and return to [`RunState::Idle`]
    pub fn clear(&mut self) {
        self.messages.clear();
        self.round = 0;
        self.state = RunState::Idle;
        self.last_speaker = None;
    }
}
