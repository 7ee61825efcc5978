//! Conversation event types

use palaver_ai::Message;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events emitted while a conversation runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationEvent {
    /// A run started and the transcript was seeded
    RunStart { run_id: Uuid, prompt: String },

    /// A speaker was selected for a round
    RoundStart { round: u32, speaker: String },

    /// A message was appended to the transcript
    MessageAppended { message: Message },

    /// A reply contained the termination marker
    Terminated { round: u32, speaker: String },

    /// The round cap was reached without termination
    RoundLimitReached { rounds: u32 },

    /// The run aborted
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = ConversationEvent::RoundStart {
            round: 2,
            speaker: "Critic".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "round_start");
        assert_eq!(json["speaker"], "Critic");

        let back: ConversationEvent = serde_json::from_value(json).unwrap();
        assert!(matches!(back, ConversationEvent::RoundStart { round: 2, .. }));
    }
}
