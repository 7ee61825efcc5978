//! palaver-agent: Multi-agent conversation orchestration
//!
//! This crate provides the round loop that lets several agents talk in
//! turns, the speaker selection policies that decide who talks next, and
//! the compactor that keeps long transcripts within budget.

pub mod agent;
pub mod compaction;
pub mod conversation;
pub mod error;
pub mod events;
pub mod handle;
pub mod orchestrator;
pub mod selection;
pub mod summarizer;
pub mod util;

#[cfg(test)]
mod test_support;

pub use agent::{Agent, BoxedAgent, FnAgent};
pub use compaction::{
    CompactionConfig, CompactionResult, CompactionStrategy, Compactor, estimate_tokens,
};
pub use conversation::{Conversation, RunState};
pub use error::{Error, Result};
pub use events::ConversationEvent;
pub use handle::RunHandle;
pub use orchestrator::{ConversationResult, Orchestrator, OrchestratorConfig, StopReason};
pub use selection::{
    ConstrainedSelector, ManualSelector, RandomSelector, RoundRobinSelector, SelectionStrategy,
    SharedSelector, SpeakerSelector,
};
pub use summarizer::{AgentSummarizer, Summarizer, serialize_messages_for_summary};
