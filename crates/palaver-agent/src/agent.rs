//! The agent capability consumed by the orchestrator

use async_trait::async_trait;
use palaver_ai::Message;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Anything that can take part in a conversation.
///
/// Agents are identified solely by [`Agent::name`]; names must be unique
/// within a roster because selectors resolve speakers by name equality.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Agent name (unique within a roster)
    fn name(&self) -> &str;

    /// Produce the next message given the transcript so far.
    ///
    /// Implementations should stop work when `cancel` fires. Errors are
    /// surfaced to the caller of the run unchanged.
    async fn produce_reply(
        &self,
        transcript: &[Message],
        cancel: CancellationToken,
    ) -> palaver_ai::Result<Message>;
}

/// Type alias for a shared agent
pub type BoxedAgent = Arc<dyn Agent>;

/// Find an agent in a roster by exact name
pub fn find_agent<'a>(roster: &'a [BoxedAgent], name: &str) -> Option<&'a BoxedAgent> {
    roster.iter().find(|a| a.name() == name)
}

/// Position of an agent in a roster by exact name
pub fn position_of(roster: &[BoxedAgent], name: &str) -> Option<usize> {
    roster.iter().position(|a| a.name() == name)
}

/// Names of all agents in roster order
pub fn roster_names(roster: &[BoxedAgent]) -> Vec<&str> {
    roster.iter().map(|a| a.name()).collect()
}

/// An agent backed by an async closure.
///
/// The closure receives an owned copy of the transcript.
pub struct FnAgent<F> {
    name: String,
    reply: F,
}

impl<F, Fut> FnAgent<F>
where
    F: Fn(Vec<Message>) -> Fut + Send + Sync,
    Fut: Future<Output = palaver_ai::Result<Message>> + Send,
{
    pub fn new(name: impl Into<String>, reply: F) -> Self {
        Self {
            name: name.into(),
            reply,
        }
    }
}

#[async_trait]
impl<F, Fut> Agent for FnAgent<F>
where
    F: Fn(Vec<Message>) -> Fut + Send + Sync,
    Fut: Future<Output = palaver_ai::Result<Message>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn produce_reply(
        &self,
        transcript: &[Message],
        _cancel: CancellationToken,
    ) -> palaver_ai::Result<Message> {
        (self.reply)(transcript.to_vec()).await
    }
}
