//! Scripted agents built from `[[agents]]` config entries

use async_trait::async_trait;
use palaver_agent::{Agent, BoxedAgent};
use palaver_ai::Message;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::AgentSettings;

/// Spoken when an agent has no scripted replies at all
const FALLBACK_REPLY: &str = "I have nothing to add.";

/// An agent that speaks its scripted replies in order, cycling.
pub struct ScriptedAgent {
    name: String,
    replies: Vec<String>,
    delay: Duration,
    turn: AtomicUsize,
}

impl ScriptedAgent {
    pub fn new(name: impl Into<String>, replies: Vec<String>) -> Self {
        Self {
            name: name.into(),
            replies,
            delay: Duration::ZERO,
            turn: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn next_reply(&self) -> String {
        if self.replies.is_empty() {
            return FALLBACK_REPLY.to_string();
        }
        let turn = self.turn.fetch_add(1, Ordering::Relaxed);
        self.replies[turn % self.replies.len()].clone()
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn produce_reply(
        &self,
        _transcript: &[Message],
        cancel: CancellationToken,
    ) -> palaver_ai::Result<Message> {
        if !self.delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(palaver_ai::Error::Aborted),
                _ = tokio::time::sleep(self.delay) => {}
            }
        }
        Ok(Message::assistant(self.next_reply()).with_name(self.name.clone()))
    }
}

/// Build the roster described by config entries
pub fn build_roster(settings: &[AgentSettings]) -> Vec<BoxedAgent> {
    settings
        .iter()
        .map(|s| {
            Arc::new(
                ScriptedAgent::new(s.name.clone(), s.replies.clone())
                    .with_delay(Duration::from_millis(s.delay_ms)),
            ) as BoxedAgent
        })
        .collect()
}
