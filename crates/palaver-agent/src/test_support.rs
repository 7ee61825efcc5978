//! Mock agents and transcript builders shared by the unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use palaver_ai::Message;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::agent::{Agent, BoxedAgent};

/// An agent that replays canned replies, then answers "ok".
pub struct MockAgent {
    name: String,
    replies: Mutex<Vec<String>>,
    /// Length of every transcript this agent was shown
    pub seen_lengths: Mutex<Vec<usize>>,
}

impl MockAgent {
    pub fn new(name: &str, replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            seen_lengths: Mutex::new(vec![]),
        })
    }
}

#[async_trait]
impl Agent for MockAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn produce_reply(
        &self,
        transcript: &[Message],
        _cancel: CancellationToken,
    ) -> palaver_ai::Result<Message> {
        self.seen_lengths.lock().push(transcript.len());
        let text = {
            let mut replies = self.replies.lock();
            if replies.is_empty() {
                "ok".to_string()
            } else {
                replies.remove(0)
            }
        };
        Ok(Message::assistant(text).with_name(self.name.clone()))
    }
}

/// An agent whose backend always fails.
pub struct FailingAgent {
    pub name: String,
}

#[async_trait]
impl Agent for FailingAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn produce_reply(
        &self,
        _transcript: &[Message],
        _cancel: CancellationToken,
    ) -> palaver_ai::Result<Message> {
        Err(palaver_ai::Error::api("server_error", "backend exploded"))
    }
}

/// An agent that never answers on its own; it only returns once cancelled.
pub struct StalledAgent {
    pub name: String,
}

#[async_trait]
impl Agent for StalledAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn produce_reply(
        &self,
        _transcript: &[Message],
        cancel: CancellationToken,
    ) -> palaver_ai::Result<Message> {
        cancel.cancelled().await;
        Err(palaver_ai::Error::Aborted)
    }
}

/// An agent that is never expected to be asked for a reply.
pub fn silent_agent(name: &str) -> BoxedAgent {
    MockAgent::new(name, &[])
}

/// A roster of scripted agents with the given names
pub fn roster(names: &[&str]) -> Vec<BoxedAgent> {
    names.iter().map(|n| silent_agent(n)).collect()
}

/// `count` alternating user/assistant messages with short numbered content
pub fn chat(count: usize) -> Vec<Message> {
    (0..count)
        .map(|i| {
            if i % 2 == 0 {
                Message::user(format!("question {}", i))
            } else {
                Message::assistant(format!("answer {}", i))
            }
        })
        .collect()
}
