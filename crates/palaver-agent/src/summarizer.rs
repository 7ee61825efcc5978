//! Pluggable summarization for the summarize compaction strategy

use async_trait::async_trait;
use palaver_ai::{Message, Role};
use tokio_util::sync::CancellationToken;

use crate::{agent::BoxedAgent, util::truncate_chars};

/// Condenses a slice of transcript into a short text.
///
/// Implementations should stop work when `cancel` fires.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(
        &self,
        messages: &[Message],
        cancel: CancellationToken,
    ) -> palaver_ai::Result<String>;
}

/// Longest tool result kept verbatim in a summarization prompt
const MAX_TOOL_RESULT_CHARS: usize = 2000;
/// Longest serialized tool arguments kept in a summarization prompt
const MAX_ARGUMENT_CHARS: usize = 200;

const SUMMARIZATION_SYSTEM_PROMPT: &str = "\
You are a specialized summarization model. Your task is to create a concise summary \
of part of a multi-party conversation. The summary will replace the original messages, \
so it must capture everything the participants need to carry on.";

const SUMMARIZATION_PROMPT: &str = "\
Please summarize the conversation excerpt below. The summary should cover:

1. **Topic**: What are the participants trying to accomplish?
2. **Positions**: What has each participant argued or proposed? Name them.
3. **Decisions**: What has been agreed and what is still open?
4. **Tool Activity**: Which tools were called and what did they return?

Be thorough but concise. Do not continue the conversation.

<conversation>
{conversation}
</conversation>";

/// Serialize messages to plain text for a summarization prompt.
/// Uses a labelled format so the model does not try to continue the conversation.
pub fn serialize_messages_for_summary(messages: &[Message]) -> String {
    let mut out = String::new();

    for msg in messages {
        let label = match (&msg.role, msg.name.as_deref()) {
            (Role::Tool, Some(name)) => format!("Tool result ({})", name),
            (Role::Tool, None) => "Tool result".to_string(),
            (role, Some(name)) => format!("{} ({})", capitalize(role.as_str()), name),
            (role, None) => capitalize(role.as_str()),
        };

        if !msg.content.is_empty() {
            let text = if msg.role == Role::Tool {
                truncate_chars(&msg.content, MAX_TOOL_RESULT_CHARS)
            } else {
                msg.content.clone()
            };
            out.push_str(&format!("[{}]: {}\n", label, text));
        }

        let mut calls: Vec<String> = msg
            .tool_calls
            .iter()
            .map(|c| format!("{}({})", c.name, format_arguments(&c.arguments)))
            .collect();
        if let Some(f) = &msg.function_call {
            calls.push(format!("{}({})", f.name, format_arguments(&f.arguments)));
        }
        if !calls.is_empty() {
            out.push_str(&format!("[{} tool calls]: {}\n", label, calls.join("; ")));
        }
    }

    out
}

fn format_arguments(args: &serde_json::Value) -> String {
    truncate_chars(&args.to_string(), MAX_ARGUMENT_CHARS)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Summarizes by asking an [`Agent`](crate::Agent) to do it.
///
/// The agent receives a fresh two-message transcript (system instructions
/// plus the serialized excerpt), never the live conversation.
pub struct AgentSummarizer {
    agent: BoxedAgent,
}

impl AgentSummarizer {
    pub fn new(agent: BoxedAgent) -> Self {
        Self { agent }
    }
}

#[async_trait]
impl Summarizer for AgentSummarizer {
    async fn summarize(
        &self,
        messages: &[Message],
        cancel: CancellationToken,
    ) -> palaver_ai::Result<String> {
        let prompt = SUMMARIZATION_PROMPT
            .replace("{conversation}", &serialize_messages_for_summary(messages));
        let transcript = vec![
            Message::system(SUMMARIZATION_SYSTEM_PROMPT),
            Message::user(prompt),
        ];

        let reply = self
            .agent
            .produce_reply(&transcript, cancel)
            .await?;

        let summary = reply.content.trim();
        if summary.is_empty() {
            return Err(palaver_ai::Error::UnexpectedResponse(
                "summarizer returned an empty response".to_string(),
            ));
        }
        Ok(summary.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::FnAgent;
    use palaver_ai::ToolCall;
    use std::sync::Arc;

    #[test]
    fn test_serialize_messages() {
        let messages = vec![
            Message::user("Should we ship?").with_name("Admin"),
            Message::assistant("Not yet").with_name("Critic"),
        ];
        let text = serialize_messages_for_summary(&messages);
        assert!(text.contains("[User (Admin)]: Should we ship?"));
        assert!(text.contains("[Assistant (Critic)]: Not yet"));
    }

    #[test]
    fn test_serialize_tool_calls_and_results() {
        let messages = vec![
            Message::assistant("")
                .with_name("Researcher")
                .with_tool_calls(vec![ToolCall::new(
                    "c1",
                    "search",
                    serde_json::json!({"query": "rust"}),
                )]),
            Message::tool_result("c1", "search", "x".repeat(3000)),
        ];
        let text = serialize_messages_for_summary(&messages);
        assert!(text.contains("[Assistant (Researcher) tool calls]: search("));
        assert!(text.contains("rust"));
        assert!(text.contains("[Tool result (search)]: "));
        // Long tool output is truncated
        assert!(text.len() < 2200);
        assert!(text.contains("..."));
    }

    #[test]
    fn test_serialize_legacy_function_call() {
        let messages =
            vec![Message::assistant("").with_function_call("lookup", serde_json::json!({"id": 7}))];
        let text = serialize_messages_for_summary(&messages);
        assert!(text.contains("[Assistant tool calls]: lookup("));
    }

    #[tokio::test]
    async fn test_agent_summarizer_prompts_agent() {
        let agent = Arc::new(FnAgent::new("scribe", |transcript: Vec<Message>| async move {
            assert_eq!(transcript.len(), 2);
            assert_eq!(transcript[0].role, Role::System);
            assert!(transcript[1].content.contains("[User]: hello"));
            Ok(Message::assistant("  They said hello.  "))
        }));
        let summarizer = AgentSummarizer::new(agent);
        let summary = summarizer
            .summarize(&[Message::user("hello")], CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary, "They said hello.");
    }

    #[tokio::test]
    async fn test_agent_summarizer_rejects_empty_reply() {
        let agent = Arc::new(FnAgent::new("scribe", |_: Vec<Message>| async move {
            Ok(Message::assistant("   "))
        }));
        let err = AgentSummarizer::new(agent)
            .summarize(&[Message::user("hello")], CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, palaver_ai::Error::UnexpectedResponse(_)));
    }

    #[tokio::test]
    async fn test_agent_summarizer_forwards_cancellation() {
        let agent: BoxedAgent = Arc::new(crate::test_support::StalledAgent {
            name: "scribe".into(),
        });
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = AgentSummarizer::new(agent)
            .summarize(&[Message::user("hello")], cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, palaver_ai::Error::Aborted));
    }
}
