//! Core transcript types

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Message roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Instructions or synthetic notes injected by the host
    System,
    /// Human or administrative input
    User,
    /// A reply produced by an agent
    Assistant,
    /// Result of a tool or function invocation
    #[serde(alias = "function")]
    Tool,
}

impl Role {
    /// Get the role as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured invocation request emitted by an assistant turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

impl ToolCall {
    /// Create a tool call
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Legacy single function invocation (pre tool-call APIs)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: serde_json::Value,
}

/// An entry in the transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    /// Text content; may be empty when the message only carries an invocation
    #[serde(default)]
    pub content: String,
    /// Originating agent or function
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Correlates a tool result with the call that produced it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    #[serde(default)]
    pub timestamp: i64,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
            tool_call_id: None,
            tool_calls: vec![],
            function_call: None,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Create a system message
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text)
    }

    /// Create a user message
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    /// Create an assistant message
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    /// Create a tool result message.
    ///
    /// This is the only constructor for [`Role::Tool`] messages, so results
    /// built through it always carry their `tool_call_id`.
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            name: Some(name.into()),
            tool_call_id: Some(tool_call_id.into()),
            ..Self::new(Role::Tool, content)
        }
    }

    /// Attach the originating agent or function name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attach tool calls (assistant turns)
    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    /// Attach a legacy function call
    pub fn with_function_call(
        mut self,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        self.function_call = Some(FunctionCall {
            name: name.into(),
            arguments,
        });
        self
    }

    /// Whether this message is a tool/function result or carries invocation metadata
    pub fn is_function_related(&self) -> bool {
        self.role == Role::Tool || !self.tool_calls.is_empty() || self.function_call.is_some()
    }

    /// Character count used for token estimation: content plus name
    pub fn char_count(&self) -> usize {
        self.content.chars().count() + self.name.as_deref().map_or(0, |n| n.chars().count())
    }

    /// Check structural invariants
    pub fn validate(&self) -> Result<()> {
        if self.role == Role::Tool && self.tool_call_id.as_deref().is_none_or(str::is_empty) {
            return Err(Error::InvalidMessage(
                "tool result message is missing tool_call_id".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_result_carries_call_id() {
        let msg = Message::tool_result("call_1", "search", "3 hits");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
        assert!(msg.validate().is_ok());
    }

    #[test]
    fn test_tool_message_without_call_id_is_invalid() {
        let mut msg = Message::tool_result("call_1", "search", "3 hits");
        msg.tool_call_id = None;
        assert!(matches!(msg.validate(), Err(Error::InvalidMessage(_))));
    }

    #[test]
    fn test_function_related() {
        assert!(Message::tool_result("c", "f", "").is_function_related());
        assert!(
            Message::assistant("")
                .with_tool_calls(vec![ToolCall::new("c", "f", serde_json::json!({}))])
                .is_function_related()
        );
        assert!(
            Message::assistant("")
                .with_function_call("f", serde_json::json!({"a": 1}))
                .is_function_related()
        );
        assert!(!Message::assistant("hello").is_function_related());
        assert!(!Message::system("rules").is_function_related());
    }

    #[test]
    fn test_char_count_includes_name() {
        let msg = Message::assistant("hello").with_name("Bob");
        assert_eq!(msg.char_count(), 8);
        // Multi-byte characters count once
        assert_eq!(Message::user("héllo").char_count(), 5);
    }

    #[test]
    fn test_legacy_function_role_deserializes_as_tool() {
        let msg: Message = serde_json::from_str(
            r#"{"role":"function","content":"42","name":"calc","tool_call_id":"c1"}"#,
        )
        .unwrap();
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.timestamp, 0);
    }

    #[test]
    fn test_serialize_skips_empty_fields() {
        let json = serde_json::to_value(Message::user("hi")).unwrap();
        assert_eq!(json["role"], "user");
        assert!(json.get("name").is_none());
        assert!(json.get("tool_calls").is_none());
    }
}
