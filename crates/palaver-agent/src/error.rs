//! Error types for palaver-agent

use thiserror::Error;

/// Result type alias using palaver-agent Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort a conversation run or a speaker selection
#[derive(Error, Debug)]
pub enum Error {
    /// A selector was handed a roster with no agents
    #[error("Cannot select a speaker from an empty roster")]
    EmptyRoster,

    /// An orchestrator needs at least two agents
    #[error("A conversation needs at least 2 agents, got {count}")]
    InsufficientAgents { count: usize },

    /// A manual override named an agent that is not in the roster
    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    /// The allow-list matched nobody in the roster
    #[error("None of the allowed agents are in the roster")]
    NoAllowedAgents,

    /// An error from the agent's reply-generation backend
    #[error(transparent)]
    Provider(#[from] palaver_ai::Error),

    /// The run was cancelled through its handle
    #[error("Conversation cancelled")]
    Cancelled,

    /// Invalid orchestrator or selector configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Whether this error came from the reply-generation backend
    pub fn is_provider_error(&self) -> bool {
        matches!(self, Error::Provider(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_is_transparent() {
        let err: Error = palaver_ai::Error::api("server_error", "boom").into();
        assert!(err.is_provider_error());
        assert_eq!(err.to_string(), "API error: boom (type: server_error)");
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            Error::InsufficientAgents { count: 1 }.to_string(),
            "A conversation needs at least 2 agents, got 1"
        );
        assert_eq!(Error::UnknownAgent("Zed".into()).to_string(), "Unknown agent: Zed");
        assert!(!Error::EmptyRoster.is_provider_error());
    }
}
