//! Configuration file support

use anyhow::Context;
use palaver_agent::{CompactionConfig, OrchestratorConfig, SelectionStrategy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration for palaver
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PalaverConfig {
    pub conversation: ConversationSettings,
    pub compaction: CompactionConfig,
    /// Roster, in speaking order
    pub agents: Vec<AgentSettings>,
}

/// The `[conversation]` table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationSettings {
    pub max_rounds: u32,
    pub admin_name: String,
    pub termination_marker: String,
    pub strategy: SelectionStrategy,
    /// When non-empty, only these agents may be selected
    pub allowed: Vec<String>,
    /// Hand agents a compacted view of the transcript
    pub compact_context: bool,
}

impl Default for ConversationSettings {
    fn default() -> Self {
        let defaults = OrchestratorConfig::default();
        Self {
            max_rounds: defaults.max_rounds,
            admin_name: defaults.admin_name,
            termination_marker: defaults.termination_marker,
            strategy: SelectionStrategy::default(),
            allowed: vec![],
            compact_context: false,
        }
    }
}

impl ConversationSettings {
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_rounds: self.max_rounds,
            admin_name: self.admin_name.clone(),
            termination_marker: self.termination_marker.clone(),
        }
    }
}

/// One `[[agents]]` entry: a scripted participant
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub name: String,
    /// Replies spoken in order, cycling when exhausted
    pub replies: Vec<String>,
    /// Simulated thinking time before each reply
    pub delay_ms: u64,
}

impl PalaverConfig {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("palaver")
    }

    /// Get the config file path: explicit path, then `PALAVER_CONFIG_PATH`,
    /// then the platform config directory.
    pub fn config_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        if let Ok(path) = std::env::var("PALAVER_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from `path`. A missing file yields the demo setup.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {}, using demo roster", path.display());
            return Ok(Self::demo());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Parse TOML config text. An empty roster is filled with the demo agents.
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let mut config: PalaverConfig = toml::from_str(content)?;
        if config.agents.is_empty() {
            config.agents = demo_agents();
        }
        Ok(config)
    }

    /// Defaults plus a two-agent demo roster
    pub fn demo() -> Self {
        Self {
            agents: demo_agents(),
            ..Self::default()
        }
    }

    /// Write the example config to `path` if nothing is there yet
    pub fn init(path: &Path) -> std::io::Result<PathBuf> {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, example_config())?;
        Ok(path.to_path_buf())
    }
}

fn demo_agents() -> Vec<AgentSettings> {
    vec![
        AgentSettings {
            name: "Optimist".to_string(),
            replies: vec![
                "I think we can ship this week if we cut the migration tool.".to_string(),
                "Fair. The migration tool can follow in a point release.".to_string(),
            ],
            delay_ms: 0,
        },
        AgentSettings {
            name: "Skeptic".to_string(),
            replies: vec![
                "Users upgrading from 0.x will be stuck without it.".to_string(),
                "Then we document the manual steps and ship. TERMINATE".to_string(),
            ],
            delay_ms: 0,
        },
    ]
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# palaver configuration file
# Place at ~/.config/palaver/config.toml (Linux/Mac) or %APPDATA%\palaver\config.toml (Windows)

[conversation]
# Rounds before the conversation stops on its own
max_rounds = 10

# Name shown on the opening prompt
admin_name = "Admin"

# A reply containing this text (any case) ends the conversation
termination_marker = "terminate"

# Speaker selection (round_robin, random)
strategy = "round_robin"

# Restrict selection to these agents (optional)
# allowed = ["Optimist", "Skeptic"]

# Hand each agent a compacted view of the transcript
compact_context = false

[compaction]
max_messages = 50
max_tokens = 8000
# truncate_oldest, selective, bookend, summarize
strategy = "truncate_oldest"
preserve_system = true
preserve_functions = true

[[agents]]
name = "Optimist"
replies = [
    "I think we can ship this week if we cut the migration tool.",
    "Fair. The migration tool can follow in a point release.",
]

[[agents]]
name = "Skeptic"
replies = [
    "Users upgrading from 0.x will be stuck without it.",
    "Then we document the manual steps and ship. TERMINATE",
]
# delay_ms = 500
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use palaver_agent::CompactionStrategy;

    #[test]
    fn test_example_config_parses() {
        let config = PalaverConfig::parse(example_config()).unwrap();
        assert_eq!(config.conversation.max_rounds, 10);
        assert_eq!(config.conversation.strategy, SelectionStrategy::RoundRobin);
        assert_eq!(config.compaction.max_messages, Some(50));
        assert_eq!(config.agents.len(), 2);
        assert_eq!(config.agents[1].name, "Skeptic");
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = PalaverConfig::parse(
            r#"
            [conversation]
            strategy = "random"
            allowed = ["A", "B"]

            [compaction]
            strategy = "bookend"

            [[agents]]
            name = "A"

            [[agents]]
            name = "B"
            replies = ["done, terminate"]
            "#,
        )
        .unwrap();

        assert_eq!(config.conversation.max_rounds, 10);
        assert_eq!(config.conversation.admin_name, "Admin");
        assert_eq!(config.conversation.strategy, SelectionStrategy::Random);
        assert_eq!(config.conversation.allowed, vec!["A", "B"]);
        assert_eq!(config.compaction.strategy, CompactionStrategy::Bookend);
        assert!(config.agents[0].replies.is_empty());
        assert_eq!(config.agents[1].delay_ms, 0);
    }

    #[test]
    fn test_empty_config_gets_demo_roster() {
        let config = PalaverConfig::parse("").unwrap();
        assert_eq!(config.agents.len(), 2);
        assert_eq!(config.agents[0].name, "Optimist");
    }

    #[test]
    fn test_bad_strategy_is_an_error() {
        let err = PalaverConfig::parse("[conversation]\nstrategy = \"loudest\"\n");
        assert!(err.is_err());
    }

    #[test]
    fn test_missing_file_is_demo() {
        let path = std::env::temp_dir().join("palaver-test-does-not-exist.toml");
        let config = PalaverConfig::load(&path).unwrap();
        assert_eq!(config.agents.len(), 2);
    }

    #[test]
    fn test_init_writes_example() {
        let dir = std::env::temp_dir().join(format!("palaver-init-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.toml");
        PalaverConfig::init(&path).unwrap();
        let loaded = PalaverConfig::load(&path).unwrap();
        assert_eq!(loaded.conversation.termination_marker, "terminate");
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_explicit_path_wins() {
        let path = PalaverConfig::config_path(Some(Path::new("/tmp/custom.toml")));
        assert_eq!(path, PathBuf::from("/tmp/custom.toml"));
    }

    #[test]
    fn test_orchestrator_config() {
        let settings = ConversationSettings {
            max_rounds: 3,
            ..Default::default()
        };
        let config = settings.orchestrator_config();
        assert_eq!(config.max_rounds, 3);
        assert_eq!(config.admin_name, "Admin");
    }
}
