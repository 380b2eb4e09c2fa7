use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

// ── Advisor config ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorConfig {
    /// Display name the advisor uses for itself in the system prompt.
    pub name: String,
    /// Owner id under which all ledger rows are recorded.  A single-user
    /// install keeps the default; multi-profile installs set one per profile.
    pub owner_id: String,
    /// Maximum tool-call → result → re-prompt rounds per user turn.
    pub max_tool_rounds: usize,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            name: "Fincoach".to_string(),
            owner_id: "local".to_string(),
            max_tool_rounds: 5,
        }
    }
}

// ── LLM config ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// `"ollama"` or `"openrouter"`.
    pub provider: String,
    pub ollama_model: String,
    pub openrouter_model: String,
    /// Base URL for the Ollama API.  Overridden at runtime by the
    /// `OLLAMA_BASE_URL` environment variable when set.
    pub ollama_base_url: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            ollama_model: "llama3.1:8b".to_string(),
            openrouter_model: "openai/gpt-4o-mini".to_string(),
            ollama_base_url: "http://localhost:11434".to_string(),
        }
    }
}

// ── Search config ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Brave Search API key.  The `BRAVE_API_KEY` environment variable takes
    /// precedence over the config file when both are set.
    pub brave_api_key: String,
    /// Maximum raw results requested per search call.
    pub max_results: usize,
    /// Freshness window in days.  Results older than this are not requested.
    pub freshness_days: i64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            brave_api_key: String::new(),
            max_results: 20,
            freshness_days: 730,
        }
    }
}

// ── Curation config ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CurationConfig {
    /// Fixed delay in milliseconds after each step's pipeline completes.
    /// Keeps the whole pipeline under the search API's 1 req/sec quota even
    /// when a step's own stages finish quickly.
    pub step_delay_ms: u64,
    /// Minimum curated resources per step before `insufficient_sources` is
    /// forced.
    pub min_resources: usize,
    /// Maximum curated resources the model is asked to select.
    pub max_resources: usize,
}

impl Default for CurationConfig {
    fn default() -> Self {
        Self {
            step_delay_ms: 1100,
            min_resources: 5,
            max_resources: 8,
        }
    }
}

// ── Ledger config ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Path to the redb database file.  `~` is not expanded; relative paths
    /// resolve against the working directory.  Overridden by the
    /// `FINCOACH_DB_PATH` environment variable when set.
    pub db_path: String,
    /// Normalized title similarity at or above which a new goal is treated
    /// as a duplicate of an existing one (0.0 – 1.0).
    pub goal_dedup_threshold: f64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            db_path: default_data_dir()
                .join("ledger.redb")
                .to_string_lossy()
                .to_string(),
            goal_dedup_threshold: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

// ── AppConfig ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub advisor: AdvisorConfig,
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub curation: CurationConfig,
    pub ledger: LedgerConfig,
    pub telemetry: TelemetryConfig,
}

/// `~/.fincoach` (falls back to the working directory when `$HOME` is unset).
pub fn default_data_dir() -> PathBuf {
    env::var("HOME")
        .map(|home| Path::new(&home).join(".fincoach"))
        .unwrap_or_else(|_| PathBuf::from(".fincoach"))
}

pub fn default_config_path() -> PathBuf {
    default_data_dir().join("config.toml")
}

impl AppConfig {
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Ok(raw) = fs::read_to_string(path) {
            config = toml::from_str(&raw)?;
        }

        // Env overrides take precedence over the config file.
        if let Ok(key) = env::var("BRAVE_API_KEY") {
            if !key.is_empty() {
                config.search.brave_api_key = key;
            }
        }
        if let Ok(url) = env::var("OLLAMA_BASE_URL") {
            if !url.is_empty() {
                config.llm.ollama_base_url = url;
            }
        }
        if let Ok(path) = env::var("FINCOACH_DB_PATH") {
            if !path.is_empty() {
                config.ledger.db_path = path;
            }
        }

        Ok(config)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let rendered = toml::to_string_pretty(self)?;
        fs::write(path, rendered)?;
        Ok(())
    }

    pub fn active_model(&self) -> &str {
        if self.llm.provider.eq_ignore_ascii_case("openrouter") {
            &self.llm.openrouter_model
        } else {
            &self.llm.ollama_model
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn functional_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.advisor.name, "Fincoach");
        assert_eq!(cfg.advisor.owner_id, "local");
        assert_eq!(cfg.llm.provider, "ollama");
        assert_eq!(cfg.llm.ollama_base_url, "http://localhost:11434");
        assert_eq!(cfg.search.max_results, 20);
        assert_eq!(cfg.search.freshness_days, 730);
        assert_eq!(cfg.curation.step_delay_ms, 1100);
        assert_eq!(cfg.curation.min_resources, 5);
        assert_eq!(cfg.curation.max_resources, 8);
        assert_eq!(cfg.ledger.goal_dedup_threshold, 0.7);
        assert_eq!(cfg.telemetry.log_level, "info");
    }

    #[test]
    fn load_from_missing_file_returns_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = AppConfig::load_from(dir.path().join("nonexistent.toml")).unwrap();
        assert_eq!(cfg.advisor.name, "Fincoach");
        assert_eq!(cfg.llm.provider, "ollama");
    }

    #[test]
    fn load_from_valid_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.toml");
        fs::write(
            &path,
            r#"
[advisor]
name = "Coach"
owner_id = "alice"

[llm]
provider = "openrouter"
openrouter_model = "anthropic/claude-3.5-sonnet"

[curation]
step_delay_ms = 500

[ledger]
db_path = "/tmp/test-ledger.redb"
goal_dedup_threshold = 0.8
"#,
        )
        .unwrap();

        let cfg = AppConfig::load_from(&path).unwrap();
        assert_eq!(cfg.advisor.name, "Coach");
        assert_eq!(cfg.advisor.owner_id, "alice");
        assert_eq!(cfg.llm.provider, "openrouter");
        assert_eq!(cfg.llm.openrouter_model, "anthropic/claude-3.5-sonnet");
        assert_eq!(cfg.curation.step_delay_ms, 500);
        assert_eq!(cfg.ledger.db_path, "/tmp/test-ledger.redb");
        assert_eq!(cfg.ledger.goal_dedup_threshold, 0.8);
        // Untouched sections keep their defaults.
        assert_eq!(cfg.search.max_results, 20);
    }

    #[test]
    fn partial_section_keeps_other_fields_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("partial.toml");
        fs::write(&path, "[llm]\nprovider = \"openrouter\"\n").unwrap();

        let cfg = AppConfig::load_from(&path).unwrap();
        assert_eq!(cfg.llm.provider, "openrouter");
        assert_eq!(cfg.llm.ollama_model, "llama3.1:8b");
    }

    #[test]
    fn save_and_reload_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut cfg = AppConfig::default();
        cfg.advisor.owner_id = "bob".to_string();
        cfg.curation.max_resources = 6;
        cfg.save_to(&path).unwrap();

        let reloaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(reloaded.advisor.owner_id, "bob");
        assert_eq!(reloaded.curation.max_resources, 6);
    }

    #[test]
    fn active_model_follows_provider() {
        let mut cfg = AppConfig::default();
        assert_eq!(cfg.active_model(), "llama3.1:8b");
        cfg.llm.provider = "openrouter".to_string();
        assert_eq!(cfg.active_model(), "openai/gpt-4o-mini");
        cfg.llm.provider = "OpenRouter".to_string();
        assert_eq!(cfg.active_model(), "openai/gpt-4o-mini");
    }
}
