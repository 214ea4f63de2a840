use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Token budget for assembled context. 1 token ≈ 4 chars.
pub const MAX_CONTEXT_TOKENS: usize = 2000;
/// Rough chars-per-token estimate for budgeting.
pub const CHARS_PER_TOKEN: usize = 4;
/// Unsummarized-message count that triggers auto-summarization.
pub const SUMMARY_INTERVAL: usize = 20;
/// Turns between profile learning passes.
pub const PROFILE_INTERVAL: u64 = 5;
/// Maximum tool-loop iterations in a single turn.
pub const MAX_TOOL_LOOPS: usize = 25;

/// Top-level config (bolt.toml + BOLT_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoltConfig {
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub models: ModelRoster,
    #[serde(default)]
    pub tools: ToolsConfig,
}

impl Default for BoltConfig {
    fn default() -> Self {
        Self {
            ollama: OllamaConfig::default(),
            database: DatabaseConfig::default(),
            models: ModelRoster::default(),
            tools: ToolsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_base_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Directory scanned for drop-in tool plugins.
    #[serde(default = "default_plugin_dir")]
    pub plugin_dir: String,
    /// Per-tool execution timeout in seconds.
    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            plugin_dir: default_plugin_dir(),
            timeout_secs: default_tool_timeout(),
        }
    }
}

/// Logical model slots. Each model is a region of BOLT's brain, not a
/// separate entity — the same identity briefing is injected into all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKey {
    /// Always-on tiny model for classification and background work.
    Router,
    /// General-purpose chat model with good personality.
    Companion,
    /// Small coder for quick snippets and the pipeline spec phase.
    FastCode,
    /// Light build worker.
    WorkerLight,
    /// Heavy build worker.
    WorkerHeavy,
    /// Architect, reviewer, hard problems.
    Beast,
    /// Cloud brain — resolved dynamically from the environment.
    Cloud,
}

impl std::fmt::Display for ModelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Router => write!(f, "router"),
            Self::Companion => write!(f, "companion"),
            Self::FastCode => write!(f, "fast_code"),
            Self::WorkerLight => write!(f, "worker_light"),
            Self::WorkerHeavy => write!(f, "worker_heavy"),
            Self::Beast => write!(f, "beast"),
            Self::Cloud => write!(f, "cloud"),
        }
    }
}

impl std::str::FromStr for ModelKey {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "router" => Ok(Self::Router),
            "companion" => Ok(Self::Companion),
            "fast_code" => Ok(Self::FastCode),
            "worker_light" => Ok(Self::WorkerLight),
            "worker_heavy" => Ok(Self::WorkerHeavy),
            "beast" => Ok(Self::Beast),
            "cloud" => Ok(Self::Cloud),
            other => Err(format!("unknown model key: {other}")),
        }
    }
}

/// Concrete model names for each logical slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRoster {
    #[serde(default = "default_router_model")]
    pub router: String,
    #[serde(default = "default_companion_model")]
    pub companion: String,
    #[serde(default = "default_fast_code_model")]
    pub fast_code: String,
    #[serde(default = "default_worker_light_model")]
    pub worker_light: String,
    #[serde(default = "default_worker_heavy_model")]
    pub worker_heavy: String,
    #[serde(default = "default_beast_model")]
    pub beast: String,
}

impl Default for ModelRoster {
    fn default() -> Self {
        Self {
            router: default_router_model(),
            companion: default_companion_model(),
            fast_code: default_fast_code_model(),
            worker_light: default_worker_light_model(),
            worker_heavy: default_worker_heavy_model(),
            beast: default_beast_model(),
        }
    }
}

impl ModelRoster {
    /// Resolve a logical key to a concrete model name.
    /// `Cloud` has no local name — the cloud client owns its own resolution.
    pub fn resolve(&self, key: ModelKey) -> Option<&str> {
        match key {
            ModelKey::Router => Some(&self.router),
            ModelKey::Companion => Some(&self.companion),
            ModelKey::FastCode => Some(&self.fast_code),
            ModelKey::WorkerLight => Some(&self.worker_light),
            ModelKey::WorkerHeavy => Some(&self.worker_heavy),
            ModelKey::Beast => Some(&self.beast),
            ModelKey::Cloud => None,
        }
    }

    /// Models kept warm during companion mode.
    pub fn companion_set(&self) -> Vec<&str> {
        vec![&self.router, &self.companion]
    }
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_db_path() -> String {
    format!("{}/.bolt/bolt.db", home_dir())
}

fn default_plugin_dir() -> String {
    format!("{}/.bolt/custom_tools", home_dir())
}

fn default_tool_timeout() -> u64 {
    120
}

fn default_router_model() -> String {
    "qwen2.5:1.5b".to_string()
}
fn default_companion_model() -> String {
    "qwen2.5:7b".to_string()
}
fn default_fast_code_model() -> String {
    "qwen2.5-coder:3b".to_string()
}
fn default_worker_light_model() -> String {
    "qwen2.5-coder:7b".to_string()
}
fn default_worker_heavy_model() -> String {
    "qwen2.5-coder:14b".to_string()
}
fn default_beast_model() -> String {
    "qwen2.5-coder:32b-instruct-q3_K_M".to_string()
}

/// The user's home directory. Falls back to "." when HOME is unset.
pub fn home_dir() -> String {
    std::env::var("HOME").unwrap_or_else(|_| ".".to_string())
}

impl BoltConfig {
    /// Load config from a TOML file with BOLT_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.bolt/bolt.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: BoltConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("BOLT_").split("_"))
            .extract()
            .map_err(|e| crate::error::BoltError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    format!("{}/.bolt/bolt.toml", home_dir())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roster_resolves_local_keys() {
        let roster = ModelRoster::default();
        assert_eq!(roster.resolve(ModelKey::Router), Some("qwen2.5:1.5b"));
        assert_eq!(roster.resolve(ModelKey::WorkerHeavy), Some("qwen2.5-coder:14b"));
        assert_eq!(roster.resolve(ModelKey::Cloud), None);
    }

    #[test]
    fn model_key_round_trips_through_strings() {
        for key in [
            ModelKey::Router,
            ModelKey::Companion,
            ModelKey::FastCode,
            ModelKey::WorkerLight,
            ModelKey::WorkerHeavy,
            ModelKey::Beast,
            ModelKey::Cloud,
        ] {
            let parsed: ModelKey = key.to_string().parse().unwrap();
            assert_eq!(parsed, key);
        }
    }

    #[test]
    fn default_config_is_complete() {
        let cfg = BoltConfig::default();
        assert_eq!(cfg.ollama.base_url, "http://localhost:11434");
        assert!(cfg.database.path.ends_with("bolt.db"));
        assert_eq!(cfg.tools.timeout_secs, 120);
    }
}
