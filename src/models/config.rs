//! Configuration models for codegenie.
//!
//! All I^R (resolvable ignorance) is parameterized here.
//! The user resolves these unknowns at runtime via config file.

use super::Source;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration for codegenie.
///
/// Every section is optional; a missing section takes its defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Cache / analytics store settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Input sanitizing, rate limits and the code sandbox
    #[serde(default)]
    pub security: SecurityConfig,

    /// Research engine settings
    #[serde(default)]
    pub research: ResearchConfig,

    /// SAT experiment settings
    #[serde(default)]
    pub experiments: ExperimentConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind
    #[serde(default = "default_port")]
    pub port: u16,

    /// Assistant sessions idle longer than this are dropped
    #[serde(default = "default_session_idle_minutes")]
    pub session_idle_minutes: i64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8501
}

fn default_session_idle_minutes() -> i64 {
    120
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            session_idle_minutes: default_session_idle_minutes(),
        }
    }
}

impl ServerConfig {
    /// Socket address string for `tide::Server::listen`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Persist tables to disk (false keeps everything in memory)
    #[serde(default = "default_true")]
    pub persist: bool,

    /// Snapshot file path
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("cache.json")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            persist: true,
            path: default_storage_path(),
        }
    }
}

/// A sliding-window rate limit rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRule {
    /// Maximum number of actions inside the window
    pub limit: usize,
    /// Window length in seconds
    pub window_secs: u64,
}

impl RateLimitRule {
    pub const fn new(limit: usize, window_secs: u64) -> Self {
        Self { limit, window_secs }
    }

    pub fn window(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.window_secs)
    }
}

/// Security configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Maximum accepted length for free-text input
    #[serde(default = "default_max_input_length")]
    pub max_input_length: usize,

    /// Maximum accepted length for assistant goals
    #[serde(default = "default_max_goal_length")]
    pub max_goal_length: usize,

    /// Maximum accepted code length for the sandbox
    #[serde(default = "default_max_code_length")]
    pub max_code_length: usize,

    /// Sandbox wall-clock limit in seconds
    #[serde(default = "default_execution_timeout")]
    pub execution_timeout_secs: u64,

    /// Sandbox output cap in characters
    #[serde(default = "default_max_output_chars")]
    pub max_output_chars: usize,

    /// Interpreter used to run sandboxed code
    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    /// Rate limit for assistant goals
    #[serde(default = "default_goal_limit")]
    pub goal_limit: RateLimitRule,

    /// Rate limit for sandbox executions
    #[serde(default = "default_code_limit")]
    pub code_limit: RateLimitRule,

    /// Case-insensitive patterns rejected in code and masked in text
    #[serde(default = "default_blocked_patterns")]
    pub blocked_patterns: Vec<String>,
}

fn default_max_input_length() -> usize {
    2000
}

fn default_max_goal_length() -> usize {
    3000
}

fn default_max_code_length() -> usize {
    10_000
}

fn default_execution_timeout() -> u64 {
    30
}

fn default_max_output_chars() -> usize {
    2000
}

fn default_interpreter() -> String {
    "python3".to_string()
}

fn default_goal_limit() -> RateLimitRule {
    RateLimitRule::new(20, 300)
}

fn default_code_limit() -> RateLimitRule {
    RateLimitRule::new(5, 300)
}

/// Patterns blocked by default.
pub fn default_blocked_patterns() -> Vec<String> {
    [
        r"import\s+(os|sys|shutil|subprocess|socket)",
        r"__import__",
        r"eval\(",
        r"exec\(",
        r"open\(",
        r"system\(",
        r"popen\(",
        r"rm\s+",
        r"del\s+",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_input_length: default_max_input_length(),
            max_goal_length: default_max_goal_length(),
            max_code_length: default_max_code_length(),
            execution_timeout_secs: default_execution_timeout(),
            max_output_chars: default_max_output_chars(),
            interpreter: default_interpreter(),
            goal_limit: default_goal_limit(),
            code_limit: default_code_limit(),
            blocked_patterns: default_blocked_patterns(),
        }
    }
}

/// Research engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    /// Sources queried for every search, in display order
    #[serde(default = "default_sources")]
    pub sources: Vec<Source>,

    /// Per-request HTTP timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Upper bound for a single source, retries included
    #[serde(default = "default_source_timeout")]
    pub source_timeout_secs: u64,

    /// How long search results stay cached
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_minutes: i64,

    /// Attempts against the web source before falling back
    #[serde(default = "default_web_attempts")]
    pub web_attempts: u32,

    /// User agents rotated across requests
    #[serde(default = "default_user_agents")]
    pub user_agents: Vec<String>,

    #[serde(default = "default_duckduckgo_url")]
    pub duckduckgo_url: String,

    #[serde(default = "default_wikipedia_url")]
    pub wikipedia_url: String,

    #[serde(default = "default_arxiv_url")]
    pub arxiv_url: String,

    #[serde(default = "default_semantic_scholar_url")]
    pub semantic_scholar_url: String,

    /// Semantic Scholar API key (supports ${ENV_VAR})
    #[serde(default)]
    pub semantic_scholar_api_key: Option<String>,

    /// Environment variable consulted when no key is configured
    #[serde(default = "default_semantic_scholar_key_env")]
    pub semantic_scholar_api_key_env: String,
}

fn default_sources() -> Vec<Source> {
    vec![Source::Web, Source::Wikipedia, Source::Arxiv]
}

fn default_request_timeout() -> u64 {
    10
}

fn default_source_timeout() -> u64 {
    15
}

fn default_cache_ttl() -> i64 {
    60
}

fn default_web_attempts() -> u32 {
    3
}

fn default_user_agents() -> Vec<String> {
    vec![
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string(),
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36".to_string(),
    ]
}

fn default_duckduckgo_url() -> String {
    "https://api.duckduckgo.com/".to_string()
}

fn default_wikipedia_url() -> String {
    "https://en.wikipedia.org/api/rest_v1/page/summary".to_string()
}

fn default_arxiv_url() -> String {
    "http://export.arxiv.org/api/query".to_string()
}

fn default_semantic_scholar_url() -> String {
    "https://api.semanticscholar.org/graph/v1/paper/search".to_string()
}

fn default_semantic_scholar_key_env() -> String {
    "SEMANTIC_SCHOLAR_API_KEY".to_string()
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            sources: default_sources(),
            request_timeout_secs: default_request_timeout(),
            source_timeout_secs: default_source_timeout(),
            cache_ttl_minutes: default_cache_ttl(),
            web_attempts: default_web_attempts(),
            user_agents: default_user_agents(),
            duckduckgo_url: default_duckduckgo_url(),
            wikipedia_url: default_wikipedia_url(),
            arxiv_url: default_arxiv_url(),
            semantic_scholar_url: default_semantic_scholar_url(),
            semantic_scholar_api_key: None,
            semantic_scholar_api_key_env: default_semantic_scholar_key_env(),
        }
    }
}

impl ResearchConfig {
    /// Resolve the Semantic Scholar key from config or environment.
    ///
    /// The key is optional; anonymous requests are allowed at a lower quota.
    pub fn resolve_semantic_scholar_key(&self) -> Option<String> {
        if let Some(key) = &self.semantic_scholar_api_key {
            return Some(expand_env_vars(key));
        }
        std::env::var(&self.semantic_scholar_api_key_env).ok()
    }
}

/// SAT experiment configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// JSONL log of every experiment run
    #[serde(default = "default_experiment_log")]
    pub log_path: PathBuf,

    /// Largest accepted variable count
    #[serde(default = "default_max_vars")]
    pub max_vars: usize,

    /// Largest accepted clause count
    #[serde(default = "default_max_clauses")]
    pub max_clauses: usize,

    /// Actor recorded on ethics approval stamps
    #[serde(default = "default_actor")]
    pub actor: String,

    /// Branching decisions before a run is recorded as solver_failed
    #[serde(default = "default_max_decisions")]
    pub max_decisions: u64,
}

fn default_experiment_log() -> PathBuf {
    PathBuf::from("experiment_log.jsonl")
}

fn default_max_vars() -> usize {
    500
}

fn default_max_clauses() -> usize {
    5000
}

fn default_actor() -> String {
    "codegenie".to_string()
}

fn default_max_decisions() -> u64 {
    1_000_000
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            log_path: default_experiment_log(),
            max_vars: default_max_vars(),
            max_clauses: default_max_clauses(),
            actor: default_actor(),
            max_decisions: default_max_decisions(),
        }
    }
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// B_i(file exists) → Result
    /// B_i(file is valid TOML) → Result
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_owned(),
            source: e,
        })
    }

    /// Load from `path` when it exists, otherwise fall back to defaults.
    ///
    /// Used when the path is the implicit default rather than user-supplied.
    pub fn from_file_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Reject values that would make the service unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.server.port == 0 {
            return invalid("server.port must be non-zero");
        }
        if self.server.session_idle_minutes <= 0 {
            return invalid("server.session_idle_minutes must be positive");
        }
        if self.security.interpreter.trim().is_empty() {
            return invalid("security.interpreter must not be empty");
        }
        for (name, rule) in [
            ("security.goal_limit", self.security.goal_limit),
            ("security.code_limit", self.security.code_limit),
        ] {
            if rule.limit == 0 || rule.window_secs == 0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} needs a non-zero limit and window"
                )));
            }
        }
        if self.security.max_input_length == 0
            || self.security.max_goal_length == 0
            || self.security.max_code_length == 0
        {
            return invalid("security length limits must be non-zero");
        }
        for pattern in &self.security.blocked_patterns {
            if let Err(e) = regex::Regex::new(pattern) {
                return Err(ConfigError::Invalid(format!(
                    "blocked pattern '{pattern}' is not a valid regex: {e}"
                )));
            }
        }
        if self.research.sources.is_empty() {
            return invalid("research.sources must list at least one source");
        }
        if self.research.user_agents.is_empty() {
            return invalid("research.user_agents must not be empty");
        }
        if self.experiments.max_vars < 3 {
            return invalid("experiments.max_vars must be at least 3");
        }
        Ok(())
    }
}

/// Expand environment variables in a string.
///
/// Supports ${VAR_NAME} syntax.
/// If the variable is not set, the placeholder is left unchanged.
pub fn expand_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    let re = match regex::Regex::new(r"\$\{([^}]+)\}") {
        Ok(re) => re,
        Err(_) => return result,
    };

    for cap in re.captures_iter(s) {
        let var_name = &cap[1];
        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(&cap[0], &value);
        }
    }

    result
}

/// Configuration errors.
///
/// Epistemic origin:
/// - B_i falsified: File not found, parse error
/// - I^B materialized: Values that parse but cannot work
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_match_service_contract() {
        let config = Config::default();
        assert_eq!(config.server.port, 8501);
        assert_eq!(config.security.goal_limit, RateLimitRule::new(20, 300));
        assert_eq!(config.security.code_limit, RateLimitRule::new(5, 300));
        assert_eq!(config.security.execution_timeout_secs, 30);
        assert_eq!(config.research.cache_ttl_minutes, 60);
        assert_eq!(config.security.blocked_patterns.len(), 9);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9000

[research]
sources = ["wikipedia", "semantic_scholar"]
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(
            config.research.sources,
            vec![Source::Wikipedia, Source::SemanticScholar]
        );
        assert_eq!(config.security.max_code_length, 10_000);
    }

    #[test]
    fn test_missing_default_file_is_allowed() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = Config::from_file_or_default(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.server.port, 8501);
        assert!(Config::from_file(&dir.path().join("nope.toml")).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.security.code_limit = RateLimitRule::new(0, 300);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.security.blocked_patterns.push("(unclosed".to_string());
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.research.sources.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_expand_env_vars_leaves_unknown_placeholders() {
        assert_eq!(
            expand_env_vars("key-${CODEGENIE_SURELY_UNSET_VAR}"),
            "key-${CODEGENIE_SURELY_UNSET_VAR}"
        );
        assert_eq!(expand_env_vars("plain"), "plain");
    }
}
