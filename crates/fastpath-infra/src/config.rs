//! Configuration loader for fastpath.
//!
//! Reads `fastpath.toml` from the data directory (`~/.fastpath/` in
//! production), applies `FASTPATH_*` / `GEMINI_*` environment overrides, and
//! clamps the result to safety floors. Falls back to defaults when the file
//! is missing or malformed.
//!
//! File layout:
//! ```toml
//! [engine]
//! model = "gemini-2.5-flash"
//! turn_timeout_ms = 180000
//!
//! [gemini]
//! cache_ttl_secs = 3600
//! ```

use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::Deserialize;

use fastpath_types::config::EngineConfig;

pub const CONFIG_FILE_NAME: &str = "fastpath.toml";

/// Turns shorter than this cannot complete even one model call reliably.
const MIN_TURN_TIMEOUT_MS: u64 = 5_000;

/// Progress events closer together than this only add overhead.
const MIN_PROGRESS_INTERVAL_MS: u64 = 50;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {name}: '{value}'")]
    InvalidEnv { name: String, value: String },
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Connection settings for the Gemini API.
#[derive(Debug, Deserialize)]
pub struct GeminiSettings {
    /// Never read from the file; only from `GEMINI_API_KEY`.
    #[serde(skip)]
    pub api_key: Option<SecretString>,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Lifetime of created `cachedContents` resources.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Instructions shorter than this are not worth caching.
    #[serde(default = "default_min_cache_chars")]
    pub min_cache_chars: usize,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_cache_ttl_secs() -> u64 {
    3_600
}

fn default_min_cache_chars() -> usize {
    // Roughly the provider's minimum cacheable token count.
    4_096
}

fn default_request_timeout_secs() -> u64 {
    300
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            cache_ttl_secs: default_cache_ttl_secs(),
            min_cache_chars: default_min_cache_chars(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Everything loaded from `fastpath.toml` and the environment.
#[derive(Debug, Default, Deserialize)]
pub struct FastpathSettings {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub gemini: GeminiSettings,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// `$FASTPATH_DATA_DIR`, else `~/.fastpath`.
pub fn default_data_dir() -> Option<PathBuf> {
    std::env::var_os("FASTPATH_DATA_DIR")
        .map(PathBuf::from)
        .or_else(|| dirs::home_dir().map(|home| home.join(".fastpath")))
}

/// Read and parse a settings file. Strict: every failure is an error.
pub async fn read_settings_file(path: &Path) -> Result<FastpathSettings, ConfigError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Load settings from `{data_dir}/fastpath.toml` and the process environment.
///
/// - Missing file: defaults.
/// - Unreadable or malformed file: logs a warning, defaults.
/// - Invalid environment values: logs a warning, ignores that variable.
pub async fn load_settings(data_dir: &Path) -> FastpathSettings {
    load_settings_with(data_dir, |name| std::env::var(name).ok()).await
}

/// [`load_settings`] with an injectable environment lookup.
pub async fn load_settings_with(
    data_dir: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> FastpathSettings {
    let config_path = data_dir.join(CONFIG_FILE_NAME);

    let mut settings = match read_settings_file(&config_path).await {
        Ok(settings) => settings,
        Err(ConfigError::Read { source, .. })
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            tracing::debug!(
                "No {CONFIG_FILE_NAME} found at {}, using defaults",
                config_path.display()
            );
            FastpathSettings::default()
        }
        Err(err) => {
            tracing::warn!("{err}, using defaults");
            FastpathSettings::default()
        }
    };

    for err in apply_env_overrides(&mut settings, &env) {
        tracing::warn!("{err}, ignoring");
    }
    clamp_engine_config(&mut settings.engine);
    settings
}

/// Apply environment overrides in place. Returns one error per variable
/// that was set but could not be parsed; those variables are skipped.
pub fn apply_env_overrides(
    settings: &mut FastpathSettings,
    env: &impl Fn(&str) -> Option<String>,
) -> Vec<ConfigError> {
    let mut errors = Vec::new();
    let engine = &mut settings.engine;

    macro_rules! override_with {
        ($name:literal, $field:expr, $parse:expr) => {
            if let Some(raw) = env($name) {
                match $parse(raw.trim()) {
                    Some(value) => $field = value,
                    None => errors.push(ConfigError::InvalidEnv {
                        name: $name.to_string(),
                        value: raw,
                    }),
                }
            }
        };
    }

    override_with!("FASTPATH_ENABLED", engine.enabled, parse_bool);
    override_with!("FASTPATH_MODEL", engine.model, parse_non_empty);
    override_with!("FASTPATH_TURN_TIMEOUT_MS", engine.turn_timeout_ms, parse_num);
    override_with!("FASTPATH_PROGRESS_INTERVAL_MS", engine.progress_interval_ms, parse_num);
    override_with!("FASTPATH_MAX_CALLS_PER_TURN", engine.max_calls_per_turn, parse_num);
    override_with!("FASTPATH_MAX_TOOL_ROUNDS", engine.max_tool_rounds, parse_num);
    override_with!("FASTPATH_KNOWLEDGE_MAX_CHARS", engine.knowledge_max_chars, parse_num);
    override_with!("FASTPATH_MAX_HISTORY_TURNS", engine.max_history_turns, parse_num);
    override_with!("FASTPATH_FOLLOW_UP_SUGGESTIONS", engine.follow_up_suggestions, parse_bool);
    override_with!("FASTPATH_NOTIFY_SKIPPED_CALLS", engine.notify_skipped_calls, parse_bool);
    override_with!("GEMINI_BASE_URL", settings.gemini.base_url, parse_non_empty);

    if let Some(key) = env("GEMINI_API_KEY").filter(|k| !k.trim().is_empty()) {
        settings.gemini.api_key = Some(SecretString::from(key.trim().to_string()));
    }

    errors
}

/// Enforce safety floors regardless of source.
pub fn clamp_engine_config(config: &mut EngineConfig) {
    config.turn_timeout_ms = config.turn_timeout_ms.max(MIN_TURN_TIMEOUT_MS);
    config.progress_interval_ms = config.progress_interval_ms.max(MIN_PROGRESS_INTERVAL_MS);
    config.max_calls_per_turn = config.max_calls_per_turn.max(1);
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_num<T: std::str::FromStr>(raw: &str) -> Option<T> {
    raw.parse().ok()
}

fn parse_non_empty(raw: &str) -> Option<String> {
    (!raw.is_empty()).then(|| raw.to_string())
}
