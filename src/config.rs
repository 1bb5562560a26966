use crate::error::RelayError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

fn default_api_key() -> String {
    String::new()
}
fn default_api_version() -> String {
    "v1".into()
}
fn default_api_base_url() -> String {
    "https://api.openai.com".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_system_prompt() -> String {
    "You are a helpful assistant.".into()
}
fn default_remember() -> bool {
    true
}
fn default_transcription_model() -> String {
    "whisper-1".into()
}
fn default_max_history_messages() -> usize {
    50
}
fn default_web_host() -> String {
    "127.0.0.1".into()
}
fn default_web_port() -> u16 {
    3000
}
fn default_upload_dir() -> String {
    "./uploads".into()
}
fn default_max_upload_mb() -> usize {
    50
}
fn default_request_timeout_secs() -> u64 {
    120
}
fn default_session_idle_ttl_seconds() -> u64 {
    3600
}
fn default_data_dir() -> String {
    "./voicerelay.data".into()
}
fn default_log_retention_days() -> u32 {
    30
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_api_key")]
    pub api_key: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_remember")]
    pub remember: bool,
    #[serde(default = "default_transcription_model")]
    pub transcription_model: String,
    /// Per-session history cap; 0 keeps every message.
    #[serde(default = "default_max_history_messages")]
    pub max_history_messages: usize,
    #[serde(default = "default_web_host")]
    pub web_host: String,
    #[serde(default = "default_web_port")]
    pub web_port: u16,
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_session_idle_ttl_seconds")]
    pub session_idle_ttl_seconds: u64,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Hourly log files older than this are deleted; 0 keeps them all.
    #[serde(default = "default_log_retention_days")]
    pub log_retention_days: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_key: default_api_key(),
            api_version: default_api_version(),
            api_base_url: default_api_base_url(),
            model: default_model(),
            system_prompt: default_system_prompt(),
            remember: default_remember(),
            transcription_model: default_transcription_model(),
            max_history_messages: default_max_history_messages(),
            web_host: default_web_host(),
            web_port: default_web_port(),
            upload_dir: default_upload_dir(),
            max_upload_mb: default_max_upload_mb(),
            request_timeout_secs: default_request_timeout_secs(),
            session_idle_ttl_seconds: default_session_idle_ttl_seconds(),
            data_dir: default_data_dir(),
            log_retention_days: default_log_retention_days(),
        }
    }
}

impl Config {
    /// `{base}/{version}`, e.g. `https://api.openai.com/v1`.
    pub fn api_root(&self) -> String {
        format!(
            "{}/{}",
            self.api_base_url.trim_end_matches('/'),
            self.api_version.trim_matches('/')
        )
    }

    pub fn history_limit(&self) -> Option<usize> {
        (self.max_history_messages > 0).then_some(self.max_history_messages)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn session_idle_ttl(&self) -> Duration {
        Duration::from_secs(self.session_idle_ttl_seconds)
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }

    pub fn upload_dir_path(&self) -> PathBuf {
        PathBuf::from(&self.upload_dir)
    }

    /// Hourly log files live under the data directory.
    pub fn log_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join("logs")
    }

    pub fn log_retention(&self) -> Option<u32> {
        (self.log_retention_days > 0).then_some(self.log_retention_days)
    }

    pub fn web_addr(&self) -> String {
        format!("{}:{}", self.web_host, self.web_port)
    }

    pub fn resolve_config_path() -> Result<Option<PathBuf>, RelayError> {
        if let Ok(custom) = std::env::var("VOICERELAY_CONFIG") {
            if std::path::Path::new(&custom).exists() {
                return Ok(Some(PathBuf::from(custom)));
            }
            return Err(RelayError::StartupConfig(format!(
                "VOICERELAY_CONFIG points to non-existent file: {custom}"
            )));
        }

        for candidate in ["./voicerelay.config.yaml", "./voicerelay.config.yml"] {
            if std::path::Path::new(candidate).exists() {
                return Ok(Some(PathBuf::from(candidate)));
            }
        }
        Ok(None)
    }

    /// Load the optional YAML file, apply `.env` and environment overrides,
    /// then validate. A missing API key is fatal.
    pub fn load() -> Result<Self, RelayError> {
        let _ = dotenvy::dotenv();

        let mut config = match Self::resolve_config_path()? {
            Some(path) => {
                let path_str = path.to_string_lossy().to_string();
                let content = std::fs::read_to_string(&path).map_err(|e| {
                    RelayError::StartupConfig(format!("Failed to read {path_str}: {e}"))
                })?;
                serde_yaml::from_str::<Config>(&content).map_err(|e| {
                    RelayError::StartupConfig(format!("Failed to parse {path_str}: {e}"))
                })?
            }
            None => Config::default(),
        };

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.post_deserialize()?;
        Ok(config)
    }

    pub(crate) fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), RelayError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("OPENAI_API_KEY") {
            self.api_key = v;
        }
        if let Some(v) = get("OPENAI_VER") {
            self.api_version = v;
        }
        if let Some(v) = get("OPENAI_BASE_URL") {
            self.api_base_url = v;
        }
        if let Some(v) = get("HOST") {
            self.web_host = v;
        }
        if let Some(v) = get("PORT") {
            self.web_port = v
                .trim()
                .parse()
                .map_err(|_| RelayError::StartupConfig(format!("Invalid PORT: {v}")))?;
        }
        Ok(())
    }

    /// Apply post-deserialization normalization and validation.
    pub fn post_deserialize(&mut self) -> Result<(), RelayError> {
        self.api_key = self.api_key.trim().to_string();
        if self.api_key.is_empty() {
            return Err(RelayError::StartupConfig(
                "Missing OpenAI API Key (set OPENAI_API_KEY or api_key)".into(),
            ));
        }

        if self.api_version.trim().is_empty() {
            self.api_version = default_api_version();
        }
        if self.api_base_url.trim().is_empty() {
            self.api_base_url = default_api_base_url();
        }
        if self.model.trim().is_empty() {
            self.model = default_model();
        }
        if self.transcription_model.trim().is_empty() {
            self.transcription_model = default_transcription_model();
        }
        if self.web_host.trim().is_empty() {
            self.web_host = default_web_host();
        }
        if self.upload_dir.trim().is_empty() {
            self.upload_dir = default_upload_dir();
        }
        if self.max_upload_mb == 0 {
            self.max_upload_mb = default_max_upload_mb();
        }
        if self.request_timeout_secs == 0 {
            self.request_timeout_secs = default_request_timeout_secs();
        }
        if self.session_idle_ttl_seconds == 0 {
            self.session_idle_ttl_seconds = default_session_idle_ttl_seconds();
        }
        Ok(())
    }

    /// Valid defaults with a placeholder key, for tests and local tooling.
    pub fn test_defaults() -> Config {
        Config {
            api_key: "sk-test".into(),
            ..Config::default()
        }
    }
}
