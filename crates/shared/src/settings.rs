//! Application configuration.
//!
//! Loaded from a TOML file; every section has defaults so an empty (or
//! missing) file yields a working local setup. API keys are never read from
//! the file, only from the environment.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

/// Chat providers the router knows how to build.
pub const CHAT_PROVIDERS: &[&str] = &["local", "ollama", "openai", "gemini"];
/// Providers with an image-capable model.
pub const VISION_PROVIDERS: &[&str] = &["openai", "gemini"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub model: ModelProvider,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Overall deadline for one streamed reply.
    #[serde(default = "default_stream_timeout")]
    pub stream_timeout_secs: u64,
    #[serde(default = "default_max_upload")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            stream_timeout_secs: default_stream_timeout(),
            max_upload_bytes: default_max_upload(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}
fn default_stream_timeout() -> u64 {
    300
}
fn default_max_upload() -> usize {
    20 * 1024 * 1024
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database file, or `:memory:`.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/courseconnect.sqlite")
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderAuth {
    pub api_key: Option<String>,
}

impl ProviderAuth {
    /// Key from the first set environment variable among `vars`.
    pub fn from_env(vars: &[&str]) -> Self {
        let api_key = vars
            .iter()
            .find_map(|v| env::var(v).ok())
            .filter(|k| !k.trim().is_empty());
        Self { api_key }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelProvider {
    #[serde(default = "default_preference")]
    pub provider_preference: Vec<String>, // e.g., ["local", "gemini", "openai"]
    #[serde(default = "default_vision_preference")]
    pub vision_preference: Vec<String>,
    #[serde(default = "default_local_model")]
    pub local_model: String, // e.g., "llama3.2:3b" for Ollama
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,
    #[serde(default = "default_openai_model")]
    pub openai_vision_model: String,
    #[serde(default = "default_gemini_model")]
    pub gemini_vision_model: String,
    #[serde(default = "default_ollama_url")]
    pub ollama_base_url: String,
    #[serde(default)]
    pub openai_base_url: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Ask Ollama to return reasoning tokens separately.
    #[serde(default)]
    pub think: bool,

    #[serde(skip)]
    pub openai_auth: ProviderAuth,
    #[serde(skip)]
    pub gemini_auth: ProviderAuth,
}

impl Default for ModelProvider {
    fn default() -> Self {
        Self {
            provider_preference: default_preference(),
            vision_preference: default_vision_preference(),
            local_model: default_local_model(),
            openai_model: default_openai_model(),
            gemini_model: default_gemini_model(),
            openai_vision_model: default_openai_model(),
            gemini_vision_model: default_gemini_model(),
            ollama_base_url: default_ollama_url(),
            openai_base_url: None,
            request_timeout_secs: default_request_timeout(),
            think: false,
            openai_auth: ProviderAuth::default(),
            gemini_auth: ProviderAuth::default(),
        }
    }
}

fn default_preference() -> Vec<String> {
    vec!["local".into(), "gemini".into(), "openai".into()]
}
fn default_vision_preference() -> Vec<String> {
    vec!["openai".into(), "gemini".into()]
}
fn default_local_model() -> String {
    "llama3.2:3b".into()
}
fn default_openai_model() -> String {
    "gpt-4o-mini".into()
}
fn default_gemini_model() -> String {
    "gemini-1.5-flash".into()
}
fn default_ollama_url() -> String {
    "http://127.0.0.1:11434".into()
}
fn default_request_timeout() -> u64 {
    120
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_results: default_max_results(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_max_results() -> usize {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Minimum similarity (0-100) for joining an existing class group.
    #[serde(default = "default_threshold")]
    pub threshold: u32,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
        }
    }
}

fn default_threshold() -> u32 {
    60
}

impl AppConfig {
    /// Pull secrets and URL overrides from the environment.
    pub fn apply_env(&mut self) {
        self.model.openai_auth = ProviderAuth::from_env(&["OPENAI_API_KEY"]);
        self.model.gemini_auth = ProviderAuth::from_env(&["GOOGLE_AI_API_KEY", "GEMINI_API_KEY"]);
        if let Ok(url) = env::var("OLLAMA_BASE_URL") {
            if !url.trim().is_empty() {
                self.model.ollama_base_url = url;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.stream_timeout_secs == 0 {
            bail!("server.stream_timeout_secs must be > 0");
        }
        if self.server.max_upload_bytes == 0 {
            bail!("server.max_upload_bytes must be > 0");
        }
        if self.matching.threshold > 100 {
            bail!("matching.threshold must be in [0, 100]");
        }
        if self.model.provider_preference.is_empty() {
            bail!("model.provider_preference must name at least one provider");
        }
        for p in &self.model.provider_preference {
            if !CHAT_PROVIDERS.contains(&p.as_str()) {
                bail!(
                    "Unknown chat provider: '{}'. Must be one of {}.",
                    p,
                    CHAT_PROVIDERS.join(", ")
                );
            }
        }
        for p in &self.model.vision_preference {
            if !VISION_PROVIDERS.contains(&p.as_str()) {
                bail!(
                    "Unknown vision provider: '{}'. Must be one of {}.",
                    p,
                    VISION_PROVIDERS.join(", ")
                );
            }
        }
        Ok(())
    }
}

/// Parse and validate a config file. Environment overrides are applied.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let mut config = parse_config(&content)?;
    config.apply_env();
    Ok(config)
}

/// Like [`load_config`], but a missing file yields the defaults.
pub fn load_config_or_default(path: &Path) -> Result<AppConfig> {
    if path.exists() {
        return load_config(path);
    }
    tracing::info!(
        "config file {} not found, using built-in defaults",
        path.display()
    );
    let mut config = AppConfig::default();
    config.apply_env();
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<AppConfig> {
    let config: AppConfig =
        toml::from_str(content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}
