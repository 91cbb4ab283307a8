use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::ai::GenerationConfig;
use crate::offline::RouterConfig;

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Config {
    /// Default tracing filter when `RUST_LOG` is unset. Default: "warn"
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub account: AccountConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub offline: OfflineConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: default_log_level(),
            storage: StorageConfig::default(),
            account: AccountConfig::default(),
            ai: AiConfig::default(),
            offline: OfflineConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Per-account `SQLite` database.
    #[default]
    Sqlite,
    /// Single-user JSON file, no account.
    Local,
}

#[derive(Debug, Default, Deserialize, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Overrides the default file under ~/.ideatrium/.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize, Clone, PartialEq, Eq)]
pub struct AccountConfig {
    /// Account the `SQLite` backend signs in as. Unset means signed out.
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AiConfig {
    /// Default: true. The fallback analysis is used when disabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Environment variable holding the Gemini API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

impl Default for AiConfig {
    fn default() -> Self {
        AiConfig {
            enabled: true,
            api_key_env: default_api_key_env(),
            model: default_model(),
            endpoint: default_endpoint(),
            temperature: default_temperature(),
            top_k: default_top_k(),
            top_p: default_top_p(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

impl AiConfig {
    pub fn generation(&self) -> GenerationConfig {
        GenerationConfig {
            temperature: self.temperature,
            top_k: self.top_k,
            top_p: self.top_p,
            max_output_tokens: self.max_output_tokens,
        }
    }

    /// The API key, if AI is enabled and the key variable is set and non-empty.
    pub fn api_key(&self) -> Option<String> {
        if !self.enabled {
            return None;
        }
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct OfflineConfig {
    /// Origin relative URLs resolve against.
    #[serde(default = "default_origin")]
    pub origin: String,
    #[serde(flatten)]
    pub router: RouterConfig,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        OfflineConfig {
            origin: default_origin(),
            router: RouterConfig::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_temperature() -> f64 {
    GenerationConfig::default().temperature
}

fn default_top_k() -> u32 {
    GenerationConfig::default().top_k
}

fn default_top_p() -> f64 {
    GenerationConfig::default().top_p
}

fn default_max_output_tokens() -> u32 {
    GenerationConfig::default().max_output_tokens
}

fn default_origin() -> String {
    "http://localhost:3000".to_string()
}

/// Returns the base ideatrium directory: ~/.ideatrium/
pub fn base_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("could not determine home directory")?;
    Ok(home.join(".ideatrium"))
}

/// Returns the path to the `SQLite` database
pub fn db_path() -> Result<PathBuf> {
    Ok(base_dir()?.join("ideatrium.db"))
}

/// Returns the path to the local-mode JSON file
pub fn local_path() -> Result<PathBuf> {
    Ok(base_dir()?.join("local.json"))
}

pub fn config_path() -> Result<PathBuf> {
    Ok(base_dir()?.join("config.toml"))
}

/// Ensure all required directories exist
pub fn ensure_dirs() -> Result<()> {
    let base = base_dir()?;
    fs::create_dir_all(&base).context("failed to create ~/.ideatrium/")?;
    Ok(())
}

/// Load config from ~/.ideatrium/config.toml (or return defaults if it doesn't exist)
pub fn load() -> Result<Config> {
    load_from(&config_path()?)
}

pub fn load_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    parse(&content).with_context(|| format!("failed to parse {}", path.display()))
}

fn parse(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content)?;
    if config.offline.router.cache_version.trim().is_empty() {
        bail!("offline.cache_version must not be empty");
    }
    Ok(config)
}

impl Config {
    /// Storage file for the configured backend.
    pub fn storage_path(&self) -> Result<PathBuf> {
        match (&self.storage.path, self.storage.backend) {
            (Some(path), _) => Ok(path.clone()),
            (None, StorageBackend::Sqlite) => db_path(),
            (None, StorageBackend::Local) => local_path(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.ai.model, "gemini-2.0-flash");
        assert_eq!(config.offline.router.cache_version, "v1.0.0");
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = parse(
            r#"
            log_level = "debug"

            [storage]
            backend = "local"
            path = "/tmp/ideas.json"

            [ai]
            enabled = false
            temperature = 0.2

            [offline]
            origin = "https://ideas.example"
            cache_version = "v2.0.0"
            "#,
        )
        .unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.storage.backend, StorageBackend::Local);
        assert_eq!(config.storage_path().unwrap(), PathBuf::from("/tmp/ideas.json"));
        assert!(!config.ai.enabled);
        assert!(config.ai.api_key().is_none());
        assert!((config.ai.generation().temperature - 0.2).abs() < f64::EPSILON);
        assert_eq!(config.ai.generation().top_k, 40);
        assert_eq!(config.offline.origin, "https://ideas.example");
        assert_eq!(config.offline.router.static_partition(), "ideatrium-static-v2.0.0");
        assert_eq!(config.offline.router.precache.len(), 5);
    }

    #[test]
    fn rejects_unknown_backend_and_blank_cache_version() {
        assert!(parse("[storage]\nbackend = \"postgres\"").is_err());
        assert!(parse("[offline]\ncache_version = \" \"").is_err());
    }

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[account]\nuser_id = \"u1\"\n").unwrap();
        let config = load_from(&path).unwrap();
        assert_eq!(config.account.user_id.as_deref(), Some("u1"));
    }
}
