//! User configuration (`~/.config/verso/config.toml`).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding one folder per project (clone target for remote-only projects)
    pub projects_root: PathBuf,

    /// JSON manifest of known projects
    pub manifest_path: PathBuf,

    /// Where trashed project folders are moved
    pub trash_dir: PathBuf,

    pub history: HistoryConfig,

    pub sync: SyncConfig,

    pub remote: RemoteConfig,

    pub ai: AiConfig,
}

/// Autosave and checkpoint tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Quiet period after a save before the shadow snapshot is taken
    pub autosave_debounce_ms: u64,
    /// Quiet period after which the shadow history is squashed into a checkpoint
    pub idle_checkpoint_secs: u64,
    /// Maximum length of generated autosave summaries, in characters
    pub summary_max_len: usize,
    pub author_name: String,
    pub author_email: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            autosave_debounce_ms: 2_000,
            idle_checkpoint_secs: 300,
            summary_max_len: 72,
            author_name: "Verso".to_string(),
            author_email: "noreply@verso.local".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Whether periodic and post-checkpoint sync passes run at all
    pub enabled: bool,
    pub interval_minutes: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_minutes: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// REST API base URL of the repository host
    pub api_url: String,
    /// Remote repositories are named `<repo_prefix>-<project name>`
    pub repo_prefix: String,
    /// Create remotes as private repositories
    pub private: bool,
    /// Environment variable holding the access token
    pub token_env: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            repo_prefix: "verso".to_string(),
            private: true,
            token_env: "VERSO_TOKEN".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// Tried in order; the first provider to answer wins
    pub providers: Vec<AiProviderConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiProviderConfig {
    pub name: String,
    /// OpenAI-compatible base URL (the `/chat/completions` path is appended)
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("verso");

        Self {
            projects_root: data_dir.join("projects"),
            manifest_path: data_dir.join("projects.json"),
            trash_dir: data_dir.join("trash"),
            history: HistoryConfig::default(),
            sync: SyncConfig::default(),
            remote: RemoteConfig::default(),
            ai: AiConfig::default(),
        }
    }
}

impl Config {
    /// Get the config file path (~/.config/verso/config.toml)
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("verso").join("config.toml"))
    }

    /// Load config from the default location, or return defaults if the file doesn't exist
    pub fn load() -> Result<Self, ConfigError> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Config::default()),
        }
    }

    /// Load config from an explicit file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::config_path().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Read the remote access token from the configured environment variable.
    pub fn remote_token(&self) -> Option<String> {
        std::env::var(&self.remote.token_env)
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("could not determine config directory")]
    NoConfigDir,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "projects_root = \"/tmp/notes\"\n\n[sync]\ninterval_minutes = 5\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.projects_root, PathBuf::from("/tmp/notes"));
        assert_eq!(config.sync.interval_minutes, 5);
        assert!(config.sync.enabled);
        assert_eq!(config.remote.repo_prefix, "verso");
        assert_eq!(config.history.summary_max_len, 72);
    }

    #[test]
    fn test_save_and_reload_providers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.ai.providers.push(AiProviderConfig {
            name: "local".into(),
            base_url: "http://localhost:11434/v1".into(),
            model: "llama3".into(),
            api_key_env: None,
        });
        config.save_to(&path).unwrap();

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.ai.providers.len(), 1);
        assert_eq!(reloaded.ai.providers[0].model, "llama3");
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "projects_root = [").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::Parse(_))
        ));
    }
}
