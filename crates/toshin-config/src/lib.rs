//! Toshin Configuration
//!
//! TOML configuration loading with path resolution for content tables

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub core: CoreConfig,
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub content: ContentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CoreConfig {
    pub data_dir: Option<String>,
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Prefix that marks a text message as a command, e.g. `!echo`.
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Only triggers from this guild are processed when set.
    #[serde(default)]
    pub guild_id: Option<u64>,
    /// Marker placed in front of templated replies.
    #[serde(default)]
    pub emoji: String,
    #[serde(default = "default_error_marker")]
    pub error_marker: String,
    #[serde(default = "default_true")]
    pub quote_interactions: bool,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            guild_id: None,
            emoji: String::new(),
            error_marker: default_error_marker(),
            quote_interactions: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    #[serde(default = "default_emotes_file")]
    pub emotes_file: String,
    #[serde(default)]
    pub stickers_file: Option<String>,
    /// Phrase that unlocks emotes marked with `verifyParams`.
    #[serde(default)]
    pub allowed_params: String,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            emotes_file: default_emotes_file(),
            stickers_file: None,
            allowed_params: String::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_prefix() -> String {
    "!".to_string()
}

fn default_error_marker() -> String {
    "Error: ".to_string()
}

fn default_emotes_file() -> String {
    "data/emotes.json".to_string()
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("toshin").join("config.toml"))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let prefix = &self.bot.prefix;
        if prefix.is_empty() {
            anyhow::bail!("bot.prefix cannot be empty");
        }
        if prefix.chars().any(char::is_whitespace) {
            anyhow::bail!("bot.prefix cannot contain whitespace: {:?}", prefix);
        }
        if self.bot.emoji.contains('%') {
            anyhow::bail!("bot.emoji cannot contain '%': {:?}", self.bot.emoji);
        }
        if self.bot.error_marker.trim().is_empty() {
            anyhow::bail!("bot.error_marker cannot be empty");
        }
        if self.content.emotes_file.trim().is_empty() {
            anyhow::bail!("content.emotes_file cannot be empty");
        }
        if self
            .content
            .stickers_file
            .as_deref()
            .is_some_and(|path| path.trim().is_empty())
        {
            anyhow::bail!("content.stickers_file cannot be empty when set");
        }
        if let Some(level) = &self.core.log_level {
            if level.trim().is_empty() {
                anyhow::bail!("core.log_level cannot be empty when set");
            }
        }
        Ok(())
    }

    pub fn log_level(&self) -> &str {
        self.core.log_level.as_deref().unwrap_or("info")
    }

    /// Data directory for logs and runtime files.
    pub fn data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.core.data_dir {
            return expand_home(dir);
        }
        dirs::data_local_dir()
            .map(|dir| dir.join("toshin"))
            .unwrap_or_else(|| PathBuf::from(".toshin"))
    }

    pub fn emotes_path(&self, base: &Path) -> PathBuf {
        resolve_path(&self.content.emotes_file, base)
    }

    pub fn stickers_path(&self, base: &Path) -> Option<PathBuf> {
        self.content
            .stickers_file
            .as_deref()
            .map(|path| resolve_path(path, base))
    }
}

/// Resolve `path` against `base` unless it is already absolute.
pub fn resolve_path(path: &str, base: &Path) -> PathBuf {
    let expanded = expand_home(path);
    if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
