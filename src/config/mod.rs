// src/config/mod.rs - Bot configuration file and environment settings

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::bot::rules::{builtin_definitions, RuleDefinition, RuleStore};

pub const CONFIG_FILE: &str = "bot.yaml";

/// Settings read from `bot.yaml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfiguration {
    pub bot_name: String,
    /// Presence text shown as "Playing ..."
    pub activity: String,
    /// Where warning points are persisted
    pub warnings_file: PathBuf,
    pub leaderboard_size: usize,
    /// An image attachment replaces a keyword/regex/link match on the same message
    pub image_overrides_rule_match: bool,
    /// Replaces the embedded rule set when present
    pub rules: Option<Vec<RuleDefinition>>,
}

impl Default for BotConfiguration {
    fn default() -> Self {
        Self {
            bot_name: "ModWarden".to_string(),
            activity: "Sol's RNG Security".to_string(),
            warnings_file: PathBuf::from("warnings.json"),
            leaderboard_size: 10,
            image_overrides_rule_match: true,
            rules: None,
        }
    }
}

impl BotConfiguration {
    pub fn rule_store(&self) -> RuleStore {
        match self.rules {
            Some(ref rules) => RuleStore::from_definitions(rules.clone()),
            None => RuleStore::builtin(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.leaderboard_size == 0 {
            return Err(anyhow::anyhow!("leaderboard_size must be at least 1"));
        }
        if self.warnings_file.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("warnings_file must not be empty"));
        }
        if let Some(ref rules) = self.rules {
            for rule in rules {
                if rule.title.trim().is_empty() {
                    return Err(anyhow::anyhow!("Rule titles must not be empty"));
                }
                if rule.severity == 0 {
                    return Err(anyhow::anyhow!("Rule '{}' must have a severity of at least 1", rule.title));
                }
                if rule.keywords.is_empty() && rule.regex.is_none() {
                    warn!("Rule '{}' has no keywords and no regex and will never match", rule.title);
                }
            }
        }
        Ok(())
    }
}

/// Loads `bot.yaml` from the configuration directory
pub struct ConfigurationManager {
    config_dir: PathBuf,
}

impl ConfigurationManager {
    pub fn new<P: AsRef<Path>>(config_dir: P) -> Self {
        Self {
            config_dir: config_dir.as_ref().to_path_buf(),
        }
    }

    /// Use `MODWARDEN_CONFIG_DIR`, falling back to `./config`
    pub fn from_env() -> Self {
        let dir = env::var("MODWARDEN_CONFIG_DIR")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "config".to_string());
        Self::new(dir)
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    /// Load the bot configuration. A missing file is created with defaults;
    /// an invalid file is left untouched and defaults are used.
    pub async fn load(&self) -> Result<BotConfiguration> {
        let config_path = self.config_path();

        if !config_path.exists() {
            info!("No configuration at {}, creating defaults", config_path.display());
            let config = BotConfiguration::default();
            self.save(&config).await?;
            return Ok(config);
        }

        match self.read(&config_path).await {
            Ok(config) => {
                debug!("Loaded bot configuration from {}", config_path.display());
                Ok(config)
            }
            Err(e) => {
                warn!("Failed to load {}, using defaults: {:#}", config_path.display(), e);
                Ok(BotConfiguration::default())
            }
        }
    }

    async fn read(&self, path: &Path) -> Result<BotConfiguration> {
        let content = fs::read_to_string(path).await?;
        let config: BotConfiguration = serde_yaml::from_str(&content)
            .with_context(|| format!("Invalid YAML in {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub async fn save(&self, config: &BotConfiguration) -> Result<()> {
        if !self.config_dir.exists() {
            fs::create_dir_all(&self.config_dir).await
                .with_context(|| format!("Failed to create {}", self.config_dir.display()))?;
            info!("Created configuration directory: {}", self.config_dir.display());
        }

        // Write the embedded rules out so they are visible and editable
        let mut to_write = config.clone();
        if to_write.rules.is_none() {
            to_write.rules = Some(builtin_definitions());
        }

        let content = serde_yaml::to_string(&to_write)?;
        fs::write(self.config_path(), content).await?;
        info!("Saved bot configuration to {}", self.config_path().display());
        Ok(())
    }
}

/// Channel for violation embeds; unset or blank disables audit logging
pub fn audit_channel_from_env() -> Option<String> {
    env::var("MOD_LOG_CHANNEL_ID")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
