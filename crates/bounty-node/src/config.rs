use anyhow::{Context, Result};
use bounty_ledger::LedgerConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "./bounty-config.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub ledger: LedgerConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_file: PathBuf,
    pub backup_file: PathBuf,
    pub autosave_interval_secs: u64,
    pub save_timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_file: PathBuf::from("bounty_data.json"),
            backup_file: PathBuf::from("bounty_data_backup.json"),
            autosave_interval_secs: 30,
            save_timeout_secs: 10,
        }
    }
}

impl StorageConfig {
    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.autosave_interval_secs.max(1))
    }

    pub fn save_timeout(&self) -> Duration {
        Duration::from_secs(self.save_timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty`, `compact` or `json`
    pub format: String,
    pub show_boot_banner: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_output: Option<PathBuf>,
    pub module_filters: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            show_boot_banner: true,
            file_output: None,
            module_filters: HashMap::new(),
        }
    }
}

impl NodeConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        // Env overrides are applied by main.rs so it controls precedence
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("writing config {}", path.display()))?;
        Ok(())
    }

    /// Explicit path if given, else `./bounty-config.toml` when present, else defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply environment variable overrides. Unparseable values are ignored.
    pub fn apply_env_overrides(&mut self) {
        // Storage
        if let Ok(path) = env::var("BOUNTY_DATA_FILE") {
            if !path.is_empty() {
                self.storage.data_file = PathBuf::from(path);
            }
        }
        if let Ok(path) = env::var("BOUNTY_BACKUP_FILE") {
            if !path.is_empty() {
                self.storage.backup_file = PathBuf::from(path);
            }
        }
        if let Ok(secs) = env::var("AUTOSAVE_INTERVAL_SECS") {
            if let Ok(secs) = secs.parse() {
                self.storage.autosave_interval_secs = secs;
            }
        }

        // Ledger
        if let Ok(operator) = env::var("OPERATOR_ID") {
            if let Ok(id) = operator.parse() {
                self.ledger.operator_id = id;
            }
        }
        if let Ok(username) = env::var("BOT_USERNAME") {
            let username = username.trim().trim_start_matches('@');
            if !username.is_empty() {
                self.ledger.links.bot_username = username.to_string();
            }
        }

        // Logging
        if let Ok(level) = env::var("LOG_LEVEL") {
            if !level.is_empty() {
                self.logging.level = level.to_lowercase();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bounty_ledger::{Amount, UserId};

    #[test]
    fn test_defaults() {
        let config = NodeConfig::default();
        assert_eq!(config.storage.data_file, PathBuf::from("bounty_data.json"));
        assert_eq!(config.storage.autosave_interval(), Duration::from_secs(30));
        assert_eq!(config.storage.save_timeout(), Duration::from_secs(10));
        assert_eq!(config.ledger.operator_id, UserId::new(1));
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = NodeConfig::default();
        config.ledger.referral_bonus = Amount::from_cents(750);
        config.logging.file_output = Some(PathBuf::from("bounty.log"));
        config
            .logging
            .module_filters
            .insert("bounty_ledger::storage".into(), "debug".into());

        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: NodeConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let parsed: NodeConfig = toml::from_str(
            r#"
            [ledger]
            operator_id = 42
            referral_bonus = 2.5

            [storage]
            data_file = "/var/lib/bounty/data.json"
            "#,
        )
        .unwrap();

        assert_eq!(parsed.ledger.operator_id, UserId::new(42));
        assert_eq!(parsed.ledger.referral_bonus, Amount::from_cents(250));
        assert_eq!(parsed.ledger.links.bot_username, "bounty_bot");
        assert_eq!(parsed.storage.backup_file, PathBuf::from("bounty_data_backup.json"));
        assert_eq!(parsed.logging.level, "info");
    }

    #[test]
    fn test_zero_intervals_are_clamped() {
        let storage = StorageConfig {
            autosave_interval_secs: 0,
            save_timeout_secs: 0,
            ..StorageConfig::default()
        };
        assert_eq!(storage.autosave_interval(), Duration::from_secs(1));
        assert_eq!(storage.save_timeout(), Duration::from_secs(1));
    }
}
