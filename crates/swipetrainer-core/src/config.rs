use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::ledger::{LedgerKey, LedgerOptions};
use crate::retry::RetryPolicy;
use crate::session::SessionOptions;
use crate::training::TrainingOptions;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Web client root
    pub app_url: String,
    /// Host whose `/(pass|like|superlike)/<id>?` requests confirm a swipe
    pub api_host: String,
    /// Ledger and image output directory
    pub out_dir: PathBuf,
    /// `identifier:secret` credentials file
    pub auth_file: PathBuf,
    /// Login provider (phone, facebook, google)
    pub auth_type: Option<String>,
    /// Stored browser storage for session reuse
    pub session_file: Option<PathBuf>,
    /// Seconds to wait for a swipe confirmation
    pub idle_timeout_secs: u64,
    pub login_settle_secs: u64,
    pub swipe_settle_secs: u64,
    pub image_timeout_secs: u64,
    /// Attempts per image URL (1 = no retry)
    pub image_attempts: u32,
    pub ledger_key: LedgerKey,
    pub headless: bool,
    /// Browser profile directory; keeps cookies between runs
    pub user_data_dir: Option<PathBuf>,
    /// Directory holding `<provider>.js` login scripts
    pub login_scripts_dir: Option<PathBuf>,
    /// Manual login attempts before giving up
    pub login_attempts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_url: "https://tinder.com/".to_string(),
            api_host: "api.gotinder.com".to_string(),
            out_dir: PathBuf::from("output"),
            auth_file: PathBuf::from("auth.txt"),
            auth_type: None,
            session_file: Some(PathBuf::from(".session.json")),
            idle_timeout_secs: 300,
            login_settle_secs: 3,
            swipe_settle_secs: 2,
            image_timeout_secs: 30,
            image_attempts: 1,
            ledger_key: LedgerKey::Profile,
            headless: false,
            user_data_dir: None,
            login_scripts_dir: None,
            login_attempts: 3,
        }
    }
}

impl Config {
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".swipetrainer")
            .join("config.toml")
    }

    /// Load configuration, falling back to defaults when the file is absent.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = path.unwrap_or_else(Self::default_path);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("reading {}", config_path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("parsing {}", config_path.display()))?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    pub fn save(&self, path: Option<PathBuf>) -> Result<()> {
        let config_path = path.unwrap_or_else(Self::default_path);

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            app_url: self.app_url.clone(),
            settle: Duration::from_secs(self.login_settle_secs),
            session_file: self.session_file.clone(),
        }
    }

    pub fn training_options(&self) -> TrainingOptions {
        TrainingOptions {
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            settle: Duration::from_secs(self.swipe_settle_secs),
        }
    }

    pub fn ledger_options(&self) -> LedgerOptions {
        LedgerOptions {
            key: self.ledger_key,
            image_timeout: Duration::from_secs(self.image_timeout_secs),
            retry: RetryPolicy::with_attempts(self.image_attempts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = Config::load(Some(tmp.path().join("nope.toml"))).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.training_options().idle_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(
            &path,
            "out_dir = \"swipes\"\nledger_key = \"sequence\"\nimage_attempts = 3\n",
        )
        .unwrap();

        let config = Config::load(Some(path)).unwrap();
        assert_eq!(config.out_dir, PathBuf::from("swipes"));
        assert_eq!(config.ledger_key, LedgerKey::Sequence);
        assert_eq!(config.ledger_options().retry.max_attempts, 3);
        assert_eq!(config.api_host, "api.gotinder.com");
    }

    #[test]
    fn test_save_then_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("dir").join("config.toml");
        let config = Config {
            auth_type: Some("google".into()),
            headless: true,
            ..Default::default()
        };
        config.save(Some(path.clone())).unwrap();
        assert_eq!(Config::load(Some(path)).unwrap(), config);
    }
}
