use crate::config::Config;
use clap::{ArgAction, Args};
use std::path::PathBuf;

// Flags shared by every mode. Each one overrides the matching config.toml
// field when given.
#[derive(Debug, Clone, Default, Args)]
pub struct CommonArgs {
    /// Path to a config.toml file (default: ~/.swipetrainer/config.toml)
    #[arg(short = 'c', long, value_name = "PATH", env = "SWIPETRAINER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Which login method to use
    #[arg(long = "auth_type", value_parser = ["phone", "facebook", "google"])]
    pub auth_type: Option<String>,

    /// File with the auth credentials separated by a colon (:)
    #[arg(long = "auth_file", value_name = "FILEPATH")]
    pub auth_file: Option<PathBuf>,

    /// Folder where to output swipe data
    #[arg(long, value_name = "PATH")]
    pub out: Option<PathBuf>,

    /// Seconds to wait for a swipe before giving up on it
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Stored session file used to skip manual login
    #[arg(long = "session_file", value_name = "PATH")]
    pub session_file: Option<PathBuf>,

    /// Run the browser without a window
    #[arg(long, action = ArgAction::SetTrue)]
    pub headless: bool,

    /// Set logging level to DEBUG
    #[arg(long, action = ArgAction::SetTrue)]
    pub debug: bool,
}

impl CommonArgs {
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(auth_type) = &self.auth_type {
            config.auth_type = Some(auth_type.clone());
        }

        if let Some(auth_file) = &self.auth_file {
            config.auth_file = auth_file.clone();
        }

        if let Some(out) = &self.out {
            config.out_dir = out.clone();
        }

        if let Some(timeout) = self.timeout {
            config.idle_timeout_secs = timeout;
        }

        if let Some(session_file) = &self.session_file {
            config.session_file = Some(session_file.clone());
        }

        if self.headless {
            config.headless = true;
        }
    }
}
