//! Login and session lifecycle.
//!
//! ```text
//! Fresh ──restore──▶ RestoredPendingVerify ──probe ok──▶ LoggedIn
//!   │                        │ probe failed
//!   └────────────────────────┴──▶ ManualLoginPendingProvider ──▶ LoggedIn
//!                                              └──error──▶ Failed
//! ```
//!
//! The browser itself is reached through [`SessionDriver`]; provider-specific
//! login automation lives behind [`SessionDriver::login_using`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid authentication data: {0}")]
    InvalidCredentials(String),

    #[error("unsupported login provider: {0}")]
    UnsupportedProvider(String),

    #[error("cannot read credentials from {path}: {source}")]
    CredentialsUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("session file {path}: {reason}")]
    SessionFile { path: PathBuf, reason: String },

    #[error("no session file configured")]
    NoSessionFile,

    #[error("still not logged in after {0} login")]
    LoginIncomplete(AuthProvider),

    #[error("browser driver error: {0:#}")]
    Driver(#[from] anyhow::Error),
}

impl SessionError {
    /// Configuration errors that retrying the same login cannot fix.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredentials(_)
                | Self::UnsupportedProvider(_)
                | Self::CredentialsUnreadable { .. }
        )
    }
}

/// Supported manual login providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AuthProvider {
    Phone,
    Facebook,
    Google,
}

impl AuthProvider {
    pub fn parse(name: &str) -> Result<Self, SessionError> {
        Self::from_str(name).map_err(|_| SessionError::UnsupportedProvider(name.to_string()))
    }
}

/// Identifier and secret read from the credentials file.
pub struct Credentials {
    pub identifier: String,
    secret: Zeroizing<String>,
}

impl Credentials {
    /// Parse a single `identifier:secret` line.
    pub fn parse(text: &str) -> Result<Self, SessionError> {
        let fields: Vec<&str> = text.trim().split(':').collect();
        match fields.as_slice() {
            [identifier, secret] => Ok(Self {
                identifier: identifier.to_string(),
                secret: Zeroizing::new(secret.to_string()),
            }),
            other => Err(SessionError::InvalidCredentials(format!(
                "expected 2 ':'-separated fields, got {}",
                other.len()
            ))),
        }
    }

    pub fn read(path: &Path) -> Result<Self, SessionError> {
        let text = std::fs::read_to_string(path).map_err(|source| {
            SessionError::CredentialsUnreadable {
                path: path.to_path_buf(),
                source,
            }
        })?;
        Self::parse(&text)
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identifier", &self.identifier)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Persisted browser storage that carries a logged-in session.
///
/// Serialized as `{"localStorage": {...}, "db": {...}}`; `db` holds the
/// `keyval-store` IndexedDB entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    #[serde(rename = "localStorage", default)]
    pub local_storage: BTreeMap<String, String>,
    #[serde(rename = "db", default)]
    pub indexed_db: BTreeMap<String, serde_json::Value>,
}

impl SessionSnapshot {
    pub fn is_empty(&self) -> bool {
        self.local_storage.is_empty() && self.indexed_db.is_empty()
    }

    /// Load a snapshot; a missing file is `Ok(None)`.
    pub fn load(path: &Path) -> Result<Option<Self>, SessionError> {
        let file_err = |reason: String| SessionError::SessionFile {
            path: path.to_path_buf(),
            reason,
        };
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path).map_err(|e| file_err(e.to_string()))?;
        let snapshot = serde_json::from_str(&content).map_err(|e| file_err(e.to_string()))?;
        Ok(Some(snapshot))
    }

    pub fn save(&self, path: &Path) -> Result<(), SessionError> {
        let file_err = |reason: String| SessionError::SessionFile {
            path: path.to_path_buf(),
            reason,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| file_err(e.to_string()))?;
        }
        let content = serde_json::to_string_pretty(self).map_err(|e| file_err(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| file_err(e.to_string()))
    }
}

/// Browser operations the session lifecycle needs.
#[async_trait]
pub trait SessionDriver: Send + Sync {
    /// Navigate to `url`.
    async fn open(&self, url: &str) -> anyhow::Result<()>;

    async fn reload(&self) -> anyhow::Result<()>;

    /// Side-effect free login probe.
    async fn is_logged_in(&self) -> anyhow::Result<bool>;

    async fn set_local_storage(&self, entries: &BTreeMap<String, String>) -> anyhow::Result<()>;

    async fn set_indexed_db(&self, entries: &BTreeMap<String, serde_json::Value>) -> anyhow::Result<()>;

    async fn dump_local_storage(&self) -> anyhow::Result<BTreeMap<String, String>>;

    async fn dump_indexed_db(&self) -> anyhow::Result<BTreeMap<String, serde_json::Value>>;

    /// Run the provider-specific login automation.
    async fn login_using(&self, provider: AuthProvider, credentials: &Credentials) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SessionState {
    Fresh,
    RestoredPendingVerify,
    ManualLoginPendingProvider,
    LoggedIn,
    Failed,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub app_url: String,
    /// Pause after navigation and after restoring storage.
    pub settle: Duration,
    pub session_file: Option<PathBuf>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            app_url: "https://tinder.com/".to_string(),
            settle: Duration::from_secs(3),
            session_file: None,
        }
    }
}

pub struct SessionManager<D> {
    driver: D,
    options: SessionOptions,
    state: SessionState,
}

impl<D: SessionDriver> SessionManager<D> {
    pub fn new(driver: D, options: SessionOptions) -> Self {
        Self {
            driver,
            options,
            state: SessionState::Fresh,
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub async fn is_logged_in(&self) -> Result<bool, SessionError> {
        Ok(self.driver.is_logged_in().await?)
    }

    /// Produce a logged-in session: restore persisted storage first, then
    /// fall back to a manual login through `provider`.
    pub async fn login(&mut self, credentials_file: &Path, provider: &str) -> Result<(), SessionError> {
        if self.state == SessionState::LoggedIn && self.is_logged_in().await? {
            debug!("already logged in");
            return Ok(());
        }

        let result = self.login_inner(credentials_file, provider).await;
        self.state = match &result {
            Ok(()) => SessionState::LoggedIn,
            Err(_) => SessionState::Failed,
        };
        result
    }

    async fn login_inner(&mut self, credentials_file: &Path, provider: &str) -> Result<(), SessionError> {
        self.state = SessionState::Fresh;
        self.driver.open(&self.options.app_url).await?;
        tokio::time::sleep(self.options.settle).await;

        if self.is_logged_in().await? {
            debug!("user already logged in");
            return Ok(());
        }

        match self.restore_session().await {
            Ok(true) => {
                self.state = SessionState::RestoredPendingVerify;
                tokio::time::sleep(self.options.settle).await;
                self.driver.reload().await?;
                let logged_in = self.is_logged_in().await?;
                debug!(logged_in, "logged in with session data");
                if logged_in {
                    return Ok(());
                }
            }
            Ok(false) => debug!("no stored session to restore"),
            Err(err) => warn!(error = %err, "failed to restore stored session"),
        }

        self.state = SessionState::ManualLoginPendingProvider;
        debug!("manually logging in");
        let credentials = Credentials::read(credentials_file)?;
        let provider = AuthProvider::parse(provider)?;

        info!(%provider, "logging in");
        self.driver.login_using(provider, &credentials).await?;
        tokio::time::sleep(self.options.settle).await;

        if !self.is_logged_in().await? {
            return Err(SessionError::LoginIncomplete(provider));
        }

        if self.options.session_file.is_some() {
            if let Err(err) = self.save_session().await {
                warn!(error = %err, "failed to save session after login");
            }
        }
        Ok(())
    }

    /// Inject the stored snapshot, if any. Returns whether anything was injected.
    pub async fn restore_session(&self) -> Result<bool, SessionError> {
        let Some(path) = &self.options.session_file else {
            return Ok(false);
        };
        let Some(snapshot) = SessionSnapshot::load(path)? else {
            return Ok(false);
        };
        if snapshot.is_empty() {
            return Ok(false);
        }

        debug!(path = %path.display(), "loading session data");
        self.driver.set_local_storage(&snapshot.local_storage).await?;
        self.driver.set_indexed_db(&snapshot.indexed_db).await?;
        Ok(true)
    }

    /// Dump browser storage to the session file so a later run can restore it.
    pub async fn save_session(&self) -> Result<SessionSnapshot, SessionError> {
        let path = self
            .options
            .session_file
            .as_ref()
            .ok_or(SessionError::NoSessionFile)?;
        let snapshot = SessionSnapshot {
            local_storage: self.driver.dump_local_storage().await?,
            indexed_db: self.driver.dump_indexed_db().await?,
        };
        snapshot.save(path)?;
        info!(path = %path.display(), "session saved");
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_credentials_require_two_fields() {
        let creds = Credentials::parse("+15550100:hunter2\n").unwrap();
        assert_eq!(creds.identifier, "+15550100");
        assert_eq!(creds.secret(), "hunter2");

        for bad in ["only-one", "a:b:c", ""] {
            assert!(matches!(
                Credentials::parse(bad),
                Err(SessionError::InvalidCredentials(_))
            ));
        }
    }

    #[test]
    fn test_credentials_debug_redacts_secret() {
        let creds = Credentials::parse("me@example.com:topsecret").unwrap();
        let shown = format!("{creds:?}");
        assert!(shown.contains("me@example.com"));
        assert!(!shown.contains("topsecret"));
    }

    #[test]
    fn test_provider_parsing() {
        assert_eq!(AuthProvider::parse("google").unwrap(), AuthProvider::Google);
        assert_eq!(AuthProvider::parse("phone").unwrap(), AuthProvider::Phone);
        assert!(matches!(
            AuthProvider::parse("myspace"),
            Err(SessionError::UnsupportedProvider(_))
        ));
    }

    #[test]
    fn test_snapshot_file_format() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("session.json");
        assert!(SessionSnapshot::load(&path).unwrap().is_none());

        let mut snapshot = SessionSnapshot::default();
        snapshot
            .local_storage
            .insert("TinderWeb/APIToken".into(), "tok".into());
        snapshot
            .indexed_db
            .insert("persist::user".into(), serde_json::json!({"id": "u1"}));
        snapshot.save(&path).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["localStorage"]["TinderWeb/APIToken"], "tok");
        assert_eq!(raw["db"]["persist::user"]["id"], "u1");
        assert_eq!(SessionSnapshot::load(&path).unwrap(), Some(snapshot));
    }

    #[test]
    fn test_malformed_snapshot_is_reported() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("session.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            SessionSnapshot::load(&path),
            Err(SessionError::SessionFile { .. })
        ));
    }
}
