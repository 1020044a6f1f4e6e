//! Append-only swipe ledger with a one-photo-per-profile image cache.
//!
//! Layout under the output directory:
//!
//! ```text
//! out.txt               one `key:name:outcome` line per swipe
//! images/<id>.jpg       raw bytes of the first image that downloaded
//! ```
//!
//! Fields are not escaped. A name containing `:` still reads back correctly
//! because the key ends at the first separator and the outcome starts after
//! the last one.

use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::retry::{self, RetryPolicy};
use crate::swipe::{Geomatch, SwipeAction, SwipeEvent};

pub const LEDGER_FILE: &str = "out.txt";
pub const IMAGE_DIR: &str = "images";

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("output path {0} exists and is not a directory")]
    InvalidTarget(PathBuf),

    #[error("ledger I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to fetch image {url}: {reason}")]
    FetchFailed { url: String, reason: String },

    #[error("record skipped: {0}")]
    RecordSkipped(String),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> LedgerError + '_ {
    move |source| LedgerError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// What a ledger line is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerKey {
    /// The swiped profile's identifier.
    #[default]
    Profile,
    /// A sequence id that resumes across restarts. Cached images are still
    /// named by the profile identifier.
    Sequence,
}

/// One persisted line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub key: String,
    pub name: String,
    pub outcome: String,
}

impl LedgerEntry {
    pub fn parse(line: &str) -> Option<Self> {
        let (key, rest) = line.split_once(':')?;
        let (name, outcome) = rest.rsplit_once(':')?;
        Some(Self {
            key: key.to_string(),
            name: name.to_string(),
            outcome: outcome.to_string(),
        })
    }

    fn to_line(&self) -> String {
        let name = self.name.replace(['\r', '\n'], " ");
        format!("{}:{}:{}\n", self.key, name, self.outcome)
    }
}

#[derive(Debug, Clone)]
pub struct LedgerOptions {
    pub key: LedgerKey,
    /// Per-request timeout for image downloads.
    pub image_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for LedgerOptions {
    fn default() -> Self {
        Self {
            key: LedgerKey::default(),
            image_timeout: Duration::from_secs(30),
            retry: RetryPolicy::single_attempt(),
        }
    }
}

/// Result of a successful [`ProfileLedger::save_profile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedProfile {
    pub entry: LedgerEntry,
    /// `None` when no candidate image could be downloaded.
    pub image: Option<PathBuf>,
}

pub struct ProfileLedger {
    log_path: PathBuf,
    image_dir: PathBuf,
    next_id: u64,
    options: LedgerOptions,
    client: reqwest::Client,
}

impl ProfileLedger {
    /// Open (or create) a ledger rooted at `dir`.
    ///
    /// Reopening an existing ledger keeps its entries and resumes the
    /// sequence after the last recorded id.
    pub fn open(dir: impl AsRef<Path>, options: LedgerOptions) -> Result<Self, LedgerError> {
        let dir = dir.as_ref();
        if dir.exists() && !dir.is_dir() {
            return Err(LedgerError::InvalidTarget(dir.to_path_buf()));
        }
        fs::create_dir_all(dir).map_err(io_err(dir))?;

        let image_dir = dir.join(IMAGE_DIR);
        fs::create_dir_all(&image_dir).map_err(io_err(&image_dir))?;

        let log_path = dir.join(LEDGER_FILE);
        let mut log = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&log_path)
            .map_err(io_err(&log_path))?;
        terminate_last_line(&mut log).map_err(io_err(&log_path))?;

        let client = reqwest::Client::builder()
            .timeout(options.image_timeout)
            .build()?;

        let mut ledger = Self {
            log_path,
            image_dir,
            next_id: 0,
            options,
            client,
        };
        let entries = ledger.entries()?;
        ledger.next_id = resume_id(&entries);
        debug!(
            path = %ledger.log_path.display(),
            entries = entries.len(),
            next_id = ledger.next_id,
            "ledger opened"
        );
        Ok(ledger)
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn image_dir(&self) -> &Path {
        &self.image_dir
    }

    /// Sequence id the next record will use in [`LedgerKey::Sequence`] mode.
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Read every recorded entry in file order.
    pub fn entries(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        let content = fs::read_to_string(&self.log_path).map_err(io_err(&self.log_path))?;
        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| {
                let entry = LedgerEntry::parse(line);
                if entry.is_none() {
                    warn!(line, "skipping malformed ledger line");
                }
                entry
            })
            .collect())
    }

    /// Cache one image for the profile and append its ledger line.
    ///
    /// Image capture is advisory: when every candidate fails the line is
    /// still written.
    pub async fn save_profile(
        &mut self,
        identifier: &str,
        action: SwipeAction,
        image_urls: &[String],
        name: Option<&str>,
    ) -> Result<SavedProfile, LedgerError> {
        let key = match self.options.key {
            LedgerKey::Profile => identifier.to_string(),
            LedgerKey::Sequence => self.next_id.to_string(),
        };

        let image = self.cache_first_image(identifier, image_urls).await;

        let entry = LedgerEntry {
            key,
            name: name.unwrap_or_default().to_string(),
            outcome: action.to_string(),
        };
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.log_path)
            .map_err(io_err(&self.log_path))?;
        file.write_all(entry.to_line().as_bytes())
            .map_err(io_err(&self.log_path))?;
        self.next_id += 1;

        Ok(SavedProfile { entry, image })
    }

    /// Validate the scraped profile, then persist it with the confirmed event.
    ///
    /// Nothing is written when the profile is absent or lacks a name or images.
    pub async fn record_geomatch(
        &mut self,
        event: &SwipeEvent,
        geomatch: Option<&Geomatch>,
    ) -> Result<SavedProfile, LedgerError> {
        let Some(geomatch) = geomatch else {
            error!(profile = %event.profile_id, "failed to get geomatch information");
            return Err(LedgerError::RecordSkipped(format!(
                "no geomatch for profile {}",
                event.profile_id
            )));
        };
        if !geomatch.is_complete() {
            error!(profile = %event.profile_id, "geomatch is missing name or images, skipping");
            return Err(LedgerError::RecordSkipped(format!(
                "geomatch for profile {} is missing name or images",
                event.profile_id
            )));
        }

        info!(name = geomatch.display_name(), "saving match record");
        self.save_profile(
            &event.profile_id,
            event.action,
            &geomatch.image_urls,
            geomatch.name.as_deref(),
        )
        .await
    }

    async fn cache_first_image(&self, identifier: &str, candidates: &[String]) -> Option<PathBuf> {
        let path = self.image_dir.join(format!("{identifier}.jpg"));
        for candidate in candidates {
            let Some(url) = strip_css_url(candidate) else {
                debug!(candidate = %candidate, "not an image url literal, skipping");
                continue;
            };
            match self.fetch(url).await {
                Ok(bytes) => {
                    debug!(path = %path.display(), "saving image");
                    if let Err(err) = tokio::fs::write(&path, &bytes).await {
                        warn!(path = %path.display(), error = %err, "failed to write image");
                        continue;
                    }
                    return Some(path);
                }
                Err(err) => warn!(error = %err, "image candidate failed"),
            }
        }
        None
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, LedgerError> {
        let failed = |reason: String| LedgerError::FetchFailed {
            url: url.to_string(),
            reason,
        };

        let response = retry::retry_with_backoff(
            &self.options.retry,
            |_| self.client.get(url).send(),
            retry::classify_fetch,
            |attempt| {
                debug!(url, attempt = attempt.attempt, delay_ms = attempt.delay.as_millis() as u64,
                    reason = attempt.reason.as_str(), "retrying image download")
            },
        )
        .await
        .map_err(|e| failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(failed(format!("status {status}")));
        }
        let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Append a newline if a previous run left the last line unterminated.
fn terminate_last_line(log: &mut fs::File) -> std::io::Result<()> {
    let len = log.metadata()?.len();
    if len == 0 {
        return Ok(());
    }
    let mut last = [0u8; 1];
    log.seek(SeekFrom::Start(len - 1))?;
    log.read_exact(&mut last)?;
    if last[0] != b'\n' {
        warn!("ledger ends mid-line, terminating it");
        log.write_all(b"\n")?;
    }
    Ok(())
}

/// Sequence id following the last entry, or the entry count when keys are
/// profile identifiers or the last id is exhausted.
fn resume_id(entries: &[LedgerEntry]) -> u64 {
    match entries.last().map(|e| e.key.parse::<u64>()) {
        Some(Ok(last)) => last.checked_add(1).unwrap_or(entries.len() as u64),
        _ => entries.len() as u64,
    }
}

/// Unwrap a CSS `url(...)` literal. Bare http(s) URLs pass through.
pub fn strip_css_url(raw: &str) -> Option<&str> {
    let raw = raw.trim();
    let url = match raw.strip_prefix("url(").and_then(|s| s.strip_suffix(')')) {
        Some(inner) => {
            let inner = inner.trim();
            ['"', '\'']
                .iter()
                .find_map(|q| inner.strip_prefix(*q).and_then(|s| s.strip_suffix(*q)))
                .unwrap_or(inner)
        }
        None if raw.starts_with("http://") || raw.starts_with("https://") => raw,
        None => return None,
    };
    (!url.is_empty()).then_some(url)
}
