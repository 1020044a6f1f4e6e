//! The observe → act → confirm → persist → advance loop.
//!
//! State between steps is the [`Cursor`]: the profile currently on screen,
//! if it has been parsed. Every call takes the cursor and returns a [`Step`]
//! carrying the next one, so nothing about "the current match" is kept
//! inside the controller.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::correlator::SwipeCorrelator;
use crate::ledger::{LedgerError, ProfileLedger, SavedProfile};
use crate::swipe::{Geomatch, SwipeAction, SwipeEvent};
use crate::timing::Stopwatch;

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("swipe was not confirmed within {0:?}")]
    SwipeNotConfirmed(Duration),

    #[error("profile unavailable: {0}")]
    ProfileUnavailable(String),

    #[error("swipe actuation failed: {0:#}")]
    Actuation(anyhow::Error),

    #[error("failed to scrape profile: {0:#}")]
    Scrape(anyhow::Error),

    #[error("input failed: {0:#}")]
    Input(anyhow::Error),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Reads the profile currently displayed.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    /// `Ok(None)` when no profile card is on screen.
    async fn current_profile(&self) -> anyhow::Result<Option<Geomatch>>;
}

/// Issues a swipe through the UI.
#[async_trait]
pub trait SwipeActuator: Send + Sync {
    async fn swipe(&self, action: SwipeAction) -> anyhow::Result<()>;
}

/// What the loop knows about the screen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Cursor {
    /// Nothing parsed yet, or the last parse is no longer trusted.
    #[default]
    Cold,
    Showing(Geomatch),
}

impl Cursor {
    pub fn snapshot(&self) -> Option<&Geomatch> {
        match self {
            Self::Cold => None,
            Self::Showing(geomatch) => Some(geomatch),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// No swipe happened in this step.
    NotAttempted,
    Saved(SavedProfile),
    /// Validation failed; nothing was written.
    Skipped(String),
}

/// Result of one controller call.
#[derive(Debug, Clone)]
pub struct Step {
    /// Profile now on screen.
    pub snapshot: Geomatch,
    pub confirmed: Option<SwipeEvent>,
    pub record: RecordOutcome,
}

impl Step {
    pub fn cursor(&self) -> Cursor {
        Cursor::Showing(self.snapshot.clone())
    }
}

#[derive(Debug, Clone)]
pub struct TrainingOptions {
    /// Upper bound on waiting for a swipe confirmation.
    pub idle_timeout: Duration,
    /// Pause after a swipe so the next profile can load.
    pub settle: Duration,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(300),
            settle: Duration::from_secs(2),
        }
    }
}

pub struct TrainingController<S, A> {
    source: S,
    actuator: A,
    correlator: SwipeCorrelator,
    ledger: ProfileLedger,
    options: TrainingOptions,
}

impl<S: ProfileSource, A: SwipeActuator> TrainingController<S, A> {
    pub fn new(
        source: S,
        actuator: A,
        correlator: SwipeCorrelator,
        ledger: ProfileLedger,
        options: TrainingOptions,
    ) -> Self {
        Self {
            source,
            actuator,
            correlator,
            ledger,
            options,
        }
    }

    pub fn ledger(&self) -> &ProfileLedger {
        &self.ledger
    }

    pub fn correlator(&self) -> &SwipeCorrelator {
        &self.correlator
    }

    /// Advance one step.
    ///
    /// With an action: arm the correlator, swipe, wait for the network
    /// confirmation, record the profile in `cursor`, settle and parse the
    /// next profile. Without one: return the profile in `cursor`, parsing
    /// the page only on a cold start.
    pub async fn advance(
        &mut self,
        cursor: &Cursor,
        action: Option<SwipeAction>,
    ) -> Result<Step, TrainingError> {
        let Some(action) = action else {
            let snapshot = match cursor {
                Cursor::Showing(geomatch) => geomatch.clone(),
                Cursor::Cold => self.parse_profile().await?,
            };
            return Ok(Step {
                snapshot,
                confirmed: None,
                record: RecordOutcome::NotAttempted,
            });
        };

        self.correlator.arm();
        debug!(%action, "issuing swipe");
        self.actuator
            .swipe(action)
            .await
            .map_err(TrainingError::Actuation)?;
        self.confirm_and_advance(cursor, Some(action)).await
    }

    /// Wait for a swipe made directly in the browser, then record and advance.
    pub async fn await_manual_swipe(&mut self, cursor: &Cursor) -> Result<Step, TrainingError> {
        self.correlator.arm();
        info!("you can swipe now");
        self.confirm_and_advance(cursor, None).await
    }

    async fn confirm_and_advance(
        &mut self,
        cursor: &Cursor,
        intent: Option<SwipeAction>,
    ) -> Result<Step, TrainingError> {
        let timeout = self.options.idle_timeout;
        let event = self
            .correlator
            .await_result(timeout)
            .await
            .map_err(|_| TrainingError::SwipeNotConfirmed(timeout))?;

        if let Some(intent) = intent.filter(|i| *i != event.action) {
            warn!(%intent, confirmed = %event.action, "network disagrees with issued swipe; recording the network outcome");
        }

        let record = match self.ledger.record_geomatch(&event, cursor.snapshot()).await {
            Ok(saved) => RecordOutcome::Saved(saved),
            Err(LedgerError::RecordSkipped(reason)) => {
                warn!(%reason, "swipe not recorded");
                RecordOutcome::Skipped(reason)
            }
            Err(err) => return Err(err.into()),
        };

        tokio::time::sleep(self.options.settle).await;
        let snapshot = self.parse_profile().await?;

        Ok(Step {
            snapshot,
            confirmed: Some(event),
            record,
        })
    }

    async fn parse_profile(&self) -> Result<Geomatch, TrainingError> {
        let geomatch = {
            let _timer = Stopwatch::start("parsing profile");
            self.source
                .current_profile()
                .await
                .map_err(TrainingError::Scrape)?
        };
        let Some(geomatch) = geomatch else {
            return Err(TrainingError::ProfileUnavailable(
                "no profile on screen".to_string(),
            ));
        };
        info!(
            name = geomatch.display_name(),
            images = geomatch.image_urls.len(),
            "profile data parsed"
        );
        if !geomatch.is_complete() {
            return Err(TrainingError::ProfileUnavailable(
                "geomatch doesn't have name or images".to_string(),
            ));
        }
        Ok(geomatch)
    }
}

/// Next thing the operator wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Swipe(SwipeAction),
    /// Wait for a swipe made in the browser window.
    Wait,
    Quit,
}

/// Source of operator commands for [`run_training`].
#[async_trait]
pub trait StepInput: Send {
    async fn next_command(&mut self, current: &Geomatch) -> anyhow::Result<Command>;

    /// Called when the page has no usable profile. `false` ends the run.
    async fn retry_unavailable(&mut self, reason: &str) -> anyhow::Result<bool>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub confirmed: u32,
    pub recorded: u32,
    pub skipped: u32,
    pub unconfirmed: u32,
}

/// Drive the controller until the input quits.
///
/// Unconfirmed swipes and unavailable profiles are reported and the loop
/// re-reads the page; everything else ends the run.
pub async fn run_training<S, A, I>(
    controller: &mut TrainingController<S, A>,
    input: &mut I,
) -> Result<RunSummary, TrainingError>
where
    S: ProfileSource,
    A: SwipeActuator,
    I: StepInput + ?Sized,
{
    let mut summary = RunSummary::default();
    let mut cursor = Cursor::Cold;

    loop {
        let current = match controller.advance(&cursor, None).await {
            Ok(step) => step.snapshot,
            Err(TrainingError::ProfileUnavailable(reason)) => {
                error!(%reason, "failed to get geomatch info");
                if !input.retry_unavailable(&reason).await.map_err(TrainingError::Input)? {
                    break;
                }
                continue;
            }
            Err(err) => return Err(err),
        };
        cursor = Cursor::Showing(current.clone());

        let result = match input.next_command(&current).await.map_err(TrainingError::Input)? {
            Command::Quit => break,
            Command::Swipe(action) => controller.advance(&cursor, Some(action)).await,
            Command::Wait => controller.await_manual_swipe(&cursor).await,
        };

        match result {
            Ok(step) => {
                summary.confirmed += 1;
                match step.record {
                    RecordOutcome::Saved(_) => summary.recorded += 1,
                    RecordOutcome::Skipped(_) => summary.skipped += 1,
                    RecordOutcome::NotAttempted => {}
                }
                cursor = step.cursor();
            }
            Err(TrainingError::SwipeNotConfirmed(timeout)) => {
                warn!(?timeout, "swipe not confirmed, re-reading the page");
                summary.unconfirmed += 1;
                cursor = Cursor::Cold;
            }
            Err(TrainingError::ProfileUnavailable(reason)) => {
                error!(%reason, "failed to get geomatch info");
                cursor = Cursor::Cold;
                if !input.retry_unavailable(&reason).await.map_err(TrainingError::Input)? {
                    break;
                }
            }
            Err(err) => return Err(err),
        }
    }

    info!(?summary, "training finished");
    Ok(summary)
}
