//! Swipe capture and session orchestration for a dating-app web client.
//!
//! - [`correlator`]: turns observed swipe requests into confirmed events
//! - [`session`]: restores or performs the login
//! - [`training`]: the observe, act, confirm, persist loop
//! - [`ledger`]: append-only swipe log plus one cached photo per profile

pub mod args;
#[cfg(feature = "browser")]
pub mod browser;
pub mod config;
pub mod correlator;
pub mod ledger;
pub mod logging;
pub mod retry;
pub mod session;
pub mod swipe;
pub mod timing;
pub mod training;

pub use correlator::{CorrelatorError, SwipeCorrelator};
pub use ledger::{LedgerEntry, LedgerError, ProfileLedger};
pub use session::{AuthProvider, SessionDriver, SessionError, SessionManager, SessionState};
pub use swipe::{Geomatch, SwipeAction, SwipeEvent};
pub use training::{Cursor, ProfileSource, Step, SwipeActuator, TrainingController, TrainingError};
