//! Correlates outgoing browser requests with swipe outcomes.
//!
//! The browser pushes every outgoing request through [`SwipeCorrelator::observe`]
//! from its own task. The training loop pulls the outcome with
//! [`SwipeCorrelator::await_result`]. Between the two sits a single slot:
//!
//! - requests are ignored unless the correlator is armed
//! - while armed, the latest matching request wins (a second match overwrites
//!   the first; at most one swipe is expected in flight, so this is a slot and
//!   not a queue)
//! - the consumer reads the slot, clears it and disarms under one lock

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use regex::Regex;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{debug, info, trace};

use crate::swipe::{SwipeAction, SwipeEvent};

#[derive(Debug, Error)]
pub enum CorrelatorError {
    #[error("no swipe confirmation within {0:?}")]
    Timeout(Duration),

    #[error("invalid swipe endpoint pattern: {0}")]
    Pattern(#[from] regex::Error),
}

#[derive(Debug, Default)]
struct Slot {
    listening: bool,
    pending: Option<SwipeEvent>,
}

#[derive(Debug, Default)]
struct Shared {
    slot: Mutex<Slot>,
    notify: Notify,
}

/// Single-slot rendezvous between the request observer and the training loop.
///
/// Cloning is cheap; all clones share the same slot.
#[derive(Debug, Clone)]
pub struct SwipeCorrelator {
    shared: Arc<Shared>,
    pattern: Regex,
}

impl SwipeCorrelator {
    /// Build a correlator matching swipe requests sent to `api_host`.
    pub fn new(api_host: &str) -> Result<Self, CorrelatorError> {
        let pattern = Regex::new(&format!(
            r"{}/(?P<action>pass|like|superlike)/(?P<id>[A-Za-z0-9]+)\?",
            regex::escape(api_host)
        ))?;
        Ok(Self {
            shared: Arc::new(Shared::default()),
            pattern,
        })
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        // The slot holds plain data; a panic elsewhere cannot leave it torn.
        self.shared
            .slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Extract a swipe event from a request target, if it is a swipe request.
    pub fn parse_request(&self, url: &str) -> Option<SwipeEvent> {
        let caps = self.pattern.captures(url)?;
        let action = SwipeAction::from_endpoint_token(&caps["action"])?;
        Some(SwipeEvent::new(&caps["id"], action))
    }

    /// Start listening and drop any stale result.
    ///
    /// Must happen before the swipe is issued, otherwise the confirming
    /// request can arrive before anyone listens for it.
    pub fn arm(&self) {
        let mut slot = self.slot();
        slot.listening = true;
        slot.pending = None;
        debug!("swipe correlator armed");
    }

    pub fn is_armed(&self) -> bool {
        self.slot().listening
    }

    /// Feed one outgoing request target. Returns `true` when it was captured.
    pub fn observe(&self, url: &str) -> bool {
        let mut slot = self.slot();
        if !slot.listening {
            return false;
        }
        let Some(event) = self.parse_request(url) else {
            trace!(url, "ignoring non-swipe request");
            return false;
        };
        debug!(profile = %event.profile_id, action = %event.action, "swipe request captured");
        // Overwrites an unconsumed event from an earlier request.
        slot.pending = Some(event);
        drop(slot);
        self.shared.notify.notify_waiters();
        true
    }

    /// Take the pending event, clearing the slot and disarming in one step.
    fn take(&self) -> Option<SwipeEvent> {
        let mut slot = self.slot();
        let event = slot.pending.take()?;
        slot.listening = false;
        Some(event)
    }

    /// Wait for the next swipe confirmation.
    ///
    /// On timeout the correlator is left disarmed; call [`arm`](Self::arm)
    /// again before retrying.
    pub async fn await_result(&self, timeout: Duration) -> Result<SwipeEvent, CorrelatorError> {
        let wait = async {
            loop {
                // Registered before the check so a notify in between is not lost.
                let notified = self.shared.notify.notified();
                if let Some(event) = self.take() {
                    return event;
                }
                notified.await;
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(event) => {
                info!(profile = %event.profile_id, action = %event.action, "got swipe event from network");
                Ok(event)
            }
            Err(_) => {
                self.slot().listening = false;
                Err(CorrelatorError::Timeout(timeout))
            }
        }
    }

    /// Forward every outgoing request of `page` into [`observe`](Self::observe).
    #[cfg(feature = "browser")]
    pub async fn attach(
        &self,
        page: &chromiumoxide::Page,
    ) -> Result<tokio::task::JoinHandle<()>, chromiumoxide::error::CdpError> {
        use chromiumoxide::cdp::browser_protocol::network::EventRequestWillBeSent;
        use futures_util::StreamExt;

        let mut requests = page.event_listener::<EventRequestWillBeSent>().await?;
        let correlator = self.clone();
        Ok(tokio::spawn(async move {
            while let Some(event) = requests.next().await {
                correlator.observe(&event.request.url);
            }
            debug!("request event stream closed");
        }))
    }
}
