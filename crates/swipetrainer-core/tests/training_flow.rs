//! Training loop end to end with a scripted page.
//!
//! `FakeApp` plays both the profile card and the UI: a swipe moves to the
//! next card and "sends" the backend request straight into the correlator.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use swipetrainer_core::ledger::{LedgerOptions, ProfileLedger};
use swipetrainer_core::training::{
    Command, Cursor, ProfileSource, RecordOutcome, StepInput, SwipeActuator, TrainingController,
    TrainingError, TrainingOptions, run_training,
};
use swipetrainer_core::{Geomatch, SwipeAction, SwipeCorrelator, SwipeEvent};
use tempfile::TempDir;

#[derive(Clone, Copy)]
enum Delivery {
    Immediate,
    Delayed(Duration),
    Dropped,
    /// Backend reports this token regardless of the key pressed.
    Forced(&'static str),
}

struct AppState {
    deck: Vec<Option<Geomatch>>,
    position: usize,
    scrapes: usize,
    armed_on_swipe: Vec<bool>,
    delivery: Delivery,
}

#[derive(Clone)]
struct FakeApp {
    state: Arc<Mutex<AppState>>,
    correlator: SwipeCorrelator,
}

impl FakeApp {
    fn new(correlator: &SwipeCorrelator, deck: Vec<Option<Geomatch>>) -> Self {
        Self {
            state: Arc::new(Mutex::new(AppState {
                deck,
                position: 0,
                scrapes: 0,
                armed_on_swipe: Vec::new(),
                delivery: Delivery::Immediate,
            })),
            correlator: correlator.clone(),
        }
    }

    fn set_delivery(&self, delivery: Delivery) {
        self.state.lock().unwrap().delivery = delivery;
    }

    fn scrapes(&self) -> usize {
        self.state.lock().unwrap().scrapes
    }

    fn armed_on_swipe(&self) -> Vec<bool> {
        self.state.lock().unwrap().armed_on_swipe.clone()
    }
}

#[async_trait]
impl ProfileSource for FakeApp {
    async fn current_profile(&self) -> anyhow::Result<Option<Geomatch>> {
        let mut s = self.state.lock().unwrap();
        s.scrapes += 1;
        Ok(s.deck.get(s.position).cloned().flatten())
    }
}

#[async_trait]
impl SwipeActuator for FakeApp {
    async fn swipe(&self, action: SwipeAction) -> anyhow::Result<()> {
        let (url, delivery) = {
            let mut s = self.state.lock().unwrap();
            s.armed_on_swipe.push(self.correlator.is_armed());
            let id = format!("p{}", s.position);
            s.position += 1;
            let token = match (s.delivery, action) {
                (Delivery::Forced(token), _) => token,
                (_, SwipeAction::Like) => "like",
                (_, SwipeAction::Dislike) => "pass",
                (_, SwipeAction::Superlike) => "superlike",
            };
            (
                format!("https://api.gotinder.com/{token}/{id}?locale=en"),
                s.delivery,
            )
        };

        // Unrelated traffic around the swipe.
        self.correlator
            .observe("https://api.gotinder.com/v2/recs/core?locale=en");

        match delivery {
            Delivery::Immediate | Delivery::Forced(_) => {
                self.correlator.observe(&url);
            }
            Delivery::Delayed(delay) => {
                let correlator = self.correlator.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    correlator.observe(&url);
                });
            }
            Delivery::Dropped => {}
        }
        Ok(())
    }
}

fn profile(name: &str) -> Option<Geomatch> {
    // Unreachable image host: downloads fail, records are still written.
    Some(Geomatch::new(
        name,
        vec![format!("url(\"http://127.0.0.1:1/{name}.jpg\")")],
    ))
}

struct Harness {
    _tmp: TempDir,
    dir: std::path::PathBuf,
    app: FakeApp,
    controller: TrainingController<FakeApp, FakeApp>,
}

fn harness(deck: Vec<Option<Geomatch>>, idle_timeout: Duration) -> Harness {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("output");
    let correlator = SwipeCorrelator::new("api.gotinder.com").unwrap();
    let app = FakeApp::new(&correlator, deck);
    let ledger = ProfileLedger::open(&dir, LedgerOptions::default()).unwrap();
    let controller = TrainingController::new(
        app.clone(),
        app.clone(),
        correlator,
        ledger,
        TrainingOptions {
            idle_timeout,
            settle: Duration::ZERO,
        },
    );
    Harness {
        _tmp: tmp,
        dir,
        app,
        controller,
    }
}

fn ledger_lines(h: &Harness) -> Vec<String> {
    std::fs::read_to_string(h.controller.ledger().log_path())
        .unwrap()
        .lines()
        .map(String::from)
        .collect()
}

const CONFIRM: Duration = Duration::from_secs(2);
const SHORT: Duration = Duration::from_millis(100);

#[tokio::test]
async fn cold_start_only_parses() {
    let mut h = harness(vec![profile("Ann"), profile("Bea")], CONFIRM);

    let step = h.controller.advance(&Cursor::Cold, None).await.unwrap();

    assert_eq!(step.snapshot.name.as_deref(), Some("Ann"));
    assert!(step.confirmed.is_none());
    assert_eq!(step.record, RecordOutcome::NotAttempted);
    assert!(h.app.armed_on_swipe().is_empty());
    assert!(!h.controller.correlator().is_armed());
    assert!(ledger_lines(&h).is_empty());
}

#[tokio::test]
async fn no_action_with_cursor_returns_it_without_parsing() {
    let mut h = harness(vec![profile("Ann")], CONFIRM);
    let first = h.controller.advance(&Cursor::Cold, None).await.unwrap();
    assert_eq!(h.app.scrapes(), 1);

    let again = h.controller.advance(&first.cursor(), None).await.unwrap();
    assert_eq!(again.snapshot, first.snapshot);
    assert_eq!(h.app.scrapes(), 1);
}

#[tokio::test]
async fn swipe_is_confirmed_recorded_and_advanced() {
    let mut h = harness(vec![profile("Ann"), profile("Bea"), profile("Cat")], CONFIRM);
    let first = h.controller.advance(&Cursor::Cold, None).await.unwrap();

    let second = h
        .controller
        .advance(&first.cursor(), Some(SwipeAction::Dislike))
        .await
        .unwrap();

    assert_eq!(second.confirmed, Some(SwipeEvent::new("p0", SwipeAction::Dislike)));
    assert!(matches!(second.record, RecordOutcome::Saved(ref saved) if saved.image.is_none()));
    assert_eq!(second.snapshot.name.as_deref(), Some("Bea"));

    let third = h
        .controller
        .advance(&second.cursor(), Some(SwipeAction::Superlike))
        .await
        .unwrap();
    assert_eq!(third.snapshot.name.as_deref(), Some("Cat"));

    assert_eq!(ledger_lines(&h), vec!["p0:Ann:dislike", "p1:Bea:superlike"]);
    assert_eq!(h.app.armed_on_swipe(), vec![true, true]);
    assert!(!h.controller.correlator().is_armed());
}

#[tokio::test]
async fn confirmation_arriving_later_is_awaited() {
    let mut h = harness(vec![profile("Ann"), profile("Bea")], CONFIRM);
    h.app.set_delivery(Delivery::Delayed(Duration::from_millis(30)));
    let first = h.controller.advance(&Cursor::Cold, None).await.unwrap();

    let step = h
        .controller
        .advance(&first.cursor(), Some(SwipeAction::Like))
        .await
        .unwrap();

    assert_eq!(step.confirmed, Some(SwipeEvent::new("p0", SwipeAction::Like)));
    assert_eq!(ledger_lines(&h), vec!["p0:Ann:like"]);
}

#[tokio::test]
async fn missing_confirmation_fails_the_step_and_writes_nothing() {
    let mut h = harness(vec![profile("Ann"), profile("Bea")], SHORT);
    h.app.set_delivery(Delivery::Dropped);
    let first = h.controller.advance(&Cursor::Cold, None).await.unwrap();

    let result = h
        .controller
        .advance(&first.cursor(), Some(SwipeAction::Like))
        .await;

    assert!(matches!(result, Err(TrainingError::SwipeNotConfirmed(t)) if t == SHORT));
    assert!(ledger_lines(&h).is_empty());
    assert!(!h.controller.correlator().is_armed());
}

#[tokio::test]
async fn network_outcome_wins_over_intent() {
    let mut h = harness(vec![profile("Ann"), profile("Bea")], CONFIRM);
    h.app.set_delivery(Delivery::Forced("pass"));
    let first = h.controller.advance(&Cursor::Cold, None).await.unwrap();

    let step = h
        .controller
        .advance(&first.cursor(), Some(SwipeAction::Like))
        .await
        .unwrap();

    assert_eq!(step.confirmed.unwrap().action, SwipeAction::Dislike);
    assert_eq!(ledger_lines(&h), vec!["p0:Ann:dislike"]);
}

#[tokio::test]
async fn swipe_without_prior_snapshot_skips_record() {
    let mut h = harness(vec![profile("Ann"), profile("Bea")], CONFIRM);

    let step = h
        .controller
        .advance(&Cursor::Cold, Some(SwipeAction::Like))
        .await
        .unwrap();

    assert!(matches!(step.record, RecordOutcome::Skipped(_)));
    assert_eq!(step.snapshot.name.as_deref(), Some("Bea"));
    assert!(ledger_lines(&h).is_empty());
}

#[tokio::test]
async fn empty_next_card_is_profile_unavailable_after_recording() {
    let incomplete = Some(Geomatch::new("NoPhotos", vec![]));
    let mut h = harness(vec![profile("Ann"), incomplete, None], CONFIRM);
    let first = h.controller.advance(&Cursor::Cold, None).await.unwrap();

    let result = h
        .controller
        .advance(&first.cursor(), Some(SwipeAction::Like))
        .await;
    assert!(matches!(result, Err(TrainingError::ProfileUnavailable(_))));
    assert_eq!(ledger_lines(&h), vec!["p0:Ann:like"]);
}

#[tokio::test]
async fn manual_swipe_in_browser_is_captured() {
    let mut h = harness(vec![profile("Ann"), profile("Bea")], CONFIRM);
    let first = h.controller.advance(&Cursor::Cold, None).await.unwrap();

    let app = h.app.clone();
    let swiper = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        app.swipe(SwipeAction::Superlike).await.unwrap();
    });

    let step = h.controller.await_manual_swipe(&first.cursor()).await.unwrap();
    swiper.await.unwrap();

    assert_eq!(step.confirmed, Some(SwipeEvent::new("p0", SwipeAction::Superlike)));
    assert_eq!(step.snapshot.name.as_deref(), Some("Bea"));
    assert_eq!(ledger_lines(&h), vec!["p0:Ann:superlike"]);
}

struct Script {
    commands: VecDeque<Command>,
    unavailable: Vec<String>,
}

#[async_trait]
impl StepInput for Script {
    async fn next_command(&mut self, _current: &Geomatch) -> anyhow::Result<Command> {
        Ok(self.commands.pop_front().unwrap_or(Command::Quit))
    }

    async fn retry_unavailable(&mut self, reason: &str) -> anyhow::Result<bool> {
        self.unavailable.push(reason.to_string());
        Ok(false)
    }
}

#[tokio::test]
async fn run_training_records_until_quit_and_survives_restart() {
    let mut h = harness(
        vec![profile("Ann"), profile("Bea"), profile("Cat"), profile("Dee")],
        SHORT,
    );
    let mut script = Script {
        commands: VecDeque::from([
            Command::Swipe(SwipeAction::Like),
            Command::Swipe(SwipeAction::Dislike),
            Command::Quit,
        ]),
        unavailable: Vec::new(),
    };

    let summary = run_training(&mut h.controller, &mut script).await.unwrap();

    assert_eq!(summary.confirmed, 2);
    assert_eq!(summary.recorded, 2);
    assert_eq!(summary.unconfirmed, 0);
    assert!(script.unavailable.is_empty());

    let before = h.controller.ledger().entries().unwrap();
    let reopened = ProfileLedger::open(&h.dir, LedgerOptions::default()).unwrap();
    assert_eq!(reopened.entries().unwrap(), before);
    assert_eq!(ledger_lines(&h), vec!["p0:Ann:like", "p1:Bea:dislike"]);
}

#[tokio::test]
async fn run_training_continues_after_unconfirmed_swipe() {
    let mut h = harness(vec![profile("Ann"), profile("Bea"), profile("Cat")], SHORT);
    h.app.set_delivery(Delivery::Dropped);
    let mut script = Script {
        commands: VecDeque::from([Command::Swipe(SwipeAction::Like)]),
        unavailable: Vec::new(),
    };

    let summary = run_training(&mut h.controller, &mut script).await.unwrap();

    assert_eq!(summary.unconfirmed, 1);
    assert_eq!(summary.confirmed, 0);
    // The loop re-read the page after the failure.
    assert_eq!(h.app.scrapes(), 2);
    assert!(ledger_lines(&h).is_empty());
}

#[tokio::test]
async fn run_training_stops_when_deck_is_empty_and_input_declines() {
    let mut h = harness(vec![None], SHORT);
    let mut script = Script {
        commands: VecDeque::new(),
        unavailable: Vec::new(),
    };

    let summary = run_training(&mut h.controller, &mut script).await.unwrap();

    assert_eq!(summary, Default::default());
    assert_eq!(script.unavailable, vec!["no profile on screen".to_string()]);
}
