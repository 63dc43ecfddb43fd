// Shared fixtures for hearth-core integration tests: a scriptable
// `DeviceApi` whose feed is driven by the test.
#![allow(dead_code, clippy::unwrap_used)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use hearth_api::{
    Credential, Feed, FeedMessage, OAuthClient, SnapshotRecord, StructureRecord, ThermostatRecord,
};
use hearth_core::{
    Endpoints, MemoryTokenStore, Mutation, SessionConfig, SessionController, SessionEvent,
};
use hearth_core::{DeviceApi, TokenStore};
use secrecy::SecretString;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;

pub const WAIT: Duration = Duration::from_secs(5);

/// How the fake answers a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    Rejected,
    Revoked,
    Offline,
    Failed(u16),
}

impl Outcome {
    fn into_result(self) -> Result<(), hearth_api::Error> {
        match self {
            Self::Ok => Ok(()),
            Self::Rejected => Err(hearth_api::Error::Authentication {
                message: "invalid token".into(),
            }),
            Self::Revoked => Err(hearth_api::Error::Revoked),
            Self::Offline => Err(hearth_api::Error::WebSocketConnect("offline".into())),
            Self::Failed(status) => Err(hearth_api::Error::Api {
                status,
                message: "refused".into(),
            }),
        }
    }
}

pub struct FakeApi {
    validate: Mutex<Outcome>,
    dispatch: Mutex<Outcome>,
    hold_dispatch: AtomicBool,
    hold_validate: AtomicBool,
    exchange: Mutex<Option<Credential>>,
    feed: watch::Sender<Option<mpsc::Sender<FeedMessage>>>,
    validate_calls: AtomicUsize,
    dispatch_calls: AtomicUsize,
    dispatched: Mutex<Vec<Mutation>>,
    feed_opens: AtomicUsize,
    queued: Mutex<Vec<FeedMessage>>,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        let (feed, _) = watch::channel(None);
        Arc::new(Self {
            validate: Mutex::new(Outcome::Ok),
            dispatch: Mutex::new(Outcome::Ok),
            hold_dispatch: AtomicBool::new(false),
            hold_validate: AtomicBool::new(false),
            exchange: Mutex::new(None),
            feed,
            validate_calls: AtomicUsize::new(0),
            dispatch_calls: AtomicUsize::new(0),
            dispatched: Mutex::new(Vec::new()),
            feed_opens: AtomicUsize::new(0),
            queued: Mutex::new(Vec::new()),
        })
    }

    pub fn set_validate(&self, outcome: Outcome) {
        *self.validate.lock().unwrap() = outcome;
    }

    pub fn set_dispatch(&self, outcome: Outcome) {
        *self.dispatch.lock().unwrap() = outcome;
    }

    /// Dispatches never finish while held.
    pub fn hold_dispatch(&self) {
        self.hold_dispatch.store(true, Ordering::SeqCst);
    }

    /// Validation never finishes while held.
    pub fn hold_validate(&self) {
        self.hold_validate.store(true, Ordering::SeqCst);
    }

    /// Messages already waiting on the next feed when it opens.
    pub fn queue_on_open(&self, messages: Vec<FeedMessage>) {
        *self.queued.lock().unwrap() = messages;
    }

    pub fn feed_opens(&self) -> usize {
        self.feed_opens.load(Ordering::SeqCst)
    }

    pub fn set_exchange(&self, credential: Credential) {
        *self.exchange.lock().unwrap() = Some(credential);
    }

    pub fn validate_calls(&self) -> usize {
        self.validate_calls.load(Ordering::SeqCst)
    }

    pub fn dispatch_calls(&self) -> usize {
        self.dispatch_calls.load(Ordering::SeqCst)
    }

    pub fn dispatched(&self) -> Vec<Mutation> {
        self.dispatched.lock().unwrap().clone()
    }

    /// Sender for the most recently opened feed.
    pub async fn feed(&self) -> mpsc::Sender<FeedMessage> {
        let mut rx = self.feed.subscribe();
        let tx = tokio::time::timeout(WAIT, rx.wait_for(Option::is_some))
            .await
            .expect("feed was never opened")
            .unwrap()
            .clone();
        tx.unwrap()
    }
}

#[async_trait]
impl DeviceApi for FakeApi {
    async fn exchange_code(
        &self,
        _client: &OAuthClient,
        code: &str,
    ) -> Result<Credential, hearth_api::Error> {
        match self.exchange.lock().unwrap().clone() {
            Some(credential) if !code.is_empty() => Ok(credential),
            _ => Err(hearth_api::Error::TokenExchange {
                message: "bad code".into(),
            }),
        }
    }

    async fn validate(&self, _credential: &Credential) -> Result<(), hearth_api::Error> {
        self.validate_calls.fetch_add(1, Ordering::SeqCst);
        if self.hold_validate.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let outcome = *self.validate.lock().unwrap();
        outcome.into_result()
    }

    async fn open_feed(
        &self,
        _credential: &Credential,
        cancel: CancellationToken,
    ) -> Result<Feed, hearth_api::Error> {
        self.feed_opens.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(64);
        for message in self.queued.lock().unwrap().drain(..) {
            tx.try_send(message).unwrap();
        }
        self.feed.send_replace(Some(tx));
        Ok(Feed::from_channel(rx, cancel))
    }

    async fn dispatch(
        &self,
        _credential: &Credential,
        mutation: &Mutation,
    ) -> Result<(), hearth_api::Error> {
        self.dispatch_calls.fetch_add(1, Ordering::SeqCst);
        self.dispatched.lock().unwrap().push(mutation.clone());
        if self.hold_dispatch.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let outcome = *self.dispatch.lock().unwrap();
        outcome.into_result()
    }
}

// ── Records ──────────────────────────────────────────────────────────

pub fn thermostat(id: &str, mode: &str, target_f: i32) -> ThermostatRecord {
    ThermostatRecord {
        device_id: id.to_owned(),
        name: Some("Living Room".into()),
        structure_id: Some("s-1".into()),
        hvac_mode: mode.to_owned(),
        ambient_temperature_f: 68,
        target_temperature_f: target_f,
        target_temperature_low_f: 64,
        target_temperature_high_f: 76,
        revision: None,
    }
}

pub fn structure(id: &str, away: &str) -> StructureRecord {
    StructureRecord {
        structure_id: id.to_owned(),
        name: "Home".into(),
        away: away.to_owned(),
        thermostats: vec!["t-1".into()],
        revision: None,
    }
}

pub fn snapshot(mode: &str, target_f: i32) -> FeedMessage {
    FeedMessage::Snapshot(SnapshotRecord {
        thermostats: vec![thermostat("t-1", mode, target_f)],
        structures: vec![structure("s-1", "home")],
    })
}

// ── Session helpers ──────────────────────────────────────────────────

pub fn credential() -> Credential {
    Credential::new("tok-abc", Utc::now() + chrono::Duration::hours(1))
}

pub fn config() -> SessionConfig {
    let endpoints = Endpoints::parse(
        "http://127.0.0.1:9/v1",
        "http://127.0.0.1:9",
        "http://127.0.0.1:9/login/oauth2",
        "ws://127.0.0.1:9/feed",
    )
    .unwrap();
    let client = OAuthClient {
        client_id: "hearth-test".into(),
        client_secret: SecretString::from("secret".to_string()),
        redirect_url: None,
    };
    SessionConfig::new(endpoints, client)
}

pub fn session(
    api: &Arc<FakeApi>,
    tokens: &Arc<MemoryTokenStore>,
) -> SessionController {
    let api: Arc<dyn DeviceApi> = Arc::clone(api) as Arc<dyn DeviceApi>;
    let tokens: Arc<dyn TokenStore> = Arc::clone(tokens) as Arc<dyn TokenStore>;
    SessionController::with_api(config(), api, tokens)
}

/// Start a session with a stored credential and deliver the first
/// snapshot. Returns the session, its event receiver (past `Ready`) and
/// the feed sender.
pub async fn live_session(
    api: &Arc<FakeApi>,
    tokens: &Arc<MemoryTokenStore>,
    first: FeedMessage,
) -> (
    SessionController,
    broadcast::Receiver<SessionEvent>,
    mpsc::Sender<FeedMessage>,
) {
    tokens.save(Some(&credential())).unwrap();
    let session = session(api, tokens);
    let mut events = session.events();
    session.start().await.unwrap();

    let feed = api.feed().await;
    feed.send(first).await.unwrap();
    wait_for(&mut events, |e| matches!(e, SessionEvent::Ready(_))).await;
    (session, events, feed)
}

/// Next event matching `pred`, skipping others.
pub async fn wait_for(
    events: &mut broadcast::Receiver<SessionEvent>,
    pred: impl Fn(&SessionEvent) -> bool,
) -> SessionEvent {
    tokio::time::timeout(WAIT, async {
        loop {
            let event = events.recv().await.unwrap();
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for session event")
}

/// Poll `check` until it holds.
pub async fn eventually(check: impl Fn() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never held");
}
