//! Real-time device feed with auto-reconnect.
//!
//! Connects to the stream endpoint with the caller's bearer token and
//! forwards parsed frames through a bounded [`tokio::sync::mpsc`] channel,
//! preserving arrival order. Handles reconnection with exponential
//! backoff + jitter automatically.
//!
//! # Example
//!
//! ```rust,ignore
//! use hearth_api::{Credential, Feed, FeedMessage, ReconnectConfig};
//! use tokio_util::sync::CancellationToken;
//! use url::Url;
//!
//! let url = Url::parse("wss://stream.example.com/v1/feed")?;
//! let mut feed = Feed::connect(url, credential, ReconnectConfig::default(), CancellationToken::new());
//!
//! while let Some(message) = feed.recv().await {
//!     println!("{message:?}");
//! }
//! ```

use std::time::Duration;

use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::auth::Credential;
use crate::error::Error;
use crate::models::{SnapshotRecord, StructureRecord, ThermostatRecord};

// ── Channel capacity ─────────────────────────────────────────────────

const FEED_CHANNEL_CAPACITY: usize = 256;

// ── FeedMessage ──────────────────────────────────────────────────────

/// One item delivered by the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedMessage {
    /// Full state set. Sent by the server after every (re)connect.
    Snapshot(SnapshotRecord),
    /// One thermostat changed.
    Thermostat(ThermostatRecord),
    /// One structure changed.
    Structure(StructureRecord),
    /// The server revoked the token. The feed stops after this message.
    AuthRevoked,
    /// A connection was established.
    Connected,
    /// The connection dropped or could not be established.
    Disconnected { reason: String },
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for feed reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum reconnection attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

// ── Feed ─────────────────────────────────────────────────────────────

/// Receiving end of a running feed.
///
/// Dropping the feed (or calling [`shutdown`](Self::shutdown)) stops the
/// background task.
#[derive(Debug)]
pub struct Feed {
    rx: mpsc::Receiver<FeedMessage>,
    cancel: CancellationToken,
}

impl Feed {
    /// Spawn the connect/read/reconnect loop and return immediately.
    ///
    /// The loop runs under a child of `cancel`, so cancelling the parent
    /// also stops it. Must be called from within a Tokio runtime.
    pub fn connect(
        url: Url,
        credential: Credential,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
    ) -> Self {
        let (tx, rx) = mpsc::channel(FEED_CHANNEL_CAPACITY);
        let cancel = cancel.child_token();

        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            feed_loop(url, credential, tx, reconnect, task_cancel).await;
        });

        Self { rx, cancel }
    }

    /// Wrap an already-fed channel. Useful for alternative transports
    /// and for driving consumers in tests.
    pub fn from_channel(rx: mpsc::Receiver<FeedMessage>, cancel: CancellationToken) -> Self {
        Self { rx, cancel }
    }

    /// Next message, or `None` once the feed has stopped.
    pub async fn recv(&mut self) -> Option<FeedMessage> {
        self.rx.recv().await
    }

    /// Signal the background task to shut down.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for Feed {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Background reconnection loop ─────────────────────────────────────

/// How a single connection ended.
enum Disconnect {
    /// Connection was up and then closed or failed.
    Dropped { reason: String },
    /// Server revoked the token; do not reconnect.
    Revoked,
    /// Cancelled, or nobody is listening anymore.
    Shutdown,
}

/// Main loop: connect → read → on drop, backoff → reconnect.
async fn feed_loop(
    url: Url,
    credential: Credential,
    tx: mpsc::Sender<FeedMessage>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;
    let mut reported_down = false;

    loop {
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = connect_and_read(&url, &credential, &tx, &cancel) => result,
        };

        let reason = match outcome {
            Ok(Disconnect::Shutdown) => break,
            Ok(Disconnect::Revoked) => {
                tracing::warn!("feed reports token revoked, stopping");
                let _ = tx.send(FeedMessage::AuthRevoked).await;
                break;
            }
            Ok(Disconnect::Dropped { reason }) => {
                tracing::info!(%reason, "feed disconnected, reconnecting");
                attempt = 0;
                reported_down = false;
                reason
            }
            Err(e) => {
                tracing::warn!(error = %e, attempt, "feed connection failed");
                e.to_string()
            }
        };

        if !reported_down {
            reported_down = true;
            if tx.send(FeedMessage::Disconnected { reason }).await.is_err() {
                break;
            }
        }

        if let Some(max) = reconnect.max_retries {
            if attempt >= max {
                tracing::error!(max_retries = max, "feed reconnection limit reached, giving up");
                break;
            }
        }

        let delay = calculate_backoff(attempt, &reconnect);
        tracing::info!(
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            attempt,
            "waiting before reconnect"
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }

        attempt = attempt.saturating_add(1);
    }

    tracing::debug!("feed loop exiting");
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Establish one connection and read frames until it drops.
///
/// `Err` means the connection was never established.
async fn connect_and_read(
    url: &Url,
    credential: &Credential,
    tx: &mpsc::Sender<FeedMessage>,
    cancel: &CancellationToken,
) -> Result<Disconnect, Error> {
    tracing::info!(url = %url, "connecting to feed");

    let uri: tungstenite::http::Uri = url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;

    let request = ClientRequestBuilder::new(uri).with_header("Authorization", credential.bearer());

    let ws_stream = match tokio_tungstenite::connect_async(request).await {
        Ok((stream, _response)) => stream,
        Err(tungstenite::Error::Http(response))
            if matches!(response.status().as_u16(), 401 | 403) =>
        {
            return Ok(Disconnect::Revoked);
        }
        Err(e) => return Err(Error::WebSocketConnect(e.to_string())),
    };

    tracing::info!("feed connected");
    if tx.send(FeedMessage::Connected).await.is_err() {
        return Ok(Disconnect::Shutdown);
    }

    let (_write, mut read) = ws_stream.split();

    loop {
        let frame = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(Disconnect::Shutdown),
            frame = read.next() => frame,
        };

        match frame {
            Some(Ok(tungstenite::Message::Text(text))) => match parse_frame(text.as_str()) {
                Some(FeedMessage::AuthRevoked) => return Ok(Disconnect::Revoked),
                Some(message) => {
                    if tx.send(message).await.is_err() {
                        return Ok(Disconnect::Shutdown);
                    }
                }
                None => {}
            },
            Some(Ok(tungstenite::Message::Ping(_))) => {
                tracing::trace!("feed ping");
            }
            Some(Ok(tungstenite::Message::Close(frame))) => {
                let reason = match frame {
                    Some(cf) => {
                        let closed = Error::WebSocketClosed {
                            code: u16::from(cf.code),
                            reason: cf.reason.to_string(),
                        };
                        closed.to_string()
                    }
                    None => "server closed the connection".to_owned(),
                };
                return Ok(Disconnect::Dropped { reason });
            }
            Some(Err(e)) => {
                return Ok(Disconnect::Dropped {
                    reason: e.to_string(),
                });
            }
            None => {
                return Ok(Disconnect::Dropped {
                    reason: "stream ended".to_owned(),
                });
            }
            Some(Ok(_)) => {
                // Binary, Pong, Frame -- ignore
            }
        }
    }
}

// ── Frame parsing ────────────────────────────────────────────────────

/// Text frame envelope: `{"type": "...", "data": {...}}`.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
enum Frame {
    Snapshot(SnapshotRecord),
    Thermostat(ThermostatRecord),
    Structure(StructureRecord),
    AuthRevoked,
    KeepAlive,
}

/// Parse one text frame. Keep-alives and malformed frames yield `None`.
fn parse_frame(text: &str) -> Option<FeedMessage> {
    let frame: Frame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::debug!(error = %e, "failed to parse feed frame");
            return None;
        }
    };

    match frame {
        Frame::Snapshot(s) => Some(FeedMessage::Snapshot(s)),
        Frame::Thermostat(t) => Some(FeedMessage::Thermostat(t)),
        Frame::Structure(s) => Some(FeedMessage::Structure(s)),
        Frame::AuthRevoked => Some(FeedMessage::AuthRevoked),
        Frame::KeepAlive => {
            tracing::trace!("feed keep-alive");
            None
        }
    }
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) + jitter`
///
/// Jitter is +-25% to spread out reconnection storms from multiple clients.
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt.min(30)).unwrap_or(30);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic "jitter" seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

// ── Tests ────────────────────────────────────────────────────────────
