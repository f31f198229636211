//! Hub entity feed with auto-reconnect.
//!
//! Connects to the hub's WebSocket endpoint, subscribes to value changes,
//! and streams complete entity-state frames through a
//! [`tokio::sync::broadcast`] channel. After the first successful
//! subscribe, drops are healed by a fixed-interval reconnection loop.
//!
//! # Example
//!
//! ```rust,ignore
//! use homedeck_api::feed::{FeedHandle, ReconnectPolicy};
//! use tokio_util::sync::CancellationToken;
//! use url::Url;
//!
//! let cancel = CancellationToken::new();
//! let ws_url = Url::parse("ws://homeassistant.local:8123/api/websocket")?;
//!
//! let handle = FeedHandle::connect(ws_url, "token", ReconnectPolicy::default(), cancel.clone()).await?;
//! let mut rx = handle.subscribe();
//!
//! while let Ok(frame) = rx.recv().await {
//!     println!("{} entities", frame.entities.len());
//! }
//!
//! handle.shutdown();
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, watch};
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;

// ── Channel capacity ─────────────────────────────────────────────────

const FRAME_CHANNEL_CAPACITY: usize = 256;

/// The subscription the feed asks for on every successful open.
pub const VALUE_CHANGE_SUBSCRIPTION: &str = "valueChange";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ── Wire types ───────────────────────────────────────────────────────

/// One entity's state as the hub reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityUpdate {
    pub state: serde_json::Value,

    /// Free-form attribute map; absent means no attributes.
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

/// A complete entity-state frame.
///
/// The hub pushes the full map on every change -- frames replace, they
/// never patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateFrame {
    pub entities: HashMap<String, EntityUpdate>,
}

// ── ReconnectPolicy ──────────────────────────────────────────────────

/// Fixed-interval reconnection policy.
///
/// Deliberately constant rather than exponential: the hub sits on the
/// local network and expects clients to come back quickly.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Delay between reconnection attempts. Default: 5s.
    pub interval: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
        }
    }
}

// ── Feed status ──────────────────────────────────────────────────────

/// Whether the feed currently holds a live subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
    Subscribed,
    Reconnecting,
}

// ── FeedHandle ───────────────────────────────────────────────────────

/// Handle to a running hub feed.
///
/// Dropping the handle does not stop the background task; call
/// [`shutdown`](Self::shutdown) (or cancel the token passed to
/// [`connect`](Self::connect)) for a deterministic teardown.
pub struct FeedHandle {
    frame_rx: broadcast::Receiver<Arc<StateFrame>>,
    status_rx: watch::Receiver<FeedStatus>,
    cancel: CancellationToken,
}

impl FeedHandle {
    /// Open the feed and spawn the reconnection loop.
    ///
    /// The first connect and subscribe happen inline: an unreachable hub
    /// or rejected upgrade surfaces here rather than being retried. Only
    /// drops *after* a successful subscribe trigger reconnection.
    pub async fn connect(
        ws_url: Url,
        token: &str,
        policy: ReconnectPolicy,
        cancel: CancellationToken,
    ) -> Result<Self, Error> {
        let ws = open_and_subscribe(&ws_url, token).await?;

        let (frame_tx, frame_rx) = broadcast::channel(FRAME_CHANNEL_CAPACITY);
        let (status_tx, status_rx) = watch::channel(FeedStatus::Subscribed);

        let task_cancel = cancel.clone();
        let token = token.to_owned();
        tokio::spawn(async move {
            feed_loop(ws, ws_url, token, frame_tx, status_tx, policy, task_cancel).await;
        });

        Ok(Self {
            frame_rx,
            status_rx,
            cancel,
        })
    }

    /// Get a new broadcast receiver for state frames.
    ///
    /// A consumer that falls behind receives
    /// [`broadcast::error::RecvError::Lagged`] and continues with the
    /// most recent frames -- old snapshots are worthless anyway.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<StateFrame>> {
        self.frame_rx.resubscribe()
    }

    /// Observe subscribe/reconnect transitions.
    pub fn status(&self) -> watch::Receiver<FeedStatus> {
        self.status_rx.clone()
    }

    /// Signal the background task to shut down gracefully.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

// ── Background loop ──────────────────────────────────────────────────

/// Read frames until the socket drops, then retry on a fixed interval.
async fn feed_loop(
    mut ws: WsStream,
    ws_url: Url,
    token: String,
    frame_tx: broadcast::Sender<Arc<StateFrame>>,
    status_tx: watch::Sender<FeedStatus>,
    policy: ReconnectPolicy,
    cancel: CancellationToken,
) {
    loop {
        read_frames(&mut ws, &frame_tx, &cancel).await;

        if cancel.is_cancelled() {
            break;
        }

        let _ = status_tx.send(FeedStatus::Reconnecting);
        tracing::info!("hub feed dropped, entering reconnect loop");

        // One attempt per tick; the tick that succeeds ends the polling.
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                () = tokio::time::sleep(policy.interval) => {}
            }

            match open_and_subscribe(&ws_url, &token).await {
                Ok(new_ws) => {
                    ws = new_ws;
                    let _ = status_tx.send(FeedStatus::Subscribed);
                    tracing::info!("hub feed re-established");
                    break;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "hub reconnect attempt failed");
                }
            }
        }
    }

    tracing::debug!("hub feed loop exiting");
}

/// Establish one connection and send the subscription frame.
///
/// The hub token rides on the upgrade request as a bearer header; the
/// subscription frame is sent exactly once per successful open.
async fn open_and_subscribe(url: &Url, token: &str) -> Result<WsStream, Error> {
    tracing::debug!(url = %url, "connecting to hub feed");

    let uri: tungstenite::http::Uri = url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;

    let request =
        ClientRequestBuilder::new(uri).with_header("Authorization", format!("Bearer {token}"));

    let (mut ws, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    let subscribe = json!({ "subscriptionType": VALUE_CHANGE_SUBSCRIPTION }).to_string();
    ws.send(tungstenite::Message::text(subscribe))
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    tracing::info!("hub feed subscribed");
    Ok(ws)
}

/// Pump one socket until it closes, errors, or the feed is cancelled.
async fn read_frames(
    ws: &mut WsStream,
    frame_tx: &broadcast::Sender<Arc<StateFrame>>,
    cancel: &CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            frame = ws.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        parse_and_publish(&text, frame_tx);
                    }
                    Some(Ok(tungstenite::Message::Ping(_))) => {
                        // tungstenite answers pongs automatically
                        tracing::trace!("hub ping");
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        if let Some(ref cf) = frame {
                            tracing::info!(code = %cf.code, reason = %cf.reason, "hub close frame received");
                        } else {
                            tracing::info!("hub close frame received (no payload)");
                        }
                        return;
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "hub socket error");
                        return;
                    }
                    None => {
                        tracing::info!("hub stream ended");
                        return;
                    }
                    _ => {
                        // Binary, Pong, Frame -- ignore
                    }
                }
            }
        }
    }
}

// ── Frame parsing ────────────────────────────────────────────────────

/// Parse a text frame and publish it if it carries entity state.
fn parse_and_publish(text: &str, frame_tx: &broadcast::Sender<Arc<StateFrame>>) {
    let frame: StateFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::debug!(error = %e, "skipping unparseable feed frame");
            return;
        }
    };

    // Ignore send errors -- just means no active subscribers right now
    let _ = frame_tx.send(Arc::new(frame));
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_reconnect_policy_is_five_seconds() {
        assert_eq!(ReconnectPolicy::default().interval, Duration::from_secs(5));
    }

    #[test]
    fn subscribe_frame_shape() {
        let frame = json!({ "subscriptionType": VALUE_CHANGE_SUBSCRIPTION });
        assert_eq!(frame.to_string(), r#"{"subscriptionType":"valueChange"}"#);
    }

    #[test]
    fn parse_state_frame() {
        let (tx, mut rx) = broadcast::channel(16);

        let raw = json!({
            "entities": {
                "light.kitchen": {
                    "state": "on",
                    "attributes": { "brightness": 254, "friendly_name": "Kitchen" }
                },
                "sensor.outside_temp": { "state": "21.4" }
            }
        });

        parse_and_publish(&raw.to_string(), &tx);

        let frame = rx.try_recv().expect("frame published");
        assert_eq!(frame.entities.len(), 2);

        let light = &frame.entities["light.kitchen"];
        assert_eq!(light.state, "on");
        assert_eq!(light.attributes["brightness"], 254);

        // Missing attributes default to an empty map.
        assert!(frame.entities["sensor.outside_temp"].attributes.is_empty());
    }

    #[test]
    fn malformed_frames_are_skipped() {
        let (tx, mut rx) = broadcast::channel::<Arc<StateFrame>>(16);

        parse_and_publish("not json at all", &tx);
        parse_and_publish(r#"{"unexpected": true}"#, &tx);

        assert!(rx.try_recv().is_err());
    }
}
