// ── Hub link ──
//
// Owns the single live connection to the hub. Authenticates with a
// freshly minted long-lived token, subscribes to the entity feed, and
// pumps every snapshot into the session and out to the mount. The busy
// counter covers one whole connect cycle: incremented on entry, released
// on the first delivered snapshot (or on any earlier exit).

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use homedeck_api::{FeedHandle, FeedStatus, StateFrame};

use crate::auth::AuthService;
use crate::config::DeckConfig;
use crate::error::CoreError;
use crate::model::EntitySnapshot;
use crate::mount::Mount;
use crate::session::{BusyGuard, Session};

// ── ConnectionState ──────────────────────────────────────────────────

/// Hub connection state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Authenticating,
    Subscribed,
    Reconnecting,
}

// ── HubLink ──────────────────────────────────────────────────────────

/// The single owner of the hub connection.
///
/// Cheaply cloneable via `Arc`. At most one connection is live at a
/// time: connecting again tears the previous one down first.
#[derive(Clone)]
pub struct HubLink {
    inner: Arc<HubLinkInner>,
}

struct HubLinkInner {
    config: DeckConfig,
    auth: Arc<AuthService>,
    session: Arc<Session>,
    state: watch::Sender<ConnectionState>,
    active: Mutex<Option<ActiveFeed>>,
}

struct ActiveFeed {
    cancel: CancellationToken,
    pump: JoinHandle<()>,
}

impl HubLink {
    pub fn new(config: DeckConfig, auth: Arc<AuthService>, session: Arc<Session>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(HubLinkInner {
                config,
                auth,
                session,
                state,
                active: Mutex::new(None),
            }),
        }
    }

    /// Connect to the hub and start fanning snapshots out to `mount`.
    ///
    /// No obtainable token means the integration is not configured; that
    /// path returns `Ok` without opening anything. A failing connect
    /// sequence surfaces as one descriptive error and is not retried
    /// here -- only an established feed heals itself.
    pub async fn connect(&self, mount: Arc<Mount>) -> Result<(), CoreError> {
        let busy = BusyGuard::new(Arc::clone(&self.inner.session));

        // Single-writer discipline on the connection slot.
        self.close().await;

        let _ = self.inner.state.send(ConnectionState::Authenticating);

        let Some(token) = self.inner.auth.hub_token().await else {
            debug!("no hub token available, skipping hub connection");
            let _ = self.inner.state.send(ConnectionState::Disconnected);
            return Ok(());
        };

        let cancel = CancellationToken::new();
        let handle = FeedHandle::connect(
            self.inner.config.hub_ws_url.clone(),
            &token,
            self.inner.config.reconnect.clone(),
            cancel.clone(),
        )
        .await
        .map_err(|e| {
            let _ = self.inner.state.send(ConnectionState::Disconnected);
            CoreError::HubConnectionFailed {
                reason: e.to_string(),
            }
        })?;

        let _ = self.inner.state.send(ConnectionState::Subscribed);
        info!("hub feed connected");

        let pump = tokio::spawn(pump_task(
            Arc::clone(&self.inner),
            handle,
            mount,
            busy,
        ));

        *self.inner.active.lock().await = Some(ActiveFeed { cancel, pump });
        Ok(())
    }

    /// Tear down the hub connection. A no-op when nothing is connected.
    pub async fn close(&self) {
        let previous = self.inner.active.lock().await.take();
        if let Some(active) = previous {
            active.cancel.cancel();
            let _ = active.pump.await;
            let _ = self.inner.state.send(ConnectionState::Disconnected);
            debug!("hub connection closed");
        }
    }

    /// Subscribe to connection state changes.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// The current connection state.
    pub fn current_state(&self) -> ConnectionState {
        *self.inner.state.subscribe().borrow()
    }
}

// ── Pump task ────────────────────────────────────────────────────────

/// Move frames from the feed into the session and the mount, and mirror
/// feed status into the connection state.
async fn pump_task(
    inner: Arc<HubLinkInner>,
    handle: FeedHandle,
    mount: Arc<Mount>,
    mut busy: BusyGuard,
) {
    let mut frames = handle.subscribe();
    let mut status = handle.status();

    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = match *status.borrow_and_update() {
                    FeedStatus::Subscribed => ConnectionState::Subscribed,
                    FeedStatus::Reconnecting => ConnectionState::Reconnecting,
                };
                let _ = inner.state.send(state);
            }
            frame = frames.recv() => {
                match frame {
                    Ok(frame) => {
                        let snapshot = Arc::new(EntitySnapshot::from(StateFrame::clone(&frame)));
                        inner.session.set_entities(Arc::clone(&snapshot));
                        mount.broadcast(&snapshot);
                        // The first snapshot completes the connect cycle.
                        busy.release();
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "hub pump lagged, continuing with latest frames");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    debug!("hub pump exiting");
}
