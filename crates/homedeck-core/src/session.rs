// ── Session context ──
//
// One explicitly constructed context object per user session. Holds the
// busy counter, credential records, and the latest entity snapshot. Every
// component that needs shared state receives a `Session` -- there are no
// module-level singletons anywhere in the host.

use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tokio::sync::watch;
use tracing::{debug, warn};

use homedeck_api::auth::{AccessToken, HubToken, RefreshedToken, User};

use crate::error::CoreError;
use crate::model::EntitySnapshot;

/// Shared per-session state.
pub struct Session {
    busy: watch::Sender<u32>,
    server_online: watch::Sender<bool>,
    access_token: ArcSwapOption<AccessToken>,
    hub_token: ArcSwapOption<HubToken>,
    user: ArcSwapOption<User>,
    entities: ArcSwapOption<EntitySnapshot>,
    token_path: Option<PathBuf>,
}

impl Session {
    /// Create a session. `token_path` is the single durable-storage key
    /// for the access token; `None` disables persistence entirely.
    pub fn new(token_path: Option<PathBuf>) -> Self {
        let (busy, _) = watch::channel(0);
        let (server_online, _) = watch::channel(false);
        Self {
            busy,
            server_online,
            access_token: ArcSwapOption::empty(),
            hub_token: ArcSwapOption::empty(),
            user: ArcSwapOption::empty(),
            entities: ArcSwapOption::empty(),
            token_path,
        }
    }

    // ── Busy counter ─────────────────────────────────────────────────

    /// Flag one more in-flight operation.
    pub fn increment_busy(&self) {
        self.busy.send_modify(|count| *count += 1);
    }

    /// Flag one in-flight operation as finished. Clamped at zero: a
    /// surplus decrement never drives the counter negative.
    pub fn decrement_busy(&self) {
        self.busy.send_modify(|count| *count = count.saturating_sub(1));
    }

    /// Whether any operation is in flight.
    pub fn is_busy(&self) -> bool {
        *self.busy.borrow() > 0
    }

    /// Observe busy-count changes (drives a global loading indicator).
    pub fn busy_watch(&self) -> watch::Receiver<u32> {
        self.busy.subscribe()
    }

    // ── Server status ────────────────────────────────────────────────

    pub fn set_server_online(&self, online: bool) {
        let _ = self.server_online.send(online);
    }

    pub fn server_online(&self) -> bool {
        *self.server_online.borrow()
    }

    // ── Access token ─────────────────────────────────────────────────

    /// Set or clear the access token.
    ///
    /// With `persist`, the token is also written to the configured token
    /// file; clearing the token (or passing `persist = false`) removes
    /// the file. This is the only place that touches durable storage.
    pub fn set_access_token(
        &self,
        token: Option<AccessToken>,
        persist: bool,
    ) -> Result<(), CoreError> {
        self.access_token.store(token.clone().map(Arc::new));

        let Some(path) = &self.token_path else {
            return Ok(());
        };

        match token {
            Some(token) if persist => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let serialized = serde_json::to_string_pretty(&token)
                    .map_err(|e| CoreError::Config {
                        message: format!("failed to serialize token: {e}"),
                    })?;
                std::fs::write(path, serialized)?;
                debug!(path = %path.display(), "access token persisted");
            }
            _ => {
                match std::fs::remove_file(path) {
                    Ok(()) => debug!(path = %path.display(), "persisted token removed"),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(CoreError::TokenStorage(e)),
                }
            }
        }
        Ok(())
    }

    /// The current access token, if any.
    pub fn access_token(&self) -> Option<Arc<AccessToken>> {
        self.access_token.load_full()
    }

    /// Swap in a refreshed access token, keeping the refresh pair.
    pub fn apply_refreshed(&self, refreshed: &RefreshedToken) {
        self.access_token.rcu(|current| {
            current.as_ref().map(|token| {
                let mut updated = AccessToken::clone(token);
                updated.access_token = refreshed.access_token.clone();
                updated.access_token_expiry = refreshed.access_token_expiry;
                Arc::new(updated)
            })
        });
    }

    /// Read a previously persisted access token, if one exists and still
    /// parses. A corrupt file is treated as absent.
    pub fn load_persisted_token(&self) -> Option<AccessToken> {
        let path = self.token_path.as_ref()?;
        let raw = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(token) => Some(token),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring corrupt persisted token");
                None
            }
        }
    }

    // ── Hub token ────────────────────────────────────────────────────

    pub fn set_hub_token(&self, token: Option<HubToken>) {
        self.hub_token.store(token.map(Arc::new));
    }

    pub fn hub_token(&self) -> Option<Arc<HubToken>> {
        self.hub_token.load_full()
    }

    // ── User ─────────────────────────────────────────────────────────

    pub fn set_user(&self, user: Option<User>) {
        self.user.store(user.map(Arc::new));
    }

    pub fn user(&self) -> Option<Arc<User>> {
        self.user.load_full()
    }

    // ── Entity snapshot ──────────────────────────────────────────────

    /// Store the latest snapshot. Wholesale replace -- the previous
    /// snapshot is dropped, never merged into.
    pub fn set_entities(&self, snapshot: Arc<EntitySnapshot>) {
        self.entities.store(Some(snapshot));
    }

    /// The last-known snapshot, if the feed has delivered one.
    pub fn entities(&self) -> Option<Arc<EntitySnapshot>> {
        self.entities.load_full()
    }
}

// ── BusyGuard ────────────────────────────────────────────────────────

/// Increments the session busy counter on creation and guarantees exactly
/// one matching decrement: either an explicit [`release`](Self::release)
/// or the drop at the end of whichever exit path runs.
pub struct BusyGuard {
    session: Arc<Session>,
    released: bool,
}

impl BusyGuard {
    pub fn new(session: Arc<Session>) -> Self {
        session.increment_busy();
        Self {
            session,
            released: false,
        }
    }

    /// Decrement now. Idempotent.
    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.session.decrement_busy();
        }
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.release();
    }
}

// ── Tests ────────────────────────────────────────────────────────────
