// ── Auth flows ──
//
// Session-level auth operations over the designer server client. Every
// operation is busy-gated so the global loading indicator tracks it, and
// every failure goes through the classify-report chain exactly once.

use std::sync::Arc;

use secrecy::SecretString;
use tracing::{debug, warn};

use homedeck_api::auth::AccessToken;
use homedeck_api::error::report;
use homedeck_api::{DesignerClient, Error as ApiError, MessageSink};

use crate::error::CoreError;
use crate::session::{BusyGuard, Session};

/// Authentication and token flows bound to one session.
pub struct AuthService {
    api: Arc<DesignerClient>,
    session: Arc<Session>,
    sink: Arc<dyn MessageSink>,
}

impl AuthService {
    pub fn new(
        api: Arc<DesignerClient>,
        session: Arc<Session>,
        sink: Arc<dyn MessageSink>,
    ) -> Self {
        Self { api, session, sink }
    }

    /// Bootstrap the session from the persisted token, if one exists.
    ///
    /// A stored token that no longer refreshes forces a local logout so
    /// the user simply logs in again.
    pub async fn load_stored_token(&self) -> Result<(), CoreError> {
        let Some(token) = self.session.load_persisted_token() else {
            debug!("no persisted token");
            return Ok(());
        };
        self.session.set_access_token(Some(token), true)?;

        if !self.refresh().await || self.update_user().await.is_err() {
            debug!("persisted token is stale, clearing session");
            self.clear_local()?;
        }
        Ok(())
    }

    /// Exchange the refresh token for a fresh access token.
    ///
    /// Returns whether the session now holds a usable token. A revoked
    /// refresh token is suppressed from generic display -- the session
    /// just ends.
    pub async fn refresh(&self) -> bool {
        let Some(current) = self.session.access_token() else {
            return false;
        };

        let _busy = BusyGuard::new(Arc::clone(&self.session));
        match self.api.refresh_token(&current.refresh_token).await {
            Ok(refreshed) => {
                self.session.apply_refreshed(&refreshed);
                true
            }
            Err(err) => {
                let _ = self.surface(err, "GET");
                false
            }
        }
    }

    /// Log in. On success the token is stored in the session; `remember`
    /// controls durable persistence. Auth failures are reported and
    /// yield `None`.
    pub async fn login(
        &self,
        user_name: &str,
        password: &SecretString,
        remember: bool,
    ) -> Result<Option<AccessToken>, CoreError> {
        let _busy = BusyGuard::new(Arc::clone(&self.session));
        match self.api.login(user_name, password).await {
            Ok(token) => {
                self.session.set_access_token(Some(token.clone()), remember)?;
                Ok(Some(token))
            }
            Err(err) => {
                let _ = self.surface(err, "POST");
                Ok(None)
            }
        }
    }

    /// End the session. Local state clears even when the server call
    /// fails.
    pub async fn logout(&self) -> Result<(), CoreError> {
        let _busy = BusyGuard::new(Arc::clone(&self.session));
        if let Some(token) = self.session.access_token() {
            if let Err(err) = self.api.logout(&token.access_token).await {
                let _ = self.surface(err, "GET");
            }
        }
        self.clear_local()
    }

    /// Refresh the session's user record (includes security roles).
    pub async fn update_user(&self) -> Result<(), CoreError> {
        let Some(token) = self.session.access_token() else {
            return Err(CoreError::AuthenticationFailed {
                message: "not logged in".into(),
            });
        };

        let _busy = BusyGuard::new(Arc::clone(&self.session));
        let user = self
            .api
            .current_user(&token.access_token)
            .await
            .map_err(|err| self.surface(err, "GET"))?;
        self.session.set_user(Some(user));
        Ok(())
    }

    /// Mint a long-lived hub token.
    ///
    /// Any failure clears the stored hub token and yields `None`: no
    /// token means the hub integration is not configured, which is not
    /// an error.
    pub async fn hub_token(&self) -> Option<String> {
        let _busy = BusyGuard::new(Arc::clone(&self.session));
        let access = self.session.access_token()?;

        match self.api.hub_token(&access.access_token).await {
            Ok(token) => {
                let value = token.token.clone();
                self.session.set_hub_token(Some(token));
                Some(value)
            }
            Err(err) => {
                let _ = self.surface(err, "GET");
                self.session.set_hub_token(None);
                None
            }
        }
    }

    /// Classify-report once, then hand back a core error for rethrowing.
    fn surface(&self, err: ApiError, action: &str) -> CoreError {
        match err {
            ApiError::Api(failure) => {
                let failure = report(failure, action, None, self.sink.as_ref());
                CoreError::from(ApiError::Api(failure))
            }
            other => {
                warn!(error = %other, action, "api call failed");
                CoreError::from(other)
            }
        }
    }

    fn clear_local(&self) -> Result<(), CoreError> {
        self.session.set_access_token(None, false)?;
        self.session.set_user(None);
        self.session.set_hub_token(None);
        Ok(())
    }
}
