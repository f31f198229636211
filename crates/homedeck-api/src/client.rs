// Designer server HTTP client
//
// Wraps `reqwest::Client` with URL construction, bearer auth, and the
// classify-once error boundary. Endpoint groups (auth, components) are
// implemented as inherent methods in their own modules to keep this one
// focused on transport mechanics.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::{ApiFailure, Error};
use crate::transport::TransportConfig;

/// HTTP client for the designer server.
///
/// Every request failure comes back as a classified [`ApiFailure`]; callers
/// never see raw `reqwest` errors.
pub struct DesignerClient {
    http: reqwest::Client,
    base_url: Url,
}

impl DesignerClient {
    /// Create a new client from a [`TransportConfig`].
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self { http, base_url })
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn from_reqwest(base_url: &str, http: reqwest::Client) -> Result<Self, Error> {
        Ok(Self {
            http,
            base_url: Url::parse(base_url)?,
        })
    }

    /// The server base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build a full URL for a server path.
    pub(crate) fn url(&self, path: &str) -> Url {
        let full = format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Url::parse(&full).expect("invalid API URL")
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// GET a JSON payload, optionally authenticated with a bearer token.
    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        bearer: Option<&str>,
    ) -> Result<T, Error> {
        let mut request = self.http.get(url.clone());
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        let response = self.check(request.send().await).await?;
        Self::parse_json(response).await
    }

    /// POST a JSON body, returning the JSON response.
    pub(crate) async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: Url,
        body: &B,
        bearer: Option<&str>,
    ) -> Result<T, Error> {
        let mut request = self.http.post(url.clone()).json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        let response = self.check(request.send().await).await?;
        Self::parse_json(response).await
    }

    /// GET raw bytes (component source code).
    pub(crate) async fn get_bytes(
        &self,
        url: Url,
        bearer: Option<&str>,
    ) -> Result<bytes::Bytes, Error> {
        let mut request = self.http.get(url.clone());
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        let response = self.check(request.send().await).await?;
        response
            .bytes()
            .await
            .map_err(|e| Error::Api(ApiFailure::from_transport(&e)))
    }

    /// Classify transport errors and non-success statuses at the boundary.
    async fn check(
        &self,
        result: Result<reqwest::Response, reqwest::Error>,
    ) -> Result<reqwest::Response, Error> {
        match result {
            Ok(response) if response.status().is_success() => Ok(response),
            Ok(response) => {
                debug!(status = response.status().as_u16(), url = %response.url(), "request rejected");
                Err(Error::Api(ApiFailure::from_response(response).await))
            }
            Err(err) => Err(Error::Api(ApiFailure::from_transport(&err))),
        }
    }

    async fn parse_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, Error> {
        let body = response
            .text()
            .await
            .map_err(|e| Error::Api(ApiFailure::from_transport(&e)))?;
        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }
}
