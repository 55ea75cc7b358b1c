//! vSphere REST API HTTP client with session-based authentication.
//!
//! Communicates with vCenter / ESXi via `https://{host}:{port}/api/...`.
//! [`HttpConnector`] builds and logs in a [`VsphereClient`]; the client is
//! the live connection a [`Session`](crate::session::Session) holds.

use crate::config::VsphereConfig;
use crate::error::{VmwareError, VmwareErrorKind, VmwareResult};
use crate::session::{Connection, Connector};
use crate::types::{ServiceContent, SessionInfo};

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

const SESSION_HEADER: &str = "vmware-api-session-id";

/// vSphere REST API client.
pub struct VsphereClient {
    client: Client,
    base_url: String,
    session_id: Option<String>,
}

impl std::fmt::Debug for VsphereClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VsphereClient")
            .field("base_url", &self.base_url)
            .field("logged_in", &self.session_id.is_some())
            .finish()
    }
}

impl VsphereClient {
    /// Build a new client from config (does NOT create a session yet).
    pub fn new(config: &VsphereConfig) -> VmwareResult<Self> {
        let base = config.base_url()?;
        let client = Client::builder()
            .https_only(true)
            .danger_accept_invalid_certs(config.tls.accepts_invalid_certs())
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| VmwareError::connection(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base.as_str().trim_end_matches('/').to_string(),
            session_id: None,
        })
    }

    /// Plain-HTTP client for a local mock endpoint.
    #[cfg(test)]
    pub(crate) fn plain_http(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            session_id: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_session_id(mut self, session_id: &str) -> Self {
        self.session_id = Some(session_id.to_string());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_logged_in(&self) -> bool {
        self.session_id.is_some()
    }

    // ── Session management ──────────────────────────────────────────

    /// Create a new API session (POST /api/session).
    pub async fn login(&mut self, username: &str, password: &str) -> VmwareResult<()> {
        let url = format!("{}/api/session", self.base_url);

        let resp = self
            .client
            .post(&url)
            .basic_auth(username, Some(password))
            .send()
            .await?;

        if resp.status() == StatusCode::UNAUTHORIZED {
            return Err(VmwareError::auth("Invalid credentials"));
        }

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(VmwareError::api(status.as_u16(), format!("Login failed: {body}")));
        }

        // Session ID comes back as a quoted JSON string
        let session_id: String = resp.json().await.map_err(|e| {
            VmwareError::parse(format!("Failed to parse session response: {e}"))
        })?;

        self.session_id = Some(session_id);
        Ok(())
    }

    /// Delete the current session (DELETE /api/session).
    ///
    /// The local session id is dropped even when the request fails.
    pub async fn logout(&mut self) -> VmwareResult<()> {
        let Some(sid) = self.session_id.take() else {
            return Ok(());
        };
        let url = format!("{}/api/session", self.base_url);
        let resp = self
            .client
            .delete(&url)
            .header(SESSION_HEADER, sid.as_str())
            .send()
            .await?;
        Self::check_status(resp).await?;
        Ok(())
    }

    /// GET /api/session.
    pub async fn session_info(&self) -> VmwareResult<SessionInfo> {
        self.get("/api/session").await
    }

    // ── HTTP helpers ────────────────────────────────────────────────

    fn require_session(&self) -> VmwareResult<&str> {
        self.session_id
            .as_deref()
            .ok_or_else(|| VmwareError::not_connected("Not logged in: no active session"))
    }

    /// GET a JSON response.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> VmwareResult<T> {
        self.get_with_params(path, &[]).await
    }

    /// GET a JSON response with query params.
    pub async fn get_with_params<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> VmwareResult<T> {
        let sid = self.require_session()?;
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .header(SESSION_HEADER, sid)
            .query(params)
            .send()
            .await?;
        let resp = Self::check_status(resp).await?;
        Self::parse_response(resp).await
    }

    /// POST with an optional JSON body, return parsed response.
    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<&B>,
    ) -> VmwareResult<T> {
        let sid = self.require_session()?;
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.client.post(&url).header(SESSION_HEADER, sid);
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = Self::check_status(req.send().await?).await?;
        Self::parse_response(resp).await
    }

    // ── Internal helpers ────────────────────────────────────────────

    async fn check_status(resp: Response) -> VmwareResult<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let code = status.as_u16();
        let body = resp.text().await.unwrap_or_default();

        match status {
            StatusCode::UNAUTHORIZED => Err(VmwareError::auth(format!("Session expired or invalid: {body}"))),
            StatusCode::FORBIDDEN => Err(VmwareError::new(
                VmwareErrorKind::AccessDenied,
                format!("Access denied: {body}"),
            )),
            StatusCode::NOT_FOUND => Err(VmwareError::not_found(format!("Resource not found: {body}"))),
            _ => Err(VmwareError::api(code, format!("API error {code}: {body}"))),
        }
    }

    async fn parse_response<T: DeserializeOwned>(resp: Response) -> VmwareResult<T> {
        let text = resp.text().await.map_err(|e| {
            VmwareError::parse(format!("Failed to read response body: {e}"))
        })?;
        parse_body(&text)
    }
}

/// Empty bodies deserialize as JSON `null`.
fn parse_body<T: DeserializeOwned>(text: &str) -> VmwareResult<T> {
    let text = if text.trim().is_empty() { "null" } else { text };
    serde_json::from_str(text).map_err(|e| {
        let head: String = text.chars().take(500).collect();
        VmwareError::parse(format!("JSON parse error: {e}; body: {head}"))
    })
}

#[async_trait]
impl Connection for VsphereClient {
    async fn retrieve_content(&self) -> VmwareResult<ServiceContent> {
        Ok(ServiceContent::new(self.session_info().await?))
    }

    async fn logout(&mut self) -> VmwareResult<()> {
        VsphereClient::logout(self).await
    }
}

/// Opens [`VsphereClient`] connections over HTTPS.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpConnector;

#[async_trait]
impl Connector for HttpConnector {
    type Conn = VsphereClient;

    async fn open(&self, config: &VsphereConfig) -> VmwareResult<VsphereClient> {
        let mut client = VsphereClient::new(config)?;
        client.login(&config.username, config.password()).await?;
        Ok(client)
    }
}
