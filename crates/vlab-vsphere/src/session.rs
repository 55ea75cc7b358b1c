//! Connection lifecycle for a single vSphere endpoint.
//!
//! A [`Session`] holds at most one live connection. `connect` refuses to
//! replace an existing one, `disconnect` is idempotent, and [`Session::scoped`]
//! pairs the two so the remote session is released on every exit path.

use crate::config::{TlsVerification, VsphereConfig};
use crate::error::{VmwareError, VmwareResult};
use crate::observe::{LifecycleEvent, SharedSink};
use crate::types::ServiceContent;
use crate::vsphere::HttpConnector;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;

/// A logged-in link to the endpoint, as produced by a [`Connector`].
#[async_trait]
pub trait Connection: Send + Sync {
    /// Fetch the session's root content.
    async fn retrieve_content(&self) -> VmwareResult<ServiceContent>;

    /// Release the remote session.
    async fn logout(&mut self) -> VmwareResult<()>;
}

/// Opens authenticated connections. The TLS choice travels in the config.
#[async_trait]
pub trait Connector: Send + Sync {
    type Conn: Connection;

    async fn open(&self, config: &VsphereConfig) -> VmwareResult<Self::Conn>;
}

struct Live<T> {
    conn: T,
    content: ServiceContent,
}

/// Authenticated, stateful link to one vCenter / ESXi endpoint.
pub struct Session<C: Connector = HttpConnector> {
    connector: C,
    config: VsphereConfig,
    sink: SharedSink,
    live: Option<Live<C::Conn>>,
}

impl Session<HttpConnector> {
    /// Session over the vSphere REST API.
    pub fn new(config: VsphereConfig, sink: SharedSink) -> Self {
        Self::with_connector(HttpConnector, config, sink)
    }
}

impl<C: Connector> Session<C> {
    pub fn with_connector(connector: C, config: VsphereConfig, sink: SharedSink) -> Self {
        Self { connector, config, sink, live: None }
    }

    /// `https://host:port` of the endpoint, for display.
    pub fn endpoint(&self) -> String {
        format!("https://{}:{}", self.config.host, self.config.port)
    }

    pub fn config(&self) -> &VsphereConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.live.is_some()
    }

    pub fn connection(&self) -> Option<&C::Conn> {
        self.live.as_ref().map(|l| &l.conn)
    }

    pub fn content(&self) -> Option<&ServiceContent> {
        self.live.as_ref().map(|l| &l.content)
    }

    /// The live connection, or `NotConnected`.
    pub fn require_connection(&self) -> VmwareResult<&C::Conn> {
        self.connection()
            .ok_or_else(|| VmwareError::not_connected("Not connected to vSphere; call connect first"))
    }

    /// Establish the session.
    ///
    /// `tls` overrides the config's TLS choice. The override is kept only
    /// if the connection is established.
    pub async fn connect(&mut self, tls: TlsVerification) -> VmwareResult<()> {
        let endpoint = self.endpoint();
        if self.live.is_some() {
            return Err(VmwareError::already_connected(format!(
                "Session to {endpoint} is already connected; disconnect first"
            )));
        }

        let mut attempt = self.config.clone();
        attempt.tls = tls;
        self.sink.record(&LifecycleEvent::Connecting {
            endpoint: endpoint.clone(),
            verify_tls: !tls.accepts_invalid_certs(),
        });

        let mut conn = match self.connector.open(&attempt).await {
            Ok(conn) => conn,
            Err(e) => {
                self.sink.record(&LifecycleEvent::ConnectFailed {
                    endpoint,
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };

        let content = match conn.retrieve_content().await {
            Ok(content) => content,
            Err(e) => {
                // Logged in but unusable: release it before reporting.
                if let Err(logout_err) = conn.logout().await {
                    self.sink.record(&LifecycleEvent::LogoutFailed {
                        endpoint: endpoint.clone(),
                        reason: logout_err.to_string(),
                    });
                }
                self.sink.record(&LifecycleEvent::ConnectFailed {
                    endpoint,
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };

        self.sink.record(&LifecycleEvent::Connected {
            endpoint,
            user: content.user().map(str::to_string),
            at: content.connected_at,
        });
        self.config = attempt;
        self.live = Some(Live { conn, content });
        Ok(())
    }

    /// Log out and clear the connection. No-op when not connected.
    pub async fn disconnect(&mut self) {
        let Some(mut live) = self.live.take() else {
            return;
        };
        let endpoint = self.endpoint();
        if let Err(e) = live.conn.logout().await {
            self.sink.record(&LifecycleEvent::LogoutFailed {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            });
        }
        self.sink.record(&LifecycleEvent::Disconnected { endpoint });
    }

    /// Connect, run `op`, then disconnect whatever `op` did.
    ///
    /// `op`'s result is returned as-is. A panic inside `op` is resumed after
    /// the disconnect has run. If connecting fails, `op` never runs.
    pub async fn scoped<T, F>(&mut self, tls: TlsVerification, op: F) -> VmwareResult<T>
    where
        F: for<'s> FnOnce(&'s Session<C>) -> BoxFuture<'s, VmwareResult<T>>,
    {
        self.connect(tls).await?;
        let outcome = AssertUnwindSafe(op(&*self)).catch_unwind().await;
        self.disconnect().await;
        match outcome {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}
