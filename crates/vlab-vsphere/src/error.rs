//! Error types for the vSphere crate.

/// Categorised error kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VmwareErrorKind {
    /// vSphere endpoint unreachable
    ConnectionError,
    /// Authentication rejected (401)
    AuthenticationError,
    /// TLS handshake / certificate verification failed
    TlsHandshake,
    /// `connect` called on a session that already holds a connection
    AlreadyConnected,
    /// Operation attempted without an active session
    NotConnected,
    /// Resource not found (404)
    NotFound,
    /// Permission denied (403)
    AccessDenied,
    /// HTTP / API error with status code
    ApiError(u16),
    /// Remote task reported failure
    TaskFailed,
    /// Deadline elapsed while the remote task was still running
    TaskTimeout,
    /// JSON / YAML parse or deserialization error
    ParseError,
    /// Invalid or unreadable configuration
    ConfigError,
    /// Generic
    Other,
}

/// Crate error type carrying a kind + human-readable message.
#[derive(Debug, Clone, thiserror::Error)]
#[error("[{kind:?}] {message}")]
pub struct VmwareError {
    pub kind: VmwareErrorKind,
    pub message: String,
}

impl VmwareError {
    pub fn new(kind: VmwareErrorKind, msg: impl Into<String>) -> Self {
        Self { kind, message: msg.into() }
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::new(VmwareErrorKind::ConnectionError, msg)
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        Self::new(VmwareErrorKind::AuthenticationError, msg)
    }

    pub fn tls(msg: impl Into<String>) -> Self {
        Self::new(VmwareErrorKind::TlsHandshake, msg)
    }

    pub fn already_connected(msg: impl Into<String>) -> Self {
        Self::new(VmwareErrorKind::AlreadyConnected, msg)
    }

    pub fn not_connected(msg: impl Into<String>) -> Self {
        Self::new(VmwareErrorKind::NotConnected, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(VmwareErrorKind::NotFound, msg)
    }

    pub fn api(status: u16, msg: impl Into<String>) -> Self {
        Self::new(VmwareErrorKind::ApiError(status), msg)
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::new(VmwareErrorKind::ParseError, msg)
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::new(VmwareErrorKind::ConfigError, msg)
    }

    /// The message is the remote reason, unmodified.
    pub fn task_failed(reason: impl Into<String>) -> Self {
        Self::new(VmwareErrorKind::TaskFailed, reason)
    }

    pub fn task_timeout(msg: impl Into<String>) -> Self {
        Self::new(VmwareErrorKind::TaskTimeout, msg)
    }

    /// Auth rejected, endpoint unreachable or handshake failure.
    pub fn is_connect_error(&self) -> bool {
        matches!(
            self.kind,
            VmwareErrorKind::ConnectionError
                | VmwareErrorKind::AuthenticationError
                | VmwareErrorKind::TlsHandshake
        )
    }
}

impl From<reqwest::Error> for VmwareError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::connection(format!("HTTP timeout: {e}"))
        } else if caused_by_tls(&e) {
            Self::tls(format!("TLS handshake failed: {e}"))
        } else if e.is_connect() {
            Self::connection(format!("Connection failed: {e}"))
        } else {
            Self::new(VmwareErrorKind::Other, format!("HTTP error: {e}"))
        }
    }
}

impl From<serde_json::Error> for VmwareError {
    fn from(e: serde_json::Error) -> Self {
        Self::parse(format!("JSON parse error: {e}"))
    }
}

impl From<serde_yaml::Error> for VmwareError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::parse(format!("YAML parse error: {e}"))
    }
}

impl From<std::io::Error> for VmwareError {
    fn from(e: std::io::Error) -> Self {
        Self::config(format!("I/O error: {e}"))
    }
}

/// Walk the source chain looking for a rustls error. `io::Error` hides its
/// payload from `source()`, so it is unwrapped through `get_ref()`.
fn caused_by_tls(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = current {
        if e.is::<rustls::Error>() {
            return true;
        }
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if let Some(inner) = io.get_ref() {
                if caused_by_tls(inner) {
                    return true;
                }
            }
        }
        current = e.source();
    }
    false
}

/// Convenience alias.
pub type VmwareResult<T> = Result<T, VmwareError>;
