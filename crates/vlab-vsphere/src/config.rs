//! Connection configuration for a vCenter / ESXi endpoint.
//!
//! Loaded from JSON or YAML. The password is held as a [`SecretString`] and
//! is never serialized back out; [`VsphereConfigSafe`] is the displayable view.

use crate::error::{VmwareError, VmwareResult};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Env var overriding the password from the config file.
pub const PASSWORD_ENV: &str = "VLAB_VSPHERE_PASSWORD";

/// Whether the endpoint's certificate identity is checked.
///
/// Traffic is HTTPS either way; `SkipPeerVerification` only disables the
/// peer identity check (self-signed lab appliances).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TlsVerification {
    Verify,
    SkipPeerVerification,
}

impl TlsVerification {
    pub fn accepts_invalid_certs(self) -> bool {
        matches!(self, Self::SkipPeerVerification)
    }
}

/// Top-level configuration for connecting to a vCenter / ESXi host.
#[derive(Debug, Clone, Deserialize)]
pub struct VsphereConfig {
    /// vCenter or ESXi hostname / IP (e.g. "vcenter.lab.local")
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// e.g. "administrator@vsphere.local"
    pub username: String,
    #[serde(default = "empty_secret")]
    pub password: SecretString,
    /// Required, no serde default.
    pub tls: TlsVerification,
    /// Per-request HTTP timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_port() -> u16 {
    443
}

fn default_timeout() -> u64 {
    30
}

fn empty_secret() -> SecretString {
    SecretString::new(String::new())
}

impl VsphereConfig {
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        tls: TlsVerification,
    ) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            username: username.into(),
            password: SecretString::new(password.into()),
            tls,
            timeout_secs: default_timeout(),
        }
    }

    /// Load from a `.json`, `.yaml` or `.yml` file, then apply the
    /// password env override and validate.
    pub fn from_file(path: impl AsRef<Path>) -> VmwareResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            VmwareError::config(format!("Cannot read {}: {e}", path.display()))
        })?;

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        let mut config: VsphereConfig = match ext.as_deref() {
            Some("json") => serde_json::from_str(&text)?,
            Some("yaml") | Some("yml") => serde_yaml::from_str(&text)?,
            other => {
                return Err(VmwareError::config(format!(
                    "Unsupported config format {:?} for {}",
                    other.unwrap_or(""),
                    path.display()
                )))
            }
        };

        if let Ok(pw) = std::env::var(PASSWORD_ENV) {
            config.password = SecretString::new(pw);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> VmwareResult<()> {
        if self.host.trim().is_empty() {
            return Err(VmwareError::config("host must not be empty"));
        }
        if self.username.trim().is_empty() {
            return Err(VmwareError::config("username must not be empty"));
        }
        if self.port == 0 {
            return Err(VmwareError::config("port must be non-zero"));
        }
        self.base_url().map(|_| ())
    }

    /// `https://{host}:{port}`. The scheme is fixed: credentials only ever
    /// travel over TLS.
    pub fn base_url(&self) -> VmwareResult<Url> {
        Url::parse(&format!("https://{}:{}", self.host.trim(), self.port))
            .map_err(|e| VmwareError::config(format!("Invalid endpoint '{}': {e}", self.host)))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub(crate) fn password(&self) -> &str {
        self.password.expose_secret()
    }

    pub fn safe(&self) -> VsphereConfigSafe {
        VsphereConfigSafe {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            tls: self.tls,
        }
    }
}

/// Config without the password, safe to display or serialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VsphereConfigSafe {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub tls: TlsVerification,
}
