// src/config.rs

use crate::error::ForwardOidcError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

const DEFAULT_KEY_PATH: &str = "/data/oidc-keys";
const DEFAULT_CODE_TTL_SECONDS: u64 = 60;
const DEFAULT_SESSION_TIMEOUT_SECONDS: u64 = 5;
const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

fn default_key_path() -> PathBuf {
    PathBuf::from(DEFAULT_KEY_PATH)
}

fn default_code_ttl_seconds() -> u64 {
    DEFAULT_CODE_TTL_SECONDS
}

fn default_session_timeout_seconds() -> u64 {
    DEFAULT_SESSION_TIMEOUT_SECONDS
}

fn default_listen_addr() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

/// A registered OAuth2 client as it appears in the configuration file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ClientConfig {
    pub id: String,
    pub secret: String,
    /// Redirect URIs accepted for this client. Matched by exact string equality.
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

/// Settings for the OIDC provider (the `oidc` section of the configuration file).
///
/// Construct it through [`AppConfig::load`], [`ProviderConfig::validated`] or the
/// [`ConfigBuilder`]; all three normalise the issuer and check every URL.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// The issuer placed in `iss` and used as the base of every advertised endpoint.
    pub issuer_url: String,
    /// Public login page the browser is sent to when no session exists.
    pub login_url: String,
    /// Forward-auth endpoint that answers "who is this request authenticated as".
    pub verify_url: String,
    /// Directory holding `private.pem` and `public.pem`.
    #[serde(default = "default_key_path")]
    pub key_path: PathBuf,
    /// Lifetime of an authorization code.
    #[serde(default = "default_code_ttl_seconds")]
    pub code_ttl_seconds: u64,
    /// Client-side timeout for the forward-auth round-trip.
    #[serde(default = "default_session_timeout_seconds")]
    pub session_timeout_seconds: u64,
    /// When set, expired and never-redeemed codes are swept on this interval.
    #[serde(default)]
    pub code_sweep_interval_seconds: Option<u64>,
    #[serde(default)]
    pub clients: Vec<ClientConfig>,
}

impl ProviderConfig {
    /// Normalises and checks the configuration.
    ///
    /// The trailing `/` of the issuer is dropped, and the issuer, login URL,
    /// verification URL and every client redirect URI must be absolute URLs.
    pub fn validated(mut self) -> Result<Self, ForwardOidcError> {
        self.issuer_url = self.issuer_url.trim_end_matches('/').to_string();
        if self.issuer_url.is_empty() {
            return Err(ForwardOidcError::MissingConfiguration("issuer_url".to_string()));
        }
        let issuer = parse_absolute("issuer_url", &self.issuer_url)?;
        if issuer.query().is_some() || issuer.fragment().is_some() {
            return Err(ForwardOidcError::InvalidConfiguration(
                "issuer_url must not carry a query or fragment".to_string(),
            ));
        }

        if self.login_url.is_empty() {
            return Err(ForwardOidcError::MissingConfiguration("login_url".to_string()));
        }
        parse_absolute("login_url", &self.login_url)?;

        if self.verify_url.is_empty() {
            return Err(ForwardOidcError::MissingConfiguration("verify_url".to_string()));
        }
        parse_absolute("verify_url", &self.verify_url)?;

        if self.code_ttl_seconds == 0 {
            return Err(ForwardOidcError::InvalidConfiguration(
                "code_ttl_seconds must be greater than zero".to_string(),
            ));
        }
        if self.code_sweep_interval_seconds == Some(0) {
            return Err(ForwardOidcError::InvalidConfiguration(
                "code_sweep_interval_seconds must be greater than zero".to_string(),
            ));
        }

        for client in &self.clients {
            if client.id.is_empty() {
                return Err(ForwardOidcError::InvalidConfiguration(
                    "a client is configured with an empty id".to_string(),
                ));
            }
            for uri in &client.redirect_uris {
                parse_absolute(&format!("redirect_uris of client '{}'", client.id), uri)?;
            }
        }

        Ok(self)
    }

    /// The issuer URL, without a trailing slash.
    pub fn issuer(&self) -> &str {
        &self.issuer_url
    }

    /// Path component of the issuer (e.g. `/oidc`), empty when the issuer is a bare origin.
    /// The protocol endpoints are served under this path.
    pub fn mount_path(&self) -> String {
        Url::parse(&self.issuer_url)
            .map(|u| u.path().trim_end_matches('/').to_string())
            .unwrap_or_default()
    }

    /// The issuer with its mount path trimmed off, e.g. `https://auth.example.com`.
    pub fn public_origin(&self) -> String {
        let mount = self.mount_path();
        if let Some(origin) = self.issuer_url.strip_suffix(mount.as_str()) {
            return origin.to_string();
        }
        Url::parse(&self.issuer_url)
            .map(|u| u.origin().ascii_serialization())
            .unwrap_or_else(|_| self.issuer_url.clone())
    }

    pub fn code_ttl(&self) -> Duration {
        Duration::from_secs(self.code_ttl_seconds)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_seconds)
    }

    pub fn code_sweep_interval(&self) -> Option<Duration> {
        self.code_sweep_interval_seconds.map(Duration::from_secs)
    }
}

fn parse_absolute(field: &str, value: &str) -> Result<Url, ForwardOidcError> {
    Url::parse(value).map_err(|e| ForwardOidcError::InvalidUrl(format!("{field}: '{value}': {e}")))
}

/// Logging section of the configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Default log level, overridden by `RUST_LOG`.
    pub level: Option<String>,
}

/// Top-level configuration file for the `forward-oidc` binary.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default)]
    pub logging: Option<LoggingConfig>,
    pub oidc: ProviderConfig,
}

impl AppConfig {
    /// Reads and validates a YAML configuration file.
    pub fn load(path: &Path) -> Result<Self, ForwardOidcError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ForwardOidcError::InvalidConfiguration(format!(
                "failed to read config file {:?}: {}",
                path, e
            ))
        })?;
        Self::from_yaml(&raw)
    }

    /// Parses and validates a YAML configuration document.
    pub fn from_yaml(raw: &str) -> Result<Self, ForwardOidcError> {
        let mut config: AppConfig = serde_yaml::from_str(raw)?;
        config.oidc = config.oidc.validated()?;
        Ok(config)
    }

    /// The configured log level, defaulting to `info`.
    pub fn log_level(&self) -> &str {
        self.logging
            .as_ref()
            .and_then(|l| l.level.as_deref())
            .unwrap_or("info")
    }
}

/// A builder for creating a [`ProviderConfig`] instance.
///
/// Mostly useful when embedding the provider or in tests, where a YAML file
/// would be noise.
#[derive(Default)]
pub struct ConfigBuilder {
    issuer_url: Option<String>,
    login_url: Option<String>,
    verify_url: Option<String>,
    key_path: Option<PathBuf>,
    code_ttl: Option<Duration>,
    session_timeout: Option<Duration>,
    code_sweep_interval: Option<Duration>,
    clients: Vec<ClientConfig>,
}

impl ConfigBuilder {
    /// Creates a new `ConfigBuilder`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the issuer URL, e.g. `https://auth.example.com/oidc`. This is a required field.
    pub fn issuer_url(mut self, url: &str) -> Self {
        self.issuer_url = Some(url.to_string());
        self
    }

    /// Sets the login page URL. This is a required field.
    pub fn login_url(mut self, url: &str) -> Self {
        self.login_url = Some(url.to_string());
        self
    }

    /// Sets the forward-auth verification URL. This is a required field.
    pub fn verify_url(mut self, url: &str) -> Self {
        self.verify_url = Some(url.to_string());
        self
    }

    /// Sets the key directory. Defaults to `/data/oidc-keys`.
    pub fn key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_path = Some(path.into());
        self
    }

    /// Sets the authorization code lifetime. Defaults to 60 seconds.
    pub fn code_ttl(mut self, ttl: Duration) -> Self {
        self.code_ttl = Some(ttl);
        self
    }

    /// Sets the forward-auth timeout. Defaults to 5 seconds.
    pub fn session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = Some(timeout);
        self
    }

    /// Enables the periodic sweep of expired codes.
    pub fn code_sweep_interval(mut self, interval: Duration) -> Self {
        self.code_sweep_interval = Some(interval);
        self
    }

    /// Registers a client.
    pub fn client(mut self, id: &str, secret: &str, redirect_uris: &[&str]) -> Self {
        self.clients.push(ClientConfig {
            id: id.to_string(),
            secret: secret.to_string(),
            redirect_uris: redirect_uris.iter().map(|u| u.to_string()).collect(),
        });
        self
    }

    /// Consumes the builder and returns a validated `ProviderConfig`.
    ///
    /// # Errors
    ///
    /// Returns an error if a required field is missing or a URL is invalid.
    pub fn build(self) -> Result<ProviderConfig, ForwardOidcError> {
        let issuer_url = self
            .issuer_url
            .ok_or(ForwardOidcError::MissingConfiguration("issuer_url".to_string()))?;
        let login_url = self
            .login_url
            .ok_or(ForwardOidcError::MissingConfiguration("login_url".to_string()))?;
        let verify_url = self
            .verify_url
            .ok_or(ForwardOidcError::MissingConfiguration("verify_url".to_string()))?;

        ProviderConfig {
            issuer_url,
            login_url,
            verify_url,
            key_path: self.key_path.unwrap_or_else(default_key_path),
            code_ttl_seconds: self
                .code_ttl
                .map(|d| d.as_secs())
                .unwrap_or(DEFAULT_CODE_TTL_SECONDS),
            session_timeout_seconds: self
                .session_timeout
                .map(|d| d.as_secs())
                .unwrap_or(DEFAULT_SESSION_TIMEOUT_SECONDS),
            code_sweep_interval_seconds: self.code_sweep_interval.map(|d| d.as_secs()),
            clients: self.clients,
        }
        .validated()
    }
}
