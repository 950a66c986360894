// src/session.rs

use crate::error::ForwardOidcError;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, COOKIE};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

/// Response header carrying the authenticated user id.
pub const REMOTE_USER_HEADER: &str = "Remote-User";
/// Optional response header carrying the user's email address.
pub const REMOTE_EMAIL_HEADER: &str = "Remote-Email";
/// Optional response header carrying the user's display name.
pub const REMOTE_NAME_HEADER: &str = "Remote-Name";

const FORWARDED_HOST_HEADER: &str = "X-Forwarded-Host";
const FORWARDED_URI_HEADER: &str = "X-Forwarded-Uri";

/// The user a browser session belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub email: String,
    pub name: String,
}

/// What the session check gets to see of the inbound browser request.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionRequest<'a> {
    /// The raw `Cookie` header.
    pub cookies: Option<&'a str>,
    /// The inbound `Host` header.
    pub host: Option<&'a str>,
    /// The inbound request path.
    pub path: &'a str,
}

/// Answers "who is this request authenticated as".
///
/// The provider never keeps session state of its own; every authorize request
/// goes through this check.
#[async_trait]
pub trait SessionBridge: Send + Sync {
    /// Returns the identity behind the request, or `None` when it is not authenticated.
    async fn verify(&self, request: SessionRequest<'_>) -> Option<Identity>;
}

/// Session check against an external forward-auth endpoint.
///
/// A `200` response with a non-empty `Remote-User` header means authenticated;
/// any other status, a missing header, a transport error or a timeout means not.
/// Nothing is cached and nothing is retried.
#[derive(Debug, Clone)]
pub struct ForwardAuthBridge {
    http_client: reqwest::Client,
    verify_url: Url,
}

impl ForwardAuthBridge {
    /// Creates a bridge to `verify_url` whose round-trips are bounded by `timeout`.
    pub fn new(verify_url: &str, timeout: Duration) -> Result<Self, ForwardOidcError> {
        let verify_url = Url::parse(verify_url).map_err(|e| ForwardOidcError::InvalidUrl(e.to_string()))?;
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { http_client, verify_url })
    }

    async fn round_trip(&self, request: SessionRequest<'_>) -> Result<reqwest::Response, ForwardOidcError> {
        let mut call = self
            .http_client
            .get(self.verify_url.clone())
            .header(FORWARDED_URI_HEADER, request.path);
        if let Some(cookies) = request.cookies {
            call = call.header(COOKIE, cookies);
        }
        if let Some(host) = request.host {
            call = call.header(FORWARDED_HOST_HEADER, host);
        }
        Ok(call.send().await?)
    }
}

#[async_trait]
impl SessionBridge for ForwardAuthBridge {
    #[instrument(skip(self, request), fields(path = %request.path))]
    async fn verify(&self, request: SessionRequest<'_>) -> Option<Identity> {
        let response = match self.round_trip(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Session verification request failed: {}", e);
                return None;
            }
        };

        if response.status() != StatusCode::OK {
            debug!(status = %response.status(), "Session verification rejected the request.");
            return None;
        }

        let identity = identity_from_headers(response.headers());
        if identity.is_none() {
            warn!("Session verification returned 200 without a {} header.", REMOTE_USER_HEADER);
        }
        identity
    }
}

fn identity_from_headers(headers: &HeaderMap) -> Option<Identity> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };
    let user_id = header(REMOTE_USER_HEADER);
    if user_id.is_empty() {
        return None;
    }
    Some(Identity {
        user_id,
        email: header(REMOTE_EMAIL_HEADER),
        name: header(REMOTE_NAME_HEADER),
    })
}
