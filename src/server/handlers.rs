// src/server/handlers.rs

use super::error::ProtocolError;
use crate::model::{JsonWebKeySet, OidcDiscoveryDocument, UserInfoResponse};
use crate::provider::Provider;
use crate::session::SessionRequest;
use crate::store::PendingAuthorization;
use axum::extract::rejection::{FormRejection, QueryRejection};
use axum::extract::{Form, OriginalUri, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use std::sync::Arc;
use url::{form_urlencoded, Url};

/// `GET /.well-known/openid-configuration`
pub async fn discovery(State(provider): State<Arc<Provider>>) -> Json<OidcDiscoveryDocument> {
    Json(OidcDiscoveryDocument::for_issuer(provider.config.issuer()))
}

/// `GET /jwks`
pub async fn jwks(State(provider): State<Arc<Provider>>) -> Json<JsonWebKeySet> {
    Json(provider.keys.jwks())
}

// ─── Authorization Endpoint ──────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct AuthorizeQuery {
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub response_type: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub nonce: Option<String>,
}

/// `GET /authorize`
///
/// Parameter errors are answered here as JSON; they are never redirected to the
/// client. Once the request is well formed the session bridge decides between
/// the login page and a fresh authorization code.
pub async fn authorize(
    State(provider): State<Arc<Provider>>,
    OriginalUri(original_uri): OriginalUri,
    headers: HeaderMap,
    query: Result<Query<AuthorizeQuery>, QueryRejection>,
) -> Result<Response, ProtocolError> {
    let Query(query) = query.map_err(|rejection| ProtocolError::invalid_request(rejection.body_text()))?;
    let (Some(client_id), Some(redirect_uri), Some(response_type), Some(scope)) = (
        present(&query.client_id),
        present(&query.redirect_uri),
        present(&query.response_type),
        present(&query.scope),
    ) else {
        return Err(ProtocolError::invalid_request(
            "client_id, redirect_uri, response_type and scope are required",
        ));
    };

    if response_type != "code" {
        return Err(ProtocolError::unsupported_response_type("only 'code' is supported"));
    }
    if !scope.split_whitespace().any(|s| s == "openid") {
        return Err(ProtocolError::invalid_scope("scope must include 'openid'"));
    }

    let Some(client) = provider.registry.find_client(client_id) else {
        tracing::warn!(client_id = %client_id, "Authorization requested by an unknown client.");
        return Err(ProtocolError::unknown_client("unknown client_id"));
    };
    if !client.validate_redirect_uri(redirect_uri) {
        tracing::warn!(client_id = %client_id, "Authorization requested with an unregistered redirect_uri.");
        return Err(ProtocolError::invalid_request("redirect_uri is not registered for this client"));
    }

    let session = SessionRequest {
        cookies: header_str(&headers, header::COOKIE),
        // HTTP/2 carries the host in the `:authority` pseudo-header instead.
        host: header_str(&headers, header::HOST).or_else(|| original_uri.authority().map(|a| a.as_str())),
        path: original_uri.path(),
    };
    let Some(identity) = provider.bridge.verify(session).await else {
        // Send the browser to log in, then back to this exact authorize URL.
        let path_and_query = original_uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| original_uri.path());
        let return_to = format!("{}{}", provider.config.public_origin(), path_and_query);

        let mut login = Url::parse(&provider.config.login_url)
            .map_err(|e| ProtocolError::server_error(format!("login_url is unusable: {e}")))?;
        login.query_pairs_mut().append_pair("redirect_uri", &return_to);

        tracing::debug!(client_id = %client_id, "No session; redirecting to the login page.");
        return Ok(found(login.as_str()));
    };

    let user_id = identity.user_id.clone();
    let code = provider.codes.store(PendingAuthorization {
        client_id: client_id.to_string(),
        redirect_uri: redirect_uri.to_string(),
        subject: identity,
        nonce: present(&query.nonce).map(str::to_string),
    });

    let mut params = form_urlencoded::Serializer::new(String::new());
    params.append_pair("code", &code);
    if let Some(state) = present(&query.state) {
        params.append_pair("state", state);
    }
    let target = append_query(redirect_uri, &params.finish());

    tracing::info!(client_id = %client_id, user = %user_id, "Issued authorization code.");
    Ok(found(&target))
}

// ─── Token Endpoint ──────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct TokenRequest {
    pub grant_type: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

/// `POST /token`
///
/// Exchanges an authorization code for an ID token and an access token.
/// The client is authenticated before the code is looked up, so a bad secret
/// never burns a valid code.
pub async fn token(
    State(provider): State<Arc<Provider>>,
    headers: HeaderMap,
    form: Result<Form<TokenRequest>, FormRejection>,
) -> Result<Response, ProtocolError> {
    let Form(form) = form.map_err(|rejection| ProtocolError::invalid_request(rejection.body_text()))?;
    if present(&form.grant_type) != Some("authorization_code") {
        return Err(ProtocolError::unsupported_grant_type(
            "only 'authorization_code' is supported",
        ));
    }

    let Some((client_id, client_secret)) = client_credentials(&form, &headers) else {
        return Err(ProtocolError::invalid_client("client authentication is required"));
    };
    if provider.registry.authenticate(&client_id, &client_secret).is_none() {
        tracing::warn!(client_id = %client_id, "Client authentication failed.");
        return Err(ProtocolError::invalid_client("client authentication failed"));
    }

    // The code is consumed here whatever the outcome of the checks below.
    let Some(grant) = present(&form.code).and_then(|code| provider.codes.retrieve(code)) else {
        return Err(ProtocolError::invalid_grant("authorization code is invalid or expired"));
    };
    if grant.client_id != client_id {
        tracing::warn!(client_id = %client_id, "Authorization code was issued to another client.");
        return Err(ProtocolError::invalid_grant("authorization code was issued to another client"));
    }
    if form.redirect_uri.as_deref().unwrap_or_default() != grant.redirect_uri {
        return Err(ProtocolError::invalid_grant("redirect_uri does not match the authorization request"));
    }

    let tokens = provider.generator.issue_tokens(&grant).map_err(|e| {
        tracing::error!("Token signing failed: {}", e);
        ProtocolError::server_error("token signing failed")
    })?;

    tracing::info!(client_id = %client_id, user = %grant.subject.user_id, "Issued tokens.");
    let mut response = Json(tokens).into_response();
    let response_headers = response.headers_mut();
    response_headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response_headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    Ok(response)
}

// ─── UserInfo Endpoint ───────────────────────────────────────────────────────

/// `GET /userinfo`
pub async fn userinfo(
    State(provider): State<Arc<Provider>>,
    headers: HeaderMap,
) -> Result<Json<UserInfoResponse>, ProtocolError> {
    let Some(token) = bearer_token(&headers) else {
        return Err(ProtocolError::invalid_token("a bearer token is required"));
    };

    let claims = provider.validator.validate(token).map_err(|e| {
        tracing::debug!("Rejected bearer token: {}", e);
        ProtocolError::invalid_token("the access token is invalid or expired")
    })?;

    Ok(Json(UserInfoResponse {
        sub: claims.sub,
        email: claims.email,
        name: claims.name,
        preferred_username: claims.preferred_username,
    }))
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// An absent and an empty parameter are the same thing.
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Appends `query` to the registered redirect URI without re-serialising it,
/// keeping any fragment last.
fn append_query(uri: &str, query: &str) -> String {
    let (base, fragment) = match uri.split_once('#') {
        Some((base, fragment)) => (base, Some(fragment)),
        None => (uri, None),
    };
    let separator = match base.find('?') {
        None => "?",
        Some(_) if base.ends_with('?') || base.ends_with('&') => "",
        Some(_) => "&",
    };
    let mut target = format!("{base}{separator}{query}");
    if let Some(fragment) = fragment {
        target.push('#');
        target.push_str(fragment);
    }
    target
}

fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

/// Client credentials from the form body, falling back to HTTP Basic.
fn client_credentials(form: &TokenRequest, headers: &HeaderMap) -> Option<(String, String)> {
    if let Some(client_id) = present(&form.client_id) {
        let secret = form.client_secret.clone().unwrap_or_default();
        return Some((client_id.to_string(), secret));
    }

    let (scheme, encoded) = header_str(headers, header::AUTHORIZATION)?.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (id, secret) = decoded.split_once(':')?;
    if id.is_empty() {
        return None;
    }
    Some((id.to_string(), secret.to_string()))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let (scheme, token) = header_str(headers, header::AUTHORIZATION)?.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
