// src/server/mod.rs

//! HTTP surface of the provider.
//!
//! Every endpoint is served under the issuer's path, so an issuer of
//! `https://auth.example.com/oidc` yields `/oidc/authorize`, `/oidc/token`, etc.

mod error;
pub mod handlers;

pub use error::ProtocolError;

use crate::provider::Provider;
use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Builds the router for the five protocol endpoints.
pub fn create_router(provider: Arc<Provider>) -> Router {
    let mount = provider.config().mount_path();

    let routes = Router::new()
        .route("/.well-known/openid-configuration", get(handlers::discovery))
        .route("/jwks", get(handlers::jwks))
        .route("/authorize", get(handlers::authorize))
        .route("/token", post(handlers::token))
        .route("/userinfo", get(handlers::userinfo).post(handlers::userinfo))
        .with_state(provider);

    let router = if mount.is_empty() {
        routes
    } else {
        Router::new().nest(&mount, routes)
    };
    router.layer(TraceLayer::new_for_http())
}

/// Serves `router` on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, router: Router, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "OIDC provider listening.");
    }
    axum::serve(listener, router).with_graceful_shutdown(shutdown).await
}
