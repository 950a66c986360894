// src/lib.rs

pub mod clock;
pub mod config;
pub mod error;
pub mod generator;
pub mod model;
pub mod provider;
pub mod registry;
pub mod server;
pub mod session;
pub mod store;
pub mod validator;

/// The public prelude for the `forward-oidc` crate.
///
/// This module re-exports the most commonly used types for convenience.
pub mod prelude {
    pub use crate::config::{AppConfig, ConfigBuilder, ProviderConfig};
    pub use crate::error::ForwardOidcError;
    pub use crate::provider::Provider;
    pub use crate::server::create_router;
    pub use crate::session::{ForwardAuthBridge, Identity, SessionBridge, SessionRequest};
}
