//! Tenantgate gateway library
//!
//! Composes the isolation guards, scope enforcement and request tracing
//! behind an axum router. Exposed for integration testing and embedding.

pub mod auth;
pub mod backend;
pub mod config;
pub mod errors;
pub mod gateway;
pub mod server;

pub use auth::{Authenticator, Principal, StaticKeyAuthenticator};
pub use config::{ConfigError, GatewayConfig};
pub use errors::HttpError;
pub use gateway::{Gateway, QueryOutcome, RequestContext};
pub use server::{router, AppState};
