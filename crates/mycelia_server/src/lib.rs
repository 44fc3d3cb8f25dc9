//! Mycelia Server
//!
//! Exposes the capability gate over HTTP (`/api/resource/{code}`) and as a
//! JSON-RPC tool server (`/mcp`). Both surfaces authenticate a bearer token,
//! bind the resulting principal to the gate and forward the call unchanged.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod rpc;

#[cfg(test)]
pub(crate) mod fixtures;

pub use api::{AppState, router};
pub use auth::{AuthError, Authenticator, StaticCredentials};
pub use config::ServerConfig;
pub use error::ApiError;
