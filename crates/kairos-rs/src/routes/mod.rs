//! HTTP route handlers and endpoint definitions for the kairos-rs gateway.
//!
//! - [`health`] - liveness/readiness endpoints for the gateway process
//!   itself (distinct from upstream backend health, see
//!   [`crate::services::health`])
//! - [`http`] - the catch-all proxy route wired to the request pipeline
//! - [`config_reload`] - manual hot-reload trigger and status endpoints

pub mod config_reload;
pub mod health;
pub mod http;
