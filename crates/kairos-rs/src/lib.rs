//! Decision fabric for the Kairos API gateway.
//!
//! This crate implements the five subsystems that decide which backend
//! serves which request, and when a backend must be avoided: load
//! balancing, rate limiting, circuit breaking, health checking, and
//! routing (with hot reload). The raw byte-forwarding and HTTP framing
//! sit in [`services::http`] and the `kairos-gateway` binary; everything
//! else in this crate is the admission/selection pipeline itself.

pub mod config;
pub mod logs;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;
