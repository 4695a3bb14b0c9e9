//! Cross-cutting request middleware for the kairos-rs gateway.
//!
//! # Module Organization
//!
//! - [`rate_limit`] - Token-bucket and sliding-window rate limiting,
//!   applied per client before a request reaches the router.

pub mod rate_limit;
