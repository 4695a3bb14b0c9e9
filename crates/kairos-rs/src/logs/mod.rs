//! Logging setup for the gateway.
//!
//! - [`logger`] - configures `env_logger` with the gateway's timestamped,
//!   colorized output format

pub mod logger;
