//! Data models and domain types for the kairos-rs API gateway.
//!
//! This module contains the core data structures used throughout the
//! gateway: route configuration, backend definitions, application settings
//! and gateway error types.
//!
//! # Module Organization
//!
//! - [`error`] - Gateway-specific error types with HTTP response mapping
//! - [`router`] - Route and backend configuration
//! - [`settings`] - Application configuration and settings management
//!
//! # Examples
//!
//! ```rust
//! use kairos_rs::models::router::{RouteConfig, Backend};
//!
//! let route = RouteConfig {
//!     path: "/api/users".to_string(),
//!     headers: Default::default(),
//!     backends: vec![Backend {
//!         id: "http://backend-1:8080".to_string(),
//!         weight: 1,
//!     }],
//!     strategy: Default::default(),
//! };
//!
//! route.validate().expect("invalid route configuration");
//! ```

pub mod error;
pub mod router;
pub mod settings;
