//! Configuration loading, validation and hot reload.
//!
//! - [`settings`] - reads and parses the configuration file
//! - [`validation`] - cross-route checks beyond basic structural validity
//! - [`hot_reload`] - polls the file for changes and republishes the
//!   route table without downtime

pub mod hot_reload;
pub mod settings;
pub mod validation;
