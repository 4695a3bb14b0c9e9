//! Supporting utilities for the decision fabric.
//!
//! - [`path`] - joins a backend origin with a request path
//! - [`route_matcher`] - compiles route configuration into a matchable,
//!   specificity-sorted [`route_matcher::RouteTable`]

pub mod path;
pub mod route_matcher;
