//! devgate - development-server forwarding proxy
//!
//! Forwards selected path prefixes to a backend origin and serves the
//! built single-page app for everything else.

pub mod config;
pub mod http;
pub mod proxy;
pub mod routing;
pub mod server;
