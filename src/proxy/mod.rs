//! Upstream transport
//!
//! Consumes a [`ResolvedRoute`](crate::routing::ResolvedRoute): connects to
//! its target origin, sends the request with the rewritten path and relays
//! the response.

pub mod upstream;

pub use upstream::ProxyHandler;
