//! Listener and request dispatch.

pub mod gateway;
pub mod listener;
pub mod static_files;

pub use gateway::Gateway;
