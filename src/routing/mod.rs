//! Forwarding rule resolution.
//!
//! Decides, for an inbound request path, which upstream origin receives the
//! request and what path it is forwarded with.
//!
//! # Architecture
//!
//! - **`rule`**: a single prefix rule with its target origin, change-origin
//!   flag and ordered path rewrites
//! - **`table`**: the ordered, immutable set of rules built once at start-up
//! - **`resolver`**: the pure lookup from a path to a [`Resolution`]
//!
//! # Resolution
//!
//! ```text
//!   path ──► validate ──► first rule whose prefix matches ──► rewrites ──► Matched
//!                  │                    │
//!                  ▼                    └─ none ──► NoMatch
//!             InvalidPath
//! ```
//!
//! Rules are checked in declaration order and the first match wins. Rewrites
//! run once, in order, and never trigger another lookup.
//!
//! # Example
//!
//! ```
//! use devgate::config::RoutingConfig;
//! use devgate::routing::{Resolution, RuleTable};
//!
//! let table = RuleTable::from_config(&RoutingConfig::default()).unwrap();
//!
//! match table.resolve("/api/users/42").unwrap() {
//!     Resolution::Matched(route) => {
//!         assert_eq!(route.target_origin(), "http://localhost:5001");
//!         assert_eq!(route.rewritten_path(), "/api/users/42");
//!     }
//!     Resolution::NoMatch => unreachable!(),
//! }
//! ```

pub mod resolver;
pub mod rule;
pub mod table;

pub use resolver::{resolve, ResolveError, Resolution, ResolvedRoute};
pub use rule::{ForwardingRule, PathRewrite};
pub use table::{RuleTable, TableError};
