//! Path → upstream resolution.

use thiserror::Error;

use crate::routing::table::RuleTable;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// Path is empty or does not start with `/`
    #[error("invalid request path `{0}`")]
    InvalidPath(String),
}

/// Where a matched request goes. Built per request and never modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoute {
    original_path: String,
    target_origin: String,
    rewritten_path: String,
    change_origin: bool,
}

impl ResolvedRoute {
    pub fn original_path(&self) -> &str {
        &self.original_path
    }

    pub fn target_origin(&self) -> &str {
        &self.target_origin
    }

    pub fn rewritten_path(&self) -> &str {
        &self.rewritten_path
    }

    /// Whether the transport should send `Host` matching the target origin.
    pub fn change_origin(&self) -> bool {
        self.change_origin
    }
}

/// Outcome of a lookup. `NoMatch` is a normal result: the caller handles
/// the request itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Matched(ResolvedRoute),
    NoMatch,
}

impl Resolution {
    pub fn is_match(&self) -> bool {
        matches!(self, Resolution::Matched(_))
    }

    pub fn route(&self) -> Option<&ResolvedRoute> {
        match self {
            Resolution::Matched(route) => Some(route),
            Resolution::NoMatch => None,
        }
    }
}

/// Resolves `path` against `table`.
///
/// The first rule (in declaration order) whose prefix matches is used and
/// its rewrites are applied once. The result depends only on the arguments.
pub fn resolve(path: &str, table: &RuleTable) -> Result<Resolution, ResolveError> {
    if !path.starts_with('/') {
        return Err(ResolveError::InvalidPath(path.to_string()));
    }

    let Some(rule) = table.first_match(path) else {
        tracing::trace!(path, "No forwarding rule matched");
        return Ok(Resolution::NoMatch);
    };

    let rewritten_path = rule.rewrite(path);

    tracing::trace!(
        path,
        prefix = %rule.prefix,
        upstream = %rule.target_origin,
        rewritten = %rewritten_path,
        "Forwarding rule matched"
    );

    Ok(Resolution::Matched(ResolvedRoute {
        original_path: path.to_string(),
        target_origin: rule.target_origin.clone(),
        rewritten_path,
        change_origin: rule.change_origin,
    }))
}

impl RuleTable {
    /// Same as [`resolve`] with this table.
    pub fn resolve(&self, path: &str) -> Result<Resolution, ResolveError> {
        resolve(path, self)
    }
}
