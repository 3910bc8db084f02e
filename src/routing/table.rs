//! The process-wide rule table.
//!
//! Built once from [`RoutingConfig`] before the listener starts, then shared
//! read-only (behind an `Arc`) by every connection task.

use thiserror::Error;
use url::Url;

use crate::config::RoutingConfig;
use crate::routing::rule::{ForwardingRule, PathRewrite};

/// Reasons a rule table cannot be built.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("rule #{index} has an empty prefix")]
    EmptyPrefix { index: usize },

    #[error("rule `{prefix}` has invalid target origin `{origin}`: {reason}")]
    InvalidOrigin {
        prefix: String,
        origin: String,
        reason: String,
    },

    #[error("rule `{prefix}` has invalid rewrite pattern `{pattern}`")]
    InvalidPattern {
        prefix: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Ordered, immutable set of forwarding rules.
#[derive(Debug, Clone)]
pub struct RuleTable {
    rules: Vec<ForwardingRule>,
}

impl RuleTable {
    /// Creates a table from already-built rules, keeping their order.
    ///
    /// Target origins are normalized (a trailing `/` is dropped).
    pub fn new(rules: Vec<ForwardingRule>) -> Result<Self, TableError> {
        let mut checked = Vec::with_capacity(rules.len());

        for (index, mut rule) in rules.into_iter().enumerate() {
            if rule.prefix.is_empty() {
                return Err(TableError::EmptyPrefix { index });
            }

            rule.target_origin = normalize_origin(&rule.target_origin).map_err(|reason| {
                TableError::InvalidOrigin {
                    prefix: rule.prefix.clone(),
                    origin: rule.target_origin.clone(),
                    reason,
                }
            })?;

            tracing::debug!(
                prefix = %rule.prefix,
                upstream = %rule.target_origin,
                change_origin = rule.change_origin,
                rewrites = rule.path_rewrite.len(),
                "Registered forwarding rule"
            );

            checked.push(rule);
        }

        tracing::info!(rules = checked.len(), "Rule table built");

        Ok(Self { rules: checked })
    }

    /// Builds the table from configuration.
    ///
    /// Rules without their own `target` use `config.upstream_origin`, so
    /// changing the upstream origin moves every such rule at once.
    pub fn from_config(config: &RoutingConfig) -> Result<Self, TableError> {
        let mut rules = Vec::with_capacity(config.rules.len());

        for rule_cfg in &config.rules {
            let origin = rule_cfg
                .target
                .as_deref()
                .unwrap_or(&config.upstream_origin);

            let mut rule = ForwardingRule::new(rule_cfg.prefix.clone(), origin)
                .with_change_origin(rule_cfg.change_origin);

            for rewrite in &rule_cfg.path_rewrite {
                let step = PathRewrite::new(&rewrite.pattern, rewrite.replacement.clone())
                    .map_err(|source| TableError::InvalidPattern {
                        prefix: rule_cfg.prefix.clone(),
                        pattern: rewrite.pattern.clone(),
                        source,
                    })?;
                rule = rule.with_rewrite(step);
            }

            rules.push(rule);
        }

        Self::new(rules)
    }

    pub fn rules(&self) -> &[ForwardingRule] {
        &self.rules
    }

    pub fn iter(&self) -> impl Iterator<Item = &ForwardingRule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// First rule whose prefix matches `path`, in declaration order.
    pub fn first_match(&self, path: &str) -> Option<&ForwardingRule> {
        self.rules.iter().find(|rule| rule.matches(path))
    }
}

/// Accepts `scheme://host[:port]` with an optional trailing slash.
fn normalize_origin(origin: &str) -> Result<String, String> {
    let url = Url::parse(origin).map_err(|e| e.to_string())?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("unsupported scheme `{}`", url.scheme()));
    }
    if url.host_str().is_none() {
        return Err("missing host".to_string());
    }
    if url.path() != "/" || url.query().is_some() || url.fragment().is_some() {
        return Err("origin must not carry a path, query or fragment".to_string());
    }

    Ok(origin.trim_end_matches('/').to_string())
}
