//! Prefix rules and path rewrites.

use regex::Regex;

/// A single find-and-replace step applied to a matched path.
///
/// The pattern is a regular expression; only its first match is replaced.
/// Replacement strings may reference capture groups (`$1`, `${name}`).
#[derive(Debug, Clone)]
pub struct PathRewrite {
    pattern: Regex,
    replacement: String,
}

impl PathRewrite {
    /// Compiles a rewrite step.
    ///
    /// # Example
    ///
    /// ```
    /// # use devgate::routing::PathRewrite;
    /// let strip = PathRewrite::new("^/api", "").unwrap();
    /// assert_eq!(strip.apply("/api/users"), "/users");
    /// ```
    pub fn new(pattern: &str, replacement: impl Into<String>) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            replacement: replacement.into(),
        })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn replacement(&self) -> &str {
        &self.replacement
    }

    /// Replaces the first match of the pattern in `path`.
    pub fn apply(&self, path: &str) -> String {
        self.pattern
            .replace(path, self.replacement.as_str())
            .into_owned()
    }
}

/// Forwards every path starting with `prefix` to `target_origin`.
#[derive(Debug, Clone)]
pub struct ForwardingRule {
    /// Leading substring matched against the request path (e.g. "/api")
    pub prefix: String,

    /// Absolute origin the request is sent to (e.g. "http://localhost:5001")
    pub target_origin: String,

    /// Whether the transport rewrites the Host header to the target origin
    pub change_origin: bool,

    /// Rewrite steps, applied in order
    pub path_rewrite: Vec<PathRewrite>,
}

impl ForwardingRule {
    pub fn new(prefix: impl Into<String>, target_origin: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            target_origin: target_origin.into(),
            change_origin: true,
            path_rewrite: Vec::new(),
        }
    }

    pub fn with_change_origin(mut self, change_origin: bool) -> Self {
        self.change_origin = change_origin;
        self
    }

    pub fn with_rewrite(mut self, rewrite: PathRewrite) -> Self {
        self.path_rewrite.push(rewrite);
        self
    }

    /// Plain prefix test, case-sensitive. "/api" also matches "/apidocs".
    pub fn matches(&self, path: &str) -> bool {
        path.starts_with(&self.prefix)
    }

    /// Runs every rewrite step over `path`, each on the previous step's output.
    pub fn rewrite(&self, path: &str) -> String {
        self.path_rewrite
            .iter()
            .fold(path.to_string(), |current, step| step.apply(&current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrite_replaces_only_first_match() {
        let step = PathRewrite::new("/v1", "/v2").unwrap();
        assert_eq!(step.apply("/v1/items/v1"), "/v2/items/v1");
    }

    #[test]
    fn rewrite_steps_chain() {
        let rule = ForwardingRule::new("/api", "http://localhost:5001")
            .with_rewrite(PathRewrite::new("^/api", "/backend").unwrap())
            .with_rewrite(PathRewrite::new("^/backend/v1", "/backend/v2").unwrap());

        assert_eq!(rule.rewrite("/api/v1/users"), "/backend/v2/users");
    }

    #[test]
    fn rewrite_with_capture_group() {
        let step = PathRewrite::new(r"^/user/(\d+)", "/users/$1/profile").unwrap();
        assert_eq!(step.apply("/user/42"), "/users/42/profile");
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        assert!(PathRewrite::new("^/api(", "/api").is_err());
    }

    #[test]
    fn prefix_match_is_case_sensitive() {
        let rule = ForwardingRule::new("/api", "http://localhost:5001");
        assert!(rule.matches("/api"));
        assert!(rule.matches("/api/users"));
        assert!(!rule.matches("/API/users"));
        assert!(!rule.matches("/v1/api"));
    }
}
