//! Resource pattern matching with specificity scoring.
//!
//! Patterns are written the way they appear as configuration keys:
//!
//! ```text
//! [/accounts/*/transfers:POST]
//!  └───────┬────────────┘ └┬┘
//!       path pattern     method (optional)
//! ```
//!
//! Path segments are compared one by one. A literal segment must match
//! exactly, `*` matches exactly one segment and `**` matches whatever is left
//! (including nothing). Each kind of segment adds a different amount to the
//! match's specificity so that the most precise rule wins.

use tracing::debug;

use crate::error::{AuthzError, AuthzResult};

/// Base score for a pattern that equals the path verbatim.
pub const EXACT_MATCH_BASE: u32 = 1000;

/// Score added per literal segment.
pub const LITERAL_SEGMENT: u32 = 10;

/// Score added per `*` segment.
pub const SINGLE_WILDCARD: u32 = 2;

/// Score added when `**` terminates the match.
pub const RECURSIVE_WILDCARD: u32 = 1;

/// Strip surrounding whitespace and one pair of enclosing brackets.
pub fn normalize_pattern(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(trimmed)
}

/// Match a path pattern against a request path.
///
/// Returns the specificity of the match, or `None` when the pattern does not
/// match. Pure: the same inputs always produce the same answer.
pub fn match_path(pattern: &str, path: &str) -> Option<u32> {
    if pattern == path {
        let len = u32::try_from(path.len()).unwrap_or(u32::MAX - EXACT_MATCH_BASE);
        return Some(EXACT_MATCH_BASE.saturating_add(len));
    }

    let mut pattern_segments = strip_root(pattern).split('/');
    let mut path_segments = strip_root(path).split('/');
    let mut specificity = 0;

    for expected in pattern_segments.by_ref() {
        if expected == "**" {
            return Some(specificity + RECURSIVE_WILDCARD);
        }
        let actual = path_segments.next()?;
        if expected == "*" {
            specificity += SINGLE_WILDCARD;
        } else if expected == actual {
            specificity += LITERAL_SEGMENT;
        } else {
            return None;
        }
    }

    // Trailing path segments with nothing left to match them.
    if path_segments.next().is_some() {
        return None;
    }
    Some(specificity)
}

/// Match a pattern carrying an optional `:METHOD` suffix.
///
/// A pattern without a method matches every method. Method comparison is
/// case-insensitive.
pub fn match_with_method(pattern: &str, method: &str, path: &str) -> Option<u32> {
    RulePattern::parse(pattern).matches(Some(method), path)
}

fn strip_root(s: &str) -> &str {
    s.strip_prefix('/').unwrap_or(s)
}

/// A parsed rule key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RulePattern {
    raw: String,
    path: String,
    method: Option<String>,
}

impl RulePattern {
    /// Parse a configuration key such as `[/orders/**:GET]`.
    pub fn parse(raw: &str) -> Self {
        let normalized = normalize_pattern(raw);
        let (path, method) = match normalized.rsplit_once(':') {
            Some((path, method)) if is_method_suffix(method) => {
                (path, Some(method.trim().to_ascii_uppercase()))
            }
            _ => (normalized, None),
        };

        Self {
            raw: raw.to_string(),
            path: path.to_string(),
            method,
        }
    }

    /// The key exactly as written in configuration.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The path part of the pattern.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The upper-cased method, if the pattern names one.
    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    /// Match against a request.
    ///
    /// `method` of `None` ignores any method on the pattern; coarse lookups
    /// use this.
    pub fn matches(&self, method: Option<&str>, path: &str) -> Option<u32> {
        if let (Some(wanted), Some(actual)) = (self.method.as_deref(), method) {
            if !wanted.eq_ignore_ascii_case(actual) {
                return None;
            }
        }
        match_path(&self.path, path)
    }
}

fn is_method_suffix(s: &str) -> bool {
    let s = s.trim();
    !s.is_empty() && !s.contains('/')
}

/// An immutable table of patterns and the values they map to.
///
/// Built once when configuration loads. Lookups take `&self` only, so a table
/// can be shared across any number of concurrent requests.
#[derive(Debug, Clone)]
pub struct RuleTable<T> {
    entries: Vec<(RulePattern, T)>,
}

impl<T> Default for RuleTable<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T> RuleTable<T> {
    /// Build a table from `(pattern key, value)` pairs.
    pub fn new<K, I>(entries: I) -> Self
    where
        K: AsRef<str>,
        I: IntoIterator<Item = (K, T)>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(key, value)| (RulePattern::parse(key.as_ref()), value))
                .collect(),
        }
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no rules.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find the single most specific rule for a request.
    ///
    /// Returns `Ok(None)` when nothing matches. When several rules share the
    /// highest score the table is misconfigured and an
    /// [`AuthzError::AmbiguousRule`] is returned instead of picking one.
    pub fn best_match(&self, method: Option<&str>, path: &str) -> AuthzResult<Option<(&RulePattern, &T)>> {
        let mut best: Option<(u32, &RulePattern, &T)> = None;
        let mut tied: Vec<&RulePattern> = Vec::new();

        for (pattern, value) in &self.entries {
            let Some(score) = pattern.matches(method, path) else {
                continue;
            };
            match best {
                Some((top, _, _)) if score < top => {}
                Some((top, _, _)) if score == top => tied.push(pattern),
                _ => {
                    best = Some((score, pattern, value));
                    tied.clear();
                }
            }
        }

        let Some((score, pattern, value)) = best else {
            debug!(path, "no rule matched");
            return Ok(None);
        };

        if !tied.is_empty() {
            let mut patterns = vec![pattern.raw().to_string()];
            patterns.extend(tied.iter().map(|p| p.raw().to_string()));
            return Err(AuthzError::AmbiguousRule {
                path: path.to_string(),
                patterns,
            });
        }

        debug!(path, pattern = pattern.raw(), specificity = score, "rule matched");
        Ok(Some((pattern, value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_pattern() {
        assert_eq!(normalize_pattern("[/health]"), "/health");
        assert_eq!(normalize_pattern("  [/a/b:POST] "), "/a/b:POST");
        assert_eq!(normalize_pattern("/plain"), "/plain");
        assert_eq!(normalize_pattern("[/unclosed"), "[/unclosed");
    }

    #[test]
    fn test_exact_match_scores_highest() {
        let score = match_path("/health", "/health").unwrap();
        assert_eq!(score, EXACT_MATCH_BASE + 7);
    }

    #[test]
    fn test_single_wildcard_matches_one_segment() {
        assert_eq!(match_path("/users/*", "/users/42"), Some(LITERAL_SEGMENT + SINGLE_WILDCARD));
        assert_eq!(match_path("/users/*", "/users/42/orders"), None);
        assert_eq!(match_path("/users/*", "/users"), None);
    }

    #[test]
    fn test_recursive_wildcard_matches_rest() {
        let expected = LITERAL_SEGMENT + RECURSIVE_WILDCARD;
        assert_eq!(match_path("/files/**", "/files/a/b/c"), Some(expected));
        assert_eq!(match_path("/files/**", "/files/a"), Some(expected));
        assert_eq!(match_path("/files/**", "/files"), Some(expected));
        assert_eq!(match_path("/files/**", "/other/a"), None);
    }

    #[test]
    fn test_literal_mismatch() {
        assert_eq!(match_path("/a/b", "/a/c"), None);
        assert_eq!(match_path("/a/b", "/a/b/c"), None);
        assert_eq!(match_path("/a/b/c", "/a/b"), None);
    }

    #[test]
    fn test_rule_pattern_parse() {
        let pattern = RulePattern::parse("[/orders/**:post]");
        assert_eq!(pattern.path(), "/orders/**");
        assert_eq!(pattern.method(), Some("POST"));
        assert_eq!(pattern.raw(), "[/orders/**:post]");

        let pattern = RulePattern::parse("[/health]");
        assert_eq!(pattern.path(), "/health");
        assert_eq!(pattern.method(), None);
    }

    #[test]
    fn test_colon_inside_path_is_not_a_method() {
        let pattern = RulePattern::parse("[/v1:batch/items]");
        assert_eq!(pattern.path(), "/v1:batch/items");
        assert_eq!(pattern.method(), None);
    }

    #[test]
    fn test_match_with_method() {
        assert!(match_with_method("[/items:POST]", "post", "/items").is_some());
        assert!(match_with_method("[/items:POST]", "GET", "/items").is_none());
        assert!(match_with_method("[/items]", "DELETE", "/items").is_some());
    }

    #[test]
    fn test_coarse_lookup_ignores_method() {
        let pattern = RulePattern::parse("[/items:POST]");
        assert!(pattern.matches(None, "/items").is_some());
    }

    #[test]
    fn test_best_match_prefers_specific_rule() {
        let table = RuleTable::new([
            ("[/api/**]", "api"),
            ("[/api/*/orders]", "orders"),
            ("[/api/v1/orders]", "v1-orders"),
        ]);

        let (pattern, value) = table.best_match(None, "/api/v1/orders").unwrap().unwrap();
        assert_eq!(*value, "v1-orders");
        assert_eq!(pattern.raw(), "[/api/v1/orders]");

        let (_, value) = table.best_match(None, "/api/v2/orders").unwrap().unwrap();
        assert_eq!(*value, "orders");

        let (_, value) = table.best_match(None, "/api/v2/invoices").unwrap().unwrap();
        assert_eq!(*value, "api");
    }

    #[test]
    fn test_best_match_none() {
        let table = RuleTable::new([("[/mapped]", ())]);
        assert!(table.best_match(Some("GET"), "/unmapped").unwrap().is_none());
        assert!(RuleTable::<()>::default().best_match(None, "/x").unwrap().is_none());
    }

    #[test]
    fn test_best_match_filters_by_method() {
        let table = RuleTable::new([("[/items:POST]", "create"), ("[/items:GET]", "list")]);
        let (_, value) = table.best_match(Some("GET"), "/items").unwrap().unwrap();
        assert_eq!(*value, "list");
        assert!(table.best_match(Some("PUT"), "/items").unwrap().is_none());
    }

    #[test]
    fn test_equal_top_specificity_is_a_configuration_error() {
        let table = RuleTable::new([("[/a/*]", 1), ("[/*/b]", 2), ("[/**]", 3)]);
        let err = table.best_match(None, "/a/b").unwrap_err();
        match err {
            AuthzError::AmbiguousRule { path, mut patterns } => {
                assert_eq!(path, "/a/b");
                patterns.sort();
                assert_eq!(patterns, vec!["[/*/b]".to_string(), "[/a/*]".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_lower_ties_do_not_count() {
        // Two wildcard rules tie below the literal rule; the literal still wins.
        let table = RuleTable::new([("[/a/*]", 1), ("[/*/b]", 2), ("[/a/b]", 3)]);
        let (_, value) = table.best_match(None, "/a/b").unwrap().unwrap();
        assert_eq!(*value, 3);
    }

    fn segment() -> impl Strategy<Value = String> {
        "[a-z0-9]{1,8}"
    }

    proptest! {
        #[test]
        fn prop_match_is_deterministic(
            pattern in prop::collection::vec(prop_oneof![segment(), Just("*".to_string()), Just("**".to_string())], 1..5),
            path in prop::collection::vec(segment(), 0..6),
        ) {
            let pattern = format!("/{}", pattern.join("/"));
            let path = format!("/{}", path.join("/"));
            prop_assert_eq!(match_path(&pattern, &path), match_path(&pattern, &path));
        }

        #[test]
        fn prop_literal_beats_single_beats_recursive(
            prefix in prop::collection::vec(segment(), 0..4),
            last in segment(),
        ) {
            let mut segments = prefix.clone();
            segments.push(last.clone());
            let path = format!("/{}", segments.join("/"));

            let base = prefix.join("/");
            let join = |tail: &str| if base.is_empty() { format!("/{tail}") } else { format!("/{base}/{tail}") };

            let literal = match_path(&join(&last), &path).unwrap();
            let single = match_path(&join("*"), &path).unwrap();
            let recursive = match_path(&join("**"), &path).unwrap();

            prop_assert!(literal > single);
            prop_assert!(single > recursive);
        }
    }
}
