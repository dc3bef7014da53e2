//! Paths that secondary mirrors serve unreliably and should hit the primary first.

use url::Url;

/// One "prefer the primary mirror" rule.
#[derive(Debug, Clone, Copy)]
pub struct CanonicalRule {
    /// Path fragment that must appear in the request path
    pub path_marker: &'static str,
    /// When set, one of these query keys must also be present
    pub scoped_query_keys: Option<&'static [&'static str]>,
}

/// Album, artist and playlist lookups, plus searches scoped to those entities.
pub const CANONICAL_RULES: &[CanonicalRule] = &[
    CanonicalRule { path_marker: "/album/", scoped_query_keys: None },
    CanonicalRule { path_marker: "/artist/", scoped_query_keys: None },
    CanonicalRule { path_marker: "/playlist/", scoped_query_keys: None },
    CanonicalRule { path_marker: "/search/", scoped_query_keys: Some(&["al", "a", "p"]) },
];

impl CanonicalRule {
    fn matches(&self, path: &str, query_keys: &[String]) -> bool {
        if !path.contains(self.path_marker) {
            return false;
        }
        match self.scoped_query_keys {
            None => true,
            Some(keys) => query_keys.iter().any(|k| keys.contains(&k.as_str())),
        }
    }
}

pub fn prefers_canonical(url: &Url) -> bool {
    let query_keys: Vec<String> = url.query_pairs().map(|(k, _)| k.into_owned()).collect();
    CANONICAL_RULES.iter().any(|rule| rule.matches(url.path(), &query_keys))
}
