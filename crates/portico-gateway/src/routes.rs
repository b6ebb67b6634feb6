//! The prefix route table.
//!
//! Matching is longest-prefix-wins so overlapping registrations like
//! `/user` and `/user/public` resolve unambiguously regardless of their
//! order in the configuration; registration order only breaks exact-length
//! ties. A prefix matches at path-segment boundaries, so `/user/publicity`
//! belongs to `/user`, not `/user/public`.

use portico_settings::RouteSettings;

/// One immutable routing rule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteEntry {
    /// Path prefix matched against the request path.
    pub prefix: String,
    /// Upstream base URI, e.g. `http://user:3000`.
    pub upstream: String,
    /// Prefix substituted for `prefix` in the forwarded path.
    pub rewrite: String,
    /// Whether the auth gate must verify identity before forwarding.
    pub requires_auth: bool,
    /// Whether WebSocket upgrades are forwarded on this route.
    pub websocket: bool,
}

impl RouteEntry {
    /// Replace the matched prefix with the rewrite target.
    ///
    /// The result always starts with `/`, so a catch-all `/` route with an
    /// empty rewrite forwards paths unchanged.
    pub fn rewrite_path(&self, path: &str) -> String {
        let rest = path.strip_prefix(self.prefix.as_str()).unwrap_or(path);
        let rewritten = format!("{}{rest}", self.rewrite);
        if rewritten.starts_with('/') {
            rewritten
        } else {
            format!("/{rewritten}")
        }
    }

    /// Whether this entry's prefix matches `path` at a segment boundary.
    fn matches(&self, path: &str) -> bool {
        if self.prefix == "/" {
            return true;
        }
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

impl From<&RouteSettings> for RouteEntry {
    fn from(settings: &RouteSettings) -> Self {
        Self {
            prefix: settings.prefix.clone(),
            upstream: settings.upstream.trim_end_matches('/').to_string(),
            rewrite: settings.rewrite.clone(),
            requires_auth: settings.requires_auth,
            websocket: settings.websocket,
        }
    }
}

/// The gateway's static, ordered routing rules.
#[derive(Debug, Default)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    /// Build a table preserving registration order.
    pub fn new(entries: Vec<RouteEntry>) -> Self {
        Self { entries }
    }

    /// Build a table from configured routes.
    pub fn from_settings(routes: &[RouteSettings]) -> Self {
        Self::new(routes.iter().map(RouteEntry::from).collect())
    }

    /// Select the entry with the longest matching prefix.
    ///
    /// Ties go to the earlier registration. `None` means no route covers
    /// the path.
    pub fn matches(&self, path: &str) -> Option<&RouteEntry> {
        let mut best: Option<&RouteEntry> = None;
        for entry in &self.entries {
            if entry.matches(path)
                && best.is_none_or(|b| entry.prefix.len() > b.prefix.len())
            {
                best = Some(entry);
            }
        }
        best
    }

    /// Number of registered routes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no routes at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
