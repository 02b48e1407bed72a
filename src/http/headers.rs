//! Case-insensitive header multimap.
//!
//! # Design Decisions
//! - Backed by a `Vec` in insertion order; header counts are small and a
//!   linear scan beats hashing at these sizes
//! - Duplicate names are preserved, lookups match names ASCII-case-insensitively
//! - Names keep the casing they were inserted with for serialization

use std::fmt;

/// Ordered, case-insensitive multimap of header fields.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field, keeping any existing fields with the same name.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Replace every field named `name` with a single value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.entries.push((name, value.into()));
    }

    /// First value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The `index`-th value for `name`, in insertion order.
    pub fn get_nth(&self, name: &str, index: usize) -> Option<&str> {
        self.entries
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .nth(index)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn count(&self, name: &str) -> usize {
        self.get_all(name).count()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// Remove every field named `name`. Returns how many were removed.
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        before - self.entries.len()
    }

    /// True if any value of `name`, read as a comma-separated list,
    /// contains `token` (case-insensitive). Used for `Connection: close`
    /// and `Transfer-Encoding: chunked`.
    pub fn has_token(&self, name: &str, token: &str) -> bool {
        self.get_all(name)
            .flat_map(|v| v.split(','))
            .any(|t| t.trim().eq_ignore_ascii_case(token))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (k, v) in iter {
            headers.append(k, v);
        }
        headers
    }
}

impl<K: Into<String>, V: Into<String>> Extend<(K, V)> for Headers {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.append(k, v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive_and_keeps_duplicates() {
        let mut h = Headers::new();
        h.append("Set-Cookie", "a=1");
        h.append("set-cookie", "b=2");
        h.append("Content-Type", "text/plain");

        assert_eq!(h.count("SET-COOKIE"), 2);
        assert_eq!(h.get_nth("Set-Cookie", 1), Some("b=2"));
        assert_eq!(h.get("content-type"), Some("text/plain"));
        assert!(h.contains("CONTENT-TYPE"));
    }

    #[test]
    fn values_outlive_the_lookup_key() {
        let mut h = Headers::new();
        h.append("Content-Type", "text/plain");
        h.append("Via", "a");
        h.append("via", "b");
        let (first, second) = {
            let key = String::from("VIA");
            (h.get(&key), h.get_nth(&key, 1))
        };
        assert_eq!(first, Some("a"));
        assert_eq!(second, Some("b"));
    }

    #[test]
    fn set_replaces_all_values() {
        let mut h: Headers = [("Accept", "a"), ("accept", "b")].into_iter().collect();
        h.set("ACCEPT", "c");
        assert_eq!(h.get_all("accept").collect::<Vec<_>>(), vec!["c"]);
    }

    #[test]
    fn token_search_splits_lists() {
        let mut h = Headers::new();
        h.append("Connection", "Upgrade, Close");
        assert!(h.has_token("connection", "close"));
        assert!(!h.has_token("connection", "keep-alive"));
    }
}
