//! Ordered query-string parameters.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

/// Ordered key/value pairs parsed from or rendered to a query string.
///
/// Keys keep the position of their first occurrence; a repeated key replaces
/// the earlier value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryParams(IndexMap<String, String>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a raw query string. A leading `?` is ignored and empty segments
    /// such as `a=1&&b=2` are skipped.
    pub fn parse(query: &str) -> Self {
        let query = query.trim().trim_start_matches('?');
        let mut params = IndexMap::new();
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            if key.is_empty() {
                continue;
            }
            params.insert(key.into_owned(), value.into_owned());
        }
        Self(params)
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut params = Self::new();
        for (key, value) in pairs {
            params.insert(key, value);
        }
        params
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Render as `application/x-www-form-urlencoded` in insertion order.
    pub fn to_query_string(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, value) in &self.0 {
            serializer.append_pair(key, value);
        }
        serializer.finish()
    }
}

impl<'a> IntoIterator for &'a QueryParams {
    type Item = (&'a String, &'a String);
    type IntoIter = indexmap::map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Client query segments kept byte-for-byte, indexed by their decoded key.
///
/// Same ordering rule as [`QueryParams`]: the first occurrence fixes the
/// position, the last one supplies the text. Values are never decoded, so
/// they reach the provider exactly as the client sent them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawQuery(IndexMap<String, String>);

impl RawQuery {
    pub fn parse(query: &str) -> Self {
        let query = query.trim().trim_start_matches('?');
        let mut segments = IndexMap::new();
        for segment in query.split('&') {
            let raw_key = segment.split_once('=').map_or(segment, |(key, _)| key);
            let Some((key, _)) = form_urlencoded::parse(raw_key.as_bytes()).next() else {
                continue;
            };
            if key.is_empty() {
                continue;
            }
            segments.insert(key.into_owned(), segment.to_string());
        }
        Self(segments)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decoded key and the untouched `key=value` segment.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
