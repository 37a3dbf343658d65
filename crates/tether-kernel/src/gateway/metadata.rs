//! Metadata bridge between HTTP headers and RPC call metadata.
//!
//! ```text
//! HTTP request headers ──► HeaderBridge::incoming ──► MetadataMap (call context)
//! CallMetadata {header, trailer} ──► CallMetadata::write_http_headers ──► HTTP response headers
//! ```
//!
//! Metadata is a multimap: a key may carry several values, and merging
//! always appends. Values are never comma-joined; each one becomes its own
//! header line.

use http::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::HashSet;
use tracing::debug;

/// Prefix a caller may use to address RPC metadata explicitly; stripped on
/// the way in.
pub const METADATA_HEADER_PREFIX: &str = "grpc-metadata-";

/// Prefix applied to trailer metadata written as HTTP headers.
pub const TRAILER_HEADER_PREFIX: &str = "grpc-trailer-";

/// Headers that describe HTTP framing rather than the call, and therefore
/// never become call metadata.
pub const DEFAULT_RESERVED_HEADERS: &[&str] = &[
    "accept",
    "accept-encoding",
    "connection",
    "content-length",
    "content-type",
    "expect",
    "grpc-accept-encoding",
    "grpc-encoding",
    "grpc-message",
    "grpc-status",
    "grpc-timeout",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

// ─────────────────────────────────────────────────────────────────────────────
// MetadataMap
// ─────────────────────────────────────────────────────────────────────────────

/// Ordered multimap of lowercase keys to string values.
///
/// Keys keep first-insertion order; values keep append order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataMap {
    entries: Vec<(String, Vec<String>)>,
}

impl MetadataMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` when no key is present.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Append `value` under `key` (case-insensitive).
    pub fn append(&mut self, key: impl AsRef<str>, value: impl Into<String>) {
        let key = key.as_ref().to_ascii_lowercase();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, values)) => values.push(value),
            None => self.entries.push((key, vec![value])),
        }
    }

    /// First value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.get_all(key).first().map(String::as_str)
    }

    /// Every value stored under `key`, in append order.
    pub fn get_all(&self, key: &str) -> &[String] {
        let key = key.to_ascii_lowercase();
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, values)| values.as_slice())
            .unwrap_or(&[])
    }

    /// Remove a key, returning its values.
    pub fn remove(&mut self, key: &str) -> Vec<String> {
        let key = key.to_ascii_lowercase();
        match self.entries.iter().position(|(k, _)| *k == key) {
            Some(i) => self.entries.remove(i).1,
            None => Vec::new(),
        }
    }

    /// Iterate `(key, values)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(k, values)| (k.as_str(), values.as_slice()))
    }

    /// Append every value of `other` into `self`, per key, in order.
    pub fn extend_from(&mut self, other: &MetadataMap) {
        for (key, values) in other.iter() {
            for value in values {
                self.append(key, value.clone());
            }
        }
    }

    /// Join several maps into one; values of a shared key are concatenated
    /// in argument order.
    pub fn join<'a>(maps: impl IntoIterator<Item = &'a MetadataMap>) -> MetadataMap {
        let mut out = MetadataMap::new();
        for map in maps {
            out.extend_from(map);
        }
        out
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for MetadataMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = MetadataMap::new();
        for (k, v) in iter {
            map.append(k, v);
        }
        map
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CallMetadata
// ─────────────────────────────────────────────────────────────────────────────

/// Metadata returned by a call: header metadata (sent before the response
/// body) and trailer metadata (sent after it).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallMetadata {
    pub header: MetadataMap,
    pub trailer: MetadataMap,
}

impl CallMetadata {
    /// Create empty header and trailer maps.
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` when neither header nor trailer metadata is present.
    pub fn is_empty(&self) -> bool {
        self.header.is_empty() && self.trailer.is_empty()
    }

    /// Additive merge: values of `added` are appended after the existing
    /// ones, per key, for header and trailer independently.
    pub fn merge(mut self, added: &CallMetadata) -> CallMetadata {
        self.merge_from(added);
        self
    }

    /// In-place form of [`merge`](Self::merge).
    pub fn merge_from(&mut self, added: &CallMetadata) {
        self.header.extend_from(&added.header);
        self.trailer.extend_from(&added.trailer);
    }

    /// Fold trailer metadata into header metadata, leaving the trailer empty.
    ///
    /// In-process calls have no framing moment separating "before body" from
    /// "after body", so their metadata is reported as one set.
    pub fn collapsed(mut self) -> CallMetadata {
        let trailer = std::mem::take(&mut self.trailer);
        self.header.extend_from(&trailer);
        self
    }

    /// Append this metadata to `headers`: one line per value, header keys
    /// as-is, trailer keys under [`TRAILER_HEADER_PREFIX`].
    pub fn write_http_headers(&self, headers: &mut HeaderMap) {
        for (key, values) in self.header.iter() {
            append_lines(headers, key, values);
        }
        for (key, values) in self.trailer.iter() {
            append_lines(headers, &format!("{TRAILER_HEADER_PREFIX}{key}"), values);
        }
    }

    /// Render this metadata as a fresh header map.
    pub fn to_http_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        self.write_http_headers(&mut headers);
        headers
    }
}

fn append_lines(headers: &mut HeaderMap, key: &str, values: &[String]) {
    let Ok(name) = HeaderName::from_bytes(key.as_bytes()) else {
        debug!(key, "dropping metadata key that is not a valid header name");
        return;
    };
    for value in values {
        match HeaderValue::from_str(value) {
            Ok(v) => {
                headers.append(name.clone(), v);
            }
            Err(_) => debug!(key, "dropping metadata value that is not a valid header value"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HeaderBridge
// ─────────────────────────────────────────────────────────────────────────────

/// Copies incoming HTTP headers into call metadata, skipping reserved ones.
#[derive(Debug, Clone)]
pub struct HeaderBridge {
    reserved: HashSet<String>,
}

impl Default for HeaderBridge {
    fn default() -> Self {
        Self {
            reserved: DEFAULT_RESERVED_HEADERS
                .iter()
                .map(|h| h.to_string())
                .collect(),
        }
    }
}

impl HeaderBridge {
    /// Bridge with [`DEFAULT_RESERVED_HEADERS`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: exclude additional header names.
    pub fn with_reserved(mut self, names: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        self.reserved
            .extend(names.into_iter().map(|n| n.as_ref().to_ascii_lowercase()));
        self
    }

    /// Is `name` excluded from the metadata copy?
    pub fn is_reserved(&self, name: &str) -> bool {
        self.reserved.contains(&name.to_ascii_lowercase())
    }

    /// Build the incoming call metadata for a request.
    ///
    /// `Host` is forwarded as `x-forwarded-host`, and `remote_addr` (when
    /// known) is appended to `x-forwarded-for`.
    pub fn incoming(&self, headers: &HeaderMap, remote_addr: Option<&str>) -> MetadataMap {
        let mut md = MetadataMap::new();
        for (name, value) in headers {
            let Ok(value) = value.to_str() else {
                debug!(header = %name, "skipping non-ascii header value");
                continue;
            };
            let key = name.as_str();
            if key == "host" {
                md.append("x-forwarded-host", value);
                continue;
            }
            if self.reserved.contains(key) {
                continue;
            }
            let key = match key.strip_prefix(METADATA_HEADER_PREFIX) {
                Some(stripped) if !stripped.is_empty() => stripped,
                _ => key,
            };
            md.append(key, value);
        }

        if let Some(addr) = remote_addr {
            let mut forwarded = md.remove("x-forwarded-for");
            match forwarded.last_mut() {
                Some(last) => *last = format!("{last}, {addr}"),
                None => forwarded.push(addr.to_string()),
            }
            for value in forwarded {
                md.append("x-forwarded-for", value);
            }
        }
        md
    }
}
