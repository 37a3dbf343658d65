//! Marshalers: pluggable codecs between wire bytes and message values.
//!
//! A [`Marshaler`] translates between bytes and a `serde_json::Value` tree;
//! typed messages are reached through `serde` on either side of it (see
//! [`decode_message`] and [`encode_message`]). Marshalers are selected per
//! request by the [`MarshalerRegistry`] from `Content-Type` and `Accept`.

use super::error::MarshalError;
use super::pattern::PathParams;
use http::header::{ACCEPT, CONTENT_TYPE};
use http::HeaderMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Registry key for the fallback marshaler.
pub const MIME_WILDCARD: &str = "*";

/// Codec between wire bytes and message values.
pub trait Marshaler: Send + Sync + fmt::Debug {
    /// MIME type written in the `Content-Type` of responses.
    fn content_type(&self) -> &str;

    /// Parse `bytes` into a value tree. Fails on malformed input.
    fn decode(&self, bytes: &[u8]) -> Result<Value, MarshalError>;

    /// Render a value tree into bytes.
    fn encode(&self, value: &Value) -> Result<Vec<u8>, MarshalError>;
}

/// JSON marshaler; field names are whatever the message's serde mapping
/// produces (lowerCamelCase for schema-derived messages).
#[derive(Debug, Clone, Default)]
pub struct JsonMarshaler {
    pretty: bool,
}

impl JsonMarshaler {
    /// Compact JSON output.
    pub fn new() -> Self {
        Self::default()
    }

    /// Indented JSON output.
    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

impl Marshaler for JsonMarshaler {
    fn content_type(&self) -> &str {
        "application/json"
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, MarshalError> {
        serde_json::from_slice(bytes).map_err(|source| MarshalError::Malformed {
            content_type: self.content_type().to_string(),
            source,
        })
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, MarshalError> {
        let result = if self.pretty {
            serde_json::to_vec_pretty(value)
        } else {
            serde_json::to_vec(value)
        };
        result.map_err(|source| MarshalError::Encode {
            content_type: self.content_type().to_string(),
            source,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Typed helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Decode a request body into `M`, then bind path parameters onto it.
///
/// A body with no content (empty or whitespace only) leaves the message at
/// its zero value instead of failing.
pub fn decode_message<M>(
    marshaler: &dyn Marshaler,
    body: &[u8],
    params: &PathParams,
) -> Result<M, MarshalError>
where
    M: DeserializeOwned + Default,
{
    let blank = body.iter().all(u8::is_ascii_whitespace);
    if blank && params.is_empty() {
        return Ok(M::default());
    }

    let mut value = if blank {
        Value::Object(Map::new())
    } else {
        marshaler.decode(body)?
    };
    populate_path_params(&mut value, params)?;
    serde_json::from_value(value).map_err(|e| MarshalError::Shape(e.to_string()))
}

/// Encode a message with the given marshaler.
pub fn encode_message<M>(marshaler: &dyn Marshaler, message: &M) -> Result<Vec<u8>, MarshalError>
where
    M: Serialize + ?Sized,
{
    let value = serde_json::to_value(message).map_err(|source| MarshalError::Encode {
        content_type: marshaler.content_type().to_string(),
        source,
    })?;
    marshaler.encode(&value)
}

/// Write each path parameter into the field of the same name.
///
/// Dotted names address nested messages; each part is converted to
/// lowerCamelCase. Values are bound as JSON strings, so a non-string target
/// field must accept its string form on deserialize (64-bit integer fields
/// do, through the gateway's `int64_json` mapping).
pub fn populate_path_params(value: &mut Value, params: &PathParams) -> Result<(), MarshalError> {
    // Sorted so nested creation is deterministic.
    let mut names: Vec<&String> = params.keys().collect();
    names.sort();

    for name in names {
        let mut cursor = &mut *value;
        let parts: Vec<String> = name.split('.').map(lower_camel).collect();
        let (leaf, parents) = parts
            .split_last()
            .ok_or_else(|| MarshalError::Shape(format!("empty path parameter name '{name}'")))?;
        for part in parents {
            let object = cursor.as_object_mut().ok_or_else(|| {
                MarshalError::Shape(format!("cannot bind path parameter '{name}' into a non-object"))
            })?;
            cursor = object
                .entry(part.clone())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        let object = cursor.as_object_mut().ok_or_else(|| {
            MarshalError::Shape(format!("cannot bind path parameter '{name}' into a non-object"))
        })?;
        object.insert(leaf.clone(), Value::String(params[name].clone()));
    }
    Ok(())
}

/// `event_id` → `eventId`; already-camel names pass through.
fn lower_camel(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for c in name.chars() {
        if c == '_' {
            upper = !out.is_empty();
        } else if upper {
            out.push(c.to_ascii_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// MarshalerRegistry
// ─────────────────────────────────────────────────────────────────────────────

/// MIME type → marshaler table used for content negotiation.
#[derive(Debug, Clone)]
pub struct MarshalerRegistry {
    by_mime: HashMap<String, Arc<dyn Marshaler>>,
    fallback: Arc<dyn Marshaler>,
}

impl Default for MarshalerRegistry {
    fn default() -> Self {
        Self {
            by_mime: HashMap::new(),
            fallback: Arc::new(JsonMarshaler::new()),
        }
    }
}

impl MarshalerRegistry {
    /// Registry whose only entry is the JSON fallback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `marshaler` for `mime`. [`MIME_WILDCARD`] replaces the
    /// fallback.
    pub fn register(&mut self, mime: &str, marshaler: Arc<dyn Marshaler>) {
        if mime == MIME_WILDCARD {
            self.fallback = marshaler;
        } else {
            self.by_mime.insert(mime.to_ascii_lowercase(), marshaler);
        }
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, mime: &str, marshaler: Arc<dyn Marshaler>) -> Self {
        self.register(mime, marshaler);
        self
    }

    /// The marshaler used when negotiation finds nothing.
    pub fn fallback(&self) -> Arc<dyn Marshaler> {
        Arc::clone(&self.fallback)
    }

    /// Pick `(inbound, outbound)` marshalers for a request.
    ///
    /// Inbound follows `Content-Type`; outbound follows the first registered
    /// `Accept` entry, then the inbound choice, then the fallback.
    pub fn for_request(&self, headers: &HeaderMap) -> (Arc<dyn Marshaler>, Arc<dyn Marshaler>) {
        let inbound = headers
            .get_all(CONTENT_TYPE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(|v| self.lookup(v));

        let outbound = headers
            .get_all(ACCEPT)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .find_map(|v| self.lookup(v));

        let inbound = inbound.unwrap_or_else(|| self.fallback());
        let outbound = outbound.unwrap_or_else(|| Arc::clone(&inbound));
        (inbound, outbound)
    }

    fn lookup(&self, media_type: &str) -> Option<Arc<dyn Marshaler>> {
        let essence = media_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        self.by_mime.get(&essence).cloned()
    }
}
