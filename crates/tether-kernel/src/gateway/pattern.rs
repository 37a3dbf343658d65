//! Route templates: compile once at startup, match on every request.
//!
//! A template is compiled into a linear list of ops, one per path segment:
//!
//! ```text
//! /v1/audit/getEvents            three literals
//! /v1/clusters/{cluster}/nodes   literal, capture, literal
//! /v1/objects/{path=**}          literal, capture-the-rest
//! /v1/jobs/{id}:cancel           literal, capture, custom verb `cancel`
//! ```
//!
//! Matching walks the ops left to right against the request path with no
//! backtracking, so two captures can never claim overlapping ranges.

use super::error::GatewayError;
use super::types::HttpMethod;
use percent_encoding::percent_decode_str;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Path parameter bindings produced by a successful match.
pub type PathParams = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Op {
    /// Segment must equal the literal exactly.
    Literal(String),
    /// Binds exactly one non-empty segment.
    Capture(String),
    /// Binds every remaining segment (at least one), joined by `/`.
    CaptureRest(String),
}

/// A compiled URL template bound to one HTTP verb.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTemplate {
    verb: HttpMethod,
    ops: Vec<Op>,
    custom_verb: Option<String>,
    canonical: String,
    source: String,
}

impl RouteTemplate {
    /// Compile `template` for `verb`.
    ///
    /// Fails with [`GatewayError::InvalidTemplate`] on unbalanced braces,
    /// empty segments, duplicate parameter names, a `**` capture outside the
    /// last segment, or an unsupported verb.
    pub fn compile(template: &str, verb: &str) -> Result<Self, GatewayError> {
        let method = HttpMethod::from_str_ci(verb).ok_or_else(|| {
            GatewayError::invalid_template(template, format!("unsupported verb '{verb}'"))
        })?;
        let body = template
            .strip_prefix('/')
            .ok_or_else(|| GatewayError::invalid_template(template, "template must start with '/'"))?;
        let (body, custom_verb) = split_custom_verb(template, body)?;

        let mut ops = Vec::new();
        let mut seen = HashSet::new();
        if !body.is_empty() {
            let segments: Vec<&str> = body.split('/').collect();
            let last = segments.len() - 1;
            for (i, segment) in segments.iter().enumerate() {
                let op = parse_segment(template, segment, i == last)?;
                if let Op::Capture(name) | Op::CaptureRest(name) = &op {
                    if !seen.insert(name.clone()) {
                        return Err(GatewayError::invalid_template(
                            template,
                            format!("duplicate parameter '{name}'"),
                        ));
                    }
                }
                ops.push(op);
            }
        } else if custom_verb.is_some() {
            return Err(GatewayError::invalid_template(
                template,
                "custom verb requires a preceding path segment",
            ));
        }

        let canonical = render(&ops, custom_verb.as_deref());
        Ok(Self {
            verb: method,
            ops,
            custom_verb,
            canonical,
            source: template.to_string(),
        })
    }

    /// The verb this template is bound to.
    pub fn verb(&self) -> HttpMethod {
        self.verb
    }

    /// Canonical template string, e.g. `/v1/audit/getEvents`.
    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    /// The template exactly as it was passed to [`compile`](Self::compile).
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Custom verb suffix (`cancel` for `/v1/jobs/{id}:cancel`).
    pub fn custom_verb(&self) -> Option<&str> {
        self.custom_verb.as_deref()
    }

    /// Parameter names in template order.
    pub fn param_names(&self) -> Vec<&str> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::Capture(name) | Op::CaptureRest(name) => Some(name.as_str()),
                Op::Literal(_) => None,
            })
            .collect()
    }

    /// Match a request against this template.
    ///
    /// Returns the bindings iff the verb is identical, every literal segment
    /// matches, and every capture binds a non-empty value. Literals are
    /// compared against the raw path; captured values are percent-decoded,
    /// and a capture that does not decode to UTF-8 is not a match.
    pub fn matches(&self, verb: &str, path: &str) -> Option<PathParams> {
        if verb != self.verb.as_str() {
            return None;
        }
        let rest = path.strip_prefix('/')?;
        let rest = match &self.custom_verb {
            Some(custom) => rest.strip_suffix(custom.as_str())?.strip_suffix(':')?,
            None => rest,
        };

        let mut params = PathParams::new();
        if self.ops.is_empty() {
            return rest.is_empty().then_some(params);
        }

        let components: Vec<&str> = rest.split('/').collect();
        let mut pos = 0;
        for op in &self.ops {
            match op {
                Op::Literal(literal) => {
                    if *components.get(pos)? != literal.as_str() {
                        return None;
                    }
                    pos += 1;
                }
                Op::Capture(name) => {
                    let value = *components.get(pos)?;
                    if value.is_empty() {
                        return None;
                    }
                    params.insert(name.clone(), unescape(value)?);
                    pos += 1;
                }
                Op::CaptureRest(name) => {
                    let tail = &components[pos..];
                    if tail.is_empty() || tail.iter().any(|c| c.is_empty()) {
                        return None;
                    }
                    // Decode per segment so an escaped `%2F` stays distinct
                    // from a separator until the final join.
                    let decoded = tail
                        .iter()
                        .map(|c| unescape(c))
                        .collect::<Option<Vec<_>>>()?;
                    params.insert(name.clone(), decoded.join("/"));
                    pos = components.len();
                }
            }
        }
        (pos == components.len()).then_some(params)
    }
}

impl fmt::Display for RouteTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.verb, self.canonical)
    }
}

fn unescape(raw: &str) -> Option<String> {
    percent_decode_str(raw)
        .decode_utf8()
        .ok()
        .map(|value| value.into_owned())
}

/// Split a trailing `:verb` off the last segment, ignoring colons inside
/// braces.
fn split_custom_verb<'a>(
    template: &str,
    body: &'a str,
) -> Result<(&'a str, Option<String>), GatewayError> {
    let last_start = body.rfind('/').map_or(0, |i| i + 1);
    let last = &body[last_start..];

    let mut depth = 0usize;
    let mut colon = None;
    for (i, c) in last.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            ':' if depth == 0 => colon = Some(i),
            _ => {}
        }
    }

    let Some(i) = colon else {
        return Ok((body, None));
    };
    let verb = &last[i + 1..];
    if verb.is_empty() {
        return Err(GatewayError::invalid_template(template, "custom verb cannot be empty"));
    }
    if !verb
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(GatewayError::invalid_template(
            template,
            format!("invalid custom verb '{verb}'"),
        ));
    }
    Ok((&body[..last_start + i], Some(verb.to_string())))
}

fn parse_segment(template: &str, segment: &str, is_last: bool) -> Result<Op, GatewayError> {
    if segment.is_empty() {
        return Err(GatewayError::invalid_template(template, "empty path segment"));
    }

    if let Some(inner) = segment.strip_prefix('{') {
        let inner = inner
            .strip_suffix('}')
            .ok_or_else(|| GatewayError::invalid_template(template, "unbalanced '{'"))?;
        if inner.contains(['{', '}']) {
            return Err(GatewayError::invalid_template(template, "unbalanced braces"));
        }
        let (name, capture) = match inner.split_once('=') {
            Some((name, capture)) => (name, Some(capture)),
            None => (inner, None),
        };
        validate_param_name(template, name)?;
        return match capture {
            None | Some("*") => Ok(Op::Capture(name.to_string())),
            Some("**") if is_last => Ok(Op::CaptureRest(name.to_string())),
            Some("**") => Err(GatewayError::invalid_template(
                template,
                format!("'{name}=**' is only allowed in the last segment"),
            )),
            Some(other) => Err(GatewayError::invalid_template(
                template,
                format!("unsupported capture pattern '{other}'"),
            )),
        };
    }

    if segment.contains(['{', '}']) {
        return Err(GatewayError::invalid_template(template, "unbalanced braces"));
    }
    if segment == "*" || segment == "**" {
        return Err(GatewayError::invalid_template(
            template,
            "anonymous wildcards are not supported, name the capture",
        ));
    }
    Ok(Op::Literal(segment.to_string()))
}

/// Parameter names are dotted identifiers (`event_id`, `filter.name`).
fn validate_param_name(template: &str, name: &str) -> Result<(), GatewayError> {
    let valid = !name.is_empty()
        && name.split('.').all(|part| {
            let mut chars = part.chars();
            chars
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        });
    if valid {
        Ok(())
    } else {
        Err(GatewayError::invalid_template(
            template,
            format!("invalid parameter name '{name}'"),
        ))
    }
}

fn render(ops: &[Op], custom_verb: Option<&str>) -> String {
    let mut out = String::new();
    for op in ops {
        out.push('/');
        match op {
            Op::Literal(literal) => out.push_str(literal),
            Op::Capture(name) => {
                out.push('{');
                out.push_str(name);
                out.push('}');
            }
            Op::CaptureRest(name) => {
                out.push('{');
                out.push_str(name);
                out.push_str("=**}");
            }
        }
    }
    if out.is_empty() {
        out.push('/');
    }
    if let Some(verb) = custom_verb {
        out.push(':');
        out.push_str(verb);
    }
    out
}

// =============================================================================
// Tests
// =============================================================================
