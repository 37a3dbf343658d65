//! RPC status codes and their translation to HTTP.
//!
//! [`Status`] is the structured per-request error: a [`Code`] plus a
//! human-readable message and optional structured details. Whatever
//! produced it (route matching, decoding, an interceptor, the invoked
//! method, the transport), [`translate`] turns it into an HTTP status and an
//! [`ErrorEnvelope`] body rendered with the same marshaler as successful
//! responses.

use super::marshal::Marshaler;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::warn;

/// Body written when the error envelope itself cannot be marshaled.
pub const FALLBACK_ERROR_BODY: &str = r#"{"code":13,"message":"failed to marshal error message"}"#;

/// Canonical RPC status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Code {
    Ok = 0,
    Cancelled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl Code {
    /// Map a wire value; anything out of range is `Unknown`.
    pub fn from_i32(value: i32) -> Code {
        match value {
            0 => Code::Ok,
            1 => Code::Cancelled,
            2 => Code::Unknown,
            3 => Code::InvalidArgument,
            4 => Code::DeadlineExceeded,
            5 => Code::NotFound,
            6 => Code::AlreadyExists,
            7 => Code::PermissionDenied,
            8 => Code::ResourceExhausted,
            9 => Code::FailedPrecondition,
            10 => Code::Aborted,
            11 => Code::OutOfRange,
            12 => Code::Unimplemented,
            13 => Code::Internal,
            14 => Code::Unavailable,
            15 => Code::DataLoss,
            16 => Code::Unauthenticated,
            _ => Code::Unknown,
        }
    }

    /// Numeric wire value.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// HTTP status this code is reported as.
    pub fn http_status(self) -> u16 {
        match self {
            Code::Ok => 200,
            Code::Cancelled => 499,
            Code::Unknown => 500,
            Code::InvalidArgument => 400,
            Code::DeadlineExceeded => 504,
            Code::NotFound => 404,
            Code::AlreadyExists => 409,
            Code::PermissionDenied => 403,
            Code::ResourceExhausted => 429,
            Code::FailedPrecondition => 400,
            Code::Aborted => 409,
            Code::OutOfRange => 400,
            Code::Unimplemented => 501,
            Code::Internal => 500,
            Code::Unavailable => 503,
            Code::DataLoss => 500,
            Code::Unauthenticated => 401,
        }
    }

    /// Upper snake case name, as used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Code::Ok => "OK",
            Code::Cancelled => "CANCELLED",
            Code::Unknown => "UNKNOWN",
            Code::InvalidArgument => "INVALID_ARGUMENT",
            Code::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Code::NotFound => "NOT_FOUND",
            Code::AlreadyExists => "ALREADY_EXISTS",
            Code::PermissionDenied => "PERMISSION_DENIED",
            Code::ResourceExhausted => "RESOURCE_EXHAUSTED",
            Code::FailedPrecondition => "FAILED_PRECONDITION",
            Code::Aborted => "ABORTED",
            Code::OutOfRange => "OUT_OF_RANGE",
            Code::Unimplemented => "UNIMPLEMENTED",
            Code::Internal => "INTERNAL",
            Code::Unavailable => "UNAVAILABLE",
            Code::DataLoss => "DATA_LOSS",
            Code::Unauthenticated => "UNAUTHENTICATED",
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Status
// ─────────────────────────────────────────────────────────────────────────────

/// Structured per-request error.
#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    code: Code,
    message: String,
    details: Vec<Value>,
}

impl Status {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: Vec::new(),
        }
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(Code::Cancelled, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(Code::Unknown, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::new(Code::DeadlineExceeded, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Code::NotFound, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(Code::AlreadyExists, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(Code::PermissionDenied, message)
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(Code::Unauthenticated, message)
    }

    pub fn resource_exhausted(message: impl Into<String>) -> Self {
        Self::new(Code::ResourceExhausted, message)
    }

    pub fn unimplemented(message: impl Into<String>) -> Self {
        Self::new(Code::Unimplemented, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Code::Internal, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(Code::Unavailable, message)
    }

    /// Builder: attach a structured detail object.
    pub fn with_detail(mut self, detail: Value) -> Self {
        self.details.push(detail);
        self
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> &[Value] {
        &self.details
    }

    /// HTTP status for this error.
    pub fn http_status(&self) -> u16 {
        self.code.http_status()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for Status {}

// ─────────────────────────────────────────────────────────────────────────────
// Error envelope
// ─────────────────────────────────────────────────────────────────────────────

/// Standard error body shared by every failure response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub code: i32,
    pub message: String,
    #[serde(default)]
    pub details: Vec<Value>,
}

impl From<&Status> for ErrorEnvelope {
    fn from(status: &Status) -> Self {
        Self {
            code: status.code().as_i32(),
            message: status.message().to_string(),
            details: status.details().to_vec(),
        }
    }
}

/// Translate a status into `(http_status, body)`.
///
/// Never fails: if the envelope cannot be marshaled, returns 500 with
/// [`FALLBACK_ERROR_BODY`].
pub fn translate(status: &Status, marshaler: &dyn Marshaler) -> (u16, Vec<u8>) {
    let envelope = ErrorEnvelope::from(status);
    let encoded = serde_json::to_value(&envelope)
        .map_err(|e| e.to_string())
        .and_then(|value| marshaler.encode(&value).map_err(|e| e.to_string()));
    match encoded {
        Ok(body) => (status.http_status(), body),
        Err(error) => {
            warn!(%error, code = %status.code(), "failed to marshal error envelope");
            (500, FALLBACK_ERROR_BODY.as_bytes().to_vec())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::error::MarshalError;
    use crate::gateway::marshal::JsonMarshaler;

    #[test]
    fn documented_codes_map_to_http() {
        assert_eq!(Code::InvalidArgument.http_status(), 400);
        assert_eq!(Code::Unauthenticated.http_status(), 401);
        assert_eq!(Code::PermissionDenied.http_status(), 403);
        assert_eq!(Code::NotFound.http_status(), 404);
        assert_eq!(Code::AlreadyExists.http_status(), 409);
        assert_eq!(Code::ResourceExhausted.http_status(), 429);
        assert_eq!(Code::Unimplemented.http_status(), 501);
        assert_eq!(Code::Unavailable.http_status(), 503);
        assert_eq!(Code::Internal.http_status(), 500);
        assert_eq!(Code::Unknown.http_status(), 500);
    }

    #[test]
    fn out_of_range_wire_codes_are_unknown() {
        assert_eq!(Code::from_i32(42), Code::Unknown);
        assert_eq!(Code::from_i32(-1).http_status(), 500);
        assert_eq!(Code::from_i32(14), Code::Unavailable);
    }

    #[test]
    fn translate_writes_envelope() {
        let status = Status::permission_denied("no access to cluster")
            .with_detail(serde_json::json!({"resource": "east"}));
        let (http, body) = translate(&status, &JsonMarshaler::new());
        assert_eq!(http, 403);
        let envelope: ErrorEnvelope = serde_json::from_slice(&body).unwrap();
        assert_eq!(envelope.code, 7);
        assert_eq!(envelope.message, "no access to cluster");
        assert_eq!(envelope.details[0]["resource"], "east");
    }

    #[derive(Debug)]
    struct Broken;

    impl Marshaler for Broken {
        fn content_type(&self) -> &str {
            "application/broken"
        }

        fn decode(&self, _bytes: &[u8]) -> Result<Value, MarshalError> {
            Ok(Value::Null)
        }

        fn encode(&self, _value: &Value) -> Result<Vec<u8>, MarshalError> {
            Err(MarshalError::Shape("always fails".into()))
        }
    }

    #[test]
    fn translate_falls_back_when_marshaling_fails() {
        let (http, body) = translate(&Status::not_found("gone"), &Broken);
        assert_eq!(http, 500);
        assert_eq!(body, FALLBACK_ERROR_BODY.as_bytes());
    }
}
