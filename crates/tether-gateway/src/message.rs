//! Message capability and type-erased request/response values.
//!
//! Every schema-derived message is a [`prost::Message`] (binary wire form
//! for remote dispatch) that is also `serde`-mappable (JSON form for the
//! HTTP surface). [`AnyMessage`] carries such a value through the
//! dispatcher and interceptor chain without the chain knowing its type.

use prost::Message as _;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use tether_kernel::gateway::Status;

/// Capability every routed request and response type provides.
pub trait Message:
    prost::Message + Default + Clone + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T> Message for T where
    T: prost::Message + Default + Clone + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

trait DynMessage: Send + Sync + fmt::Debug {
    fn encode_wire(&self) -> Vec<u8>;
    fn to_json(&self) -> Result<Value, serde_json::Error>;
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
    fn type_name(&self) -> &'static str;
}

impl<M: Message> DynMessage for M {
    fn encode_wire(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    fn to_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<M>()
    }
}

/// A message of some [`Message`] type, known only at runtime.
pub struct AnyMessage {
    inner: Box<dyn DynMessage>,
}

impl AnyMessage {
    pub fn new<M: Message>(message: M) -> Self {
        Self {
            inner: Box::new(message),
        }
    }

    /// Rust type name of the wrapped message.
    pub fn type_name(&self) -> &'static str {
        self.inner.type_name()
    }

    /// Binary wire encoding.
    pub fn encode_to_vec(&self) -> Vec<u8> {
        self.inner.encode_wire()
    }

    /// JSON value tree, as handed to a marshaler.
    pub fn to_json(&self) -> Result<Value, serde_json::Error> {
        self.inner.to_json()
    }

    pub fn downcast_ref<M: Message>(&self) -> Option<&M> {
        self.inner.as_any().downcast_ref::<M>()
    }

    /// Recover the concrete message. A type mismatch is a wiring bug and
    /// surfaces as `Internal`.
    pub fn downcast<M: Message>(self) -> Result<M, Status> {
        let found = self.inner.type_name();
        self.inner
            .into_any()
            .downcast::<M>()
            .map(|boxed| *boxed)
            .map_err(|_| {
                Status::internal(format!(
                    "message type mismatch: expected {}, found {found}",
                    std::any::type_name::<M>()
                ))
            })
    }
}

impl fmt::Debug for AnyMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.inner, f)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// 64-bit integer JSON form
// ─────────────────────────────────────────────────────────────────────────────

/// JSON mapping for `int64` fields: written as a decimal string, read from
/// either a string or a number. `null` reads as zero.
///
/// ```rust,ignore
/// #[prost(int64, tag = "1")]
/// #[serde(with = "crate::message::int64_json")]
/// pub event_id: i64,
/// ```
pub mod int64_json {
    use serde::de::{self, Unexpected, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(value: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        deserializer.deserialize_any(Int64Visitor)
    }

    struct Int64Visitor;

    impl<'de> Visitor<'de> for Int64Visitor {
        type Value = i64;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a 64-bit integer as a number or a decimal string")
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<i64, E> {
            Ok(v)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<i64, E> {
            i64::try_from(v).map_err(|_| E::invalid_value(Unexpected::Unsigned(v), &self))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<i64, E> {
            // i64::MAX as f64 rounds up to 2^63, hence the strict bound.
            if v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64 {
                Ok(v as i64)
            } else {
                Err(E::invalid_value(Unexpected::Float(v), &self))
            }
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<i64, E> {
            v.parse()
                .map_err(|_| E::invalid_value(Unexpected::Str(v), &self))
        }

        fn visit_unit<E: de::Error>(self) -> Result<i64, E> {
            Ok(0)
        }
    }
}
