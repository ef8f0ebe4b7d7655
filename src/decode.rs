use serde_json::Value;

use crate::error::DecodeError;

/// Turns one serialized payload into a structured value.
///
/// Injected into a [`BagReader`](crate::bag::BagReader) at construction and
/// invoked lazily, at most once per message.
pub trait MessageDecoder: Send + Sync {
    fn decode(&self, type_name: &str, serialization_format: &str, data: &[u8]) -> Result<Value, DecodeError>;
}

impl<F> MessageDecoder for F
where
    F: Fn(&str, &str, &[u8]) -> Result<Value, DecodeError> + Send + Sync,
{
    fn decode(&self, type_name: &str, serialization_format: &str, data: &[u8]) -> Result<Value, DecodeError> {
        self(type_name, serialization_format, data)
    }
}

/// Hands payloads back as a JSON array of bytes, whatever the format.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawBytesDecoder;

impl MessageDecoder for RawBytesDecoder {
    fn decode(&self, _type_name: &str, _serialization_format: &str, data: &[u8]) -> Result<Value, DecodeError> {
        Ok(Value::from(data.to_vec()))
    }
}
