//! Built-in decoder for the `cdr` serialization format.

pub mod msgdef;
pub mod reader;

use serde_json::{Map, Value};

use crate::decode::MessageDecoder;
use crate::error::DecodeError;
use crate::time::TimeFormat;

pub use msgdef::{ArrayKind, FieldDefinition, FieldType, MessageDefinition, MessageDefinitions, PrimitiveType};
pub use reader::CdrReader;

pub const CDR_FORMAT: &str = "cdr";

/// Nesting limit guarding against definitions that refer to themselves.
const MAX_DEPTH: usize = 32;

/// Decodes CDR payloads into JSON values using registered `.msg` layouts.
#[derive(Debug, Clone)]
pub struct CdrDecoder {
    definitions: MessageDefinitions,
    time_format: TimeFormat,
}

impl Default for CdrDecoder {
    fn default() -> Self {
        Self::new(MessageDefinitions::with_builtins())
    }
}

impl CdrDecoder {
    pub fn new(definitions: MessageDefinitions) -> Self {
        Self {
            definitions,
            time_format: TimeFormat::default(),
        }
    }

    #[must_use]
    pub fn with_time_format(mut self, time_format: TimeFormat) -> Self {
        self.time_format = time_format;
        self
    }

    pub fn time_format(&self) -> TimeFormat {
        self.time_format
    }

    pub fn definitions(&self) -> &MessageDefinitions {
        &self.definitions
    }

    pub fn definitions_mut(&mut self) -> &mut MessageDefinitions {
        &mut self.definitions
    }

    fn read_message(&self, reader: &mut CdrReader<'_>, type_name: &str, depth: usize) -> Result<Value, DecodeError> {
        if depth > MAX_DEPTH {
            return Err(DecodeError::InvalidDefinition {
                type_name: type_name.to_string(),
                reason: "nesting too deep".into(),
            });
        }
        if type_name == msgdef::TIME_TYPE || type_name == msgdef::DURATION_TYPE {
            let sec = reader.read_i32()?;
            let nanosec = reader.read_u32()?;
            return Ok(self.time_format.render_parts(i64::from(sec), nanosec));
        }

        let def = self
            .definitions
            .get(type_name)
            .ok_or_else(|| DecodeError::UnknownType(type_name.to_string()))?;
        if def.fields.is_empty() {
            // Memberless structures carry one placeholder byte on the wire.
            reader.read_u8()?;
            return Ok(Value::Object(Map::new()));
        }
        let mut object = Map::with_capacity(def.fields.len());
        for field in &def.fields {
            let value = self.read_field(reader, field, depth)?;
            object.insert(field.name.clone(), value);
        }
        Ok(Value::Object(object))
    }

    fn read_field(&self, reader: &mut CdrReader<'_>, field: &FieldDefinition, depth: usize) -> Result<Value, DecodeError> {
        let len = match field.array {
            None => return self.read_single(reader, &field.field_type, &field.name, depth),
            Some(ArrayKind::Fixed(len)) => len,
            Some(ArrayKind::Unbounded) => reader.read_sequence_len()?,
            Some(ArrayKind::Bounded(bound)) => {
                let len = reader.read_sequence_len()?;
                if len > bound {
                    return Err(DecodeError::Custom(format!(
                        "field {} holds {len} elements, bound is {bound}",
                        field.name
                    )));
                }
                len
            }
        };
        // Every element takes at least one byte, so a corrupt length runs out of input.
        let mut items = Vec::with_capacity(len.min(reader.remaining()));
        for _ in 0..len {
            items.push(self.read_single(reader, &field.field_type, &field.name, depth)?);
        }
        Ok(Value::Array(items))
    }

    fn read_single(
        &self,
        reader: &mut CdrReader<'_>,
        field_type: &FieldType,
        field_name: &str,
        depth: usize,
    ) -> Result<Value, DecodeError> {
        let primitive = match field_type {
            FieldType::Complex(type_name) => return self.read_message(reader, type_name, depth + 1),
            FieldType::Primitive(primitive) => *primitive,
        };
        Ok(match primitive {
            PrimitiveType::Bool => Value::from(reader.read_bool()?),
            PrimitiveType::Byte | PrimitiveType::Char | PrimitiveType::UInt8 => Value::from(reader.read_u8()?),
            PrimitiveType::Int8 => Value::from(reader.read_i8()?),
            PrimitiveType::Int16 => Value::from(reader.read_i16()?),
            PrimitiveType::UInt16 => Value::from(reader.read_u16()?),
            PrimitiveType::Int32 => Value::from(reader.read_i32()?),
            PrimitiveType::UInt32 => Value::from(reader.read_u32()?),
            PrimitiveType::Int64 => Value::from(reader.read_i64()?),
            PrimitiveType::UInt64 => Value::from(reader.read_u64()?),
            PrimitiveType::Float32 => Value::from(f64::from(reader.read_f32()?)),
            PrimitiveType::Float64 => Value::from(reader.read_f64()?),
            PrimitiveType::String => Value::from(reader.read_string(field_name)?),
            PrimitiveType::WString => {
                return Err(DecodeError::Custom(format!("field {field_name}: wstring is not supported")));
            }
        })
    }
}

impl MessageDecoder for CdrDecoder {
    fn decode(&self, type_name: &str, serialization_format: &str, data: &[u8]) -> Result<Value, DecodeError> {
        if !serialization_format.eq_ignore_ascii_case(CDR_FORMAT) {
            return Err(DecodeError::UnsupportedFormat(serialization_format.to_string()));
        }
        let mut reader = CdrReader::new(data)?;
        self.read_message(&mut reader, &msgdef::normalize_type_name(type_name), 0)
    }
}
