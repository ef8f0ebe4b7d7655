//! ROS `.msg` definitions: the field layouts the CDR decoder walks.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::DecodeError;

pub const TIME_TYPE: &str = "builtin_interfaces/msg/Time";
pub const DURATION_TYPE: &str = "builtin_interfaces/msg/Duration";

const BUILTINS: &[(&str, &str)] = &[
    (TIME_TYPE, "int32 sec\nuint32 nanosec\n"),
    (DURATION_TYPE, "int32 sec\nuint32 nanosec\n"),
    ("std_msgs/msg/String", "string data\n"),
    ("std_msgs/msg/Bool", "bool data\n"),
    ("std_msgs/msg/Int32", "int32 data\n"),
    ("std_msgs/msg/Int64", "int64 data\n"),
    ("std_msgs/msg/Float32", "float32 data\n"),
    ("std_msgs/msg/Float64", "float64 data\n"),
    (
        "std_msgs/msg/Header",
        "# Standard metadata for higher-level stamped data types.
builtin_interfaces/Time stamp
string frame_id
",
    ),
    (
        "rcl_interfaces/msg/Log",
        "byte DEBUG=10
byte INFO=20
byte WARN=30
byte ERROR=40
byte FATAL=50

builtin_interfaces/Time stamp
uint8 level
string name # name of the node
string msg # message
string file # file the message came from
string function # function the message came from
uint32 line # line the message came from
",
    ),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveType {
    Bool,
    Byte,
    Char,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
    String,
    WString,
}

impl PrimitiveType {
    fn parse(token: &str) -> Option<Self> {
        Some(match token {
            "bool" => Self::Bool,
            "byte" => Self::Byte,
            "char" => Self::Char,
            "int8" => Self::Int8,
            "uint8" => Self::UInt8,
            "int16" => Self::Int16,
            "uint16" => Self::UInt16,
            "int32" => Self::Int32,
            "uint32" => Self::UInt32,
            "int64" => Self::Int64,
            "uint64" => Self::UInt64,
            "float32" => Self::Float32,
            "float64" => Self::Float64,
            "string" => Self::String,
            "wstring" => Self::WString,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Primitive(PrimitiveType),
    /// Fully qualified `pkg/msg/Type`.
    Complex(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayKind {
    Fixed(usize),
    Bounded(usize),
    Unbounded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDefinition {
    pub name: String,
    pub field_type: FieldType,
    pub array: Option<ArrayKind>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDefinition {
    pub type_name: String,
    pub fields: Vec<FieldDefinition>,
}

impl MessageDefinition {
    /// Parses `.msg` text. Constants and default values are skipped; only
    /// the serialized fields matter here.
    pub fn parse(type_name: &str, text: &str) -> Result<Self, DecodeError> {
        let type_name = normalize_type_name(type_name);
        let package = type_name.split('/').next().unwrap_or_default().to_string();
        let invalid = |reason: String| DecodeError::InvalidDefinition {
            type_name: type_name.clone(),
            reason,
        };

        let mut fields = Vec::new();
        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }
            let Some((type_token, rest)) = line.split_once(char::is_whitespace) else {
                return Err(invalid(format!("line {}: missing field name", lineno + 1)));
            };
            let rest = rest.trim_start();
            let name_end = rest.find(|c: char| c.is_whitespace() || c == '=').unwrap_or(rest.len());
            let (name, tail) = rest.split_at(name_end);
            if tail.trim_start().starts_with('=') {
                continue;
            }
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(invalid(format!("line {}: bad field name {name:?}", lineno + 1)));
            }
            let (field_type, array) =
                parse_type_token(type_token, &package).map_err(|reason| invalid(format!("line {}: {reason}", lineno + 1)))?;
            fields.push(FieldDefinition {
                name: name.to_string(),
                field_type,
                array,
            });
        }

        Ok(Self { type_name, fields })
    }
}

fn parse_type_token(token: &str, package: &str) -> Result<(FieldType, Option<ArrayKind>), String> {
    let (base, array) = match token.split_once('[') {
        Some((base, suffix)) => {
            let inner = suffix
                .strip_suffix(']')
                .ok_or_else(|| format!("unterminated array in {token:?}"))?;
            let kind = if inner.is_empty() {
                ArrayKind::Unbounded
            } else if let Some(bound) = inner.strip_prefix("<=") {
                ArrayKind::Bounded(parse_bound(bound, token)?)
            } else {
                ArrayKind::Fixed(parse_bound(inner, token)?)
            };
            (base, Some(kind))
        }
        None => (token, None),
    };

    // Bounded strings (`string<=10`) serialize like plain strings.
    let base = match base.split_once("<=") {
        Some((head @ ("string" | "wstring"), bound)) => {
            parse_bound(bound, token)?;
            head
        }
        Some(_) => return Err(format!("only strings may carry a length bound: {token:?}")),
        None => base,
    };

    let field_type = match PrimitiveType::parse(base) {
        Some(primitive) => FieldType::Primitive(primitive),
        None => FieldType::Complex(resolve_complex(base, package)),
    };
    Ok((field_type, array))
}

fn parse_bound(text: &str, token: &str) -> Result<usize, String> {
    text.trim()
        .parse()
        .map_err(|_| format!("bad array bound in {token:?}"))
}

fn resolve_complex(base: &str, package: &str) -> String {
    match base {
        "Header" => "std_msgs/msg/Header".to_string(),
        "time" => TIME_TYPE.to_string(),
        "duration" => DURATION_TYPE.to_string(),
        _ if base.contains('/') => normalize_type_name(base),
        _ => format!("{package}/msg/{base}"),
    }
}

/// `pkg/Type` and `pkg/msg/Type` name the same message.
pub fn normalize_type_name(name: &str) -> String {
    let parts: Vec<&str> = name.trim().split('/').collect();
    match parts.as_slice() {
        [package, ty] => format!("{package}/msg/{ty}"),
        _ => name.trim().to_string(),
    }
}

/// Registry of message layouts keyed by fully qualified type name.
#[derive(Debug, Clone, Default)]
pub struct MessageDefinitions {
    by_name: HashMap<String, Arc<MessageDefinition>>,
}

impl MessageDefinitions {
    /// An empty registry. Most callers want [`with_builtins`](Self::with_builtins).
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut defs = Self::new();
        for (name, text) in BUILTINS {
            if let Ok(def) = MessageDefinition::parse(name, text) {
                defs.insert(def);
            }
        }
        defs
    }

    /// Parses and registers one `.msg` definition, replacing any previous
    /// layout for the same type.
    pub fn register(&mut self, type_name: &str, text: &str) -> Result<(), DecodeError> {
        let def = MessageDefinition::parse(type_name, text)?;
        self.insert(def);
        Ok(())
    }

    pub fn insert(&mut self, def: MessageDefinition) {
        self.by_name.insert(def.type_name.clone(), Arc::new(def));
    }

    pub fn get(&self, type_name: &str) -> Option<&Arc<MessageDefinition>> {
        self.by_name
            .get(type_name)
            .or_else(|| self.by_name.get(&normalize_type_name(type_name)))
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.get(type_name).is_some()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_parse() {
        let defs = MessageDefinitions::with_builtins();
        assert_eq!(defs.len(), BUILTINS.len());
        let log = defs.get("rcl_interfaces/msg/Log").unwrap();
        let names: Vec<&str> = log.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["stamp", "level", "name", "msg", "file", "function", "line"]);
        assert_eq!(log.fields[0].field_type, FieldType::Complex(TIME_TYPE.into()));
        assert!(defs.contains("std_msgs/String"));
    }

    #[test]
    fn parses_arrays_bounds_and_defaults() {
        let def = MessageDefinition::parse(
            "demo/Sample",
            "uint8[] raw\nfloat64[3] xyz\nstring<=8[<=4] tags\nint32 count 5\nPoint origin\ngeometry_msgs/Vector3 v\n",
        )
        .unwrap();
        assert_eq!(def.type_name, "demo/msg/Sample");
        assert_eq!(def.fields[0].array, Some(ArrayKind::Unbounded));
        assert_eq!(def.fields[1].array, Some(ArrayKind::Fixed(3)));
        assert_eq!(def.fields[2].array, Some(ArrayKind::Bounded(4)));
        assert_eq!(def.fields[2].field_type, FieldType::Primitive(PrimitiveType::String));
        assert_eq!(def.fields[3].name, "count");
        assert_eq!(def.fields[4].field_type, FieldType::Complex("demo/msg/Point".into()));
        assert_eq!(
            def.fields[5].field_type,
            FieldType::Complex("geometry_msgs/msg/Vector3".into())
        );
    }

    #[test]
    fn skips_constants_and_comments() {
        let def = MessageDefinition::parse(
            "demo/msg/Consts",
            "# header comment\nint32 A=1\nstring B = \"x#y\"\nint32 value # trailing\n",
        )
        .unwrap();
        assert_eq!(def.fields.len(), 1);
        assert_eq!(def.fields[0].name, "value");
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!(matches!(
            MessageDefinition::parse("demo/Bad", "int32"),
            Err(DecodeError::InvalidDefinition { .. })
        ));
        assert!(MessageDefinition::parse("demo/Bad", "int32[x] values").is_err());
        assert!(MessageDefinition::parse("demo/Bad", "int32<=3 value").is_err());
    }
}
