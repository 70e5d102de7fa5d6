//! Dynamic field values exchanged through the generic get/set path.

use std::collections::BTreeMap;

use crate::entity::GenericEntity;

/// A field value read from or written to an entity.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Str(String),
    Ints(Vec<i64>),
    Floats(Vec<f64>),
    List(Vec<Value>),
    Entity(GenericEntity),
    Entities(Vec<GenericEntity>),
    /// Whole-record and multi-field reads, keyed by upper-cased field name
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Ints(_) => "int vector",
            Value::Floats(_) => "float vector",
            Value::List(_) => "list",
            Value::Entity(_) => "entity",
            Value::Entities(_) => "entity list",
            Value::Map(_) => "map",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Float(v) => whole(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Numeric vector view of `Floats`, `Ints` or a list of numbers.
    pub fn as_floats(&self) -> Option<Vec<f64>> {
        match self {
            Value::Floats(values) => Some(values.clone()),
            Value::Ints(values) => Some(values.iter().map(|v| *v as f64).collect()),
            Value::List(items) => items.iter().map(Value::as_float).collect(),
            _ => None,
        }
    }

    pub fn as_ints(&self) -> Option<Vec<i64>> {
        match self {
            Value::Ints(values) => Some(values.clone()),
            Value::Floats(values) => values
                .iter()
                .map(|v| whole(*v))
                .collect(),
            Value::List(items) => items.iter().map(Value::as_int).collect(),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<&GenericEntity> {
        match self {
            Value::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    pub fn as_entities(&self) -> Option<&[GenericEntity]> {
        match self {
            Value::Entities(entities) => Some(entities),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Field lookup in a `Map` value.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.as_map()
            .and_then(|map| map.get(&name.to_ascii_uppercase()))
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn list<T: std::fmt::Display>(
            f: &mut std::fmt::Formatter<'_>,
            items: &[T],
        ) -> std::fmt::Result {
            f.write_str("[")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{item}")?;
            }
            f.write_str("]")
        }

        match self {
            Value::Null => f.write_str("null"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(text) => f.write_str(text),
            Value::Ints(values) => list(f, values),
            Value::Floats(values) => list(f, values),
            Value::List(items) => list(f, items),
            Value::Entity(entity) => write!(f, "{entity}"),
            Value::Entities(entities) => list(f, entities),
            Value::Map(map) => {
                f.write_str("{")?;
                for (i, (name, value)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}: {value}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::Floats(v)
    }
}

impl From<Vec<i64>> for Value {
    fn from(v: Vec<i64>) -> Self {
        Value::Ints(v)
    }
}

impl<const N: usize> From<[f64; N]> for Value {
    fn from(v: [f64; N]) -> Self {
        Value::Floats(v.to_vec())
    }
}

impl From<GenericEntity> for Value {
    fn from(v: GenericEntity) -> Self {
        Value::Entity(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

/// `v` as an integer when it is whole and inside the `i64` range.
fn whole(v: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive.
    let in_range = v >= i64::MIN as f64 && v < i64::MAX as f64;
    (v.is_finite() && v.fract() == 0.0 && in_range).then_some(v as i64)
}
