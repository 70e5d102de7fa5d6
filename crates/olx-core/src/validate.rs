//! Value coercion and shape checks.
//!
//! Field writes and fault scenarios share these checks. The `expect_*`
//! helpers return a [`ValidationIssue`] so that callers collecting a
//! [`crate::report::ValidationReport`] can keep going; a lone issue converts
//! into `OlxError::TypeMismatch`.

use crate::engine::FieldBuffer;
use crate::error::{OlxError, OlxResult};
use crate::handle::Handle;
use crate::key::Key;
use crate::kind::EntityKind;
use crate::report::ValidationIssue;
use crate::schema::{special_codes, FieldSchema, ValueKind};
use crate::session::Session;
use crate::value::Value;

impl From<ValidationIssue> for OlxError {
    fn from(issue: ValidationIssue) -> Self {
        OlxError::TypeMismatch {
            field: issue.field,
            expected: issue.expected,
            actual: issue.actual,
        }
    }
}

fn issue(field: &str, expected: impl Into<String>, actual: impl std::fmt::Display) -> ValidationIssue {
    ValidationIssue {
        field: field.to_string(),
        expected: expected.into(),
        actual: actual.to_string(),
    }
}

/// `one of A, B, C`
pub fn one_of<T: std::fmt::Display>(allowed: &[T]) -> String {
    let items: Vec<String> = allowed.iter().map(ToString::to_string).collect();
    format!("one of {}", items.join(", "))
}

/// Case-sensitive membership of a code string in an allowed set.
pub fn expect_member(field: &str, actual: &str, allowed: &[&str]) -> Result<(), ValidationIssue> {
    if allowed.contains(&actual) {
        Ok(())
    } else {
        Err(issue(field, one_of(allowed), format!("\"{actual}\"")))
    }
}

pub fn expect_code(field: &str, actual: i64, allowed: &[i64]) -> Result<(), ValidationIssue> {
    if allowed.contains(&actual) {
        Ok(())
    } else {
        Err(issue(field, one_of(allowed), actual))
    }
}

/// Numeric vector whose length is one of `lengths`.
pub fn expect_len(field: &str, values: &[f64], lengths: &[usize]) -> Result<(), ValidationIssue> {
    if !lengths.contains(&values.len()) {
        let expected = match lengths {
            [n] => format!("{n} numbers"),
            _ => format!("{} numbers", one_of(lengths)),
        };
        return Err(issue(field, expected, format!("{} numbers", values.len())));
    }
    if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
        return Err(issue(field, "finite numbers", bad));
    }
    Ok(())
}

/// Fixed-length vector of 0/1 flags.
pub fn expect_flags(field: &str, flags: &[i64], len: usize) -> Result<(), ValidationIssue> {
    if flags.len() != len {
        return Err(issue(field, format!("{len} flags of 0 or 1"), format!("{} flags", flags.len())));
    }
    match flags.iter().find(|f| !matches!(f, 0 | 1)) {
        Some(bad) => Err(issue(field, "flags of 0 or 1", bad)),
        None => Ok(()),
    }
}

pub fn expect_non_negative(field: &str, value: f64) -> Result<(), ValidationIssue> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(issue(field, "a value >= 0", value))
    }
}

/// Exclusive range check, `low < value < high`.
pub fn expect_between(field: &str, value: f64, low: f64, high: f64) -> Result<(), ValidationIssue> {
    if value > low && value < high {
        Ok(())
    } else {
        Err(issue(field, format!("a value strictly between {low} and {high}"), value))
    }
}

/// Convert `value` into the engine buffer for `field` of `kind`.
///
/// Cross-references are resolved through the session; nothing is written.
pub fn coerce(
    session: &Session,
    kind: EntityKind,
    field: &FieldSchema,
    value: &Value,
) -> OlxResult<FieldBuffer> {
    let name = field.name.as_str();
    let buffer = match field.kind {
        ValueKind::Str => match value {
            Value::Str(text) => FieldBuffer::Text(text.clone()),
            other => return Err(issue(name, "string", other.type_name()).into()),
        },
        ValueKind::Int => FieldBuffer::Int(int(name, value)?),
        ValueKind::Float => FieldBuffer::Float(float(name, value)?),
        ValueKind::FloatVec(len) => {
            let values = value
                .as_floats()
                .ok_or_else(|| issue(name, format!("{len} numbers"), value.type_name()))?;
            expect_len(name, &values, &[len])?;
            FieldBuffer::Floats(values)
        }
        ValueKind::IntVec(len) => {
            let values = value
                .as_ints()
                .ok_or_else(|| issue(name, format!("{len} integers"), value.type_name()))?;
            if values.len() != len {
                return Err(issue(name, format!("{len} integers"), format!("{} integers", values.len())).into());
            }
            FieldBuffer::Ints(values)
        }
        ValueKind::Code(allowed) => {
            let code = int(name, value)?;
            expect_code(name, code, allowed)?;
            FieldBuffer::Int(code)
        }
        ValueKind::Ref(kinds) => FieldBuffer::Handle(reference(session, name, kinds, value)?),
        ValueKind::RefList(kinds) => {
            let items: Vec<Value> = match value {
                Value::Entities(entities) => entities.iter().cloned().map(Value::Entity).collect(),
                Value::List(items) => items.clone(),
                Value::Null => Vec::new(),
                single => vec![single.clone()],
            };
            let mut handles = Vec::with_capacity(items.len());
            for item in &items {
                let handle = reference(session, name, kinds, item)?;
                if !handles.contains(&handle) {
                    handles.push(handle);
                }
            }
            FieldBuffer::Handles(handles)
        }
        ValueKind::Composite(target) => {
            if !matches!(value, Value::List(_) | Value::Entity(_) | Value::Str(_)) {
                return Err(issue(name, format!("a {target} key"), value.type_name()).into());
            }
            FieldBuffer::Handle(reference(session, name, &[target], value)?)
        }
        ValueKind::Derived(_) => {
            return Err(OlxError::ReadOnlyField {
                kind,
                field: name.to_string(),
            })
        }
    };
    if let (Some(allowed), FieldBuffer::Int(code)) = (special_codes(kind, name), &buffer) {
        expect_code(name, *code, allowed)?;
    }
    Ok(buffer)
}

fn int(field: &str, value: &Value) -> Result<i64, ValidationIssue> {
    value
        .as_int()
        .ok_or_else(|| issue(field, "integer", value))
}

fn float(field: &str, value: &Value) -> Result<f64, ValidationIssue> {
    match value.as_float() {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(issue(field, "number", value)),
    }
}

/// Resolve a cross-reference to one of `kinds`, first match wins.
fn reference(
    session: &Session,
    field: &str,
    kinds: &[EntityKind],
    value: &Value,
) -> OlxResult<Handle> {
    if let Value::Entity(entity) = value {
        if !kinds.contains(&entity.kind()) {
            return Err(issue(field, format!("a reference to {}", one_of(kinds)), entity.kind()).into());
        }
    }
    let key = Key::from_value(value)?;
    let mut last = None;
    for kind in kinds {
        match session.resolve(*kind, &key) {
            Ok(entity) => return Ok(entity.handle()),
            Err(err) if err.is_not_found() || matches!(err, OlxError::InvalidKey { .. }) => {
                last = Some(err)
            }
            Err(err) => return Err(err),
        }
    }
    Err(last.unwrap_or_else(|| OlxError::NotFound {
        kind: kinds.first().copied().unwrap_or(EntityKind::Bus),
        key: key.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_issue_cites_allowed_set() {
        let err = expect_member("connection", "XX", &["3LG", "1LG:A"]).unwrap_err();
        assert_eq!(err.expected, "one of 3LG, 1LG:A");
        assert_eq!(err.actual, "\"XX\"");
    }

    #[test]
    fn test_length_and_flag_checks() {
        assert!(expect_len("impedance", &[0.1, 0.2], &[2]).is_ok());
        let err = expect_len("impedance", &[0.1], &[2]).unwrap_err();
        assert_eq!(err.actual, "1 numbers");
        assert!(expect_len("impedance", &[f64::NAN, 0.0], &[2]).is_err());
        assert!(expect_flags("flags", &[1, 0, 1, 1, 0], 5).is_ok());
        assert!(expect_flags("flags", &[1, 0, 2, 1, 0], 5).is_err());
        assert!(expect_flags("flags", &[1, 0], 5).is_err());
    }

    #[test]
    fn test_numeric_bounds() {
        assert!(expect_non_negative("y", 0.0).is_ok());
        assert!(expect_non_negative("y", -1.0).is_err());
        assert!(expect_between("percent", 50.0, 0.0, 100.0).is_ok());
        assert!(expect_between("percent", 100.0, 0.0, 100.0).is_err());
    }

    #[test]
    fn test_issue_converts_to_type_mismatch() {
        let err: OlxError = expect_code("POLAR", 5, &[0, 1]).unwrap_err().into();
        assert!(matches!(err, OlxError::TypeMismatch { ref field, .. } if field == "POLAR"));
    }
}
