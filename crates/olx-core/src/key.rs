//! Polymorphic lookup keys.
//!
//! A [`Key`] is one of the accepted key shapes. Text is classified by
//! [`Key::parse`]:
//!
//! | text | key |
//! |---|---|
//! | `[BUS] 'NEVADA' 132 kV` | `Display` |
//! | `{6A3D...}` (braced 8-4-4-4-12 hex) | `Guid` |
//! | `12` | `Number` |
//! | `132.5` | `Real` |
//! | `LINE(BUS('NEVADA', 132), BUS('OHIO', 132), '1')` | `Composite` |
//! | anything else | `Name` |

use crate::entity::EntityRef;
use crate::error::{OlxError, OlxResult};
use crate::handle::Handle;
use crate::kind::EntityKind;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Key {
    Handle(Handle),
    Guid(String),
    /// Bracketed display string, `[TAG] body`
    Display(String),
    Name(String),
    Number(i64),
    Real(f64),
    /// Natural-key tuple, interpreted by the target kind's key shape
    Composite(Vec<Key>),
    Entity(EntityRef),
}

impl Key {
    pub fn parse(text: &str) -> Key {
        let text = text.trim();
        if text.starts_with('[') {
            return Key::Display(text.to_string());
        }
        if is_guid(text) {
            return Key::Guid(text.to_string());
        }
        if let Ok(number) = text.parse::<i64>() {
            return Key::Number(number);
        }
        if let Ok(real) = text.parse::<f64>() {
            if real.is_finite() {
                return Key::Real(real);
            }
        }
        if looks_like_ctor(text) {
            if let Ok((_, args)) = parse_ctor(text) {
                return Key::Composite(args);
            }
        }
        Key::Name(text.to_string())
    }

    /// Interpret a field value used as a cross-reference.
    pub fn from_value(value: &Value) -> OlxResult<Key> {
        match value {
            Value::Str(text) => Ok(Key::parse(text)),
            Value::Int(v) => Ok(Key::Number(*v)),
            Value::Float(v) => Ok(Key::Real(*v)),
            Value::Ints(values) => Ok(Key::Composite(
                values.iter().map(|v| Key::Number(*v)).collect(),
            )),
            Value::Floats(values) => Ok(Key::Composite(
                values.iter().map(|v| Key::Real(*v)).collect(),
            )),
            Value::List(items) => items
                .iter()
                .map(Key::from_value)
                .collect::<OlxResult<Vec<_>>>()
                .map(Key::Composite),
            Value::Entity(entity) => Ok(Key::Entity(entity.entity_ref())),
            other => Err(OlxError::mismatch(
                "key",
                "a key string, number, list or entity",
                other.type_name(),
            )),
        }
    }

    /// Text of a scalar key part (circuit ids, device ids, names).
    pub fn text(&self) -> Option<String> {
        match self {
            Key::Name(text) | Key::Guid(text) | Key::Display(text) => Some(text.clone()),
            Key::Number(v) => Some(v.to_string()),
            Key::Real(v) => Some(v.to_string()),
            _ => None,
        }
    }

    /// Numeric value of a scalar key part.
    pub fn number(&self) -> Option<f64> {
        match self {
            Key::Number(v) => Some(*v as f64),
            Key::Real(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<Handle> for Key {
    fn from(handle: Handle) -> Self {
        Key::Handle(handle)
    }
}

impl From<&str> for Key {
    fn from(text: &str) -> Self {
        Key::parse(text)
    }
}

impl From<Vec<Key>> for Key {
    fn from(parts: Vec<Key>) -> Self {
        Key::Composite(parts)
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Key::Handle(handle) => write!(f, "{handle}"),
            Key::Guid(text) | Key::Display(text) => f.write_str(text),
            Key::Name(text) => write!(f, "'{text}'"),
            Key::Number(v) => write!(f, "{v}"),
            Key::Real(v) => write!(f, "{v}"),
            Key::Composite(parts) => {
                f.write_str("[")?;
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{part}")?;
                }
                f.write_str("]")
            }
            Key::Entity(entity) => write!(f, "{} {}", entity.kind, entity.handle),
        }
    }
}

/// Braced GUID: `{xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx}`.
pub fn is_guid(text: &str) -> bool {
    let Some(inner) = text.strip_prefix('{').and_then(|t| t.strip_suffix('}')) else {
        return false;
    };
    let groups: Vec<&str> = inner.split('-').collect();
    groups.len() == 5
        && groups
            .iter()
            .zip([8, 4, 4, 4, 12])
            .all(|(group, len)| group.len() == len && group.chars().all(|c| c.is_ascii_hexdigit()))
}

fn looks_like_ctor(text: &str) -> bool {
    match text.find('(') {
        Some(open) => text.ends_with(')') && EntityKind::from_tag(&text[..open]).is_some(),
        None => false,
    }
}

/// Parse a constructor string such as `GENUNIT(BUS('NEVADA', 132), '1')`.
///
/// Nested constructors become `Composite` keys; quoted text becomes `Name`.
pub fn parse_ctor(text: &str) -> OlxResult<(EntityKind, Vec<Key>)> {
    let mut parser = CtorParser {
        src: text.as_bytes(),
        pos: 0,
    };
    let (kind, args) = parser.expr()?;
    parser.skip_ws();
    if parser.pos != parser.src.len() {
        return Err(parser.error("trailing text after constructor"));
    }
    Ok((kind, args))
}

struct CtorParser<'a> {
    src: &'a [u8],
    pos: usize,
}

impl CtorParser<'_> {
    fn error(&self, what: &str) -> OlxError {
        OlxError::Parse(format!("constructor string: {what} at offset {}", self.pos))
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, byte: u8) -> OlxResult<()> {
        self.skip_ws();
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", byte as char)))
        }
    }

    fn expr(&mut self) -> OlxResult<(EntityKind, Vec<Key>)> {
        self.skip_ws();
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_alphanumeric()) {
            self.pos += 1;
        }
        let tag = String::from_utf8_lossy(&self.src[start..self.pos]).into_owned();
        let kind = EntityKind::from_tag(&tag)
            .ok_or_else(|| self.error(&format!("unknown tag '{tag}'")))?;
        self.eat(b'(')?;
        let mut args = Vec::new();
        self.skip_ws();
        if self.peek() == Some(b')') {
            self.pos += 1;
            return Ok((kind, args));
        }
        loop {
            args.push(self.arg()?);
            self.skip_ws();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b')') => {
                    self.pos += 1;
                    return Ok((kind, args));
                }
                _ => return Err(self.error("expected ',' or ')'")),
            }
        }
    }

    fn arg(&mut self) -> OlxResult<Key> {
        self.skip_ws();
        match self.peek() {
            Some(b'\'') => self.quoted().map(Key::Name),
            Some(b) if b.is_ascii_digit() || b == b'-' || b == b'.' => self.number(),
            Some(b) if b.is_ascii_alphabetic() => {
                self.expr().map(|(_, args)| Key::Composite(args))
            }
            _ => Err(self.error("expected a value")),
        }
    }

    /// Single-quoted text; `''` stands for a literal quote.
    fn quoted(&mut self) -> OlxResult<String> {
        self.pos += 1;
        let mut bytes = Vec::new();
        loop {
            match self.peek() {
                Some(b'\'') if self.src.get(self.pos + 1) == Some(&b'\'') => {
                    bytes.push(b'\'');
                    self.pos += 2;
                }
                Some(b'\'') => {
                    self.pos += 1;
                    return Ok(String::from_utf8_lossy(&bytes).into_owned());
                }
                Some(b) => {
                    bytes.push(b);
                    self.pos += 1;
                }
                None => return Err(self.error("unterminated quote")),
            }
        }
    }

    fn number(&mut self) -> OlxResult<Key> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|b| b.is_ascii_digit() || matches!(b, b'-' | b'+' | b'.' | b'e' | b'E'))
        {
            self.pos += 1;
        }
        let text = String::from_utf8_lossy(&self.src[start..self.pos]).into_owned();
        if let Ok(v) = text.parse::<i64>() {
            return Ok(Key::Number(v));
        }
        text.parse::<f64>()
            .map(Key::Real)
            .map_err(|_| self.error(&format!("bad number '{text}'")))
    }
}

/// Quote text for a constructor string.
pub fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_classifies_text() {
        assert!(matches!(Key::parse("[BUS] 'NEVADA' 132 kV"), Key::Display(_)));
        assert!(matches!(
            Key::parse("{0000000A-0000-4000-8000-00000000000A}"),
            Key::Guid(_)
        ));
        assert_eq!(Key::parse(" 7 "), Key::Number(7));
        assert_eq!(Key::parse("13.8"), Key::Real(13.8));
        assert_eq!(Key::parse("NEVADA"), Key::Name("NEVADA".into()));
        assert_eq!(Key::parse("{not-a-guid}"), Key::Name("{not-a-guid}".into()));
    }

    #[test]
    fn test_parse_ctor_nests_composites() {
        let (kind, args) =
            parse_ctor("LINE(BUS('NEVADA', 132), BUS('OHIO', 132), '1')").unwrap();
        assert_eq!(kind, EntityKind::Line);
        assert_eq!(
            args,
            vec![
                Key::Composite(vec![Key::Name("NEVADA".into()), Key::Number(132)]),
                Key::Composite(vec![Key::Name("OHIO".into()), Key::Number(132)]),
                Key::Name("1".into()),
            ]
        );
        assert!(matches!(
            Key::parse("BUS('NEVADA', 13.8)"),
            Key::Composite(parts) if parts[1] == Key::Real(13.8)
        ));
    }

    #[test]
    fn test_parse_ctor_rejects_malformed_text() {
        assert!(parse_ctor("LINE(BUS('NEVADA', 132)").is_err());
        assert!(parse_ctor("WIDGET('x')").is_err());
        assert!(parse_ctor("BUS('x') extra").is_err());
        assert!(parse_ctor("BUS('x)").is_err());
    }

    #[test]
    fn test_quotes_round_trip() {
        let (_, args) = parse_ctor(&format!("BREAKER(BUS(1), {})", quote("O'HARE"))).unwrap();
        assert_eq!(args[1], Key::Name("O'HARE".into()));
    }

    #[test]
    fn test_from_value_builds_composites() {
        let value = Value::List(vec![Value::from("NEVADA"), Value::Float(132.0)]);
        assert_eq!(
            Key::from_value(&value).unwrap(),
            Key::Composite(vec![Key::Name("NEVADA".into()), Key::Real(132.0)])
        );
        assert!(Key::from_value(&Value::Null).is_err());
    }
}
