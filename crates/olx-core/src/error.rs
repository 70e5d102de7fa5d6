//! Unified error type for the access layer.
//!
//! Every fallible operation in `olx-core` and `olx-fault` returns [`OlxResult`].
//! Lookup failures ([`OlxError::NotFound`]) are kept apart from malformed keys
//! ([`OlxError::InvalidKey`]) so that `Session::find` can turn the former into
//! `Ok(None)`.
//!
//! # Example
//!
//! ```ignore
//! use olx_core::{EntityKind, Key, OlxResult, Session};
//!
//! fn bus_name(session: &Session) -> OlxResult<String> {
//!     let bus = session.resolve(EntityKind::Bus, &Key::parse("[BUS] 'NEVADA' 132 kV"))?;
//!     Ok(bus.get(session, "NAME")?.to_string())
//! }
//! ```

use thiserror::Error;

use crate::kind::EntityKind;
use crate::report::ValidationReport;

/// Error type for all access-layer operations.
#[derive(Error, Debug)]
pub enum OlxError {
    /// Key resolution found nothing.
    #[error("{kind} not found: {key}")]
    NotFound { kind: EntityKind, key: String },

    /// Key has the wrong shape or names an object of another kind.
    #[error("invalid {kind} key: {reason}")]
    InvalidKey { kind: EntityKind, reason: String },

    /// Field value has the wrong type or shape.
    #[error("type mismatch for {field}: expected {expected}, got {actual}")]
    TypeMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    /// Field cannot be written through the generic path.
    #[error("{kind}.{field} is read-only")]
    ReadOnlyField { kind: EntityKind, field: String },

    /// Field name is not part of the kind's schema.
    #[error("{kind} has no field '{field}'. Valid names: {}", valid.join(", "))]
    UnknownField {
        kind: EntityKind,
        field: String,
        valid: Vec<String>,
    },

    /// The network was closed, reopened or replaced after the object was created.
    #[error("stale {kind} handle: the network session has changed since it was created")]
    StaleHandle { kind: EntityKind },

    /// Stale fault result (session changed or results were cleared).
    #[error("stale fault result #{index}: {reason}")]
    StaleResult { index: usize, reason: String },

    /// No network is open.
    #[error("no network is open")]
    SessionClosed,

    /// Object was deleted through this instance.
    #[error("{kind} has been deleted")]
    Deleted { kind: EntityKind },

    /// Scenario, outage or argument validation failed.
    #[error("{0}")]
    ValidationFailed(ValidationReport),

    /// The engine rejected a call; `message` is its last-error text.
    #[error("engine failure during {operation}: {message}")]
    Engine { operation: String, message: String },

    /// Operation is not defined for this kind.
    #[error("{operation} is not supported for {kind}")]
    Unsupported {
        kind: EntityKind,
        operation: &'static str,
    },

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Parsing/deserialization errors
    #[error("parse error: {0}")]
    Parse(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for Results using OlxError.
pub type OlxResult<T> = Result<T, OlxError>;

impl OlxError {
    /// True for the "looked up but absent" case.
    pub fn is_not_found(&self) -> bool {
        matches!(self, OlxError::NotFound { .. })
    }

    /// True when the failure comes from session lifetime (stale or closed).
    pub fn is_stale(&self) -> bool {
        matches!(
            self,
            OlxError::StaleHandle { .. } | OlxError::StaleResult { .. } | OlxError::SessionClosed
        )
    }

    pub(crate) fn mismatch(
        field: impl Into<String>,
        expected: impl Into<String>,
        actual: impl std::fmt::Display,
    ) -> Self {
        OlxError::TypeMismatch {
            field: field.into(),
            expected: expected.into(),
            actual: actual.to_string(),
        }
    }
}

impl From<anyhow::Error> for OlxError {
    fn from(err: anyhow::Error) -> Self {
        OlxError::Parse(format!("{err:#}"))
    }
}

impl From<serde_json::Error> for OlxError {
    fn from(err: serde_json::Error) -> Self {
        OlxError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = OlxError::Engine {
            operation: "write R".into(),
            message: "value out of range".into(),
        };
        assert!(err.to_string().contains("write R"));
        assert!(err.to_string().contains("value out of range"));
    }

    #[test]
    fn test_unknown_field_lists_valid_names() {
        let err = OlxError::UnknownField {
            kind: EntityKind::Bus,
            field: "NAEM".into(),
            valid: vec!["KV".into(), "NAME".into()],
        };
        let text = err.to_string();
        assert!(text.contains("NAEM"));
        assert!(text.contains("KV, NAME"));
    }

    #[test]
    fn test_not_found_is_distinguished() {
        let err = OlxError::NotFound {
            kind: EntityKind::Line,
            key: "x".into(),
        };
        assert!(err.is_not_found());
        assert!(!OlxError::SessionClosed.is_not_found());
        assert!(OlxError::SessionClosed.is_stale());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: OlxError = io_err.into();
        assert!(matches!(err, OlxError::Io(_)));
    }
}
