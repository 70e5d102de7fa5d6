//! Structured validation reports.
//!
//! Validation collects every problem it finds before failing, so a caller sees
//! all offending fields at once. Each [`ValidationIssue`] names the field, the
//! expected shape and the actual value; the report renders one issue per line.
//!
//! # Example
//!
//! ```
//! use olx_core::report::ValidationReport;
//!
//! let mut report = ValidationReport::new("classical fault");
//! report.add("connection", "one of 3LG, 1LG:A", "\"XX\"");
//! assert_eq!(report.issue_count(), 1);
//! assert!(report.to_string().contains("connection"));
//! assert!(report.into_result(()).is_err());
//! ```

use serde::Serialize;

use crate::error::{OlxError, OlxResult};

/// A single validation finding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    /// Offending field (dotted path for nested specs, e.g. `outage.mode`)
    pub field: String,
    /// Human-readable description of the accepted shape
    pub expected: String,
    /// The value actually supplied
    pub actual: String,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: expected {}, got {}",
            self.field, self.expected, self.actual
        )
    }
}

/// Collection of validation issues for one subject (a scenario, an outage spec, ...).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    /// What was validated, used as the report heading
    pub subject: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            issues: Vec::new(),
        }
    }

    /// Record an issue.
    pub fn add(
        &mut self,
        field: impl Into<String>,
        expected: impl Into<String>,
        actual: impl std::fmt::Display,
    ) {
        self.issues.push(ValidationIssue {
            field: field.into(),
            expected: expected.into(),
            actual: actual.to_string(),
        });
    }

    /// Fold a nested report in, prefixing its fields with `prefix.`.
    pub fn absorb(&mut self, prefix: &str, other: ValidationReport) {
        for issue in other.issues {
            self.issues.push(ValidationIssue {
                field: format!("{prefix}.{}", issue.field),
                ..issue
            });
        }
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn issue_count(&self) -> usize {
        self.issues.len()
    }

    /// Find the first issue for a field.
    pub fn issue(&self, field: &str) -> Option<&ValidationIssue> {
        self.issues.iter().find(|issue| issue.field == field)
    }

    /// `Ok(value)` when clean, otherwise `ValidationFailed` carrying the report.
    pub fn into_result<T>(self, value: T) -> OlxResult<T> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(OlxError::ValidationFailed(self))
        }
    }
}

impl std::fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid {}:", self.subject)?;
        for issue in &self.issues {
            write!(f, "\n  {issue}")?;
        }
        Ok(())
    }
}
