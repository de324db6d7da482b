//! Fluent input validation
//!
//! Collects every problem with a piece of user input instead of stopping at
//! the first one, so a form can highlight all offending fields at once.
//!
//! # Example
//!
//! ```rust
//! use fixmyarea_core::validation::Validator;
//!
//! let result = Validator::new()
//!     .required("description", "Pothole on Main St")
//!     .required("category", "")
//!     .max_chars("description", "Pothole on Main St", 2000)
//!     .finish();
//!
//! assert!(!result.is_valid());
//! assert_eq!(result.errors()[0].field, "category");
//! ```

use crate::error::{Error, ErrorCode, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single failed check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    /// Field that failed validation
    pub field: String,
    /// Human-readable message
    pub message: String,
    /// Stable machine-readable code (`REQUIRED`, `MAX_LENGTH`, ...)
    pub code: String,
}

impl FieldError {
    fn new(field: &str, code: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
            code: code.to_string(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validation outcome: errors block, warnings are informational
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    errors: Vec<FieldError>,
    warnings: Vec<FieldError>,
}

impl ValidationResult {
    /// Check if validation passed
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// All blocking problems
    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    /// All non-blocking remarks
    pub fn warnings(&self) -> &[FieldError] {
        &self.warnings
    }

    /// One-line summary of the errors
    pub fn summary(&self) -> String {
        self.errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Convert to the crate's error type
    pub fn into_result(self) -> Result<Vec<FieldError>> {
        if self.is_valid() {
            Ok(self.warnings)
        } else {
            Err(Error::new(
                ErrorCode::ValidationError,
                format!("Validation failed: {}", self.summary()),
            ))
        }
    }
}

/// Fluent validator builder
#[derive(Debug, Default)]
pub struct Validator {
    result: ValidationResult,
}

impl Validator {
    /// Create a new validator
    pub fn new() -> Self {
        Self::default()
    }

    /// The value must contain something other than whitespace
    #[must_use]
    pub fn required(mut self, field: &str, value: &str) -> Self {
        if value.trim().is_empty() {
            self.result
                .errors
                .push(FieldError::new(field, "REQUIRED", "Field is required"));
        }
        self
    }

    /// At most `max` characters (not bytes)
    #[must_use]
    pub fn max_chars(mut self, field: &str, value: &str, max: usize) -> Self {
        let len = value.chars().count();
        if len > max {
            self.result.errors.push(FieldError::new(
                field,
                "MAX_LENGTH",
                format!("Must be at most {max} characters (got {len})"),
            ));
        }
        self
    }

    /// Inclusive numeric range
    #[must_use]
    pub fn range(mut self, field: &str, value: f64, min: f64, max: f64) -> Self {
        if !(min..=max).contains(&value) {
            self.result.errors.push(FieldError::new(
                field,
                "RANGE",
                format!("Must be between {min} and {max}"),
            ));
        }
        self
    }

    /// Warn, without failing, when the value is not a known one
    #[must_use]
    pub fn known_value(mut self, field: &str, value: &str, known: &[&str]) -> Self {
        if !value.is_empty() && !known.contains(&value) {
            self.result.warnings.push(FieldError::new(
                field,
                "UNKNOWN_VALUE",
                format!("'{value}' is not one of: {}", known.join(", ")),
            ));
        }
        self
    }

    /// Arbitrary check; `f` returns the error message when it fails
    #[must_use]
    pub fn custom<F>(mut self, field: &str, f: F) -> Self
    where
        F: FnOnce() -> Option<String>,
    {
        if let Some(message) = f() {
            self.result
                .errors
                .push(FieldError::new(field, "CUSTOM", message));
        }
        self
    }

    /// Finish and return the collected result
    pub fn finish(self) -> ValidationResult {
        self.result
    }
}
