//! Field-attributed validation errors.
//!
//! Every check in the engine reports what it rejected as a
//! `ValidationError` naming the field path, the offending value, and the
//! reason. Lists are always accumulated in full; nothing here stops at the
//! first failure.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// FieldPath
// ---------------------------------------------------------------------------

/// Dotted path to a field, e.g. `securityContext.capabilities.add[1]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldPath(String);

impl FieldPath {
    pub fn new(root: &str) -> Self {
        Self(root.to_string())
    }

    pub fn child(&self, name: &str) -> Self {
        if self.0.is_empty() {
            Self(name.to_string())
        } else {
            Self(format!("{}.{}", self.0, name))
        }
    }

    pub fn index(&self, index: usize) -> Self {
        Self(format!("{}[{}]", self.0, index))
    }

    pub fn key(&self, key: &str) -> Self {
        Self(format!("{}[{}]", self.0, key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ValidationError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorType {
    /// A required field was absent.
    Required,
    /// The value is present but not permitted.
    Invalid,
    /// The value is not one of an enumerated set.
    NotSupported,
    /// The field may not be set at all.
    Forbidden,
    /// A collaborator failed while the field was being checked.
    InternalError,
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorType::Required => write!(f, "Required value"),
            ErrorType::Invalid => write!(f, "Invalid value"),
            ErrorType::NotSupported => write!(f, "Unsupported value"),
            ErrorType::Forbidden => write!(f, "Forbidden"),
            ErrorType::InternalError => write!(f, "Internal error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub error_type: ErrorType,
    pub field: FieldPath,
    /// Rendered offending value; empty when the field was absent.
    pub bad_value: String,
    pub detail: String,
}

impl ValidationError {
    pub fn required(field: FieldPath, detail: impl Into<String>) -> Self {
        Self {
            error_type: ErrorType::Required,
            field,
            bad_value: String::new(),
            detail: detail.into(),
        }
    }

    pub fn invalid(field: FieldPath, value: impl fmt::Display, detail: impl Into<String>) -> Self {
        Self {
            error_type: ErrorType::Invalid,
            field,
            bad_value: value.to_string(),
            detail: detail.into(),
        }
    }

    pub fn not_supported(field: FieldPath, value: impl fmt::Display, valid: &[String]) -> Self {
        let quoted: Vec<String> = valid.iter().map(|v| format!("\"{}\"", v)).collect();
        Self {
            error_type: ErrorType::NotSupported,
            field,
            bad_value: value.to_string(),
            detail: format!("supported values: {}", quoted.join(", ")),
        }
    }

    pub fn forbidden(field: FieldPath, detail: impl Into<String>) -> Self {
        Self {
            error_type: ErrorType::Forbidden,
            field,
            bad_value: String::new(),
            detail: detail.into(),
        }
    }

    pub fn internal(field: FieldPath, detail: impl Into<String>) -> Self {
        Self {
            error_type: ErrorType::InternalError,
            field,
            bad_value: String::new(),
            detail: detail.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.error_type)?;
        if matches!(self.error_type, ErrorType::Invalid | ErrorType::NotSupported) {
            write!(f, ": \"{}\"", self.bad_value)?;
        }
        if !self.detail.is_empty() {
            write!(f, ": {}", self.detail)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ValidationErrorList
// ---------------------------------------------------------------------------

/// Ordered, append-only collection of validation errors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrorList(Vec<ValidationError>);

impl ValidationErrorList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, error: ValidationError) {
        self.0.push(error);
    }

    pub fn extend(&mut self, other: ValidationErrorList) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ValidationError> {
        self.0.iter()
    }

    pub fn has_type(&self, error_type: ErrorType) -> bool {
        self.0.iter().any(|e| e.error_type == error_type)
    }

    /// Prefixes every detail with the policy that produced it, so errors
    /// from several candidates can be merged without losing attribution.
    pub fn attributed_to(mut self, policy: &str) -> Self {
        for error in &mut self.0 {
            error.detail = if error.detail.is_empty() {
                format!("policy \"{}\"", policy)
            } else {
                format!("policy \"{}\": {}", policy, error.detail)
            };
        }
        self
    }

    pub fn into_vec(self) -> Vec<ValidationError> {
        self.0
    }
}

impl From<ValidationError> for ValidationErrorList {
    fn from(error: ValidationError) -> Self {
        Self(vec![error])
    }
}

impl From<Vec<ValidationError>> for ValidationErrorList {
    fn from(errors: Vec<ValidationError>) -> Self {
        Self(errors)
    }
}

impl FromIterator<ValidationError> for ValidationErrorList {
    fn from_iter<I: IntoIterator<Item = ValidationError>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for ValidationErrorList {
    type Item = ValidationError;
    type IntoIter = std::vec::IntoIter<ValidationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ValidationErrorList {
    type Item = &'a ValidationError;
    type IntoIter = std::slice::Iter<'a, ValidationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for ValidationErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.0.iter().map(|e| e.to_string()).collect();
        write!(f, "[{}]", rendered.join(", "))
    }
}
