//! Validation helpers on top of `validator`.

use crate::BastionError;
use validator::{Validate, ValidationError, ValidationErrors};

/// Extension trait for validation.
pub trait ValidateExt: Validate {
    /// Validates the struct and returns a `BastionError` on failure.
    fn validate_input(&self) -> Result<(), BastionError> {
        self.validate().map_err(validation_errors_to_error)
    }
}

impl<T: Validate> ValidateExt for T {}

/// Flattens field errors into a single `field: message; ...` validation error.
#[must_use]
pub fn validation_errors_to_error(errors: ValidationErrors) -> BastionError {
    let mut messages: Vec<String> = errors
        .field_errors()
        .iter()
        .flat_map(|(field, errors)| {
            errors.iter().map(move |error| {
                let message = error
                    .message
                    .as_ref()
                    .map_or_else(|| error.code.to_string(), ToString::to_string);
                format!("{field}: {message}")
            })
        })
        .collect();
    messages.sort();

    BastionError::Validation(messages.join("; "))
}

/// Canonical form of a username or email: trimmed and lowercased.
///
/// Stored values, lookups and index cache keys all use this form, so two
/// spellings that find the same row also share one cache key.
#[must_use]
pub fn normalize_identifier(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Rejects identifiers that would break cache-key framing.
///
/// Index values are embedded verbatim in `cache:<entity>:<field>:<value>`
/// keys, so whitespace and glob metacharacters are not allowed.
pub fn key_safe(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("not_blank"));
    }
    if value.chars().any(|c| c.is_whitespace() || matches!(c, '*' | '?' | '[' | ']')) {
        return Err(ValidationError::new("key_unsafe"));
    }
    Ok(())
}
