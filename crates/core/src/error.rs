//! Error taxonomy for command parsing and validation.

/// Errors produced while turning raw command text into a canonical
/// [`crate::request::Request`].
///
/// Every variant is reported back to the requester verbatim, so messages
/// name the offending key or field and the accepted range/set.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// Malformed command text (e.g. an unterminated `<` bracket).
    #[error("Parse error: {0}")]
    Parse(String),

    /// A `Key:<...>` token whose key is not in the recognized set,
    /// including character-indexed keys with an out-of-range index.
    #[error("Unrecognized parameter: {0}")]
    UnknownParameter(String),

    /// A recognized field carrying an out-of-range or malformed value,
    /// a missing required field, or a cross-field conflict.
    #[error("Invalid {field}: {reason}")]
    Validation { field: String, reason: String },
}

impl RequestError {
    /// Build a field-scoped validation error.
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_names_field_and_reason() {
        let err = RequestError::validation("步数", "must be between 1 and 28");
        assert_eq!(err.to_string(), "Invalid 步数: must be between 1 and 28");
    }

    #[test]
    fn unknown_parameter_names_key() {
        let err = RequestError::UnknownParameter("画风".to_string());
        assert!(err.to_string().contains("画风"));
    }
}
