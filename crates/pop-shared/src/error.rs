use std::fmt;

use thiserror::Error;

/// Stable error codes carried in JSON-RPC error answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidAction,
    InvalidResource,
    DuplicateResource,
    InvalidMessageField,
    AccessDenied,
    InternalServerError,
}

impl ErrorCode {
    pub fn as_i32(self) -> i32 {
        match self {
            Self::InvalidAction => -1,
            Self::InvalidResource => -2,
            Self::DuplicateResource => -3,
            Self::InvalidMessageField => -4,
            Self::AccessDenied => -5,
            Self::InternalServerError => -6,
        }
    }

    pub fn from_i32(code: i32) -> Option<Self> {
        match code {
            -1 => Some(Self::InvalidAction),
            -2 => Some(Self::InvalidResource),
            -3 => Some(Self::DuplicateResource),
            -4 => Some(Self::InvalidMessageField),
            -5 => Some(Self::AccessDenied),
            -6 => Some(Self::InternalServerError),
            _ => None,
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            Self::InvalidAction => "invalid action",
            Self::InvalidResource => "invalid resource",
            Self::DuplicateResource => "duplicate resource",
            Self::InvalidMessageField => "invalid message field",
            Self::AccessDenied => "access denied",
            Self::InternalServerError => "internal server error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_i32())
    }
}

/// A protocol-level failure, reported back to the sender of a query.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {description}")]
pub struct PopError {
    pub code: ErrorCode,
    pub description: String,
}

impl PopError {
    /// Build an error whose description starts with the code's prefix.
    pub fn new(code: ErrorCode, detail: impl fmt::Display) -> Self {
        Self {
            code,
            description: format!("{}: {}", code.prefix(), detail),
        }
    }

    pub fn invalid_action(detail: impl fmt::Display) -> Self {
        Self::new(ErrorCode::InvalidAction, detail)
    }

    pub fn invalid_resource(detail: impl fmt::Display) -> Self {
        Self::new(ErrorCode::InvalidResource, detail)
    }

    pub fn duplicate_resource(detail: impl fmt::Display) -> Self {
        Self::new(ErrorCode::DuplicateResource, detail)
    }

    pub fn invalid_message_field(detail: impl fmt::Display) -> Self {
        Self::new(ErrorCode::InvalidMessageField, detail)
    }

    pub fn access_denied(detail: impl fmt::Display) -> Self {
        Self::new(ErrorCode::AccessDenied, detail)
    }

    pub fn internal(detail: impl fmt::Display) -> Self {
        Self::new(ErrorCode::InternalServerError, detail)
    }

    pub fn is_duplicate(&self) -> bool {
        self.code == ErrorCode::DuplicateResource
    }
}

impl From<serde_json::Error> for PopError {
    fn from(err: serde_json::Error) -> Self {
        PopError::invalid_message_field(format_args!("failed to parse JSON: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_roundtrip() {
        for code in [
            ErrorCode::InvalidAction,
            ErrorCode::InvalidResource,
            ErrorCode::DuplicateResource,
            ErrorCode::InvalidMessageField,
            ErrorCode::AccessDenied,
            ErrorCode::InternalServerError,
        ] {
            assert_eq!(ErrorCode::from_i32(code.as_i32()), Some(code));
        }
        assert_eq!(ErrorCode::from_i32(-7), None);
    }

    #[test]
    fn test_description_prefix() {
        let err = PopError::duplicate_resource("message abc");
        assert_eq!(err.description, "duplicate resource: message abc");
        assert_eq!(err.to_string(), "-3: duplicate resource: message abc");
        assert!(err.is_duplicate());
    }
}
