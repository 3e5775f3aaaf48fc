use pop_shared::PopError;
use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("channel {0} does not exist")]
    UnknownChannel(String),

    #[error("channel {0} already exists")]
    DuplicateChannel(String),

    #[error("message {0} is already stored")]
    DuplicateMessage(String),

    #[error("rumor {rumor_id} from {sender} is already stored")]
    DuplicateRumor { sender: String, rumor_id: u64 },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for PopError {
    fn from(err: StoreError) -> Self {
        match &err {
            StoreError::UnknownChannel(_) => PopError::invalid_resource(err),
            StoreError::DuplicateChannel(_)
            | StoreError::DuplicateMessage(_)
            | StoreError::DuplicateRumor { .. } => PopError::duplicate_resource(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pop_shared::ErrorCode;

    #[test]
    fn test_into_pop_error() {
        let err: PopError = StoreError::UnknownChannel("/root/x".into()).into();
        assert_eq!(err.code, ErrorCode::InvalidResource);
        assert_eq!(err.description, "invalid resource: channel /root/x does not exist");

        let err: PopError = StoreError::DuplicateChannel("/root/x".into()).into();
        assert_eq!(err.code, ErrorCode::DuplicateResource);
    }
}
