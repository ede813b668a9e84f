use mcp_gateway::OperationError;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    /// Absent, or owned by another subject.
    #[error("todo {0} not found")]
    NotFound(Uuid),

    #[error("validation error on field '{field}': {message}")]
    Validation { field: String, message: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl DomainError {
    #[must_use]
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<DomainError> for OperationError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::NotFound(_) => Self::NotFound(e.to_string()),
            DomainError::Validation { .. } => Self::InvalidArguments(e.to_string()),
            DomainError::Internal(msg) => {
                tracing::error!(error = %msg, "todo operation failed");
                Self::Internal("internal error".to_owned())
            }
        }
    }
}
