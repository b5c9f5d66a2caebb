use crate::shared::validation::ValidationFailureKind;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AppError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Remote store error: {0}")]
    Remote(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error ({kind}): {message}")]
    ValidationError {
        kind: ValidationFailureKind,
        message: String,
    },
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(kind: ValidationFailureKind, message: impl Into<String>) -> Self {
        AppError::ValidationError {
            kind,
            message: message.into(),
        }
    }

    pub fn validation_kind(&self) -> Option<ValidationFailureKind> {
        match self {
            AppError::ValidationError { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// ユーザー向けに表示するための短いメッセージ
    pub fn user_message(&self) -> String {
        match self {
            AppError::Network(_) => "Could not reach the server. Please try again.".to_string(),
            AppError::Unauthorized(_) => "You need to sign in to do that.".to_string(),
            AppError::NotFound(_) => "That post no longer exists.".to_string(),
            AppError::ValidationError { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<String> for AppError {
    fn from(err: String) -> Self {
        AppError::Internal(err)
    }
}

impl From<&str> for AppError {
    fn from(err: &str) -> Self {
        AppError::Internal(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
