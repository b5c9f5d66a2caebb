use crate::shared::error::AppError;
use crate::shared::validation::ValidationFailureKind;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MutationError {
    /// 楽観的更新の前に拒否された（ロールバック不要）
    #[error("Mutation precondition violated: {0}")]
    PreconditionViolation(#[source] AppError),
    /// リモート操作の失敗（楽観的更新はロールバック済み）
    #[error("Remote {operation} failed: {source}")]
    RemoteFailure {
        operation: &'static str,
        #[source]
        source: AppError,
    },
    /// ミューテーションのタスク自体が完了しなかった（パニック等）
    #[error("Mutation task did not complete: {0}")]
    TaskFailed(String),
}

impl MutationError {
    pub fn remote(operation: &'static str, source: AppError) -> Self {
        MutationError::RemoteFailure { operation, source }
    }

    pub fn precondition(source: AppError) -> Self {
        MutationError::PreconditionViolation(source)
    }

    pub fn is_remote_failure(&self) -> bool {
        matches!(self, MutationError::RemoteFailure { .. })
    }

    /// 入力検証で拒否された場合の失敗理由
    pub fn validation_kind(&self) -> Option<ValidationFailureKind> {
        match self {
            MutationError::PreconditionViolation(source) => source.validation_kind(),
            _ => None,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            MutationError::PreconditionViolation(source)
            | MutationError::RemoteFailure { source, .. } => source.user_message(),
            MutationError::TaskFailed(_) => "Something went wrong. Please try again.".to_string(),
        }
    }
}
