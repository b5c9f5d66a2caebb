use serde::{Deserialize, Serialize};
use std::fmt;

use crate::shared::error::AppError;

/// 入力値のバリデーション失敗理由。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ValidationFailureKind {
    /// 空白のみ、または空の本文。
    ContentEmpty,
    /// 本文の文字数が上限を超過。
    ContentTooLarge,
    /// 空の識別子。
    IdentifierEmpty,
}

impl ValidationFailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationFailureKind::ContentEmpty => "content_empty",
            ValidationFailureKind::ContentTooLarge => "content_too_large",
            ValidationFailureKind::IdentifierEmpty => "identifier_empty",
        }
    }
}

impl fmt::Display for ValidationFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 投稿本文を正規化して検証する。前後の空白を除去した本文を返す。
///
/// 文字数はコードポイント単位で数える。
pub fn normalize_message(message: &str, max_chars: usize) -> Result<String, AppError> {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation(
            ValidationFailureKind::ContentEmpty,
            "Post message cannot be empty",
        ));
    }
    let length = trimmed.chars().count();
    if length > max_chars {
        return Err(AppError::validation(
            ValidationFailureKind::ContentTooLarge,
            format!("Post message is {length} characters; the limit is {max_chars}"),
        ));
    }
    Ok(trimmed.to_string())
}

/// 識別子が空白のみでないことを検証する。
pub fn require_identifier(value: &str, label: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::validation(
            ValidationFailureKind::IdentifierEmpty,
            format!("{label} cannot be empty"),
        ));
    }
    Ok(())
}
