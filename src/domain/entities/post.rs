use crate::domain::value_objects::{PermanentId, PostId, TemporaryId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub author_id: UserId,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl Post {
    /// 楽観的表示用の投稿を作成（一時IDとクライアント時刻を使用）
    pub fn pending(id: TemporaryId, author_id: UserId, message: String) -> Self {
        Self {
            id: PostId::Temporary(id),
            author_id,
            message,
            created_at: Utc::now(),
        }
    }

    pub fn new_with_id(
        id: PermanentId,
        author_id: UserId,
        message: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PostId::Permanent(id),
            author_id,
            message,
            created_at,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.id.is_temporary()
    }
}
