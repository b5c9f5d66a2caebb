use crate::domain::entities::{Post, Profile};
use crate::domain::value_objects::{PermanentId, UserId};
use crate::shared::error::AppError;
use async_trait::async_trait;

/// 投稿・プロフィール・いいねの永続化を担うリモートストアのポート
///
/// 一時IDはこのポートに渡せない（`PermanentId` のみ受け付ける）。
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// 投稿を作成し、確定したIDと作成時刻を持つ投稿を返す
    async fn create_post(&self, author_id: &UserId, message: &str) -> Result<Post, AppError>;

    /// 新しい順に最大 `limit` 件の投稿を取得
    async fn list_posts(&self, limit: usize) -> Result<Vec<Post>, AppError>;

    async fn get_profile(&self, user_id: &UserId) -> Result<Profile, AppError>;

    async fn set_like(&self, post_id: &PermanentId, user_id: &UserId) -> Result<(), AppError>;

    async fn unset_like(&self, post_id: &PermanentId, user_id: &UserId) -> Result<(), AppError>;

    async fn count_likes(&self, post_id: &PermanentId) -> Result<u32, AppError>;

    async fn has_liked(&self, post_id: &PermanentId, user_id: &UserId) -> Result<bool, AppError>;
}
