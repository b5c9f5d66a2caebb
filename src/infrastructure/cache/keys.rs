//! Cache key definitions.
//!
//! `CacheKey` addresses one cached view; `CacheKeyPrefix` groups keys for
//! bulk invalidation. All derivation works on the tagged `PostId`, never on
//! its string rendering.

use std::sync::Arc;

use crate::domain::entities::{Post, Profile};
use crate::domain::value_objects::{PostId, UserId};

/// Addresses a single cached view.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Newest-first post list
    PostList,
    /// Like count of one post
    LikeCount(PostId),
    /// Whether a user has liked a post
    UserLike(PostId, UserId),
    /// Profile of a user
    Profile(UserId),
}

impl CacheKey {
    pub fn like_count(post_id: &PostId) -> Self {
        CacheKey::LikeCount(post_id.clone())
    }

    pub fn user_like(post_id: &PostId, user_id: &UserId) -> Self {
        CacheKey::UserLike(post_id.clone(), user_id.clone())
    }

    pub fn post_id(&self) -> Option<&PostId> {
        match self {
            CacheKey::LikeCount(post_id) | CacheKey::UserLike(post_id, _) => Some(post_id),
            CacheKey::PostList | CacheKey::Profile(_) => None,
        }
    }

    /// Keys of a pending post. The remote store has nothing to fetch for them.
    pub fn is_local_only(&self) -> bool {
        self.post_id().is_some_and(PostId::is_temporary)
    }
}

/// Groups keys for invalidation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKeyPrefix {
    PostList,
    /// Every like-count and user-like entry of one post
    Post(PostId),
    LikeCounts,
    UserLikes,
    Profiles,
}

impl CacheKeyPrefix {
    pub fn matches(&self, key: &CacheKey) -> bool {
        match (self, key) {
            (CacheKeyPrefix::PostList, CacheKey::PostList) => true,
            (CacheKeyPrefix::Post(id), key) => key.post_id() == Some(id),
            (CacheKeyPrefix::LikeCounts, CacheKey::LikeCount(_)) => true,
            (CacheKeyPrefix::UserLikes, CacheKey::UserLike(..)) => true,
            (CacheKeyPrefix::Profiles, CacheKey::Profile(_)) => true,
            _ => false,
        }
    }
}

/// A single key or a key prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyFilter {
    Key(CacheKey),
    Prefix(CacheKeyPrefix),
}

impl KeyFilter {
    pub fn matches(&self, key: &CacheKey) -> bool {
        match self {
            KeyFilter::Key(exact) => exact == key,
            KeyFilter::Prefix(prefix) => prefix.matches(key),
        }
    }
}

impl From<CacheKey> for KeyFilter {
    fn from(key: CacheKey) -> Self {
        KeyFilter::Key(key)
    }
}

impl From<CacheKeyPrefix> for KeyFilter {
    fn from(prefix: CacheKeyPrefix) -> Self {
        KeyFilter::Prefix(prefix)
    }
}

/// Cached value. The post list is shared behind an `Arc` so a restored
/// snapshot is the very same list, not a copy.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    Posts(Arc<Vec<Post>>),
    LikeCount(u32),
    Liked(bool),
    Profile(Profile),
}

impl CacheValue {
    pub fn posts(posts: Vec<Post>) -> Self {
        CacheValue::Posts(Arc::new(posts))
    }

    pub fn as_posts(&self) -> Option<&Arc<Vec<Post>>> {
        match self {
            CacheValue::Posts(posts) => Some(posts),
            _ => None,
        }
    }

    pub fn as_like_count(&self) -> Option<u32> {
        match self {
            CacheValue::LikeCount(count) => Some(*count),
            _ => None,
        }
    }

    pub fn as_liked(&self) -> Option<bool> {
        match self {
            CacheValue::Liked(liked) => Some(*liked),
            _ => None,
        }
    }

    pub fn as_profile(&self) -> Option<&Profile> {
        match self {
            CacheValue::Profile(profile) => Some(profile),
            _ => None,
        }
    }
}
