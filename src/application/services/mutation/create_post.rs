use std::sync::Arc;

use tracing::debug;

use super::resolution::{CreateResolution, CreateResolutions};
use super::status::MutationPhase;
use crate::domain::entities::Post;
use crate::domain::value_objects::{PostId, TemporaryId, UserId};
use crate::infrastructure::cache::{
    CacheKey, CacheKeyPrefix, CacheStore, CacheTransaction, CacheValue,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePostIntent {
    pub author_id: UserId,
    pub message: String,
}

impl CreatePostIntent {
    pub fn new(author_id: UserId, message: impl Into<String>) -> Self {
        Self {
            author_id,
            message: message.into(),
        }
    }
}

/// Snapshot owned by one in-flight create-post mutation.
///
/// Each phase method consumes the value, so a snapshot cannot be rolled back
/// twice or outlive its settlement.
#[derive(Debug)]
pub struct PendingCreatePost {
    temporary_id: TemporaryId,
    author_id: UserId,
    list_snapshot: Option<CacheValue>,
    phase: MutationPhase,
}

impl PendingCreatePost {
    /// Inserts the pending post at the head of the cached list and seeds its
    /// like entries, all in one transaction.
    pub fn apply_optimistic(cache: &CacheStore, author_id: UserId, message: String) -> Self {
        let temporary_id = TemporaryId::mint();
        let post_id = PostId::Temporary(temporary_id);
        let pending_post = Post::pending(temporary_id, author_id.clone(), message);

        let (_, list_snapshot) = cache.update(|view| {
            let snapshot = view.read(&CacheKey::PostList);
            let existing = snapshot
                .as_ref()
                .and_then(CacheValue::as_posts)
                .map(|posts| posts.as_slice())
                .unwrap_or_default();

            let mut posts = Vec::with_capacity(existing.len() + 1);
            posts.push(pending_post);
            posts.extend(existing.iter().cloned());

            let tx = CacheTransaction::new()
                .set(CacheKey::PostList, CacheValue::Posts(Arc::new(posts)))
                .set(CacheKey::like_count(&post_id), CacheValue::LikeCount(0))
                .set(
                    CacheKey::user_like(&post_id, &author_id),
                    CacheValue::Liked(false),
                );
            (tx, snapshot)
        });

        debug!(post_id = %post_id, phase = %MutationPhase::Optimistic, "applied optimistic post");

        Self {
            temporary_id,
            author_id,
            list_snapshot,
            phase: MutationPhase::Optimistic,
        }
    }

    pub fn temporary_id(&self) -> PostId {
        PostId::Temporary(self.temporary_id)
    }

    pub fn phase(&self) -> MutationPhase {
        self.phase
    }

    pub fn list_snapshot(&self) -> Option<&CacheValue> {
        self.list_snapshot.as_ref()
    }

    pub(crate) fn dispatched(mut self) -> Self {
        self.advance(MutationPhase::InFlight);
        self
    }

    /// Re-keys the like entries from the temporary to the permanent id and
    /// swaps the pending post for the authoritative one, as one transaction.
    /// Local likes on the pending post never reached the remote store and are
    /// dropped with the temporary keys. Later toggles on the temporary id are
    /// redirected through `resolutions`.
    pub fn reconcile(
        mut self,
        cache: &CacheStore,
        resolutions: &CreateResolutions,
        created: &Post,
    ) -> Self {
        self.advance(MutationPhase::ReconcilingSuccess);
        let temporary_id = self.temporary_id();
        let permanent_id = &created.id;

        cache.update(|view| {
            let mut tx = CacheTransaction::new()
                .set(CacheKey::like_count(permanent_id), CacheValue::LikeCount(0))
                .set(
                    CacheKey::user_like(permanent_id, &self.author_id),
                    CacheValue::Liked(false),
                )
                .remove_matching(CacheKeyPrefix::Post(temporary_id.clone()));

            let current = view.read(&CacheKey::PostList);
            let listed = current
                .as_ref()
                .and_then(CacheValue::as_posts)
                .filter(|posts| posts.iter().any(|post| post.id == temporary_id));
            if let Some(posts) = listed {
                let replaced = posts
                    .iter()
                    .map(|post| {
                        if post.id == temporary_id {
                            created.clone()
                        } else {
                            post.clone()
                        }
                    })
                    .collect();
                tx = tx.set(CacheKey::PostList, CacheValue::Posts(Arc::new(replaced)));
            }

            resolutions.record(
                self.temporary_id,
                CreateResolution::Created(permanent_id.clone()),
            );
            (tx.invalidate(CacheKey::PostList), ())
        });

        debug!(
            temporary_id = %temporary_id,
            post_id = %permanent_id,
            phase = %self.phase,
            "re-keyed pending post"
        );
        self
    }

    /// Restores the list exactly as it was before the optimistic write and
    /// drops every entry keyed by the temporary id, including likes other
    /// users placed on the pending post.
    pub fn roll_back(mut self, cache: &CacheStore, resolutions: &CreateResolutions) -> Self {
        self.advance(MutationPhase::RollingBack);
        let temporary_id = self.temporary_id();

        let tx = CacheTransaction::new()
            .restore(CacheKey::PostList, self.list_snapshot.take())
            .remove_matching(CacheKeyPrefix::Post(temporary_id.clone()));
        cache.update(|_| {
            resolutions.record(self.temporary_id, CreateResolution::RolledBack);
            (tx, ())
        });

        debug!(post_id = %temporary_id, phase = %self.phase, "rolled back pending post");
        self
    }

    /// Forces an authoritative re-fetch of the list and discards the snapshot.
    pub fn settle(mut self, cache: &CacheStore) -> MutationPhase {
        self.advance(MutationPhase::Settled);
        cache.invalidate(CacheKey::PostList);
        self.phase
    }

    fn advance(&mut self, next: MutationPhase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "invalid create-post transition {} -> {}",
            self.phase,
            next
        );
        self.phase = next;
    }
}
