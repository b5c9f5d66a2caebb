use serde::Serialize;
use tracing::debug;

use super::resolution::CreateResolutions;
use super::status::MutationPhase;
use crate::domain::value_objects::{PostId, UserId};
use crate::infrastructure::cache::{CacheKey, CacheStore, CacheTransaction, CacheValue};
use crate::shared::error::AppError;

/// `liked` is the state the caller displayed when the intent was issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToggleLikeIntent {
    pub post_id: PostId,
    pub user_id: UserId,
    pub liked: bool,
}

impl ToggleLikeIntent {
    pub fn new(post_id: PostId, user_id: UserId, liked: bool) -> Self {
        Self {
            post_id,
            user_id,
            liked,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LikeOutcome {
    pub post_id: PostId,
    /// Like state after the toggle.
    pub liked: bool,
    /// Finished without a remote call (the post was still pending).
    pub local_only: bool,
}

#[derive(Debug)]
pub struct PendingToggleLike {
    post_id: PostId,
    user_id: UserId,
    was_liked: bool,
    count_snapshot: Option<CacheValue>,
    flag_snapshot: Option<CacheValue>,
    phase: MutationPhase,
}

impl PendingToggleLike {
    /// Flips the flag and moves the count by one (never below zero) in one
    /// transaction, remembering both previous values.
    ///
    /// The post id is resolved against `resolutions` under the same lock, so
    /// a toggle on a temporary id that has since been re-keyed lands on the
    /// permanent id, and one whose create was rolled back writes nothing.
    pub fn apply_optimistic(
        cache: &CacheStore,
        resolutions: &CreateResolutions,
        intent: ToggleLikeIntent,
    ) -> Result<Self, AppError> {
        let (_, resolved) = cache.update(|view| {
            let post_id = match resolutions.resolve(&intent.post_id) {
                Ok(post_id) => post_id,
                Err(err) => return (CacheTransaction::new(), Err(err)),
            };
            let count_key = CacheKey::like_count(&post_id);
            let flag_key = CacheKey::user_like(&post_id, &intent.user_id);
            let count_snapshot = view.read(&count_key);
            let flag_snapshot = view.read(&flag_key);

            let count = count_snapshot
                .as_ref()
                .and_then(CacheValue::as_like_count)
                .unwrap_or(0);
            let next = if intent.liked {
                count.saturating_sub(1)
            } else {
                count.saturating_add(1)
            };

            let tx = CacheTransaction::new()
                .set(count_key, CacheValue::LikeCount(next))
                .set(flag_key, CacheValue::Liked(!intent.liked));
            (tx, Ok((post_id, count_snapshot, flag_snapshot)))
        });
        let (post_id, count_snapshot, flag_snapshot) = resolved?;

        if post_id != intent.post_id {
            debug!(
                temporary_id = %intent.post_id,
                post_id = %post_id,
                "like on re-keyed post redirected to its permanent id"
            );
        }
        debug!(
            post_id = %post_id,
            user_id = %intent.user_id,
            liked = !intent.liked,
            phase = %MutationPhase::Optimistic,
            "applied optimistic like toggle"
        );

        Ok(Self {
            post_id,
            user_id: intent.user_id,
            was_liked: intent.liked,
            count_snapshot,
            flag_snapshot,
            phase: MutationPhase::Optimistic,
        })
    }

    pub fn post_id(&self) -> &PostId {
        &self.post_id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn was_liked(&self) -> bool {
        self.was_liked
    }

    pub fn phase(&self) -> MutationPhase {
        self.phase
    }

    /// Nothing to send while the post's create is unsettled.
    pub fn is_local_only(&self) -> bool {
        self.post_id.is_temporary()
    }

    /// Ends a local-only toggle without contacting the remote store.
    pub fn finish_local(mut self) -> LikeOutcome {
        self.advance(MutationPhase::Settled);
        self.outcome(true)
    }

    pub(crate) fn dispatched(mut self) -> Self {
        self.advance(MutationPhase::InFlight);
        self
    }

    /// The optimistic values already match what was sent; settlement's
    /// invalidation pulls in any concurrent change.
    pub fn reconcile(mut self) -> Self {
        self.advance(MutationPhase::ReconcilingSuccess);
        self
    }

    /// Restores this mutation's own snapshot, regardless of what other
    /// toggles wrote in between.
    pub fn roll_back(mut self, cache: &CacheStore) -> Self {
        self.advance(MutationPhase::RollingBack);
        let tx = CacheTransaction::new()
            .restore(
                CacheKey::like_count(&self.post_id),
                self.count_snapshot.take(),
            )
            .restore(
                CacheKey::user_like(&self.post_id, &self.user_id),
                self.flag_snapshot.take(),
            );
        cache.commit(tx);

        debug!(post_id = %self.post_id, phase = %self.phase, "rolled back like toggle");
        self
    }

    pub fn settle(mut self, cache: &CacheStore) -> LikeOutcome {
        let succeeded = self.phase == MutationPhase::ReconcilingSuccess;
        self.advance(MutationPhase::Settled);
        cache.commit(
            CacheTransaction::new()
                .invalidate(CacheKey::like_count(&self.post_id))
                .invalidate(CacheKey::user_like(&self.post_id, &self.user_id)),
        );
        let mut outcome = self.outcome(false);
        if !succeeded {
            outcome.liked = self.was_liked;
        }
        outcome
    }

    fn outcome(&self, local_only: bool) -> LikeOutcome {
        LikeOutcome {
            post_id: self.post_id.clone(),
            liked: !self.was_liked,
            local_only,
        }
    }

    fn advance(&mut self, next: MutationPhase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "invalid toggle-like transition {} -> {}",
            self.phase,
            next
        );
        self.phase = next;
    }
}
