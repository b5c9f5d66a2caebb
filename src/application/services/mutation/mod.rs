//! Optimistic mutation coordinator.
//!
//! Each entry point applies its optimistic write synchronously, then hands the
//! remote call, reconciliation or rollback, and settlement to a spawned task.
//! Dropping the returned handle does not cancel that task: a mutation always
//! runs to reconciliation or rollback.

pub mod create_post;
pub mod error;
pub mod resolution;
pub mod status;
pub mod toggle_like;

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::application::ports::RemoteStore;
use crate::domain::entities::Post;
use crate::domain::value_objects::PostId;
use crate::infrastructure::cache::CacheStore;
use crate::shared::error::AppError;
use crate::shared::metrics::{AtomicMetric, MutationMetrics, MutationMetricsSnapshot};
use crate::shared::validation::normalize_message;

pub use create_post::{CreatePostIntent, PendingCreatePost};
pub use error::MutationError;
pub use resolution::{CreateResolution, CreateResolutions};
pub use status::{InFlightGuard, MutationPhase, MutationStatus, MutationTracker};
pub use toggle_like::{LikeOutcome, PendingToggleLike, ToggleLikeIntent};

/// Completion signal of one mutation.
#[derive(Debug)]
pub struct MutationHandle<T> {
    post_id: PostId,
    inner: HandleInner<T>,
}

#[derive(Debug)]
enum HandleInner<T> {
    Ready(Result<T, MutationError>),
    Spawned(JoinHandle<Result<T, MutationError>>),
}

impl<T> MutationHandle<T> {
    fn ready(post_id: PostId, result: Result<T, MutationError>) -> Self {
        Self {
            post_id,
            inner: HandleInner::Ready(result),
        }
    }

    fn spawned(post_id: PostId, handle: JoinHandle<Result<T, MutationError>>) -> Self {
        Self {
            post_id,
            inner: HandleInner::Spawned(handle),
        }
    }

    /// Id the optimistic write was keyed by: the temporary id for a create,
    /// the resolved id for a toggle.
    pub fn post_id(&self) -> &PostId {
        &self.post_id
    }

    pub fn is_finished(&self) -> bool {
        match &self.inner {
            HandleInner::Ready(_) => true,
            HandleInner::Spawned(handle) => handle.is_finished(),
        }
    }

    /// Waits for settlement and yields the mutation's result.
    pub async fn settled(self) -> Result<T, MutationError> {
        match self.inner {
            HandleInner::Ready(result) => result,
            HandleInner::Spawned(handle) => match handle.await {
                Ok(result) => result,
                Err(err) => {
                    warn!(post_id = %self.post_id, error = %err, "mutation task did not complete");
                    Err(MutationError::TaskFailed(err.to_string()))
                }
            },
        }
    }
}

#[derive(Clone)]
pub struct MutationCoordinator {
    cache: Arc<CacheStore>,
    remote: Arc<dyn RemoteStore>,
    max_message_chars: usize,
    create_tracker: Arc<MutationTracker>,
    like_tracker: Arc<MutationTracker>,
    metrics: Arc<MutationMetrics>,
    resolutions: Arc<CreateResolutions>,
}

impl MutationCoordinator {
    pub fn new(
        cache: Arc<CacheStore>,
        remote: Arc<dyn RemoteStore>,
        max_message_chars: usize,
    ) -> Self {
        Self {
            cache,
            remote,
            max_message_chars,
            create_tracker: Arc::new(MutationTracker::new()),
            like_tracker: Arc::new(MutationTracker::new()),
            metrics: Arc::new(MutationMetrics::default()),
            resolutions: Arc::new(CreateResolutions::new()),
        }
    }

    /// Pending indicator and last outcome of create-post mutations.
    pub fn create_post_status(&self) -> &MutationTracker {
        &self.create_tracker
    }

    /// Pending indicator and last outcome of like toggles.
    pub fn toggle_like_status(&self) -> &MutationTracker {
        &self.like_tracker
    }

    pub fn metrics(&self) -> MutationMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// How each settled create resolved its temporary id.
    pub fn resolutions(&self) -> &CreateResolutions {
        &self.resolutions
    }

    /// Publishes a post optimistically.
    ///
    /// The pending post is visible in the cache when this returns. Must be
    /// called from within a tokio runtime.
    pub fn create_post(
        &self,
        intent: CreatePostIntent,
    ) -> Result<MutationHandle<Post>, MutationError> {
        let runtime = current_runtime()?;
        let message = normalize_message(&intent.message, self.max_message_chars)
            .map_err(MutationError::precondition)?;

        let guard = self.create_tracker.begin();
        let pending =
            PendingCreatePost::apply_optimistic(&self.cache, intent.author_id.clone(), message.clone())
                .dispatched();
        let temporary_id = pending.temporary_id();

        let coordinator = self.clone();
        let task = runtime.spawn(async move {
            let author_id = intent.author_id;
            let outcome = coordinator
                .remote
                .create_post(&author_id, &message)
                .await
                .and_then(require_permanent);

            let (pending, result) = match outcome {
                Ok(created) => (
                    pending.reconcile(&coordinator.cache, &coordinator.resolutions, &created),
                    Ok(created),
                ),
                Err(err) => {
                    warn!(post_id = %pending.temporary_id(), error = %err, "create_post failed, rolling back");
                    (
                        pending.roll_back(&coordinator.cache, &coordinator.resolutions),
                        Err(MutationError::remote("create_post", err)),
                    )
                }
            };
            pending.settle(&coordinator.cache);
            coordinator.finish(guard, &result, |metrics| &metrics.create_post);
            result
        });

        Ok(MutationHandle::spawned(temporary_id, task))
    }

    /// Toggles a like optimistically. `intent.liked` is the state the caller
    /// displayed; it is not re-read here.
    ///
    /// A temporary id stays local only while its create is unsettled. Once
    /// re-keyed, the toggle goes to the permanent id; once rolled back, it is
    /// rejected.
    pub fn toggle_like(
        &self,
        intent: ToggleLikeIntent,
    ) -> Result<MutationHandle<LikeOutcome>, MutationError> {
        let runtime = current_runtime()?;
        let pending = PendingToggleLike::apply_optimistic(&self.cache, &self.resolutions, intent)
            .map_err(MutationError::precondition)?;
        let post_id = pending.post_id().clone();

        if pending.is_local_only() {
            debug!(post_id = %post_id, "like on pending post kept local");
            self.metrics.record_local_only_like();
            return Ok(MutationHandle::ready(post_id, Ok(pending.finish_local())));
        }

        let guard = self.like_tracker.begin();
        let pending = pending.dispatched();
        let coordinator = self.clone();
        let task = runtime.spawn(async move {
            let operation = if pending.was_liked() {
                "unset_like"
            } else {
                "set_like"
            };
            let outcome = match pending.post_id().as_permanent() {
                Some(permanent_id) if pending.was_liked() => {
                    coordinator
                        .remote
                        .unset_like(permanent_id, pending.user_id())
                        .await
                }
                Some(permanent_id) => {
                    coordinator
                        .remote
                        .set_like(permanent_id, pending.user_id())
                        .await
                }
                None => Err(AppError::Internal(
                    "temporary post reached remote dispatch".to_string(),
                )),
            };

            let (pending, failure) = match outcome {
                Ok(()) => (pending.reconcile(), None),
                Err(err) => {
                    warn!(post_id = %pending.post_id(), operation, error = %err, "like toggle failed, rolling back");
                    (
                        pending.roll_back(&coordinator.cache),
                        Some(MutationError::remote(operation, err)),
                    )
                }
            };
            let settled = pending.settle(&coordinator.cache);
            let result = match failure {
                Some(err) => Err(err),
                None => Ok(settled),
            };
            coordinator.finish(guard, &result, |metrics| &metrics.toggle_like);
            result
        });

        Ok(MutationHandle::spawned(post_id, task))
    }

    fn finish<T>(
        &self,
        guard: InFlightGuard,
        result: &Result<T, MutationError>,
        metric: impl Fn(&MutationMetrics) -> &AtomicMetric,
    ) {
        match result {
            Ok(_) => {
                metric(&self.metrics).record_success();
                guard.succeed();
            }
            Err(err) => {
                metric(&self.metrics).record_failure();
                guard.fail(err.user_message());
            }
        }
    }
}

fn current_runtime() -> Result<Handle, MutationError> {
    Handle::try_current().map_err(|_| {
        MutationError::precondition(AppError::Internal(
            "mutations require a running tokio runtime".to_string(),
        ))
    })
}

fn require_permanent(post: Post) -> Result<Post, AppError> {
    if post.id.is_temporary() {
        return Err(AppError::Remote(
            "remote store returned a post without a permanent id".to_string(),
        ));
    }
    Ok(post)
}
