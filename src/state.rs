use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::application::ports::RemoteStore;
use crate::application::services::{
    CreatePostIntent, LikeOutcome, MutationCoordinator, MutationError, MutationHandle, QueryClient,
    ToggleLikeIntent,
};
use crate::domain::entities::Post;
use crate::domain::value_objects::{PostId, UserId};
use crate::infrastructure::cache::CacheStore;
use crate::shared::config::AppConfig;
use crate::shared::error::AppError;

/// Application state of one signed-in session.
pub struct AppState {
    config: AppConfig,
    cache: Arc<CacheStore>,
    queries: QueryClient,
    mutations: MutationCoordinator,
    acting_user: Option<UserId>,
    refetch_task: Option<JoinHandle<()>>,
}

impl AppState {
    /// Builds the cache, query client and mutation coordinator for one
    /// session. The auto re-fetch task starts only when enabled and a tokio
    /// runtime is available.
    pub fn new(
        config: AppConfig,
        remote: Arc<dyn RemoteStore>,
        acting_user: Option<UserId>,
    ) -> Result<Self, AppError> {
        config.validate().map_err(AppError::ConfigurationError)?;

        let cache = Arc::new(CacheStore::new());
        let queries = QueryClient::new(
            Arc::clone(&cache),
            Arc::clone(&remote),
            config.cache.post_list_limit,
        );
        let mutations =
            MutationCoordinator::new(Arc::clone(&cache), remote, config.posts.max_message_chars);

        let refetch_task = if config.cache.auto_refetch {
            match Handle::try_current() {
                Ok(_) => Some(queries.spawn_auto_refetch()),
                Err(_) => {
                    warn!("no tokio runtime, auto refetch disabled");
                    None
                }
            }
        } else {
            None
        };

        info!(
            acting_user = acting_user.as_ref().map(UserId::as_str),
            auto_refetch = refetch_task.is_some(),
            "session started"
        );

        Ok(Self {
            config,
            cache,
            queries,
            mutations,
            acting_user,
            refetch_task,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn queries(&self) -> &QueryClient {
        &self.queries
    }

    pub fn mutations(&self) -> &MutationCoordinator {
        &self.mutations
    }

    pub fn acting_user(&self) -> Option<&UserId> {
        self.acting_user.as_ref()
    }

    /// Publishes a post as the acting user.
    pub fn create_post(&self, message: &str) -> Result<MutationHandle<Post>, MutationError> {
        let author_id = self.require_user()?;
        self.mutations
            .create_post(CreatePostIntent::new(author_id.clone(), message))
    }

    /// Toggles the acting user's like. `liked` is the state currently shown.
    pub fn toggle_like(
        &self,
        post_id: PostId,
        liked: bool,
    ) -> Result<MutationHandle<LikeOutcome>, MutationError> {
        let user_id = self.require_user()?;
        self.mutations
            .toggle_like(ToggleLikeIntent::new(post_id, user_id.clone(), liked))
    }

    /// Ends the session: drops the cache and stops the auto re-fetch task.
    pub fn logout(mut self) {
        if let Some(task) = self.refetch_task.take() {
            task.abort();
        }
        self.cache.clear();
        self.mutations.create_post_status().reset();
        self.mutations.toggle_like_status().reset();
        info!(
            acting_user = self.acting_user.as_ref().map(UserId::as_str),
            "session ended"
        );
    }

    fn require_user(&self) -> Result<&UserId, MutationError> {
        self.acting_user
            .as_ref()
            .ok_or_else(|| {
                MutationError::precondition(AppError::Unauthorized(
                    "no acting user is signed in".to_string(),
                ))
            })
    }
}

impl Drop for AppState {
    fn drop(&mut self) {
        if let Some(task) = self.refetch_task.take() {
            task.abort();
        }
    }
}
