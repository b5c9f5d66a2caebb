use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::ports::RemoteStore;
use crate::domain::entities::{Post, Profile};
use crate::domain::value_objects::{PostId, UserId};
use crate::infrastructure::cache::{CacheEvent, CacheKey, CacheStore, CacheValue};
use crate::shared::error::AppError;

/// Query state as a view renders it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryState<T> {
    pub value: Option<T>,
    pub is_loading: bool,
    pub error: Option<String>,
    pub is_stale: bool,
}

impl<T> QueryState<T> {
    fn empty() -> Self {
        Self {
            value: None,
            is_loading: false,
            error: None,
            is_stale: false,
        }
    }

    fn map<U>(self, f: impl FnOnce(T) -> Option<U>) -> QueryState<U> {
        QueryState {
            value: self.value.and_then(f),
            is_loading: self.is_loading,
            error: self.error,
            is_stale: self.is_stale,
        }
    }
}

/// Reads views through the cache, fetching from the remote store when a key
/// is missing or stale.
#[derive(Clone)]
pub struct QueryClient {
    cache: Arc<CacheStore>,
    remote: Arc<dyn RemoteStore>,
    post_list_limit: usize,
}

impl QueryClient {
    pub fn new(cache: Arc<CacheStore>, remote: Arc<dyn RemoteStore>, post_list_limit: usize) -> Self {
        Self {
            cache,
            remote,
            post_list_limit,
        }
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    /// Fetches `key` from the remote store and writes the result back.
    ///
    /// Keys of pending posts resolve locally. When a newer local write lands
    /// while the request is outstanding, the fetched value is discarded and
    /// the cached one is returned.
    pub async fn fetch(&self, key: &CacheKey) -> Result<CacheValue, AppError> {
        if key.is_local_only() {
            return Ok(self.local_value(key));
        }

        let ticket = self.cache.begin_fetch(key);
        match self.load(key).await {
            Ok(value) => {
                if self.cache.complete_fetch(ticket, value.clone()) {
                    debug!(key = ?key, "fetched");
                    Ok(value)
                } else {
                    Ok(self.cache.read(key).unwrap_or(value))
                }
            }
            Err(err) => {
                warn!(key = ?key, error = %err, "fetch failed");
                self.cache.fail_fetch(ticket, err.to_string());
                Err(err)
            }
        }
    }

    /// Returns the cached value, fetching only when it is absent or stale.
    pub async fn ensure(&self, key: &CacheKey) -> Result<CacheValue, AppError> {
        if let Some(entry) = self.cache.entry(key) {
            if let (false, Some(value)) = (entry.stale, entry.value) {
                return Ok(value);
            }
        }
        self.fetch(key).await
    }

    /// Re-fetches every stale key and returns how many fetches ran.
    pub async fn refetch_stale(&self) -> usize {
        let keys: Vec<CacheKey> = self
            .cache
            .stale_keys()
            .into_iter()
            .filter(|key| !key.is_local_only())
            .collect();
        let count = keys.len();

        let results = futures::future::join_all(keys.iter().map(|key| self.fetch(key))).await;
        let failures = results.iter().filter(|result| result.is_err()).count();
        if failures > 0 {
            warn!(failures, total = count, "some stale keys failed to refetch");
        }
        count
    }

    pub fn state(&self, key: &CacheKey) -> QueryState<CacheValue> {
        match self.cache.entry(key) {
            Some(entry) => QueryState {
                value: entry.value,
                is_loading: entry.fetching,
                error: entry.error,
                is_stale: entry.stale,
            },
            None => QueryState::empty(),
        }
    }

    pub fn posts_state(&self) -> QueryState<Arc<Vec<Post>>> {
        self.state(&CacheKey::PostList)
            .map(|value| value.as_posts().cloned())
    }

    pub fn like_count_state(&self, post_id: &PostId) -> QueryState<u32> {
        self.state(&CacheKey::like_count(post_id))
            .map(|value| value.as_like_count())
    }

    pub async fn posts(&self) -> Result<Arc<Vec<Post>>, AppError> {
        let value = self.ensure(&CacheKey::PostList).await?;
        value
            .as_posts()
            .cloned()
            .ok_or_else(|| unexpected_value(&CacheKey::PostList))
    }

    pub async fn like_count(&self, post_id: &PostId) -> Result<u32, AppError> {
        let key = CacheKey::like_count(post_id);
        self.ensure(&key)
            .await?
            .as_like_count()
            .ok_or_else(|| unexpected_value(&key))
    }

    pub async fn user_liked(&self, post_id: &PostId, user_id: &UserId) -> Result<bool, AppError> {
        let key = CacheKey::user_like(post_id, user_id);
        self.ensure(&key)
            .await?
            .as_liked()
            .ok_or_else(|| unexpected_value(&key))
    }

    /// Profiles are fetched on first use only.
    pub async fn profile(&self, user_id: &UserId) -> Result<Profile, AppError> {
        let key = CacheKey::Profile(user_id.clone());
        let value = self.ensure(&key).await?;
        value
            .as_profile()
            .cloned()
            .ok_or_else(|| unexpected_value(&key))
    }

    /// Re-fetches keys as they are invalidated until the cache's event
    /// channel closes or the task is aborted.
    pub fn spawn_auto_refetch(&self) -> JoinHandle<()> {
        let client = self.clone();
        let mut events = self.cache.events();
        tokio::spawn(async move {
            info!("auto refetch started");
            loop {
                match events.recv().await {
                    Ok(CacheEvent::Invalidated(key)) if !key.is_local_only() => {
                        let client = client.clone();
                        tokio::spawn(async move {
                            let _ = client.fetch(&key).await;
                        });
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "auto refetch lagged, refetching all stale keys");
                        client.refetch_stale().await;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            info!("auto refetch stopped");
        })
    }

    async fn load(&self, key: &CacheKey) -> Result<CacheValue, AppError> {
        match key {
            CacheKey::PostList => {
                let posts = self.remote.list_posts(self.post_list_limit).await?;
                Ok(CacheValue::posts(posts))
            }
            CacheKey::LikeCount(post_id) => {
                let permanent_id = post_id
                    .as_permanent()
                    .ok_or_else(|| unexpected_value(key))?;
                Ok(CacheValue::LikeCount(
                    self.remote.count_likes(permanent_id).await?,
                ))
            }
            CacheKey::UserLike(post_id, user_id) => {
                let permanent_id = post_id
                    .as_permanent()
                    .ok_or_else(|| unexpected_value(key))?;
                Ok(CacheValue::Liked(
                    self.remote.has_liked(permanent_id, user_id).await?,
                ))
            }
            CacheKey::Profile(user_id) => Ok(CacheValue::Profile(
                self.remote.get_profile(user_id).await?,
            )),
        }
    }

    fn local_value(&self, key: &CacheKey) -> CacheValue {
        self.cache.read(key).unwrap_or(match key {
            CacheKey::UserLike(..) => CacheValue::Liked(false),
            _ => CacheValue::LikeCount(0),
        })
    }
}

fn unexpected_value(key: &CacheKey) -> AppError {
    AppError::Internal(format!("unexpected cache value for {key:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::TemporaryId;
    use crate::infrastructure::remote::InMemoryRemoteStore;

    fn setup() -> (QueryClient, Arc<InMemoryRemoteStore>) {
        let cache = Arc::new(CacheStore::new());
        let remote = Arc::new(InMemoryRemoteStore::new());
        let client = QueryClient::new(cache, Arc::clone(&remote) as Arc<dyn RemoteStore>, 20);
        (client, remote)
    }

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    #[tokio::test]
    async fn fetch_writes_fresh_value() {
        let (client, remote) = setup();
        let post = remote.create_post(&user("u1"), "hello").await.unwrap();
        remote.set_like(post.id.as_permanent().unwrap(), &user("u2")).await.unwrap();

        let count = client.like_count(&post.id).await.unwrap();
        assert_eq!(count, 1);

        client.cache().invalidate(CacheKey::like_count(&post.id));
        assert!(client.like_count_state(&post.id).is_stale);

        client.refetch_stale().await;
        let state = client.like_count_state(&post.id);
        assert_eq!(state.value, Some(1));
        assert!(!state.is_stale);
        assert!(!state.is_loading);
    }

    #[tokio::test]
    async fn temporary_keys_never_reach_remote() {
        let (client, remote) = setup();
        let temp = PostId::from(TemporaryId::mint());

        let value = client.fetch(&CacheKey::like_count(&temp)).await.unwrap();
        let liked = client.user_liked(&temp, &user("u1")).await.unwrap();

        assert_eq!(value, CacheValue::LikeCount(0));
        assert!(!liked);
        assert_eq!(remote.read_calls(), 0);
    }

    #[tokio::test]
    async fn failed_fetch_keeps_last_value() {
        let (client, remote) = setup();
        remote.create_post(&user("u1"), "hello").await.unwrap();
        client.posts().await.unwrap();

        client.cache().invalidate(CacheKey::PostList);
        remote.fail_next_read(AppError::Network("offline".to_string()));
        assert!(client.fetch(&CacheKey::PostList).await.is_err());

        let state = client.posts_state();
        assert_eq!(state.value.unwrap().len(), 1);
        assert!(state.error.is_some());
        assert!(state.is_stale);
    }

    #[tokio::test]
    async fn profile_is_fetched_once() {
        let (client, remote) = setup();
        remote.insert_profile(Profile::new(user("u1"), "Alice"));

        client.profile(&user("u1")).await.unwrap();
        let profile = client.profile(&user("u1")).await.unwrap();

        assert_eq!(profile.name, "Alice");
        assert_eq!(remote.read_calls(), 1);
    }

    #[tokio::test]
    async fn ensure_fetches_only_missing_or_stale_entries() {
        let (client, remote) = setup();
        remote.create_post(&user("u1"), "hello").await.unwrap();

        client.ensure(&CacheKey::PostList).await.unwrap();
        client.ensure(&CacheKey::PostList).await.unwrap();
        assert_eq!(remote.read_calls(), 1);

        remote.create_post(&user("u1"), "second").await.unwrap();
        client.cache().invalidate(CacheKey::PostList);
        let value = client.ensure(&CacheKey::PostList).await.unwrap();

        assert_eq!(remote.read_calls(), 2);
        assert_eq!(value.as_posts().map(|posts| posts.len()), Some(2));
    }

    #[tokio::test]
    async fn auto_refetch_reloads_invalidated_keys() {
        let (client, remote) = setup();
        remote.create_post(&user("u1"), "hello").await.unwrap();
        client.posts().await.unwrap();
        let task = client.spawn_auto_refetch();

        remote.create_post(&user("u1"), "second").await.unwrap();
        client.cache().invalidate(CacheKey::PostList);

        let mut attempts = 0;
        while client.posts_state().is_stale && attempts < 100 {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            attempts += 1;
        }
        task.abort();

        let state = client.posts_state();
        assert!(!state.is_stale);
        assert_eq!(state.value.unwrap().len(), 2);
    }
}
