use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::application::ports::RemoteStore;
use crate::domain::entities::{Post, Profile};
use crate::domain::value_objects::{PermanentId, UserId};
use crate::infrastructure::cache::lock::mutex_lock;
use crate::shared::error::AppError;

#[derive(Default)]
struct RemoteState {
    /// Creation order, oldest first.
    posts: Vec<Post>,
    likes: HashSet<(PermanentId, UserId)>,
    profiles: HashMap<UserId, Profile>,
}

#[derive(Default)]
struct FailurePlan {
    create: Option<AppError>,
    like: Option<AppError>,
    read: Option<AppError>,
}

/// Process-local `RemoteStore` with one-shot failure injection.
#[derive(Default)]
pub struct InMemoryRemoteStore {
    state: Mutex<RemoteState>,
    failures: Mutex<FailurePlan>,
    create_calls: AtomicUsize,
    like_calls: AtomicUsize,
    read_calls: AtomicUsize,
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_profile(&self, profile: Profile) {
        mutex_lock(&self.state, "remote.insert_profile")
            .profiles
            .insert(profile.user_id.clone(), profile);
    }

    /// The next `create_post` call fails with `error`.
    pub fn fail_next_create(&self, error: AppError) {
        mutex_lock(&self.failures, "remote.fail_next_create").create = Some(error);
    }

    /// The next `set_like` or `unset_like` call fails with `error`.
    pub fn fail_next_like(&self, error: AppError) {
        mutex_lock(&self.failures, "remote.fail_next_like").like = Some(error);
    }

    /// The next read (`list_posts`, `get_profile`, `count_likes`,
    /// `has_liked`) fails with `error`.
    pub fn fail_next_read(&self, error: AppError) {
        mutex_lock(&self.failures, "remote.fail_next_read").read = Some(error);
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::Relaxed)
    }

    pub fn like_calls(&self) -> usize {
        self.like_calls.load(Ordering::Relaxed)
    }

    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::Relaxed)
    }

    fn take_read_failure(&self) -> Result<(), AppError> {
        self.read_calls.fetch_add(1, Ordering::Relaxed);
        match mutex_lock(&self.failures, "remote.read").read.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn take_like_failure(&self) -> Result<(), AppError> {
        self.like_calls.fetch_add(1, Ordering::Relaxed);
        match mutex_lock(&self.failures, "remote.like").like.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn ensure_post_exists(state: &RemoteState, post_id: &PermanentId) -> Result<(), AppError> {
        let exists = state
            .posts
            .iter()
            .any(|post| post.id.as_permanent() == Some(post_id));
        if exists {
            Ok(())
        } else {
            Err(AppError::NotFound(format!("post {post_id}")))
        }
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn create_post(&self, author_id: &UserId, message: &str) -> Result<Post, AppError> {
        self.create_calls.fetch_add(1, Ordering::Relaxed);
        if let Some(err) = mutex_lock(&self.failures, "remote.create").create.take() {
            return Err(err);
        }

        let id = PermanentId::new(Uuid::new_v4().to_string())?;
        let post = Post::new_with_id(id, author_id.clone(), message.to_string(), Utc::now());
        mutex_lock(&self.state, "remote.create_post")
            .posts
            .push(post.clone());
        debug!(post_id = %post.id, "remote post created");
        Ok(post)
    }

    async fn list_posts(&self, limit: usize) -> Result<Vec<Post>, AppError> {
        self.take_read_failure()?;
        let state = mutex_lock(&self.state, "remote.list_posts");
        Ok(state.posts.iter().rev().take(limit).cloned().collect())
    }

    async fn get_profile(&self, user_id: &UserId) -> Result<Profile, AppError> {
        self.take_read_failure()?;
        mutex_lock(&self.state, "remote.get_profile")
            .profiles
            .get(user_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("profile {user_id}")))
    }

    async fn set_like(&self, post_id: &PermanentId, user_id: &UserId) -> Result<(), AppError> {
        self.take_like_failure()?;
        let mut state = mutex_lock(&self.state, "remote.set_like");
        Self::ensure_post_exists(&state, post_id)?;
        state.likes.insert((post_id.clone(), user_id.clone()));
        Ok(())
    }

    async fn unset_like(&self, post_id: &PermanentId, user_id: &UserId) -> Result<(), AppError> {
        self.take_like_failure()?;
        let mut state = mutex_lock(&self.state, "remote.unset_like");
        Self::ensure_post_exists(&state, post_id)?;
        state.likes.remove(&(post_id.clone(), user_id.clone()));
        Ok(())
    }

    async fn count_likes(&self, post_id: &PermanentId) -> Result<u32, AppError> {
        self.take_read_failure()?;
        let state = mutex_lock(&self.state, "remote.count_likes");
        let count = state
            .likes
            .iter()
            .filter(|(liked_post, _)| liked_post == post_id)
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn has_liked(&self, post_id: &PermanentId, user_id: &UserId) -> Result<bool, AppError> {
        self.take_read_failure()?;
        let state = mutex_lock(&self.state, "remote.has_liked");
        Ok(state.likes.contains(&(post_id.clone(), user_id.clone())))
    }
}
