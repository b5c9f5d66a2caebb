use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use chirp_lib::application::ports::RemoteStore;
use chirp_lib::domain::entities::{Post, Profile};
use chirp_lib::domain::value_objects::{PermanentId, TemporaryId, UserId};
use chirp_lib::infrastructure::remote::InMemoryRemoteStore;
use chirp_lib::shared::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    CreatePost,
    ListPosts,
    GetProfile,
    SetLike,
    UnsetLike,
    CountLikes,
    HasLiked,
}

/// A call whose response is parked until the test lets it through.
///
/// The backing store has already processed the request, in call order; only
/// the response delivery is delayed.
pub struct HeldCall {
    pub op: RemoteOp,
    reply: oneshot::Sender<Option<AppError>>,
}

impl HeldCall {
    pub fn release(self) {
        let _ = self.reply.send(None);
    }

    /// Delivers `error` instead of the backing store's result.
    pub fn fail(self, error: AppError) {
        let _ = self.reply.send(Some(error));
    }
}

/// `RemoteStore` double backed by `InMemoryRemoteStore` that counts calls
/// and can hold responses of selected operations.
pub struct ScriptedRemoteStore {
    backing: InMemoryRemoteStore,
    held_ops: Mutex<HashSet<RemoteOp>>,
    calls: Mutex<HashMap<RemoteOp, usize>>,
    held_tx: mpsc::UnboundedSender<HeldCall>,
    held_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<HeldCall>>,
    temporary_ids: AtomicBool,
}

impl ScriptedRemoteStore {
    pub fn new() -> Self {
        let (held_tx, held_rx) = mpsc::unbounded_channel();
        Self {
            backing: InMemoryRemoteStore::new(),
            held_ops: Mutex::new(HashSet::new()),
            calls: Mutex::new(HashMap::new()),
            held_tx,
            held_rx: tokio::sync::Mutex::new(held_rx),
            temporary_ids: AtomicBool::new(false),
        }
    }

    pub fn backing(&self) -> &InMemoryRemoteStore {
        &self.backing
    }

    pub fn hold(&self, op: RemoteOp) {
        self.held_ops.lock().unwrap().insert(op);
    }

    pub fn stop_holding(&self, op: RemoteOp) {
        self.held_ops.lock().unwrap().remove(&op);
    }

    /// `create_post` answers with a post that still carries a temporary id.
    pub fn answer_with_temporary_ids(&self) {
        self.temporary_ids.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self, op: RemoteOp) -> usize {
        self.calls.lock().unwrap().get(&op).copied().unwrap_or(0)
    }

    pub fn like_calls(&self) -> usize {
        self.calls(RemoteOp::SetLike) + self.calls(RemoteOp::UnsetLike)
    }

    /// Waits for the next held call; panics when none shows up in time.
    pub async fn next_held(&self) -> HeldCall {
        let mut rx = self.held_rx.lock().await;
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for a held call")
            .expect("held call channel closed")
    }

    /// Waits for held calls until one for `op` arrives; the others are
    /// returned alongside it, in arrival order.
    pub async fn next_held_of(&self, op: RemoteOp) -> (HeldCall, Vec<HeldCall>) {
        let mut others = Vec::new();
        loop {
            let call = self.next_held().await;
            if call.op == op {
                return (call, others);
            }
            others.push(call);
        }
    }

    fn record(&self, op: RemoteOp) {
        *self.calls.lock().unwrap().entry(op).or_insert(0) += 1;
    }

    async fn deliver<T>(&self, op: RemoteOp, result: Result<T, AppError>) -> Result<T, AppError> {
        if !self.held_ops.lock().unwrap().contains(&op) {
            return result;
        }
        let (reply, rx) = oneshot::channel();
        self.held_tx
            .send(HeldCall { op, reply })
            .expect("held call receiver dropped");
        match rx.await {
            Ok(None) => result,
            Ok(Some(err)) => Err(err),
            Err(_) => Err(AppError::Network("held call dropped".to_string())),
        }
    }
}

impl Default for ScriptedRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for ScriptedRemoteStore {
    async fn create_post(&self, author_id: &UserId, message: &str) -> Result<Post, AppError> {
        self.record(RemoteOp::CreatePost);
        let result = if self.temporary_ids.load(Ordering::SeqCst) {
            Ok(Post::pending(
                TemporaryId::mint(),
                author_id.clone(),
                message.to_string(),
            ))
        } else {
            self.backing.create_post(author_id, message).await
        };
        self.deliver(RemoteOp::CreatePost, result).await
    }

    async fn list_posts(&self, limit: usize) -> Result<Vec<Post>, AppError> {
        self.record(RemoteOp::ListPosts);
        let result = self.backing.list_posts(limit).await;
        self.deliver(RemoteOp::ListPosts, result).await
    }

    async fn get_profile(&self, user_id: &UserId) -> Result<Profile, AppError> {
        self.record(RemoteOp::GetProfile);
        let result = self.backing.get_profile(user_id).await;
        self.deliver(RemoteOp::GetProfile, result).await
    }

    async fn set_like(&self, post_id: &PermanentId, user_id: &UserId) -> Result<(), AppError> {
        self.record(RemoteOp::SetLike);
        let result = self.backing.set_like(post_id, user_id).await;
        self.deliver(RemoteOp::SetLike, result).await
    }

    async fn unset_like(&self, post_id: &PermanentId, user_id: &UserId) -> Result<(), AppError> {
        self.record(RemoteOp::UnsetLike);
        let result = self.backing.unset_like(post_id, user_id).await;
        self.deliver(RemoteOp::UnsetLike, result).await
    }

    async fn count_likes(&self, post_id: &PermanentId) -> Result<u32, AppError> {
        self.record(RemoteOp::CountLikes);
        let result = self.backing.count_likes(post_id).await;
        self.deliver(RemoteOp::CountLikes, result).await
    }

    async fn has_liked(&self, post_id: &PermanentId, user_id: &UserId) -> Result<bool, AppError> {
        self.record(RemoteOp::HasLiked);
        let result = self.backing.has_liked(post_id, user_id).await;
        self.deliver(RemoteOp::HasLiked, result).await
    }
}
