#![allow(dead_code)]

pub mod mocks;

use std::sync::{Arc, Once};

use chirp_lib::application::ports::RemoteStore;
use chirp_lib::application::services::{MutationCoordinator, QueryClient};
use chirp_lib::domain::value_objects::{PostId, UserId};
use chirp_lib::infrastructure::cache::CacheStore;
use tracing_subscriber::EnvFilter;

use mocks::ScriptedRemoteStore;

static INIT_TRACING: Once = Once::new();

pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("warn,chirp_lib=debug"));
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_test_writer()
            .compact()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

pub fn user(id: &str) -> UserId {
    UserId::new(id).expect("valid user id")
}

/// Cache, query client and coordinator wired to a scripted remote store.
pub struct Harness {
    pub cache: Arc<CacheStore>,
    pub remote: Arc<ScriptedRemoteStore>,
    pub queries: QueryClient,
    pub mutations: MutationCoordinator,
}

impl Harness {
    pub fn new() -> Self {
        init_tracing();
        let cache = Arc::new(CacheStore::new());
        let remote = Arc::new(ScriptedRemoteStore::new());
        let port: Arc<dyn RemoteStore> = Arc::clone(&remote) as Arc<dyn RemoteStore>;
        let queries = QueryClient::new(Arc::clone(&cache), Arc::clone(&port), 20);
        let mutations = MutationCoordinator::new(Arc::clone(&cache), port, 280);
        Self {
            cache,
            remote,
            queries,
            mutations,
        }
    }

    /// Creates a post directly on the remote store and loads its like
    /// views for `viewer` into the cache.
    pub async fn seed_post(&self, author: &UserId, message: &str, viewer: &UserId) -> PostId {
        let post = self
            .remote
            .backing()
            .create_post(author, message)
            .await
            .expect("seed post");
        self.queries.posts().await.expect("load posts");
        self.queries.like_count(&post.id).await.expect("load count");
        self.queries
            .user_liked(&post.id, viewer)
            .await
            .expect("load flag");
        post.id
    }
}
