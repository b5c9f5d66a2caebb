use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// モジュール定義
pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod shared;
pub mod state;

pub use application::ports::RemoteStore;
pub use application::services::{
    CreatePostIntent, LikeOutcome, MutationCoordinator, MutationError, MutationHandle,
    QueryClient, QueryState, ToggleLikeIntent,
};
pub use infrastructure::cache::{CacheKey, CacheStore, CacheValue};
pub use shared::{AppConfig, AppError};
pub use state::AppState;

/// ログ設定の初期化
///
/// `RUST_LOG` が設定されていればそれを優先し、なければ `default_filter` を使う。
pub fn init_logging(default_filter: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
