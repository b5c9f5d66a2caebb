use std::sync::Arc;

use anyhow::{Context, Result};
use chirp_lib::domain::entities::Profile;
use chirp_lib::domain::value_objects::UserId;
use chirp_lib::infrastructure::remote::InMemoryRemoteStore;
use chirp_lib::{AppConfig, AppError, AppState, RemoteStore, init_logging};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env();
    init_logging(&config.logging.filter);

    info!("chirp demo starting...");

    let remote = Arc::new(InMemoryRemoteStore::new());
    let author = UserId::new("u1")?;
    remote.insert_profile(Profile::new(author.clone(), "Alice"));

    let state = AppState::new(
        config,
        Arc::clone(&remote) as Arc<dyn RemoteStore>,
        Some(author.clone()),
    )
    .context("failed to start session")?;

    let profile = state.queries().profile(&author).await?;
    info!(name = %profile.name, initial = %profile.initial(), "signed in");

    // 楽観的に投稿し、確定IDに置き換わるまで待つ
    let pending = state.create_post("hello")?;
    let temporary_id = pending.post_id().clone();
    info!(post_id = %temporary_id, "pending post visible");
    let created = pending.settled().await?;
    info!(post_id = %created.id, "post confirmed");

    // 確定前に描画した一時IDのままでも確定IDへ送られる
    let liked = state.toggle_like(temporary_id, false)?.settled().await?;
    info!(
        outcome = %serde_json::to_string(&liked).context("failed to encode like outcome")?,
        "like confirmed"
    );

    // 失敗時はロールバックされる
    remote.fail_next_like(AppError::Network("connection reset".to_string()));
    match state.toggle_like(created.id.clone(), true)?.settled().await {
        Ok(outcome) => info!(liked = outcome.liked, "unlike confirmed"),
        Err(err) => info!(error = %err, message = %err.user_message(), "unlike rolled back"),
    }

    let refetched = state.queries().refetch_stale().await;
    let count = state.queries().like_count(&created.id).await?;
    let posts = state.queries().posts().await?;
    info!(refetched, like_count = count, posts = posts.len(), "cache settled");

    let metrics = state.mutations().metrics();
    info!(
        create_successes = metrics.create_post.successes,
        like_successes = metrics.toggle_like.successes,
        like_failures = metrics.toggle_like.failures,
        "mutation metrics"
    );

    state.logout();
    Ok(())
}
