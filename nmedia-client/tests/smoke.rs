use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use nmedia_client::{
    AppError, HttpPostsApi, Post, PostAuthor, PostStore, Reconciler, SqlitePostStore,
};

fn unique_suffix() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock must be after unix epoch")
        .as_nanos();
    format!("{nanos}")
}

#[tokio::test]
#[ignore = "requires running posts server"]
async fn http_smoke_flow() {
    let base_url = std::env::var("NMEDIA_API_URL")
        .unwrap_or_else(|_| "http://127.0.0.1:9999/api/slow".to_string());
    let api = Arc::new(HttpPostsApi::new(base_url).expect("client must build"));
    let store = Arc::new(
        SqlitePostStore::in_memory()
            .await
            .expect("in-memory store must open"),
    );
    let reconciler = Reconciler::new(store.clone(), api);

    reconciler.refresh().await.expect("refresh must succeed");

    let content = format!("smoke {}", unique_suffix());
    let created = reconciler
        .save(Post::draft(&PostAuthor::new("smoke"), &content))
        .await
        .expect("save must succeed");
    assert_ne!(created.id, 0);
    assert_eq!(created.content, content);

    let liked = reconciler
        .toggle_like(created.id)
        .await
        .expect("like must succeed");
    assert!(liked.liked_by_me);
    assert_eq!(liked.likes, created.likes + 1);

    let unliked = reconciler
        .toggle_like(created.id)
        .await
        .expect("unlike must succeed");
    assert!(!unliked.liked_by_me);

    reconciler
        .remove_by_id(created.id)
        .await
        .expect("remove must succeed");
    assert!(
        store
            .get_by_id(created.id)
            .await
            .expect("get_by_id must succeed")
            .is_none()
    );

    let after_delete = reconciler.get_by_id(created.id).await;
    assert!(matches!(after_delete, Err(AppError::Api { status: 404, .. })));
}
