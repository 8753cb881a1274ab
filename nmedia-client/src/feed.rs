//! Наблюдаемое представление ленты поверх локального кэша.

use std::sync::Arc;

use tokio::sync::watch;

use crate::models::{FeedModel, FeedState, Post};
use crate::store::PostStore;

#[derive(Clone)]
/// Проекция кэша в снимок ленты плюс флаги загрузки.
///
/// Снимок всегда вычисляется из кэша и отдельно не хранится.
pub struct FeedProjector {
    store: Arc<dyn PostStore>,
    state: Arc<watch::Sender<FeedState>>,
}

/// Подписка на снимки ленты.
///
/// Новое значение замещает предыдущее: пропущенные промежуточные снимки не
/// копятся.
pub struct FeedSubscription {
    rx: watch::Receiver<Vec<Post>>,
}

impl FeedProjector {
    /// Создаёт проекцию над кэшем.
    pub fn new(store: Arc<dyn PostStore>) -> Self {
        let (state, _) = watch::channel(FeedState::default());
        Self {
            store,
            state: Arc::new(state),
        }
    }

    /// Текущий снимок ленты.
    pub fn snapshot(&self) -> FeedModel {
        FeedModel::from(self.store.subscribe().borrow().as_slice())
    }

    /// Подписка на последующие изменения ленты.
    pub fn subscribe(&self) -> FeedSubscription {
        FeedSubscription {
            rx: self.store.subscribe(),
        }
    }

    /// Текущие флаги загрузки.
    pub fn state(&self) -> FeedState {
        *self.state.borrow()
    }

    /// Подписка на флаги загрузки.
    pub fn subscribe_state(&self) -> watch::Receiver<FeedState> {
        self.state.subscribe()
    }

    pub(crate) fn update_state(&self, update: impl FnOnce(&mut FeedState)) {
        self.state.send_modify(update);
    }
}

impl FeedSubscription {
    /// Последний опубликованный снимок.
    pub fn current(&self) -> FeedModel {
        FeedModel::from(self.rx.borrow().as_slice())
    }

    /// Ждёт следующего изменения и возвращает актуальный снимок.
    ///
    /// `None`, если кэш закрыт.
    pub async fn changed(&mut self) -> Option<FeedModel> {
        self.rx.changed().await.ok()?;
        Some(FeedModel::from(self.rx.borrow_and_update().as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::store::SqlitePostStore;

    fn sample_post(id: i64) -> Post {
        Post {
            id,
            author: "Netology".to_string(),
            author_avatar: String::new(),
            content: format!("post {id}"),
            published: "now".to_string(),
            liked_by_me: false,
            likes: 0,
        }
    }

    async fn projector() -> (FeedProjector, Arc<SqlitePostStore>) {
        let store = Arc::new(
            SqlitePostStore::in_memory()
                .await
                .expect("in-memory store must open"),
        );
        (FeedProjector::new(store.clone()), store)
    }

    #[tokio::test]
    async fn snapshot_of_empty_store_is_empty() {
        let (projector, _store) = projector().await;
        let feed = projector.snapshot();
        assert!(feed.empty);
        assert!(feed.posts.is_empty());
    }

    #[tokio::test]
    async fn snapshot_follows_store_changes() {
        let (projector, store) = projector().await;
        store
            .upsert_many(vec![sample_post(1), sample_post(2)])
            .await
            .expect("seed must succeed");

        let feed = projector.snapshot();
        assert!(!feed.empty);
        let ids: Vec<i64> = feed.posts.iter().map(|post| post.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[tokio::test]
    async fn subscriber_receives_only_latest_snapshot() {
        let (projector, store) = projector().await;
        let mut subscription = projector.subscribe();

        store.upsert(sample_post(1)).await.expect("insert must succeed");
        store.upsert(sample_post(2)).await.expect("insert must succeed");
        store.delete_by_id(1).await.expect("delete must succeed");

        let feed = tokio::time::timeout(Duration::from_secs(1), subscription.changed())
            .await
            .expect("change must arrive")
            .expect("store must be alive");
        let ids: Vec<i64> = feed.posts.iter().map(|post| post.id).collect();
        assert_eq!(ids, vec![2]);

        let next = tokio::time::timeout(Duration::from_millis(50), subscription.changed()).await;
        assert!(next.is_err(), "no queued intermediate snapshots expected");
    }

    #[tokio::test]
    async fn state_updates_are_observable() {
        let (projector, _store) = projector().await;
        let mut rx = projector.subscribe_state();

        projector.update_state(|state| state.loading = true);

        assert!(rx.has_changed().expect("sender must be alive"));
        assert!(rx.borrow_and_update().loading);
        assert!(projector.state().loading);
    }
}
