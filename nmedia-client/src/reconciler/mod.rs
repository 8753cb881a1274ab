//! Синхронизация локального кэша с сервером.
//!
//! Лайк и удаление применяются к кэшу оптимистично и откатываются, если
//! сервер не подтвердил операцию. Сохранение поста идёт только через сервер:
//! идентификатор нового поста выдаёт он.

mod id_locks;

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::error::{AppError, AppResult};
use crate::models::Post;
use crate::remote::PostsApi;
use crate::store::PostStore;

use id_locks::IdLocks;

#[derive(Clone)]
/// Оркестратор операций над постами: оптимистичное изменение кэша,
/// вызов сервера, подтверждение или откат.
///
/// Операции над одним `id` выполняются строго последовательно.
pub struct Reconciler {
    store: Arc<dyn PostStore>,
    api: Arc<dyn PostsApi>,
    locks: Arc<IdLocks>,
}

impl Reconciler {
    /// Создаёт оркестратор поверх кэша и API.
    pub fn new(store: Arc<dyn PostStore>, api: Arc<dyn PostsApi>) -> Self {
        Self {
            store,
            api,
            locks: Arc::new(IdLocks::default()),
        }
    }

    /// Загружает все посты с сервера и записывает их в кэш.
    ///
    /// Строки, которых нет в ответе, не удаляются. При ошибке кэш не меняется.
    ///
    /// Посты, над которыми идёт операция или которые изменились после
    /// запроса, пропускаются: их локальное состояние новее ответа.
    pub async fn refresh(&self) -> AppResult<Vec<Post>> {
        let snapshot = self.locks.snapshot();
        let posts = self.api.get_all().await.map_err(|err| {
            warn!(error = %err, "refresh failed");
            AppError::from(err)
        })?;

        let mut guards = Vec::with_capacity(posts.len());
        let mut fresh = Vec::with_capacity(posts.len());
        for post in &posts {
            match self.locks.try_acquire(post.id) {
                Some(guard) if !snapshot.is_stale(post.id) => {
                    guards.push(guard);
                    fresh.push(post.clone());
                }
                _ => debug!(id = post.id, "refresh skipped busy post"),
            }
        }

        let applied = fresh.len();
        self.store.upsert_many(fresh).await?;
        drop(guards);

        debug!(count = posts.len(), applied, "refresh applied");
        Ok(posts)
    }

    /// Загружает один пост с сервера и записывает его в кэш.
    pub async fn get_by_id(&self, id: i64) -> AppResult<Post> {
        let _guard = self.locks.acquire(id).await;
        let post = self.api.get_by_id(id).await.map_err(|err| {
            warn!(id, error = %err, "fetch post failed");
            AppError::from(err)
        })?;

        self.store.upsert(post.clone()).await?;
        Ok(post)
    }

    /// Переключает лайк: сначала в кэше, затем на сервере.
    ///
    /// При ошибке сервера кэш возвращается к прежней паре
    /// `liked_by_me`/`likes`. При успехе остаётся оптимистичное значение,
    /// ответ сервера в кэш не пишется.
    pub async fn toggle_like(&self, id: i64) -> AppResult<Post> {
        let this = self.clone();
        detached(async move {
            let _guard = this.locks.acquire(id).await;
            this.toggle_like_locked(id).await
        })
        .await
    }

    async fn toggle_like_locked(&self, id: i64) -> AppResult<Post> {
        let optimistic = self
            .store
            .toggle_like(id)
            .await?
            .ok_or_else(|| AppError::Unknown(format!("post {id} is not cached")))?;

        // после переключения флаг инвертирован: liked_by_me == true значит "ставим лайк"
        let remote = if optimistic.liked_by_me {
            self.api.like_by_id(id).await
        } else {
            self.api.unlike_by_id(id).await
        };

        match remote {
            Ok(confirmed) => {
                if confirmed.likes != optimistic.likes
                    || confirmed.liked_by_me != optimistic.liked_by_me
                {
                    debug!(
                        id,
                        local_likes = optimistic.likes,
                        server_likes = confirmed.likes,
                        "server like counters differ from optimistic value"
                    );
                }
                Ok(optimistic)
            }
            Err(err) => {
                warn!(id, error = %err, "like toggle rejected, rolling back");
                if let Err(rollback_err) = self.store.toggle_like(id).await {
                    error!(id, error = %rollback_err, "like rollback failed");
                }
                Err(err.into())
            }
        }
    }

    /// Удаляет пост из кэша сразу и затем на сервере.
    ///
    /// При ошибке сервера строка восстанавливается без изменений.
    pub async fn remove_by_id(&self, id: i64) -> AppResult<()> {
        let this = self.clone();
        detached(async move {
            let _guard = this.locks.acquire(id).await;
            this.remove_by_id_locked(id).await
        })
        .await
    }

    async fn remove_by_id_locked(&self, id: i64) -> AppResult<()> {
        let snapshot = self.store.get_by_id(id).await?;
        self.store.delete_by_id(id).await?;

        match self.api.remove_by_id(id).await {
            Ok(()) => {
                debug!(id, "post removed");
                Ok(())
            }
            Err(err) => {
                warn!(id, error = %err, "remove rejected, restoring row");
                if let Some(snapshot) = snapshot
                    && let Err(restore_err) = self.store.upsert(snapshot).await
                {
                    error!(id, error = %restore_err, "remove rollback failed");
                }
                Err(err.into())
            }
        }
    }

    /// Создаёт или обновляет пост на сервере и только после подтверждения
    /// записывает ответ в кэш.
    pub async fn save(&self, post: Post) -> AppResult<Post> {
        let _guard = if post.is_new() {
            None
        } else {
            Some(self.locks.acquire(post.id).await)
        };

        let saved = self.api.save(&post).await.map_err(|err| {
            warn!(id = post.id, error = %err, "save rejected");
            AppError::from(err)
        })?;

        let stored = self.store.upsert(saved).await?;
        debug!(id = stored.id, "post saved");
        Ok(stored)
    }
}

/// Выполняет последовательность на отдельной задаче: если вызывающий
/// future будет отброшен, откат всё равно доработает до конца.
async fn detached<T, F>(fut: F) -> AppResult<T>
where
    F: Future<Output = AppResult<T>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(fut)
        .await
        .map_err(|err| AppError::Unknown(format!("operation task failed: {err}")))?
}
