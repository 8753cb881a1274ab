//! Локальный кэш постов.

mod sqlite;

pub use sqlite::SqlitePostStore;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::StoreResult;
use crate::models::Post;

/// Хранилище постов с построчными атомарными операциями.
///
/// Любая мутация публикует новый список в [`PostStore::subscribe`] до того,
/// как вызов вернёт управление.
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Подписка на список всех постов (по убыванию `id`).
    fn subscribe(&self) -> watch::Receiver<Vec<Post>>;

    /// Все посты по убыванию `id`.
    async fn get_all(&self) -> StoreResult<Vec<Post>>;

    /// Текущее состояние строки `id`.
    async fn get_by_id(&self, id: i64) -> StoreResult<Option<Post>>;

    /// Вставляет пост или заменяет строку с тем же `id`.
    ///
    /// Для `id == 0` идентификатор выдаёт база. Возвращает сохранённую строку.
    async fn upsert(&self, post: Post) -> StoreResult<Post>;

    /// Пакетный [`PostStore::upsert`] одной транзакцией.
    async fn upsert_many(&self, posts: Vec<Post>) -> StoreResult<()>;

    /// Меняет только текст поста. Возвращает число изменённых строк.
    async fn update_content(&self, id: i64, content: &str) -> StoreResult<u64>;

    /// Переключает лайк одной командой: инвертирует `liked_by_me`
    /// и сдвигает `likes` на ±1. `None`, если строки нет.
    async fn toggle_like(&self, id: i64) -> StoreResult<Option<Post>>;

    /// Удаляет строку. Возвращает число удалённых строк.
    async fn delete_by_id(&self, id: i64) -> StoreResult<u64>;
}
