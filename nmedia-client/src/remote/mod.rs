//! Удалённый API постов.

mod http;

pub use http::{DEFAULT_BASE_URL, HttpPostsApi};

use async_trait::async_trait;

use crate::error::RemoteResult;
use crate::models::Post;

/// Запрос-ответ к серверу постов. Не трогает локальное состояние и не
/// повторяет запросы.
#[async_trait]
pub trait PostsApi: Send + Sync {
    /// Все посты сервера.
    async fn get_all(&self) -> RemoteResult<Vec<Post>>;

    /// Пост по идентификатору.
    async fn get_by_id(&self, id: i64) -> RemoteResult<Post>;

    /// Создаёт пост (`id == 0`) или обновляет существующий.
    ///
    /// Ответ содержит итоговые `id`, текст и счётчики.
    async fn save(&self, post: &Post) -> RemoteResult<Post>;

    /// Удаляет пост.
    async fn remove_by_id(&self, id: i64) -> RemoteResult<()>;

    /// Ставит лайк.
    async fn like_by_id(&self, id: i64) -> RemoteResult<Post>;

    /// Снимает лайк.
    async fn unlike_by_id(&self, id: i64) -> RemoteResult<Post>;
}
