use serde::{Deserialize, Serialize};

/// Значение `published` для черновика: настоящее время проставляет сервер.
pub const DRAFT_PUBLISHED: &str = "now";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// Пост ленты в том виде, в каком его хранит локальный кэш и отдаёт сервер.
pub struct Post {
    /// Идентификатор поста; `0` у поста, ещё не сохранённого на сервере.
    pub id: i64,
    /// Имя автора.
    pub author: String,
    /// Ссылка на аватар автора.
    #[serde(default)]
    pub author_avatar: String,
    /// Текст поста.
    pub content: String,
    /// Время публикации в строковом виде.
    pub published: String,
    /// Стоит ли лайк текущего пользователя.
    #[serde(default)]
    pub liked_by_me: bool,
    /// Количество лайков.
    #[serde(default)]
    pub likes: u32,
}

impl Post {
    /// Шаблон нового поста от имени `author`: `id == 0`, без лайков.
    pub fn draft(author: &PostAuthor, content: &str) -> Self {
        Self {
            id: 0,
            author: author.name.clone(),
            author_avatar: author.avatar.clone(),
            content: content.trim().to_string(),
            published: DRAFT_PUBLISHED.to_string(),
            liked_by_me: false,
            likes: 0,
        }
    }

    /// Пост ещё не получил идентификатор от сервера.
    pub fn is_new(&self) -> bool {
        self.id == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Автор, от имени которого создаются новые посты.
pub struct PostAuthor {
    /// Отображаемое имя.
    pub name: String,
    /// Ссылка на аватар (может быть пустой).
    pub avatar: String,
}

impl PostAuthor {
    /// Создаёт автора с пустым аватаром.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            avatar: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Снимок ленты: посты от новых к старым и признак пустоты.
pub struct FeedModel {
    /// Посты, отсортированные по убыванию `id`.
    pub posts: Vec<Post>,
    /// `true`, если постов нет.
    pub empty: bool,
}

impl From<Vec<Post>> for FeedModel {
    fn from(posts: Vec<Post>) -> Self {
        let empty = posts.is_empty();
        Self { posts, empty }
    }
}

impl From<&[Post]> for FeedModel {
    fn from(posts: &[Post]) -> Self {
        Self::from(posts.to_vec())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
/// Состояние загрузки ленты.
pub struct FeedState {
    /// Идёт обновление ленты с сервера.
    pub loading: bool,
    /// Последнее обновление завершилось ошибкой.
    pub error: bool,
    /// Идёт создание или редактирование поста.
    pub saving: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Разовые события ленты.
pub enum FeedEvent {
    /// Сервер подтвердил создание или редактирование поста.
    PostSaved(Post),
}
