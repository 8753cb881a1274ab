//! Точки входа пользовательских действий над лентой.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::debug;
use validator::Validate;

use crate::error::AppError;
use crate::feed::FeedProjector;
use crate::models::{FeedEvent, Post, PostAuthor};
use crate::reconciler::Reconciler;

const EVENTS_CAPACITY: usize = 16;

#[derive(Debug, Validate)]
struct ContentInput {
    #[validate(length(min = 1, max = 10000))]
    content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Сессия редактирования: пост, который пользователь открыл на правку.
pub struct EditSession {
    post: Post,
}

impl EditSession {
    /// Начинает правку указанного поста.
    pub fn new(post: Post) -> Self {
        Self { post }
    }

    /// Идентификатор редактируемого поста.
    pub fn id(&self) -> i64 {
        self.post.id
    }

    /// Пост в том виде, в каком его открыли на правку.
    pub fn post(&self) -> &Post {
        &self.post
    }
}

#[derive(Clone)]
/// Диспетчер действий пользователя.
///
/// Каждое действие выполняется отдельной задачей; ошибки не пробрасываются
/// вызывающему, а превращаются в сообщение в [`ActionDispatcher::errors`].
/// Флаги `loading` и `saving` держатся, пока не завершится последнее
/// из одновременно запущенных обновлений или сохранений.
pub struct ActionDispatcher {
    reconciler: Reconciler,
    feed: FeedProjector,
    author: PostAuthor,
    errors: Arc<watch::Sender<Option<String>>>,
    events: broadcast::Sender<FeedEvent>,
    refreshes: Arc<AtomicUsize>,
    saves: Arc<AtomicUsize>,
}

impl ActionDispatcher {
    /// Создаёт диспетчер. Лента не загружается, пока не вызван `refresh`.
    pub fn new(reconciler: Reconciler, feed: FeedProjector, author: PostAuthor) -> Self {
        let (errors, _) = watch::channel(None);
        let (events, _) = broadcast::channel(EVENTS_CAPACITY);
        Self {
            reconciler,
            feed,
            author,
            errors: Arc::new(errors),
            events,
            refreshes: Arc::default(),
            saves: Arc::default(),
        }
    }

    /// Проекция ленты, которую обновляют действия.
    pub fn feed(&self) -> &FeedProjector {
        &self.feed
    }

    /// Подписка на последнее сообщение об ошибке.
    pub fn errors(&self) -> watch::Receiver<Option<String>> {
        self.errors.subscribe()
    }

    /// Последнее сообщение об ошибке.
    pub fn last_error(&self) -> Option<String> {
        self.errors.borrow().clone()
    }

    /// Сбрасывает сообщение об ошибке.
    pub fn clear_error(&self) {
        self.errors.send_replace(None);
    }

    /// Подписка на разовые события ленты.
    pub fn events(&self) -> broadcast::Receiver<FeedEvent> {
        self.events.subscribe()
    }

    /// Обновляет ленту с сервера.
    pub fn refresh(&self) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            this.feed.update_state(|state| {
                this.refreshes.fetch_add(1, Ordering::SeqCst);
                state.loading = true;
                state.error = false;
            });

            let result = this.reconciler.refresh().await;
            this.feed.update_state(|state| {
                state.loading = this.refreshes.fetch_sub(1, Ordering::SeqCst) > 1;
                state.error = result.is_err();
            });

            if let Err(err) = result {
                this.report(format!("Не удалось загрузить посты ({})", err.code()));
            }
        })
    }

    /// Создаёт новый пост с указанным текстом.
    pub fn create(&self, content: impl Into<String>) -> JoinHandle<()> {
        let draft = Post::draft(&self.author, &content.into());
        self.spawn_save(draft)
    }

    /// Открывает пост из текущей ленты на редактирование.
    pub fn start_edit(&self, id: i64) -> Option<EditSession> {
        self.feed
            .snapshot()
            .posts
            .into_iter()
            .find(|post| post.id == id)
            .map(EditSession::new)
    }

    /// Сохраняет новый текст поста из сессии редактирования.
    pub fn edit(&self, session: EditSession, content: impl Into<String>) -> JoinHandle<()> {
        let mut post = session.post;
        post.content = content.into().trim().to_string();
        self.spawn_save(post)
    }

    /// Удаляет пост.
    pub fn delete(&self, id: i64) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(err) = this.reconciler.remove_by_id(id).await {
                this.report(format!("Ошибка при удалении поста ({}), повторите", err.code()));
            }
        })
    }

    /// Ставит или снимает лайк. Посты, которых нет в ленте, пропускаются.
    pub fn toggle_like(&self, id: i64) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            if !this.feed.snapshot().posts.iter().any(|post| post.id == id) {
                debug!(id, "like ignored: post is not in the feed");
                return;
            }

            if let Err(err) = this.reconciler.toggle_like(id).await {
                this.report(format!("Не удалось поставить лайк ({}), повторите", err.code()));
            }
        })
    }

    fn spawn_save(&self, post: Post) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let input = ContentInput {
                content: post.content.clone(),
            };
            if input.validate().is_err() {
                this.report("Текст поста не может быть пустым или длиннее 10000 символов");
                return;
            }

            this.feed.update_state(|state| {
                this.saves.fetch_add(1, Ordering::SeqCst);
                state.saving = true;
            });
            let result = this.reconciler.save(post).await;
            this.feed.update_state(|state| {
                state.saving = this.saves.fetch_sub(1, Ordering::SeqCst) > 1;
            });

            match result {
                Ok(saved) => {
                    // без подписчиков событие теряется
                    let _ = this.events.send(FeedEvent::PostSaved(saved));
                }
                Err(err) => this.report(save_error_message(&err)),
            }
        })
    }

    fn report(&self, message: impl Into<String>) {
        self.errors.send_replace(Some(message.into()));
    }
}

fn save_error_message(err: &AppError) -> String {
    match err {
        AppError::Network => "Нет соединения с сервером, повторите попытку".to_string(),
        _ => format!("Не удалось сохранить пост ({}), повторите попытку", err.code()),
    }
}
