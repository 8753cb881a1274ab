//! Клиентский слой данных ленты постов.
//!
//! Держит локальный кэш постов (SQLite), синхронизирует его с сервером по HTTP
//! и применяет действия пользователя оптимистично, с откатом при ошибке:
//! - [`store`]: локальный кэш и его лента изменений;
//! - [`remote`]: API сервера (`reqwest`);
//! - [`Reconciler`]: оптимистичное применение, подтверждение, откат;
//! - [`FeedProjector`]: наблюдаемый снимок ленты и флаги загрузки;
//! - [`ActionDispatcher`]: точки входа действий пользователя.
#![warn(missing_docs)]

mod dispatcher;
mod error;
mod feed;
mod models;
mod reconciler;

pub mod remote;
pub mod store;

pub use dispatcher::{ActionDispatcher, EditSession};
pub use error::{AppError, AppResult, RemoteError, RemoteResult, StoreError, StoreResult};
pub use feed::{FeedProjector, FeedSubscription};
pub use models::{DRAFT_PUBLISHED, FeedEvent, FeedModel, FeedState, Post, PostAuthor};
pub use reconciler::Reconciler;
pub use remote::{HttpPostsApi, PostsApi};
pub use store::{PostStore, SqlitePostStore};
