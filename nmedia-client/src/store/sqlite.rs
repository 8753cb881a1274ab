use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{FromRow, SqliteConnection};
use tokio::sync::{Mutex, watch};
use tracing::{debug, error};

use super::PostStore;
use crate::error::{StoreError, StoreResult};
use crate::models::Post;

#[derive(Debug)]
/// Кэш постов в SQLite.
///
/// Мутации выполняются под общим замком записи вместе с публикацией нового
/// списка, поэтому подписчики видят изменения в том же порядке, в каком они
/// применялись.
pub struct SqlitePostStore {
    pool: SqlitePool,
    write_lock: Mutex<()>,
    changes: watch::Sender<Vec<Post>>,
}

#[derive(Debug, FromRow)]
struct PostRow {
    id: i64,
    author: String,
    author_avatar: String,
    content: String,
    published: String,
    liked_by_me: bool,
    likes: i64,
}

const SELECT_ALL: &str = r#"
    SELECT id, author, author_avatar, content, published, liked_by_me, likes
    FROM posts
    ORDER BY id DESC
"#;

const SELECT_BY_ID: &str = r#"
    SELECT id, author, author_avatar, content, published, liked_by_me, likes
    FROM posts
    WHERE id = ?
"#;

const INSERT_NEW: &str = r#"
    INSERT INTO posts (author, author_avatar, content, published, liked_by_me, likes)
    VALUES (?, ?, ?, ?, ?, ?)
    RETURNING id, author, author_avatar, content, published, liked_by_me, likes
"#;

const UPSERT_BY_ID: &str = r#"
    INSERT INTO posts (id, author, author_avatar, content, published, liked_by_me, likes)
    VALUES (?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(id) DO UPDATE SET
        author = excluded.author,
        author_avatar = excluded.author_avatar,
        content = excluded.content,
        published = excluded.published,
        liked_by_me = excluded.liked_by_me,
        likes = excluded.likes
    RETURNING id, author, author_avatar, content, published, liked_by_me, likes
"#;

const TOGGLE_LIKE: &str = r#"
    UPDATE posts SET
        likes = CASE WHEN liked_by_me THEN MAX(likes - 1, 0) ELSE likes + 1 END,
        liked_by_me = NOT liked_by_me
    WHERE id = ?
    RETURNING id, author, author_avatar, content, published, liked_by_me, likes
"#;

impl SqlitePostStore {
    /// Открывает (или создаёт) файл базы по URL вида `sqlite://nmedia.db`.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    /// Хранилище в памяти процесса.
    ///
    /// Единственное соединение держится всё время жизни пула: с его закрытием
    /// данные пропадают.
    pub async fn in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    /// Применяет схему и загружает начальный снимок.
    pub async fn from_pool(pool: SqlitePool) -> StoreResult<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;

        let posts = fetch_all(&pool).await?;
        let (changes, _) = watch::channel(posts);

        Ok(Self {
            pool,
            write_lock: Mutex::new(()),
            changes,
        })
    }

    /// Рассылает подписчикам новый список. Запись к этому моменту уже
    /// зафиксирована, поэтому ошибка чтения не отменяет мутацию.
    async fn publish(&self) {
        match fetch_all(&self.pool).await {
            Ok(posts) => {
                debug!(count = posts.len(), "local store changed");
                self.changes.send_replace(posts);
            }
            Err(err) => error!(error = %err, "failed to publish local store change"),
        }
    }
}

#[async_trait]
impl PostStore for SqlitePostStore {
    fn subscribe(&self) -> watch::Receiver<Vec<Post>> {
        self.changes.subscribe()
    }

    async fn get_all(&self) -> StoreResult<Vec<Post>> {
        fetch_all(&self.pool).await
    }

    async fn get_by_id(&self, id: i64) -> StoreResult<Option<Post>> {
        let row = sqlx::query_as::<_, PostRow>(SELECT_BY_ID)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(map_row_to_post).transpose()
    }

    async fn upsert(&self, post: Post) -> StoreResult<Post> {
        let _guard = self.write_lock.lock().await;

        let mut conn = self.pool.acquire().await?;
        let row = upsert_row(&mut conn, &post).await?;
        drop(conn);

        let stored = map_row_to_post(row)?;
        self.publish().await;
        Ok(stored)
    }

    async fn upsert_many(&self, posts: Vec<Post>) -> StoreResult<()> {
        if posts.is_empty() {
            return Ok(());
        }

        let _guard = self.write_lock.lock().await;

        let mut tx = self.pool.begin().await?;
        for post in &posts {
            upsert_row(&mut tx, post).await?;
        }
        tx.commit().await?;

        self.publish().await;
        Ok(())
    }

    async fn update_content(&self, id: i64, content: &str) -> StoreResult<u64> {
        let _guard = self.write_lock.lock().await;

        let result = sqlx::query("UPDATE posts SET content = ? WHERE id = ?")
            .bind(content)
            .bind(id)
            .execute(&self.pool)
            .await?;

        let affected = result.rows_affected();
        if affected > 0 {
            self.publish().await;
        }
        Ok(affected)
    }

    async fn toggle_like(&self, id: i64) -> StoreResult<Option<Post>> {
        let _guard = self.write_lock.lock().await;

        let row = sqlx::query_as::<_, PostRow>(TOGGLE_LIKE)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let post = map_row_to_post(row)?;
        self.publish().await;
        Ok(Some(post))
    }

    async fn delete_by_id(&self, id: i64) -> StoreResult<u64> {
        let _guard = self.write_lock.lock().await;

        let result = sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        let affected = result.rows_affected();
        if affected > 0 {
            self.publish().await;
        }
        Ok(affected)
    }
}

async fn fetch_all(pool: &SqlitePool) -> StoreResult<Vec<Post>> {
    let rows = sqlx::query_as::<_, PostRow>(SELECT_ALL)
        .fetch_all(pool)
        .await?;

    rows.into_iter().map(map_row_to_post).collect()
}

async fn upsert_row(conn: &mut SqliteConnection, post: &Post) -> StoreResult<PostRow> {
    let row = if post.is_new() {
        sqlx::query_as::<_, PostRow>(INSERT_NEW)
            .bind(&post.author)
            .bind(&post.author_avatar)
            .bind(&post.content)
            .bind(&post.published)
            .bind(post.liked_by_me)
            .bind(i64::from(post.likes))
            .fetch_one(&mut *conn)
            .await?
    } else {
        sqlx::query_as::<_, PostRow>(UPSERT_BY_ID)
            .bind(post.id)
            .bind(&post.author)
            .bind(&post.author_avatar)
            .bind(&post.content)
            .bind(&post.published)
            .bind(post.liked_by_me)
            .bind(i64::from(post.likes))
            .fetch_one(&mut *conn)
            .await?
    };
    Ok(row)
}

fn map_row_to_post(row: PostRow) -> StoreResult<Post> {
    let likes = u32::try_from(row.likes).map_err(|_| StoreError::Corrupted {
        id: row.id,
        reason: format!("likes out of range: {}", row.likes),
    })?;

    Ok(Post {
        id: row.id,
        author: row.author,
        author_avatar: row.author_avatar,
        content: row.content,
        published: row.published,
        liked_by_me: row.liked_by_me,
        likes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_post(id: i64, likes: u32, liked_by_me: bool) -> Post {
        Post {
            id,
            author: "Netology".to_string(),
            author_avatar: "netology.jpg".to_string(),
            content: format!("post {id}"),
            published: "21 мая в 18:36".to_string(),
            liked_by_me,
            likes,
        }
    }

    async fn store() -> SqlitePostStore {
        SqlitePostStore::in_memory()
            .await
            .expect("in-memory store must open")
    }

    #[tokio::test]
    async fn upsert_new_post_gets_generated_id() {
        let store = store().await;
        let stored = store
            .upsert(sample_post(0, 0, false))
            .await
            .expect("upsert must succeed");

        assert_ne!(stored.id, 0);
        let all = store.get_all().await.expect("get_all must succeed");
        assert_eq!(all, vec![stored]);
    }

    #[tokio::test]
    async fn upsert_replaces_row_with_same_id() {
        let store = store().await;
        store
            .upsert(sample_post(5, 1, false))
            .await
            .expect("insert must succeed");

        let mut changed = sample_post(5, 9, true);
        changed.content = "changed".to_string();
        store
            .upsert(changed.clone())
            .await
            .expect("replace must succeed");

        let all = store.get_all().await.expect("get_all must succeed");
        assert_eq!(all, vec![changed]);
    }

    #[tokio::test]
    async fn get_all_orders_by_id_descending() {
        let store = store().await;
        store
            .upsert_many(vec![
                sample_post(2, 0, false),
                sample_post(10, 0, false),
                sample_post(7, 0, false),
            ])
            .await
            .expect("upsert_many must succeed");

        let ids: Vec<i64> = store
            .get_all()
            .await
            .expect("get_all must succeed")
            .iter()
            .map(|post| post.id)
            .collect();
        assert_eq!(ids, vec![10, 7, 2]);
    }

    #[tokio::test]
    async fn toggle_like_flips_flag_and_counter() {
        let store = store().await;
        store
            .upsert(sample_post(5, 3, false))
            .await
            .expect("insert must succeed");

        let liked = store
            .toggle_like(5)
            .await
            .expect("toggle must succeed")
            .expect("row must exist");
        assert!(liked.liked_by_me);
        assert_eq!(liked.likes, 4);

        let unliked = store
            .toggle_like(5)
            .await
            .expect("toggle must succeed")
            .expect("row must exist");
        assert!(!unliked.liked_by_me);
        assert_eq!(unliked.likes, 3);
    }

    #[tokio::test]
    async fn toggle_like_never_goes_below_zero() {
        let store = store().await;
        store
            .upsert(sample_post(1, 0, true))
            .await
            .expect("insert must succeed");

        let post = store
            .toggle_like(1)
            .await
            .expect("toggle must succeed")
            .expect("row must exist");
        assert_eq!(post.likes, 0);
        assert!(!post.liked_by_me);
    }

    #[tokio::test]
    async fn toggle_like_on_missing_row_returns_none() {
        let store = store().await;
        let result = store.toggle_like(404).await.expect("toggle must succeed");
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn update_content_changes_only_content() {
        let store = store().await;
        store
            .upsert(sample_post(3, 2, true))
            .await
            .expect("insert must succeed");

        let affected = store
            .update_content(3, "edited")
            .await
            .expect("update must succeed");
        assert_eq!(affected, 1);

        let post = store
            .get_by_id(3)
            .await
            .expect("get_by_id must succeed")
            .expect("row must exist");
        assert_eq!(post.content, "edited");
        assert_eq!(post.likes, 2);
        assert!(post.liked_by_me);

        let missing = store
            .update_content(99, "nope")
            .await
            .expect("update must succeed");
        assert_eq!(missing, 0);
    }

    #[tokio::test]
    async fn delete_by_id_reports_removed_count() {
        let store = store().await;
        store
            .upsert(sample_post(8, 0, false))
            .await
            .expect("insert must succeed");

        assert_eq!(store.delete_by_id(8).await.expect("delete must succeed"), 1);
        assert_eq!(store.delete_by_id(8).await.expect("delete must succeed"), 0);
        assert!(
            store
                .get_by_id(8)
                .await
                .expect("get_by_id must succeed")
                .is_none()
        );
    }

    #[tokio::test]
    async fn subscribers_see_mutation_before_call_returns() {
        let store = store().await;
        let mut rx = store.subscribe();
        assert!(rx.borrow().is_empty());

        store
            .upsert(sample_post(4, 1, false))
            .await
            .expect("insert must succeed");

        assert!(rx.has_changed().expect("sender must be alive"));
        let posts = rx.borrow_and_update().clone();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].id, 4);
    }

    #[tokio::test]
    async fn noop_mutations_do_not_notify() {
        let store = store().await;
        let rx = store.subscribe();

        store.delete_by_id(1).await.expect("delete must succeed");
        store.toggle_like(1).await.expect("toggle must succeed");
        store
            .upsert_many(Vec::new())
            .await
            .expect("upsert_many must succeed");

        assert!(!rx.has_changed().expect("sender must be alive"));
    }

    #[tokio::test]
    async fn committed_delete_survives_failed_publish() {
        let store = store().await;
        store
            .upsert(sample_post(1, 0, false))
            .await
            .expect("seed must succeed");
        // такой счётчик не помещается в u32, и перечитать таблицу не выйдет
        sqlx::query(
            "INSERT INTO posts (id, author, author_avatar, content, published, liked_by_me, likes) \
             VALUES (2, 'x', '', 'broken', 'now', 0, 5000000000)",
        )
        .execute(&store.pool)
        .await
        .expect("raw insert must succeed");

        let removed = store
            .delete_by_id(1)
            .await
            .expect("delete must report the committed write");
        assert_eq!(removed, 1);
        assert!(
            store
                .get_by_id(1)
                .await
                .expect("get_by_id must succeed")
                .is_none()
        );
    }
}
