use std::process;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use nmedia_client::{
    ActionDispatcher, FeedModel, FeedProjector, HttpPostsApi, Post, Reconciler, SqlitePostStore,
};
use tokio::task::JoinHandle;
use tracing::debug;

mod logging;
mod settings;

use logging::init_logging;
use settings::Settings;

#[derive(Debug, Parser)]
#[command(name = "nmedia-cli", version, about = "CLI клиент ленты постов с локальным кэшем")]
struct Cli {
    /// Базовый URL API (по умолчанию из API_BASE_URL).
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// URL локальной базы, например `sqlite://nmedia.db` (по умолчанию из DATABASE_URL).
    #[arg(long, global = true)]
    database: Option<String>,

    /// Печатать ленту в JSON.
    #[arg(long, global = true)]
    json: bool,

    /// Подробные логи синхронизации в stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Показать ленту из локального кэша без запроса к серверу.
    List,
    /// Загрузить ленту с сервера.
    Refresh,
    /// Загрузить один пост с сервера.
    Get {
        #[arg(long)]
        id: i64,
    },
    /// Создать пост.
    Create {
        #[arg(long)]
        content: String,
    },
    /// Изменить текст поста.
    ///
    /// Если поста нет в кэше, он сначала загружается с сервера.
    Edit {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        content: String,
    },
    /// Удалить пост.
    Delete {
        #[arg(long)]
        id: i64,
    },
    /// Поставить или снять лайк.
    Like {
        #[arg(long)]
        id: i64,
    },
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Ошибка: {err}");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let mut settings = Settings::from_env()?;
    if let Some(api_url) = cli.api_url {
        settings.api_base_url = api_url;
    }
    if let Some(database) = cli.database {
        settings.database_url = database;
    }

    init_logging(&settings.log_level, cli.verbose)?;
    debug!(api = %settings.api_base_url, db = %settings.database_url, "starting");

    let store = Arc::new(
        SqlitePostStore::connect(&settings.database_url)
            .await
            .with_context(|| format!("не удалось открыть {}", settings.database_url))?,
    );
    let api = Arc::new(
        HttpPostsApi::with_timeouts(
            settings.api_base_url.clone(),
            settings.connect_timeout(),
            settings.request_timeout(),
        )
        .context("не удалось создать HTTP-клиент")?,
    );

    let reconciler = Reconciler::new(store.clone(), api);
    let feed = FeedProjector::new(store);
    let dispatcher = ActionDispatcher::new(reconciler.clone(), feed, settings.author());

    match cli.command {
        Command::List => {}
        Command::Refresh => finish(&dispatcher, dispatcher.refresh()).await?,
        Command::Get { id } => {
            let post = reconciler
                .get_by_id(id)
                .await
                .map_err(|err| anyhow!("не удалось загрузить пост {id}: {err}"))?;
            print_post(&post, cli.json)?;
            return Ok(());
        }
        Command::Create { content } => finish(&dispatcher, dispatcher.create(content)).await?,
        Command::Edit { id, content } => {
            if dispatcher.start_edit(id).is_none() {
                reconciler
                    .get_by_id(id)
                    .await
                    .map_err(|err| anyhow!("не удалось загрузить пост {id}: {err}"))?;
            }
            let session = dispatcher
                .start_edit(id)
                .ok_or_else(|| anyhow!("пост {id} не найден"))?;
            finish(&dispatcher, dispatcher.edit(session, content)).await?;
        }
        Command::Delete { id } => finish(&dispatcher, dispatcher.delete(id)).await?,
        Command::Like { id } => {
            let cached = dispatcher
                .feed()
                .snapshot()
                .posts
                .iter()
                .any(|post| post.id == id);
            if !cached {
                return Err(anyhow!(
                    "пост {id} не найден в кэше: выполните `nmedia-cli refresh`"
                ));
            }
            finish(&dispatcher, dispatcher.toggle_like(id)).await?;
        }
    }

    print_feed(&dispatcher.feed().snapshot(), cli.json)
}

/// Дожидается действия и превращает сообщение диспетчера в ошибку CLI.
async fn finish(dispatcher: &ActionDispatcher, action: JoinHandle<()>) -> Result<()> {
    action.await.context("действие завершилось аварийно")?;
    match dispatcher.last_error() {
        Some(message) => Err(anyhow!(message)),
        None => Ok(()),
    }
}

fn print_post(post: &Post, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(post)?);
        return Ok(());
    }

    println!("[{}] {} ({})", post.id, post.author, post.published);
    println!("{}", post.content);
    println!("{} {}", like_mark(post), post.likes);
    Ok(())
}

fn print_feed(feed: &FeedModel, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&feed.posts)?);
        return Ok(());
    }

    if feed.empty {
        println!("Постов пока нет");
        return Ok(());
    }

    println!("Постов: {}", feed.posts.len());
    for post in &feed.posts {
        println!(
            "- [{}] {}: {} ({} {})",
            post.id,
            post.author,
            preview(&post.content),
            like_mark(post),
            post.likes
        );
    }
    Ok(())
}

fn like_mark(post: &Post) -> &'static str {
    if post.liked_by_me { "♥" } else { "♡" }
}

fn preview(content: &str) -> String {
    const LIMIT: usize = 60;

    let first_line = content.lines().next().unwrap_or_default();
    if first_line.chars().count() <= LIMIT && first_line.len() == content.len() {
        return first_line.to_string();
    }
    let cut: String = first_line.chars().take(LIMIT).collect();
    format!("{cut}…")
}
