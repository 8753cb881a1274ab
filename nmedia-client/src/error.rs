use thiserror::Error;

#[derive(Debug, Error)]
/// Ошибки локального хранилища постов.
pub enum StoreError {
    /// Ошибка SQLite (`sqlx`).
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Не удалось применить схему.
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// Строка в базе не соответствует модели.
    #[error("corrupted row id={id}: {reason}")]
    Corrupted {
        /// Идентификатор строки.
        id: i64,
        /// Что именно не так.
        reason: String,
    },
}

/// Результат операций локального хранилища.
pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
/// Ошибки удалённого API постов.
pub enum RemoteError {
    /// Сервер ответил статусом вне 2xx.
    #[error("api error: status={status}, code={code}")]
    Api {
        /// HTTP-статус.
        status: u16,
        /// Машиночитаемый код ошибки.
        code: String,
    },

    /// Ответ не получен: соединение, таймаут, ввод-вывод.
    #[error("network error: {0}")]
    Network(String),

    /// Успешный ответ без тела там, где ожидался пост.
    #[error("empty response body")]
    EmptyBody,

    /// Тело ответа не разобрано.
    #[error("unexpected payload: {0}")]
    Decode(String),
}

/// Результат вызовов удалённого API.
pub type RemoteResult<T> = Result<T, RemoteError>;

impl RemoteError {
    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::Decode(err.to_string());
        }
        if let Some(status) = err.status() {
            return Self::Api {
                status: status.as_u16(),
                code: canonical_code(status),
            };
        }
        Self::Network(err.to_string())
    }
}

pub(crate) fn canonical_code(status: reqwest::StatusCode) -> String {
    status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| format!("http_{}", status.as_u16()))
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
/// Ошибка операции над лентой, которую видит вызывающий код.
pub enum AppError {
    /// Сервер отклонил запрос.
    #[error("api error {status}: {code}")]
    Api {
        /// HTTP-статус.
        status: u16,
        /// Машиночитаемый код ошибки.
        code: String,
    },

    /// Сетевая ошибка, ответ не получен.
    #[error("network error")]
    Network,

    /// Любая другая ошибка.
    #[error("unknown error: {0}")]
    Unknown(String),
}

/// Результат операций синхронизации.
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Код ошибки для пользовательских сообщений и логов.
    pub fn code(&self) -> &str {
        match self {
            Self::Api { code, .. } => code,
            Self::Network => "error_network",
            Self::Unknown(_) => "error_unknown",
        }
    }
}

impl From<RemoteError> for AppError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Api { status, code } => Self::Api { status, code },
            RemoteError::Network(_) => Self::Network,
            RemoteError::EmptyBody | RemoteError::Decode(_) => Self::Unknown(err.to_string()),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        Self::Unknown(err.to_string())
    }
}
