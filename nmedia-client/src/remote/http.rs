use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use super::PostsApi;
use crate::error::{RemoteError, RemoteResult, canonical_code};
use crate::models::Post;

/// Адрес API по умолчанию.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:9999/api/slow";

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct ErrorResponseDto {
    code: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Clone)]
/// HTTP-клиент REST API постов.
pub struct HttpPostsApi {
    base_url: String,
    client: Client,
}

impl HttpPostsApi {
    /// Создаёт клиент с таймаутами по умолчанию.
    pub fn new(base_url: impl Into<String>) -> RemoteResult<Self> {
        Self::with_timeouts(base_url, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Создаёт клиент с явными таймаутами соединения и запроса.
    pub fn with_timeouts(
        base_url: impl Into<String>,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> RemoteResult<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .map_err(|err| RemoteError::Network(format!("failed to build http client: {err}")))?;

        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn decode_error(response: reqwest::Response) -> RemoteError {
        let status = response.status();

        let code = match response.json::<ErrorResponseDto>().await {
            Ok(body) => body.code.or(body.error),
            Err(_) => None,
        };
        RemoteError::Api {
            status: status.as_u16(),
            code: code.unwrap_or_else(|| canonical_code(status)),
        }
    }

    async fn send(&self, method: Method, path: &str) -> RemoteResult<reqwest::Response> {
        self.send_with(method, path, None::<&()>).await
    }

    /// отправляет запрос и отсекает ответы вне 2xx
    async fn send_with<TReq>(
        &self,
        method: Method,
        path: &str,
        body: Option<&TReq>,
    ) -> RemoteResult<reqwest::Response>
    where
        TReq: Serialize,
    {
        let url = self.endpoint(path);

        let mut request = self.client.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(RemoteError::from_reqwest)?;
        if !response.status().is_success() {
            return Err(Self::decode_error(response).await);
        }
        Ok(response)
    }

    async fn read_json<TRes>(response: reqwest::Response) -> RemoteResult<TRes>
    where
        TRes: DeserializeOwned,
    {
        let bytes = response.bytes().await.map_err(RemoteError::from_reqwest)?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(RemoteError::EmptyBody);
        }
        serde_json::from_slice(&bytes).map_err(|err| RemoteError::Decode(err.to_string()))
    }
}

#[async_trait]
impl PostsApi for HttpPostsApi {
    async fn get_all(&self) -> RemoteResult<Vec<Post>> {
        let response = self.send(Method::GET, "posts").await?;
        Self::read_json(response).await
    }

    async fn get_by_id(&self, id: i64) -> RemoteResult<Post> {
        let response = self.send(Method::GET, &format!("posts/{id}")).await?;
        Self::read_json(response).await
    }

    async fn save(&self, post: &Post) -> RemoteResult<Post> {
        let response = self.send_with(Method::POST, "posts", Some(post)).await?;
        Self::read_json(response).await
    }

    async fn remove_by_id(&self, id: i64) -> RemoteResult<()> {
        self.send(Method::DELETE, &format!("posts/{id}")).await?;
        Ok(())
    }

    async fn like_by_id(&self, id: i64) -> RemoteResult<Post> {
        let response = self.send(Method::POST, &format!("posts/{id}/likes")).await?;
        Self::read_json(response).await
    }

    async fn unlike_by_id(&self, id: i64) -> RemoteResult<Post> {
        let response = self
            .send(Method::DELETE, &format!("posts/{id}/likes"))
            .await?;
        Self::read_json(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_normalizes_slashes() {
        let api = HttpPostsApi::new("http://localhost:9999/api/slow/").expect("client must build");
        assert_eq!(
            api.endpoint("/posts/1/likes"),
            "http://localhost:9999/api/slow/posts/1/likes"
        );
    }

    #[test]
    fn endpoint_keeps_base_without_trailing_slash() {
        let api = HttpPostsApi::new(DEFAULT_BASE_URL).expect("client must build");
        assert_eq!(api.endpoint("posts"), "http://127.0.0.1:9999/api/slow/posts");
    }
}
