use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use nmedia_client::PostAuthor;
use nmedia_client::remote::DEFAULT_BASE_URL;

const DEFAULT_DATABASE_URL: &str = "sqlite://nmedia.db";
const DEFAULT_AUTHOR: &str = "Me";

#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub(crate) api_base_url: String,
    pub(crate) database_url: String,
    pub(crate) log_level: String,
    pub(crate) http_connect_timeout_secs: u64,
    pub(crate) http_request_timeout_secs: u64,
    pub(crate) author_name: String,
    pub(crate) author_avatar: String,
}

impl Settings {
    pub(crate) fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_base_url = non_empty(&lookup, "API_BASE_URL")
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let database_url = non_empty(&lookup, "DATABASE_URL")
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
        let log_level = non_empty(&lookup, "LOG_LEVEL")
            .or_else(|| non_empty(&lookup, "RUST_LOG"))
            .unwrap_or_else(|| "warn".to_string());
        let http_connect_timeout_secs = parse_u64(&lookup, "HTTP_CONNECT_TIMEOUT_SECS", 5)?;
        let http_request_timeout_secs = parse_u64(&lookup, "HTTP_REQUEST_TIMEOUT_SECS", 15)?;
        let author_name =
            non_empty(&lookup, "AUTHOR_NAME").unwrap_or_else(|| DEFAULT_AUTHOR.to_string());
        let author_avatar = non_empty(&lookup, "AUTHOR_AVATAR").unwrap_or_default();

        Ok(Self {
            api_base_url,
            database_url,
            log_level,
            http_connect_timeout_secs,
            http_request_timeout_secs,
            author_name,
            author_avatar,
        })
    }

    pub(crate) fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.http_connect_timeout_secs)
    }

    pub(crate) fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.http_request_timeout_secs)
    }

    pub(crate) fn author(&self) -> PostAuthor {
        PostAuthor {
            name: self.author_name.clone(),
            avatar: self.author_avatar.clone(),
        }
    }
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_u64(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> Result<u64> {
    let value = match non_empty(lookup, key) {
        Some(raw) => raw
            .parse::<u64>()
            .with_context(|| format!("Failed to parse {key}, expecting positive integer"))?,
        None => default,
    };

    if value == 0 {
        return Err(anyhow!("{key} must be > 0"));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn settings_from(pairs: &[(&str, &str)]) -> Result<Settings> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Settings::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_env_is_empty() {
        let settings = settings_from(&[]).expect("defaults must be valid");
        assert_eq!(settings.api_base_url, DEFAULT_BASE_URL);
        assert_eq!(settings.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(settings.log_level, "warn");
        assert_eq!(settings.connect_timeout(), Duration::from_secs(5));
        assert_eq!(settings.request_timeout(), Duration::from_secs(15));
        assert_eq!(settings.author().name, DEFAULT_AUTHOR);
    }

    #[test]
    fn log_level_falls_back_to_rust_log() {
        let settings = settings_from(&[("RUST_LOG", "debug")]).expect("must be valid");
        assert_eq!(settings.log_level, "debug");
    }

    #[test]
    fn blank_values_are_ignored() {
        let settings = settings_from(&[("API_BASE_URL", "   ")]).expect("must be valid");
        assert_eq!(settings.api_base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = settings_from(&[("HTTP_REQUEST_TIMEOUT_SECS", "0")])
            .expect_err("zero timeout must fail");
        assert!(err.to_string().contains("HTTP_REQUEST_TIMEOUT_SECS"));
    }

    #[test]
    fn malformed_timeout_is_rejected() {
        assert!(settings_from(&[("HTTP_CONNECT_TIMEOUT_SECS", "soon")]).is_err());
    }

    #[test]
    fn author_comes_from_env() {
        let settings = settings_from(&[("AUTHOR_NAME", "Netology"), ("AUTHOR_AVATAR", "a.jpg")])
            .expect("must be valid");
        assert_eq!(
            settings.author(),
            PostAuthor {
                name: "Netology".to_string(),
                avatar: "a.jpg".to_string(),
            }
        );
    }
}
