use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};
use chrono::Duration;

use quill_api::TokenConfig;

/// JWT secrets shipped in sample configs. Refusing them at startup.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "secret",
];

const DEFAULT_BLOCKED_WORDS: &str = "idiot,stupid,moron,dumb,loser";

#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub db_path: PathBuf,
    pub addr: SocketAddr,
    pub workers: usize,
    pub queue_capacity: usize,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub blocked_words: Vec<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let jwt_secret = get("QUILL_JWT_SECRET").unwrap_or_default();
        if jwt_secret.trim().is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("QUILL_JWT_SECRET is unset or still a placeholder; set it in your .env file");
        }

        let access_minutes: i64 = parse(&var("QUILL_ACCESS_TOKEN_MINUTES", "300"), "QUILL_ACCESS_TOKEN_MINUTES")?;
        let refresh_days: i64 = parse(&var("QUILL_REFRESH_TOKEN_DAYS", "1"), "QUILL_REFRESH_TOKEN_DAYS")?;
        if access_minutes <= 0 || refresh_days <= 0 {
            bail!("token lifetimes must be positive");
        }

        let host = var("QUILL_HOST", "0.0.0.0");
        let port: u16 = parse(&var("QUILL_PORT", "3000"), "QUILL_PORT")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid bind address {host}:{port}"))?;

        Ok(Self {
            jwt_secret,
            access_ttl: Duration::minutes(access_minutes),
            refresh_ttl: Duration::days(refresh_days),
            db_path: var("QUILL_DB_PATH", "quill.db").into(),
            addr,
            workers: parse(&var("QUILL_MODERATION_WORKERS", "2"), "QUILL_MODERATION_WORKERS")?,
            queue_capacity: parse(&var("QUILL_QUEUE_CAPACITY", "1024"), "QUILL_QUEUE_CAPACITY")?,
            gemini_api_key: get("QUILL_GEMINI_API_KEY").filter(|k| !k.trim().is_empty()),
            gemini_model: var("QUILL_GEMINI_MODEL", "gemini-2.0-flash"),
            blocked_words: var("QUILL_BLOCKED_WORDS", DEFAULT_BLOCKED_WORDS)
                .split(',')
                .map(|w| w.trim().to_string())
                .filter(|w| !w.is_empty())
                .collect(),
        })
    }

    pub fn token_config(&self) -> TokenConfig {
        TokenConfig {
            secret: self.jwt_secret.clone(),
            access_ttl: self.access_ttl,
            refresh_ttl: self.refresh_ttl,
        }
    }
}

fn parse<T>(raw: &str, key: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse()
        .with_context(|| format!("{key} has invalid value {raw:?}"))
}
