use anyhow::Context as _;
use shelfmark_core::database::types::DedupPolicy;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
pub const LIBRARY_DATABASE_NAME: &str = "shelfmark.db";

/// Everything the server reads from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub database_path: PathBuf,
    /// Base URL of the identity provider's auth endpoints.
    pub auth_url: String,
    /// Public API key the provider expects on every request.
    pub auth_api_key: String,
    /// Public base URL of this deployment.
    pub site_url: String,
    pub dedup: DedupPolicy,
}

impl Config {
    /// Reads the configuration from `SHELFMARK_*` environment variables.
    /// # Errors
    /// Fails when a required variable is missing or a value does not parse.
    pub fn from_env() -> anyhow::Result<Self> {
        let bind_addr = env::var("SHELFMARK_ADDR")
            .unwrap_or_else(|_| String::from(DEFAULT_BIND_ADDR))
            .parse()
            .context("SHELFMARK_ADDR is not a valid socket address")?;
        let database_path = PathBuf::from(
            env::var("SHELFMARK_DB").unwrap_or_else(|_| String::from(LIBRARY_DATABASE_NAME)),
        );
        let auth_url = env::var("SHELFMARK_AUTH_URL")
            .context("SHELFMARK_AUTH_URL must point at the identity provider")?;
        let auth_api_key = env::var("SHELFMARK_AUTH_KEY")
            .context("SHELFMARK_AUTH_KEY is required to talk to the identity provider")?;
        let site_url =
            env::var("SHELFMARK_SITE_URL").unwrap_or_else(|_| format!("http://{bind_addr}"));
        let dedup = match env::var("SHELFMARK_DEDUP").as_deref() {
            Ok("folded") => DedupPolicy::Folded,
            Ok("exact") | Err(_) => DedupPolicy::Exact,
            Ok(other) => anyhow::bail!("Unknown SHELFMARK_DEDUP value: {other}"),
        };

        Ok(Self {
            bind_addr,
            database_path,
            auth_url,
            auth_api_key,
            site_url,
            dedup,
        })
    }
}
