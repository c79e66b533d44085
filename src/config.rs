use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

/// Settings for one `ApiClient` instance.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend origin, e.g. `https://crm.example.com/api`. Request paths are appended to it.
    pub base_url: String,
    /// Per-request timeout, applied to every outbound call.
    pub request_timeout: Duration,
    /// Upper bound on one token refresh, including time spent waiting in the queue.
    pub refresh_timeout: Duration,
    /// Path fragments whose 403s are surfaced to the caller even for reads,
    /// because the user asked for them explicitly.
    pub user_initiated_paths: Vec<String>,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout: Duration::from_secs(30),
            refresh_timeout: Duration::from_secs(15),
            user_initiated_paths: Vec::new(),
        }
    }

    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    pub fn with_user_initiated_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.user_initiated_paths = paths.into_iter().map(Into::into).collect();
        self
    }
}

/// Log output format for the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug)]
pub struct Config {
    pub client: ClientConfig,
    /// Where the CLI keeps its session between runs.
    pub session_file: PathBuf,
    pub log_format: LogFormat,
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let base_url = std::env::var("HEALTHCRM_API_URL")
        .context("HEALTHCRM_API_URL must be set to the backend base URL")?;
    url::Url::parse(&base_url)
        .with_context(|| format!("HEALTHCRM_API_URL is not a valid URL: {}", base_url))?;

    let client = ClientConfig {
        base_url,
        request_timeout: Duration::from_secs(
            std::env::var("HEALTHCRM_REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
        ),
        refresh_timeout: Duration::from_secs(
            std::env::var("HEALTHCRM_REFRESH_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(15),
        ),
        user_initiated_paths: parse_list(
            &std::env::var("HEALTHCRM_USER_INITIATED_PATHS").unwrap_or_default(),
        ),
    };

    Ok(Config {
        client,
        session_file: std::env::var("HEALTHCRM_SESSION_FILE")
            .unwrap_or_else(|_| ".healthcrm-session.json".into())
            .into(),
        log_format: match std::env::var("HEALTHCRM_LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Text,
        },
    })
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
