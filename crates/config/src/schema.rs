//! Config schema types (transport, downloads, access lists).

use std::path::PathBuf;

use {
    mangabot_channels::AccessPolicy,
    secrecy::{ExposeSecret, Secret},
    serde::Deserialize,
};

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub onebot: OneBotConfig,
    pub downloads: DownloadsConfig,
    pub access: AccessPolicy,
}

/// Connection to the OneBot-compatible WebSocket endpoint.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct OneBotConfig {
    /// WebSocket URL, e.g. `ws://localhost:8080/qq`.
    pub ws_url: String,

    /// Access token sent as `Authorization: Bearer <token>`.
    pub token: Option<Secret<String>>,

    /// Interval between client-side WebSocket pings.
    pub ping_interval_secs: u64,

    /// Upper bound for the reconnect backoff.
    pub max_backoff_secs: u64,
}

impl OneBotConfig {
    /// The WebSocket URL with any `token=`/`access_token=` query value masked,
    /// safe to log.
    pub fn redacted_url(&self) -> String {
        redact_token_param(&self.ws_url)
    }

    pub fn token(&self) -> Option<&str> {
        self.token
            .as_ref()
            .map(|t| t.expose_secret().as_str())
            .filter(|t| !t.is_empty())
    }
}

impl std::fmt::Debug for OneBotConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OneBotConfig")
            .field("ws_url", &self.redacted_url())
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("ping_interval_secs", &self.ping_interval_secs)
            .field("max_backoff_secs", &self.max_backoff_secs)
            .finish()
    }
}

impl Default for OneBotConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://localhost:8080/qq".into(),
            token: None,
            ping_interval_secs: 30,
            max_backoff_secs: 30,
        }
    }
}

/// Download queue, artifact directory and the external fetcher.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DownloadsConfig {
    /// Directory holding finished artifacts (`<id>-<title>.pdf`).
    pub path: PathBuf,

    /// How often an idle worker re-checks for shutdown.
    pub poll_interval_ms: u64,

    /// Tell the requester when their item is ready.
    pub notify_on_completion: bool,

    /// Tell the requester when their job was dropped after a failure.
    pub notify_on_failure: bool,

    /// Remove leftovers of failed downloads at startup.
    pub cleanup_on_start: bool,

    pub fetcher: FetcherConfig,
}

impl Default for DownloadsConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./downloads"),
            poll_interval_ms: 1000,
            notify_on_completion: true,
            notify_on_failure: true,
            cleanup_on_start: true,
            fetcher: FetcherConfig::default(),
        }
    }
}

/// External program that downloads an item and converts it into a single
/// artifact in the download directory.
///
/// `{id}` and `{dir}` in `args` are replaced with the identifier and the
/// download directory.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    pub program: String,
    pub args: Vec<String>,
}

impl FetcherConfig {
    pub fn is_configured(&self) -> bool {
        !self.program.trim().is_empty()
    }
}

fn redact_token_param(url: &str) -> String {
    let Some((base, query)) = url.split_once('?') else {
        return url.to_string();
    };
    let query = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((key, _)) if key == "token" || key == "access_token" => format!("{key}=****"),
            _ => pair.to_string(),
        })
        .collect::<Vec<_>>()
        .join("&");
    format!("{base}?{query}")
}
