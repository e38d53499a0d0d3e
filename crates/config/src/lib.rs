//! Configuration loading for the bot.
//!
//! Config file: `mangabot.toml`, searched in `./` then `~/.config/mangabot/`.
//! Environment variables (`NAPCAT_WS_URL`, `MANGA_DOWNLOAD_PATH`,
//! `GLOBAL_BLACKLIST`, ...) override file values.

pub mod error;
pub mod loader;
pub mod schema;

pub use {
    error::{Error, Result},
    loader::{apply_env_overrides, config_dir, discover_and_load, load_config, parse_id_list},
    schema::{BotConfig, DownloadsConfig, FetcherConfig, OneBotConfig},
};
