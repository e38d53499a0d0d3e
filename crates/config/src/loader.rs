use std::path::{Path, PathBuf};

use {
    secrecy::Secret,
    tracing::{debug, warn},
};

use crate::{
    error::{Error, Result},
    schema::BotConfig,
};

/// Standard config file name.
const CONFIG_FILENAME: &str = "mangabot.toml";

/// Load config from an explicit TOML file and apply environment overrides.
pub fn load_config(path: &Path) -> Result<BotConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut config: BotConfig = toml::from_str(&raw)?;
    apply_env_overrides(&mut config);
    normalize(&mut config);
    Ok(config)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./mangabot.toml` (project-local)
/// 2. `~/.config/mangabot/mangabot.toml` (user-global)
///
/// Falls back to `BotConfig::default()` if no file is found or the file is
/// invalid. Environment overrides apply in every case.
pub fn discover_and_load() -> BotConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    let mut config = BotConfig::default();
    apply_env_overrides(&mut config);
    normalize(&mut config);
    config
}

fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(CONFIG_FILENAME);
    if local.exists() {
        return Some(local);
    }
    config_dir()
        .map(|dir| dir.join(CONFIG_FILENAME))
        .filter(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/mangabot/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "mangabot").map(|d| d.config_dir().to_path_buf())
}

/// Apply overrides from the process environment.
pub fn apply_env_overrides(config: &mut BotConfig) {
    apply_env_overrides_with(config, |name| std::env::var(name).ok());
}

/// Apply overrides using an arbitrary lookup (the process environment in
/// production, a map in tests).
///
/// Variable names are the ones the bot has always been deployed with.
pub fn apply_env_overrides_with<F>(config: &mut BotConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup("NAPCAT_WS_URL").filter(|v| !v.trim().is_empty()) {
        config.onebot.ws_url = url.trim().to_string();
    }
    if let Some(token) = lookup("NAPCAT_TOKEN").filter(|v| !v.trim().is_empty()) {
        config.onebot.token = Some(Secret::new(token.trim().to_string()));
    }
    if let Some(path) = lookup("MANGA_DOWNLOAD_PATH").filter(|v| !v.trim().is_empty()) {
        config.downloads.path = PathBuf::from(path.trim());
    }
    if let Some(list) = lookup("GROUP_WHITELIST") {
        config.access.group_whitelist = parse_id_list(&list).collect();
    }
    if let Some(list) = lookup("PRIVATE_WHITELIST") {
        config.access.private_whitelist = parse_id_list(&list).collect();
    }
    if let Some(list) = lookup("GLOBAL_BLACKLIST") {
        config.access.global_blacklist = parse_id_list(&list).collect();
    }
}

/// Split a comma-separated id list, trimming entries and dropping empty ones.
pub fn parse_id_list(raw: &str) -> impl Iterator<Item = String> + '_ {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Expand `~` and make the download path absolute.
fn normalize(config: &mut BotConfig) {
    config.downloads.path = absolutize(&expand_home(&config.downloads.path));
}

fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match directories::BaseDirs::new() {
        Some(dirs) => dirs.home_dir().join(rest),
        None => path.to_path_buf(),
    }
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(e) => {
            warn!(error = %e, "cannot resolve current directory, keeping relative path");
            path.to_path_buf()
        },
    }
}
