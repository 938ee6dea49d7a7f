//! Configuration for the bot token and club timings
//!
//! Loads an optional YAML file; environment variables take precedence.

use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::club::genres::{DEFAULT_GENRES, MAX_POLL_OPTIONS};
use crate::error::{Error, Result};

/// Default config file name
pub const CONFIG_FILE: &str = "config.yml";
/// Default duration of every phase (genre poll, collection, book poll)
pub const DEFAULT_PHASE_SECS: u64 = 5 * 60;

pub const TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";
pub const PUBLIC_URL_ENV: &str = "RENDER_EXTERNAL_URL";

/// YAML config structures
#[derive(Debug, Default, Deserialize)]
struct YamlConfig {
    telegram: Option<TelegramConfig>,
    club: Option<ClubConfig>,
    server: Option<ServerConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct TelegramConfig {
    token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ClubConfig {
    genre_poll_secs: Option<u64>,
    collection_secs: Option<u64>,
    book_poll_secs: Option<u64>,
    genres: Option<Vec<String>>,
    admins: Option<Vec<u64>>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerConfig {
    public_url: Option<String>,
}

/// Timings, genre catalog and admin list used by the cycle engine.
#[derive(Debug, Clone)]
pub struct ClubSettings {
    pub genre_poll: Duration,
    pub collection: Duration,
    pub book_poll: Duration,
    pub genres: Vec<String>,
    /// Users allowed to `/close` and `/cancel`. Empty means everyone.
    pub admins: HashSet<u64>,
}

impl Default for ClubSettings {
    fn default() -> Self {
        Self {
            genre_poll: Duration::from_secs(DEFAULT_PHASE_SECS),
            collection: Duration::from_secs(DEFAULT_PHASE_SECS),
            book_poll: Duration::from_secs(DEFAULT_PHASE_SECS),
            genres: DEFAULT_GENRES.iter().map(|g| g.to_string()).collect(),
            admins: HashSet::new(),
        }
    }
}

impl ClubSettings {
    pub fn is_admin(&self, user_id: u64) -> bool {
        self.admins.is_empty() || self.admins.contains(&user_id)
    }
}

/// Main configuration struct
#[derive(Debug, Clone)]
pub struct Config {
    pub token: String,
    /// Externally reachable base URL of the deployment, if any
    pub public_url: Option<String>,
    pub club: ClubSettings,
}

impl Config {
    /// Load configuration from `path` (if it exists) and the process environment.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = if path.exists() {
            Some(fs::read_to_string(path)?)
        } else {
            None
        };
        Self::from_sources(content.as_deref(), |key| std::env::var(key).ok())
    }

    /// Build configuration from optional YAML text and an environment lookup.
    pub fn from_sources<F>(yaml: Option<&str>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let yaml: YamlConfig = match yaml {
            Some(text) if !text.trim().is_empty() => serde_yaml::from_str(text)?,
            _ => YamlConfig::default(),
        };

        let telegram = yaml.telegram.unwrap_or_default();
        let club = yaml.club.unwrap_or_default();
        let server = yaml.server.unwrap_or_default();

        let token = resolve_string(telegram.token, TOKEN_ENV, &env)
            .ok_or_else(|| Error::ConfigMissing(TOKEN_ENV.to_string()))?;
        let public_url = resolve_string(server.public_url, PUBLIC_URL_ENV, &env);

        let mut settings = ClubSettings {
            genre_poll: resolve_secs(club.genre_poll_secs, "GENRE_POLL_SECS", &env)?,
            collection: resolve_secs(club.collection_secs, "COLLECTION_SECS", &env)?,
            book_poll: resolve_secs(club.book_poll_secs, "BOOK_POLL_SECS", &env)?,
            ..ClubSettings::default()
        };

        if let Some(genres) = club.genres {
            let genres: Vec<String> = genres
                .into_iter()
                .map(|g| g.trim().to_string())
                .filter(|g| !g.is_empty())
                .collect();
            if genres.len() < 2 || genres.len() > MAX_POLL_OPTIONS {
                return Err(Error::Config(format!(
                    "club.genres must list between 2 and {} genres, got {}",
                    MAX_POLL_OPTIONS,
                    genres.len()
                )));
            }
            settings.genres = genres;
        }

        settings.admins = match env("BOOK_CLUB_ADMINS") {
            Some(list) => parse_admins(&list),
            None => club.admins.unwrap_or_default().into_iter().collect(),
        };

        Ok(Self {
            token,
            public_url,
            club: settings,
        })
    }
}

/// Resolve a string: env var wins, then `${VAR}` placeholders, then the literal YAML value.
fn resolve_string<F>(value: Option<String>, env_key: &str, env: &F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(env_val) = env(env_key).filter(|v| !v.trim().is_empty()) {
        return Some(env_val.trim().to_string());
    }
    let value = value?;
    if value.starts_with("${") && value.ends_with('}') {
        let var_name = &value[2..value.len() - 1];
        return env(var_name).filter(|v| !v.trim().is_empty());
    }
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn resolve_secs<F>(value: Option<u64>, env_key: &str, env: &F) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let secs = match env(env_key) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|e| Error::Config(format!("{env_key}={raw}: {e}")))?,
        None => value.unwrap_or(DEFAULT_PHASE_SECS),
    };
    if secs == 0 {
        return Err(Error::Config(format!("{env_key} must be positive")));
    }
    Ok(Duration::from_secs(secs))
}

fn parse_admins(list: &str) -> HashSet<u64> {
    list.split(',')
        .filter_map(|s| s.trim().parse::<u64>().ok())
        .collect()
}
