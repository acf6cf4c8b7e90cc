use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Deserialize)]
pub struct Config {
    pub discord_token: String,
    pub owner_id: Option<u64>,
    pub dev_guild_id: Option<u64>,
    pub register_commands: bool,
    pub database_url: String,
    pub feature_config_dir: PathBuf,
    pub status_message: String,

    // Content providers
    pub meme_api_url: String,
    pub quote_api_url: String,
    pub waifu_api_url: String,
    pub schedule_api_url: String,
    pub schedule_api_key: Option<String>,
    pub schedule_snapshot_path: PathBuf,

    // Timeouts
    pub http_timeout_secs: u64,
    pub schedule_timeout_secs: u64,
    pub rss_timeout_secs: u64,
    pub delivery_timeout_secs: u64,
}

pub const DEFAULT_MEME_API_URL: &str = "https://meme-api.com/gimme/animememes";
pub const DEFAULT_QUOTE_API_URL: &str = "https://yurippe.vercel.app/api/quotes";
pub const DEFAULT_WAIFU_API_URL: &str = "https://api.waifu.im/search";
pub const DEFAULT_SCHEDULE_API_URL: &str = "https://animeschedule.net/api/v3/timetables";

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();
        Self::build()
    }

    fn build() -> anyhow::Result<Self> {
        Ok(Config {
            discord_token: env::var("DISCORD_TOKEN")
                .map_err(|_| anyhow::anyhow!("DISCORD_TOKEN must be set"))?,
            owner_id: env::var("OWNER_ID").ok().and_then(|id| id.parse().ok()),
            dev_guild_id: env::var("DEV_GUILD_ID").ok().and_then(|id| id.parse().ok()),
            register_commands: env_or("REGISTER_COMMANDS", true),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "data/astrumotaku.db".to_string()),
            feature_config_dir: env::var("FEATURE_CONFIG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data")),
            status_message: env::var("STATUS_MESSAGE")
                .unwrap_or_else(|_| "With Waifus ❤️".to_string()),
            meme_api_url: env::var("MEME_API_URL")
                .unwrap_or_else(|_| DEFAULT_MEME_API_URL.to_string()),
            quote_api_url: env::var("QUOTE_API_URL")
                .unwrap_or_else(|_| DEFAULT_QUOTE_API_URL.to_string()),
            waifu_api_url: env::var("WAIFU_API_URL")
                .unwrap_or_else(|_| DEFAULT_WAIFU_API_URL.to_string()),
            schedule_api_url: env::var("SCHEDULE_API_URL")
                .unwrap_or_else(|_| DEFAULT_SCHEDULE_API_URL.to_string()),
            schedule_api_key: env::var("SCHEDULE_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty()),
            schedule_snapshot_path: env::var("SCHEDULE_SNAPSHOT_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("schedule.json")),
            http_timeout_secs: env_or("HTTP_TIMEOUT_SECS", 10),
            schedule_timeout_secs: env_or("SCHEDULE_TIMEOUT_SECS", 30),
            rss_timeout_secs: env_or("RSS_TIMEOUT_SECS", 20),
            delivery_timeout_secs: env_or("DELIVERY_TIMEOUT_SECS", 30),
        })
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery_timeout_secs)
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("discord_token", &"[REDACTED]")
            .field("owner_id", &self.owner_id)
            .field("dev_guild_id", &self.dev_guild_id)
            .field("register_commands", &self.register_commands)
            .field("database_url", &self.database_url)
            .field("feature_config_dir", &self.feature_config_dir)
            .field("status_message", &self.status_message)
            .field("meme_api_url", &self.meme_api_url)
            .field("quote_api_url", &self.quote_api_url)
            .field("waifu_api_url", &self.waifu_api_url)
            .field("schedule_api_url", &self.schedule_api_url)
            .field(
                "schedule_api_key",
                &self.schedule_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("schedule_snapshot_path", &self.schedule_snapshot_path)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("schedule_timeout_secs", &self.schedule_timeout_secs)
            .field("rss_timeout_secs", &self.rss_timeout_secs)
            .field("delivery_timeout_secs", &self.delivery_timeout_secs)
            .finish()
    }
}

/// Discord message limit is 2000 characters
pub const DISCORD_MESSAGE_LIMIT: usize = 2000;
/// Chunk size used when splitting long posts, leaving headroom under the limit
pub const DISCORD_CHUNK_SIZE: usize = DISCORD_MESSAGE_LIMIT - 100;
