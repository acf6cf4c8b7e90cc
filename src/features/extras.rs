use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Feature-specific keys stored next to the common ones in a feature file.
pub trait Extras:
    Serialize + DeserializeOwned + Default + Clone + Debug + PartialEq + Send + Sync + 'static
{
    const DEFAULT_INTERVAL_MINUTES: u64 = 60;

    /// Wall-clock `HH:MM` (UTC) for daily features.
    fn post_time(&self) -> Option<&str> {
        None
    }

    /// Maximum number of items broadcast per cycle.
    fn post_limit(&self) -> usize {
        1
    }

    fn seen_guids(&self) -> &[String] {
        &[]
    }

    fn set_seen_guids(&mut self, _guids: Vec<String>) {}
}

/// Meme and quote features carry only the common keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoExtras {}

impl Extras for NoExtras {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaifuExtras {
    /// Restrict manual spawning to `owner_ids`.
    pub only_spawner: bool,
    pub owner_ids: Vec<u64>,
    pub tags: Vec<String>,
    pub nsfw: bool,
}

impl Default for WaifuExtras {
    fn default() -> Self {
        Self {
            only_spawner: false,
            owner_ids: Vec::new(),
            tags: vec!["waifu".to_string()],
            nsfw: false,
        }
    }
}

impl WaifuExtras {
    pub fn may_spawn(&self, user_id: u64) -> bool {
        !self.only_spawner || self.owner_ids.contains(&user_id)
    }
}

impl Extras for WaifuExtras {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleExtras {
    pub post_time: String,
}

impl Default for ScheduleExtras {
    fn default() -> Self {
        Self {
            post_time: "01:00".to_string(),
        }
    }
}

impl Extras for ScheduleExtras {
    const DEFAULT_INTERVAL_MINUTES: u64 = 1440;

    fn post_time(&self) -> Option<&str> {
        Some(&self.post_time)
    }
}

pub const DEFAULT_RSS_URL: &str = "https://animeschedule.net/subrss.xml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RssExtras {
    pub rss_url: String,
    pub post_limit: usize,
    pub seen_guids: Vec<String>,
}

impl Default for RssExtras {
    fn default() -> Self {
        Self {
            rss_url: DEFAULT_RSS_URL.to_string(),
            post_limit: 5,
            seen_guids: Vec::new(),
        }
    }
}

impl Extras for RssExtras {
    const DEFAULT_INTERVAL_MINUTES: u64 = 5;

    fn post_limit(&self) -> usize {
        self.post_limit.max(1)
    }

    fn seen_guids(&self) -> &[String] {
        &self.seen_guids
    }

    fn set_seen_guids(&mut self, guids: Vec<String>) {
        self.seen_guids = guids;
    }
}
