pub mod extras;
pub mod store;
pub mod validate;

pub use extras::{Extras, NoExtras, RssExtras, ScheduleExtras, WaifuExtras};
pub use store::{DestinationRef, FeatureConfig, FeatureHandle, FeatureStore};
pub use validate::ValidationError;

use serde_json::{Map, Value};
use std::path::Path;

/// An independently configurable auto-posting behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, poise::ChoiceParameter)]
pub enum Feature {
    #[name = "meme"]
    Meme,
    #[name = "quote"]
    Quote,
    #[name = "waifu"]
    Waifu,
    #[name = "schedule"]
    Schedule,
    #[name = "rss"]
    Rss,
}

const COMMON_KEYS: [&str; 3] = ["enabled", "channel_id", "interval_minutes"];

impl Feature {
    pub const ALL: [Feature; 5] = [
        Feature::Meme,
        Feature::Quote,
        Feature::Waifu,
        Feature::Schedule,
        Feature::Rss,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Feature::Meme => "meme",
            Feature::Quote => "quote",
            Feature::Waifu => "waifu",
            Feature::Schedule => "schedule",
            Feature::Rss => "rss",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Feature::Meme => "Meme",
            Feature::Quote => "Quotes",
            Feature::Waifu => "Waifu Spawn",
            Feature::Schedule => "Schedule",
            Feature::Rss => "RSS",
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            Feature::Meme => "memesConfig.json",
            Feature::Quote => "quotesConfig.json",
            Feature::Waifu => "waifuConfig.json",
            Feature::Schedule => "scheduleConfig.json",
            Feature::Rss => "rssConfig.json",
        }
    }

    /// Lower bound for admin-configured intervals.
    pub fn min_interval_minutes(self) -> u64 {
        match self {
            Feature::Rss => 1,
            _ => 10,
        }
    }
}

/// Display-ready snapshot of one feature's configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigView {
    pub feature: Feature,
    pub enabled: bool,
    pub destinations: Vec<DestinationRef>,
    pub interval_minutes: u64,
    pub extras: Vec<(String, String)>,
}

/// Type-erased access to a feature's store for admin commands.
pub trait ConfigHandle: Send + Sync {
    fn feature(&self) -> Feature;
    fn view(&self) -> ConfigView;
    /// Current configuration as the JSON object written to disk.
    fn raw(&self) -> Map<String, Value>;
    fn supports(&self, key: &str) -> bool;
    fn apply(&self, partial: Map<String, Value>) -> Result<ConfigView, ValidationError>;
    fn reset(&self) -> ConfigView;
}

impl<X: Extras> ConfigHandle for FeatureHandle<X> {
    fn feature(&self) -> Feature {
        FeatureHandle::feature(self)
    }

    fn view(&self) -> ConfigView {
        build_view(FeatureHandle::feature(self), &self.snapshot())
    }

    fn raw(&self) -> Map<String, Value> {
        match serde_json::to_value(self.snapshot()) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    fn supports(&self, key: &str) -> bool {
        match serde_json::to_value(FeatureConfig::<X>::default()) {
            Ok(Value::Object(map)) => map.contains_key(key),
            _ => false,
        }
    }

    fn apply(&self, partial: Map<String, Value>) -> Result<ConfigView, ValidationError> {
        let feature = FeatureHandle::feature(self);
        if let Some(key) = partial.keys().find(|key| !self.supports(key)) {
            return Err(ValidationError::UnsupportedSetting {
                feature: feature.key(),
                key: key.clone(),
            });
        }
        let updated = self.update(partial)?;
        Ok(build_view(feature, &updated))
    }

    fn reset(&self) -> ConfigView {
        build_view(FeatureHandle::feature(self), &self.clear())
    }
}

fn build_view<X: Extras>(feature: Feature, config: &FeatureConfig<X>) -> ConfigView {
    let mut extras = Vec::new();
    if let Ok(Value::Object(map)) = serde_json::to_value(&config.extras) {
        for (key, value) in map {
            if COMMON_KEYS.contains(&key.as_str()) {
                continue;
            }
            extras.push((key.clone(), render_value(&key, &value)));
        }
    }

    ConfigView {
        feature,
        enabled: config.enabled,
        destinations: config.destinations.clone(),
        interval_minutes: config.interval_minutes,
        extras,
    }
}

fn render_value(key: &str, value: &Value) -> String {
    match value {
        Value::Array(items) if key == "seen_guids" => format!("{} tracked", items.len()),
        Value::Array(items) if items.is_empty() => "None".to_string(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(", "),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// All feature stores, loaded once at startup.
#[derive(Clone)]
pub struct FeatureRegistry {
    pub meme: FeatureHandle<NoExtras>,
    pub quote: FeatureHandle<NoExtras>,
    pub waifu: FeatureHandle<WaifuExtras>,
    pub schedule: FeatureHandle<ScheduleExtras>,
    pub rss: FeatureHandle<RssExtras>,
}

impl FeatureRegistry {
    pub fn load(dir: &Path) -> Self {
        Self {
            meme: FeatureHandle::open(Feature::Meme, dir),
            quote: FeatureHandle::open(Feature::Quote, dir),
            waifu: FeatureHandle::open(Feature::Waifu, dir),
            schedule: FeatureHandle::open(Feature::Schedule, dir),
            rss: FeatureHandle::open(Feature::Rss, dir),
        }
    }

    pub fn handle(&self, feature: Feature) -> &dyn ConfigHandle {
        match feature {
            Feature::Meme => &self.meme,
            Feature::Quote => &self.quote,
            Feature::Waifu => &self.waifu,
            Feature::Schedule => &self.schedule,
            Feature::Rss => &self.rss,
        }
    }
}
