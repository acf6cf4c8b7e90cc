pub mod feed;
pub mod meme;
pub mod quote;
pub mod schedule;
pub mod waifu;

pub use feed::{FeedEntry, RssSource};
pub use meme::{Meme, MemeSource};
pub use quote::{Quote, QuoteSource};
pub use schedule::ScheduleSource;
pub use waifu::{CollectibleSource, WaifuImage, WaifuSource};

use crate::config::Config;
use crate::db::Database;
use crate::dedup::DedupLedger;
use crate::features::FeatureRegistry;
use crate::services::claim::ClaimToken;
use crate::transport::Post;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Feature-specific renderable data.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Meme(Meme),
    Quote(Quote),
    /// Image returned for an interactive `/waifu` request.
    Waifu { image: WaifuImage, tag: String },
    /// Image spawned as a claimable collectible.
    Spawn {
        image: WaifuImage,
        claim: Option<ClaimToken>,
    },
    Schedule(String),
    Feed(FeedEntry),
}

/// Normalized result of a fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentItem {
    /// Dedup key. Only feed entries carry one.
    pub identity: Option<String>,
    pub payload: Payload,
    pub published_at: Option<DateTime<Utc>>,
    /// Drawn from the built-in pool after a failed fetch.
    pub fallback: bool,
}

impl ContentItem {
    pub fn new(payload: Payload) -> Self {
        Self {
            identity: None,
            payload,
            published_at: None,
            fallback: false,
        }
    }

    pub fn fallback(payload: Payload) -> Self {
        Self {
            fallback: true,
            ..Self::new(payload)
        }
    }

    pub fn render(&self, requester: Option<&Requester>) -> Post {
        match &self.payload {
            Payload::Meme(meme) => Post::card(meme.card(requester)),
            Payload::Quote(quote) => Post::card(quote.card(requester)),
            Payload::Waifu { image, tag } => Post::card(image.card(tag, requester)),
            Payload::Spawn { image, claim } => {
                let post = Post::card(image.spawn_card());
                match claim {
                    Some(token) => post.with_claim(*token),
                    None => post,
                }
            }
            Payload::Schedule(text) => Post::text(text.clone()),
            Payload::Feed(entry) => Post::text(entry.message()),
        }
    }
}

/// Who asked for an interactive post; shown in the card footer.
#[derive(Debug, Clone, PartialEq)]
pub struct Requester {
    pub name: String,
    pub avatar_url: Option<String>,
}

/// Parameters for one scheduled fetch.
#[derive(Debug, Clone, Copy)]
pub struct FetchRequest<'a> {
    /// Identities already broadcast, for sources that deduplicate.
    pub seen: Option<&'a DedupLedger>,
    /// Upper bound on returned items.
    pub limit: usize,
}

impl Default for FetchRequest<'_> {
    fn default() -> Self {
        Self {
            seen: None,
            limit: 1,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("provider returned HTTP {0}")]
    Status(u16),
    #[error("unexpected payload: {0}")]
    Payload(String),
}

/// Remote content provider for one feature.
///
/// `fetch` never fails: transport errors and malformed payloads degrade to
/// fallback content (or an empty batch for deduplicating sources).
#[async_trait]
pub trait ContentSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch(&self, request: FetchRequest<'_>) -> Vec<ContentItem>;
}

/// Drop already-seen and duplicate identities, order oldest published first
/// (undated items sort as the epoch) and keep at most `limit`.
pub fn select_fresh(
    items: Vec<ContentItem>,
    seen: Option<&DedupLedger>,
    limit: usize,
) -> Vec<ContentItem> {
    let mut batch_ids = HashSet::new();
    let mut fresh: Vec<ContentItem> = items
        .into_iter()
        .filter(|item| match &item.identity {
            Some(id) => {
                !seen.map(|ledger| ledger.seen(id)).unwrap_or(false) && batch_ids.insert(id.clone())
            }
            None => true,
        })
        .collect();
    fresh.sort_by_key(|item| item.published_at.unwrap_or(DateTime::UNIX_EPOCH));
    fresh.truncate(limit);
    fresh
}

/// Random 24-bit embed color.
pub(crate) fn random_color() -> u32 {
    rand::random::<u32>() & 0x00FF_FFFF
}

pub(crate) fn footer_for(requester: Option<&Requester>, default: &str) -> (String, Option<String>) {
    match requester {
        Some(r) => (format!("Requested By {}", r.name), r.avatar_url.clone()),
        None => (default.to_string(), None),
    }
}

/// All content sources, built once at startup.
#[derive(Clone)]
pub struct Sources {
    pub meme: Arc<MemeSource>,
    pub quote: Arc<QuoteSource>,
    pub waifu: Arc<WaifuSource>,
    pub spawn: Arc<CollectibleSource>,
    pub schedule: Arc<ScheduleSource>,
    pub rss: Arc<RssSource>,
}

impl Sources {
    pub fn new(
        config: &Config,
        client: reqwest::Client,
        features: &FeatureRegistry,
        db: &Database,
    ) -> Self {
        let timeout = config.http_timeout();
        let waifu = Arc::new(WaifuSource::new(
            client.clone(),
            &config.waifu_api_url,
            timeout,
        ));
        Self {
            meme: Arc::new(MemeSource::new(client.clone(), &config.meme_api_url, timeout)),
            quote: Arc::new(QuoteSource::new(client.clone(), &config.quote_api_url, timeout)),
            spawn: Arc::new(CollectibleSource::new(
                Arc::clone(&waifu),
                db.clone(),
                features.waifu.clone(),
            )),
            waifu,
            schedule: Arc::new(ScheduleSource::new(
                client.clone(),
                &config.schedule_api_url,
                config.schedule_api_key.clone(),
                Duration::from_secs(config.schedule_timeout_secs),
                config.schedule_snapshot_path.clone(),
            )),
            rss: Arc::new(RssSource::new(
                client,
                features.rss.clone(),
                Duration::from_secs(config.rss_timeout_secs),
            )),
        }
    }
}
