use super::{select_fresh, ContentItem, ContentSource, FetchError, FetchRequest, Payload};
use crate::features::{FeatureHandle, RssExtras};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::USER_AGENT;
use reqwest::StatusCode;
use rss::Channel;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_LINK: &str = "https://AnimeSchedule.net";

#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    pub title: String,
    pub link: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

impl FeedEntry {
    pub fn message(&self) -> String {
        let when = self
            .published_at
            .map(|at| format!(" <t:{}:t>", at.timestamp()))
            .unwrap_or_default();
        format!(
            "[SUB] {}{}\n{}",
            self.title,
            when,
            self.link.as_deref().unwrap_or(DEFAULT_LINK)
        )
    }
}

/// Parse an RSS 2.0 document into content items keyed by guid, or by
/// `link|title` when an item carries no guid.
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<ContentItem>, FetchError> {
    let channel = Channel::read_from(bytes).map_err(|e| FetchError::Payload(e.to_string()))?;
    let items = channel
        .items()
        .iter()
        .map(|item| {
            let identity = item
                .guid()
                .map(|g| g.value().to_string())
                .filter(|g| !g.is_empty())
                .unwrap_or_else(|| {
                    format!("{}|{}", item.link().unwrap_or(""), item.title().unwrap_or(""))
                });
            let published_at = item
                .pub_date()
                .and_then(|d| DateTime::parse_from_rfc2822(d.trim()).ok())
                .map(|d| d.with_timezone(&Utc));
            ContentItem {
                identity: Some(identity),
                payload: Payload::Feed(FeedEntry {
                    title: item
                        .title()
                        .filter(|t| !t.is_empty())
                        .unwrap_or("New episode")
                        .to_string(),
                    link: item.link().filter(|l| !l.is_empty()).map(String::from),
                    published_at,
                }),
                published_at,
                fallback: false,
            }
        })
        .collect();
    Ok(items)
}

/// Release feed poller. The feed URL is read from the feature config on every
/// fetch so admin changes apply on the next cycle.
pub struct RssSource {
    client: reqwest::Client,
    settings: FeatureHandle<RssExtras>,
    timeout: Duration,
}

impl RssSource {
    pub fn new(
        client: reqwest::Client,
        settings: FeatureHandle<RssExtras>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            settings,
            timeout,
        }
    }

    async fn fetch_feed(&self, url: &str) -> Result<Vec<ContentItem>, FetchError> {
        let resp = self
            .client
            .get(url)
            .header(USER_AGENT, "AstrumOtaku RSS")
            .timeout(self.timeout)
            .send()
            .await?;
        if resp.status() != StatusCode::OK {
            return Err(FetchError::Status(resp.status().as_u16()));
        }
        let bytes = resp.bytes().await?;
        parse_feed(&bytes)
    }
}

#[async_trait]
impl ContentSource for RssSource {
    fn name(&self) -> &'static str {
        "rss"
    }

    async fn fetch(&self, request: FetchRequest<'_>) -> Vec<ContentItem> {
        let url = self.settings.snapshot().extras.rss_url;
        match self.fetch_feed(&url).await {
            Ok(items) => {
                let total = items.len();
                let fresh = select_fresh(items, request.seen, request.limit);
                debug!("RSS feed had {} entries, {} new", total, fresh.len());
                fresh
            }
            Err(e) => {
                warn!("Failed fetching RSS from {}: {}", url, e);
                Vec::new()
            }
        }
    }
}
