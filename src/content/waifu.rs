use super::{
    footer_for, random_color, ContentItem, ContentSource, FetchError, FetchRequest, Payload,
    Requester,
};
use crate::db::{Database, NewCollectible};
use crate::features::{FeatureHandle, WaifuExtras};
use crate::services::claim::ClaimService;
use crate::transport::EmbedCard;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct WaifuImage {
    pub source_id: i64,
    pub url: String,
    pub preview_url: Option<String>,
    pub source: Option<String>,
    pub artist_name: Option<String>,
    pub artist_url: Option<String>,
    pub nsfw: bool,
    pub tags: Vec<String>,
}

impl WaifuImage {
    pub fn card(&self, tag: &str, requester: Option<&Requester>) -> EmbedCard {
        let (footer, footer_icon) = footer_for(requester, "Oni Chann ~ ✨");
        EmbedCard {
            title: format!("✨ Oni Chann ~ {}!", capitalize(tag)),
            image_url: Some(self.url.clone()),
            footer: Some(footer),
            footer_icon,
            color: random_color(),
            ..Default::default()
        }
    }

    pub fn spawn_card(&self) -> EmbedCard {
        let mut fields = Vec::new();
        if let Some(artist) = &self.artist_name {
            let value = match &self.artist_url {
                Some(url) => format!("[{}]({})", artist, url),
                None => artist.clone(),
            };
            fields.push(("Artist".to_string(), value, true));
        }
        if !self.tags.is_empty() {
            fields.push(("Tags".to_string(), self.tags.join(", "), true));
        }
        EmbedCard {
            title: "💖 A Wild Waifu Appeared!".to_string(),
            description: Some("Press **Claim** to add her to your harem!".to_string()),
            url: self.source.clone(),
            image_url: Some(self.url.clone()),
            footer: Some(format!("ID #{}", self.source_id)),
            footer_icon: None,
            color: random_color(),
            fields,
        }
    }

    pub fn to_collectible(&self) -> NewCollectible {
        NewCollectible {
            source_id: self.source_id,
            url: self.url.clone(),
            preview_url: self.preview_url.clone(),
            source: self.source.clone(),
            artist_name: self.artist_name.clone(),
            artist_url: self.artist_url.clone(),
            is_nsfw: self.nsfw,
            tags: self.tags.clone(),
        }
    }
}

pub fn capitalize(tag: &str) -> String {
    let mut chars = tag.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    images: Vec<ImageResponse>,
}

#[derive(Deserialize)]
struct ImageResponse {
    image_id: i64,
    url: String,
    #[serde(default)]
    preview_url: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    artist: Option<ArtistResponse>,
    #[serde(default)]
    is_nsfw: bool,
    #[serde(default)]
    tags: Vec<TagResponse>,
}

#[derive(Deserialize)]
struct ArtistResponse {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    pixiv: Option<String>,
    #[serde(default)]
    twitter: Option<String>,
}

#[derive(Deserialize)]
struct TagResponse {
    name: String,
}

impl From<ImageResponse> for WaifuImage {
    fn from(image: ImageResponse) -> Self {
        let (artist_name, artist_url) = match image.artist {
            Some(artist) => (artist.name, artist.pixiv.or(artist.twitter)),
            None => (None, None),
        };
        Self {
            source_id: image.image_id,
            url: image.url,
            preview_url: image.preview_url,
            source: image.source,
            artist_name,
            artist_url,
            nsfw: image.is_nsfw,
            tags: image.tags.into_iter().map(|t| t.name).collect(),
        }
    }
}

const FALLBACK_WAIFUS: [(i64, &str); 3] = [
    (7581, "https://cdn.waifu.im/7581.jpeg"),
    (8023, "https://cdn.waifu.im/8023.jpg"),
    (6340, "https://cdn.waifu.im/6340.jpg"),
];

pub fn fallback_waifu() -> WaifuImage {
    let (source_id, url) = *FALLBACK_WAIFUS
        .choose(&mut rand::thread_rng())
        .unwrap_or(&FALLBACK_WAIFUS[0]);
    WaifuImage {
        source_id,
        url: url.to_string(),
        preview_url: None,
        source: None,
        artist_name: None,
        artist_url: None,
        nsfw: false,
        tags: vec!["waifu".to_string()],
    }
}

/// Image search against the waifu provider.
pub struct WaifuSource {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl WaifuSource {
    pub fn new(client: reqwest::Client, endpoint: &str, timeout: Duration) -> Self {
        Self {
            client,
            endpoint: endpoint.to_string(),
            timeout,
        }
    }

    pub async fn search(&self, tags: &[String], nsfw: bool) -> Result<WaifuImage, FetchError> {
        let mut params: Vec<(&str, &str)> = tags
            .iter()
            .map(|tag| ("included_tags", tag.as_str()))
            .collect();
        params.push(("is_nsfw", if nsfw { "true" } else { "false" }));

        let resp = self
            .client
            .get(&self.endpoint)
            .query(&params)
            .timeout(self.timeout)
            .send()
            .await?;
        if resp.status() != StatusCode::OK {
            return Err(FetchError::Status(resp.status().as_u16()));
        }
        let body: SearchResponse = resp
            .json()
            .await
            .map_err(|e| FetchError::Payload(e.to_string()))?;
        body.images
            .into_iter()
            .next()
            .map(WaifuImage::from)
            .ok_or_else(|| FetchError::Payload("no images returned".to_string()))
    }
}

/// Spawns claimable waifus: each fetched image is registered as a
/// collectible before it is handed to the broadcast loop.
pub struct CollectibleSource {
    images: Arc<WaifuSource>,
    claims: ClaimService,
    settings: FeatureHandle<WaifuExtras>,
}

impl CollectibleSource {
    pub fn new(
        images: Arc<WaifuSource>,
        db: Database,
        settings: FeatureHandle<WaifuExtras>,
    ) -> Self {
        Self {
            images,
            claims: ClaimService::new(db),
            settings,
        }
    }

    pub async fn spawn_one(&self) -> ContentItem {
        let extras = self.settings.snapshot().extras;
        let image = match self.images.search(&extras.tags, extras.nsfw).await {
            Ok(image) => image,
            Err(e) => {
                warn!("Waifu API failed, falling back: {}", e);
                // Pool images are shown but not claimable.
                return ContentItem::fallback(Payload::Spawn {
                    image: fallback_waifu(),
                    claim: None,
                });
            }
        };

        let claim = match self.claims.register_spawn(image.to_collectible()).await {
            Ok(token) => {
                info!("Spawned collectible {}", image.source_id);
                Some(token)
            }
            Err(e) => {
                error!("Failed registering collectible {}: {}", image.source_id, e);
                None
            }
        };
        ContentItem::new(Payload::Spawn { image, claim })
    }
}

#[async_trait]
impl ContentSource for CollectibleSource {
    fn name(&self) -> &'static str {
        "waifu"
    }

    async fn fetch(&self, _request: FetchRequest<'_>) -> Vec<ContentItem> {
        vec![self.spawn_one().await]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::Feature;
    use httpmock::prelude::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn search_body() -> serde_json::Value {
        json!({
            "images": [{
                "image_id": 4242,
                "url": "https://cdn.waifu.im/4242.png",
                "preview_url": "https://www.waifu.im/preview/4242/",
                "source": "https://pixiv.net/artworks/1",
                "is_nsfw": false,
                "artist": {"name": "mika", "pixiv": "https://pixiv.net/users/9", "twitter": null},
                "tags": [{"name": "maid"}, {"name": "waifu"}]
            }]
        })
    }

    fn db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.execute_init().unwrap();
        db
    }

    #[tokio::test]
    async fn test_search_sends_tags_and_nsfw_flag() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/search")
                    .query_param("included_tags", "maid")
                    .query_param("is_nsfw", "false");
                then.status(200).json_body(search_body());
            })
            .await;

        let source = WaifuSource::new(
            reqwest::Client::new(),
            &server.url("/search"),
            Duration::from_secs(5),
        );
        let image = source.search(&["maid".to_string()], false).await.unwrap();
        mock.assert_async().await;
        assert_eq!(image.source_id, 4242);
        assert_eq!(image.artist_name.as_deref(), Some("mika"));
        assert_eq!(image.artist_url.as_deref(), Some("https://pixiv.net/users/9"));
        assert_eq!(image.tags, vec!["maid", "waifu"]);
    }

    #[tokio::test]
    async fn test_empty_result_is_an_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/search");
                then.status(200).json_body(json!({"images": []}));
            })
            .await;

        let source = WaifuSource::new(
            reqwest::Client::new(),
            &server.url("/search"),
            Duration::from_secs(5),
        );
        assert!(source.search(&["waifu".to_string()], false).await.is_err());
    }

    #[tokio::test]
    async fn test_spawn_registers_collectible_and_attaches_claim() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/search");
                then.status(200).json_body(search_body());
            })
            .await;
        let dir = TempDir::new().unwrap();
        let db = db();
        let settings = FeatureHandle::<WaifuExtras>::open(Feature::Waifu, dir.path());
        let images = Arc::new(WaifuSource::new(
            reqwest::Client::new(),
            &server.url("/search"),
            Duration::from_secs(5),
        ));
        let source = CollectibleSource::new(images, db.clone(), settings);

        let items = source.fetch(FetchRequest::default()).await;
        assert_eq!(items.len(), 1);
        let post = items[0].render(None);
        assert_eq!(post.claim.map(|t| t.source_id), Some(4242));
        assert!(db.get_collectible(4242).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_spawn_falls_back_without_claim() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/search");
                then.status(500);
            })
            .await;
        let dir = TempDir::new().unwrap();
        let settings = FeatureHandle::<WaifuExtras>::open(Feature::Waifu, dir.path());
        let images = Arc::new(WaifuSource::new(
            reqwest::Client::new(),
            &server.url("/search"),
            Duration::from_secs(5),
        ));
        let source = CollectibleSource::new(images, db(), settings);

        let item = source.spawn_one().await;
        assert!(item.fallback);
        assert!(item.render(None).claim.is_none());
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("marin-kitagawa"), "Marin-kitagawa");
        assert_eq!(capitalize(""), "");
    }
}
