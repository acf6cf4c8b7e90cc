use super::{
    footer_for, random_color, ContentItem, ContentSource, FetchError, FetchRequest, Payload,
    Requester,
};
use crate::transport::EmbedCard;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct Meme {
    pub image_url: String,
    pub title: String,
    pub post_link: String,
    pub author: String,
}

impl Meme {
    pub fn card(&self, requester: Option<&Requester>) -> EmbedCard {
        let (footer, footer_icon) = footer_for(requester, "Daily Dose of Weeb Humor ✨");
        EmbedCard {
            title: format!("😂 Anime Meme - {}", self.title),
            description: Some(format!("**Author :** u/{}", self.author)),
            url: Some(self.post_link.clone()),
            image_url: Some(self.image_url.clone()),
            footer: Some(footer),
            footer_icon,
            color: random_color(),
            fields: Vec::new(),
        }
    }
}

#[derive(Deserialize)]
struct MemeResponse {
    url: String,
    title: String,
    #[serde(rename = "postLink")]
    post_link: String,
    author: String,
}

const FALLBACK_MEMES: [(&str, &str); 3] = [
    ("https://i.redd.it/zw86cnjls1u51.jpg", "Itachi knows the pain"),
    ("https://i.redd.it/8h9j34u5yab41.jpg", "Luffy logic"),
    ("https://i.redd.it/bv4rhv3u0vb81.jpg", "Classic DBZ energy"),
];

pub fn fallback_meme() -> Meme {
    let (image_url, title) = *FALLBACK_MEMES
        .choose(&mut rand::thread_rng())
        .unwrap_or(&FALLBACK_MEMES[0]);
    Meme {
        image_url: image_url.to_string(),
        title: title.to_string(),
        post_link: "https://reddit.com/r/animememes".to_string(),
        author: "fallback_meme".to_string(),
    }
}

pub struct MemeSource {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl MemeSource {
    pub fn new(client: reqwest::Client, endpoint: &str, timeout: Duration) -> Self {
        Self {
            client,
            endpoint: endpoint.to_string(),
            timeout,
        }
    }

    pub async fn fetch_meme(&self) -> Result<Meme, FetchError> {
        let resp = self
            .client
            .get(&self.endpoint)
            .timeout(self.timeout)
            .send()
            .await?;
        if resp.status() != StatusCode::OK {
            return Err(FetchError::Status(resp.status().as_u16()));
        }
        let body: MemeResponse = resp
            .json()
            .await
            .map_err(|e| FetchError::Payload(e.to_string()))?;
        debug!("Fetched meme '{}'", body.title);
        Ok(Meme {
            image_url: body.url,
            title: body.title,
            post_link: body.post_link,
            author: body.author,
        })
    }

    pub async fn fetch_or_fallback(&self) -> ContentItem {
        match self.fetch_meme().await {
            Ok(meme) => ContentItem::new(Payload::Meme(meme)),
            Err(e) => {
                warn!("Meme API failed, falling back: {}", e);
                ContentItem::fallback(Payload::Meme(fallback_meme()))
            }
        }
    }
}

#[async_trait]
impl ContentSource for MemeSource {
    fn name(&self) -> &'static str {
        "meme"
    }

    async fn fetch(&self, _request: FetchRequest<'_>) -> Vec<ContentItem> {
        vec![self.fetch_or_fallback().await]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn source(server: &MockServer) -> MemeSource {
        MemeSource::new(
            reqwest::Client::new(),
            &server.url("/gimme/animememes"),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_fetch_parses_provider_payload() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/gimme/animememes");
                then.status(200).json_body(json!({
                    "url": "https://i.redd.it/abc.jpg",
                    "title": "Isekai truck",
                    "postLink": "https://redd.it/abc",
                    "author": "weeb"
                }));
            })
            .await;

        let item = source(&server).fetch_or_fallback().await;
        assert!(!item.fallback);
        match item.payload {
            Payload::Meme(meme) => {
                assert_eq!(meme.title, "Isekai truck");
                assert_eq!(meme.post_link, "https://redd.it/abc");
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_server_error_falls_back_to_pool() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/gimme/animememes");
                then.status(500).body("boom");
            })
            .await;

        let items = source(&server).fetch(FetchRequest::default()).await;
        assert_eq!(items.len(), 1);
        assert!(items[0].fallback);
        match &items[0].payload {
            Payload::Meme(meme) => {
                assert!(FALLBACK_MEMES.iter().any(|(url, _)| *url == meme.image_url));
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_payload_falls_back() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/gimme/animememes");
                then.status(200).json_body(json!({"title": "missing url"}));
            })
            .await;

        assert!(source(&server).fetch_or_fallback().await.fallback);
    }

    #[test]
    fn test_card_footer_names_requester() {
        let requester = Requester {
            name: "senpai".to_string(),
            avatar_url: Some("https://cdn/avatar.png".to_string()),
        };
        let card = fallback_meme().card(Some(&requester));
        assert_eq!(card.footer.as_deref(), Some("Requested By senpai"));
        assert!(card.title.starts_with("😂 Anime Meme - "));
    }
}
