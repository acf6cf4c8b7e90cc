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
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub quote: String,
    pub character: String,
    pub show: Option<String>,
}

impl Quote {
    pub fn card(&self, requester: Option<&Requester>) -> EmbedCard {
        let description = match &self.show {
            Some(show) => format!(
                "### “ {} ”\n\n— **{}** ( {} )",
                self.quote, self.character, show
            ),
            None => format!("### “ {} ”\n\n— **{}**", self.quote, self.character),
        };
        let (footer, footer_icon) = footer_for(requester, "Daily Dose Of Senpai Wisdom ✨");
        EmbedCard {
            title: "🌸 Anime Quote".to_string(),
            description: Some(description),
            footer: Some(footer),
            footer_icon,
            color: random_color(),
            ..Default::default()
        }
    }
}

#[derive(Deserialize)]
struct QuoteResponse {
    quote: String,
    character: String,
    #[serde(default)]
    show: Option<String>,
}

const FALLBACK_QUOTES: [(&str, &str, &str); 6] = [
    (
        "People’s lives don’t end when they die, it ends when they lose faith.",
        "Itachi Uchiha",
        "Naruto",
    ),
    (
        "Whatever you lose, you’ll find it again. But what you throw away you’ll never get back.",
        "Kenshin Himura",
        "Rurouni Kenshin",
    ),
    (
        "A lesson without pain is meaningless.",
        "Edward Elric",
        "Fullmetal Alchemist",
    ),
    (
        "When you hit the point of no return, that’s the moment it truly becomes a journey.",
        "Hinata Miyake",
        "A Place Further Than The Universe",
    ),
    (
        "If you don’t take risks, you can’t create a future.",
        "Monkey D. Luffy",
        "One Piece",
    ),
    (
        "The world isn’t perfect. But it’s there for us, doing the best it can. That’s what makes it so damn beautiful.",
        "Roy Mustang",
        "Fullmetal Alchemist",
    ),
];

pub fn fallback_quote() -> Quote {
    let (quote, character, show) = *FALLBACK_QUOTES
        .choose(&mut rand::thread_rng())
        .unwrap_or(&FALLBACK_QUOTES[0]);
    Quote {
        quote: quote.to_string(),
        character: character.to_string(),
        show: Some(show.to_string()),
    }
}

pub struct QuoteSource {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl QuoteSource {
    pub fn new(client: reqwest::Client, endpoint: &str, timeout: Duration) -> Self {
        Self {
            client,
            endpoint: endpoint.to_string(),
            timeout,
        }
    }

    /// Fetch a random quote, optionally filtered. Filters accept
    /// comma-separated values; the provider interprets them.
    pub async fn fetch_quote(
        &self,
        character: Option<&str>,
        show: Option<&str>,
    ) -> Result<Quote, FetchError> {
        let mut params: Vec<(&str, &str)> = Vec::new();
        if let Some(character) = character.filter(|c| !c.trim().is_empty()) {
            params.push(("character", character));
        }
        if let Some(show) = show.filter(|s| !s.trim().is_empty()) {
            params.push(("show", show));
        }
        params.push(("random", "1"));

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
        let quotes: Vec<QuoteResponse> = resp
            .json()
            .await
            .map_err(|e| FetchError::Payload(e.to_string()))?;

        let chosen = quotes
            .choose(&mut rand::thread_rng())
            .ok_or_else(|| FetchError::Payload("empty quote list".to_string()))?;
        Ok(Quote {
            quote: chosen.quote.clone(),
            character: chosen.character.clone(),
            show: chosen.show.clone().filter(|s| !s.is_empty()),
        })
    }

    pub async fn fetch_or_fallback(
        &self,
        character: Option<&str>,
        show: Option<&str>,
    ) -> ContentItem {
        match self.fetch_quote(character, show).await {
            Ok(quote) => ContentItem::new(Payload::Quote(quote)),
            Err(e) => {
                warn!("Quote API failed, falling back: {}", e);
                ContentItem::fallback(Payload::Quote(fallback_quote()))
            }
        }
    }
}

#[async_trait]
impl ContentSource for QuoteSource {
    fn name(&self) -> &'static str {
        "quote"
    }

    async fn fetch(&self, _request: FetchRequest<'_>) -> Vec<ContentItem> {
        vec![self.fetch_or_fallback(None, None).await]
    }
}
