use crate::config::DISCORD_CHUNK_SIZE;
use crate::lifecycle::ReadyGate;
use crate::services::claim::ClaimToken;
use async_trait::async_trait;
use serenity::all::{
    ButtonStyle, ChannelId, CreateActionRow, CreateButton, CreateEmbed, CreateEmbedFooter,
    CreateMessage,
};
use serenity::cache::Cache;
use serenity::http::{Http, HttpError};
use std::sync::Arc;
use tracing::debug;

/// A channel that was resolved and may be posted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Destination {
    pub channel_id: u64,
}

impl Destination {
    pub fn new(channel_id: u64) -> Self {
        Self { channel_id }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The channel does not exist (or the bot can no longer see it).
    #[error("channel {0} not found")]
    NotFound(u64),
    #[error("channel {channel} rejected the message: {reason}")]
    Rejected { channel: u64, reason: String },
    #[error("delivery to channel {0} timed out")]
    TimedOut(u64),
}

/// Rich card attached to a post.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbedCard {
    pub title: String,
    pub description: Option<String>,
    pub url: Option<String>,
    pub image_url: Option<String>,
    pub footer: Option<String>,
    pub footer_icon: Option<String>,
    pub color: u32,
    pub fields: Vec<(String, String, bool)>,
}

impl EmbedCard {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn to_embed(&self) -> CreateEmbed {
        let mut embed = CreateEmbed::new().title(&self.title).color(self.color);
        if let Some(description) = &self.description {
            embed = embed.description(description);
        }
        if let Some(url) = &self.url {
            embed = embed.url(url);
        }
        if let Some(image) = &self.image_url {
            embed = embed.image(image);
        }
        if let Some(footer) = &self.footer {
            let mut footer = CreateEmbedFooter::new(footer);
            if let Some(icon) = &self.footer_icon {
                footer = footer.icon_url(icon);
            }
            embed = embed.footer(footer);
        }
        for (name, value, inline) in &self.fields {
            embed = embed.field(name, value, *inline);
        }
        embed
    }
}

/// Renderable unit handed to the transport.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Post {
    pub content: Option<String>,
    pub embed: Option<EmbedCard>,
    pub claim: Option<ClaimToken>,
}

impl Post {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn card(embed: EmbedCard) -> Self {
        Self {
            embed: Some(embed),
            ..Default::default()
        }
    }

    pub fn with_claim(mut self, token: ClaimToken) -> Self {
        self.claim = Some(token);
        self
    }

    /// Text chunks that fit a single message.
    pub fn chunks(&self) -> Vec<String> {
        self.content
            .as_deref()
            .map(|text| split_message(text, DISCORD_CHUNK_SIZE))
            .unwrap_or_default()
    }

    /// Nothing visible to send: no embed and only whitespace text.
    pub fn is_empty(&self) -> bool {
        self.embed.is_none() && self.chunks().is_empty()
    }

    /// Message builders in send order. Long text is split; the embed and the
    /// claim button ride on the last message. An empty post yields nothing.
    pub fn to_messages(&self) -> Vec<CreateMessage> {
        if self.is_empty() {
            return Vec::new();
        }
        let mut chunks = self.chunks();
        let last_text = chunks.pop();
        let mut messages: Vec<CreateMessage> = chunks
            .into_iter()
            .map(|chunk| CreateMessage::new().content(chunk))
            .collect();

        let mut last = CreateMessage::new();
        if let Some(text) = last_text {
            last = last.content(text);
        }
        if let Some(embed) = &self.embed {
            last = last.embed(embed.to_embed());
        }
        if let Some(token) = &self.claim {
            last = last.components(claim_components(token, false));
        }
        messages.push(last);
        messages
    }
}

/// Button row for a claimable post.
pub fn claim_components(token: &ClaimToken, disabled: bool) -> Vec<CreateActionRow> {
    let button = CreateButton::new(token.custom_id())
        .label(if disabled { "Claimed" } else { "Claim" })
        .emoji('💖')
        .style(ButtonStyle::Success)
        .disabled(disabled);
    vec![CreateActionRow::Buttons(vec![button])]
}

/// Split text into chunks of at most `limit` characters, breaking on line
/// boundaries where possible.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len > limit && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len > limit {
            // A single line longer than the limit is hard-split.
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(limit) {
                let piece: String = piece.iter().collect();
                if piece.chars().count() == limit {
                    chunks.push(piece);
                } else {
                    current_len = piece.chars().count();
                    current = piece;
                }
            }
            continue;
        }
        current.push_str(line);
        current_len += line_len;
    }

    if !current.trim().is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Chat-platform delivery surface used by the broadcast loops.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Resolves once the session is usable.
    async fn wait_until_ready(&self);

    async fn resolve_channel(&self, channel_id: u64) -> Result<Destination, DeliveryError>;

    async fn send(&self, destination: &Destination, post: &Post) -> Result<(), DeliveryError>;
}

/// Discord transport backed by the serenity HTTP client and cache.
pub struct SerenityTransport {
    http: Arc<Http>,
    cache: Arc<Cache>,
    ready: ReadyGate,
}

impl SerenityTransport {
    pub fn new(http: Arc<Http>, cache: Arc<Cache>, ready: ReadyGate) -> Self {
        Self { http, cache, ready }
    }
}

fn is_not_found(err: &serenity::Error) -> bool {
    matches!(
        err,
        serenity::Error::Http(HttpError::UnsuccessfulRequest(resp))
            if resp.status_code.as_u16() == 404
    )
}

fn delivery_error(channel: u64, err: serenity::Error) -> DeliveryError {
    if is_not_found(&err) {
        DeliveryError::NotFound(channel)
    } else {
        DeliveryError::Rejected {
            channel,
            reason: err.to_string(),
        }
    }
}

#[async_trait]
impl Transport for SerenityTransport {
    async fn wait_until_ready(&self) {
        if !self.ready.is_open() {
            debug!("Waiting for gateway session");
        }
        self.ready.wait().await;
    }

    async fn resolve_channel(&self, channel_id: u64) -> Result<Destination, DeliveryError> {
        if channel_id == 0 {
            return Err(DeliveryError::NotFound(channel_id));
        }
        let id = ChannelId::new(channel_id);
        if self.cache.channel(id).is_some() {
            return Ok(Destination::new(channel_id));
        }
        debug!("Channel {} not cached, fetching", channel_id);
        self.http
            .get_channel(id)
            .await
            .map(|_| Destination::new(channel_id))
            .map_err(|e| delivery_error(channel_id, e))
    }

    async fn send(&self, destination: &Destination, post: &Post) -> Result<(), DeliveryError> {
        if post.is_empty() {
            return Err(DeliveryError::Rejected {
                channel: destination.channel_id,
                reason: "empty post".to_string(),
            });
        }
        let id = ChannelId::new(destination.channel_id);
        for message in post.to_messages() {
            id.send_message(&self.http, message)
                .await
                .map_err(|e| delivery_error(destination.channel_id, e))?;
        }
        Ok(())
    }
}
