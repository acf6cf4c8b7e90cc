pub mod admin;
pub mod collection;
pub mod config;
pub mod meme;
pub mod quote;
pub mod schedule;
pub mod waifu;

use crate::content::Requester;
use crate::transport::{claim_components, Post};
use crate::{Context, Data, Error};
use poise::serenity_prelude as serenity;

/// Every slash command the bot registers.
pub fn all() -> Vec<poise::Command<Data, Error>> {
    vec![
        meme::meme(),
        quote::quote(),
        waifu::waifu(),
        waifu::nwaifu(),
        schedule::schedule(),
        collection::spawn(),
        collection::harem(),
        collection::leaderboard(),
        config::config(),
        admin::shutdown(),
    ]
}

pub fn requester(ctx: Context<'_>) -> Requester {
    let author = ctx.author();
    Requester {
        name: author.name.clone(),
        avatar_url: Some(author.face()),
    }
}

/// Reply with a rendered post. Long text goes out as several replies with
/// the embed and claim button on the last one.
pub async fn send_post(ctx: Context<'_>, post: &Post) -> Result<(), Error> {
    if post.is_empty() {
        return notice(ctx, "⚠️ Nothing to post right now.").await;
    }
    let chunks = post.chunks();
    if chunks.is_empty() {
        ctx.send(attach(poise::CreateReply::default(), post)).await?;
        return Ok(());
    }

    let last = chunks.len() - 1;
    for (index, chunk) in chunks.into_iter().enumerate() {
        let mut reply = poise::CreateReply::default().content(chunk);
        if index == last {
            reply = attach(reply, post);
        }
        ctx.send(reply).await?;
    }
    Ok(())
}

fn attach(mut reply: poise::CreateReply, post: &Post) -> poise::CreateReply {
    if let Some(card) = &post.embed {
        reply = reply.embed(card.to_embed());
    }
    if let Some(token) = &post.claim {
        reply = reply.components(claim_components(token, false));
    }
    reply
}

/// Private one-line answer to the invoking user.
pub async fn notice(ctx: Context<'_>, text: impl Into<String>) -> Result<(), Error> {
    ctx.send(poise::CreateReply::default().content(text).ephemeral(true))
        .await?;
    Ok(())
}

pub fn error_embed(description: impl Into<String>) -> serenity::CreateEmbed {
    serenity::CreateEmbed::new()
        .title("❌ Error")
        .description(description)
        .color(0xED4245)
}
