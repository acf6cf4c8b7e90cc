use super::{requester, send_post};
use crate::{Context, Error};
use tracing::info;

/// Get a random anime meme
#[poise::command(slash_command)]
pub async fn meme(ctx: Context<'_>) -> Result<(), Error> {
    ctx.defer().await?;

    let item = ctx.data().sources.meme.fetch_or_fallback().await;
    send_post(ctx, &item.render(Some(&requester(ctx)))).await?;

    info!(
        "Sent {}meme to {}",
        if item.fallback { "fallback " } else { "" },
        ctx.author().name
    );
    Ok(())
}
