use super::{requester, send_post};
use crate::{Context, Error};
use tracing::info;

/// Get a random anime quote
#[poise::command(slash_command)]
pub async fn quote(
    ctx: Context<'_>,
    #[description = "Character name (comma separated for several)"] character: Option<String>,
    #[description = "Show name (comma separated for several)"] show: Option<String>,
) -> Result<(), Error> {
    ctx.defer().await?;

    let character = character.as_deref().map(str::trim).filter(|c| !c.is_empty());
    let show = show.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let item = ctx
        .data()
        .sources
        .quote
        .fetch_or_fallback(character, show)
        .await;
    send_post(ctx, &item.render(Some(&requester(ctx)))).await?;

    info!("Sent quote to {}", ctx.author().name);
    Ok(())
}
