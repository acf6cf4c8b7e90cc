use crate::{Context, Error};
use tracing::info;

/// Shut down the bot (Owner only)
#[poise::command(slash_command, owners_only, hide_in_help)]
pub async fn shutdown(ctx: Context<'_>) -> Result<(), Error> {
    info!("Shutdown requested by owner {}", ctx.author().name);
    ctx.send(
        poise::CreateReply::default()
            .content("👋 Stopping broadcast loops and shutting down...")
            .ephemeral(true),
    )
    .await?;

    ctx.data().shutdown.trigger();
    ctx.framework().shard_manager().shutdown_all().await;
    Ok(())
}
