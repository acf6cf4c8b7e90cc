use super::{notice, send_post};
use crate::db::{CollectibleRecord, LeaderboardEntry};
use crate::services::ClaimService;
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use tracing::info;

const HAREM_LIMIT: usize = 20;
const LEADERBOARD_LIMIT: usize = 10;

/// Spawn a claimable waifu in this channel
#[poise::command(slash_command, guild_only)]
pub async fn spawn(ctx: Context<'_>) -> Result<(), Error> {
    let author = ctx.author().id;
    let is_bot_owner = ctx.framework().options().owners.contains(&author);
    let extras = ctx.data().features.waifu.snapshot().extras;
    if !is_bot_owner && !extras.may_spawn(author.get()) {
        return notice(ctx, "❌ Only configured spawners can use this.").await;
    }

    ctx.defer().await?;
    let item = ctx.data().sources.spawn.spawn_one().await;
    send_post(ctx, &item.render(None)).await?;

    info!(
        "{} spawned a waifu in channel {}",
        ctx.author().name,
        ctx.channel_id()
    );
    Ok(())
}

/// Show the waifus a user has claimed
#[poise::command(slash_command)]
pub async fn harem(
    ctx: Context<'_>,
    #[description = "Whose collection to show (defaults to you)"] user: Option<serenity::User>,
) -> Result<(), Error> {
    let user = user.as_ref().unwrap_or_else(|| ctx.author());
    let service = ClaimService::new(ctx.data().db.clone());
    let items = service.collection(user.id.get(), HAREM_LIMIT).await?;

    if items.is_empty() {
        return notice(ctx, format!("📭 **{}** hasn't claimed any waifus yet.", user.name)).await;
    }

    let total = service.claim_count(user.id.get()).await?;
    let embed = serenity::CreateEmbed::new()
        .title(format!("💖 {}'s Harem", user.name))
        .description(format_collection(&items))
        .thumbnail(user.face())
        .footer(serenity::CreateEmbedFooter::new(format!(
            "{} claimed in total",
            total
        )))
        .color(0xFF69B4);

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Show the top waifu collectors
#[poise::command(slash_command)]
pub async fn leaderboard(ctx: Context<'_>) -> Result<(), Error> {
    let service = ClaimService::new(ctx.data().db.clone());
    let entries = service.leaderboard(LEADERBOARD_LIMIT).await?;

    if entries.is_empty() {
        return notice(ctx, "📭 Nobody has claimed a waifu yet.").await;
    }

    let embed = serenity::CreateEmbed::new()
        .title("🏆 Waifu Leaderboard")
        .description(format_leaderboard(&entries))
        .color(0xF1C40F);

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

fn format_collection(items: &[CollectibleRecord]) -> String {
    items
        .iter()
        .map(|item| {
            let tags = if item.tags.is_empty() {
                "untagged".to_string()
            } else {
                item.tags.join(", ")
            };
            format!("• [#{}]({}) {}", item.source_id, item.url, tags)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_leaderboard(entries: &[LeaderboardEntry]) -> String {
    entries
        .iter()
        .enumerate()
        .map(|(rank, entry)| {
            let medal = match rank {
                0 => "🥇".to_string(),
                1 => "🥈".to_string(),
                2 => "🥉".to_string(),
                n => format!("**{}.**", n + 1),
            };
            format!("{} {}: {} claimed", medal, entry.user_name, entry.claim_count)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
