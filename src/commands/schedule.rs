use super::{notice, send_post};
use crate::content::schedule::{parse_day, sunday_based_weekday, weekday_name};
use crate::transport::Post;
use crate::{Context, Error};
use chrono::Utc;
use tracing::info;

const DAY_HINT: &str =
    "Unknown Day. Please Use Names Like Monday Or Numbers 0..6 ( Sunday = 0 ).";

/// Show the airing schedule for a day (defaults to today, UTC)
#[poise::command(slash_command)]
pub async fn schedule(
    ctx: Context<'_>,
    #[description = "Day name, abbreviation or 0..6 (Sunday = 0)"] day: Option<String>,
) -> Result<(), Error> {
    let now = Utc::now();
    let weekday = match day.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        None => sunday_based_weekday(now),
        Some(input) => match parse_day(input) {
            Some(weekday) => weekday,
            None => return notice(ctx, DAY_HINT).await,
        },
    };

    ctx.defer().await?;
    let message = ctx.data().sources.schedule.day_message(weekday, now).await;
    send_post(ctx, &Post::text(message)).await?;

    info!(
        "Sent {} schedule to {}",
        weekday_name(weekday),
        ctx.author().name
    );
    Ok(())
}
