use super::notice;
use crate::features::validate::{parse_interval_minutes, parse_post_time, validate_post_limit};
use crate::features::{ConfigView, DestinationRef, Feature, ValidationError};
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use serde_json::{json, Map, Value};
use tracing::info;

/// Requested changes from one `/config set` invocation.
#[derive(Debug, Default, Clone)]
pub struct SetOptions {
    pub toggle: Option<bool>,
    pub channel: Option<u64>,
    pub interval: Option<String>,
    pub post_time: Option<String>,
    pub post_limit: Option<u32>,
    pub only_spawner: Option<bool>,
    pub owner: Option<u64>,
    pub rss_url: Option<String>,
}

/// Turn command options into a partial config update, validating every value
/// against the feature's bounds. Channels and owners are appended to the
/// current lists.
pub fn build_updates(
    feature: Feature,
    current: &Map<String, Value>,
    options: &SetOptions,
) -> Result<Map<String, Value>, ValidationError> {
    let mut updates = Map::new();

    if let Some(enabled) = options.toggle {
        updates.insert("enabled".into(), json!(enabled));
    }
    if let Some(channel) = options.channel {
        updates.insert(
            "channel_id".into(),
            Value::Array(append_unique(current, "channel_id", channel)),
        );
    }
    if let Some(interval) = &options.interval {
        let minutes = parse_interval_minutes(feature, interval)?;
        updates.insert("interval_minutes".into(), json!(minutes));
    }
    if let Some(post_time) = &options.post_time {
        let at = parse_post_time(post_time)?;
        updates.insert("post_time".into(), json!(at.format("%H:%M").to_string()));
    }
    if let Some(limit) = options.post_limit {
        let limit = validate_post_limit(limit as usize)?;
        updates.insert("post_limit".into(), json!(limit));
    }
    if let Some(only_spawner) = options.only_spawner {
        updates.insert("only_spawner".into(), json!(only_spawner));
    }
    if let Some(owner) = options.owner {
        updates.insert(
            "owner_ids".into(),
            Value::Array(append_unique(current, "owner_ids", owner)),
        );
    }
    if let Some(url) = &options.rss_url {
        let url = url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ValidationError::Invalid(format!("`{}` is not an http(s) URL", url)));
        }
        updates.insert("rss_url".into(), json!(url));
    }

    Ok(updates)
}

fn append_unique(current: &Map<String, Value>, key: &str, id: u64) -> Vec<Value> {
    let mut list = current
        .get(key)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let present = list.iter().any(|value| {
        serde_json::from_value::<DestinationRef>(value.clone())
            .ok()
            .and_then(|r| r.channel_id())
            == Some(id)
    });
    if !present {
        list.push(json!(id));
    }
    list
}

/// Configured destinations without `channel_id`, or `None` if it was not
/// configured.
pub fn without_channel(
    destinations: &[DestinationRef],
    channel_id: u64,
) -> Option<Vec<DestinationRef>> {
    let kept: Vec<DestinationRef> = destinations
        .iter()
        .filter(|d| d.channel_id() != Some(channel_id))
        .cloned()
        .collect();
    (kept.len() != destinations.len()).then_some(kept)
}

/// Accept `<#123>`, `123` or a channel link ending in the id.
pub fn parse_channel_ref(input: &str) -> Option<u64> {
    let trimmed = input.trim();
    let inner = trimmed
        .strip_prefix("<#")
        .and_then(|s| s.strip_suffix('>'))
        .unwrap_or_else(|| trimmed.rsplit('/').next().unwrap_or(trimmed));
    inner.parse::<u64>().ok().filter(|id| *id > 0)
}

fn describe_update(key: &str, value: &Value) -> String {
    match (key, value) {
        ("channel_id", Value::Array(items)) => items
            .iter()
            .filter_map(|v| serde_json::from_value::<DestinationRef>(v.clone()).ok())
            .map(|r| r.describe())
            .collect::<Vec<_>>()
            .join(", "),
        ("owner_ids", Value::Array(items)) => items
            .iter()
            .map(|v| format!("<@{}>", v))
            .collect::<Vec<_>>()
            .join(", "),
        (_, Value::String(s)) => s.clone(),
        (_, other) => other.to_string(),
    }
}

fn view_embed(view: &ConfigView) -> serenity::CreateEmbed {
    let channels = if view.destinations.is_empty() {
        "Not Set".to_string()
    } else {
        view.destinations
            .iter()
            .map(DestinationRef::describe)
            .collect::<Vec<_>>()
            .join(", ")
    };

    let mut embed = serenity::CreateEmbed::new()
        .title(format!("⚙️ {} Config", view.feature.title()))
        .field("Enabled", view.enabled.to_string(), true)
        .field("Channel", channels, true)
        .field("Interval", format!("{} minutes", view.interval_minutes), true)
        .color(0x5865F2);
    for (key, value) in &view.extras {
        embed = embed.field(key.as_str(), value.as_str(), true);
    }
    embed
}

async fn reply_embed(ctx: Context<'_>, embed: serenity::CreateEmbed) -> Result<(), Error> {
    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

/// Configure auto-posting features
#[poise::command(
    slash_command,
    subcommands("set", "show", "clear", "unset_channel", "help"),
    required_permissions = "ADMINISTRATOR",
    default_member_permissions = "ADMINISTRATOR",
    guild_only
)]
pub async fn config(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Change a feature's settings
#[poise::command(slash_command, required_permissions = "ADMINISTRATOR", guild_only)]
pub async fn set(
    ctx: Context<'_>,
    #[description = "Feature to configure"] feature: Feature,
    #[description = "Enable or disable auto posting"] toggle: Option<bool>,
    #[description = "Add a channel to post in"] channel: Option<serenity::GuildChannel>,
    #[description = "Interval, e.g. 60, 90m, 2h"] interval: Option<String>,
    #[description = "Daily post time in UTC, HH:MM (schedule)"] post_time: Option<String>,
    #[description = "Max new entries per poll (rss)"]
    #[min = 1]
    #[max = 20]
    post_limit: Option<u32>,
    #[description = "Only listed owners may /spawn (waifu)"] only_spawner: Option<bool>,
    #[description = "Allow a user to /spawn (waifu)"] owner: Option<serenity::User>,
    #[description = "Feed URL (rss)"] rss_url: Option<String>,
) -> Result<(), Error> {
    let options = SetOptions {
        toggle,
        channel: channel.map(|c| c.id.get()),
        interval,
        post_time,
        post_limit,
        only_spawner,
        owner: owner.map(|u| u.id.get()),
        rss_url,
    };

    let handle = ctx.data().features.handle(feature);
    let updates = match build_updates(feature, &handle.raw(), &options) {
        Ok(updates) => updates,
        Err(e) => return notice(ctx, e.to_string()).await,
    };
    if updates.is_empty() {
        return notice(ctx, "⚠️ No Changes Provided.").await;
    }

    let description = updates
        .iter()
        .map(|(key, value)| format!("**{}** → **{}**", key, describe_update(key, value)))
        .collect::<Vec<_>>()
        .join("\n");

    if let Err(e) = handle.apply(updates) {
        return notice(ctx, e.to_string()).await;
    }

    info!(
        "{} updated {} config: {}",
        ctx.author().name,
        feature.key(),
        description.replace('\n', "; ")
    );
    let embed = serenity::CreateEmbed::new()
        .title(format!("⚙️ {} Config Updated", feature.title()))
        .description(description)
        .color(0x57F287);
    reply_embed(ctx, embed).await
}

/// Show a feature's current settings
#[poise::command(slash_command, required_permissions = "ADMINISTRATOR", guild_only)]
pub async fn show(
    ctx: Context<'_>,
    #[description = "Feature to show"] feature: Feature,
) -> Result<(), Error> {
    let view = ctx.data().features.handle(feature).view();
    reply_embed(ctx, view_embed(&view)).await
}

/// Reset a feature to its defaults
#[poise::command(slash_command, required_permissions = "ADMINISTRATOR", guild_only)]
pub async fn clear(
    ctx: Context<'_>,
    #[description = "Feature to reset"] feature: Feature,
) -> Result<(), Error> {
    let view = ctx.data().features.handle(feature).reset();
    info!("{} reset {} config", ctx.author().name, feature.key());
    let embed = view_embed(&view).title(format!("♻️ {} Config Reset", feature.title()));
    reply_embed(ctx, embed).await
}

/// Stop posting a feature in a channel
#[poise::command(slash_command, required_permissions = "ADMINISTRATOR", guild_only)]
pub async fn unset_channel(
    ctx: Context<'_>,
    #[description = "Feature to change"] feature: Feature,
    #[description = "Channel mention or id"] channel: String,
) -> Result<(), Error> {
    let Some(channel_id) = parse_channel_ref(&channel) else {
        return notice(ctx, "⚠️ Please give a channel mention or id.").await;
    };

    let handle = ctx.data().features.handle(feature);
    let Some(remaining) = without_channel(&handle.view().destinations, channel_id) else {
        return notice(
            ctx,
            format!("⚠️ <#{}> is not configured for {}.", channel_id, feature.title()),
        )
        .await;
    };

    let mut updates = Map::new();
    updates.insert("channel_id".into(), json!(remaining));
    if let Err(e) = handle.apply(updates) {
        return notice(ctx, e.to_string()).await;
    }

    info!(
        "{} removed channel {} from {}",
        ctx.author().name,
        channel_id,
        feature.key()
    );
    notice(
        ctx,
        format!("✅ {} will no longer post in <#{}>.", feature.title(), channel_id),
    )
    .await
}

/// Show config help
#[poise::command(slash_command, required_permissions = "ADMINISTRATOR", guild_only)]
pub async fn help(ctx: Context<'_>) -> Result<(), Error> {
    let features = Feature::ALL
        .iter()
        .map(|f| format!("`{}`", f.key()))
        .collect::<Vec<_>>()
        .join(", ");
    let text = format!(
        "Use `/config set feature:<name> ...` to change settings, `/config show` to view them, \
         `/config unset_channel` to remove a channel and `/config clear` to reset.\n\
         Features: {}\n\
         Common: `toggle`, `channel`, `interval` (minutes or `90m`, `2h`).\n\
         Schedule: `post_time` (UTC `HH:MM`). RSS: `post_limit` (1..20), `rss_url`.\n\
         Waifu: `only_spawner`, `owner`.",
        features
    );
    notice(ctx, text).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn current(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_build_updates_appends_channel_once() {
        let cfg = current(json!({
            "enabled": false,
            "channel_id": [1, "2"],
            "interval_minutes": 60
        }));
        let options = SetOptions {
            toggle: Some(true),
            channel: Some(3),
            ..Default::default()
        };
        let updates = build_updates(Feature::Meme, &cfg, &options).unwrap();
        assert_eq!(updates["enabled"], json!(true));
        assert_eq!(updates["channel_id"], json!([1, "2", 3]));

        let again = SetOptions {
            channel: Some(2),
            ..Default::default()
        };
        let updates = build_updates(Feature::Meme, &cfg, &again).unwrap();
        assert_eq!(updates["channel_id"], json!([1, "2"]));
    }

    #[test]
    fn test_build_updates_validates_values() {
        let cfg = Map::new();
        let short = SetOptions {
            interval: Some("5".into()),
            ..Default::default()
        };
        assert_eq!(
            build_updates(Feature::Quote, &cfg, &short),
            Err(ValidationError::IntervalTooShort { min: 10 })
        );

        let humantime = SetOptions {
            interval: Some("2h".into()),
            ..Default::default()
        };
        let updates = build_updates(Feature::Quote, &cfg, &humantime).unwrap();
        assert_eq!(updates["interval_minutes"], json!(120));

        let time = SetOptions {
            post_time: Some(" 9:05 ".into()),
            ..Default::default()
        };
        let updates = build_updates(Feature::Schedule, &cfg, &time).unwrap();
        assert_eq!(updates["post_time"], json!("09:05"));

        let limit = SetOptions {
            post_limit: Some(21),
            ..Default::default()
        };
        assert!(build_updates(Feature::Rss, &cfg, &limit).is_err());

        let url = SetOptions {
            rss_url: Some("ftp://feed".into()),
            ..Default::default()
        };
        assert!(build_updates(Feature::Rss, &cfg, &url).is_err());
    }

    #[test]
    fn test_build_updates_adds_owner() {
        let cfg = current(json!({"owner_ids": [7]}));
        let options = SetOptions {
            owner: Some(8),
            only_spawner: Some(true),
            ..Default::default()
        };
        let updates = build_updates(Feature::Waifu, &cfg, &options).unwrap();
        assert_eq!(updates["owner_ids"], json!([7, 8]));
        assert_eq!(updates["only_spawner"], json!(true));
    }

    #[test]
    fn test_no_options_means_no_updates() {
        let updates = build_updates(Feature::Meme, &Map::new(), &SetOptions::default()).unwrap();
        assert!(updates.is_empty());
    }

    #[test]
    fn test_without_channel() {
        let destinations = vec![
            DestinationRef::Id(1),
            DestinationRef::Raw("2".into()),
            DestinationRef::Id(3),
        ];
        assert_eq!(
            without_channel(&destinations, 2),
            Some(vec![DestinationRef::Id(1), DestinationRef::Id(3)])
        );
        assert_eq!(without_channel(&destinations, 9), None);
    }

    #[test]
    fn test_parse_channel_ref() {
        assert_eq!(parse_channel_ref("<#123>"), Some(123));
        assert_eq!(parse_channel_ref(" 456 "), Some(456));
        assert_eq!(
            parse_channel_ref("https://discord.com/channels/1/789"),
            Some(789)
        );
        assert_eq!(parse_channel_ref("general"), None);
        assert_eq!(parse_channel_ref("0"), None);
    }
}
