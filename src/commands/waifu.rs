use super::{error_embed, requester, send_post};
use crate::content::{ContentItem, Payload};
use crate::{Context, Error};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, poise::ChoiceParameter)]
pub enum WaifuTag {
    #[name = "maid"]
    Maid,
    #[name = "waifu"]
    Waifu,
    #[name = "marin-kitagawa"]
    MarinKitagawa,
    #[name = "mori-calliope"]
    MoriCalliope,
    #[name = "raiden-shogun"]
    RaidenShogun,
    #[name = "oppai"]
    Oppai,
    #[name = "selfies"]
    Selfies,
    #[name = "uniform"]
    Uniform,
    #[name = "kamisato-ayaka"]
    KamisatoAyaka,
}

impl WaifuTag {
    pub fn key(self) -> &'static str {
        match self {
            WaifuTag::Maid => "maid",
            WaifuTag::Waifu => "waifu",
            WaifuTag::MarinKitagawa => "marin-kitagawa",
            WaifuTag::MoriCalliope => "mori-calliope",
            WaifuTag::RaidenShogun => "raiden-shogun",
            WaifuTag::Oppai => "oppai",
            WaifuTag::Selfies => "selfies",
            WaifuTag::Uniform => "uniform",
            WaifuTag::KamisatoAyaka => "kamisato-ayaka",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, poise::ChoiceParameter)]
pub enum NsfwTag {
    #[name = "ass"]
    Ass,
    #[name = "hentai"]
    Hentai,
    #[name = "milf"]
    Milf,
    #[name = "oral"]
    Oral,
    #[name = "paizuri"]
    Paizuri,
    #[name = "ecchi"]
    Ecchi,
    #[name = "ero"]
    Ero,
}

impl NsfwTag {
    pub fn key(self) -> &'static str {
        match self {
            NsfwTag::Ass => "ass",
            NsfwTag::Hentai => "hentai",
            NsfwTag::Milf => "milf",
            NsfwTag::Oral => "oral",
            NsfwTag::Paizuri => "paizuri",
            NsfwTag::Ecchi => "ecchi",
            NsfwTag::Ero => "ero",
        }
    }
}

/// Get a random waifu image
#[poise::command(slash_command)]
pub async fn waifu(
    ctx: Context<'_>,
    #[description = "Choose a waifu category"] tag: Option<WaifuTag>,
) -> Result<(), Error> {
    let tag = tag.unwrap_or(WaifuTag::Waifu).key();
    send_image(ctx, tag, false).await
}

/// Get a random NSFW waifu image
#[poise::command(slash_command, nsfw_only)]
pub async fn nwaifu(
    ctx: Context<'_>,
    #[description = "Choose a NSFW waifu category"] tag: Option<NsfwTag>,
) -> Result<(), Error> {
    let tag = tag.unwrap_or(NsfwTag::Hentai).key();
    send_image(ctx, tag, true).await
}

async fn send_image(ctx: Context<'_>, tag: &str, nsfw: bool) -> Result<(), Error> {
    ctx.defer().await?;

    let image = match ctx
        .data()
        .sources
        .waifu
        .search(&[tag.to_string()], nsfw)
        .await
    {
        Ok(image) => image,
        Err(e) => {
            warn!("Waifu lookup for {} failed: {}", tag, e);
            let embed =
                error_embed("Invalid Category Or API Error.\n### Please Try Again Later.");
            ctx.send(poise::CreateReply::default().embed(embed)).await?;
            return Ok(());
        }
    };

    let item = ContentItem::new(Payload::Waifu {
        image,
        tag: tag.to_string(),
    });
    send_post(ctx, &item.render(Some(&requester(ctx)))).await?;

    info!(
        "Sent {}waifu image ({}) to {}",
        if nsfw { "NSFW " } else { "" },
        tag,
        ctx.author().name
    );
    Ok(())
}
