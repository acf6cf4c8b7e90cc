use crate::services::{ClaimService, ClaimToken};
use crate::transport::claim_components;
use crate::{Data, Error};
use poise::serenity_prelude as serenity;
use tracing::{debug, info, warn};

/// Resolve a press on a claim button. Other component interactions are
/// ignored.
pub async fn handle_component(
    ctx: &serenity::Context,
    interaction: &serenity::ComponentInteraction,
    data: &Data,
) -> Result<(), Error> {
    let Some(token) = ClaimToken::parse(&interaction.data.custom_id) else {
        debug!("Ignoring component {}", interaction.data.custom_id);
        return Ok(());
    };

    let user = &interaction.user;
    let outcome = ClaimService::new(data.db.clone())
        .claim(user.id.get(), &user.name, token)
        .await;
    info!(
        "Claim of {} by {} resolved as {:?}",
        token.source_id, user.name, outcome
    );

    interaction
        .create_response(
            ctx,
            serenity::CreateInteractionResponse::Message(
                serenity::CreateInteractionResponseMessage::new()
                    .content(outcome.message())
                    .ephemeral(true),
            ),
        )
        .await?;

    if outcome.closes_claim() {
        let message = &interaction.message;
        let edit = serenity::EditMessage::new().components(claim_components(&token, true));
        if let Err(e) = message
            .channel_id
            .edit_message(ctx, message.id, edit)
            .await
        {
            warn!("Could not disable claim button on {}: {}", message.id, e);
        }
    }

    Ok(())
}
