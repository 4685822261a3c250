use once_cell::sync::OnceCell;
use poise::serenity_prelude as serenity;
use tracing::{debug, info};

use crate::{Data, Error};

/// Custom ID of the button posted by `/setupverify`
pub const VERIFY_BUTTON_ID: &str = "verify_btn_persistent";

/// A component handler that outlives the message it was attached to
#[derive(Debug)]
pub struct PersistentButton {
    pub custom_id: &'static str,
}

static VERIFY_BUTTON: OnceCell<PersistentButton> = OnceCell::new();

/// Register the verify button handler for this process.
///
/// Safe to call on every gateway Ready; returns `true` only the first time.
pub fn register_verify_button() -> bool {
    let mut first = false;
    let button = VERIFY_BUTTON.get_or_init(|| {
        first = true;
        PersistentButton {
            custom_id: VERIFY_BUTTON_ID,
        }
    });
    if first {
        info!("Registered persistent button '{}'", button.custom_id);
    }
    first
}

/// Whether a component click belongs to the registered verify button
pub fn is_verify_button(custom_id: &str) -> bool {
    VERIFY_BUTTON
        .get()
        .map(|b| b.custom_id == custom_id)
        .unwrap_or(false)
}

/// Handle clicks on the verify button
pub async fn handle_component(
    ctx: &serenity::Context,
    interaction: &serenity::ComponentInteraction,
    data: &Data,
) -> Result<(), Error> {
    if !is_verify_button(&interaction.data.custom_id) {
        debug!("Ignoring component '{}'", interaction.data.custom_id);
        return Ok(());
    }
    let Some(guild_id) = interaction.guild_id else {
        return Ok(());
    };

    let guild_id = guild_id.to_string();
    let user_id = interaction.user.id.to_string();

    let response = if data
        .verification_manager
        .is_verified(&guild_id, &user_id)
        .await
    {
        serenity::CreateInteractionResponseMessage::new()
            .content("✅ You are already verified!")
            .ephemeral(true)
    } else {
        let link = data.oauth.verify_link(&guild_id);
        let embed = serenity::CreateEmbed::new()
            .title("🔐 Verification Required")
            .description(format!(
                "To verify and access this server, click the link below:\n\n\
                [**Click here to verify**]({})\n\n\
                After authorizing, you will receive the **Verified** role!",
                link
            ))
            .footer(serenity::CreateEmbedFooter::new("Verification System"))
            .color(0x000000);
        serenity::CreateInteractionResponseMessage::new()
            .embed(embed)
            .ephemeral(true)
    };

    interaction
        .create_response(&ctx.http, serenity::CreateInteractionResponse::Message(response))
        .await?;

    info!("Verify button used by {} in guild {}", interaction.user.name, guild_id);
    Ok(())
}
