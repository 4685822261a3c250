use poise::serenity_prelude as serenity;
use tracing::info;

use super::register_verify_button;
use crate::{Data, Error};

/// Handle gateway Ready, which fires again after every reconnect
pub async fn handle_ready(ready: &serenity::Ready, data: &Data) -> Result<(), Error> {
    register_verify_button();

    let verified = data.verification_manager.verification_count().await;

    info!("{}", "=".repeat(60));
    info!("Bot online: {}", ready.user.name);
    info!("Bot ID: {}", ready.user.id);
    info!("Server URL: {}", data.oauth.base_url);
    info!("Redirect URI: {}", data.oauth.redirect_uri());
    info!("Verified users saved: {}", verified);
    info!("{}", "=".repeat(60));

    Ok(())
}
