pub mod general;
pub mod verification;

use poise::serenity_prelude::UserId;
use tracing::warn;

use crate::{Context, Error};

pub use general::{help, ping};
pub use verification::{backup, setupverify, verified};

/// Whether `user_id` is the configured administrator
pub fn is_admin(user_id: UserId, admin_id: UserId) -> bool {
    user_id == admin_id
}

/// Reject non-administrators with an ephemeral message.
///
/// Returns `true` when the caller may proceed.
pub async fn require_admin(ctx: Context<'_>) -> Result<bool, Error> {
    if is_admin(ctx.author().id, ctx.data().config.admin_id) {
        return Ok(true);
    }

    warn!(
        "User {} ({}) tried to use admin command '{}'",
        ctx.author().name,
        ctx.author().id,
        ctx.command().qualified_name
    );
    ctx.send(
        poise::CreateReply::default()
            .content("❌ You don't have permission!")
            .ephemeral(true),
    )
    .await?;
    Ok(false)
}
