use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use std::time::Duration;
use tracing::{info, warn};

use super::require_admin;
use crate::events::VERIFY_BUTTON_ID;
use crate::reconcile::{
    MembershipStats, ProgressReporter, ProgressSnapshot, ReconciliationOutcome,
};
use crate::{Context, Error};

const COLOR_WORKING: u32 = 0x3498DB;
const COLOR_DONE: u32 = 0x00FF00;
const COLOR_PROMPT: u32 = 0x000000;

/// Runs at least this long get an upfront duration warning
const SLOW_RUN_THRESHOLD: Duration = Duration::from_secs(120);

/// Post the verification prompt with its persistent button
#[poise::command(slash_command, guild_only)]
pub async fn setupverify(ctx: Context<'_>) -> Result<(), Error> {
    if !require_admin(ctx).await? {
        return Ok(());
    }

    let embed = serenity::CreateEmbed::new()
        .title("🛡️ Server Verification")
        .description(
            "To access the server and participate, verify yourself by clicking the button below.\n\n\
            **What you'll get:**\n\
            • Full access to all channels\n\
            • Ability to chat and interact\n\n\
            Click **Verify** to start!",
        )
        .footer(serenity::CreateEmbedFooter::new("Verification System"))
        .timestamp(serenity::Timestamp::now())
        .color(COLOR_PROMPT);

    let button = serenity::CreateButton::new(VERIFY_BUTTON_ID)
        .label("✓ Verify")
        .style(serenity::ButtonStyle::Secondary);

    ctx.channel_id()
        .send_message(
            ctx.http(),
            serenity::CreateMessage::new()
                .embed(embed)
                .components(vec![serenity::CreateActionRow::Buttons(vec![button])]),
        )
        .await?;

    ctx.send(
        poise::CreateReply::default()
            .content("✅ Verification system setup complete!")
            .ephemeral(true),
    )
    .await?;

    info!("Verification prompt posted in channel {}", ctx.channel_id());
    Ok(())
}

/// Show verified members statistics
#[poise::command(slash_command, guild_only)]
pub async fn verified(ctx: Context<'_>) -> Result<(), Error> {
    if !require_admin(ctx).await? {
        return Ok(());
    }
    let guild_id = ctx
        .guild_id()
        .ok_or("This command must be used in a guild")?
        .to_string();

    let reconciler = ctx.data().verification_manager.reconciler().clone();
    let total = reconciler.store().verified_users(&guild_id).await?.len();
    if total == 0 {
        ctx.send(
            poise::CreateReply::default()
                .content("❌ No verified users found!")
                .ephemeral(true),
        )
        .await?;
        return Ok(());
    }

    let loading = serenity::CreateEmbed::new()
        .title("📊 Checking Verified Members...")
        .description(format!("Please wait, checking {} members...", total))
        .color(COLOR_WORKING);
    let reply = ctx
        .send(poise::CreateReply::default().embed(loading))
        .await?;

    let stats = reconciler.membership_stats(&guild_id).await?;
    info!(
        "Stats for guild {}: {}/{} still in server",
        guild_id, stats.in_server, stats.total
    );

    reply
        .edit(ctx, poise::CreateReply::default().embed(stats_embed(&stats)))
        .await?;
    Ok(())
}

/// Add all verified members to the server
#[poise::command(slash_command, guild_only)]
pub async fn backup(ctx: Context<'_>) -> Result<(), Error> {
    if !require_admin(ctx).await? {
        return Ok(());
    }
    let guild_id = ctx
        .guild_id()
        .ok_or("This command must be used in a guild")?
        .to_string();

    let reconciler = ctx.data().verification_manager.reconciler().clone();
    let user_ids: Vec<String> = reconciler
        .store()
        .verified_users(&guild_id)
        .await?
        .into_iter()
        .map(|r| r.user_id)
        .collect();

    if user_ids.is_empty() {
        ctx.send(
            poise::CreateReply::default()
                .content("❌ No verified users found!")
                .ephemeral(true),
        )
        .await?;
        return Ok(());
    }

    let total = user_ids.len();
    let estimate = estimated_duration(ctx.data().config.pacing.backup_delay, total);

    let mut initial = progress_embed(&ProgressSnapshot {
        total,
        ..Default::default()
    });
    if estimate >= SLOW_RUN_THRESHOLD {
        initial = initial.footer(serenity::CreateEmbedFooter::new(format!(
            "{} members, this will take about {} minutes",
            total,
            estimate.as_secs().div_ceil(60)
        )));
    }

    let reply = ctx
        .send(poise::CreateReply::default().embed(initial))
        .await?;

    let mut reporter = EmbedProgress { ctx, reply };
    let outcome = reconciler.run(&guild_id, &user_ids, &mut reporter).await;

    info!(
        "Backup for guild {} finished: {} joined, {} already in, {} failed",
        guild_id, outcome.joined, outcome.already_in, outcome.failed
    );
    Ok(())
}

/// Keeps the `/backup` reply embed up to date
struct EmbedProgress<'a> {
    ctx: Context<'a>,
    reply: poise::ReplyHandle<'a>,
}

#[async_trait]
impl<'a> ProgressReporter for EmbedProgress<'a> {
    async fn progress(&mut self, snapshot: ProgressSnapshot) {
        if let Err(e) = self
            .reply
            .edit(
                self.ctx,
                poise::CreateReply::default().embed(progress_embed(&snapshot)),
            )
            .await
        {
            warn!("Failed to update backup progress: {}", e);
        }
    }

    async fn finish(&mut self, outcome: &ReconciliationOutcome) {
        let embed = serenity::CreateEmbed::new()
            .title("✅ Backup Complete")
            .description(summary_description(outcome))
            .footer(serenity::CreateEmbedFooter::new("Backup completed"))
            .color(COLOR_DONE);

        if let Err(e) = self
            .reply
            .edit(self.ctx, poise::CreateReply::default().embed(embed))
            .await
        {
            warn!("Failed to post backup summary: {}", e);
        }
    }
}

/// Rough length of a paced run over `total` users
fn estimated_duration(delay: Duration, total: usize) -> Duration {
    delay.saturating_mul(u32::try_from(total).unwrap_or(u32::MAX))
}

fn progress_embed(snapshot: &ProgressSnapshot) -> serenity::CreateEmbed {
    serenity::CreateEmbed::new()
        .title("🔄 Backup in Progress")
        .description(progress_description(snapshot))
        .color(COLOR_WORKING)
}

fn progress_description(snapshot: &ProgressSnapshot) -> String {
    format!(
        "**Progress:** {}/{} processed\n\n\
        **✅ Joined:** {}\n\
        **📍 Already in server:** {}\n\
        **❌ Failed:** {}",
        snapshot.processed, snapshot.total, snapshot.joined, snapshot.already_in, snapshot.failed
    )
}

fn summary_description(outcome: &ReconciliationOutcome) -> String {
    let mut lines = vec![
        format!("**Total processed:** {} members", outcome.total),
        format!("**✅ Successfully joined:** {} members", outcome.joined),
        format!("**📍 Already in server:** {} members", outcome.already_in),
    ];
    if outcome.role_failures > 0 {
        lines.push(format!(
            "**⚠️ Role not assigned:** {} members already in server",
            outcome.role_failures
        ));
    }
    if outcome.failed > 0 {
        lines.push(format!(
            "**❌ Failed:** {} members (expired tokens or errors)",
            outcome.failed
        ));
    }
    lines.join("\n")
}

fn stats_embed(stats: &MembershipStats) -> serenity::CreateEmbed {
    serenity::CreateEmbed::new()
        .title("📊 Verified Members Statistics")
        .description("Complete statistics of verified members")
        .field("📝 Total Verified", format!("**{}** members", stats.total), true)
        .field("✅ In Server", format!("**{}** members", stats.in_server), true)
        .field("❌ Left Server", format!("**{}** members", stats.left_server), true)
        .field("📈 Retention Rate", format_retention(stats), false)
        .timestamp(serenity::Timestamp::now())
        .color(COLOR_DONE)
}

fn format_retention(stats: &MembershipStats) -> String {
    format!("**{:.1}%**", stats.retention_rate())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_text() {
        let text = progress_description(&ProgressSnapshot {
            processed: 3,
            total: 3,
            joined: 1,
            already_in: 1,
            failed: 1,
        });
        assert!(text.starts_with("**Progress:** 3/3 processed"));
        assert!(text.contains("**✅ Joined:** 1"));
    }

    #[test]
    fn test_summary_mentions_failures_only_when_present() {
        let clean = ReconciliationOutcome {
            total: 2,
            joined: 1,
            already_in: 1,
            ..Default::default()
        };
        assert!(!summary_description(&clean).contains("Failed"));

        let failing = ReconciliationOutcome {
            total: 2,
            failed: 2,
            ..Default::default()
        };
        assert!(summary_description(&failing).contains("**❌ Failed:** 2 members"));
    }

    #[test]
    fn test_estimate_saturates() {
        assert_eq!(
            estimated_duration(Duration::from_secs(1), 150),
            Duration::from_secs(150)
        );
        assert_eq!(estimated_duration(Duration::MAX, 3), Duration::MAX);
        assert!(estimated_duration(Duration::from_millis(u64::MAX), 1000) >= SLOW_RUN_THRESHOLD);
    }

    #[test]
    fn test_retention_formatting() {
        let stats = MembershipStats {
            total: 3,
            in_server: 2,
            left_server: 1,
        };
        assert_eq!(format_retention(&stats), "**66.7%**");
        assert_eq!(format_retention(&MembershipStats::default()), "**0.0%**");
    }
}
