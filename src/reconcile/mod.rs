//! Reconciliation of verified users against guild membership
//!
//! Drives every previously verified user toward "member with the verified role",
//! one user at a time with a pacing wait in between.

pub mod pacing;
pub mod progress;

use tracing::{debug, error, info, warn};

use crate::config::PacingConfig;
use crate::discord::{JoinOutcome, SharedMembership};
use crate::error::Result;
use crate::state::SharedStore;

pub use pacing::Pacer;
pub use progress::{
    should_report, LogReporter, ProgressReporter, ProgressSnapshot, ReconciliationOutcome,
};

/// Where a single user ended up after reconciliation
#[derive(Debug, Clone, PartialEq)]
pub enum UserOutcome {
    Joined,
    AlreadyInServerRoleAssigned,
    AlreadyInServerRoleFailed,
    Failed(FailureReason),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FailureReason {
    /// Not a member and nothing to join with; only re-verification helps
    NoToken,
    /// Discord refused the join, usually an expired token
    JoinRejected(String),
}

/// Result of the single-user join done from the OAuth callback
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackJoin {
    pub join: JoinOutcome,
    /// `Some` when the role fallback ran, with its result
    pub role_fallback: Option<bool>,
}

impl CallbackJoin {
    /// Whether the user should now hold the verified role
    pub fn role_granted(&self) -> bool {
        match self.role_fallback {
            Some(patched) => patched,
            None => self.join == JoinOutcome::Joined,
        }
    }
}

/// Membership retention of everyone who ever verified in a guild
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MembershipStats {
    pub total: usize,
    pub in_server: usize,
    pub left_server: usize,
}

impl MembershipStats {
    /// Percentage of verified users still in the guild, 0 when nobody verified
    pub fn retention_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.in_server as f64 / self.total as f64 * 100.0
        }
    }
}

/// Reconciliation engine shared by `/backup`, `/verified` and the OAuth callback
pub struct Reconciler {
    membership: SharedMembership,
    store: SharedStore,
    verified_role_id: String,
    pacing: PacingConfig,
}

impl Reconciler {
    pub fn new(
        membership: SharedMembership,
        store: SharedStore,
        verified_role_id: impl Into<String>,
        pacing: PacingConfig,
    ) -> Self {
        Self {
            membership,
            store,
            verified_role_id: verified_role_id.into(),
            pacing,
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Join a freshly authorized user, falling back to a role assignment
    /// when Discord says they are already there or rejects the join.
    pub async fn join_single(&self, guild_id: &str, user_id: &str, access_token: &str) -> CallbackJoin {
        let join = self
            .membership
            .join_with_role(guild_id, user_id, access_token, &self.verified_role_id)
            .await;
        info!("Join for {} in guild {}: {:?}", user_id, guild_id, join);

        let role_fallback = if join.needs_role_fallback() {
            info!("User {} may already be in guild {}, adding role only", user_id, guild_id);
            let patched = self
                .membership
                .patch_role(guild_id, user_id, &self.verified_role_id)
                .await;
            Some(patched)
        } else {
            None
        };

        CallbackJoin {
            join,
            role_fallback,
        }
    }

    /// Bring one stored user back into the guild
    pub async fn reconcile_user(&self, guild_id: &str, user_id: &str) -> UserOutcome {
        if self.membership.is_member(guild_id, user_id).await {
            let patched = self
                .membership
                .patch_role(guild_id, user_id, &self.verified_role_id)
                .await;
            return if patched {
                UserOutcome::AlreadyInServerRoleAssigned
            } else {
                warn!("Could not add role to user {} already in guild {}", user_id, guild_id);
                UserOutcome::AlreadyInServerRoleFailed
            };
        }

        let token = match self.store.token_for(user_id).await {
            Ok(token) => token,
            Err(e) => {
                error!("Failed to read token for {}: {}", user_id, e);
                None
            }
        };

        let Some(token) = token else {
            debug!("No stored token for {}", user_id);
            return UserOutcome::Failed(FailureReason::NoToken);
        };

        match self
            .membership
            .join_with_role(guild_id, user_id, &token.access_token, &self.verified_role_id)
            .await
        {
            JoinOutcome::Joined | JoinOutcome::AlreadyMember => UserOutcome::Joined,
            JoinOutcome::Failed { reason, .. } => {
                warn!("Failed to add user {} to guild {}: {}", user_id, guild_id, reason);
                UserOutcome::Failed(FailureReason::JoinRejected(reason))
            }
        }
    }

    /// Reconcile `user_ids` in order, reporting progress at a fixed cadence.
    ///
    /// Per-user failures are tallied, never propagated; the reporter always
    /// receives a final summary.
    pub async fn run(
        &self,
        guild_id: &str,
        user_ids: &[String],
        reporter: &mut dyn ProgressReporter,
    ) -> ReconciliationOutcome {
        let mut outcome = ReconciliationOutcome {
            total: user_ids.len(),
            ..Default::default()
        };
        let mut pacer = Pacer::for_backup(&self.pacing);

        info!(
            "Starting backup of {} users for guild {}",
            outcome.total, guild_id
        );

        for (i, user_id) in user_ids.iter().enumerate() {
            match self.reconcile_user(guild_id, user_id).await {
                UserOutcome::Joined => outcome.joined += 1,
                UserOutcome::AlreadyInServerRoleAssigned => outcome.already_in += 1,
                UserOutcome::AlreadyInServerRoleFailed => {
                    outcome.already_in += 1;
                    outcome.role_failures += 1;
                }
                UserOutcome::Failed(_) => outcome.failed += 1,
            }

            pacer.wait().await;

            let processed = i + 1;
            if should_report(processed, outcome.total) {
                reporter.progress(outcome.snapshot(processed)).await;
            }
        }

        reporter.finish(&outcome).await;
        outcome
    }

    /// Reconcile every user verified in `guild_id`, oldest verification first
    pub async fn run_backup(
        &self,
        guild_id: &str,
        reporter: &mut dyn ProgressReporter,
    ) -> Result<ReconciliationOutcome> {
        let user_ids: Vec<String> = self
            .store
            .verified_users(guild_id)
            .await?
            .into_iter()
            .map(|r| r.user_id)
            .collect();

        Ok(self.run(guild_id, &user_ids, reporter).await)
    }

    /// Count how many verified users are still in the guild
    pub async fn membership_stats(&self, guild_id: &str) -> Result<MembershipStats> {
        let records = self.store.verified_users(guild_id).await?;
        let mut stats = MembershipStats {
            total: records.len(),
            ..Default::default()
        };
        let mut pacer = Pacer::for_stats(&self.pacing);

        for record in &records {
            if self.membership.is_member(guild_id, &record.user_id).await {
                stats.in_server += 1;
            } else {
                stats.left_server += 1;
            }
            pacer.wait().await;
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{MemoryStore, TokenRecord, VerificationRecord, VerificationStore};
    use crate::testing::{Call, FakeDiscord, RecordingReporter};
    use std::sync::Arc;
    use std::time::Duration;

    const GUILD: &str = "100";
    const ROLE: &str = "9";

    fn no_pacing() -> PacingConfig {
        PacingConfig {
            backup_delay: Duration::ZERO,
            stats_delay: Duration::ZERO,
            burst: None,
        }
    }

    async fn seeded_store(users: &[&str], tokens: &[(&str, &str)]) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for user in users {
            store
                .record_verification(VerificationRecord::new(GUILD, *user))
                .await
                .unwrap();
        }
        for (user, token) in tokens {
            store
                .store_token(TokenRecord::new(*user, *token))
                .await
                .unwrap();
        }
        store
    }

    fn reconciler(discord: &Arc<FakeDiscord>, store: Arc<MemoryStore>) -> Reconciler {
        Reconciler::new(discord.clone(), store, ROLE, no_pacing())
    }

    #[tokio::test]
    async fn test_mixed_guild_backup() {
        // A is a member, B has a usable token, C has nothing
        let discord = Arc::new(
            FakeDiscord::new()
                .with_member(GUILD, "A")
                .with_valid_token("tok-b"),
        );
        let store = seeded_store(&["A", "B", "C"], &[("B", "tok-b")]).await;
        let engine = reconciler(&discord, store);
        let mut reporter = RecordingReporter::default();

        let outcome = engine.run_backup(GUILD, &mut reporter).await.unwrap();

        assert_eq!(outcome.total, 3);
        assert_eq!(outcome.already_in, 1);
        assert_eq!(outcome.joined, 1);
        assert_eq!(outcome.failed, 1);

        let last = reporter.snapshots.last().unwrap();
        assert_eq!((last.processed, last.total), (3, 3));
        assert_eq!(reporter.finished, vec![outcome]);

        // A got the role, B joined with it
        let calls = discord.calls();
        assert!(calls.contains(&Call::PatchRole("A".to_string())));
        assert!(calls.contains(&Call::Join("B".to_string())));
        assert!(!calls.contains(&Call::Join("C".to_string())));
    }

    #[tokio::test]
    async fn test_second_run_finds_everyone_present() {
        let discord = Arc::new(
            FakeDiscord::new()
                .with_valid_token("t1")
                .with_valid_token("t2"),
        );
        let store = seeded_store(&["u1", "u2"], &[("u1", "t1"), ("u2", "t2")]).await;
        let engine = reconciler(&discord, store);

        let first = engine
            .run_backup(GUILD, &mut RecordingReporter::default())
            .await
            .unwrap();
        assert_eq!(first.joined, 2);

        let second = engine
            .run_backup(GUILD, &mut RecordingReporter::default())
            .await
            .unwrap();
        assert_eq!(second.already_in, second.total);
        assert_eq!(second.joined, 0);
        assert_eq!(second.failed, 0);
    }

    #[tokio::test]
    async fn test_tally_always_adds_up() {
        let discord = Arc::new(
            FakeDiscord::new()
                .with_member(GUILD, "m1")
                .with_member(GUILD, "m2")
                .with_failing_patch("m2")
                .with_valid_token("good")
                .with_join_status("rejected", 403),
        );
        let users = ["m1", "m2", "fresh", "rejected", "stale", "ghost"];
        let store = seeded_store(
            &users,
            &[("fresh", "good"), ("rejected", "good"), ("stale", "expired")],
        )
        .await;
        let engine = reconciler(&discord, store);

        let outcome = engine
            .run_backup(GUILD, &mut RecordingReporter::default())
            .await
            .unwrap();

        assert_eq!(outcome.total, users.len());
        assert_eq!(outcome.already_in + outcome.joined + outcome.failed, outcome.total);
        assert_eq!(outcome.already_in, 2);
        assert_eq!(outcome.role_failures, 1);
        assert_eq!(outcome.joined, 1);
        assert_eq!(outcome.failed, 3);
    }

    #[tokio::test]
    async fn test_user_without_token_fails() {
        let discord = Arc::new(FakeDiscord::new());
        let store = seeded_store(&["lost"], &[]).await;
        let engine = reconciler(&discord, store);

        assert_eq!(
            engine.reconcile_user(GUILD, "lost").await,
            UserOutcome::Failed(FailureReason::NoToken)
        );
    }

    #[tokio::test]
    async fn test_member_with_failing_role_is_still_already_in() {
        let discord = Arc::new(
            FakeDiscord::new()
                .with_member(GUILD, "m")
                .with_failing_patch("m"),
        );
        let store = seeded_store(&["m"], &[]).await;
        let engine = reconciler(&discord, store);

        assert_eq!(
            engine.reconcile_user(GUILD, "m").await,
            UserOutcome::AlreadyInServerRoleFailed
        );
    }

    #[tokio::test]
    async fn test_progress_cadence_and_final_summary() {
        let discord = Arc::new(FakeDiscord::new());
        let users: Vec<String> = (0..12).map(|i| format!("u{}", i)).collect();
        let engine = reconciler(&discord, Arc::new(MemoryStore::new()));
        let mut reporter = RecordingReporter::default();

        let outcome = engine.run(GUILD, &users, &mut reporter).await;

        let processed: Vec<usize> = reporter.snapshots.iter().map(|s| s.processed).collect();
        assert_eq!(processed, vec![5, 10, 12]);
        // Everyone failed, and the summary still arrives
        assert_eq!(outcome.failed, 12);
        assert_eq!(reporter.finished.len(), 1);
    }

    #[tokio::test]
    async fn test_users_processed_in_input_order() {
        let discord = Arc::new(FakeDiscord::new());
        let users = vec!["c".to_string(), "a".to_string(), "b".to_string()];
        let engine = reconciler(&discord, Arc::new(MemoryStore::new()));

        engine
            .run(GUILD, &users, &mut RecordingReporter::default())
            .await;

        let checked: Vec<String> = discord
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::IsMember(user) => Some(user),
                _ => None,
            })
            .collect();
        assert_eq!(checked, users);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backup_waits_after_every_user() {
        let discord = Arc::new(FakeDiscord::new());
        let users: Vec<String> = (0..4).map(|i| format!("u{}", i)).collect();
        let pacing = PacingConfig {
            backup_delay: Duration::from_secs(1),
            ..no_pacing()
        };
        let engine = Reconciler::new(discord, Arc::new(MemoryStore::new()), ROLE, pacing);

        let start = tokio::time::Instant::now();
        engine
            .run(GUILD, &users, &mut RecordingReporter::default())
            .await;

        assert_eq!(start.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_callback_join_fallbacks() {
        let discord = Arc::new(
            FakeDiscord::new()
                .with_member(GUILD, "present")
                .with_valid_token("tok")
                .with_join_status("blocked", 403)
                .with_failing_patch("blocked"),
        );
        let engine = reconciler(&discord, Arc::new(MemoryStore::new()));

        let fresh = engine.join_single(GUILD, "fresh", "tok").await;
        assert_eq!(fresh.join, JoinOutcome::Joined);
        assert_eq!(fresh.role_fallback, None);
        assert!(fresh.role_granted());

        let present = engine.join_single(GUILD, "present", "tok").await;
        assert_eq!(present.join, JoinOutcome::AlreadyMember);
        assert_eq!(present.role_fallback, Some(true));

        let blocked = engine.join_single(GUILD, "blocked", "tok").await;
        assert_eq!(blocked.role_fallback, Some(false));
        assert!(!blocked.role_granted());
    }

    #[tokio::test]
    async fn test_membership_stats() {
        let discord = Arc::new(
            FakeDiscord::new()
                .with_member(GUILD, "a")
                .with_member(GUILD, "b")
                .with_member(GUILD, "c"),
        );
        let store = seeded_store(&["a", "b", "c", "d"], &[]).await;
        let engine = reconciler(&discord, store);

        let stats = engine.membership_stats(GUILD).await.unwrap();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.in_server, 3);
        assert_eq!(stats.left_server, 1);
        assert_eq!(stats.retention_rate(), 75.0);
    }

    #[test]
    fn test_retention_rate_bounds() {
        assert_eq!(MembershipStats::default().retention_rate(), 0.0);

        let all_in = MembershipStats {
            total: 7,
            in_server: 7,
            left_server: 0,
        };
        assert_eq!(all_in.retention_rate(), 100.0);
    }
}
